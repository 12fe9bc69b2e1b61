/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Raw SCPI socket backend
//!
//! LAN instruments are not scanned for, the manager only lists the hosts it
//! was configured with.

use log::debug;
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::{read_frame, Address, ResourceManager, Session};

/// Split `host` or `host:port`, IPv6 literals must be bracketed to carry a port
fn split_host(entry: &str, default_port: u16) -> (String, u16) {
    if let Some((host, port)) = entry.rsplit_once(':') {
        if !host.contains(':') || host.ends_with(']') {
            if let Ok(port) = port.parse() {
                return (host.to_string(), port);
            }
        }
    }
    (entry.to_string(), default_port)
}

/// Host and port of a `TCPIP<n>::<host>[::<port>]::SOCKET` or `::INSTR` address
fn parse_address(address: &Address) -> Option<(String, Option<u16>)> {
    let parts: Vec<&str> = address.as_str().split("::").collect();
    if parts.len() < 2 || !parts[0].starts_with("TCPIP") || parts[1].is_empty() {
        return None;
    }
    let port = parts.get(2).and_then(|p| p.parse().ok());
    Some((parts[1].to_string(), port))
}

#[derive(Debug, Clone)]
pub struct TcpManager {
    hosts: Vec<String>,
    default_port: u16,
}

impl TcpManager {
    pub fn new(hosts: Vec<String>, default_port: u16) -> TcpManager {
        TcpManager {
            hosts,
            default_port,
        }
    }
}

impl ResourceManager for TcpManager {
    fn handles(&self, address: &Address) -> bool {
        address.as_str().starts_with("TCPIP")
    }

    fn list_resources(&self) -> Result<Vec<Address>, TransportError> {
        Ok(self
            .hosts
            .iter()
            .map(|entry| {
                let (host, port) = split_host(entry, self.default_port);
                Address::new(format!("TCPIP0::{}::{}::SOCKET", host, port))
            })
            .collect())
    }

    fn open(
        &self,
        address: &Address,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let (host, port) =
            parse_address(address).ok_or_else(|| TransportError::InvalidAddress(address.to_string()))?;
        let port = port.unwrap_or(self.default_port);

        let target = (host.trim_start_matches('[').trim_end_matches(']'), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::NotFound(address.to_string()))?;

        let stream = TcpStream::connect_timeout(&target, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        debug!("connected to {}", target);
        Ok(Box::new(TcpSession { stream }))
    }
}

pub struct TcpSession {
    stream: TcpStream,
}

impl Session for TcpSession {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        debug!("tcp write: {}", command);
        self.stream.write_all(format!("{}\n", command).as_bytes())?;
        Ok(())
    }

    fn read_raw(&mut self) -> Result<Vec<u8>, TransportError> {
        read_frame(&mut self.stream)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }
}
