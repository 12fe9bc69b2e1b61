/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Resource managers and sessions
//!
//! A [`ResourceManager`] lists the addresses it can reach and opens a
//! [`Session`] on one of them. Sessions are message based: every command is
//! followed by at most one response message.

use log::{debug, trace, warn};
use std::fmt;
use std::io::Read;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::block;
use crate::config::Config;
use crate::error::TransportError;
use crate::serial::SerialManager;
use crate::tcp::TcpManager;
use crate::usbtmc::UsbtmcManager;

/// Resource locator, e.g. `USB0::0x1AB1::0x044C::DHO9A0001::INSTR`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    pub fn new<S: Into<String>>(address: S) -> Address {
        Address(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case sensitive substring test used for the name hint
    pub fn contains(&self, hint: &str) -> bool {
        self.0.contains(hint)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Address {
        Address::new(s)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Address {
        Address(s)
    }
}

/// An open connection to a single instrument
pub trait Session {
    /// Send a command, the terminator is added by the session
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Read one complete response message
    fn read_raw(&mut self) -> Result<Vec<u8>, TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.write(command)?;
        let data = self.read_raw()?;
        Ok(String::from_utf8(data)?.trim_end().to_string())
    }

    fn query_binary(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
        self.write(command)?;
        self.read_raw()
    }
}

pub trait ResourceManager {
    /// Whether addresses of this form belong to this manager
    fn handles(&self, address: &Address) -> bool;

    fn list_resources(&self) -> Result<Vec<Address>, TransportError>;

    fn open(&self, address: &Address, timeout: Duration)
        -> Result<Box<dyn Session>, TransportError>;
}

/// Session that is closed when it goes out of scope
pub struct ScopedSession {
    address: Address,
    session: Box<dyn Session>,
    closed: bool,
}

impl ScopedSession {
    pub fn open(
        manager: &dyn ResourceManager,
        address: &Address,
        timeout: Duration,
    ) -> Result<ScopedSession, TransportError> {
        debug!("opening {}", address);
        let session = manager.open(address, timeout)?;
        Ok(ScopedSession {
            address: address.clone(),
            session,
            closed: false,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Close now and report the outcome instead of logging it on drop
    pub fn close(mut self) -> Result<(), TransportError> {
        self.closed = true;
        debug!("closing {}", self.address);
        self.session.close()
    }
}

impl Deref for ScopedSession {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        debug!("closing {}", self.address);
        if let Err(e) = self.session.close() {
            warn!("failed to close {}: {}", self.address, e);
        }
    }
}

/// All configured resource managers behind one interface
#[derive(Default)]
pub struct Bus {
    backends: Vec<Box<dyn ResourceManager>>,
}

impl Bus {
    pub fn new() -> Bus {
        Bus::default()
    }

    pub fn with<M: ResourceManager + 'static>(mut self, backend: M) -> Bus {
        self.backends.push(Box::new(backend));
        self
    }

    pub fn from_config(config: &Config) -> Bus {
        let mut bus = Bus::new();
        if config.usb.enabled {
            bus = bus.with(UsbtmcManager::new());
        }
        if !config.lan.hosts.is_empty() {
            bus = bus.with(TcpManager::new(config.lan.hosts.clone(), config.lan.port));
        }
        if config.serial.enabled {
            bus = bus.with(SerialManager::new(config.serial.baud_rate));
        }
        bus
    }
}

impl ResourceManager for Bus {
    fn handles(&self, address: &Address) -> bool {
        self.backends.iter().any(|b| b.handles(address))
    }

    /// Concatenates every backend's listing; fails only if all of them fail
    fn list_resources(&self) -> Result<Vec<Address>, TransportError> {
        let mut addresses = Vec::new();
        let mut first_error = None;
        let mut any_ok = false;

        for backend in &self.backends {
            match backend.list_resources() {
                Ok(mut list) => {
                    any_ok = true;
                    addresses.append(&mut list);
                }
                Err(e) => {
                    warn!("failed to list resources: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if !any_ok => Err(e),
            _ => Ok(addresses),
        }
    }

    fn open(
        &self,
        address: &Address,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        self.backends
            .iter()
            .find(|b| b.handles(address))
            .ok_or_else(|| TransportError::Unsupported(address.to_string()))?
            .open(address, timeout)
    }
}

const BMP_FILE_HEADER_LEN: usize = 14;

/// Length of the response frame at the start of `data`, if already known
fn frame_len(data: &[u8]) -> Result<Option<usize>, TransportError> {
    match data.first() {
        None => Ok(None),
        Some(b'#') => {
            let header = block::parse_header(data)
                .map_err(|e| TransportError::Protocol(e.to_string()))?;
            Ok(match header {
                Some(h) => match h.frame_len() {
                    Some(len) => Some(len),
                    None if data.ends_with(b"\n") => Some(data.len()),
                    None => None,
                },
                None => None,
            })
        }
        Some(b'B') if data.get(1) == Some(&b'M') => {
            if data.len() < 6 {
                return Ok(None);
            }
            let size = u32::from_le_bytes([data[2], data[3], data[4], data[5]]) as usize;
            if size < BMP_FILE_HEADER_LEN {
                return Err(TransportError::Protocol(format!(
                    "bitmap header declares {} bytes",
                    size
                )));
            }
            Ok(Some(size))
        }
        Some(_) => Ok(data.iter().position(|&b| b == b'\n').map(|pos| pos + 1)),
    }
}

/// Read one response from a byte stream that has no message boundaries
///
/// Block responses are read to their declared length, bare BMP images to the
/// size in their file header and everything else up to a newline.
pub(crate) fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        // stale terminator left over from a previous block response
        while matches!(data.first(), Some(b'\n') | Some(b'\r')) {
            data.remove(0);
        }

        if let Some(len) = frame_len(&data)? {
            if data.len() >= len {
                data.truncate(len);
                trace!("read frame of {} bytes", data.len());
                return Ok(data);
            }
        }

        let n = match reader.read(&mut chunk) {
            Ok(0) => {
                return Err(short_frame(&data)?.unwrap_or_else(|| {
                    TransportError::Protocol(format!(
                        "connection closed after {} bytes",
                        data.len()
                    ))
                }))
            }
            Ok(n) => n,
            Err(e) => return Err(short_frame(&data)?.unwrap_or_else(|| e.into())),
        };
        data.extend_from_slice(&chunk[..n]);
    }
}

/// A frame whose length is known but that stopped arriving is malformed,
/// not late
fn short_frame(data: &[u8]) -> Result<Option<TransportError>, TransportError> {
    Ok(match frame_len(data)? {
        Some(len) if !data.is_empty() && data.len() < len => Some(TransportError::Protocol(
            format!("block declared {} bytes, got {}", len, data.len()),
        )),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Hands out at most `step` bytes per read
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
            }
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn reads_line() {
        let mut r = Cursor::new(b"RIGOL TECHNOLOGIES,DHO924,X,1\nnext".to_vec());
        assert_eq!(read_frame(&mut r).unwrap(), b"RIGOL TECHNOLOGIES,DHO924,X,1\n");
    }

    #[test]
    fn reads_block_in_pieces() {
        let mut r = Trickle {
            data: b"#2100123456789\n",
            step: 3,
        };
        assert_eq!(read_frame(&mut r).unwrap(), b"#2100123456789");
    }

    #[test]
    fn skips_stale_terminator() {
        let mut r = Cursor::new(b"\nOK\n".to_vec());
        assert_eq!(read_frame(&mut r).unwrap(), b"OK\n");
    }

    #[test]
    fn reads_bare_bitmap() {
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&16u32.to_le_bytes());
        bmp.extend_from_slice(&[0x0a; 10]);
        let mut r = Trickle {
            data: &bmp,
            step: 4,
        };
        assert_eq!(read_frame(&mut r).unwrap(), bmp);
    }

    #[test]
    fn timeout_mid_block_is_malformed() {
        let mut r = Trickle {
            data: b"#15ab",
            step: 16,
        };
        match read_frame(&mut r) {
            Err(TransportError::Protocol(msg)) => assert!(msg.contains("declared 8 bytes, got 5")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn timeout_mid_line_is_timeout() {
        let mut r = Trickle {
            data: b"RIGOL",
            step: 16,
        };
        assert!(matches!(read_frame(&mut r), Err(TransportError::Timeout)));
    }

    #[test]
    fn undersized_bitmap_header() {
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&0u32.to_le_bytes());
        bmp.extend_from_slice(&[0; 32]);
        let mut r = Cursor::new(bmp);
        assert!(matches!(
            read_frame(&mut r),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn closed_mid_frame() {
        let mut r = Cursor::new(b"partial".to_vec());
        assert!(matches!(
            read_frame(&mut r),
            Err(TransportError::Protocol(_))
        ));
    }
}
