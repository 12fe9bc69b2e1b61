/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! RS-232 and virtual COM port backend

use log::debug;
use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::{read_frame, Address, ResourceManager, Session};

/// Port name of an `ASRL<port>::INSTR` address
fn port_name(address: &Address) -> Option<&str> {
    let rest = address.as_str().strip_prefix("ASRL")?;
    let name = rest.strip_suffix("::INSTR").unwrap_or(rest);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[derive(Debug, Clone)]
pub struct SerialManager {
    baud_rate: u32,
}

impl SerialManager {
    pub fn new(baud_rate: u32) -> SerialManager {
        SerialManager { baud_rate }
    }
}

impl ResourceManager for SerialManager {
    fn handles(&self, address: &Address) -> bool {
        address.as_str().starts_with("ASRL")
    }

    fn list_resources(&self) -> Result<Vec<Address>, TransportError> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|p| Address::new(format!("ASRL{}::INSTR", p.port_name)))
            .collect())
    }

    fn open(
        &self,
        address: &Address,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let name =
            port_name(address).ok_or_else(|| TransportError::InvalidAddress(address.to_string()))?;

        let port = serialport::new(name, self.baud_rate)
            .timeout(timeout)
            .open()?;
        port.clear(serialport::ClearBuffer::All)?;

        debug!("opened {} at {} baud", name, self.baud_rate);
        Ok(Box::new(SerialSession { port }))
    }
}

pub struct SerialSession {
    port: Box<dyn SerialPort>,
}

impl Session for SerialSession {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        debug!("serial write: {}", command);
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    fn read_raw(&mut self) -> Result<Vec<u8>, TransportError> {
        read_frame(&mut self.port)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_name_from_address() {
        assert_eq!(
            port_name(&Address::new("ASRL/dev/ttyUSB0::INSTR")),
            Some("/dev/ttyUSB0")
        );
        assert_eq!(port_name(&Address::new("ASRLCOM3::INSTR")), Some("COM3"));
        assert_eq!(port_name(&Address::new("ASRL::INSTR")), None);
        assert_eq!(port_name(&Address::new("USB0::0x1::0x2::INSTR")), None);
    }
}
