/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! USB Test and Measurement Class (USBTMC) backend

use log::{debug, trace, warn};
use rusb::UsbContext;

use std::num::Wrapping;
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::{Address, ResourceManager, Session};

const USBTMC_BINTERFACE_CLASS: u8 = 0xfe;
const USBTMC_BINTERFACE_SUBCLASS: u8 = 3;
const USBTMC_BINTERFACE_PROTOCOL: u8 = 0;
const USB488_BINTERFACE_PROTOCOL: u8 = 1;

const HEADER_SIZE: usize = 12;
const TRANSFER_SIZE: usize = 1024 * 1024;
const READ_SIZE: usize = 64 * 1024;

/* control values */

/// USBTMC bRequest Values
#[repr(u8)]
enum RequestType {
    InitiateAbortBulkOut = 1,
    InitiateClear = 5,
    CheckClearStatus = 6,
}

/// USBTMC Status values
#[repr(u8)]
enum Status {
    Success = 0x01,
    Pending = 0x02,
}

/* bulk values */

enum Direction {
    In,
    Out,
}

enum MsgId {
    DeviceDependent,
}

/// Location of the USBTMC interface inside a device
#[derive(Debug, Clone, Copy)]
struct Interface {
    config_num: u8,
    iface_num: u8,
    ep_bulk_in: u8,
    ep_bulk_out: u8,
}

/// Searches the device descriptors for the first USBTMC interface
///
/// Plain USBTMC and the USB488 subclass protocol are both accepted, the
/// message layer used here is the same.
fn find_interface<C: UsbContext>(device: &rusb::Device<C>) -> Option<Interface> {
    let desc = device.device_descriptor().ok()?;

    for cfg_desc in (0..desc.num_configurations())
        .map(|num| device.config_descriptor(num))
        .filter_map(|cfg_desc| cfg_desc.ok())
    {
        for iface_desc in cfg_desc.interfaces().flat_map(|iface| iface.descriptors()) {
            if iface_desc.class_code() != USBTMC_BINTERFACE_CLASS
                || iface_desc.sub_class_code() != USBTMC_BINTERFACE_SUBCLASS
            {
                continue;
            }

            let protocol = iface_desc.protocol_code();
            if protocol != USBTMC_BINTERFACE_PROTOCOL && protocol != USB488_BINTERFACE_PROTOCOL {
                continue;
            }

            let mut ep_bulk_in = None;
            let mut ep_bulk_out = None;
            for ep_desc in iface_desc.endpoint_descriptors() {
                if ep_desc.transfer_type() != rusb::TransferType::Bulk {
                    continue;
                }
                match ep_desc.direction() {
                    rusb::Direction::Out => ep_bulk_out = Some(ep_desc.address()),
                    rusb::Direction::In => ep_bulk_in = Some(ep_desc.address()),
                }
            }

            if let (Some(ep_bulk_in), Some(ep_bulk_out)) = (ep_bulk_in, ep_bulk_out) {
                return Some(Interface {
                    config_num: cfg_desc.number(),
                    iface_num: iface_desc.interface_number(),
                    ep_bulk_in,
                    ep_bulk_out,
                });
            }
        }
    }

    None
}

/// Serial number string, or `<bus>.<address>` when it cannot be read
fn device_serial<C: UsbContext>(device: &rusb::Device<C>, desc: &rusb::DeviceDescriptor) -> String {
    device
        .open()
        .and_then(|handle| handle.read_serial_number_string_ascii(desc))
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{:03}.{:03}", device.bus_number(), device.address()))
}

/// Vendor id, product id and serial of a `USB<n>::<vid>::<pid>::<serial>::INSTR` address
fn parse_address(address: &Address) -> Result<(u16, u16, Option<String>), TransportError> {
    let invalid = || TransportError::InvalidAddress(address.to_string());
    let parts: Vec<&str> = address.as_str().split("::").collect();

    if parts.len() < 3 || !parts[0].starts_with("USB") {
        return Err(invalid());
    }

    let hex = |s: &str| {
        let digits = s.trim_start_matches("0x").trim_start_matches("0X");
        u16::from_str_radix(digits, 16).map_err(|_| invalid())
    };

    let vid = hex(parts[1])?;
    let pid = hex(parts[2])?;
    let serial = parts
        .get(3)
        .filter(|s| **s != "INSTR")
        .map(|s| s.to_string());

    Ok((vid, pid, serial))
}

/// Lists and opens USBTMC devices through libusb
#[derive(Debug, Default)]
pub struct UsbtmcManager;

impl UsbtmcManager {
    pub fn new() -> UsbtmcManager {
        UsbtmcManager
    }
}

impl ResourceManager for UsbtmcManager {
    fn handles(&self, address: &Address) -> bool {
        address.as_str().starts_with("USB")
    }

    fn list_resources(&self) -> Result<Vec<Address>, TransportError> {
        let devices = rusb::devices()?;
        let mut addresses = Vec::new();

        for dev in devices.iter() {
            if find_interface(&dev).is_none() {
                continue;
            }
            let desc = match dev.device_descriptor() {
                Ok(desc) => desc,
                Err(e) => {
                    debug!("failed to get descriptor: {}", e);
                    continue;
                }
            };

            addresses.push(Address::new(format!(
                "USB0::0x{:04X}::0x{:04X}::{}::INSTR",
                desc.vendor_id(),
                desc.product_id(),
                device_serial(&dev, &desc)
            )));
        }

        debug!("found {} usbtmc devices", addresses.len());
        Ok(addresses)
    }

    fn open(
        &self,
        address: &Address,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let (vid, pid, serial) = parse_address(address)?;

        for dev in rusb::devices()?.iter() {
            let desc = match dev.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };
            if desc.vendor_id() != vid || desc.product_id() != pid {
                continue;
            }
            if let Some(serial) = &serial {
                if *serial != device_serial(&dev, &desc) {
                    continue;
                }
            }

            let mut instr = Instrument::new(dev);
            instr.set_timeout(timeout);
            instr.open()?;
            return Ok(Box::new(instr));
        }

        Err(TransportError::NotFound(address.to_string()))
    }
}

/// 'High level' Instrument wrapper around rusb::Device
pub struct Instrument<C: UsbContext> {
    connected: bool,
    // rusb objects
    pub device: rusb::Device<C>,
    pub handle: Option<rusb::DeviceHandle<C>>,
    // for linux kernel
    has_kernel_driver: bool,
    // addresses in the usb device
    iface: Option<Interface>,
    // btag number to keep track of packet parts
    btag: Wrapping<u8>,
    timeout: Duration,
}

impl<C: UsbContext> Instrument<C> {
    /// Creates and Instrument from a rusb Device
    pub fn new(device: rusb::Device<C>) -> Instrument<C> {
        Instrument {
            connected: false,
            device,
            handle: None,
            has_kernel_driver: false,
            iface: None,
            btag: Wrapping(0_u8),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Opens the USBTMC interface of the device
    ///
    /// Uses the first interface that matches the usbtmc class and subclass,
    /// detaches the kernel driver if one is bound and claims the interface.
    pub fn open(&mut self) -> Result<(), TransportError> {
        if self.connected {
            debug!("device already connected");
            return Ok(());
        }

        let iface = find_interface(&self.device).ok_or(TransportError::NotUsbtmcDevice)?;
        let mut handle = self.device.open()?;

        let detached = match handle.kernel_driver_active(iface.iface_num) {
            Ok(true) => {
                handle.detach_kernel_driver(iface.iface_num)?;
                true
            }
            _ => false,
        };

        let claimed = claim(&mut handle, iface);
        reattach_on_error(claimed, detached, || {
            handle.attach_kernel_driver(iface.iface_num)
        })?;

        self.has_kernel_driver = detached;
        self.handle = Some(handle);
        self.iface = Some(iface);
        self.connected = true;

        // some firmwares stall on INITIATE_CLEAR but work fine afterwards
        if let Err(e) = self.clear() {
            warn!("usbtmc clear failed: {}", e);
        }

        Ok(())
    }

    /// Releases the interface and gives it back to the kernel driver
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }

        if let (Some(handle), Some(iface)) = (&mut self.handle, self.iface) {
            if let Err(e) = handle.release_interface(iface.iface_num) {
                warn!("failed to release interface: {}", e);
            }

            if self.has_kernel_driver {
                if let Err(e) = handle.attach_kernel_driver(iface.iface_num) {
                    warn!("failed to attach kernel driver: {}", e);
                }
            }
        }

        self.connected = false;
        self.handle = None;
        self.iface = None;
    }

    fn link(&self) -> Result<(&rusb::DeviceHandle<C>, Interface), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match (&self.handle, self.iface) {
            (Some(handle), Some(iface)) => Ok((handle, iface)),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn next_btag(&mut self) -> u8 {
        // btag 0 is reserved
        self.btag += Wrapping(1_u8);
        if self.btag.0 == 0 {
            self.btag = Wrapping(1_u8);
        }
        self.btag.0
    }

    /// Sends a clear request and waits for it to complete
    pub fn clear(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let timeout = self.timeout;
        let iface = self.iface.ok_or(TransportError::NotConnected)?;
        let handle = self.handle.as_mut().ok_or(TransportError::NotConnected)?;

        let request_type = rusb::request_type(
            rusb::Direction::In,
            rusb::RequestType::Class,
            rusb::Recipient::Interface,
        );

        let buf: &mut [u8] = &mut [0];
        handle.read_control(
            request_type,
            RequestType::InitiateClear as u8,
            0x0000,
            iface.iface_num.into(),
            buf,
            timeout,
        )?;

        if buf[0] != Status::Success as u8 {
            return Err(TransportError::Request);
        }

        // wait for completion of clear
        loop {
            let buf: &mut [u8] = &mut [0, 0];
            handle.read_control(
                request_type,
                RequestType::CheckClearStatus as u8,
                0x0000,
                iface.iface_num.into(),
                buf,
                timeout,
            )?;

            if buf[0] != Status::Pending as u8 {
                break;
            }

            std::thread::sleep(Duration::from_millis(100));
        }

        handle.clear_halt(iface.ep_bulk_out)?;
        Ok(())
    }

    /// Write binary data to the instrument
    pub fn write_raw(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut sent_bytes = 0;
        let chunks: Vec<&[u8]> = data.chunks(TRANSFER_SIZE).collect();

        for (i, chunk) in chunks.iter().enumerate() {
            let btag = self.next_btag();
            let header = make_bulk_header(
                MsgId::DeviceDependent,
                Direction::Out,
                btag,
                chunk.len() as u32,
                i + 1 == chunks.len(),
            );

            // transfers are padded to a multiple of 4 bytes
            let pad_size = (4 - (chunk.len() % 4)) % 4;
            let mut packet = Vec::with_capacity(HEADER_SIZE + chunk.len() + pad_size);
            packet.extend_from_slice(&header);
            packet.extend_from_slice(chunk);
            packet.resize(HEADER_SIZE + chunk.len() + pad_size, 0);

            let (handle, iface) = self.link()?;
            match handle.write_bulk(iface.ep_bulk_out, &packet, self.timeout) {
                Ok(sent) => sent_bytes += sent,
                Err(e) => {
                    debug!("failed to send chunk during bulk out");
                    if let Err(abort) = self.abort_bulk_out(btag) {
                        warn!("failed to abort bulk out: {}", abort);
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(sent_bytes)
    }

    /// Abort a bulk-out operation
    fn abort_bulk_out(&self, btag: u8) -> Result<(), TransportError> {
        let (handle, iface) = self.link()?;

        let buf: &mut [u8] = &mut [0, 0];
        handle.read_control(
            rusb::request_type(
                rusb::Direction::In,
                rusb::RequestType::Class,
                rusb::Recipient::Endpoint,
            ),
            RequestType::InitiateAbortBulkOut as u8,
            u16::from(btag),
            iface.ep_bulk_out.into(),
            buf,
            self.timeout,
        )?;

        Ok(())
    }

    /// Read a complete message from the device
    ///
    /// Requests device dependent data until a transfer has the EOM bit set.
    pub fn read_message(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut data = Vec::new();
        let mut buf = vec![0u8; HEADER_SIZE + READ_SIZE + 3];

        loop {
            let btag = self.next_btag();
            let request = make_bulk_header(
                MsgId::DeviceDependent,
                Direction::In,
                btag,
                READ_SIZE as u32,
                false,
            );

            let (handle, iface) = self.link()?;
            handle.write_bulk(iface.ep_bulk_out, &request, self.timeout)?;

            let n = handle.read_bulk(iface.ep_bulk_in, &mut buf, self.timeout)?;
            if n < HEADER_SIZE {
                return Err(TransportError::Protocol(format!(
                    "short usbtmc header ({} bytes)",
                    n
                )));
            }
            if buf[0] != 2 || buf[1] != btag || buf[2] != !btag {
                return Err(TransportError::Protocol("unexpected usbtmc header".into()));
            }

            let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
            let eom = (buf[8] & 0x01) != 0;

            // a transfer larger than the max packet size spans several reads
            let mut payload = buf[HEADER_SIZE..n].to_vec();
            while payload.len() < size {
                let m = handle.read_bulk(iface.ep_bulk_in, &mut buf, self.timeout)?;
                if m == 0 {
                    break;
                }
                payload.extend_from_slice(&buf[..m]);
            }
            if payload.len() < size {
                return Err(TransportError::Protocol(format!(
                    "usbtmc transfer declared {} bytes, got {}",
                    size,
                    payload.len()
                )));
            }
            payload.truncate(size);

            trace!("bulk in: {} bytes, eom {}", size, eom);
            data.append(&mut payload);

            if eom {
                return Ok(data);
            }
        }
    }
}

impl<C: UsbContext> Session for Instrument<C> {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        debug!("usbtmc write: {}", command);
        self.write_raw(format!("{}\n", command).as_bytes())?;
        Ok(())
    }

    fn read_raw(&mut self) -> Result<Vec<u8>, TransportError> {
        self.read_message()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.disconnect();
        Ok(())
    }
}

impl<C: UsbContext> Drop for Instrument<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn claim<C: UsbContext>(
    handle: &mut rusb::DeviceHandle<C>,
    iface: Interface,
) -> Result<(), TransportError> {
    // set configuration if not correct
    if handle.active_configuration() != Ok(iface.config_num) {
        handle.set_active_configuration(iface.config_num)?;
        debug!("set configuration to {}", iface.config_num);
    }

    handle.claim_interface(iface.iface_num)?;
    Ok(())
}

/// Give a detached interface back to the kernel if claiming it failed
fn reattach_on_error<F>(
    claimed: Result<(), TransportError>,
    detached: bool,
    reattach: F,
) -> Result<(), TransportError>
where
    F: FnOnce() -> rusb::Result<()>,
{
    if claimed.is_err() && detached {
        if let Err(e) = reattach() {
            warn!("failed to attach kernel driver: {}", e);
        }
    }
    claimed
}

/// helper function to create bulk headers
fn make_bulk_header(
    msgid: MsgId,
    direction: Direction,
    btag: u8,
    transfer_size: u32,
    is_last: bool,
) -> [u8; HEADER_SIZE] {
    // table 2 in the usbtmc spec, for bulk in this is REQUEST_DEV_DEP_MSG_IN
    let msgid_nr: u8 = match msgid {
        MsgId::DeviceDependent => match direction {
            Direction::Out => 1,
            Direction::In => 2,
        },
    };

    let ts_bytes = transfer_size.to_le_bytes();
    [
        // table 1
        msgid_nr,
        btag,
        !btag,
        0x00,
        // table 3
        // size of the transfer, without header
        ts_bytes[0],
        ts_bytes[1],
        ts_bytes[2],
        ts_bytes[3],
        // whether this is the last chunk (bulk out) or term char enabled (bulk in)
        if is_last { 0x01 } else { 0x00 },
        // reserved, must be zeroes
        0x00,
        0x00,
        0x00,
    ]
}

impl<C: UsbContext> std::fmt::Debug for Instrument<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("connected", &self.connected)
            .field("has_kernel_driver", &self.has_kernel_driver)
            .field("iface", &self.iface)
            .field("timeout", &self.timeout)
            .finish()
    }
}
