#![allow(dead_code)]

pub const DHO_IDN: &str = "RIGOL TECHNOLOGIES,DHO924,DHO9A000000001,00.01.02";
pub const DS1000Z_IDN: &str = "RIGOL TECHNOLOGIES,DS1054Z,DS1ZA000000001,00.04.04.SP4";
pub const SDS_IDN: &str = "Siglent Technologies,SDS1104X-E,SDSMMEBD000001,8.2.6.1.37R9";
pub const DMM_IDN: &str = "Keithley Instruments,MODEL 2000,1234567,A20";

pub const DHO_USB: &str = "USB0::0x1AB1::0x044C::DHO9A000000001::INSTR";
pub const DS1000Z_LAN: &str = "TCPIP0::127.0.0.5::5555::SOCKET";
pub const SDS_LAN: &str = "TCPIP0::192.168.1.20::5025::SOCKET";
pub const DMM_SERIAL: &str = "ASRL/dev/ttyUSB0::INSTR";

/// Smallest stream that passes image validation
pub fn png() -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(&[0, 0, 0, 13]);
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&[0; 17]);
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.extend_from_slice(b"IEND\xae\x42\x60\x82");
    data
}

pub fn bmp(len: usize) -> Vec<u8> {
    let mut data = b"BM".to_vec();
    data.extend_from_slice(&(len as u32).to_le_bytes());
    data.resize(len, 0x55);
    data
}

/// Definite length block with a trailing newline
pub fn block(payload: &[u8]) -> Vec<u8> {
    let mut data = format!("#9{:09}", payload.len()).into_bytes();
    data.extend_from_slice(payload);
    data.push(b'\n');
    data
}
