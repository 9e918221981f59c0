use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no reflection, no final XOR.
static CRC16_CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Calculates the CRC16-CCITT used by HPS167 command and response frames.
///
/// # Arguments
///
/// * `data` - The byte slice to checksum.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC16_CCITT.checksum(data)
}
