use crate::answers::*;
use crate::base::{Error, Result};
use crate::checksum::crc16;
use crate::cmds::HPS167_START_BYTE;
use byteorder::{BigEndian, ByteOrder};
use log::trace;

/// Decodes a ranging response from the start of `buf`.
///
/// The buffer must hold a complete frame beginning at offset 0. Bytes past the
/// frame are ignored. No attempt is made to find a frame starting later in the
/// buffer; see [`scan_response`] for that.
///
/// An over-range reading is returned as a regular response; check
/// [`RangingResponse::is_over_range`].
pub fn parse_response(buf: &[u8]) -> Result<RangingResponse> {
    if buf.len() < HPS167_ANS_FRAME_LEN {
        trace!(
            "Response too short: {} bytes, need {}",
            buf.len(),
            HPS167_ANS_FRAME_LEN
        );
        return Err(Error::FrameTooShort { len: buf.len() });
    }

    if buf[0] != HPS167_START_BYTE {
        trace!("Bad start byte: {:02X}", buf[0]);
        return Err(Error::BadStartByte(buf[0]));
    }

    let calculated = crc16(&buf[HPS167_ANS_CRC_START..HPS167_ANS_CRC_POS]);
    let received = BigEndian::read_u16(&buf[HPS167_ANS_CRC_POS..]);
    if calculated != received {
        trace!(
            "CRC mismatch: received {:04X}, calculated {:04X}",
            received,
            calculated
        );
        return Err(Error::ChecksumMismatch {
            received,
            calculated,
        });
    }

    if buf[HPS167_ANS_LEN_POS] != HPS167_ANS_DATA_LEN {
        trace!(
            "Unexpected length byte {:02X}, decoding anyway",
            buf[HPS167_ANS_LEN_POS]
        );
    }

    let response = RangingResponse {
        distance_mm: BigEndian::read_u16(&buf[HPS167_ANS_DISTANCE_POS..]),
        magnitude: BigEndian::read_u16(&buf[HPS167_ANS_MAGNITUDE_POS..]),
        magnitude_exp: buf[HPS167_ANS_MAGNITUDE_EXP_POS],
        ambient: buf[HPS167_ANS_AMBIENT_POS],
        precision: BigEndian::read_u16(&buf[HPS167_ANS_PRECISION_POS..]),
    };
    trace!("Decoded response: {:?}", response);
    Ok(response)
}

/// Searches `buf` for the first valid response, skipping anything that is not one.
///
/// Returns the number of leading bytes the caller can discard and the response,
/// if one was found. When a start byte is followed by an incomplete frame the
/// scan stops there so the caller can retry once more bytes have arrived.
pub fn scan_response(buf: &[u8]) -> (usize, Option<RangingResponse>) {
    let mut offset = 0;
    while offset < buf.len() {
        match buf[offset..].iter().position(|&b| b == HPS167_START_BYTE) {
            Some(skip) => offset += skip,
            None => return (buf.len(), None),
        }

        match parse_response(&buf[offset..]) {
            Ok(response) => return (offset + HPS167_ANS_FRAME_LEN, Some(response)),
            Err(Error::FrameTooShort { .. }) => return (offset, None),
            Err(_) => offset += 1,
        }
    }
    (buf.len(), None)
}
