//! Command frames understood by the HPS167.
//!
//! ```text
//! | Start (1B) | CMD (1B) | DATA FIELD (6B)                | CRC (2B)
//! | 0x0A       | 0x24     | 0x00 0x00 0x00 0x00 0x00 0x00  | 0x0F 0x72   continuous ranging
//! | 0x0A       | 0x22     | 0x00 0x00 0x00 0x00 0x00 0x00  | 0xAE 0x57   single ranging
//! ```
//!
//! The CRC covers every byte before it, start byte included, and is sent MSB first.

use crate::checksum::crc16;

/// Start delimiter shared by command and response frames.
pub const HPS167_START_BYTE: u8 = 0x0A;

/// Command code to start continuous ranging. The sensor streams responses until powered off.
pub const HPS167_CMD_CONTINUOUS_RANGING: u8 = 0x24;

/// Command code to take a single measurement.
pub const HPS167_CMD_SINGLE_RANGING: u8 = 0x22;

/// Total size of a command frame.
pub const HPS167_CMD_FRAME_LEN: usize = 10;

const HPS167_CMD_CRC_POS: usize = 8;

/// The continuous-ranging command, sent once when the driver starts.
pub const HPS167_CMD_CONTINUOUS_RANGING_FRAME: [u8; HPS167_CMD_FRAME_LEN] = [
    0x0A, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0F, 0x72,
];

/// The single-ranging command. Defined by the protocol, never sent by the driver.
pub const HPS167_CMD_SINGLE_RANGING_FRAME: [u8; HPS167_CMD_FRAME_LEN] = [
    0x0A, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xAE, 0x57,
];

/// Returns the command frame that puts the sensor into continuous ranging mode.
#[inline]
pub fn build_command_frame() -> [u8; HPS167_CMD_FRAME_LEN] {
    HPS167_CMD_CONTINUOUS_RANGING_FRAME
}

/// Builds a command frame for `cmd` with an all-zero data field and a computed CRC.
pub fn command_frame(cmd: u8) -> [u8; HPS167_CMD_FRAME_LEN] {
    let mut frame = [0u8; HPS167_CMD_FRAME_LEN];
    frame[0] = HPS167_START_BYTE;
    frame[1] = cmd;
    let crc = crc16(&frame[..HPS167_CMD_CRC_POS]);
    frame[HPS167_CMD_CRC_POS..].copy_from_slice(&crc.to_be_bytes());
    frame
}
