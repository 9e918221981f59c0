use std::error;
use std::fmt;
use std::io;

/// Represents errors that can occur while talking to an HPS167 sensor.
#[derive(Debug)]
pub enum Error {
    /// The serial port could not be opened or configured.
    DeviceNotFound { path: String, description: String },

    /// No valid response frame was observed during the init probe window.
    NoSensorResponse,

    /// Fewer bytes than a complete response frame were available.
    FrameTooShort { len: usize },

    /// The first byte of the frame is not the start delimiter. Contains the byte found.
    BadStartByte(u8),

    /// The CRC carried by the frame does not match the CRC computed over its payload.
    ChecksumMismatch { received: u16, calculated: u16 },

    /// A configuration value could not be interpreted.
    InvalidParameter { description: String },

    /// An I/O error occurred while communicating with the underlying stream (e.g., serial port).
    IoError(io::Error),
}

impl Error {
    /// Returns `true` for the per-frame decode failures the polling loop absorbs.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::FrameTooShort { .. } | Error::BadStartByte(_) | Error::ChecksumMismatch { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceNotFound { path, description } => {
                write!(f, "device not found at {}: {}", path, description)
            }
            Error::NoSensorResponse => write!(f, "no response from sensor"),
            Error::FrameTooShort { len } => write!(f, "frame too short: {} bytes", len),
            Error::BadStartByte(byte) => write!(f, "bad start byte: {:02X}", byte),
            Error::ChecksumMismatch {
                received,
                calculated,
            } => write!(
                f,
                "checksum mismatch: received {:04X}, calculated {:04X}",
                received, calculated
            ),
            Error::InvalidParameter { description } => {
                write!(f, "invalid parameter: {}", description)
            }
            Error::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

/// A specialized `Result` type for HPS167 operations.
pub type Result<T> = std::result::Result<T, Error>;
