use crate::base::error::{Error, Result};
use crate::base::traits::SerialConnector;
use log::{error, trace, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt;
use std::io;
use std::time::Duration;

/// Upper bound on reads per `discard_input` call.
const DISCARD_MAX_READS: usize = 32;

/// Connector for real serial ports, backed by the `serialport` crate.
///
/// Ports are opened 8N1, without flow control, and with a zero read timeout so
/// that reads return immediately with whatever bytes are pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerial;

impl SerialConnector for SystemSerial {
    type Port = Box<dyn SerialPort>;

    fn connect(&mut self, path: &str, baud_rate: u32) -> Result<Self::Port> {
        trace!("Opening serial port {} at {} baud", path, baud_rate);
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", path, e);
                Error::DeviceNotFound {
                    path: path.to_owned(),
                    description: e.to_string(),
                }
            })?;

        if let Err(e) = port.clear(ClearBuffer::Input) {
            warn!("Failed to flush input of {}: {}", path, e);
        }
        Ok(port)
    }
}

/// An open serial link to the sensor.
///
/// The underlying stream is closed when the link is dropped.
pub struct SerialLink<T> {
    path: String,
    stream: T,
}

impl<T> SerialLink<T>
where
    T: io::Read + io::Write,
{
    /// Opens a link to `path` through `connector`.
    ///
    /// # Arguments
    ///
    /// * `connector` - The connector that opens the actual stream.
    /// * `path` - The device path.
    /// * `baud_rate` - The line speed in bits per second.
    pub fn open<C>(connector: &mut C, path: &str, baud_rate: u32) -> Result<SerialLink<T>>
    where
        C: SerialConnector<Port = T>,
    {
        let stream = connector.connect(path, baud_rate)?;
        trace!("Serial link to {} open", path);
        Ok(SerialLink {
            path: path.to_owned(),
            stream,
        })
    }

    /// Returns the device path this link was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Writes a complete frame and flushes the stream.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<usize> {
        trace!("Writing {} bytes to {}: {:02X?}", frame.len(), self.path, frame);
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        Ok(frame.len())
    }

    /// Reads whatever bytes are currently pending into `buf`, without blocking.
    ///
    /// A read that times out or would block yields zero bytes. Any other failure
    /// is returned as `Error::IoError`.
    pub fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(read) => {
                trace!("Read {} bytes from {}", read, self.path);
                Ok(read)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                ) =>
            {
                trace!("No data pending on {}", self.path);
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drops every byte currently pending on the link and returns how many were dropped.
    ///
    /// Stops at the first empty read, or after a bounded number of reads on a port
    /// that keeps delivering. A failed read ends the flush early and is only logged.
    pub fn discard_input(&mut self) -> usize {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;
        for _ in 0..DISCARD_MAX_READS {
            match self.read_available(&mut scratch) {
                Ok(0) => break,
                Ok(read) => discarded += read,
                Err(e) => {
                    warn!("Failed to flush input of {}: {}", self.path, e);
                    break;
                }
            }
        }
        if discarded > 0 {
            trace!("Discarded {} pending bytes from {}", discarded, self.path);
        }
        discarded
    }
}

impl<T> fmt::Debug for SerialLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for SerialLink<T> {
    fn drop(&mut self) {
        trace!("Closing serial link to {}", self.path);
    }
}
