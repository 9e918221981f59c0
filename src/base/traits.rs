use crate::base::error::Result;
use crate::types::RangeSample;
use log::trace;
use std::io;
use std::sync::mpsc::Sender;

/// Opens the byte stream the driver talks to the sensor over.
pub trait SerialConnector {
    /// The stream type produced by this connector.
    type Port: io::Read + io::Write;

    /// Opens `path` configured for 8N1 at `baud_rate` with non-blocking reads.
    ///
    /// Returns `Error::DeviceNotFound` when the port cannot be opened.
    ///
    /// # Arguments
    ///
    /// * `path` - The device path, e.g. `/dev/ttyUSB0`.
    /// * `baud_rate` - The line speed in bits per second.
    fn connect(&mut self, path: &str, baud_rate: u32) -> Result<Self::Port>;
}

/// Receives every range sample the driver decodes.
pub trait RangeSink {
    /// Publishes one decoded sample.
    fn publish(&mut self, sample: &RangeSample);
}

impl<F> RangeSink for F
where
    F: FnMut(&RangeSample),
{
    fn publish(&mut self, sample: &RangeSample) {
        self(sample)
    }
}

impl RangeSink for Vec<RangeSample> {
    fn publish(&mut self, sample: &RangeSample) {
        self.push(sample.clone());
    }
}

impl RangeSink for Sender<RangeSample> {
    /// Samples are dropped once the receiving side hangs up.
    fn publish(&mut self, sample: &RangeSample) {
        if self.send(sample.clone()).is_err() {
            trace!("Sample receiver hung up, dropping sample");
        }
    }
}
