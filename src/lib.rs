//! # HPS167 Driver
//!
//! `hps167` is a driver for the Hypersen HPS167 Time-of-Flight distance sensor on a serial port.
//! It puts the sensor into continuous ranging mode, polls the UART at a fixed rate, validates
//! each response frame with its CRC16 and hands decoded distances to a [`RangeSink`].
//!
//! Make sure nothing else (e.g. a telemetry protocol) is talking on the port the sensor is
//! connected to.

extern crate byteorder;
extern crate crc;
extern crate log;
extern crate serialport;

pub mod answers;
pub mod base;
mod checksum;
pub mod cmds;
mod internals;
pub mod protocol;
pub mod types;

pub use crate::answers::RangingResponse;
pub use crate::base::{
    Error, Interval, RangeSink, Result, SerialConnector, SerialLink, StopHandle, SystemSerial,
};
pub use crate::checksum::crc16;
pub use crate::internals::{HPS167_MAX_DISTANCE, HPS167_MEASURE_INTERVAL, HPS167_MIN_DISTANCE};
pub use crate::protocol::parse_response;
pub use crate::types::{DriverConfig, DriverStats, RangeSample, Rotation, TimingStats};

use crate::answers::HPS167_ANS_FRAME_LEN;
use crate::cmds::build_command_frame;
use crate::internals::HPS167_PROBE_POLL_INTERVAL;
use crate::protocol::scan_response;
use log::{error, info, trace, warn};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle state of the polling driver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DriverState {
    /// No serial link is open.
    Stopped,
    /// The link is being opened and the ranging command sent.
    Starting,
    /// The sensor is streaming and `tick()` collects samples.
    Running,
    /// The link is being released.
    Stopping,
}

/// Polling driver for one HPS167 sensor.
///
/// The driver owns the serial link and a 15-byte input buffer. Each `tick()` reads the
/// bytes that are pending, decodes them as one response frame and either publishes a
/// [`RangeSample`] to the sink or counts a communications error. Bad frames are never
/// fatal: the sensor keeps streaming and the next tick simply tries again.
///
/// # Example
/// ```ignore
/// # use hps167::{DriverConfig, Hps167Device, Rotation, StopHandle};
/// let config = DriverConfig::new("/dev/ttyUSB0").with_rotation(Rotation::Downward);
/// let mut device = Hps167Device::new(config, |sample: &hps167::RangeSample| {
///     println!("{:.3} m", sample.distance);
/// });
/// device.init()?;
/// device.run(&StopHandle::new());
/// ```
pub struct Hps167Device<C: SerialConnector, S> {
    config: DriverConfig,
    connector: C,
    sink: S,
    link: Option<SerialLink<C::Port>>,
    state: DriverState,
    linebuf: [u8; HPS167_ANS_FRAME_LEN],
    stats: DriverStats,
}

impl<S: RangeSink> Hps167Device<SystemSerial, S> {
    /// Constructs a driver for the serial port named in `config`.
    ///
    /// Nothing is opened until `init()` or `start()`.
    pub fn new(config: DriverConfig, sink: S) -> Hps167Device<SystemSerial, S> {
        Hps167Device::with_connector(config, SystemSerial, sink)
    }
}

impl<C: SerialConnector, S> Hps167Device<C, S> {
    /// Constructs a driver that opens its link through `connector`.
    ///
    /// # Arguments
    ///
    /// * `config` - Port, rotation and timing settings. Fixed for the lifetime of the driver.
    /// * `connector` - Opens the byte stream to the sensor.
    /// * `sink` - Receives every decoded sample.
    pub fn with_connector(config: DriverConfig, connector: C, sink: S) -> Hps167Device<C, S> {
        trace!(
            "Creating HPS167 driver for {} (rotation {})",
            config.port,
            config.rotation
        );
        Hps167Device {
            config,
            connector,
            sink,
            link: None,
            state: DriverState::Stopped,
            linebuf: [0; HPS167_ANS_FRAME_LEN],
            stats: DriverStats::default(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn rotation(&self) -> Rotation {
        self.config.rotation
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == DriverState::Running
    }

    /// Returns the counters accumulated so far.
    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Stops polling and closes the serial link. Does nothing if already stopped.
    pub fn stop(&mut self) {
        if self.state == DriverState::Stopped && self.link.is_none() {
            return;
        }

        trace!("Driver state -> Stopping");
        self.state = DriverState::Stopping;
        if let Some(link) = self.link.take() {
            trace!("Releasing serial link to {}", link.path());
        }
        self.state = DriverState::Stopped;
        info!("HPS167 on {} stopped", self.config.port);
    }

    /// Opens the link and sends the continuous ranging command.
    fn begin(&mut self) -> Result<SerialLink<C::Port>> {
        trace!("Driver state -> Starting");
        self.state = DriverState::Starting;

        let result = SerialLink::open(
            &mut self.connector,
            &self.config.port,
            self.config.baud_rate,
        )
        .and_then(|mut link| {
            link.write_frame(&build_command_frame())?;
            Ok(link)
        });

        if let Err(e) = &result {
            error!("Failed to start HPS167 on {}: {}", self.config.port, e);
            self.state = DriverState::Stopped;
        }
        result
    }

    /// Reads until a valid frame shows up or `timeout` expires.
    fn probe(link: &mut SerialLink<C::Port>, timeout: Duration) -> Result<RangingResponse> {
        trace!("Probing {} for up to {:?}", link.path(), timeout);
        let start = Instant::now();
        let mut pending: Vec<u8> = Vec::with_capacity(2 * HPS167_ANS_FRAME_LEN);
        let mut chunk = [0u8; HPS167_ANS_FRAME_LEN];

        loop {
            let read = match link.read_available(&mut chunk) {
                Ok(read) => read,
                Err(e) => {
                    warn!("Read from {} failed while probing: {}", link.path(), e);
                    0
                }
            };
            pending.extend_from_slice(&chunk[..read]);

            let (consumed, response) = scan_response(&pending);
            pending.drain(..consumed);
            if let Some(response) = response {
                trace!("Probe got a valid frame after {:?}", start.elapsed());
                return Ok(response);
            }

            if start.elapsed() >= timeout {
                warn!(
                    "No valid frame from {} within {:?}",
                    link.path(),
                    timeout
                );
                return Err(Error::NoSensorResponse);
            }

            if read == 0 {
                thread::sleep(HPS167_PROBE_POLL_INTERVAL);
            }
        }
    }
}

impl<C: SerialConnector, S: RangeSink> Hps167Device<C, S> {
    /// Opens the serial link, starts continuous ranging and waits for the sensor to answer.
    ///
    /// Fails with `Error::DeviceNotFound` if the port cannot be opened and with
    /// `Error::NoSensorResponse` if no valid frame arrives within the configured probe
    /// timeout. Read failures while waiting are logged and retried until the timeout,
    /// so they also end in `Error::NoSensorResponse`. On failure the link is closed
    /// again and the driver stays stopped.
    ///
    /// On success any bytes left over after the first valid frame, including a
    /// partially received one, are discarded before the driver switches to running,
    /// so the first `tick()` starts on a frame boundary.
    pub fn init(&mut self) -> Result<()> {
        if self.state != DriverState::Stopped {
            warn!("init called while {:?}, ignoring", self.state);
            return Ok(());
        }

        let mut link = self.begin()?;
        match Self::probe(&mut link, self.config.probe_timeout) {
            Ok(response) => {
                info!(
                    "HPS167 on {} responding, first distance {:.3} m",
                    self.config.port,
                    response.distance()
                );
                link.discard_input();
                self.link = Some(link);
                trace!("Driver state -> Running");
                self.state = DriverState::Running;
                Ok(())
            }
            Err(e) => {
                error!("HPS167 on {} failed to initialize: {}", self.config.port, e);
                self.state = DriverState::Stopped;
                Err(e)
            }
        }
    }

    /// Opens the serial link and starts continuous ranging without probing.
    ///
    /// Does nothing if the driver is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.state != DriverState::Stopped {
            warn!("start called while {:?}, ignoring", self.state);
            return Ok(());
        }

        let link = self.begin()?;
        self.link = Some(link);
        trace!("Driver state -> Running");
        self.state = DriverState::Running;
        info!("HPS167 on {} started", self.config.port);
        Ok(())
    }

    /// Runs one polling cycle: read, decode, publish or count the failure.
    ///
    /// Never blocks and never fails. Does nothing unless the driver is running.
    pub fn tick(&mut self) {
        if self.state != DriverState::Running {
            trace!("tick while {:?}, skipping", self.state);
            return;
        }

        let started = Instant::now();
        match self.collect() {
            Ok((timestamp, response)) => {
                let sample = RangeSample {
                    timestamp,
                    distance: response.distance(),
                    signal_quality: response.precision,
                    rotation: self.config.rotation,
                    min_distance: HPS167_MIN_DISTANCE,
                    max_distance: HPS167_MAX_DISTANCE,
                };
                trace!("Publishing sample: {:.3} m", sample.distance);
                self.sink.publish(&sample);
                self.stats.samples += 1;
            }
            Err(e) => {
                self.stats.comms_errors += 1;
                match e {
                    Error::FrameTooShort { .. } => trace!("Dropping cycle: {}", e),
                    ref e if e.is_decode_error() => warn!("Dropping frame: {}", e),
                    e => warn!("Read from {} failed: {}", self.config.port, e),
                }
            }
        }
        self.stats.read_timing.record(started.elapsed());
    }

    /// Polls at the configured interval until `stop` is signalled, then closes the link.
    ///
    /// Returns immediately if the driver is not running. A cycle in progress when the
    /// stop is requested runs to completion.
    pub fn run(&mut self, stop: &StopHandle) {
        let mut interval = Interval::new(self.config.measure_interval);
        trace!(
            "Polling {} every {:?}",
            self.config.port,
            interval.period()
        );

        while self.state == DriverState::Running && !stop.is_stopped() {
            interval.wait();
            if stop.is_stopped() {
                break;
            }
            self.tick();
        }
        self.stop();
    }

    /// Logs the driver's counters and returns a snapshot of them.
    pub fn print_info(&self) -> DriverStats {
        info!(
            "HPS167 on {}: {:?}, rotation {}",
            self.config.port, self.state, self.config.rotation
        );
        info!("{}", self.stats);
        self.stats.clone()
    }

    /// Reads pending bytes into the line buffer and decodes them as one frame.
    fn collect(&mut self) -> Result<(Instant, RangingResponse)> {
        let link = match self.link.as_mut() {
            Some(link) => link,
            None => {
                return Err(Error::IoError(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "serial link closed",
                )))
            }
        };

        self.linebuf = [0; HPS167_ANS_FRAME_LEN];
        let read = link.read_available(&mut self.linebuf)?;
        let timestamp = Instant::now();
        trace!("Collected {} bytes: {:02X?}", read, &self.linebuf[..read]);

        let response = parse_response(&self.linebuf[..read])?;
        Ok((timestamp, response))
    }
}

impl<C: SerialConnector, S> Drop for Hps167Device<C, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::mock::ScriptedConnector;
    use crate::cmds::HPS167_CMD_CONTINUOUS_RANGING_FRAME;

    fn frame(distance_mm: u16) -> [u8; 15] {
        let mut frame = [
            0x0A, 0x0D, 0x01, 0x01, 0x01, 0x00, 0x00, 0xFC, 0x8C, 0x02, 0x01, 0x00, 0x01, 0x00,
            0x00,
        ];
        frame[5..7].copy_from_slice(&distance_mm.to_be_bytes());
        let crc = crc16(&frame[2..13]);
        frame[13..].copy_from_slice(&crc.to_be_bytes());
        frame
    }

    fn config() -> DriverConfig {
        DriverConfig::new("/dev/ttyTEST")
            .with_rotation(Rotation::Forward)
            .with_measure_interval(Duration::from_millis(1))
            .with_probe_timeout(Duration::from_millis(20))
    }

    fn device(
        connector: &ScriptedConnector,
    ) -> Hps167Device<ScriptedConnector, Vec<RangeSample>> {
        Hps167Device::with_connector(config(), connector.clone(), Vec::new())
    }

    #[test]
    fn init_sends_command_and_probes() {
        let connector = ScriptedConnector::new();
        connector.push_bytes(&[0x13, 0x37]);
        connector.push_bytes(&frame(1753));
        let mut device = device(&connector);

        device.init().unwrap();
        assert_eq!(device.state(), DriverState::Running);
        assert_eq!(connector.written(), HPS167_CMD_CONTINUOUS_RANGING_FRAME.to_vec());
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 0);
    }

    #[test]
    fn init_probe_reassembles_split_frame() {
        let connector = ScriptedConnector::new();
        let valid = frame(420);
        connector.push_bytes(&valid[..4]);
        connector.push_bytes(&valid[4..]);
        let mut device = device(&connector);

        device.init().unwrap();
        assert!(device.is_running());
    }

    #[test]
    fn init_fails_without_port() {
        let connector = ScriptedConnector::new();
        connector.fail_open(true);
        let mut device = device(&connector);

        assert!(matches!(device.init(), Err(Error::DeviceNotFound { .. })));
        assert_eq!(device.state(), DriverState::Stopped);
        assert!(connector.written().is_empty());
    }

    #[test]
    fn init_fails_without_sensor_response() {
        let connector = ScriptedConnector::new();
        connector.push_bytes(&[0x0A, 0x0D, 0x00, 0x55, 0x55]);
        let mut device = device(&connector);

        assert!(matches!(device.init(), Err(Error::NoSensorResponse)));
        assert_eq!(device.state(), DriverState::Stopped);
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 1);
    }

    #[test]
    fn init_read_error_is_no_sensor_response() {
        let connector = ScriptedConnector::new();
        connector.push_error(io::ErrorKind::BrokenPipe);
        let mut device = device(&connector);

        assert!(matches!(device.init(), Err(Error::NoSensorResponse)));
        assert_eq!(device.state(), DriverState::Stopped);
        assert_eq!(connector.closed(), 1);
    }

    #[test]
    fn init_recovers_from_read_error_before_first_frame() {
        let connector = ScriptedConnector::new();
        connector.push_error(io::ErrorKind::BrokenPipe);
        connector.push_bytes(&frame(800));
        let mut device = device(&connector);

        device.init().unwrap();
        assert!(device.is_running());
    }

    #[test]
    fn init_discards_partial_frame_after_first_response() {
        let connector = ScriptedConnector::new();
        let mut burst = frame(1753).to_vec();
        burst.extend_from_slice(&frame(1754)[..7]);
        connector.push_bytes(&burst);
        connector.push_bytes(&frame(1755)[..7]);
        let mut device = device(&connector);

        device.init().unwrap();
        connector.push_bytes(&frame(1756));
        device.tick();

        assert_eq!(device.stats().samples, 1);
        assert_eq!(device.stats().comms_errors, 0);
        assert!((device.sink()[0].distance - 1.756).abs() < 1e-6);
    }

    #[test]
    fn tick_publishes_sample() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);
        device.start().unwrap();

        connector.push_bytes(&frame(1753));
        device.tick();

        let samples = device.sink();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].distance - 1.753).abs() < 1e-6);
        assert_eq!(samples[0].rotation, Rotation::Forward);
        assert_eq!(samples[0].signal_quality, 1);
        assert_eq!(samples[0].min_distance, HPS167_MIN_DISTANCE);
        assert_eq!(samples[0].max_distance, HPS167_MAX_DISTANCE);
        assert_eq!(device.stats().samples, 1);
        assert_eq!(device.stats().comms_errors, 0);
    }

    #[test]
    fn alternating_good_and_bad_cycles() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);
        device.start().unwrap();

        let garbage = [
            0xDE, 0xAD, 0xBE, 0xEF, 0x0A, 0x0D, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00,
        ];
        let ticks = 12;
        for i in 0..ticks {
            match i % 4 {
                0 | 2 => connector.push_bytes(&frame(1000 + i as u16)),
                // nothing pending
                1 => {}
                _ => connector.push_bytes(&garbage),
            }
            device.tick();
        }

        assert_eq!(device.stats().samples, ticks / 2);
        assert_eq!(device.stats().comms_errors, ticks / 2);
        assert_eq!(device.stats().read_timing.count, ticks);
        assert_eq!(device.sink().len(), (ticks / 2) as usize);
        assert!((device.sink()[1].distance - 1.002).abs() < 1e-6);
        assert!(device.is_running());
    }

    #[test]
    fn over_range_is_published() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);
        device.start().unwrap();

        connector.push_bytes(&frame(65530));
        device.tick();

        assert_eq!(device.stats().samples, 1);
        let sample = &device.sink()[0];
        assert!((sample.distance - 65.53).abs() < 1e-4);
        assert!(!sample.is_in_range());
    }

    #[test]
    fn corrupted_frame_is_counted() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);
        device.start().unwrap();

        let mut bad = frame(1753);
        bad[6] ^= 0x10;
        connector.push_bytes(&bad);
        device.tick();

        assert_eq!(device.stats().samples, 0);
        assert_eq!(device.stats().comms_errors, 1);
        assert!(device.sink().is_empty());
    }

    #[test]
    fn read_errors_do_not_stop_polling() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);
        device.start().unwrap();

        connector.push_error(io::ErrorKind::BrokenPipe);
        device.tick();
        connector.push_bytes(&frame(500));
        device.tick();

        assert_eq!(device.stats().comms_errors, 1);
        assert_eq!(device.stats().samples, 1);
        assert!(device.is_running());
        assert_eq!(connector.opened(), 1);
    }

    #[test]
    fn stop_then_start_reopens_link() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);

        device.start().unwrap();
        device.stop();
        assert_eq!(device.state(), DriverState::Stopped);
        assert_eq!(connector.closed(), 1);

        device.start().unwrap();
        assert_eq!(connector.opened(), 2);
        connector.push_bytes(&frame(250));
        device.tick();
        assert_eq!(device.stats().samples, 1);

        device.stop();
        device.stop();
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.closed(), 2);

        let mut expected = HPS167_CMD_CONTINUOUS_RANGING_FRAME.to_vec();
        expected.extend_from_slice(&HPS167_CMD_CONTINUOUS_RANGING_FRAME);
        assert_eq!(connector.written(), expected);

        drop(device);
        assert_eq!(connector.closed(), 2);
    }

    #[test]
    fn drop_closes_link() {
        let connector = ScriptedConnector::new();
        {
            let mut device = device(&connector);
            device.start().unwrap();
        }
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 1);
    }

    #[test]
    fn start_twice_is_noop() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);
        device.start().unwrap();
        device.start().unwrap();
        device.init().unwrap();
        assert_eq!(connector.opened(), 1);
    }

    #[test]
    fn tick_while_stopped_does_nothing() {
        let connector = ScriptedConnector::new();
        connector.push_bytes(&frame(1753));
        let mut device = device(&connector);

        device.tick();
        assert_eq!(device.stats(), &DriverStats::default());
        assert_eq!(connector.opened(), 0);
    }

    #[test]
    fn run_until_stopped() {
        let connector = ScriptedConnector::new();
        for distance in [100, 200, 300] {
            connector.push_bytes(&frame(distance));
        }

        let stop = StopHandle::new();
        let sink_stop = stop.clone();
        let mut received = 0;
        let sink = move |_: &RangeSample| {
            received += 1;
            if received == 3 {
                sink_stop.stop();
            }
        };

        let mut device = Hps167Device::with_connector(config(), connector.clone(), sink);
        device.start().unwrap();
        device.run(&stop);

        assert_eq!(device.stats().samples, 3);
        assert_eq!(device.state(), DriverState::Stopped);
        assert_eq!(connector.closed(), 1);
    }

    #[test]
    fn run_returns_when_not_running() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);
        device.run(&StopHandle::new());
        assert_eq!(device.state(), DriverState::Stopped);
        assert_eq!(device.stats().read_timing.count, 0);
    }

    #[test]
    fn print_info_reports_counters() {
        let connector = ScriptedConnector::new();
        let mut device = device(&connector);
        device.start().unwrap();
        connector.push_bytes(&frame(1753));
        device.tick();
        device.tick();

        let stats = device.print_info();
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.comms_errors, 1);
        assert!(stats.to_string().contains("com_err: 1"));
    }

    #[test]
    fn samples_can_be_sent_over_a_channel() {
        let connector = ScriptedConnector::new();
        let (tx, rx) = std::sync::mpsc::channel::<RangeSample>();
        let mut device = Hps167Device::with_connector(config(), connector.clone(), tx);
        device.start().unwrap();
        connector.push_bytes(&frame(1753));
        device.tick();

        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.rotation, Rotation::Forward);
    }

    #[test]
    fn samples_dropped_after_receiver_hangs_up() {
        let connector = ScriptedConnector::new();
        let (tx, rx) = std::sync::mpsc::channel::<RangeSample>();
        let mut device = Hps167Device::with_connector(config(), connector.clone(), tx);
        device.start().unwrap();
        drop(rx);

        connector.push_bytes(&frame(1753));
        device.tick();

        assert_eq!(device.stats().samples, 1);
        assert_eq!(device.stats().comms_errors, 0);
        assert!(device.is_running());
    }
}
