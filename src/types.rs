use crate::base::Error;
use crate::internals::*;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Mounting orientation of the sensor relative to the vehicle body.
///
/// Discriminants follow the MAVLink `MAV_SENSOR_ORIENTATION` numbering used by
/// distance sensor messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Rotation {
    Forward = 0,
    ForwardRight = 1,
    Right = 2,
    BackwardRight = 3,
    Backward = 4,
    BackwardLeft = 5,
    Left = 6,
    ForwardLeft = 7,
    Upward = 24,
    #[default]
    Downward = 25,
}

impl Rotation {
    const ALL: [Rotation; 10] = [
        Rotation::Forward,
        Rotation::ForwardRight,
        Rotation::Right,
        Rotation::BackwardRight,
        Rotation::Backward,
        Rotation::BackwardLeft,
        Rotation::Left,
        Rotation::ForwardLeft,
        Rotation::Upward,
        Rotation::Downward,
    ];

    /// Returns the lowercase name accepted by `FromStr`.
    pub fn name(self) -> &'static str {
        match self {
            Rotation::Forward => "forward",
            Rotation::ForwardRight => "forward-right",
            Rotation::Right => "right",
            Rotation::BackwardRight => "backward-right",
            Rotation::Backward => "backward",
            Rotation::BackwardLeft => "backward-left",
            Rotation::Left => "left",
            Rotation::ForwardLeft => "forward-left",
            Rotation::Upward => "upward",
            Rotation::Downward => "downward",
        }
    }
}

impl TryFrom<u8> for Rotation {
    type Error = Error;

    fn try_from(value: u8) -> Result<Rotation, Error> {
        Rotation::ALL
            .iter()
            .copied()
            .find(|r| *r as u8 == value)
            .ok_or_else(|| Error::InvalidParameter {
                description: format!("unknown rotation {}", value),
            })
    }
}

impl FromStr for Rotation {
    type Err = Error;

    /// Accepts either the lowercase name or the numeric value.
    fn from_str(s: &str) -> Result<Rotation, Error> {
        let s = s.trim();
        if let Ok(value) = s.parse::<u8>() {
            return Rotation::try_from(value);
        }
        Rotation::ALL
            .iter()
            .copied()
            .find(|r| r.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidParameter {
                description: format!("unknown rotation '{}'", s),
            })
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded distance measurement, as published by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSample {
    /// Monotonic time the bytes of this sample were read.
    pub timestamp: Instant,
    /// Distance in meters. The over-range indication (65.53 m) is passed through unchanged.
    pub distance: f32,
    /// Precision reported by the sensor. Smaller is better.
    pub signal_quality: u16,
    /// Mounting orientation configured for the driver.
    pub rotation: Rotation,
    /// Closest distance the sensor reports reliably, in meters.
    pub min_distance: f32,
    /// Farthest distance the sensor reports reliably, in meters.
    pub max_distance: f32,
}

impl RangeSample {
    /// Returns `true` if the distance lies within the sensor's reliable range.
    #[inline]
    pub fn is_in_range(&self) -> bool {
        self.distance >= self.min_distance && self.distance <= self.max_distance
    }
}

/// Driver settings, read once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Serial device path.
    pub port: String,
    /// Line speed in bits per second.
    pub baud_rate: u32,
    /// Mounting orientation attached to every sample.
    pub rotation: Rotation,
    /// Polling period.
    pub measure_interval: Duration,
    /// How long `init()` waits for the sensor to answer.
    pub probe_timeout: Duration,
}

impl DriverConfig {
    /// Creates a configuration for `port` with default settings.
    pub fn new(port: impl Into<String>) -> DriverConfig {
        DriverConfig {
            port: port.into(),
            ..DriverConfig::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> DriverConfig {
        self.rotation = rotation;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> DriverConfig {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_measure_interval(mut self, interval: Duration) -> DriverConfig {
        self.measure_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> DriverConfig {
        self.probe_timeout = timeout;
        self
    }
}

impl Default for DriverConfig {
    /// Default port, 115200 baud, downward facing, 50 Hz polling, 500 ms probe.
    fn default() -> DriverConfig {
        DriverConfig {
            port: HPS167_DEFAULT_PORT.to_owned(),
            baud_rate: HPS167_DEFAULT_BAUD_RATE,
            rotation: Rotation::default(),
            measure_interval: HPS167_MEASURE_INTERVAL,
            probe_timeout: HPS167_DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Elapsed-time statistics of the read cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingStats {
    pub count: u64,
    pub total: Duration,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl TimingStats {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = Some(self.max.map_or(elapsed, |m| m.max(elapsed)));
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.count == 0 {
            None
        } else {
            Some(Duration::from_nanos(
                (self.total.as_nanos() / self.count as u128) as u64,
            ))
        }
    }
}

/// Counters accumulated by the driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverStats {
    /// Samples published.
    pub samples: u64,
    /// Cycles that produced no sample because of a decode or I/O failure.
    pub comms_errors: u64,
    /// Time spent in each read cycle.
    pub read_timing: TimingStats,
}

impl fmt::Display for DriverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "samples: {}, com_err: {}, read: {} events",
            self.samples, self.comms_errors, self.read_timing.count
        )?;
        if let (Some(mean), Some(min), Some(max)) = (
            self.read_timing.mean(),
            self.read_timing.min,
            self.read_timing.max,
        ) {
            write!(f, ", avg {:?} min {:?} max {:?}", mean, min, max)?;
        }
        Ok(())
    }
}
