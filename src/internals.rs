use std::time::Duration;

/// Polling period of the driver (50 Hz, matching the sensor output rate).
pub const HPS167_MEASURE_INTERVAL: Duration = Duration::from_millis(20);

/// Line speed of the sensor's UART.
pub const HPS167_DEFAULT_BAUD_RATE: u32 = 115200;

/// Serial device used when none is configured.
pub const HPS167_DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// How long `init()` waits for the first valid frame.
pub const HPS167_DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between reads while probing, so an idle port is not polled in a busy loop.
pub const HPS167_PROBE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Closest distance the sensor reports reliably, in meters.
pub const HPS167_MIN_DISTANCE: f32 = 0.05;

/// Farthest distance the sensor reports reliably, in meters.
pub const HPS167_MAX_DISTANCE: f32 = 12.0;
