mod error;
mod interval;
mod link;
#[cfg(test)]
pub(crate) mod mock;
mod traits;

pub use self::error::{Error, Result};
pub use self::interval::{Interval, StopHandle};
pub use self::link::{SerialLink, SystemSerial};
pub use self::traits::{RangeSink, SerialConnector};
