/// Length byte carried by every ranging response (13 data bytes follow the start byte and itself).
pub const HPS167_ANS_DATA_LEN: u8 = 0x0D;

/// Total size of a ranging response frame, CRC included.
pub const HPS167_ANS_FRAME_LEN: usize = 15;

// Field offsets within a ranging response frame.
pub const HPS167_ANS_LEN_POS: usize = 1;
pub const HPS167_ANS_DISTANCE_POS: usize = 5;
pub const HPS167_ANS_MAGNITUDE_POS: usize = 7;
pub const HPS167_ANS_MAGNITUDE_EXP_POS: usize = 9;
pub const HPS167_ANS_AMBIENT_POS: usize = 10;
pub const HPS167_ANS_PRECISION_POS: usize = 11;
pub const HPS167_ANS_CRC_POS: usize = 13;

/// First byte covered by the response CRC. The start and length bytes are excluded.
pub const HPS167_ANS_CRC_START: usize = 2;

/// Raw distance reported when the target is out of range or the return signal is too weak (65.53 m).
pub const HPS167_ANS_DISTANCE_OVER_RANGE_MM: u16 = 65530;

/// Decoded contents of a ranging response frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RangingResponse {
    /// Measured distance in millimeters.
    pub distance_mm: u16,
    /// Mantissa of the return signal magnitude.
    pub magnitude: u16,
    /// Left shift applied to `magnitude`.
    pub magnitude_exp: u8,
    /// Relative ambient IR intensity.
    pub ambient: u8,
    /// Measurement precision. Smaller values mean smaller measurement error.
    pub precision: u16,
}

impl RangingResponse {
    /// Returns the distance in meters.
    #[inline]
    pub fn distance(&self) -> f32 {
        self.distance_mm as f32 / 1000f32
    }

    /// Returns the scaled return signal magnitude.
    #[inline]
    pub fn magnitude(&self) -> f32 {
        ((self.magnitude as u64) << self.magnitude_exp.min(32)) as f32 / 10000f32
    }

    /// Returns `true` if the sensor flagged this measurement as over range.
    #[inline]
    pub fn is_over_range(&self) -> bool {
        self.distance_mm == HPS167_ANS_DISTANCE_OVER_RANGE_MM
    }
}
