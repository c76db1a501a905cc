//! Engine configuration
//!
//! All tunables of the estimation engine. The defaults were picked
//! empirically for a phone or IMU strapped to the boat, sampling near 50 Hz.

use thiserror_no_std::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Rough accelerometer rate, only used to size the sample window.
    pub nominal_sample_rate_hz: u32,
    /// How much history the sample window holds, roughly, in seconds.
    /// 10 s puts the slowest detectable cadence at 12 spm (Nyquist).
    pub buffer_seconds: u32,
    /// Weight of the new reading in the exponential low-pass filter.
    pub smoothing_factor: f64,
    /// Number of instantaneous rates averaged into the reported rate.
    pub rate_history_len: usize,
    /// Milliseconds between stroke rate recalculations.
    pub cycle_period_ms: u64,
    /// Milliseconds to wait before the first recalculation.
    pub initial_delay_ms: u64,
    /// Noise floor below which the boat is considered still.
    pub stillness_epsilon: f64,
    /// Fastest plausible cadence in strokes per minute.
    /// Bounds the shortest lag the autocorrelator may select.
    pub max_rate_spm: f64,
    /// Smallest window the autocorrelator will score.
    pub min_window: usize,
    /// GPS fixes older than this are not attached to recorded points.
    pub gps_staleness_ms: u64,
    /// Upper bound of the uniform noise the sample window is seeded with.
    pub seed_amplitude: f64,
    /// Seed for the window noise generator.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let buffer_seconds = 10;
        Self {
            nominal_sample_rate_hz: 50,
            buffer_seconds,
            smoothing_factor: 0.1,
            rate_history_len: 3,
            cycle_period_ms: 1000,
            initial_delay_ms: buffer_seconds as u64 * 1000 / 2,
            stillness_epsilon: 0.1,
            max_rate_spm: 60.0,
            min_window: crate::autocorrelation::MIN_WINDOW,
            gps_staleness_ms: 20_000,
            seed_amplitude: 0.05,
            seed: 0x5eed_0a75,
        }
    }
}

impl EngineConfig {
    /// Number of slots in the sample and timestamp windows.
    ///
    /// Autocorrelation works best when the window is a power of two.
    pub fn buffer_capacity(&self) -> usize {
        let wanted = self.nominal_sample_rate_hz as usize * self.buffer_seconds as usize;
        wanted.next_power_of_two()
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nominal_sample_rate_hz == 0 || self.buffer_seconds == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(ConfigError::SmoothingFactor);
        }
        if self.rate_history_len == 0 {
            return Err(ConfigError::EmptyRateHistory);
        }
        if self.cycle_period_ms == 0 {
            return Err(ConfigError::ZeroCyclePeriod);
        }
        if !(self.max_rate_spm > 0.0) {
            return Err(ConfigError::MaxRate);
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample window would be empty")]
    EmptyWindow,
    #[error("smoothing factor must be in (0, 1]")]
    SmoothingFactor,
    #[error("rate history needs at least one slot")]
    EmptyRateHistory,
    #[error("cycle period must be non-zero")]
    ZeroCyclePeriod,
    #[error("maximum stroke rate must be positive")]
    MaxRate,
}
