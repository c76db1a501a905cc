//! Per-sample signal conditioning.
//!
//! Raw accelerometer readings are damped with an incremental exponential
//! low-pass filter and reduced to one scalar, the magnitude of the filtered
//! vector. This runs once for every incoming reading: O(1), no allocation.

/// Euclidean magnitude of a three-dimensional vector.
pub fn magnitude(v: [f64; 3]) -> f64 {
    libm::sqrt(v[0] * v[0] + v[1] * v[1] + v[2] * v[2])
}

/// Exponential smoothing filter over 3-axis readings.
///
/// Owns the filter state exclusively; nothing else reads or writes the
/// previous reading.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    /// Weight of the new reading. Range: (0.0, 1.0]. Typical: 0.1.
    alpha: f64,
    /// Last filtered reading [x, y, z].
    previous: [f64; 3],
}

impl SignalConditioner {
    /// Create a conditioner with the filter state at rest (all zeros).
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            previous: [0.0; 3],
        }
    }

    /// Filter a raw reading and return the conditioned magnitude.
    ///
    /// filtered = α·raw + (1-α)·previous, stored as the next previous.
    pub fn condition(&mut self, raw: [f64; 3]) -> f64 {
        let alpha = self.alpha;
        let conjugate = 1.0 - alpha;

        self.previous[0] = raw[0] * alpha + self.previous[0] * conjugate;
        self.previous[1] = raw[1] * alpha + self.previous[1] * conjugate;
        self.previous[2] = raw[2] * alpha + self.previous[2] * conjugate;

        magnitude(self.previous)
    }

    /// The last filtered reading.
    pub fn last_filtered(&self) -> [f64; 3] {
        self.previous
    }

    /// Magnitude of the last filtered reading.
    pub fn last_magnitude(&self) -> f64 {
        magnitude(self.previous)
    }
}
