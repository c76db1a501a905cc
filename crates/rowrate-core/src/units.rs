//! Rowing unit conversions
//!
//! Splits are quoted as time per 500 m. Power follows the Concept2 erg
//! relation `watts = 2.80 / pace³`, with pace in seconds per metre.

use alloc::string::String;
use core::fmt::Write;

/// Speeds below this (slower than a 10:25 split) are shown as a zero split.
pub const MIN_SPLIT_SPEED: f32 = 0.8;

/// Degrees to semicircles: 2³² / 360, truncated.
pub const SEMICIRCLES_PER_DEGREE: f64 = 11_930_465.0;

/// Seconds needed to cover 500 m at `speed` m/s.
pub fn speed_to_seconds_per_500(speed: f32) -> f32 {
    500.0 / speed
}

/// Format a split as `m:ss.s`, e.g. 4 m/s is `2:05.0`.
pub fn format_split(speed: f32) -> String {
    let mut out = String::new();
    if !(speed >= MIN_SPLIT_SPEED) {
        out.push_str("0:00.0");
        return out;
    }

    // Round to tenths first so 59.96 s does not print as 0:60.0
    let tenths = libm::round(speed_to_seconds_per_500(speed) as f64 * 10.0) as u64;
    let minutes = (tenths / 600) % 60;
    let seconds = (tenths % 600) as f64 / 10.0;
    let _ = write!(out, "{}:{:04.1}", minutes, seconds);
    out
}

/// Seconds per metre.
pub fn speed_to_pace(speed: f32) -> f32 {
    1.0 / speed
}

pub fn pace_to_watts(pace: f32) -> f64 {
    let pace = pace as f64;
    2.80 / (pace * pace * pace)
}

pub fn speed_to_watts(speed: f32) -> f64 {
    pace_to_watts(speed_to_pace(speed))
}

/// Integer position encoding used by activity files.
pub fn degrees_to_semicircles(degrees: f64) -> i32 {
    (degrees * SEMICIRCLES_PER_DEGREE) as i32
}
