//! Hardware-independent core library for rowrate
//!
//! This crate contains all platform-agnostic logic of the rowing stroke rate
//! monitor: sample conditioning, the circular sample store, autocorrelation
//! based cadence detection, recording sessions with GPS distance, the
//! persistence collaborator interface and activity export helpers.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod autocorrelation;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod estimator;
pub mod events;
pub mod export;
pub mod session;
pub mod signal;
pub mod storage;
pub mod units;

pub use crate::buffer::RingBuffer;
pub use crate::clock::{Clock, EmbassyClock, ManualClock};
pub use crate::config::{ConfigError, EngineConfig};
pub use crate::estimator::RateEstimator;
pub use crate::events::{EngineEvent, EventChannel, PointQueue};
pub use crate::session::{GpsFix, RecordingState, SessionTracker};
pub use crate::storage::{
    MemoryTrackStore, PersistenceWriter, SessionId, SessionSummary, StoreError, TrackPoint,
    TrackStore,
};
