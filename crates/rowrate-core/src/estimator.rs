//! Stroke rate estimation engine
//!
//! [`RateEstimator`] owns the sample window and ties the pieces together:
//! readings are conditioned and appended as they arrive, and once per cycle
//! the window is scored by autocorrelation, the resulting rate is smoothed
//! over the last few cycles, recorded if a session is active, and published.
//!
//! Shared state sits behind critical-section mutexes so producers can call
//! in from any task or interrupt context. Each lock is held only for a copy
//! or an append; the O(N²) scoring runs on a snapshot outside the lock.
//!
//! ```rust,ignore
//! static EVENTS: EventChannel = EventChannel::new();
//! static POINTS: PointQueue = PointQueue::new();
//! static STORE: MemoryTrackStore = MemoryTrackStore::new();
//!
//! let engine = RateEstimator::new(EngineConfig::default(), EmbassyClock, &STORE, &EVENTS, &POINTS)?;
//! engine.add_accelerometer_reading(0.4, 0.1, 9.7);
//! engine.run().await;
//! ```

extern crate alloc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::TrySendError;
use embassy_time::{Duration, Ticker, Timer};
use log::{debug, error, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::autocorrelation::{best_lag, frequency_scores};
use crate::buffer::RingBuffer;
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::events::{EngineEvent, EventChannel, EventPublisher, PointQueue, PointSender};
use crate::session::{GpsFix, SessionTracker};
use crate::signal::SignalConditioner;
use crate::storage::{SessionId, TrackPoint, TrackStore};

/// Conditioner plus the parallel sample and timestamp windows.
struct SampleWindow {
    conditioner: SignalConditioner,
    /// Conditioned magnitudes, oldest first.
    samples: RingBuffer<f64>,
    /// Arrival time of each sample in seconds since engine start. Seed slots
    /// are back-dated at the nominal rate so they read as negative times.
    timestamps: RingBuffer<f64>,
}

struct RateState {
    history: RingBuffer<f64>,
    last_instant: f64,
    sampling_rate: f64,
}

pub struct RateEstimator<'a, S: TrackStore, C: Clock> {
    config: EngineConfig,
    clock: C,
    start_ms: u64,
    window: Mutex<CriticalSectionRawMutex, RefCell<SampleWindow>>,
    rates: Mutex<CriticalSectionRawMutex, RefCell<RateState>>,
    session: Mutex<CriticalSectionRawMutex, RefCell<SessionTracker>>,
    store: &'a S,
    events: EventPublisher<'a>,
    points: PointSender<'a>,
}

/// Samples per second covered by a window spanning `oldest..=newest` seconds.
fn sampling_rate(len: usize, oldest: f64, newest: f64) -> f64 {
    let span = newest - oldest;
    if span > 0.0 { len as f64 / span } else { 0.0 }
}

/// Strokes per minute for a window, 0 when no periodicity can be found.
fn instant_rate(samples: &[f64], sampling_rate: f64, config: &EngineConfig) -> f64 {
    if !(sampling_rate > 0.0) {
        return 0.0;
    }

    // A stroke cannot be shorter than this many samples
    let min_lag = libm::floor(sampling_rate * 60.0 / config.max_rate_spm) as usize;
    let scores = frequency_scores(samples, config.min_window);

    match best_lag(&scores, min_lag) {
        Some(lag) if lag > 0 && scores[lag] > 0.0 => 60.0 / lag as f64 * sampling_rate,
        _ => 0.0,
    }
}

impl<'a, S: TrackStore, C: Clock> RateEstimator<'a, S, C> {
    pub fn new(
        config: EngineConfig,
        clock: C,
        store: &'a S,
        events: &'a EventChannel,
        points: &'a PointQueue,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let capacity = config.buffer_capacity();
        let amplitude = config.seed_amplitude;
        let nominal_hz = config.nominal_sample_rate_hz as f64;
        let mut rng = SmallRng::seed_from_u64(config.seed);

        // Seed with low-level noise so the window is never perfectly flat.
        // The newest seed sits one nominal period before engine start, so a
        // partly filled window still measures the true sampling rate.
        let window = SampleWindow {
            conditioner: SignalConditioner::new(config.smoothing_factor),
            samples: RingBuffer::from_fn(capacity, |_| rng.random::<f64>() * amplitude),
            timestamps: RingBuffer::from_fn(capacity, |i| {
                (i as f64 - capacity as f64) / nominal_hz
            }),
        };
        let rates = RateState {
            history: RingBuffer::with_capacity(config.rate_history_len),
            last_instant: 0.0,
            sampling_rate: 0.0,
        };
        let start_ms = clock.now_ms();

        Ok(Self {
            config,
            clock,
            start_ms,
            window: Mutex::new(RefCell::new(window)),
            rates: Mutex::new(RefCell::new(rates)),
            session: Mutex::new(RefCell::new(SessionTracker::new())),
            store,
            events: events.immediate_publisher(),
            points: points.sender(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn elapsed_secs(&self) -> f64 {
        self.clock.now_ms().saturating_sub(self.start_ms) as f64 / 1000.0
    }

    /// Condition a raw reading and append it to the window.
    pub fn add_accelerometer_reading(&self, x: f64, y: f64, z: f64) {
        let timestamp = self.elapsed_secs();
        self.window.lock(|window| {
            let mut window = window.borrow_mut();
            let magnitude = window.conditioner.condition([x, y, z]);
            window.samples.push(magnitude);
            window.timestamps.push(timestamp);
        });
    }

    /// Feed a position fix to the session and publish the running distance.
    pub fn add_gps_reading(&self, fix: GpsFix) {
        let total_distance_m = self
            .session
            .lock(|session| session.borrow_mut().on_fix(fix));
        self.events.publish_immediate(EngineEvent::LocationUpdate {
            fix,
            total_distance_m,
        });
    }

    /// Recompute the stroke rate and return the smoothed value.
    pub fn run_cycle(&self) -> f64 {
        let epsilon = self.config.stillness_epsilon;

        // Snapshot, or None when the boat is still
        let snapshot: Option<(Vec<f64>, f64)> = self.window.lock(|window| {
            let window = window.borrow();
            if window.samples.average() < epsilon
                && window.conditioner.last_magnitude() < epsilon
            {
                return None;
            }

            let rate = match (window.timestamps.oldest(), window.timestamps.newest()) {
                (Some(&oldest), Some(&newest)) => {
                    sampling_rate(window.timestamps.len(), oldest, newest)
                }
                _ => 0.0,
            };
            Some((window.samples.to_vec(), rate))
        });

        let (instant, sample_rate) = match snapshot {
            Some((samples, sample_rate)) => (
                instant_rate(&samples, sample_rate, &self.config),
                Some(sample_rate),
            ),
            None => (0.0, None),
        };

        let smoothed = self.rates.lock(|rates| {
            let mut rates = rates.borrow_mut();
            rates.history.push(instant);
            rates.last_instant = instant;
            if let Some(sample_rate) = sample_rate {
                rates.sampling_rate = sample_rate;
            }
            rates.history.average()
        });

        match sample_rate {
            Some(hz) => debug!(
                "Cycle: {:.1} spm instant, {:.1} spm smoothed at {:.1} Hz",
                instant, smoothed, hz
            ),
            None => debug!("Cycle: still, {:.1} spm smoothed", smoothed),
        }

        if sample_rate.is_some() {
            self.record(smoothed);
        }

        self.events.publish_immediate(EngineEvent::RateUpdate(smoothed));
        smoothed
    }

    /// Queue a point for the active session, if any.
    fn record(&self, stroke_rate: f64) {
        let now_ms = self.clock.now_ms();
        let staleness = self.config.gps_staleness_ms;

        let point = self.session.lock(|session| {
            let session = session.borrow();
            if !session.is_recording() {
                return None;
            }
            let session_id = session.current_session()?;

            let mut point = TrackPoint::new(session_id, now_ms, stroke_rate);
            if let Some(fix) = session.last_fix() {
                if now_ms.saturating_sub(fix.timestamp_ms) <= staleness {
                    point.latitude = Some(fix.latitude);
                    point.longitude = Some(fix.longitude);
                    point.speed = Some(fix.speed);
                }
            }
            Some(point)
        });

        if let Some(point) = point {
            if let Err(TrySendError::Full(point)) = self.points.try_send(point) {
                warn!(
                    "Persistence queue full, dropping point of session {}",
                    point.session_id
                );
            }
        }
    }

    /// Wait out the warm-up delay, then run a cycle every period. Never returns.
    pub async fn run(&self) {
        Timer::after(Duration::from_millis(self.config.initial_delay_ms)).await;

        let mut ticker = Ticker::every(Duration::from_millis(self.config.cycle_period_ms));
        loop {
            self.run_cycle();
            ticker.next().await;
        }
    }

    /// Mean of the recent instantaneous rates in strokes per minute.
    pub fn current_smoothed_rate(&self) -> f64 {
        self.rates.lock(|rates| rates.borrow().history.average())
    }

    /// Unsmoothed rate of the last cycle.
    pub fn last_instant_rate(&self) -> f64 {
        self.rates.lock(|rates| rates.borrow().last_instant)
    }

    /// Sampling rate measured over the window during the last scored cycle.
    pub fn sampling_rate(&self) -> f64 {
        self.rates.lock(|rates| rates.borrow().sampling_rate)
    }

    /// Begin a recording session. Returns `false` if one is already running
    /// or the store cannot be queried.
    ///
    /// The store is queried before the session lock is taken.
    pub fn start_recording(&self) -> bool {
        if self.is_recording() {
            return false;
        }

        let stored = match self.store.last_session_id() {
            Ok(id) => id,
            Err(e) => {
                error!("Cannot start recording, session lookup failed: {}", e);
                return false;
            }
        };

        self.session
            .lock(|session| session.borrow_mut().begin(stored))
    }

    pub fn stop_recording(&self) -> bool {
        self.session.lock(|session| session.borrow_mut().stop())
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock(|session| session.borrow().is_recording())
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.session
            .lock(|session| session.borrow().current_session())
    }

    /// Distance of the current (or last) session in metres.
    pub fn total_distance(&self) -> f64 {
        self.session.lock(|session| session.borrow().total_distance())
    }
}
