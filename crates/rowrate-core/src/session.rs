//! Recording sessions and GPS distance
//!
//! A session starts Idle. `start` allocates a fresh session id and begins
//! accumulating distance; `stop` returns to Idle and leaves everything that
//! was recorded untouched. Repeated starts or stops are no-ops that return
//! `false`.

use log::{error, info};

use crate::storage::{SessionId, TrackStore};

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    /// Degrees, positive north.
    pub latitude: f64,
    /// Degrees, positive east.
    pub longitude: f64,
    /// Speed over ground in m/s.
    pub speed: f32,
    /// Clock time the fix was received, in milliseconds.
    pub timestamp_ms: u64,
}

/// Great-circle distance between two fixes in metres (haversine).
pub fn great_circle_distance(from: &GpsFix, to: &GpsFix) -> f64 {
    haversine(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Haversine distance between two positions given in degrees.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let sin_phi = libm::sin(d_phi / 2.0);
    let sin_lambda = libm::sin(d_lambda / 2.0);
    let a = sin_phi * sin_phi + libm::cos(phi1) * libm::cos(phi2) * sin_lambda * sin_lambda;
    let c = 2.0 * libm::atan2(libm::sqrt(a), libm::sqrt(1.0 - a));

    EARTH_RADIUS_M * c
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
}

/// Running distance over consecutive fixes.
#[derive(Debug, Clone, Default)]
pub struct GpsAccumulator {
    total_m: f64,
    previous: Option<GpsFix>,
}

impl GpsAccumulator {
    /// Forget the previous fix and zero the distance.
    pub fn reset(&mut self) {
        self.total_m = 0.0;
        self.previous = None;
    }

    /// Add the leg from the previous fix to `fix` and return the total.
    pub fn add(&mut self, fix: GpsFix) -> f64 {
        if let Some(previous) = self.previous {
            self.total_m += great_circle_distance(&previous, &fix);
        }
        self.previous = Some(fix);
        self.total_m
    }

    pub fn total(&self) -> f64 {
        self.total_m
    }
}

#[derive(Debug, Default)]
pub struct SessionTracker {
    state: RecordingState,
    current: Option<SessionId>,
    /// Highest id this tracker handed out. Guards against reusing an id whose
    /// points are still waiting in the persistence queue.
    last_allocated: Option<SessionId>,
    distance: GpsAccumulator,
    last_fix: Option<GpsFix>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new session. Returns `false` if already recording or if the
    /// store cannot tell which ids are taken.
    pub fn start(&mut self, store: &impl TrackStore) -> bool {
        if self.state == RecordingState::Recording {
            return false;
        }

        match store.last_session_id() {
            Ok(stored) => self.begin(stored),
            Err(e) => {
                error!("Cannot start recording, session lookup failed: {}", e);
                false
            }
        }
    }

    /// Begin a new session given the highest id already in the store.
    /// Returns `false` if already recording.
    pub fn begin(&mut self, stored: Option<SessionId>) -> bool {
        if self.state == RecordingState::Recording {
            return false;
        }

        let id = stored.max(self.last_allocated).map_or(1, |last| last + 1);
        self.last_allocated = Some(id);
        self.current = Some(id);
        self.distance.reset();
        self.state = RecordingState::Recording;

        info!("Recording session {}", id);
        true
    }

    /// End the current session. Returns `false` if not recording.
    pub fn stop(&mut self) -> bool {
        if self.state == RecordingState::Idle {
            return false;
        }

        self.state = RecordingState::Idle;
        info!(
            "Stopped session {:?} after {:.0} m",
            self.current,
            self.distance.total()
        );
        true
    }

    /// Record a fix and return the session distance in metres.
    ///
    /// Distance only grows while recording; the fix is remembered either way.
    pub fn on_fix(&mut self, fix: GpsFix) -> f64 {
        self.last_fix = Some(fix);
        if self.state == RecordingState::Recording {
            self.distance.add(fix)
        } else {
            self.distance.total()
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// Session being recorded, or the last one once stopped.
    pub fn current_session(&self) -> Option<SessionId> {
        self.current
    }

    pub fn total_distance(&self) -> f64 {
        self.distance.total()
    }

    pub fn last_fix(&self) -> Option<GpsFix> {
        self.last_fix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryTrackStore, SessionSummary, StoreError, TrackPoint};

    struct BrokenStore;

    impl TrackStore for BrokenStore {
        fn insert(&self, _point: &TrackPoint) -> Result<u32, StoreError> {
            Err(StoreError::Encode)
        }
        fn last_session_id(&self) -> Result<Option<SessionId>, StoreError> {
            Err(StoreError::io("unreadable"))
        }
        fn load_session(&self, _id: SessionId) -> Result<Vec<TrackPoint>, StoreError> {
            Ok(Vec::new())
        }
        fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn fix(latitude: f64, longitude: f64, timestamp_ms: u64) -> GpsFix {
        GpsFix {
            latitude,
            longitude,
            speed: 4.0,
            timestamp_ms,
        }
    }

    #[test]
    fn test_haversine_known_distances() {
        // One degree of latitude
        let d = haversine(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 1.0, "got {d}");

        assert_eq!(haversine(51.5, -0.12, 51.5, -0.12), 0.0);

        // London to Paris, about 343.5 km
        let d = haversine(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 343_556.0).abs() < 500.0, "got {d}");
    }

    #[test]
    fn test_first_session_is_one() {
        let store = MemoryTrackStore::new();
        let mut tracker = SessionTracker::new();

        assert!(tracker.start(&store));
        assert!(tracker.is_recording());
        assert_eq!(tracker.current_session(), Some(1));
    }

    #[test]
    fn test_session_id_follows_store() {
        let store = MemoryTrackStore::new();
        store.insert(&TrackPoint::new(7, 0, 20.0)).unwrap();
        let mut tracker = SessionTracker::new();

        assert!(tracker.start(&store));
        assert_eq!(tracker.current_session(), Some(8));
    }

    #[test]
    fn test_unpersisted_session_id_is_not_reused() {
        let store = MemoryTrackStore::new();
        let mut tracker = SessionTracker::new();

        assert!(tracker.start(&store));
        assert!(tracker.stop());
        // Nothing reached the store, yet the next id must still advance
        assert!(tracker.start(&store));
        assert_eq!(tracker.current_session(), Some(2));
    }

    #[test]
    fn test_begin_with_a_stale_lookup() {
        let mut tracker = SessionTracker::new();
        assert!(tracker.begin(Some(4)));
        assert_eq!(tracker.current_session(), Some(5));
        assert!(!tracker.begin(Some(9)));
        tracker.stop();

        // A lookup taken before session 5 was allocated must not reuse it
        assert!(tracker.begin(Some(3)));
        assert_eq!(tracker.current_session(), Some(6));
    }

    #[test]
    fn test_repeated_transitions_are_rejected() {
        let store = MemoryTrackStore::new();
        let mut tracker = SessionTracker::new();

        assert!(!tracker.stop());
        assert!(tracker.start(&store));
        assert!(!tracker.start(&store));
        assert_eq!(tracker.current_session(), Some(1));

        assert!(tracker.stop());
        assert!(!tracker.stop());
        assert_eq!(tracker.state(), RecordingState::Idle);
        assert_eq!(tracker.current_session(), Some(1));
    }

    #[test]
    fn test_store_failure_keeps_idle() {
        let mut tracker = SessionTracker::new();

        assert!(!tracker.start(&BrokenStore));
        assert!(!tracker.is_recording());
        assert_eq!(tracker.current_session(), None);
    }

    #[test]
    fn test_distance_accumulates_while_recording() {
        let store = MemoryTrackStore::new();
        let mut tracker = SessionTracker::new();

        let a = fix(51.4600, -0.2200, 0);
        let b = fix(51.4610, -0.2200, 1_000);
        let c = fix(51.4610, -0.2185, 2_000);

        // Idle fixes do not count
        assert_eq!(tracker.on_fix(a), 0.0);
        assert_eq!(tracker.last_fix(), Some(a));

        assert!(tracker.start(&store));
        assert_eq!(tracker.on_fix(a), 0.0);
        let after_b = tracker.on_fix(b);
        let total = tracker.on_fix(c);

        let expected = great_circle_distance(&a, &b) + great_circle_distance(&b, &c);
        assert!((after_b - great_circle_distance(&a, &b)).abs() < 1e-9);
        assert!((total - expected).abs() < 1e-9);
        assert!(total > 100.0);

        // Stopping keeps the distance, a new session resets it
        assert!(tracker.stop());
        assert_eq!(tracker.on_fix(a), total);
        assert!(tracker.start(&store));
        assert_eq!(tracker.total_distance(), 0.0);
        assert_eq!(tracker.on_fix(c), 0.0);
    }
}
