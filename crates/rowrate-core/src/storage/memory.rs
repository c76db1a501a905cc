//! In-memory track store
//!
//! Holds committed points in a vector behind a critical-section mutex. Used
//! by tests and as a volatile fallback when no persistent medium is present.

extern crate alloc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use super::{SessionId, SessionSummary, StoreError, TrackPoint, TrackStore, summarize};

pub struct MemoryTrackStore {
    points: Mutex<CriticalSectionRawMutex, RefCell<Vec<TrackPoint>>>,
}

impl MemoryTrackStore {
    pub const fn new() -> Self {
        Self {
            points: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Number of committed points over all sessions.
    pub fn len(&self) -> usize {
        self.points.lock(|points| points.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTrackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackStore for MemoryTrackStore {
    fn insert(&self, point: &TrackPoint) -> Result<u32, StoreError> {
        self.points.lock(|points| {
            let mut points = points.borrow_mut();
            let point_id = points.len() as u32 + 1;
            points.push(TrackPoint { point_id, ..*point });
            Ok(point_id)
        })
    }

    fn last_session_id(&self) -> Result<Option<SessionId>, StoreError> {
        Ok(self
            .points
            .lock(|points| points.borrow().iter().map(|p| p.session_id).max()))
    }

    fn load_session(&self, session_id: SessionId) -> Result<Vec<TrackPoint>, StoreError> {
        let mut session: Vec<TrackPoint> = self.points.lock(|points| {
            points
                .borrow()
                .iter()
                .filter(|p| p.session_id == session_id)
                .copied()
                .collect()
        });
        session.sort_by_key(|p| p.point_id);
        Ok(session)
    }

    fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        Ok(self.points.lock(|points| summarize(&points.borrow())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let store = MemoryTrackStore::new();
        assert!(store.is_empty());
        assert_eq!(store.last_session_id(), Ok(None));

        assert_eq!(store.insert(&TrackPoint::new(1, 0, 20.0)), Ok(1));
        assert_eq!(store.insert(&TrackPoint::new(1, 1_000, 22.0)), Ok(2));
        assert_eq!(store.insert(&TrackPoint::new(4, 9_000, 0.0)), Ok(3));

        assert_eq!(store.len(), 3);
        assert_eq!(store.last_session_id(), Ok(Some(4)));
    }

    #[test]
    fn test_load_session_filters_and_orders() {
        let store = MemoryTrackStore::new();
        store.insert(&TrackPoint::new(1, 0, 20.0)).unwrap();
        store.insert(&TrackPoint::new(2, 50, 21.0)).unwrap();
        store.insert(&TrackPoint::new(1, 1_000, 22.0)).unwrap();

        let session = store.load_session(1).unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session[0].point_id, 1);
        assert_eq!(session[1].point_id, 3);
        assert_eq!(session[1].stroke_rate, 22.0);

        assert!(store.load_session(9).unwrap().is_empty());
    }

    #[test]
    fn test_sessions_listing() {
        let store = MemoryTrackStore::new();
        store.insert(&TrackPoint::new(1, 100, 20.0)).unwrap();
        store.insert(&TrackPoint::new(2, 7_000, 21.0)).unwrap();
        store.insert(&TrackPoint::new(2, 8_000, 21.0)).unwrap();

        let sessions = store.sessions().unwrap();
        assert_eq!(
            sessions,
            vec![
                SessionSummary {
                    session_id: 2,
                    started_ms: 7_000,
                },
                SessionSummary {
                    session_id: 1,
                    started_ms: 100,
                },
            ]
        );
    }
}
