//! Persistence of recorded track points
//!
//! The engine never writes to storage directly. Points travel through the
//! persistence queue and a [`PersistenceWriter`] commits them to whatever
//! [`TrackStore`] the platform provides (flash log, file, memory).

mod memory;
pub mod record;
mod writer;

extern crate alloc;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

pub use memory::MemoryTrackStore;
pub use writer::PersistenceWriter;

/// Recording session identifier. Sessions are numbered from 1.
pub type SessionId = u32;

/// One processed sample of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub session_id: SessionId,
    /// Assigned by the store on insert, 0 until then.
    pub point_id: u32,
    /// Clock time in milliseconds.
    pub timestamp_ms: u64,
    /// Smoothed stroke rate in strokes per minute.
    pub stroke_rate: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Speed over ground in m/s.
    pub speed: Option<f32>,
}

impl TrackPoint {
    /// A point without location, as recorded when no fresh fix is known.
    pub fn new(session_id: SessionId, timestamp_ms: u64, stroke_rate: f64) -> Self {
        Self {
            session_id,
            point_id: 0,
            timestamp_ms,
            stroke_rate,
            latitude: None,
            longitude: None,
            speed: None,
        }
    }

    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Listing entry for a stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    /// Timestamp of the first point of the session.
    pub started_ms: u64,
}

/// Build the session listing out of a set of points, newest start first.
pub fn summarize(points: &[TrackPoint]) -> Vec<SessionSummary> {
    let mut summaries: Vec<SessionSummary> = Vec::new();
    for point in points {
        match summaries
            .iter_mut()
            .find(|summary| summary.session_id == point.session_id)
        {
            Some(summary) => summary.started_ms = summary.started_ms.min(point.timestamp_ms),
            None => summaries.push(SessionSummary {
                session_id: point.session_id,
                started_ms: point.timestamp_ms,
            }),
        }
    }
    summaries.sort_by(|a, b| {
        b.started_ms
            .cmp(&a.started_ms)
            .then(b.session_id.cmp(&a.session_id))
    });
    summaries
}

/// Store for committed track points.
///
/// Methods take `&self`; implementations guard their own state so one store
/// can be shared between the engine and the persistence writer.
pub trait TrackStore {
    /// Commit a point and return the point id assigned to it.
    fn insert(&self, point: &TrackPoint) -> Result<u32, StoreError>;

    /// Highest session id present in the store, if any.
    fn last_session_id(&self) -> Result<Option<SessionId>, StoreError>;

    /// All points of a session ordered by point id.
    fn load_session(&self, session_id: SessionId) -> Result<Vec<TrackPoint>, StoreError>;

    /// Stored sessions, newest start first.
    fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;
}

impl<S: TrackStore + ?Sized> TrackStore for &S {
    fn insert(&self, point: &TrackPoint) -> Result<u32, StoreError> {
        (**self).insert(point)
    }

    fn last_session_id(&self) -> Result<Option<SessionId>, StoreError> {
        (**self).last_session_id()
    }

    fn load_session(&self, session_id: SessionId) -> Result<Vec<TrackPoint>, StoreError> {
        (**self).load_session(session_id)
    }

    fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        (**self).sessions()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(heapless::String<64>),
    #[error("failed to encode track point")]
    Encode,
}

impl StoreError {
    /// I/O error carrying as much of `detail` as fits.
    pub fn io(detail: &str) -> Self {
        let mut message = heapless::String::new();
        for c in detail.chars() {
            if message.push(c).is_err() {
                break;
            }
        }
        StoreError::Io(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(session_id: SessionId, timestamp_ms: u64) -> TrackPoint {
        TrackPoint::new(session_id, timestamp_ms, 24.0)
    }

    #[test]
    fn test_summaries_are_newest_first() {
        let points = [point(1, 100), point(1, 200), point(2, 5_000), point(3, 2_000)];
        let summaries = summarize(&points);

        let ids: Vec<_> = summaries.iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(summaries[2].started_ms, 100);
    }

    #[test]
    fn test_io_error_detail_is_truncated() {
        let long = "x".repeat(200);
        match StoreError::io(&long) {
            StoreError::Io(detail) => assert_eq!(detail.len(), 64),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            StoreError::io("disk full"),
            StoreError::Io("disk full".try_into().unwrap())
        );
    }

    #[test]
    fn test_point_location() {
        let mut p = point(1, 0);
        assert!(!p.has_location());
        p.latitude = Some(51.5);
        p.longitude = Some(-0.12);
        assert!(p.has_location());
    }
}
