//! Activity export
//!
//! Converts a stored session into per-point activity records and a session
//! summary, then hands both to an [`ActivityExporter`]. The exporter decides
//! the file format; the core only prepares the values activity files carry
//! (cadence, speed, power and semicircle positions).

use alloc::vec::Vec;

use thiserror_no_std::Error;

use crate::session::haversine;
use crate::storage::{SessionId, StoreError, TrackPoint, TrackStore};
use crate::units::{degrees_to_semicircles, speed_to_watts};

/// One record of an exported activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityRecord {
    pub timestamp_ms: u64,
    /// Strokes per minute.
    pub cadence: f64,
    /// m/s
    pub speed: Option<f32>,
    /// Watts derived from speed.
    pub power: Option<u16>,
    pub position_lat: Option<i32>,
    pub position_long: Option<i32>,
}

impl ActivityRecord {
    pub fn from_point(point: &TrackPoint) -> Self {
        let power = point
            .speed
            .filter(|speed| *speed > 0.0)
            .map(|speed| libm::fmin(speed_to_watts(speed), u16::MAX as f64) as u16);

        Self {
            timestamp_ms: point.timestamp_ms,
            cadence: point.stroke_rate,
            speed: point.speed,
            power,
            position_lat: point.latitude.map(degrees_to_semicircles),
            position_long: point.longitude.map(degrees_to_semicircles),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivitySummary {
    pub session_id: SessionId,
    pub start_ms: u64,
    pub end_ms: u64,
    pub elapsed_ms: u64,
    pub record_count: usize,
    pub mean_stroke_rate: f64,
    pub max_stroke_rate: f64,
    /// Haversine distance over consecutive located points, in metres.
    pub distance_m: f64,
}

impl ActivitySummary {
    /// Summarize a session's points. `None` for an empty session.
    pub fn from_points(session_id: SessionId, points: &[TrackPoint]) -> Option<Self> {
        let first = points.first()?;
        let last = points.last()?;

        let mut distance_m = 0.0;
        let mut previous: Option<(f64, f64)> = None;
        for point in points {
            if let (Some(lat), Some(lon)) = (point.latitude, point.longitude) {
                if let Some((prev_lat, prev_lon)) = previous {
                    distance_m += haversine(prev_lat, prev_lon, lat, lon);
                }
                previous = Some((lat, lon));
            }
        }

        let total_rate: f64 = points.iter().map(|p| p.stroke_rate).sum();
        let max_stroke_rate = points
            .iter()
            .map(|p| p.stroke_rate)
            .fold(0.0, libm::fmax);

        Some(Self {
            session_id,
            start_ms: first.timestamp_ms,
            end_ms: last.timestamp_ms,
            elapsed_ms: last.timestamp_ms.saturating_sub(first.timestamp_ms),
            record_count: points.len(),
            mean_stroke_rate: total_rate / points.len() as f64,
            max_stroke_rate,
            distance_m,
        })
    }
}

/// Destination for exported activities, such as an activity file writer.
pub trait ActivityExporter {
    type Error;

    fn export(
        &mut self,
        summary: &ActivitySummary,
        records: &[ActivityRecord],
    ) -> Result<(), Self::Error>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError<E> {
    #[error("session has no recorded points")]
    EmptySession,
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("exporter failed")]
    Exporter(E),
}

impl<E> From<StoreError> for ExportError<E> {
    fn from(e: StoreError) -> Self {
        ExportError::Store(e)
    }
}

/// Load a session from `store` and pass it to `exporter`.
pub fn export_session<S, X>(
    store: &S,
    exporter: &mut X,
    session_id: SessionId,
) -> Result<ActivitySummary, ExportError<X::Error>>
where
    S: TrackStore + ?Sized,
    X: ActivityExporter,
{
    let points = store.load_session(session_id)?;
    let summary =
        ActivitySummary::from_points(session_id, &points).ok_or(ExportError::EmptySession)?;
    let records: Vec<ActivityRecord> = points.iter().map(ActivityRecord::from_point).collect();

    exporter
        .export(&summary, &records)
        .map_err(ExportError::Exporter)?;

    log::info!(
        "Exported session {} ({} records, {:.0} m)",
        session_id,
        summary.record_count,
        summary.distance_m
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTrackStore;

    #[derive(Default)]
    struct Collect {
        summaries: Vec<ActivitySummary>,
        records: Vec<ActivityRecord>,
    }

    impl ActivityExporter for Collect {
        type Error = ();

        fn export(
            &mut self,
            summary: &ActivitySummary,
            records: &[ActivityRecord],
        ) -> Result<(), ()> {
            self.summaries.push(*summary);
            self.records.extend_from_slice(records);
            Ok(())
        }
    }

    struct Refuse;

    impl ActivityExporter for Refuse {
        type Error = &'static str;

        fn export(&mut self, _: &ActivitySummary, _: &[ActivityRecord]) -> Result<(), Self::Error> {
            Err("disk full")
        }
    }

    fn located(timestamp_ms: u64, rate: f64, latitude: f64) -> TrackPoint {
        TrackPoint {
            latitude: Some(latitude),
            longitude: Some(-0.22),
            speed: Some(4.0),
            ..TrackPoint::new(1, timestamp_ms, rate)
        }
    }

    #[test]
    fn test_record_from_point() {
        let record = ActivityRecord::from_point(&located(5_000, 28.0, 1.0));
        assert_eq!(record.cadence, 28.0);
        assert_eq!(record.power, Some(179));
        assert_eq!(record.position_lat, Some(11_930_465));
        assert_eq!(record.position_long, Some(degrees_to_semicircles(-0.22)));

        let bare = ActivityRecord::from_point(&TrackPoint::new(1, 0, 0.0));
        assert_eq!(bare.power, None);
        assert_eq!(bare.position_lat, None);
    }

    #[test]
    fn test_summary() {
        let points = [
            located(1_000, 20.0, 51.4600),
            TrackPoint::new(1, 2_000, 30.0),
            located(3_000, 34.0, 51.4610),
        ];
        let summary = ActivitySummary::from_points(1, &points).unwrap();

        assert_eq!(summary.elapsed_ms, 2_000);
        assert_eq!(summary.record_count, 3);
        assert_eq!(summary.mean_stroke_rate, 28.0);
        assert_eq!(summary.max_stroke_rate, 34.0);
        // Unlocated point is skipped, 0.001 degrees of latitude remain
        assert!((summary.distance_m - 111.19).abs() < 0.1);

        assert_eq!(ActivitySummary::from_points(1, &[]), None);
    }

    #[test]
    fn test_export_session() {
        let store = MemoryTrackStore::new();
        store.insert(&located(1_000, 24.0, 51.46)).unwrap();
        store.insert(&located(2_000, 26.0, 51.46)).unwrap();
        store.insert(&TrackPoint::new(2, 9_000, 30.0)).unwrap();

        let mut exporter = Collect::default();
        let summary = export_session(&store, &mut exporter, 1).unwrap();

        assert_eq!(summary.record_count, 2);
        assert_eq!(exporter.summaries, vec![summary]);
        assert_eq!(exporter.records.len(), 2);
        assert_eq!(exporter.records[1].timestamp_ms, 2_000);
    }

    #[test]
    fn test_empty_session_is_an_error() {
        let store = MemoryTrackStore::new();
        let mut exporter = Collect::default();

        assert_eq!(
            export_session(&store, &mut exporter, 3),
            Err(ExportError::EmptySession)
        );
        assert!(exporter.summaries.is_empty());
    }

    #[test]
    fn test_exporter_failure_is_reported() {
        let store = MemoryTrackStore::new();
        store.insert(&located(1_000, 24.0, 51.46)).unwrap();

        assert_eq!(
            export_session(&store, &mut Refuse, 1),
            Err(ExportError::Exporter("disk full"))
        );
    }
}
