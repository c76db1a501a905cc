//! Queue-to-store persistence task

use log::{debug, error};

use super::{TrackPoint, TrackStore};
use crate::events::PointReceiver;

/// Commits queued points to a [`TrackStore`].
///
/// Store failures are logged and the point is discarded; neither the writer
/// nor the engine feeding the queue ever sees them.
pub struct PersistenceWriter<'a, S: TrackStore> {
    receiver: PointReceiver<'a>,
    store: &'a S,
}

impl<'a, S: TrackStore> PersistenceWriter<'a, S> {
    pub fn new(receiver: PointReceiver<'a>, store: &'a S) -> Self {
        Self { receiver, store }
    }

    /// Commit points as they arrive. Never returns.
    pub async fn run(&self) {
        loop {
            let point = self.receiver.receive().await;
            self.commit(&point);
        }
    }

    /// Commit every point currently queued and return how many were taken.
    pub fn drain(&self) -> usize {
        let mut taken = 0;
        while let Ok(point) = self.receiver.try_receive() {
            self.commit(&point);
            taken += 1;
        }
        taken
    }

    fn commit(&self, point: &TrackPoint) {
        match self.store.insert(point) {
            Ok(point_id) => debug!(
                "Stored point {} of session {} ({:.1} spm)",
                point_id, point.session_id, point.stroke_rate
            ),
            Err(e) => error!(
                "Failed to store point of session {}: {}",
                point.session_id, e
            ),
        }
    }
}
