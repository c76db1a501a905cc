//! Engine notifications and the persistence queue
//!
//! Presentation layers subscribe to [`EventChannel`]; the engine publishes
//! through an immediate publisher so a slow subscriber never stalls a cycle
//! (it lags and skips messages instead). Recorded points leave the engine
//! through the bounded [`PointQueue`].

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::pubsub::{ImmediatePublisher, PubSubChannel, Subscriber};

use crate::session::GpsFix;
use crate::storage::TrackPoint;

pub const EVENT_CHANNEL_CAPACITY: usize = 8;
pub const EVENT_SUBSCRIBERS: usize = 2;
pub const EVENT_PUBLISHERS: usize = 1;

/// Points the writer may fall behind by before new ones are dropped.
pub const POINT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Smoothed stroke rate after a cycle, in strokes per minute.
    RateUpdate(f64),
    /// A position fix was received.
    LocationUpdate {
        fix: GpsFix,
        /// Distance covered in the current (or last) session, in metres.
        total_distance_m: f64,
    },
}

pub type EventChannel = PubSubChannel<
    CriticalSectionRawMutex,
    EngineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventPublisher<'a> = ImmediatePublisher<
    'a,
    CriticalSectionRawMutex,
    EngineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventSubscriber<'a> = Subscriber<
    'a,
    CriticalSectionRawMutex,
    EngineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type PointQueue = Channel<CriticalSectionRawMutex, TrackPoint, POINT_QUEUE_CAPACITY>;
pub type PointSender<'a> = Sender<'a, CriticalSectionRawMutex, TrackPoint, POINT_QUEUE_CAPACITY>;
pub type PointReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, TrackPoint, POINT_QUEUE_CAPACITY>;
