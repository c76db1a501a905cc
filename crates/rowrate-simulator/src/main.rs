//! Desktop simulator for the rowrate stroke rate engine.
//!
//! Rows a synthetic session through `rowrate-core` in real time: a mock
//! accelerometer produces surge acceleration at a drifting cadence, a mock
//! GPS moves the boat north at 1 Hz. After a warm-up the script starts a
//! recording, stops it after the configured duration and exports the
//! session to CSV.
//!
//! # Environment
//!
//! Read from the process environment, with a `.env` file loaded first.
//!
//! | Variable                  | Default              | Meaning                    |
//! |---------------------------|----------------------|----------------------------|
//! | `ROWRATE_SPM`             | 28                   | Mean cadence rowed         |
//! | `ROWRATE_DURATION_SECS`   | 30                   | Length of the recording    |
//! | `ROWRATE_SAMPLE_HZ`       | 50                   | Accelerometer rate         |
//! | `ROWRATE_SEED`            | 7                    | Seed for sensor noise      |
//! | `ROWRATE_SMOOTHING`       | 0.1                  | Low-pass filter weight     |
//! | `ROWRATE_MAX_SPM`         | 60                   | Fastest accepted cadence   |
//! | `ROWRATE_TRACK_FILE`      | `rowrate-tracks.bin` | Persistent track log       |
//! | `ROWRATE_EXPORT_FILE`     | `session.csv`        | Export destination         |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use embassy_futures::join::{join, join3};
use embassy_futures::select::select;
use embassy_sync::pubsub::WaitResult;
use embassy_time::{Duration, Instant, Ticker, Timer};
use log::{error, info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use rowrate_core::events::EventSubscriber;
use rowrate_core::export::{ActivityExporter, ActivityRecord, ActivitySummary, export_session};
use rowrate_core::storage::record::{decode_points, encode_point};
use rowrate_core::storage::summarize;
use rowrate_core::units::format_split;
use rowrate_core::{
    EmbassyClock, EngineConfig, EngineEvent, EventChannel, GpsFix, PersistenceWriter, PointQueue,
    RateEstimator, SessionId, SessionSummary, StoreError, TrackPoint, TrackStore,
};

type Engine<'a> = RateEstimator<'a, FileTrackStore, EmbassyClock>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

struct SimConfig {
    stroke_rate_spm: f64,
    duration_secs: u64,
    sample_hz: u64,
    seed: u64,
    track_file: PathBuf,
    export_file: PathBuf,
    engine: EngineConfig,
}

/// Parse `key` from the environment, falling back to `default` when unset or
/// malformed.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring {}={:?}: {}", key, raw, e);
                default
            }
        },
        Err(_) => default,
    }
}

impl SimConfig {
    fn from_env() -> Self {
        let defaults = EngineConfig::default();
        let sample_hz: u64 = env_or("ROWRATE_SAMPLE_HZ", 50);

        let engine = EngineConfig {
            nominal_sample_rate_hz: sample_hz as u32,
            smoothing_factor: env_or("ROWRATE_SMOOTHING", defaults.smoothing_factor),
            max_rate_spm: env_or("ROWRATE_MAX_SPM", defaults.max_rate_spm),
            ..defaults
        };

        Self {
            stroke_rate_spm: env_or("ROWRATE_SPM", 28.0),
            duration_secs: env_or("ROWRATE_DURATION_SECS", 30),
            sample_hz,
            seed: env_or("ROWRATE_SEED", 7),
            track_file: env_or("ROWRATE_TRACK_FILE", PathBuf::from("rowrate-tracks.bin")),
            export_file: env_or("ROWRATE_EXPORT_FILE", PathBuf::from("session.csv")),
            engine,
        }
    }
}

// ---------------------------------------------------------------------------
// Mock sensors
// ---------------------------------------------------------------------------

/// Generates boat acceleration for a rower at a slowly drifting cadence.
struct MockRower {
    rng: SmallRng,
    mean_spm: f64,
    elapsed_secs: f64,
    /// Stroke cycle phase in radians.
    phase: f64,
}

impl MockRower {
    fn new(mean_spm: f64, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            mean_spm,
            elapsed_secs: 0.0,
            phase: 0.0,
        }
    }

    /// Cadence at the current moment, ±2 spm around the mean.
    fn cadence(&self) -> f64 {
        self.mean_spm + 2.0 * (self.elapsed_secs / 40.0).sin()
    }

    /// Advance by `dt_secs` and return a raw [x, y, z] reading in m/s².
    fn next_reading(&mut self, dt_secs: f64) -> [f64; 3] {
        self.elapsed_secs += dt_secs;
        self.phase += 2.0 * std::f64::consts::PI * self.cadence() / 60.0 * dt_secs;

        // Surge dominates, with some roll and a residual vertical offset
        let surge = 1.0 + 1.2 * self.phase.sin() + 0.3 * (2.0 * self.phase).sin();
        let roll = 0.3 * self.phase.cos();
        let heave = 0.4;

        [
            surge + self.rng.random_range(-0.15..0.15),
            roll + self.rng.random_range(-0.1..0.1),
            heave + self.rng.random_range(-0.1..0.1),
        ]
    }
}

/// Moves the boat due north at roughly racing pace.
struct MockGps {
    rng: SmallRng,
    latitude: f64,
    longitude: f64,
}

impl MockGps {
    /// Metres per degree of latitude.
    const METRES_PER_DEGREE: f64 = 111_195.0;

    fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed.wrapping_add(1)),
            // Putney embankment
            latitude: 51.4668,
            longitude: -0.2165,
        }
    }

    fn next_fix(&mut self, dt_secs: f64, timestamp_ms: u64) -> GpsFix {
        let speed = 4.0 + self.rng.random_range(-0.3..0.3);
        self.latitude += speed * dt_secs / Self::METRES_PER_DEGREE;
        self.longitude += self.rng.random_range(-0.000_002..0.000_002);

        GpsFix {
            latitude: self.latitude,
            longitude: self.longitude,
            speed: speed as f32,
            timestamp_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// File-backed track store
// ---------------------------------------------------------------------------

struct TrackFile {
    file: File,
    points: Vec<TrackPoint>,
}

/// Append-only log of COBS framed records, mirrored in memory.
struct FileTrackStore {
    inner: Mutex<TrackFile>,
}

fn io_error(e: impl Display) -> StoreError {
    StoreError::io(&e.to_string())
}

impl FileTrackStore {
    fn open(path: &Path) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(io_error)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(io_error)?;
        let points = decode_points(&bytes);
        info!(
            "Opened {} with {} stored points",
            path.display(),
            points.len()
        );

        Ok(Self {
            inner: Mutex::new(TrackFile { file, points }),
        })
    }

    fn with_track<T>(
        &self,
        f: impl FnOnce(&mut TrackFile) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut track = self
            .inner
            .lock()
            .map_err(|_| StoreError::io("track store lock poisoned"))?;
        f(&mut track)
    }
}

impl TrackStore for FileTrackStore {
    fn insert(&self, point: &TrackPoint) -> Result<u32, StoreError> {
        self.with_track(|track| {
            let point_id = track.points.iter().map(|p| p.point_id).max().unwrap_or(0) + 1;
            let point = TrackPoint { point_id, ..*point };

            let frame = encode_point(&point)?;
            track.file.write_all(&frame).map_err(io_error)?;
            track.points.push(point);
            Ok(point_id)
        })
    }

    fn last_session_id(&self) -> Result<Option<SessionId>, StoreError> {
        self.with_track(|track| Ok(track.points.iter().map(|p| p.session_id).max()))
    }

    fn load_session(&self, session_id: SessionId) -> Result<Vec<TrackPoint>, StoreError> {
        self.with_track(|track| {
            let mut points: Vec<TrackPoint> = track
                .points
                .iter()
                .filter(|p| p.session_id == session_id)
                .copied()
                .collect();
            points.sort_by_key(|p| p.point_id);
            Ok(points)
        })
    }

    fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        self.with_track(|track| Ok(summarize(&track.points)))
    }
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

struct CsvExporter {
    path: PathBuf,
}

impl ActivityExporter for CsvExporter {
    type Error = std::io::Error;

    fn export(
        &mut self,
        summary: &ActivitySummary,
        records: &[ActivityRecord],
    ) -> Result<(), Self::Error> {
        let mut out = BufWriter::new(File::create(&self.path)?);

        writeln!(
            out,
            "# session {} elapsed_ms {} distance_m {:.1}",
            summary.session_id, summary.elapsed_ms, summary.distance_m
        )?;
        writeln!(
            out,
            "timestamp_ms,cadence_spm,speed_mps,split_500m,power_w,position_lat,position_long"
        )?;
        for record in records {
            let split = record.speed.map(format_split).unwrap_or_default();
            writeln!(
                out,
                "{},{:.1},{},{},{},{},{}",
                record.timestamp_ms,
                record.cadence,
                optional(record.speed),
                split,
                optional(record.power),
                optional(record.position_lat),
                optional(record.position_long),
            )?;
        }
        out.flush()
    }
}

fn optional<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn row(engine: &Engine<'_>, rower: &mut MockRower, sample_hz: u64) {
    let dt_secs = 1.0 / sample_hz as f64;
    let mut ticker = Ticker::every(Duration::from_hz(sample_hz));
    loop {
        let [x, y, z] = rower.next_reading(dt_secs);
        engine.add_accelerometer_reading(x, y, z);
        ticker.next().await;
    }
}

async fn navigate(engine: &Engine<'_>, gps: &mut MockGps) {
    let mut ticker = Ticker::every(Duration::from_secs(1));
    loop {
        ticker.next().await;
        engine.add_gps_reading(gps.next_fix(1.0, Instant::now().as_millis()));
    }
}

async fn report(mut events: EventSubscriber<'_>) {
    loop {
        match events.next_message().await {
            WaitResult::Message(EngineEvent::RateUpdate(rate)) => {
                info!("Stroke rate {:.1} spm", rate)
            }
            WaitResult::Message(EngineEvent::LocationUpdate {
                fix,
                total_distance_m,
            }) => info!(
                "Split {} /500m, {:.0} m rowed",
                format_split(fix.speed),
                total_distance_m
            ),
            WaitResult::Lagged(missed) => warn!("Reporter missed {} events", missed),
        }
    }
}

/// Warm up, record for `duration_secs`, then stop.
async fn script(engine: &Engine<'_>, duration_secs: u64) {
    Timer::after(Duration::from_millis(engine.config().initial_delay_ms)).await;
    if !engine.start_recording() {
        error!("Could not start a recording session");
        return;
    }

    Timer::after(Duration::from_secs(duration_secs)).await;
    engine.stop_recording();
    info!(
        "Rowed {:.0} m in session {:?}",
        engine.total_distance(),
        engine.current_session()
    );
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SimConfig::from_env();
    info!(
        "Rowing {:.0} spm for {} s at {} Hz",
        config.stroke_rate_spm, config.duration_secs, config.sample_hz
    );

    let store = match FileTrackStore::open(&config.track_file) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open {}: {}", config.track_file.display(), e);
            std::process::exit(1);
        }
    };

    let events = EventChannel::new();
    let points = PointQueue::new();
    let engine = match RateEstimator::new(
        config.engine.clone(),
        EmbassyClock,
        &store,
        &events,
        &points,
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Invalid engine configuration: {}", e);
            std::process::exit(1);
        }
    };
    let writer = PersistenceWriter::new(points.receiver(), &store);
    let subscriber = match events.subscriber() {
        Ok(subscriber) => subscriber,
        Err(e) => {
            error!("No event subscriber available: {:?}", e);
            std::process::exit(1);
        }
    };

    let mut rower = MockRower::new(config.stroke_rate_spm, config.seed);
    let mut gps = MockGps::new(config.seed);

    embassy_futures::block_on(select(
        script(&engine, config.duration_secs),
        join(
            join(
                row(&engine, &mut rower, config.sample_hz),
                navigate(&engine, &mut gps),
            ),
            join3(engine.run(), writer.run(), report(subscriber)),
        ),
    ));

    let flushed = writer.drain();
    info!("Flushed {} queued points", flushed);

    let Some(session_id) = engine.current_session() else {
        warn!("Nothing was recorded");
        return;
    };

    let mut exporter = CsvExporter {
        path: config.export_file.clone(),
    };
    match export_session(&store, &mut exporter, session_id) {
        Ok(summary) => info!(
            "Session {}: {} records over {:.1} s, mean {:.1} spm, max {:.1} spm, {:.0} m -> {}",
            summary.session_id,
            summary.record_count,
            summary.elapsed_ms as f64 / 1000.0,
            summary.mean_stroke_rate,
            summary.max_stroke_rate,
            summary.distance_m,
            config.export_file.display()
        ),
        Err(e) => error!("Export of session {} failed: {}", session_id, e),
    }

    match store.sessions() {
        Ok(sessions) => {
            for session in sessions {
                info!(
                    "Stored session {} started at {} ms",
                    session.session_id, session.started_ms
                );
            }
        }
        Err(e) => error!("Cannot list sessions: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_rower_is_periodic() {
        let mut rower = MockRower::new(30.0, 1);
        let readings: Vec<[f64; 3]> = (0..100).map(|_| rower.next_reading(0.02)).collect();

        // Surge swings well beyond the noise
        let max = readings.iter().map(|r| r[0]).fold(f64::MIN, f64::max);
        let min = readings.iter().map(|r| r[0]).fold(f64::MAX, f64::min);
        assert!(max - min > 2.0);
    }

    #[test]
    fn test_mock_gps_moves_north() {
        let mut gps = MockGps::new(3);
        let a = gps.next_fix(1.0, 0);
        let b = gps.next_fix(1.0, 1_000);

        assert!(b.latitude > a.latitude);
        let d = rowrate_core::session::great_circle_distance(&a, &b);
        assert!((3.0..5.0).contains(&d), "moved {d} m");
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!("rowrate-test-{}.bin", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let store = FileTrackStore::open(&path).unwrap();
            assert_eq!(store.last_session_id(), Ok(None));
            assert_eq!(store.insert(&TrackPoint::new(1, 1_000, 24.0)), Ok(1));
            assert_eq!(store.insert(&TrackPoint::new(2, 9_000, 26.0)), Ok(2));
        }

        let store = FileTrackStore::open(&path).unwrap();
        assert_eq!(store.last_session_id(), Ok(Some(2)));
        assert_eq!(store.insert(&TrackPoint::new(2, 10_000, 27.0)), Ok(3));
        assert_eq!(store.load_session(2).unwrap().len(), 2);
        assert_eq!(store.sessions().unwrap()[0].session_id, 2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_csv_export() {
        let path = std::env::temp_dir().join(format!("rowrate-test-{}.csv", std::process::id()));
        let mut exporter = CsvExporter { path: path.clone() };

        let mut point = TrackPoint::new(1, 1_000, 28.0);
        point.speed = Some(4.0);
        let record = ActivityRecord::from_point(&point);
        let summary = ActivitySummary::from_points(1, &[point]).unwrap();
        exporter.export(&summary, &[record]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let row = text.lines().nth(2).unwrap();
        assert_eq!(row, "1000,28.0,4,2:05.0,179,,");

        let _ = std::fs::remove_file(&path);
    }
}
