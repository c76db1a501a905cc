//! On-disk record format for track points
//!
//! Each point is serialized with postcard and COBS framed, so a log is a
//! plain concatenation of frames terminated by `0x00`. Appending never
//! rewrites earlier frames and a reader can resynchronize on the next
//! terminator.

extern crate alloc;
use alloc::vec::Vec;

use super::{StoreError, TrackPoint};

/// Frame terminator written after every record.
pub const FRAME_DELIMITER: u8 = 0x00;

/// Encode one point as a COBS frame, terminator included.
pub fn encode_point(point: &TrackPoint) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec_cobs(point).map_err(|_| StoreError::Encode)
}

/// Decode every complete frame of a record log.
///
/// A frame that does not decode is skipped and reading resumes after its
/// terminator. Trailing bytes without a terminator are the remains of an
/// interrupted append and are ignored.
pub fn decode_points(bytes: &[u8]) -> Vec<TrackPoint> {
    let mut points = Vec::new();
    let mut frame = Vec::new();

    for chunk in bytes.split_inclusive(|byte| *byte == FRAME_DELIMITER) {
        if chunk.last() != Some(&FRAME_DELIMITER) {
            log::warn!("Ignoring {} trailing bytes of a torn record", chunk.len());
            break;
        }
        if chunk.len() == 1 {
            // Stray terminator
            continue;
        }

        frame.clear();
        frame.extend_from_slice(chunk);
        match postcard::from_bytes_cobs::<TrackPoint>(&mut frame) {
            Ok(point) => points.push(point),
            Err(e) => log::warn!("Skipping corrupt record of {} bytes: {}", chunk.len(), e),
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<TrackPoint> {
        let mut located = TrackPoint::new(2, 61_000, 31.5);
        located.point_id = 8;
        located.latitude = Some(51.4613);
        located.longitude = Some(-0.2190);
        located.speed = Some(4.2);

        let mut plain = TrackPoint::new(2, 60_000, 30.0);
        plain.point_id = 7;

        vec![plain, located, TrackPoint::new(3, 0, 0.0)]
    }

    #[test]
    fn test_log_of_several_frames_decodes() {
        let points = sample_points();
        let mut log = Vec::new();
        for point in &points {
            let frame = encode_point(point).unwrap();
            assert_eq!(frame.last(), Some(&FRAME_DELIMITER));
            assert_eq!(frame.iter().filter(|b| **b == 0).count(), 1);
            log.extend_from_slice(&frame);
        }

        assert_eq!(decode_points(&log), points);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let points = sample_points();
        let mut log = encode_point(&points[0]).unwrap();
        let second = encode_point(&points[1]).unwrap();
        log.extend_from_slice(&second[..second.len() / 2]);

        assert_eq!(decode_points(&log), vec![points[0]]);
    }

    #[test]
    fn test_empty_log() {
        assert!(decode_points(&[]).is_empty());
        assert!(decode_points(&[0, 0]).is_empty());
    }

    #[test]
    fn test_corrupt_frame_is_skipped() {
        let points = sample_points();
        let mut log = encode_point(&points[0]).unwrap();
        // Valid COBS, but too short for a point
        log.extend_from_slice(&[0x01, 0x01, 0x00]);
        log.extend_from_slice(&encode_point(&points[1]).unwrap());

        assert_eq!(decode_points(&log), vec![points[0], points[1]]);
        assert!(decode_points(&[0x01, 0x01, 0x00]).is_empty());
    }
}
