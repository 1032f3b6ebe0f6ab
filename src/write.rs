//! Point construction for the write path
//!
//! Batch inserts share one nominal instant. Each member gets `base_ms * 1000 + i` at
//! microsecond precision so that no two points of a batch collide in the store's
//! time-indexed storage.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, Utc};

use crate::error::{InfluxError, Result};
use crate::types::{BatchPoints, Consistency, Fields, Point, Precision, Tags};

/// Epoch milliseconds of "now" in `offset`.
///
/// The host's local wall-clock reading is interpreted as a time in `offset`, so with the
/// host running in UTC and `offset` = UTC this is simply the current instant.
pub fn now_millis(offset: FixedOffset) -> i64 {
    wall_clock_millis(Local::now().naive_local(), offset)
}

/// Epoch milliseconds of the wall-clock reading `wall` taken in `offset`
pub fn wall_clock_millis(wall: NaiveDateTime, offset: FixedOffset) -> i64 {
    (wall - offset).and_utc().timestamp_millis()
}

/// UTC offset
pub fn utc() -> FixedOffset {
    Utc.fix()
}

/// Single point at an explicit timestamp
pub fn point_at(
    measurement: &str,
    tags: &Tags,
    fields: &Fields,
    time: i64,
    precision: Precision,
) -> Result<Point> {
    Point::measurement(measurement)
        .time(time, precision)
        .tags(tags)
        .fields(fields)
        .build()
}

/// One point per field set, timestamps `base_ms * 1000 + i` in microseconds
pub fn disambiguated_points(
    measurement: &str,
    tags: &Tags,
    field_sets: &[Fields],
    base_millis: i64,
) -> Result<Vec<Point>> {
    let base_micros = Precision::Milliseconds
        .checked_convert(base_millis, Precision::Microseconds)
        .ok_or_else(|| {
            InfluxError::InvalidPoint(format!("batch base time {}ms out of range", base_millis))
        })?;

    field_sets
        .iter()
        .enumerate()
        .map(|(i, fields)| {
            point_at(
                measurement,
                tags,
                fields,
                base_micros + i as i64,
                Precision::Microseconds,
            )
        })
        .collect()
}

/// Batch for `database`/`retention_policy` requiring acknowledgement from all replicas
pub fn all_replicas_batch(database: &str, retention_policy: &str, points: Vec<Point>) -> BatchPoints {
    BatchPoints::database(database)
        .retention_policy(retention_policy)
        .consistency(Consistency::All)
        .precision(Precision::Microseconds)
        .points(points)
        .build()
}

/// Epoch milliseconds of an explicit base instant
pub fn base_millis(base: DateTime<Utc>) -> i64 {
    base.timestamp_millis()
}
