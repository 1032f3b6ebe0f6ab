use crate::error::{InfluxError, Result};
use crate::transport::line_protocol;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Tag set of a point, ordered by key
pub type Tags = BTreeMap<String, String>;

/// Field set of a point, ordered by key
pub type Fields = BTreeMap<String, FieldValue>;

/// Dynamically typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    UInteger(u64),
    Float(f64),
    String(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInteger(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::UInteger(v as u64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// Timestamp unit of a point or write request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    /// Literal the store expects in the `precision` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }

    fn nanos_per_unit(&self) -> i128 {
        match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
            Precision::Minutes => 60_000_000_000,
            Precision::Hours => 3_600_000_000_000,
        }
    }

    /// Convert `value` expressed in `self` into `target` units, truncating toward zero.
    ///
    /// Returns `None` when the result does not fit in an `i64`.
    pub fn checked_convert(&self, value: i64, target: Precision) -> Option<i64> {
        if *self == target {
            return Some(value);
        }
        let nanos = value as i128 * self.nanos_per_unit();
        i64::try_from(nanos / target.nanos_per_unit()).ok()
    }

    /// Like [`Precision::checked_convert`], saturating at the `i64` bounds
    pub fn convert(&self, value: i64, target: Precision) -> i64 {
        self.checked_convert(value, target)
            .unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Replica acknowledgement required for a write
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    All,
    Any,
    #[default]
    One,
    Quorum,
}

impl Consistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::All => "all",
            Consistency::Any => "any",
            Consistency::One => "one",
            Consistency::Quorum => "quorum",
        }
    }
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One measurement write
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Tags,
    fields: Fields,
    time: Option<i64>,
    precision: Precision,
}

impl Point {
    /// Start building a point for `measurement`
    pub fn measurement(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder {
            measurement: measurement.into(),
            tags: Tags::new(),
            fields: Fields::new(),
            time: None,
            precision: Precision::Nanoseconds,
        }
    }

    pub fn name(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Timestamp in [`Point::precision`] units; `None` lets the store assign server time
    pub fn time(&self) -> Option<i64> {
        self.time
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Render as a line-protocol record in the point's own precision
    pub fn line_protocol(&self) -> Result<String> {
        line_protocol::render_point(self, None, self.precision)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line_protocol() {
            Ok(line) => write!(f, "{}", line),
            Err(_) => write!(
                f,
                "Point(measurement={}, tags={:?}, fields={:?}, time={:?}, precision={})",
                self.measurement, self.tags, self.fields, self.time, self.precision
            ),
        }
    }
}

/// Builder for [`Point`]
#[derive(Debug, Clone)]
pub struct PointBuilder {
    measurement: String,
    tags: Tags,
    fields: Fields,
    time: Option<i64>,
    precision: Precision,
}

impl PointBuilder {
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags(mut self, tags: &Tags) -> Self {
        self.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn fields(mut self, fields: &Fields) -> Self {
        self.fields
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn time(mut self, time: i64, precision: Precision) -> Self {
        self.time = Some(time);
        self.precision = precision;
        self
    }

    pub fn build(self) -> Result<Point> {
        if self.measurement.is_empty() {
            return Err(InfluxError::InvalidPoint(
                "measurement name must not be empty".to_string(),
            ));
        }
        if self.fields.is_empty() {
            return Err(InfluxError::InvalidPoint(format!(
                "point for measurement {} has no fields",
                self.measurement
            )));
        }
        Ok(Point {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            time: self.time,
            precision: self.precision,
        })
    }
}

/// Points submitted to the store in one write request
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPoints {
    database: String,
    retention_policy: Option<String>,
    consistency: Consistency,
    precision: Precision,
    tags: Tags,
    points: Vec<Point>,
}

impl BatchPoints {
    /// Start building a batch for `database`
    pub fn database(database: impl Into<String>) -> BatchPointsBuilder {
        BatchPointsBuilder {
            database: database.into(),
            retention_policy: None,
            consistency: Consistency::One,
            precision: Precision::Nanoseconds,
            tags: Tags::new(),
            points: Vec::new(),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn retention_policy(&self) -> Option<&str> {
        self.retention_policy.as_deref()
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Precision the batch timestamps are sent in
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Tags applied to every point of the batch
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Render every point as newline-separated line protocol
    pub fn line_protocol(&self) -> Result<String> {
        line_protocol::render_batch(self)
    }
}

impl std::fmt::Display for BatchPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BatchPoints [database={}, retentionPolicy={}, consistency={}, precision={}, points={}]",
            self.database,
            self.retention_policy.as_deref().unwrap_or(""),
            self.consistency,
            self.precision,
            self.points.len()
        )
    }
}

/// Builder for [`BatchPoints`]
#[derive(Debug, Clone)]
pub struct BatchPointsBuilder {
    database: String,
    retention_policy: Option<String>,
    consistency: Consistency,
    precision: Precision,
    tags: Tags,
    points: Vec<Point>,
}

impl BatchPointsBuilder {
    pub fn retention_policy(mut self, policy: impl Into<String>) -> Self {
        self.retention_policy = Some(policy.into());
        self
    }

    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn point(mut self, point: Point) -> Self {
        self.points.push(point);
        self
    }

    pub fn points(mut self, points: impl IntoIterator<Item = Point>) -> Self {
        self.points.extend(points);
        self
    }

    pub fn build(self) -> BatchPoints {
        BatchPoints {
            database: self.database,
            retention_policy: self.retention_policy,
            consistency: self.consistency,
            precision: self.precision,
            tags: self.tags,
            points: self.points,
        }
    }
}

/// Response of the store's query endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// Result with no statements, returned by a degraded client
    pub fn empty() -> Self {
        Self::default()
    }

    /// First series of the first statement, if any rows matched
    pub fn first_series(&self) -> Option<&Series> {
        self.results
            .first()
            .and_then(|r| r.series.as_ref())
            .and_then(|s| s.first())
    }

    /// Top-level error, else the first statement error
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }
}

/// Result of one statement in a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<Series>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rows of one measurement/tag group, aligned to `columns`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Vec<Value>>>,
}

/// Declarative retention policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub name: String,
    /// Duration literal such as `30d`; `0` keeps data forever
    pub duration: String,
    pub replication: u32,
    pub is_default: bool,
}

impl RetentionPolicy {
    pub fn new(
        name: impl Into<String>,
        duration: impl Into<String>,
        replication: u32,
        is_default: bool,
    ) -> Self {
        Self {
            name: name.into(),
            duration: duration.into(),
            replication,
            is_default,
        }
    }

    /// Provisioning command for this policy on `database`
    pub fn create_command(&self, database: &str) -> String {
        let mut command = format!(
            "CREATE RETENTION POLICY \"{}\" ON \"{}\" DURATION {} REPLICATION {}",
            self.name, database, self.duration, self.replication
        );
        if self.is_default {
            command.push_str(" DEFAULT");
        }
        command
    }

    pub fn drop_command(name: &str, database: &str) -> String {
        format!("DROP RETENTION POLICY \"{}\" ON \"{}\"", name, database)
    }
}

/// Successful ping reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub version: String,
    pub response_time: Duration,
}
