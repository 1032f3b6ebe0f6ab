//! Line-protocol rendering for points and batches
//!
//! `measurement[,tag=value...] field=value[,field=value...] [timestamp]`

use crate::error::{InfluxError, Result};
use crate::types::{BatchPoints, FieldValue, Point, Precision, Tags};
use std::fmt::Write;

/// Render one point, merging `extra_tags` over its own tags and converting the
/// timestamp into `precision`.
pub fn render_point(point: &Point, extra_tags: Option<&Tags>, precision: Precision) -> Result<String> {
    let mut line = String::with_capacity(64);
    escape_into(&mut line, point.name(), &[',', ' ']);

    let merged;
    let tags = match extra_tags {
        Some(extra) if !extra.is_empty() => {
            let mut all = point.tags().clone();
            all.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
            merged = all;
            &merged
        }
        _ => point.tags(),
    };

    for (key, value) in tags {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        escape_into(&mut line, value, &[',', '=', ' ']);
    }

    let mut first = true;
    for (key, value) in point.fields() {
        if let FieldValue::Float(f) = value {
            if !f.is_finite() {
                continue;
            }
        }
        line.push(if first { ' ' } else { ',' });
        first = false;
        escape_into(&mut line, key, &[',', '=', ' ']);
        line.push('=');
        write_field_value(&mut line, value);
    }

    if first {
        return Err(InfluxError::InvalidPoint(format!(
            "point for measurement {} has no writable fields",
            point.name()
        )));
    }

    if let Some(time) = point.time() {
        let converted = point.precision().checked_convert(time, precision).ok_or_else(|| {
            InfluxError::InvalidPoint(format!(
                "timestamp {} {} of measurement {} does not fit in {}",
                time,
                point.precision(),
                point.name(),
                precision
            ))
        })?;
        let _ = write!(line, " {}", converted);
    }

    Ok(line)
}

/// Render every point of a batch in the batch precision, one per line
pub fn render_batch(batch: &BatchPoints) -> Result<String> {
    let lines = batch
        .points()
        .iter()
        .map(|p| render_point(p, Some(batch.tags()), batch.precision()))
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

fn write_field_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Float(f) => {
            let _ = write!(out, "{}", f);
        }
        FieldValue::Integer(i) => {
            let _ = write!(out, "{}i", i);
        }
        FieldValue::UInteger(u) => {
            let _ = write!(out, "{}u", u);
        }
        FieldValue::Boolean(b) => {
            out.push_str(if *b { "true" } else { "false" });
        }
        FieldValue::String(s) => {
            out.push('"');
            for c in s.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Consistency;

    #[test]
    fn test_render_simple_point() {
        let point = Point::measurement("cpu")
            .tag("host", "a")
            .field("usage", 42.5)
            .time(1_614_935_880_000, Precision::Milliseconds)
            .build()
            .unwrap();

        assert_eq!(
            render_point(&point, None, Precision::Milliseconds).unwrap(),
            "cpu,host=a usage=42.5 1614935880000"
        );
        assert_eq!(
            render_point(&point, None, Precision::Microseconds).unwrap(),
            "cpu,host=a usage=42.5 1614935880000000"
        );
    }

    #[test]
    fn test_field_types() {
        let point = Point::measurement("m")
            .field("b", true)
            .field("f", 1.0)
            .field("i", -3i64)
            .field("s", "say \"hi\" \\o/")
            .field("u", 7u64)
            .build()
            .unwrap();

        assert_eq!(
            render_point(&point, None, Precision::Nanoseconds).unwrap(),
            r#"m b=true,f=1,i=-3i,s="say \"hi\" \\o/",u=7u"#
        );
    }

    #[test]
    fn test_escaping() {
        let point = Point::measurement("disk usage,total")
            .tag("mount point", "/var,log")
            .tag("kind", "a=b")
            .field("free space", 1i64)
            .build()
            .unwrap();

        assert_eq!(
            render_point(&point, None, Precision::Nanoseconds).unwrap(),
            r"disk\ usage\,total,kind=a\=b,mount\ point=/var\,log free\ space=1i"
        );
    }

    #[test]
    fn test_empty_tag_values_skipped() {
        let point = Point::measurement("m")
            .tag("empty", "")
            .tag("host", "a")
            .field("v", 1i64)
            .build()
            .unwrap();
        assert_eq!(
            render_point(&point, None, Precision::Nanoseconds).unwrap(),
            "m,host=a v=1i"
        );
    }

    #[test]
    fn test_non_finite_floats_skipped() {
        let point = Point::measurement("m")
            .field("bad", f64::NAN)
            .field("ok", 2.5)
            .build()
            .unwrap();
        assert_eq!(render_point(&point, None, Precision::Nanoseconds).unwrap(), "m ok=2.5");

        let point = Point::measurement("m").field("bad", f64::INFINITY).build().unwrap();
        assert!(render_point(&point, None, Precision::Nanoseconds).is_err());
    }

    #[test]
    fn test_render_batch_merges_tags() {
        let p1 = Point::measurement("cpu")
            .tag("host", "a")
            .field("v", 1i64)
            .time(10, Precision::Microseconds)
            .build()
            .unwrap();
        let p2 = Point::measurement("cpu")
            .tag("host", "b")
            .field("v", 2i64)
            .time(11, Precision::Microseconds)
            .build()
            .unwrap();

        let batch = BatchPoints::database("db")
            .consistency(Consistency::All)
            .precision(Precision::Microseconds)
            .tag("dc", "eu")
            .point(p1)
            .point(p2)
            .build();

        assert_eq!(
            render_batch(&batch).unwrap(),
            "cpu,dc=eu,host=a v=1i 10\ncpu,dc=eu,host=b v=2i 11"
        );
    }

    #[test]
    fn test_timestamp_overflow_is_rejected() {
        let point = Point::measurement("cpu")
            .field("v", 1i64)
            .time(i64::MAX / 1_000, Precision::Hours)
            .build()
            .unwrap();

        let err = render_point(&point, None, Precision::Nanoseconds).unwrap_err();
        assert!(matches!(err, InfluxError::InvalidPoint(_)));
        assert!(render_point(&point, None, Precision::Hours).is_ok());
    }
}
