//! Attribute keys and conversion of driver values into attributes.
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use opentelemetry::{Key, KeyValue};

use crate::driver::{NamedValue, Value};

/// Name of the instrumented operation.
pub const DB_OPERATION: Key = Key::from_static_str("db.operation");
/// The query text.
pub const DB_STATEMENT: Key = Key::from_static_str("db.statement");
/// Name of the database instance.
pub const DB_INSTANCE: Key = Key::from_static_str("db.instance");
/// Name of the database.
pub const DB_NAME: Key = Key::from_static_str("db.name");
/// Database management system identifier, e.g. `postgresql`.
pub const DB_SYSTEM: Key = Key::from_static_str("db.system");
/// `OK` or `ERROR`.
pub const DB_SQL_STATUS: Key = Key::from_static_str("db.sql.status");
/// Text of the error returned by the backend.
pub const DB_SQL_ERROR: Key = Key::from_static_str("db.sql.error");
/// Number of `next` calls that returned a row.
pub const DB_SQL_ROWS_NEXT_SUCCESS_COUNT: Key =
    Key::from_static_str("db.sql.rows_next.success_count");
/// Average latency of the `next` calls that returned a row.
pub const DB_SQL_ROWS_NEXT_LATENCY_AVG: Key =
    Key::from_static_str("db.sql.rows_next.latency_avg");

const ARGS_PREFIX: &str = "db.sql.args.";
const MAX_STRING_VALUE_LENGTH: usize = 256;
const SHORTENED_SUFFIX: &str = "... (more than 256 chars)";

pub(crate) fn status_ok() -> KeyValue {
    KeyValue::new(DB_SQL_STATUS, "OK")
}

pub(crate) fn status_error() -> KeyValue {
    KeyValue::new(DB_SQL_STATUS, "ERROR")
}

/// Converts a bound argument into an attribute keyed
/// `db.sql.args.<name>`, or `db.sql.args.<ordinal>` for positional
/// arguments.
pub fn from_named_value(arg: &NamedValue) -> KeyValue {
    key_value(key_from_named_value(arg), &arg.value)
}

/// The attribute key of a bound argument.
pub fn key_from_named_value(arg: &NamedValue) -> Key {
    match &arg.name {
        Some(name) if !name.is_empty() => Key::new(format!("{ARGS_PREFIX}{name}")),
        _ => Key::new(format!("{ARGS_PREFIX}{}", arg.ordinal)),
    }
}

/// Converts a driver value into an attribute.
///
/// `NULL` becomes an empty string, strings and bytes longer than 256
/// characters are shortened and timestamps are rendered as RFC 3339.
pub fn key_value(key: Key, value: &Value) -> KeyValue {
    match value {
        Value::Null => KeyValue::new(key, ""),
        Value::Bool(b) => KeyValue::new(key, *b),
        Value::I64(i) => KeyValue::new(key, *i),
        Value::F64(f) => KeyValue::new(key, *f),
        Value::String(s) => KeyValue::new(key, shorten_string(s)),
        Value::Bytes(bytes) => KeyValue::new(key, shorten_string(&String::from_utf8_lossy(bytes))),
        Value::Timestamp(t) => KeyValue::new(key, format_timestamp(*t)),
    }
}

/// Converts a duration into a string attribute.
///
/// Durations between one microsecond and one millisecond are rendered as
/// whole microseconds, e.g. `250us`. Shorter durations use `ns` or `ms`
/// units, longer ones the `1h2m3.5s` form.
pub fn key_value_duration(key: Key, d: Duration) -> KeyValue {
    KeyValue::new(key, format_duration(d))
}

fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if Duration::from_micros(1) <= d && d < Duration::from_millis(1) {
        return format!("{}us", d.as_micros());
    }
    if d < Duration::from_secs(1) {
        return format!("{d:?}");
    }

    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&seconds.to_string());

    let nanos = d.subsec_nanos();
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push('s');

    out
}

fn format_timestamp(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn shorten_string(s: &str) -> String {
    if s.chars().count() <= MAX_STRING_VALUE_LENGTH {
        return s.to_string();
    }

    let end = MAX_STRING_VALUE_LENGTH - SHORTENED_SUFFIX.len();
    let mut shortened: String = s.chars().take(end).collect();
    shortened.push_str(SHORTENED_SUFFIX);

    shortened
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const KEY: Key = Key::from_static_str("key");

    #[rstest]
    #[case(Value::Null, KeyValue::new(KEY, ""))]
    #[case(Value::Bool(true), KeyValue::new(KEY, true))]
    #[case(Value::I64(42), KeyValue::new(KEY, 42_i64))]
    #[case(Value::F64(42.1), KeyValue::new(KEY, 42.1))]
    #[case(Value::from("foobar"), KeyValue::new(KEY, "foobar"))]
    #[case(Value::Bytes(b"foobar".to_vec()), KeyValue::new(KEY, "foobar"))]
    #[case(
        Value::Timestamp(SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000)),
        KeyValue::new(KEY, "2020-09-13T12:26:40Z")
    )]
    fn value_to_attribute(#[case] value: Value, #[case] expected: KeyValue) {
        assert_eq!(key_value(KEY, &value), expected);
    }

    #[test]
    fn long_strings_are_shortened() {
        let long = "xMROXgoHsB8Y5yTH".repeat(17);
        let kv = key_value(KEY, &Value::String(long.clone()));

        let expected = format!("{}{SHORTENED_SUFFIX}", &long[..231]);
        assert_eq!(kv, KeyValue::new(KEY, expected.clone()));
        assert_eq!(expected.chars().count(), MAX_STRING_VALUE_LENGTH);
    }

    #[test]
    fn string_at_limit_is_kept() {
        let s = "a".repeat(MAX_STRING_VALUE_LENGTH);

        assert_eq!(shorten_string(&s), s);
    }

    #[test]
    fn shortening_counts_chars() {
        let s = "é".repeat(MAX_STRING_VALUE_LENGTH);

        assert_eq!(shorten_string(&s), s);
    }

    #[rstest]
    #[case(None, 1, "db.sql.args.1")]
    #[case(Some(""), 2, "db.sql.args.2")]
    #[case(Some("id"), 3, "db.sql.args.id")]
    fn argument_keys(#[case] name: Option<&str>, #[case] ordinal: usize, #[case] expected: &str) {
        let arg = NamedValue {
            name: name.map(str::to_string),
            ordinal,
            value: Value::I64(42),
        };

        assert_eq!(
            from_named_value(&arg),
            KeyValue::new(expected.to_string(), 42_i64)
        );
    }

    #[rstest]
    #[case(Duration::from_nanos(500), "500ns")]
    #[case(Duration::from_micros(1), "1us")]
    #[case(Duration::from_micros(999), "999us")]
    #[case(Duration::from_nanos(1_500), "1us")]
    #[case(Duration::from_millis(1), "1ms")]
    #[case(Duration::ZERO, "0s")]
    #[case(Duration::from_nanos(116), "116ns")]
    #[case(Duration::from_millis(117), "117ms")]
    #[case(Duration::from_millis(1_500), "1.5s")]
    #[case(Duration::from_secs(1), "1s")]
    #[case(Duration::from_secs(70), "1m10s")]
    #[case(Duration::from_secs(120), "2m0s")]
    #[case(Duration::from_secs(3_600), "1h0m0s")]
    #[case(Duration::from_millis(3_723_500), "1h2m3.5s")]
    #[case(Duration::new(61, 250), "1m1.00000025s")]
    fn durations(#[case] d: Duration, #[case] expected: &'static str) {
        assert_eq!(key_value_duration(KEY, d), KeyValue::new(KEY, expected));
    }
}
