//! Values exchanged with a backend.
use std::time::SystemTime;

/// A value exchanged with a backend driver, either as a bound argument or as
/// a column of a returned row.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    I64(i64),
    /// A 64-bit float.
    F64(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A point in time.
    Timestamp(SystemTime),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::I64(_) => ValueKind::I64,
            Value::F64(_) => ValueKind::F64,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Timestamp(_) => ValueKind::Timestamp,
        }
    }
}

/// The kind of a [`Value`], used to describe the type a column scans into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// See [`Value::Null`].
    Null,
    /// See [`Value::Bool`].
    Bool,
    /// See [`Value::I64`].
    I64,
    /// See [`Value::F64`].
    F64,
    /// See [`Value::String`].
    String,
    /// See [`Value::Bytes`].
    Bytes,
    /// See [`Value::Timestamp`].
    Timestamp,
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::I64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::I64(i.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::F64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<SystemTime> for Value {
    fn from(t: SystemTime) -> Self {
        Value::Timestamp(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A bound argument, optionally named.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedValue {
    /// Name of the parameter, if the query uses named parameters.
    pub name: Option<String>,
    /// 1-based position of the parameter.
    pub ordinal: usize,
    /// The bound value.
    pub value: Value,
}

impl NamedValue {
    /// Creates a positional argument.
    pub fn positional(ordinal: usize, value: impl Into<Value>) -> Self {
        NamedValue {
            name: None,
            ordinal,
            value: value.into(),
        }
    }

    /// Creates a named argument.
    pub fn named(name: impl Into<String>, ordinal: usize, value: impl Into<Value>) -> Self {
        NamedValue {
            name: Some(name.into()),
            ordinal,
            value: value.into(),
        }
    }
}

/// Converts plain values into positional arguments, numbered from 1.
pub fn values_to_named_values(values: &[Value]) -> Vec<NamedValue> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| NamedValue::positional(i + 1, v.clone()))
        .collect()
}

/// Drops names and ordinals, keeping the values in order.
pub fn named_values_to_values(named_values: &[NamedValue]) -> Vec<Value> {
    named_values.iter().map(|nv| nv.value.clone()).collect()
}

/// Transaction isolation level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// The backend's default level.
    #[default]
    Default,
    /// `READ UNCOMMITTED`.
    ReadUncommitted,
    /// `READ COMMITTED`.
    ReadCommitted,
    /// `WRITE COMMITTED`.
    WriteCommitted,
    /// `REPEATABLE READ`.
    RepeatableRead,
    /// `SNAPSHOT`.
    Snapshot,
    /// `SERIALIZABLE`.
    Serializable,
    /// `LINEARIZABLE`.
    Linearizable,
}

/// Options used when starting a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Requested isolation level.
    pub isolation: IsolationLevel,
    /// Whether the transaction is read only.
    pub read_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_numbered_from_one() {
        let named = values_to_named_values(&[Value::from(42), Value::from("foobar")]);

        assert_eq!(
            named,
            vec![
                NamedValue::positional(1, 42),
                NamedValue::positional(2, "foobar"),
            ]
        );
        assert_eq!(
            named_values_to_values(&named),
            vec![Value::I64(42), Value::String("foobar".to_string())]
        );
    }

    #[test]
    fn empty_values() {
        assert!(values_to_named_values(&[]).is_empty());
        assert!(named_values_to_values(&[]).is_empty());
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(true)), Value::Bool(true));
        assert_eq!(Value::Null.kind(), ValueKind::Null);
    }
}
