use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use super::types::{BigInt, Decimal, Duration, RelativeDuration};

/// Dynamically typed query argument.
///
/// Statement arguments are a tuple or named tuple of these; a statement
/// without arguments takes [`Value::Nothing`] or an empty [`Value::Tuple`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// A missing value; also "no arguments" at the top level
    #[default]
    Nothing,
    Uuid(Uuid),
    Str(String),
    Bytes(Bytes),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Bool(bool),
    DateTime(DateTime<Utc>),
    LocalDateTime(NaiveDateTime),
    LocalDate(NaiveDate),
    LocalTime(NaiveTime),
    Duration(Duration),
    Json(serde_json::Value),
    BigInt(BigInt),
    RelativeDuration(RelativeDuration),
    Enum(String),
    Tuple(Vec<Value>),
    NamedTuple(Vec<(String, Value)>),
    Array(Vec<Value>),
    Set(Vec<Value>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Uuid(_) => "uuid",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Decimal(_) => "decimal",
            Value::Bool(_) => "bool",
            Value::DateTime(_) => "datetime",
            Value::LocalDateTime(_) => "local_datetime",
            Value::LocalDate(_) => "local_date",
            Value::LocalTime(_) => "local_time",
            Value::Duration(_) => "duration",
            Value::Json(_) => "json",
            Value::BigInt(_) => "bigint",
            Value::RelativeDuration(_) => "relative_duration",
            Value::Enum(_) => "enum",
            Value::Tuple(_) => "tuple",
            Value::NamedTuple(_) => "named tuple",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
        }
    }

    /// Build named arguments from `(name, value)` pairs.
    pub fn named<K, V, I>(pairs: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::NamedTuple(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    Uuid => Uuid,
    String => Str,
    Bytes => Bytes,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    bool => Bool,
    DateTime<Utc> => DateTime,
    NaiveDateTime => LocalDateTime,
    NaiveDate => LocalDate,
    NaiveTime => LocalTime,
    Duration => Duration,
    serde_json::Value => Json,
    BigInt => BigInt,
    RelativeDuration => RelativeDuration,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nothing, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from("a"), Value::Str("a".to_string()));
        assert_eq!(Value::from(None::<i32>), Value::Nothing);
        assert_eq!(Value::from(Some(3i64)), Value::Int64(3));
        assert_eq!(
            Value::from(vec![1i16, 2]),
            Value::Array(vec![Value::Int16(1), Value::Int16(2)])
        );
    }

    #[test]
    fn test_named() {
        let v = Value::named([("a", Value::from(1i32)), ("b", Value::from("x"))]);
        match v {
            Value::NamedTuple(fields) => {
                assert_eq!(fields[0].0, "a");
                assert_eq!(fields[1].1, Value::Str("x".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
