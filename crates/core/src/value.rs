//! Value type definitions for Strata.
//!
//! This module defines the `Value` enum which represents any value that can be
//! stored in a table cell or produced by an expression.

use crate::error::{Error, Result};
use crate::temporal::{self, MICROS_PER_DAY};
use crate::types::DataType;
use alloc::string::{String, ToString};
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

/// A value that can be stored in a database cell.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 text
    Text(String),
    /// Days since 1970-01-01
    Date(i32),
    /// Microseconds since 1970-01-01 00:00:00
    Timestamp(i64),
}

impl Value {
    /// Returns the data type of this value, or None if it's Null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Text(_) => Some(DataType::Text),
            Value::Date(_) => Some(DataType::Date),
            Value::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value widened to i64 if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as f64 if this is any numeric type.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the text if this is Text, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the value as microseconds since the epoch if it is temporal.
    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Date(d) => Some(*d as i64 * MICROS_PER_DAY),
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Converts this value to `target`, following SQL cast rules.
    ///
    /// Null casts to Null for every target.
    pub fn cast_to(&self, target: DataType) -> Result<Value> {
        if self.data_type() == Some(target) || self.is_null() {
            return Ok(self.clone());
        }
        match (self, target) {
            (_, DataType::Text) => Ok(Value::Text(self.to_string())),

            (Value::Int32(v), DataType::Int64) => Ok(Value::Int64(*v as i64)),
            (Value::Int64(v), DataType::Int32) => i32::try_from(*v)
                .map(Value::Int32)
                .map_err(|_| Error::overflow("integer")),
            (Value::Int32(v), DataType::Float64) => Ok(Value::Float64(*v as f64)),
            (Value::Int64(v), DataType::Float64) => Ok(Value::Float64(*v as f64)),
            (Value::Float64(v), DataType::Int32) => {
                let r = libm::round(*v);
                if r.is_nan() || r < i32::MIN as f64 || r > i32::MAX as f64 {
                    Err(Error::overflow("integer"))
                } else {
                    Ok(Value::Int32(r as i32))
                }
            }
            (Value::Float64(v), DataType::Int64) => {
                let r = libm::round(*v);
                if r.is_nan() || r < i64::MIN as f64 || r >= i64::MAX as f64 {
                    Err(Error::overflow("bigint"))
                } else {
                    Ok(Value::Int64(r as i64))
                }
            }
            (Value::Boolean(b), DataType::Int32) => Ok(Value::Int32(*b as i32)),
            (Value::Boolean(b), DataType::Int64) => Ok(Value::Int64(*b as i64)),
            (Value::Int32(v), DataType::Boolean) => Ok(Value::Boolean(*v != 0)),
            (Value::Int64(v), DataType::Boolean) => Ok(Value::Boolean(*v != 0)),

            (Value::Text(s), DataType::Boolean) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "t" | "true" | "y" | "yes" | "on" | "1" => Ok(Value::Boolean(true)),
                    "f" | "false" | "n" | "no" | "off" | "0" => Ok(Value::Boolean(false)),
                    _ => Err(Error::invalid_cast(target, s.as_str())),
                }
            }
            (Value::Text(s), DataType::Int32) => s
                .trim()
                .parse::<i32>()
                .map(Value::Int32)
                .map_err(|_| Error::invalid_cast(target, s.as_str())),
            (Value::Text(s), DataType::Int64) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|_| Error::invalid_cast(target, s.as_str())),
            (Value::Text(s), DataType::Float64) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|_| Error::invalid_cast(target, s.as_str())),
            (Value::Text(s), DataType::Date) => temporal::parse_date(s)
                .map(Value::Date)
                .ok_or_else(|| Error::invalid_cast(target, s.as_str())),
            (Value::Text(s), DataType::Timestamp) => temporal::parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| Error::invalid_cast(target, s.as_str())),

            (Value::Date(d), DataType::Timestamp) => Ok(Value::Timestamp(*d as i64 * MICROS_PER_DAY)),
            (Value::Timestamp(t), DataType::Date) => {
                let days = t.div_euclid(MICROS_PER_DAY);
                i32::try_from(days)
                    .map(Value::Date)
                    .map_err(|_| Error::overflow("date"))
            }

            (other, _) => Err(Error::type_mismatch(
                target,
                other.data_type().unwrap_or(target),
            )),
        }
    }

    /// SQL comparison: `None` when either side is Null or the types do not compare.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (a, b) if a.is_temporal() && b.is_temporal() => {
                Some(a.as_timestamp()?.cmp(&b.as_timestamp()?))
            }
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => {
                    let (x, y) = (a.as_f64()?, b.as_f64()?);
                    Some(compare_f64(x, y))
                }
            },
        }
    }

    /// SQL equality with three-valued logic (`None` means unknown).
    pub fn sql_eq(&self, other: &Value) -> Option<bool> {
        self.sql_cmp(other).map(|o| o == Ordering::Equal)
    }

    fn is_temporal(&self) -> bool {
        matches!(self, Value::Date(_) | Value::Timestamp(_))
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int32(_) | Value::Int64(_) | Value::Float64(_) => 2,
            Value::Text(_) => 3,
            Value::Date(_) | Value::Timestamp(_) => 4,
        }
    }
}

/// Total order on floats: NaN sorts above every other value.
#[inline]
pub fn compare_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => {
                // NaN equals itself so values can key hash sets
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int32(i) => i.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => {
                if f.is_nan() {
                    f64::NAN.to_bits().hash(state)
                } else if *f == 0.0 {
                    0u64.hash(state)
                } else {
                    f.to_bits().hash(state)
                }
            }
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Timestamp(t) => t.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    /// Total order used by indexes and sorting: Null first, numerics compared
    /// across widths, otherwise by type.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => match self.sql_cmp(other) {
                Some(ordering) => ordering,
                None => self.type_order().cmp(&other.type_order()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => f.write_str(if *b { "true" } else { "false" }),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => {
                if v.is_nan() {
                    f.write_str("NaN")
                } else if v.is_infinite() {
                    f.write_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
                } else {
                    write!(f, "{}", v)
                }
            }
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => f.write_str(&temporal::format_date(*d)),
            Value::Timestamp(t) => f.write_str(&temporal::format_timestamp(*t)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_check() {
        assert_eq!(Value::Int64(42).data_type(), Some(DataType::Int64));
        assert_eq!(Value::Null.data_type(), None);
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Int32(1) < Value::Int32(2));
        assert!(Value::Int32(1) < Value::Int64(2));
        assert!(Value::Float64(1.5) > Value::Int64(1));
        assert!(Value::Text("a".into()) < Value::Text("b".into()));
        assert!(Value::Null < Value::Int32(0));
    }

    #[test]
    fn test_sql_cmp_null_is_unknown() {
        assert_eq!(Value::Null.sql_cmp(&Value::Int32(1)), None);
        assert_eq!(Value::Int32(1).sql_eq(&Value::Null), None);
        assert_eq!(Value::Int32(3).sql_eq(&Value::Int64(3)), Some(true));
        assert_eq!(Value::Text("a".into()).sql_cmp(&Value::Int32(1)), None);
    }

    #[test]
    fn test_cast_numeric() {
        assert_eq!(Value::Int32(7).cast_to(DataType::Int64).unwrap(), Value::Int64(7));
        assert_eq!(Value::Float64(2.5).cast_to(DataType::Int32).unwrap(), Value::Int32(3));
        assert_eq!(
            Value::Int64(i64::MAX).cast_to(DataType::Int32).unwrap_err().sqlstate(),
            "22003"
        );
    }

    #[test]
    fn test_cast_text() {
        assert_eq!(Value::Text(" 42 ".into()).cast_to(DataType::Int32).unwrap(), Value::Int32(42));
        assert_eq!(
            Value::Text("abc".into()).cast_to(DataType::Int32).unwrap_err().sqlstate(),
            "22P02"
        );
        assert_eq!(
            Value::Text("1970-01-03".into()).cast_to(DataType::Date).unwrap(),
            Value::Date(2)
        );
        assert_eq!(Value::Date(2).cast_to(DataType::Text).unwrap(), Value::Text("1970-01-03".into()));
        assert_eq!(Value::Null.cast_to(DataType::Int32).unwrap(), Value::Null);
    }

    #[test]
    fn test_display() {
        use alloc::string::ToString;
        assert_eq!(Value::Float64(3.0).to_string(), "3");
        assert_eq!(Value::Float64(2.5).to_string(), "2.5");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn test_value_from_impls() {
        let v: Value = 42i32.into();
        assert_eq!(v, Value::Int32(42));
        let v: Value = Some(100i64).into();
        assert_eq!(v.as_i64(), Some(100));
        let v: Value = None::<i32>.into();
        assert!(v.is_null());
    }
}
