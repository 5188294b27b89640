//! Scalar functions.

use crate::ast::ScalarFunc;
use alloc::string::{String, ToString};
use core::cmp::Ordering;
use strata_core::temporal;
use strata_core::{DataType, Error, Result, Value};

/// Evaluates a scalar function over already evaluated arguments.
pub fn scalar_function(func: ScalarFunc, args: &[Value]) -> Result<Value> {
    let (min, max) = func.arity();
    if args.len() < min || args.len() > max {
        return Err(Error::invalid_query(alloc::format!(
            "function {} takes {} to {} arguments, got {}",
            func.name(),
            min,
            max,
            args.len()
        )));
    }
    match func {
        ScalarFunc::Coalesce => return Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        ScalarFunc::Concat => {
            let mut out = String::new();
            for v in args.iter().filter(|v| !v.is_null()) {
                push_text(&mut out, v);
            }
            return Ok(Value::Text(out));
        }
        ScalarFunc::NullIf => {
            return Ok(if args[0].sql_eq(&args[1]) == Some(true) {
                Value::Null
            } else {
                args[0].clone()
            })
        }
        ScalarFunc::Greatest | ScalarFunc::Least => {
            let want = if func == ScalarFunc::Greatest {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best: Option<&Value> = None;
            for v in args.iter().filter(|v| !v.is_null()) {
                best = match best {
                    Some(b) if v.cmp(b) != want => Some(b),
                    _ => Some(v),
                };
            }
            return Ok(best.cloned().unwrap_or(Value::Null));
        }
        _ => {}
    }
    // everything else is strict
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    match func {
        ScalarFunc::Upper => Ok(Value::Text(text(&args[0]).to_uppercase())),
        ScalarFunc::Lower => Ok(Value::Text(text(&args[0]).to_lowercase())),
        ScalarFunc::Length => Ok(Value::Int32(text(&args[0]).chars().count() as i32)),
        ScalarFunc::Trim => Ok(Value::Text(String::from(text(&args[0]).trim_matches(' ')))),
        ScalarFunc::Substring => substring(&text(&args[0]), int_arg(&args[1])?, args.get(2).map(int_arg).transpose()?),
        ScalarFunc::Replace => {
            let (s, from, to) = (text(&args[0]), text(&args[1]), text(&args[2]));
            if from.is_empty() {
                Ok(Value::Text(s))
            } else {
                Ok(Value::Text(s.replace(from.as_str(), to.as_str())))
            }
        }
        ScalarFunc::Position => {
            let (needle, haystack) = (text(&args[0]), text(&args[1]));
            Ok(Value::Int32(match haystack.find(needle.as_str()) {
                Some(byte) => haystack[..byte].chars().count() as i32 + 1,
                None => 0,
            }))
        }
        ScalarFunc::Abs => match &args[0] {
            Value::Int32(v) => v.checked_abs().map(Value::Int32).ok_or_else(|| Error::overflow("integer")),
            Value::Int64(v) => v.checked_abs().map(Value::Int64).ok_or_else(|| Error::overflow("bigint")),
            other => Ok(Value::Float64(libm::fabs(float_arg(other)?))),
        },
        ScalarFunc::Round => {
            let digits = args.get(1).map(int_arg).transpose()?.unwrap_or(0);
            round(&args[0], digits)
        }
        ScalarFunc::Ceil => match &args[0] {
            v @ (Value::Int32(_) | Value::Int64(_)) => Ok(v.clone()),
            other => Ok(Value::Float64(libm::ceil(float_arg(other)?))),
        },
        ScalarFunc::Floor => match &args[0] {
            v @ (Value::Int32(_) | Value::Int64(_)) => Ok(v.clone()),
            other => Ok(Value::Float64(libm::floor(float_arg(other)?))),
        },
        ScalarFunc::Sqrt => {
            let x = float_arg(&args[0])?;
            if x < 0.0 {
                return Err(Error::invalid_parameter("cannot take square root of a negative number"));
            }
            Ok(Value::Float64(libm::sqrt(x)))
        }
        ScalarFunc::Power => {
            let (x, y) = (float_arg(&args[0])?, float_arg(&args[1])?);
            if x == 0.0 && y < 0.0 {
                return Err(Error::invalid_parameter("zero raised to a negative power is undefined"));
            }
            if x < 0.0 && libm::trunc(y) != y {
                return Err(Error::invalid_parameter(
                    "a negative number raised to a non-integer power yields a complex result",
                ));
            }
            Ok(Value::Float64(libm::pow(x, y)))
        }
        ScalarFunc::Extract(part) => {
            let micros = temporal_arg(&args[0])?;
            Ok(Value::Int64(temporal::extract(part, micros)))
        }
        ScalarFunc::DateTrunc(part) => {
            let micros = temporal_arg(&args[0])?;
            Ok(Value::Timestamp(temporal::truncate(part, micros)))
        }
        ScalarFunc::Coalesce | ScalarFunc::Concat | ScalarFunc::NullIf | ScalarFunc::Greatest | ScalarFunc::Least => {
            Err(Error::internal("non-strict function reached strict dispatch"))
        }
    }
}

/// Result type of `func`; `None` argument types are untyped NULLs.
pub fn function_type(func: ScalarFunc, args: &[Option<DataType>]) -> Result<Option<DataType>> {
    let first = args.first().copied().flatten();
    let ty = match func {
        ScalarFunc::Upper | ScalarFunc::Lower | ScalarFunc::Trim | ScalarFunc::Replace | ScalarFunc::Substring => {
            DataType::Text
        }
        ScalarFunc::Concat => DataType::Text,
        ScalarFunc::Length | ScalarFunc::Position => DataType::Int32,
        ScalarFunc::Coalesce | ScalarFunc::Greatest | ScalarFunc::Least => {
            let mut unified: Option<DataType> = None;
            for t in args.iter().flatten() {
                unified = Some(match unified {
                    None => *t,
                    Some(u) => u.unify(*t).ok_or_else(|| Error::type_mismatch(u, *t))?,
                });
            }
            return Ok(unified);
        }
        ScalarFunc::NullIf => return Ok(first),
        ScalarFunc::Abs | ScalarFunc::Round | ScalarFunc::Ceil | ScalarFunc::Floor => match first {
            None => return Ok(None),
            Some(t) if t.is_numeric() => t,
            Some(t) => return Err(Error::type_mismatch(DataType::Float64, t)),
        },
        ScalarFunc::Sqrt | ScalarFunc::Power => {
            for t in args.iter().flatten() {
                if !t.is_numeric() {
                    return Err(Error::type_mismatch(DataType::Float64, *t));
                }
            }
            DataType::Float64
        }
        ScalarFunc::Extract(_) => {
            check_temporal(first)?;
            DataType::Int64
        }
        ScalarFunc::DateTrunc(_) => {
            check_temporal(first)?;
            DataType::Timestamp
        }
    };
    Ok(Some(ty))
}

fn check_temporal(t: Option<DataType>) -> Result<()> {
    match t {
        Some(t) if !t.is_temporal() && t != DataType::Text => Err(Error::type_mismatch(DataType::Timestamp, t)),
        _ => Ok(()),
    }
}

fn push_text(out: &mut String, v: &Value) {
    match v {
        Value::Text(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

fn int_arg(v: &Value) -> Result<i64> {
    match v {
        Value::Float64(f) => Ok(libm::round(*f) as i64),
        other => other
            .as_i64()
            .ok_or_else(|| Error::type_mismatch(DataType::Int64, other.data_type().unwrap_or(DataType::Int64))),
    }
}

fn float_arg(v: &Value) -> Result<f64> {
    v.as_f64()
        .ok_or_else(|| Error::type_mismatch(DataType::Float64, v.data_type().unwrap_or(DataType::Float64)))
}

fn temporal_arg(v: &Value) -> Result<i64> {
    match v {
        Value::Text(_) => v
            .cast_to(DataType::Timestamp)?
            .as_timestamp()
            .ok_or_else(|| Error::internal("timestamp cast")),
        other => other
            .as_timestamp()
            .ok_or_else(|| Error::type_mismatch(DataType::Timestamp, other.data_type().unwrap_or(DataType::Timestamp))),
    }
}

/// 1-based character substring; positions before the start are clipped.
fn substring(s: &str, start: i64, len: Option<i64>) -> Result<Value> {
    let end = match len {
        Some(l) if l < 0 => return Err(Error::invalid_parameter("negative substring length not allowed")),
        Some(l) => start.saturating_add(l),
        None => i64::MAX,
    };
    let from = start.max(1);
    if end <= from {
        return Ok(Value::Text(String::new()));
    }
    let out: String = s
        .chars()
        .skip((from - 1) as usize)
        .take((end - from).min(usize::MAX as i64) as usize)
        .collect();
    Ok(Value::Text(out))
}

fn round(v: &Value, digits: i64) -> Result<Value> {
    match v {
        Value::Int32(_) | Value::Int64(_) if digits >= 0 => Ok(v.clone()),
        Value::Int32(_) | Value::Int64(_) => {
            let x = v.as_i64().unwrap_or(0);
            let unit = 10i64.checked_pow((-digits).min(18) as u32).unwrap_or(i64::MAX);
            let rounded = (libm::round(x as f64 / unit as f64) as i64)
                .checked_mul(unit)
                .ok_or_else(|| Error::overflow("bigint"))?;
            match v {
                Value::Int32(_) => i32::try_from(rounded)
                    .map(Value::Int32)
                    .map_err(|_| Error::overflow("integer")),
                _ => Ok(Value::Int64(rounded)),
            }
        }
        other => {
            let x = float_arg(other)?;
            let scale = libm::pow(10.0, digits.clamp(-308, 308) as f64);
            Ok(Value::Float64(libm::round(x * scale) / scale))
        }
    }
}
