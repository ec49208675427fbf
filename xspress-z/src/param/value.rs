//! Conversions from JSON values to the typed fields of the detector state.
//!
//! Each converter returns the failure reason as a plain string; the tree
//! attaches the path.

use serde_json::Value;

use crate::state::TriggerMode;

type Conv<T> = std::result::Result<T, String>;

pub fn to_u32(v: &Value) -> Conv<u32> {
    let n = to_i64(v).map_err(|_| format!("expected an unsigned integer, got {v}"))?;
    u32::try_from(n).map_err(|_| format!("{n} is out of range for an unsigned 32-bit integer"))
}

pub fn to_i64(v: &Value) -> Conv<i64> {
    if let Some(n) = v.as_i64() {
        return Ok(n);
    }
    match v.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Ok(f as i64)
        }
        _ => Err(format!("expected an integer, got {v}")),
    }
}

pub fn to_f64(v: &Value) -> Conv<f64> {
    v.as_f64().ok_or_else(|| format!("expected a number, got {v}"))
}

/// Render a float field; whole numbers read back as integers, so a write of
/// `8` is reported as `8` rather than `8.0`.
pub fn from_f64(f: f64) -> Value {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Value::from(f)
    }
}

/// Booleans also arrive as 0/1 from the control server.
pub fn to_bool(v: &Value) -> Conv<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        _ => Err(format!("expected a boolean, got {v}")),
    }
}

pub fn to_string(v: &Value) -> Conv<String> {
    v.as_str()
        .map(str::to_owned)
        .ok_or_else(|| format!("expected a string, got {v}"))
}

/// A JSON array of strings, or a single comma-separated string.
pub fn to_string_list(v: &Value) -> Conv<Vec<String>> {
    match v {
        Value::Array(items) => items.iter().map(to_string).collect(),
        Value::String(s) => Ok(split_list(s)),
        _ => Err(format!("expected a list of strings, got {v}")),
    }
}

pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn to_trigger_mode(v: &Value) -> Conv<TriggerMode> {
    match v {
        Value::String(name) => {
            TriggerMode::from_name(name).ok_or_else(|| format!("unknown trigger mode '{name}'"))
        }
        _ => {
            let code = to_i64(v).map_err(|_| format!("expected a trigger mode, got {v}"))?;
            u8::try_from(code)
                .ok()
                .and_then(TriggerMode::from_repr)
                .ok_or_else(|| format!("unknown trigger mode {code}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integers() {
        assert_eq!(to_u32(&json!(16384)), Ok(16384));
        assert_eq!(to_u32(&json!(4.0)), Ok(4));
        assert!(to_u32(&json!(-1)).is_err());
        assert!(to_u32(&json!(4.5)).is_err());
        assert!(to_u32(&json!("4")).is_err());
        assert_eq!(to_i64(&json!(-3)), Ok(-3));
    }

    #[test]
    fn test_floats() {
        assert_eq!(to_f64(&json!(8)), Ok(8.0));
        assert_eq!(from_f64(8.0), json!(8));
        assert_eq!(from_f64(-2.0), json!(-2));
        assert_eq!(from_f64(0.25), json!(0.25));
        assert_eq!(from_f64(f64::NAN), Value::Null);
        assert!(to_f64(&json!("8")).is_err());
    }

    #[test]
    fn test_bools() {
        assert_eq!(to_bool(&json!(true)), Ok(true));
        assert_eq!(to_bool(&json!(0)), Ok(false));
        assert_eq!(to_bool(&json!(1)), Ok(true));
        assert!(to_bool(&json!(2)).is_err());
        assert!(to_bool(&json!("true")).is_err());
    }

    #[test]
    fn test_string_lists() {
        assert_eq!(
            to_string_list(&json!("tcp://a:1, tcp://b:2,")),
            Ok(vec!["tcp://a:1".to_string(), "tcp://b:2".to_string()])
        );
        assert_eq!(
            to_string_list(&json!(["x", "y"])),
            Ok(vec!["x".to_string(), "y".to_string()])
        );
        assert!(to_string_list(&json!(["x", 1])).is_err());
    }

    #[test]
    fn test_trigger_modes() {
        assert_eq!(to_trigger_mode(&json!(2)), Ok(TriggerMode::Burst));
        assert_eq!(to_trigger_mode(&json!("idc")), Ok(TriggerMode::Idc));
        assert!(to_trigger_mode(&json!(42)).is_err());
        assert!(to_trigger_mode(&json!(true)).is_err());
    }
}
