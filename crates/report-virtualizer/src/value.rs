#![forbid(unsafe_code)]

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A single field value produced by a data source.
///
/// The cache never interprets values; it only needs to store them and hand the exact same
/// sequence back. Equality is therefore bit-exact: two [`Value::Number`]s compare equal iff
/// their IEEE-754 bit patterns match (`-0.0 != 0.0`, and a NaN equals itself).
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Arc<str>),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
}

/// The variant of a non-null [`Value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Integer,
    Number,
    String,
    DateTime,
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ValueKind::Boolean),
            Value::Integer(_) => Some(ValueKind::Integer),
            Value::Number(_) => Some(ValueKind::Number),
            Value::String(_) => Some(ValueKind::String),
            Value::DateTime(_) => Some(ValueKind::DateTime),
        }
    }

    /// The integer payload of an affine-eligible value (`Integer` / `DateTime`).
    pub(crate) fn as_ordinal(&self) -> Option<i64> {
        match self {
            Value::Integer(v) | Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Approximate heap bytes owned by this value (beyond the enum itself).
    pub(crate) fn heap_size_bytes(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            _ => 0,
        }
    }
}

impl ValueKind {
    /// Rebuild a value of this kind from an ordinal payload.
    ///
    /// Only `Integer` and `DateTime` carry ordinals; other kinds never reach affine storage.
    pub(crate) fn from_ordinal(self, v: i64) -> Value {
        match self {
            ValueKind::DateTime => Value::DateTime(v),
            _ => Value::Integer(v),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Integer(v) | Value::DateTime(v) => v.hash(state),
            Value::Number(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Number(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::DateTime(v) => write!(f, "@{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_equality_is_bitwise() {
        assert_ne!(Value::Number(0.0), Value::Number(-0.0));
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Integer(1), Value::DateTime(1));
    }

    #[test]
    fn option_conversion_maps_none_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::string("a"));
    }
}
