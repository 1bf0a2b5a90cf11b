//! Nested values and selector metadata.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-column metadata of a selector: key to one value per column.
///
/// Every entry has exactly as many values as the selector has columns.
/// Missing positions hold [`Value::None`].
pub type MetaData = IndexMap<String, Vec<Value>>;

/// A dynamically typed, possibly nested value.
///
/// Covers everything the recorder persists: numbers, strings, lists and
/// string-keyed mappings. Anything outside this set cannot be constructed,
/// so no runtime type check is needed at write time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value.
    #[default]
    None,
    /// Signed integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Ordered heterogeneous list.
    List(Vec<Value>),
    /// Insertion-ordered string-keyed mapping.
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Whether this is [`Value::None`].
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Whether this is an integer or a float.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view of an integer or float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Borrow the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type tag used by custom result columns.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
        }
    }

    /// Parse the textual form produced by `Display` for scalars.
    ///
    /// Integers and floats are recovered, `None` maps back to
    /// [`Value::None`], everything else stays a string.
    pub fn parse_scalar(s: &str) -> Value {
        if s == "None" {
            Value::None
        } else if let Ok(i) = s.parse::<i64>() {
            Value::Int(i)
        } else if let Ok(x) = s.parse::<f64>() {
            Value::Float(x)
        } else {
            Value::Str(s.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nested() {
        let mut m = IndexMap::new();
        m.insert("a".to_string(), Value::List(vec![1.into(), Value::None]));
        assert_eq!(Value::Map(m).to_string(), "{a: [1, None]}");
    }

    #[test]
    fn parse_scalar_recovers_numbers() {
        assert_eq!(Value::parse_scalar("12"), Value::Int(12));
        assert_eq!(Value::parse_scalar("1.5"), Value::Float(1.5));
        assert_eq!(Value::parse_scalar("None"), Value::None);
        assert_eq!(Value::parse_scalar("comp"), Value::from("comp"));
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::None);
        assert_eq!(Value::from(Some(2.0)), Value::Float(2.0));
    }
}
