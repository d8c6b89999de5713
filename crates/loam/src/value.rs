//! Owned binding values.
//!
//! [`Value`] is the single currency between builders, the compiler, the
//! executor boundary, and the identity map. It is deliberately small:
//! driver-specific scalar types belong to the embedder's casting layer.

use std::hash::{Hash, Hasher};

/// An owned SQL binding value.
#[derive(Debug, Clone)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Bytes(Vec<u8>),
}

impl Value {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as a SQL literal.
    ///
    /// Used only by the `to_raw_sql` debug rendering. Executed statements
    /// always go through `?` placeholders, never through this.
    pub fn literal(&self) -> String {
        match self {
            Value::Null => String::from("NULL"),
            Value::Bool(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Value::Int(n) => format!("{n}"),
            Value::Float(f) => format!("{f}"),
            Value::Text(s) => {
                // Escape single quotes by doubling them
                let escaped = s.replace('\'', "''");
                format!("'{escaped}'")
            }
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }

    /// Project the value into JSON for the serialization walk.
    ///
    /// Floats that JSON cannot carry (NaN, infinities) become null; blobs
    /// are rendered as uppercase hex strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                serde_json::Value::String(hex)
            }
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Bit-pattern comparison so Value can be a map key.
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
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
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_null() {
        assert_eq!(Value::Null.literal(), "NULL");
    }

    #[test]
    fn literal_bool() {
        assert_eq!(Value::Bool(true).literal(), "TRUE");
        assert_eq!(Value::Bool(false).literal(), "FALSE");
    }

    #[test]
    fn literal_numeric_is_bare() {
        assert_eq!(Value::Int(-42).literal(), "-42");
        assert_eq!(Value::Float(1.5).literal(), "1.5");
    }

    #[test]
    fn literal_text_escapes_quotes() {
        assert_eq!(Value::from("it's").literal(), "'it''s'");
    }

    #[test]
    fn literal_bytes_hex() {
        assert_eq!(Value::Bytes(vec![0xDE, 0xAD]).literal(), "X'DEAD'");
    }

    #[test]
    fn option_none_is_null() {
        assert!(Value::from(None::<i64>).is_null());
    }

    #[test]
    fn serializes_to_json() {
        assert_eq!(
            serde_json::to_value(Value::Int(7)).unwrap(),
            serde_json::json!(7)
        );
        assert_eq!(
            serde_json::to_value(Value::from("hi")).unwrap(),
            serde_json::json!("hi")
        );
        assert_eq!(
            serde_json::to_value(Value::Null).unwrap(),
            serde_json::Value::Null
        );
    }

    #[test]
    fn float_values_usable_as_keys() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Value::Float(1.0));
        assert!(set.contains(&Value::Float(1.0)));
        assert!(!set.contains(&Value::Float(2.0)));
    }
}
