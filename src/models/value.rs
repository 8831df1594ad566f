//! Parameter values and type tags for prepared statements.

use crate::error::BindingError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Parameter type named by a single tag character in `bind_param`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// `i`
    Integer,
    /// `d`
    Float,
    /// `s`
    Text,
    /// `b`
    Blob,
}

impl ParamType {
    /// Map a tag character to its parameter type.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'i' => Some(Self::Integer),
            'd' => Some(Self::Float),
            's' => Some(Self::Text),
            'b' => Some(Self::Blob),
            _ => None,
        }
    }

    pub fn tag(&self) -> char {
        match self {
            Self::Integer => 'i',
            Self::Float => 'd',
            Self::Text => 's',
            Self::Blob => 'b',
        }
    }

    /// Parse a tag string such as `"isd"`. The first unknown tag fails the whole string.
    pub fn parse_tags(types: &str) -> Result<Vec<Self>, BindingError> {
        types
            .chars()
            .map(|tag| {
                Self::from_tag(tag).ok_or_else(|| BindingError::InvalidType {
                    types: types.to_string(),
                    tag,
                })
            })
            .collect()
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Blob => "blob",
        };
        write!(f, "{}", name)
    }
}

/// A value supplied to `bind_param`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value, bound as backend NULL regardless of its tag
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Blob(Vec<u8>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A value coerced to its declared parameter type, ready for the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Null(ParamType),
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl BoundValue {
    /// Coerce the value at `index` to `ty`.
    pub fn coerce(index: usize, ty: ParamType, value: &Value) -> Result<Self, BindingError> {
        let incompatible = || BindingError::Incompatible {
            index,
            expected: ty,
        };

        if value.is_null() {
            return Ok(Self::Null(ty));
        }

        match ty {
            ParamType::Integer => match value {
                Value::Int(v) => Ok(Self::Integer(*v)),
                Value::Bool(v) => Ok(Self::Integer(i64::from(*v))),
                // i64::MAX as f64 rounds up to 2^63, which is out of range
                Value::Float(v)
                    if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 =>
                {
                    Ok(Self::Integer(*v as i64))
                }
                Value::Text(v) => v
                    .trim()
                    .parse::<i64>()
                    .map(Self::Integer)
                    .map_err(|_| incompatible()),
                _ => Err(incompatible()),
            },
            ParamType::Float => match value {
                Value::Int(v) => Ok(Self::Float(*v as f64)),
                Value::Float(v) => Ok(Self::Float(*v)),
                Value::Bool(v) => Ok(Self::Float(if *v { 1.0 } else { 0.0 })),
                Value::Text(v) => v
                    .trim()
                    .parse::<f64>()
                    .map(Self::Float)
                    .map_err(|_| incompatible()),
                _ => Err(incompatible()),
            },
            ParamType::Text => match value {
                Value::Text(v) => Ok(Self::Text(v.clone())),
                Value::Int(v) => Ok(Self::Text(v.to_string())),
                Value::Float(v) => Ok(Self::Text(v.to_string())),
                Value::Bool(v) => Ok(Self::Text(v.to_string())),
                Value::Blob(v) => String::from_utf8(v.clone())
                    .map(Self::Text)
                    .map_err(|_| incompatible()),
                Value::Null => Ok(Self::Null(ty)),
            },
            ParamType::Blob => match value {
                Value::Blob(v) => Ok(Self::Blob(v.clone())),
                Value::Text(v) => Ok(Self::Blob(v.clone().into_bytes())),
                _ => Err(incompatible()),
            },
        }
    }

    /// JSON form used when comparing against schemaless records.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null(_) => JsonValue::Null,
            Self::Integer(v) => JsonValue::Number((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Self::Text(v) => JsonValue::String(v.clone()),
            Self::Blob(v) => crate::db::types::encode_blob(v),
        }
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        assert_eq!(
            ParamType::parse_tags("idsb").unwrap(),
            vec![
                ParamType::Integer,
                ParamType::Float,
                ParamType::Text,
                ParamType::Blob
            ]
        );
        assert!(ParamType::parse_tags("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_tags_reports_first_unknown() {
        let err = ParamType::parse_tags("x?").unwrap_err();
        assert_eq!(
            err,
            BindingError::InvalidType {
                types: "x?".to_string(),
                tag: 'x'
            }
        );
    }

    #[test]
    fn test_null_binds_regardless_of_tag() {
        for ty in [ParamType::Integer, ParamType::Blob] {
            assert_eq!(
                BoundValue::coerce(0, ty, &Value::Null).unwrap(),
                BoundValue::Null(ty)
            );
        }
    }

    #[test]
    fn test_coerce_integer() {
        assert_eq!(
            BoundValue::coerce(0, ParamType::Integer, &Value::Text(" 42 ".into())).unwrap(),
            BoundValue::Integer(42)
        );
        assert_eq!(
            BoundValue::coerce(0, ParamType::Integer, &Value::Float(3.0)).unwrap(),
            BoundValue::Integer(3)
        );
        assert!(matches!(
            BoundValue::coerce(1, ParamType::Integer, &Value::Float(3.5)),
            Err(BindingError::Incompatible { index: 1, .. })
        ));
    }

    #[test]
    fn test_coerce_integer_rejects_out_of_range_floats() {
        for v in [1e20, -1e20, 9_223_372_036_854_775_808.0, f64::INFINITY, f64::NAN] {
            assert!(matches!(
                BoundValue::coerce(2, ParamType::Integer, &Value::Float(v)),
                Err(BindingError::Incompatible { index: 2, .. })
            ));
        }
        assert_eq!(
            BoundValue::coerce(0, ParamType::Integer, &Value::Float(-9_223_372_036_854_775_808.0))
                .unwrap(),
            BoundValue::Integer(i64::MIN)
        );
    }

    #[test]
    fn test_coerce_text_and_blob() {
        assert_eq!(
            BoundValue::coerce(0, ParamType::Text, &Value::Int(7)).unwrap(),
            BoundValue::Text("7".into())
        );
        assert_eq!(
            BoundValue::coerce(0, ParamType::Blob, &Value::Text("ab".into())).unwrap(),
            BoundValue::Blob(vec![b'a', b'b'])
        );
        assert!(BoundValue::coerce(0, ParamType::Text, &Value::Blob(vec![0xFF])).is_err());
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
    }

    #[test]
    fn test_value_json_untagged() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 1, 1.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(1),
                Value::Float(1.5),
                Value::Text("x".into())
            ]
        );
    }
}
