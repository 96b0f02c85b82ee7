//! Control values
//!
//! Every control on an operation node holds a tagged value: a type from a
//! fixed vocabulary plus the payload for that type. The serialized form is
//! `{ "type": "text", "data": "hello" }`.

use serde::{Deserialize, Serialize};

/// The type vocabulary for control values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlValueType {
    /// Unicode text
    Text,
    /// Signed 64-bit integer
    Integer,
    /// Floating point number
    Number,
    /// Boolean flag
    Boolean,
    /// Raw byte sequence
    Bytes,
}

impl ControlValueType {
    /// Parse a type name as it appears in contribution records
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "bytes" => Some(Self::Bytes),
            _ => None,
        }
    }

    /// The name used in contribution records and serialized values
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Bytes => "bytes",
        }
    }
}

impl std::fmt::Display for ControlValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A tagged control value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ControlValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
}

impl ControlValue {
    /// The type tag of this value
    pub fn value_type(&self) -> ControlValueType {
        match self {
            Self::Text(_) => ControlValueType::Text,
            Self::Integer(_) => ControlValueType::Integer,
            Self::Number(_) => ControlValueType::Number,
            Self::Boolean(_) => ControlValueType::Boolean,
            Self::Bytes(_) => ControlValueType::Bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Read a `{ type, data }` record, rejecting any payload whose shape does
    /// not match its tag.
    pub fn from_tagged(value: &serde_json::Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "expected an object with 'type' and 'data'".to_string())?;
        let type_name = object
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| "missing string field 'type'".to_string())?;
        let value_type = ControlValueType::from_name(type_name)
            .ok_or_else(|| format!("unknown value type '{}'", type_name))?;
        let data = object
            .get("data")
            .ok_or_else(|| "missing field 'data'".to_string())?;
        Self::from_data(value_type, data)
            .ok_or_else(|| format!("data does not match value type '{}'", value_type))
    }

    /// Read a bare JSON primitive, picking the first of `types` whose shape
    /// matches the payload.
    pub fn from_untagged(value: &serde_json::Value, types: &[ControlValueType]) -> Option<Self> {
        types
            .iter()
            .find_map(|value_type| Self::from_data(*value_type, value))
    }

    /// Interpret `data` strictly as a payload of `value_type`
    pub fn from_data(value_type: ControlValueType, data: &serde_json::Value) -> Option<Self> {
        match value_type {
            ControlValueType::Text => data.as_str().map(|s| Self::Text(s.to_string())),
            ControlValueType::Integer => data.as_i64().map(Self::Integer),
            ControlValueType::Number => data.as_f64().map(Self::Number),
            ControlValueType::Boolean => data.as_bool().map(Self::Boolean),
            ControlValueType::Bytes => data
                .as_array()?
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Self::Bytes),
        }
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ControlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ControlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ControlValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Vec<u8>> for ControlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_serialization() {
        let value = ControlValue::Text("abc".to_string());
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, json!({"type": "text", "data": "abc"}));

        let parsed: ControlValue = serde_json::from_value(json!({"type": "integer", "data": 7})).unwrap();
        assert_eq!(parsed, ControlValue::Integer(7));
    }

    #[test]
    fn test_from_tagged_rejects_mismatched_data() {
        assert!(ControlValue::from_tagged(&json!({"type": "integer", "data": "3"})).is_err());
        assert!(ControlValue::from_tagged(&json!({"type": "integer", "data": 2.5})).is_err());
        assert!(ControlValue::from_tagged(&json!({"type": "bytes", "data": [1, 300]})).is_err());
        assert!(ControlValue::from_tagged(&json!({"type": "color", "data": "red"})).is_err());
        assert_eq!(
            ControlValue::from_tagged(&json!({"type": "bytes", "data": [0, 255]})).unwrap(),
            ControlValue::Bytes(vec![0, 255])
        );
    }

    #[test]
    fn test_from_untagged_uses_declared_types() {
        let types = [ControlValueType::Integer, ControlValueType::Text];
        assert_eq!(
            ControlValue::from_untagged(&json!(44), &types),
            Some(ControlValue::Integer(44))
        );
        assert_eq!(
            ControlValue::from_untagged(&json!("44"), &types),
            Some(ControlValue::Text("44".to_string()))
        );
        assert_eq!(ControlValue::from_untagged(&json!(true), &types), None);
    }

    #[test]
    fn test_value_type_names() {
        for value_type in [
            ControlValueType::Text,
            ControlValueType::Integer,
            ControlValueType::Number,
            ControlValueType::Boolean,
            ControlValueType::Bytes,
        ] {
            assert_eq!(ControlValueType::from_name(value_type.name()), Some(value_type));
        }
        assert_eq!(ControlValue::from(3i64).value_type(), ControlValueType::Integer);
    }
}
