use serde::{Deserialize, Serialize};

/// The declared type of a model field.
///
/// Field types drive typecasting between application values and what the
/// persistence stores. A field without a declared type passes values through
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Single-line string
    String,

    /// Multi-line string
    Text,

    /// Signed 64-bit integer
    Integer,

    /// 64-bit floating point number
    Float,

    /// Boolean flag
    Boolean,

    /// Monetary amount, rounded to 4 decimal places
    Money,

    /// Calendar date
    Date,

    /// Date with time, stored in UTC
    DateTime,

    /// Time of day
    Time,

    /// Ordered list, serialized as JSON in SQL stores
    Array,

    /// Key-value structure, serialized as JSON in SQL stores
    Object,
}

impl FieldType {
    /// Parses a type name as written in field declarations.
    pub fn from_name(name: &str) -> Option<FieldType> {
        Some(match name {
            "string" => FieldType::String,
            "text" => FieldType::Text,
            "integer" => FieldType::Integer,
            "float" => FieldType::Float,
            "boolean" => FieldType::Boolean,
            "money" => FieldType::Money,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "time" => FieldType::Time,
            "array" => FieldType::Array,
            "object" => FieldType::Object,
            _ => return None,
        })
    }

    /// Returns the name used in field declarations.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Money => "money",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Time => "time",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    /// Whether values of this type are serialized as JSON text by SQL stores.
    pub fn is_json_encoded(&self) -> bool {
        matches!(self, FieldType::Array | FieldType::Object)
    }
}

impl core::fmt::Display for FieldType {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
