use griddle_core::{Error, Result, Value as CoreValue};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

/// Bridge between griddle values and rusqlite's value types.
#[derive(Debug)]
pub struct Value(CoreValue);

impl From<CoreValue> for Value {
    fn from(value: CoreValue) -> Self {
        Self(value)
    }
}

impl Value {
    pub fn into_inner(self) -> CoreValue {
        self.0
    }

    /// Reads one column of a result row.
    ///
    /// SQLite only distinguishes null, integer, real, text and blob; richer
    /// types are recovered later from the field definitions.
    pub fn from_sql(row: &rusqlite::Row, index: usize) -> Result<Self> {
        let value = row
            .get_ref(index)
            .map_err(|err| Error::execution(format!("column {index}"), err))?;

        let core_value = match value {
            ValueRef::Null => CoreValue::Null,
            ValueRef::Integer(value) => CoreValue::I64(value),
            ValueRef::Real(value) => CoreValue::F64(value),
            ValueRef::Text(value) => match core::str::from_utf8(value) {
                Ok(text) => CoreValue::String(text.to_string()),
                Err(_) => CoreValue::Bytes(value.to_vec()),
            },
            ValueRef::Blob(value) => CoreValue::Bytes(value.to_vec()),
        };

        Ok(Value(core_value))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match &self.0 {
            CoreValue::Null => Ok(ToSqlOutput::Owned(SqlValue::Null)),
            CoreValue::Bool(true) => Ok(ToSqlOutput::Owned(SqlValue::Integer(1))),
            CoreValue::Bool(false) => Ok(ToSqlOutput::Owned(SqlValue::Integer(0))),
            CoreValue::I64(v) => Ok(ToSqlOutput::Owned(SqlValue::Integer(*v))),
            CoreValue::F64(v) => Ok(ToSqlOutput::Owned(SqlValue::Real(*v))),
            CoreValue::String(v) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes()))),
            CoreValue::Bytes(v) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&v[..]))),
            CoreValue::Date(v) => Ok(ToSqlOutput::Owned(SqlValue::Text(
                v.format("%Y-%m-%d").to_string(),
            ))),
            CoreValue::Time(v) => Ok(ToSqlOutput::Owned(SqlValue::Text(
                v.format("%H:%M:%S%.f").to_string(),
            ))),
            CoreValue::DateTime(v) => Ok(ToSqlOutput::Owned(SqlValue::Text(
                v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            ))),
            CoreValue::Json(v) => match serde_json::to_string(v) {
                Ok(text) => Ok(ToSqlOutput::Owned(SqlValue::Text(text))),
                Err(err) => Err(rusqlite::Error::ToSqlConversionFailure(Box::new(err))),
            },
            // Lists are expanded into individual placeholders at render time
            CoreValue::List(_) => Err(rusqlite::Error::ToSqlConversionFailure(
                format!("cannot bind {} directly", self.0.type_name()).into(),
            )),
        }
    }
}
