mod array;
mod sql;

pub use array::Array;
pub use sql::Sql;

use crate::{typecast, Model};
use griddle_core::{Error, Result, Row, Value};

/// A dataset-level statement that a SQL persistence can build.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Full projection of the dataset.
    Select,
    Insert,
    Update,
    Delete,
    Count,
    Exists,
    /// A single column of the dataset, usable as a sub-select.
    Field { name: String },
    /// An aggregate function over one column. `coalesce` folds an empty
    /// dataset to zero.
    Fx {
        fx: String,
        field: String,
        coalesce: bool,
    },
}

/// Where records live. Both backends speak the same operations so model
/// code never branches on the backend.
#[derive(Debug)]
pub enum Persistence {
    Sql(Sql),
    Array(Array),
}

impl Persistence {
    pub fn as_sql(&self) -> Option<&Sql> {
        match self {
            Persistence::Sql(sql) => Some(sql),
            Persistence::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Persistence::Array(array) => Some(array),
            Persistence::Sql(_) => None,
        }
    }

    /// Runs `f` inside a transaction. Nested calls join the outer
    /// transaction; the array backend runs `f` as-is.
    pub fn atomic<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        match self {
            Persistence::Sql(sql) => sql.atomic(f),
            Persistence::Array(_) => f(),
        }
    }

    pub(crate) fn insert_row(&self, model: &Model, row: &Row) -> Result<Value> {
        match self {
            Persistence::Sql(sql) => sql.insert_row(model, row),
            Persistence::Array(array) => array.insert_row(model, row),
        }
    }

    pub(crate) fn update_row(&self, model: &Model, changes: &Row) -> Result<()> {
        match self {
            Persistence::Sql(sql) => sql.update_row(model, changes),
            Persistence::Array(array) => array.update_row(model, changes),
        }
    }

    pub(crate) fn delete_row(&self, model: &Model) -> Result<()> {
        match self {
            Persistence::Sql(sql) => sql.delete_row(model),
            Persistence::Array(array) => array.delete_row(model),
        }
    }

    pub(crate) fn load(&self, model: &Model, id: &Value) -> Result<Option<Row>> {
        match self {
            Persistence::Sql(sql) => sql.load(model, id),
            Persistence::Array(array) => array.load(model, id),
        }
    }

    pub(crate) fn load_any(&self, model: &Model) -> Result<Option<Row>> {
        match self {
            Persistence::Sql(sql) => sql.load_any(model),
            Persistence::Array(array) => array.load_any(model),
        }
    }

    pub(crate) fn select(&self, model: &Model) -> Result<Vec<Row>> {
        match self {
            Persistence::Sql(sql) => sql.select(model),
            Persistence::Array(array) => array.select(model),
        }
    }

    pub(crate) fn count(&self, model: &Model) -> Result<Value> {
        match self {
            Persistence::Sql(sql) => sql.count(model),
            Persistence::Array(array) => array.count(model),
        }
    }

    pub(crate) fn exists(&self, model: &Model) -> Result<bool> {
        match self {
            Persistence::Sql(sql) => sql.exists(model),
            Persistence::Array(array) => array.exists(model),
        }
    }

    pub(crate) fn fx(&self, model: &Model, fx: &str, field: &str, coalesce: bool) -> Result<Value> {
        match self {
            Persistence::Sql(sql) => sql.fx(model, fx, field, coalesce),
            Persistence::Array(array) => array.fx(model, fx, field, coalesce),
        }
    }

    pub(crate) fn insert_raw(&self, table: &str, row: &Row) -> Result<Value> {
        match self {
            Persistence::Sql(sql) => sql.insert_raw(table, row),
            Persistence::Array(_) => Err(joined_tables_unsupported()),
        }
    }

    pub(crate) fn update_raw(
        &self,
        table: &str,
        changes: &Row,
        key_field: &str,
        key: &Value,
    ) -> Result<()> {
        match self {
            Persistence::Sql(sql) => sql.update_raw(table, changes, key_field, key),
            Persistence::Array(_) => Err(joined_tables_unsupported()),
        }
    }

    pub(crate) fn delete_raw(&self, table: &str, key_field: &str, key: &Value) -> Result<()> {
        match self {
            Persistence::Sql(sql) => sql.delete_raw(table, key_field, key),
            Persistence::Array(_) => Err(joined_tables_unsupported()),
        }
    }
}

fn joined_tables_unsupported() -> Error {
    Error::unsupported("array persistence does not support joined tables")
}

/// A model row (field names, model-typed values) as the backend stores it
/// (column names, persisted-typed values).
pub(crate) fn save_row(model: &Model, row: &Row) -> Result<Row> {
    let mut out = Row::new();
    for (name, value) in row {
        let field = model.field(name)?;
        out.insert(
            field.persisted_name().to_string(),
            typecast::save_value(field, value)?,
        );
    }
    Ok(out)
}

/// The reverse of [`save_row`]. Columns no field claims are dropped;
/// fields the row does not carry stay absent.
pub(crate) fn load_row(model: &Model, row: &Row) -> Result<Row> {
    let mut out = Row::new();
    for field in model.fields() {
        let value = row
            .get(field.name())
            .or_else(|| row.get(field.persisted_name()));
        let Some(value) = value else { continue };
        out.insert(field.name().to_string(), typecast::load_value(field, value)?);
    }
    Ok(out)
}
