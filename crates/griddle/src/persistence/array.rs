use crate::persistence;
use crate::{typecast, Model};

use griddle_core::{Error, Result, Row, Value};
use indexmap::IndexMap;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

type Table = IndexMap<String, Row>;

/// In-memory persistence.
///
/// Rows are held the way a database would store them, so typecasting
/// behaves identically to the SQL backend. Cloning shares the store,
/// which is how contained documents hand their rows around.
#[derive(Debug, Clone, Default)]
pub struct Array {
    store: Rc<RefCell<IndexMap<String, Table>>>,
}

impl Array {
    pub fn new() -> Array {
        Array::default()
    }

    /// Seeds a table with rows in stored form. Rows carrying an id keep
    /// it; the rest get sequential ids.
    pub fn seed(&self, table: &str, rows: Vec<Row>, id_field: &str) -> Result<()> {
        let mut store = self.store.borrow_mut();
        let entries = store.entry(table.to_string()).or_default();
        for mut row in rows {
            let id = match row.get(id_field) {
                Some(value) if !value.is_null() => value.clone(),
                _ => {
                    let next = next_id(entries);
                    row.insert(id_field.to_string(), next.clone());
                    next
                }
            };
            entries.insert(id_key(&id)?, row);
        }
        Ok(())
    }

    /// Every row of a table, in stored form.
    pub fn table_rows(&self, table: &str) -> Vec<Row> {
        self.store
            .borrow()
            .get(table)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn insert_row(&self, model: &Model, row: &Row) -> Result<Value> {
        guard_joins(model)?;
        let mut wire = persistence::save_row(model, row)?;

        let mut store = self.store.borrow_mut();
        let entries = store.entry(model.table().to_string()).or_default();
        let id = match wire.get(model.id_field()) {
            Some(value) if !value.is_null() => value.clone(),
            _ => next_id(entries),
        };
        let key = id_key(&id)?;
        if entries.contains_key(&key) {
            return Err(Error::configuration(format!(
                "record with id={key} already exists"
            )));
        }
        wire.insert(model.id_field().to_string(), id.clone());
        entries.insert(key, wire);
        drop(store);

        typecast::load_value(model.field(model.id_field())?, &id)
    }

    pub(crate) fn update_row(&self, model: &Model, changes: &Row) -> Result<()> {
        guard_joins(model)?;
        let id = model
            .id()
            .ok_or_else(|| Error::configuration("record is not loaded"))?;
        let key = id_key(&model.wire_id(id)?)?;
        let wire = persistence::save_row(model, changes)?;

        let mut store = self.store.borrow_mut();
        let row = store
            .get_mut(model.table())
            .and_then(|entries| entries.get_mut(&key))
            .ok_or_else(|| Error::not_found(format!("no record matching id={key}")))?;
        for (column, value) in wire {
            row.insert(column, value);
        }
        Ok(())
    }

    pub(crate) fn delete_row(&self, model: &Model) -> Result<()> {
        guard_joins(model)?;
        let id = model
            .id()
            .ok_or_else(|| Error::configuration("record is not loaded"))?;
        let key = id_key(&model.wire_id(id)?)?;

        let mut store = self.store.borrow_mut();
        store
            .get_mut(model.table())
            .and_then(|entries| entries.shift_remove(&key))
            .ok_or_else(|| Error::not_found(format!("no record matching id={key}")))?;
        Ok(())
    }

    pub(crate) fn load(&self, model: &Model, id: &Value) -> Result<Option<Row>> {
        guard_joins(model)?;
        let key = id_key(&model.wire_id(id)?)?;
        let wire = {
            let store = self.store.borrow();
            store
                .get(model.table())
                .and_then(|entries| entries.get(&key))
                .cloned()
        };
        let Some(wire) = wire else { return Ok(None) };
        if !model.scope().matches(model, &wire)? {
            return Ok(None);
        }
        Ok(Some(project(model, &wire)?))
    }

    pub(crate) fn load_any(&self, model: &Model) -> Result<Option<Row>> {
        guard_joins(model)?;
        let mut rows = self.matching_rows(model)?;
        sort_rows(model, &mut rows)?;
        match rows.first() {
            Some(wire) => Ok(Some(project(model, wire)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn select(&self, model: &Model) -> Result<Vec<Row>> {
        guard_joins(model)?;
        let mut rows = self.matching_rows(model)?;
        sort_rows(model, &mut rows)?;
        apply_limit(rows, model.limit_spec())
            .iter()
            .map(|wire| project(model, wire))
            .collect()
    }

    pub(crate) fn count(&self, model: &Model) -> Result<Value> {
        guard_joins(model)?;
        Ok(Value::I64(self.matching_rows(model)?.len() as i64))
    }

    pub(crate) fn exists(&self, model: &Model) -> Result<bool> {
        guard_joins(model)?;
        Ok(!self.matching_rows(model)?.is_empty())
    }

    pub(crate) fn fx(&self, model: &Model, fx: &str, field: &str, coalesce: bool) -> Result<Value> {
        guard_joins(model)?;
        let field = model.field(field)?;
        if field.is_expression() {
            return Err(Error::unsupported(format!(
                "array persistence cannot aggregate expression field {:?}",
                field.name()
            )));
        }
        let key = field.persisted_name();

        let mut values = Vec::new();
        for row in self.matching_rows(model)? {
            match row.get(key) {
                Some(value) if !value.is_null() => {
                    values.push(typecast::load_value(field, value)?);
                }
                _ => {}
            }
        }
        aggregate(fx, &values, coalesce)
    }

    /// Stored rows matching the model's conditions, unordered and
    /// unlimited. Count and exists work from this set, mirroring how
    /// the SQL backend leaves order and limit out of those statements.
    fn matching_rows(&self, model: &Model) -> Result<Vec<Row>> {
        let store = self.store.borrow();
        let mut rows = Vec::new();
        if let Some(entries) = store.get(model.table()) {
            for row in entries.values() {
                if model.scope().matches(model, row)? {
                    rows.push(row.clone());
                }
            }
        }
        Ok(rows)
    }
}

fn guard_joins(model: &Model) -> Result<()> {
    if model.joins().is_empty() {
        Ok(())
    } else {
        Err(super::joined_tables_unsupported())
    }
}

/// A stored row reduced to the model's projection. Expression fields have
/// no stored value and stay absent; a missing stored column reads as null,
/// the way a selected column would.
fn project(model: &Model, wire: &Row) -> Result<Row> {
    let mut out = Row::new();
    for field in model.fields() {
        if !model.projects(field) || field.is_expression() {
            continue;
        }
        let value = wire.get(field.persisted_name()).unwrap_or(&Value::Null);
        out.insert(field.name().to_string(), typecast::load_value(field, value)?);
    }
    Ok(out)
}

fn sort_rows(model: &Model, rows: &mut [Row]) -> Result<()> {
    let order = model.order_spec();
    if order.is_empty() {
        return Ok(());
    }
    let mut keys = Vec::with_capacity(order.len());
    for (name, descending) in order {
        let field = model.field(name)?;
        if field.is_expression() {
            return Err(Error::unsupported(format!(
                "array persistence cannot order by expression field {name:?}"
            )));
        }
        keys.push((field.persisted_name().to_string(), *descending));
    }
    rows.sort_by(|a, b| {
        for (key, descending) in &keys {
            let left = a.get(key).unwrap_or(&Value::Null);
            let right = b.get(key).unwrap_or(&Value::Null);
            let mut ordering = left.compare(right).unwrap_or(Ordering::Equal);
            if *descending {
                ordering = ordering.reverse();
            }
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn apply_limit(rows: Vec<Row>, limit: Option<(i64, Option<i64>)>) -> Vec<Row> {
    let Some((count, shift)) = limit else {
        return rows;
    };
    let shift = shift.unwrap_or(0).max(0) as usize;
    let count = count.max(0) as usize;
    rows.into_iter().skip(shift).take(count).collect()
}

fn next_id(entries: &Table) -> Value {
    let max = entries
        .keys()
        .filter_map(|key| key.parse::<i64>().ok())
        .max()
        .unwrap_or(0);
    Value::I64(max + 1)
}

fn id_key(id: &Value) -> Result<String> {
    match id {
        Value::I64(v) => Ok(v.to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Err(Error::unsupported(format!(
            "array persistence requires integer or string ids, got {}",
            other.type_name()
        ))),
    }
}

fn aggregate(fx: &str, values: &[Value], coalesce: bool) -> Result<Value> {
    if values.is_empty() {
        return Ok(if coalesce { Value::I64(0) } else { Value::Null });
    }
    match fx {
        "count" => Ok(Value::I64(values.len() as i64)),
        "sum" => sum(values),
        "avg" => {
            let total = match sum(values)? {
                Value::I64(v) => v as f64,
                Value::F64(v) => v,
                _ => 0.0,
            };
            Ok(Value::F64(total / values.len() as f64))
        }
        "min" => Ok(extreme(values, Ordering::Less)),
        "max" => Ok(extreme(values, Ordering::Greater)),
        other => Err(Error::unsupported(format!(
            "array persistence does not support aggregate {other:?}"
        ))),
    }
}

fn sum(values: &[Value]) -> Result<Value> {
    let mut int_total = 0i64;
    let mut float_total = 0f64;
    let mut float_seen = false;
    for value in values {
        match value {
            Value::I64(v) => int_total += v,
            Value::F64(v) => {
                float_seen = true;
                float_total += v;
            }
            other => {
                return Err(Error::invalid_format(format!(
                    "cannot sum {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(if float_seen {
        Value::F64(float_total + int_total as f64)
    } else {
        Value::I64(int_total)
    })
}

fn extreme(values: &[Value], keep: Ordering) -> Value {
    let mut best = values[0].clone();
    for value in &values[1..] {
        if value.compare(&best) == Some(keep) {
            best = value.clone();
        }
    }
    best
}
