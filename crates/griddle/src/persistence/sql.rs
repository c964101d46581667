use crate::hooks::{self, EventKind};
use crate::persistence::{self, Action};
use crate::{typecast, Model};

use griddle_core::{Error, Result, Row, Value};
use griddle_sql::{
    CondField, CondValue, Connection, Dialect, Expression, Mode, Operator, Query, WhereTerm,
};

use std::cell::RefCell;

/// Persistence backed by a SQL database.
///
/// Every dataset operation is expressed as a [`Query`] first, so
/// [`Model::action`](crate::Model::action) can hand the statement out for
/// composition instead of executing it.
#[derive(Debug)]
pub struct Sql {
    connection: RefCell<Connection>,
}

impl Sql {
    pub fn new(connection: Connection) -> Sql {
        Sql {
            connection: RefCell::new(connection),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.connection.borrow().dialect()
    }

    /// Runs hand-built statements on this persistence's connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut connection = self.connection.borrow_mut();
        f(&mut connection)
    }

    /// Runs `f` inside a transaction; nested calls join the outer one.
    ///
    /// The connection is released between statements so `f` is free to run
    /// further operations on this persistence.
    pub fn atomic<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.connection.borrow_mut().begin()?;
        match f() {
            Ok(value) => {
                self.connection.borrow_mut().commit()?;
                Ok(value)
            }
            Err(err) => {
                if self.connection.borrow_mut().rollback().is_err() {
                    return Err(err.context("transaction rollback also failed"));
                }
                Err(err)
            }
        }
    }

    /// The statement behind a dataset operation, ready to render or refine.
    pub(crate) fn action(&self, model: &Model, action: Action) -> Result<Query> {
        let dialect = self.dialect();
        match action {
            Action::Select => {
                let mut query = self.base_select(model, dialect)?;
                self.add_projection(model, &mut query, dialect)?;
                for (field, descending) in model.order_spec() {
                    query.order(model.field_expression(field, dialect)?, *descending);
                }
                if let Some((count, shift)) = model.limit_spec() {
                    query.limit(Some(count), shift);
                }
                Ok(query)
            }
            Action::Field { name } => {
                let mut query = self.base_select(model, dialect)?;
                query.field(model.field_expression(&name, dialect)?);
                for (field, descending) in model.order_spec() {
                    query.order(model.field_expression(field, dialect)?, *descending);
                }
                if let Some((count, shift)) = model.limit_spec() {
                    query.limit(Some(count), shift);
                }
                if let Some(id) = model.id() {
                    query.where_(self.id_condition(model, dialect, id)?);
                }
                Ok(query)
            }
            Action::Count => {
                let mut query = self.base_select(model, dialect)?;
                query.field(Expression::new("count(*)"));
                Ok(query)
            }
            Action::Exists => {
                let inner = self.action(model, Action::Select)?;
                let mut query = Query::new();
                query.field(Expression::new("exists []").arg(inner));
                Ok(query)
            }
            Action::Fx {
                fx,
                field,
                coalesce,
            } => {
                if fx.is_empty() || !fx.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(Error::configuration(format!(
                        "invalid aggregate function {fx:?}"
                    )));
                }
                let mut query = self.base_select(model, dialect)?;
                let template = if coalesce {
                    format!("coalesce({fx}([]), 0)")
                } else {
                    format!("{fx}([])")
                };
                query.field(Expression::new(template).arg(model.field_expression(&field, dialect)?));
                Ok(query)
            }
            Action::Insert => {
                let mut query = Query::new();
                query.mode(Mode::Insert)?;
                query.table(model.table())?;
                Ok(query)
            }
            Action::Update => {
                let mut query = Query::new();
                query.mode(Mode::Update)?;
                query.table(model.table())?;
                model.scope().apply(model, &mut query, dialect, false)?;
                Ok(query)
            }
            Action::Delete => {
                let mut query = Query::new();
                query.mode(Mode::Delete)?;
                query.table(model.table())?;
                model.scope().apply(model, &mut query, dialect, false)?;
                Ok(query)
            }
        }
    }

    /// Table, joins and conditions shared by every reading action.
    fn base_select(&self, model: &Model, dialect: Dialect) -> Result<Query> {
        let mut query = Query::new();
        match model.table_alias() {
            Some(alias) => query.table_as(model.table(), alias)?,
            None => query.table(model.table())?,
        };
        let master_prefix = model.sql_prefix().unwrap_or_else(|| model.table());
        for join in model.joins() {
            query.join_kind(
                join.kind_str(),
                &join.table_spec(),
                Some(join.on_expression(master_prefix)),
            );
        }
        model.scope().apply(model, &mut query, dialect, false)?;
        hooks::fire_query(model, EventKind::InitSelectQuery, &mut query)?;
        Ok(query)
    }

    fn add_projection(&self, model: &Model, query: &mut Query, dialect: Dialect) -> Result<()> {
        for field in model.fields() {
            if !model.projects(field) {
                continue;
            }
            let expr = model.field_expression(field.name(), dialect)?;
            if field.use_alias() {
                query.field_as(expr, field.name())?;
            } else {
                query.field(expr);
            }
        }
        Ok(())
    }

    fn id_condition(&self, model: &Model, dialect: Dialect, id: &Value) -> Result<WhereTerm> {
        Ok(WhereTerm::Cond {
            field: CondField::Expr(model.field_expression(model.id_field(), dialect)?),
            op: Operator::Eq,
            value: CondValue::Value(model.wire_id(id)?),
        })
    }

    // --- executed operations ---------------------------------------------

    pub(crate) fn insert_row(&self, model: &Model, row: &Row) -> Result<Value> {
        let wire = persistence::save_row(model, row)?;
        let mut query = self.action(model, Action::Insert)?;
        for (column, value) in &wire {
            query.set(column, value.clone());
        }
        self.execute(&query)?;

        match row.get(model.id_field()) {
            Some(id) if !id.is_null() => Ok(id.clone()),
            _ => {
                let raw = self.connection.borrow_mut().last_insert_id()?;
                typecast::load_value(model.field(model.id_field())?, &raw)
            }
        }
    }

    pub(crate) fn update_row(&self, model: &Model, changes: &Row) -> Result<()> {
        let id = model
            .id()
            .ok_or_else(|| Error::configuration("record is not loaded"))?;
        let wire = persistence::save_row(model, changes)?;
        let mut query = self.action(model, Action::Update)?;
        for (column, value) in &wire {
            query.set(column, value.clone());
        }
        query.where_((model.id_field(), model.wire_id(id)?));

        hooks::fire_query(model, EventKind::BeforeUpdateQuery, &mut query)?;
        self.execute(&query)?;
        hooks::fire_query(model, EventKind::AfterUpdateQuery, &mut query)?;
        Ok(())
    }

    pub(crate) fn delete_row(&self, model: &Model) -> Result<()> {
        let id = model
            .id()
            .ok_or_else(|| Error::configuration("record is not loaded"))?;
        let mut query = self.action(model, Action::Delete)?;
        query.where_((model.id_field(), model.wire_id(id)?));
        self.execute(&query)?;
        Ok(())
    }

    pub(crate) fn load(&self, model: &Model, id: &Value) -> Result<Option<Row>> {
        let dialect = self.dialect();
        let mut query = self.action(model, Action::Select)?;
        query.where_(self.id_condition(model, dialect, id)?);
        query.limit(Some(1), None);
        self.fetch_model_row(model, &query)
    }

    pub(crate) fn load_any(&self, model: &Model) -> Result<Option<Row>> {
        let mut query = self.action(model, Action::Select)?;
        query.limit(Some(1), None);
        self.fetch_model_row(model, &query)
    }

    pub(crate) fn select(&self, model: &Model) -> Result<Vec<Row>> {
        let query = self.action(model, Action::Select)?;
        let rows = self.connection.borrow_mut().fetch_rows(&query)?;
        rows.iter()
            .map(|row| persistence::load_row(model, row))
            .collect()
    }

    pub(crate) fn count(&self, model: &Model) -> Result<Value> {
        let query = self.action(model, Action::Count)?;
        Ok(self
            .connection
            .borrow_mut()
            .fetch_value(&query)?
            .unwrap_or(Value::I64(0)))
    }

    pub(crate) fn exists(&self, model: &Model) -> Result<bool> {
        let query = self.action(model, Action::Exists)?;
        match self.connection.borrow_mut().fetch_value(&query)? {
            Some(Value::Bool(flag)) => Ok(flag),
            Some(value) => Ok(value.to_i64()? != 0),
            None => Ok(false),
        }
    }

    pub(crate) fn fx(&self, model: &Model, fx: &str, field: &str, coalesce: bool) -> Result<Value> {
        let query = self.action(
            model,
            Action::Fx {
                fx: fx.to_string(),
                field: field.to_string(),
                coalesce,
            },
        )?;
        Ok(self
            .connection
            .borrow_mut()
            .fetch_value(&query)?
            .unwrap_or(Value::Null))
    }

    // --- joined-table rows, already in wire form -------------------------

    pub(crate) fn insert_raw(&self, table: &str, row: &Row) -> Result<Value> {
        let mut query = Query::new();
        query.mode(Mode::Insert)?;
        query.table(table)?;
        for (column, value) in row {
            query.set(column, value.clone());
        }
        self.execute(&query)?;
        self.connection.borrow_mut().last_insert_id()
    }

    pub(crate) fn update_raw(
        &self,
        table: &str,
        changes: &Row,
        key_field: &str,
        key: &Value,
    ) -> Result<()> {
        let mut query = Query::new();
        query.mode(Mode::Update)?;
        query.table(table)?;
        for (column, value) in changes {
            query.set(column, value.clone());
        }
        query.where_((key_field, key.clone()));
        self.execute(&query)?;
        Ok(())
    }

    pub(crate) fn delete_raw(&self, table: &str, key_field: &str, key: &Value) -> Result<()> {
        let mut query = Query::new();
        query.mode(Mode::Delete)?;
        query.table(table)?;
        query.where_((key_field, key.clone()));
        self.execute(&query)?;
        Ok(())
    }

    fn execute(&self, query: &Query) -> Result<()> {
        self.connection.borrow_mut().execute(query)?;
        Ok(())
    }

    fn fetch_model_row(&self, model: &Model, query: &Query) -> Result<Option<Row>> {
        match self.connection.borrow_mut().fetch_row(query)? {
            Some(row) => Ok(Some(persistence::load_row(model, &row)?)),
            None => Ok(None),
        }
    }
}
