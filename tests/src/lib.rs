//! Shared fixtures: an in-memory SQLite persistence plus the model
//! definitions the integration tests revolve around.

use griddle::{Expression, Field, FieldType, Model, Persistence};
use griddle_core::{Row, Value};

use std::rc::Rc;

/// A fresh in-memory SQLite persistence.
pub fn sqlite() -> Rc<Persistence> {
    griddle::connect("sqlite::memory:").unwrap()
}

/// Runs a raw DDL or fixture statement.
pub fn exec(persistence: &Persistence, sql: &str) {
    let backend = persistence.as_sql().expect("sql persistence");
    backend
        .with_connection(|connection| {
            connection.execute_expr(&Expression::new(sql))?;
            Ok(())
        })
        .unwrap();
}

/// First column of the first row a raw statement yields.
pub fn fetch_one(persistence: &Persistence, sql: &str) -> Value {
    let backend = persistence.as_sql().expect("sql persistence");
    backend
        .with_connection(|connection| {
            Ok(connection
                .fetch_rows_expr(&Expression::new(sql))?
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next().map(|(_, value)| value)))
        })
        .unwrap()
        .expect("statement yielded no rows")
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    let mut row = Row::new();
    for (name, value) in pairs {
        row.insert(name.to_string(), value.clone());
    }
    row
}

/// `user` with a name, an age and room for a country link.
pub fn user_model(persistence: &Rc<Persistence>) -> Model {
    let mut model = Model::new("user");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    model
        .add_field("age", Field::new(FieldType::Integer))
        .unwrap();
    model.set_persistence(persistence.clone()).unwrap();
    model
}

pub fn user_schema(persistence: &Persistence) {
    exec(
        persistence,
        "create table user (id integer primary key autoincrement, \
         name text, age integer, country_id integer)",
    );
}

pub fn seed_users(model: &Model) {
    for (name, age) in [("John", 30), ("Jane", 25), ("Joe", 40)] {
        model
            .insert(row(&[("name", Value::from(name)), ("age", Value::from(age))]))
            .unwrap();
    }
}

/// `country` keyed by name, the usual has-one target.
pub fn country_model(persistence: &Rc<Persistence>) -> Model {
    let mut model = Model::new("country");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    model.set_persistence(persistence.clone()).unwrap();
    model
}

pub fn country_schema(persistence: &Persistence) {
    exec(
        persistence,
        "create table country (id integer primary key autoincrement, name text)",
    );
    exec(persistence, "insert into country (name) values ('Latvia')");
    exec(persistence, "insert into country (name) values ('Estonia')");
}

/// `client` and its `invoice` rows, the usual has-many pair.
pub fn client_model(persistence: &Rc<Persistence>) -> Model {
    let mut model = Model::new("client");
    model
        .add_field("name", Field::new(FieldType::String))
        .unwrap();
    model.set_persistence(persistence.clone()).unwrap();
    model
}

pub fn invoice_model(persistence: &Rc<Persistence>) -> Model {
    let mut model = Model::new("invoice");
    model
        .add_field("client_id", Field::new(FieldType::Integer))
        .unwrap();
    model
        .add_field("total", Field::new(FieldType::Money))
        .unwrap();
    model.set_persistence(persistence.clone()).unwrap();
    model
}

pub fn billing_schema(persistence: &Persistence) {
    exec(
        persistence,
        "create table client (id integer primary key autoincrement, name text)",
    );
    exec(
        persistence,
        "create table invoice (id integer primary key autoincrement, \
         client_id integer, total real)",
    );
}
