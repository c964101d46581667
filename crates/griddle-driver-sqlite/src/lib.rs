mod value;
pub(crate) use value::Value;

use griddle_core::{Error, Result, Row, Value as CoreValue};
use griddle_sql::{Dialect, Driver, ExecResult};

use indexmap::IndexMap;
use rusqlite::types::ToSql;
use rusqlite::Connection as RusqliteConnection;
use std::path::Path;
use url::Url;

/// SQLite driver backed by rusqlite.
#[derive(Debug)]
pub struct Sqlite {
    connection: RusqliteConnection,
}

impl Sqlite {
    /// Opens a database from a connection URL with a `sqlite` scheme, such as
    /// `sqlite::memory:` or `sqlite:/var/data/app.db`.
    pub fn connect(url: &str) -> Result<Sqlite> {
        let parsed = Url::parse(url)
            .map_err(|err| Error::configuration(format!("invalid connection url {url:?}: {err}")))?;

        if parsed.scheme() != "sqlite" {
            return Err(Error::configuration(format!(
                "connection URL does not have a `sqlite` scheme; url={url}"
            )));
        }

        if parsed.path() == ":memory:" {
            Sqlite::in_memory()
        } else {
            Sqlite::open(parsed.path())
        }
    }

    /// Opens a fresh in-memory database.
    pub fn in_memory() -> Result<Sqlite> {
        let connection = RusqliteConnection::open_in_memory()
            .map_err(|err| Error::execution("open :memory:", err))?;
        Ok(Sqlite { connection })
    }

    /// Opens a database file, creating it when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Sqlite> {
        let connection = RusqliteConnection::open(path.as_ref())
            .map_err(|err| Error::execution(format!("open {}", path.as_ref().display()), err))?;
        Ok(Sqlite { connection })
    }

    fn run(&mut self, sql: &str) -> Result<()> {
        self.connection
            .execute_batch(sql)
            .map_err(|err| Error::execution(sql, err))
    }
}

/// Borrows the parameter map in the shape rusqlite's named binding expects.
fn bind_params(params: &IndexMap<String, CoreValue>) -> Vec<(&str, Value)> {
    params
        .iter()
        .map(|(name, value)| (name.as_str(), Value::from(value.clone())))
        .collect()
}

impl Driver for Sqlite {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &IndexMap<String, CoreValue>) -> Result<ExecResult> {
        let mut stmt = self
            .connection
            .prepare_cached(sql)
            .map_err(|err| Error::execution(sql, err))?;

        let owned = bind_params(params);
        let bound: Vec<(&str, &dyn ToSql)> = owned
            .iter()
            .map(|(name, value)| (*name, value as &dyn ToSql))
            .collect();

        let rows_affected = stmt
            .execute(bound.as_slice())
            .map_err(|err| Error::execution(sql, err))?;

        Ok(ExecResult {
            rows_affected: rows_affected as u64,
        })
    }

    fn query(&mut self, sql: &str, params: &IndexMap<String, CoreValue>) -> Result<Vec<Row>> {
        let mut stmt = self
            .connection
            .prepare_cached(sql)
            .map_err(|err| Error::execution(sql, err))?;

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let owned = bind_params(params);
        let bound: Vec<(&str, &dyn ToSql)> = owned
            .iter()
            .map(|(name, value)| (*name, value as &dyn ToSql))
            .collect();

        let mut rows = stmt
            .query(bound.as_slice())
            .map_err(|err| Error::execution(sql, err))?;

        let mut out = Vec::new();
        loop {
            match rows.next() {
                Ok(Some(row)) => {
                    let mut record = Row::with_capacity(columns.len());
                    for (index, column) in columns.iter().enumerate() {
                        let value = Value::from_sql(row, index)?.into_inner();
                        record.insert(column.clone(), value);
                    }
                    out.push(record);
                }
                Ok(None) => break,
                Err(err) => return Err(Error::execution(sql, err)),
            }
        }

        Ok(out)
    }

    fn last_insert_id(&mut self) -> Result<CoreValue> {
        Ok(CoreValue::I64(self.connection.last_insert_rowid()))
    }

    fn begin(&mut self) -> Result<()> {
        self.run("begin")
    }

    fn commit(&mut self) -> Result<()> {
        self.run("commit")
    }

    fn rollback(&mut self) -> Result<()> {
        self.run("rollback")
    }
}
