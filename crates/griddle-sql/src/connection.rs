use crate::{Dialect, Expression, Query};

use griddle_core::{Error, Result, Row, Value};
use indexmap::IndexMap;

/// Backend interface implemented by each database driver.
///
/// Statements arrive fully rendered for the driver's own dialect, with
/// parameters passed by placeholder name.
pub trait Driver {
    fn dialect(&self) -> Dialect;

    /// Runs a statement that returns no rows.
    fn execute(&mut self, sql: &str, params: &IndexMap<String, Value>) -> Result<ExecResult>;

    /// Runs a statement and collects every result row.
    fn query(&mut self, sql: &str, params: &IndexMap<String, Value>) -> Result<Vec<Row>>;

    /// The row id generated by the most recent insert on this connection.
    fn last_insert_id(&mut self) -> Result<Value>;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
}

/// A live database connection.
///
/// The connection owns the driver, stamps the driver's dialect onto every
/// statement it renders, and tracks transaction nesting so that only the
/// outermost [`Connection::atomic`] call touches the real transaction.
pub struct Connection {
    driver: Box<dyn Driver>,
    atomic_depth: usize,
}

impl Connection {
    pub fn new(driver: Box<dyn Driver>) -> Connection {
        Connection {
            driver,
            atomic_depth: 0,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    /// A fresh statement builder. The dialect is applied later, when the
    /// statement is executed through this connection.
    pub fn query(&self) -> Query {
        Query::new()
    }

    pub fn execute(&mut self, query: &Query) -> Result<ExecResult> {
        let rendered = query.render(self.dialect())?;
        self.driver.execute(&rendered.sql, &rendered.params)
    }

    pub fn execute_expr(&mut self, expr: &Expression) -> Result<ExecResult> {
        let rendered = expr.render(self.dialect())?;
        self.driver.execute(&rendered.sql, &rendered.params)
    }

    pub fn fetch_rows(&mut self, query: &Query) -> Result<Vec<Row>> {
        let rendered = query.render(self.dialect())?;
        self.driver.query(&rendered.sql, &rendered.params)
    }

    pub fn fetch_rows_expr(&mut self, expr: &Expression) -> Result<Vec<Row>> {
        let rendered = expr.render(self.dialect())?;
        self.driver.query(&rendered.sql, &rendered.params)
    }

    pub fn fetch_row(&mut self, query: &Query) -> Result<Option<Row>> {
        Ok(self.fetch_rows(query)?.into_iter().next())
    }

    /// First column of the first row, if any.
    pub fn fetch_value(&mut self, query: &Query) -> Result<Option<Value>> {
        Ok(self
            .fetch_row(query)?
            .and_then(|row| row.into_iter().next().map(|(_, value)| value)))
    }

    pub fn last_insert_id(&mut self) -> Result<Value> {
        self.driver.last_insert_id()
    }

    pub fn in_transaction(&self) -> bool {
        self.atomic_depth > 0
    }

    /// Opens a transaction, or joins the one already running.
    ///
    /// Calls nest: only the outermost `begin` reaches the driver, and the
    /// matching outermost `commit` or `rollback` ends the real transaction.
    pub fn begin(&mut self) -> Result<()> {
        if self.atomic_depth == 0 {
            self.driver.begin()?;
        }
        self.atomic_depth += 1;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.atomic_depth == 0 {
            return Err(Error::configuration("no active transaction to commit"));
        }
        self.atomic_depth -= 1;
        if self.atomic_depth == 0 {
            self.driver.commit()?;
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        if self.atomic_depth == 0 {
            return Err(Error::configuration("no active transaction to roll back"));
        }
        self.atomic_depth -= 1;
        if self.atomic_depth == 0 {
            self.driver.rollback()?;
        }
        Ok(())
    }

    /// Runs `f` inside a transaction.
    ///
    /// Nested calls join the outer transaction. An error from `f` rolls the
    /// whole transaction back and is returned unchanged.
    pub fn atomic<T>(&mut self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if self.rollback().is_err() {
                    return Err(err.context("transaction rollback also failed"));
                }
                Err(err)
            }
        }
    }
}

impl core::fmt::Debug for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect())
            .field("atomic_depth", &self.atomic_depth)
            .finish()
    }
}
