mod connection;
pub use connection::{Connection, Driver, ExecResult};

mod dialect;
pub use dialect::Dialect;

mod expression;
pub use expression::{Arg, Expression, Rendered};

mod operator;
pub use operator::Operator;

mod query;
pub use query::{Clause, CondField, CondValue, Mode, Query, SqlSource, WhereTerm};

mod renderer;

pub use griddle_core::{Error, Result, Row, Value};
