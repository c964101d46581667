mod field;
pub use field::Field;

mod hooks;
pub use hooks::EventKind;

mod join;
pub use join::{Join, JoinKind};

mod model;
pub use model::Model;

mod persistence;
pub use persistence::{Action, Array, Persistence, Sql};

mod reference;
pub use reference::{Aggregate, ModelSource, RefKind, Reference};

mod scope;
pub use scope::{CondTarget, Condition, Junction, Scope, ScopeNode};

mod typecast;

pub use griddle_core::{Error, FieldType, Result, Row, Value};
pub use griddle_sql::{Connection, Dialect, Expression, Operator, Query};

/// Opens a persistence from a connection URL.
///
/// The scheme picks the driver; drivers are feature-gated, so an
/// unrecognized scheme usually means the feature is off.
#[cfg(feature = "sqlite")]
pub fn connect(url: &str) -> Result<std::rc::Rc<Persistence>> {
    let parsed = url::Url::parse(url)
        .map_err(|err| Error::configuration(format!("invalid connection url {url:?}: {err}")))?;

    match parsed.scheme() {
        "sqlite" => {
            let driver = griddle_driver_sqlite::Sqlite::connect(url)?;
            let connection = Connection::new(Box::new(driver));
            Ok(std::rc::Rc::new(Persistence::Sql(Sql::new(connection))))
        }
        scheme => Err(Error::configuration(format!(
            "no driver registered for scheme {scheme:?}"
        ))),
    }
}
