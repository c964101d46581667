use crate::Model;

use griddle_core::{Result, Row};
use griddle_sql::Query;

use indexmap::IndexMap;
use std::rc::Rc;

/// Lifecycle events a model fires while loading, saving and deleting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AfterLoad,
    BeforeSave,
    AfterSave,
    BeforeInsert,
    AfterInsert,
    BeforeDelete,
    AfterDelete,
    BeforeUpdateQuery,
    AfterUpdateQuery,
    InitSelectQuery,
}

/// A registered event handler.
///
/// User handlers are closures; handlers the library installs itself are
/// dedicated variants so dispatch stays explicit.
#[derive(Clone)]
pub(crate) enum Handler {
    /// Mutates the model itself (`BeforeSave`, `AfterLoad`, ...).
    Model(Rc<dyn Fn(&mut Model) -> Result<()>>),

    /// Mutates the row being written (`BeforeInsert`, `AfterInsert`, ...).
    Row(Rc<dyn Fn(&mut Model, &mut Row) -> Result<()>>),

    /// Mutates an in-flight query (`InitSelectQuery`, `*UpdateQuery`).
    Query(Rc<dyn Fn(&Model, &mut Query) -> Result<()>>),

    /// Resolves a changed title value back into the owning foreign key
    /// before the owner saves. Installed by `Model::add_title`.
    TitleSync { link: String, title_field: String },
}

impl core::fmt::Debug for Handler {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Handler::Model(_) => f.write_str("Model(..)"),
            Handler::Row(_) => f.write_str("Row(..)"),
            Handler::Query(_) => f.write_str("Query(..)"),
            Handler::TitleSync { link, title_field } => f
                .debug_struct("TitleSync")
                .field("link", link)
                .field("title_field", title_field)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Hooks {
    handlers: IndexMap<EventKind, Vec<Handler>>,
}

impl Hooks {
    pub(crate) fn add(&mut self, kind: EventKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    fn take(&mut self, kind: EventKind) -> Vec<Handler> {
        self.handlers.get_mut(&kind).map(std::mem::take).unwrap_or_default()
    }

    fn restore(&mut self, kind: EventKind, mut handlers: Vec<Handler>) {
        // Handlers registered while firing stay, appended after the originals
        let slot = self.handlers.entry(kind).or_default();
        handlers.append(slot);
        *slot = handlers;
    }

    pub(crate) fn query_handlers(&self, kind: EventKind) -> impl Iterator<Item = &Handler> {
        self.handlers.get(&kind).into_iter().flatten()
    }
}

/// Fires an event whose handlers mutate the model.
///
/// The handler list is detached while running so handlers can call back into
/// the model without aliasing it.
pub(crate) fn fire(model: &mut Model, kind: EventKind) -> Result<()> {
    let handlers = model.hooks_mut().take(kind);
    let result = run_model_handlers(model, &handlers, None);
    model.hooks_mut().restore(kind, handlers);
    result
}

/// Fires an event whose handlers mutate the row being written.
pub(crate) fn fire_row(model: &mut Model, kind: EventKind, row: &mut Row) -> Result<()> {
    let handlers = model.hooks_mut().take(kind);
    let result = run_model_handlers(model, &handlers, Some(row));
    model.hooks_mut().restore(kind, handlers);
    result
}

fn run_model_handlers(model: &mut Model, handlers: &[Handler], mut row: Option<&mut Row>) -> Result<()> {
    for handler in handlers {
        match (handler, row.as_deref_mut()) {
            (Handler::Model(f), _) => f(model)?,
            (Handler::Row(f), Some(row)) => f(model, row)?,
            (Handler::Row(_), None) => {}
            (Handler::TitleSync { link, title_field }, _) => {
                crate::reference::sync_title(model, link, title_field)?
            }
            (Handler::Query(_), _) => {}
        }
    }
    Ok(())
}

/// Fires an event whose handlers mutate an in-flight query.
///
/// Query handlers only read the model, so the list is dispatched in place.
pub(crate) fn fire_query(model: &Model, kind: EventKind, query: &mut Query) -> Result<()> {
    for handler in model.hooks().query_handlers(kind) {
        if let Handler::Query(f) = handler {
            f(model, query)?;
        }
    }
    Ok(())
}
