use crate::persistence::{Action, Array, Persistence};
use crate::{typecast, Field, Model};
use crate::field::FieldExpr;

use griddle_core::{Error, Result, Value};
use griddle_sql::{CondField, CondValue, Dialect, Expression, Operator, Query, WhereTerm};

use std::fmt;
use std::rc::Rc;

/// Aggregation applied across a has-many link when imported as a field.
#[derive(Debug, Clone)]
pub enum Aggregate {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    Concat { field: String, separator: String },
    /// A caller-supplied aggregate expression over the related table.
    Expr(Expression),
}

/// The four reference flavors a model can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    HasOne,
    HasMany,
    ContainsOne,
    ContainsMany,
}

/// How a reference obtains its related model.
///
/// An instance source clones a prototype; a factory builds a fresh model
/// per traversal, which also breaks definition cycles between models that
/// reference each other.
pub enum ModelSource {
    Instance(Box<Model>),
    Factory(Rc<dyn Fn() -> Model>),
}

impl ModelSource {
    pub fn factory(f: impl Fn() -> Model + 'static) -> ModelSource {
        ModelSource::Factory(Rc::new(f))
    }

    pub(crate) fn create(&self) -> Model {
        match self {
            ModelSource::Instance(model) => (**model).clone(),
            ModelSource::Factory(f) => f(),
        }
    }
}

impl From<Model> for ModelSource {
    fn from(model: Model) -> ModelSource {
        ModelSource::Instance(Box::new(model))
    }
}

impl Clone for ModelSource {
    fn clone(&self) -> ModelSource {
        match self {
            ModelSource::Instance(model) => ModelSource::Instance(model.clone()),
            ModelSource::Factory(f) => ModelSource::Factory(f.clone()),
        }
    }
}

impl fmt::Debug for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelSource::Instance(model) => f.debug_tuple("Instance").field(model).finish(),
            ModelSource::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// A named link from one model to another.
///
/// `our_field` lives on the declaring model, `their_field` on the related
/// one; unset fields fall back to the naming convention of the kind.
#[derive(Debug, Clone)]
pub struct Reference {
    pub(crate) link: String,
    pub(crate) kind: RefKind,
    pub(crate) source: ModelSource,
    pub(crate) our_field: Option<String>,
    pub(crate) their_field: Option<String>,
}

impl Reference {
    fn new(kind: RefKind, link: &str, source: ModelSource) -> Reference {
        Reference {
            link: link.to_string(),
            kind,
            source,
            our_field: None,
            their_field: None,
        }
    }

    pub fn has_one(link: &str, source: impl Into<ModelSource>) -> Reference {
        Reference::new(RefKind::HasOne, link, source.into())
    }

    pub fn has_many(link: &str, source: impl Into<ModelSource>) -> Reference {
        Reference::new(RefKind::HasMany, link, source.into())
    }

    pub fn contains_one(link: &str, source: impl Into<ModelSource>) -> Reference {
        Reference::new(RefKind::ContainsOne, link, source.into())
    }

    pub fn contains_many(link: &str, source: impl Into<ModelSource>) -> Reference {
        Reference::new(RefKind::ContainsMany, link, source.into())
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn kind(&self) -> RefKind {
        self.kind
    }

    pub fn with_our_field(mut self, field: &str) -> Reference {
        self.our_field = Some(field.to_string());
        self
    }

    pub fn with_their_field(mut self, field: &str) -> Reference {
        self.their_field = Some(field.to_string());
        self
    }

    /// Field on the declaring model used for the link. Has-one links point
    /// through `<link>_id`; the other kinds correlate on the owner's id.
    pub(crate) fn our_field_name(&self, owner: &Model) -> String {
        match &self.our_field {
            Some(field) => field.clone(),
            None => match self.kind {
                RefKind::HasOne => format!("{}_id", self.link),
                _ => owner.id_field().to_string(),
            },
        }
    }

    /// Field on the related model used for the link. Defaults to the
    /// related id for has-one, and to `<owner table>_<owner id>` for
    /// has-many; the field must exist on the related model.
    pub(crate) fn their_field_name(&self, owner: &Model, target: &Model) -> Result<String> {
        let name = match &self.their_field {
            Some(field) => field.clone(),
            None => match self.kind {
                RefKind::HasOne => target.id_field().to_string(),
                _ => format!("{}_{}", owner.table(), owner.id_field()),
            },
        };
        if !target.has_field(&name) {
            return Err(Error::configuration(format!(
                "reference {:?}: related model has no field {name:?}",
                self.link
            )));
        }
        Ok(name)
    }

    /// Fresh related model, inheriting the owner's persistence when it has
    /// none of its own. Contained models get their persistence during
    /// traversal instead.
    pub(crate) fn create_target(&self, owner: &Model) -> Result<Model> {
        let mut target = self.source.create();
        if matches!(self.kind, RefKind::HasOne | RefKind::HasMany)
            && target.persistence().is_none()
        {
            if let Some(persistence) = owner.persistence() {
                target.set_persistence(persistence.clone())?;
            }
        }
        Ok(target)
    }
}

/// Traverses a reference, returning the related model restricted to the
/// owner's current record, or to the owner's whole dataset when the owner
/// is not loaded.
pub(crate) fn resolve(owner: &Model, link: &str) -> Result<Model> {
    let reference = owner.reference(link)?.clone();
    match reference.kind {
        RefKind::HasOne => resolve_has_one(owner, &reference),
        RefKind::HasMany => resolve_has_many(owner, &reference),
        RefKind::ContainsOne | RefKind::ContainsMany => resolve_contained(owner, &reference),
    }
}

fn resolve_has_one(owner: &Model, reference: &Reference) -> Result<Model> {
    let mut target = reference.create_target(owner)?;
    let our = reference.our_field_name(owner);
    let their = reference.their_field_name(owner, &target)?;

    if owner.is_loaded() {
        let link_value = owner.get(&our)?;
        if link_value.is_null() {
            // no related record; an empty IN keeps the set empty
            target.add_condition((their.as_str(), Operator::In, Vec::<Value>::new()));
        } else {
            target.add_condition((their.as_str(), link_value));
            target.try_load_any()?;
        }
        return Ok(target);
    }
    restrict_to_owner_set(owner, &mut target, reference, &our, &their)?;
    Ok(target)
}

fn resolve_has_many(owner: &Model, reference: &Reference) -> Result<Model> {
    let mut target = reference.create_target(owner)?;
    let our = reference.our_field_name(owner);
    let their = reference.their_field_name(owner, &target)?;

    if owner.is_loaded() {
        target.add_condition((their.as_str(), owner.get(&our)?));
        return Ok(target);
    }
    restrict_to_owner_set(owner, &mut target, reference, &our, &their)?;
    Ok(target)
}

/// For an unloaded owner the traversal covers every record the owner's
/// conditions match: the related set is restricted to the link values of
/// that whole dataset.
fn restrict_to_owner_set(
    owner: &Model,
    target: &mut Model,
    reference: &Reference,
    our: &str,
    their: &str,
) -> Result<()> {
    let persistence = owner.persistence().ok_or_else(|| {
        Error::configuration(format!(
            "cannot traverse reference {:?} on a model without persistence",
            reference.link
        ))
    })?;
    match persistence.as_ref() {
        Persistence::Sql(sql) => {
            let sub = sql.action(owner, Action::Field { name: our.to_string() })?;
            target.add_condition((their, Operator::In, Expression::new("[]").arg(sub)));
        }
        Persistence::Array(_) => {
            let values = field_values(owner, our)?;
            target.add_condition((their, Operator::In, values));
        }
    }
    Ok(())
}

fn field_values(owner: &Model, name: &str) -> Result<Vec<Value>> {
    let mut values = Vec::new();
    for row in owner.export()? {
        match row.get(name) {
            Some(value) if !value.is_null() && !values.contains(value) => {
                values.push(value.clone());
            }
            _ => {}
        }
    }
    Ok(values)
}

/// Materializes a contained document as a standalone model backed by a
/// private in-memory store seeded from the owner's embedded field.
fn resolve_contained(owner: &Model, reference: &Reference) -> Result<Model> {
    let document = owner.get(&reference.link)?;
    let mut target = reference.source.create();

    let rows = match (&document, reference.kind) {
        (Value::Null, _) => Vec::new(),
        (Value::Json(json), RefKind::ContainsOne) => vec![typecast::json_to_row(json)?],
        (Value::Json(serde_json::Value::Array(items)), RefKind::ContainsMany) => items
            .iter()
            .map(typecast::json_to_row)
            .collect::<Result<Vec<_>>>()?,
        _ => {
            return Err(Error::invalid_format(format!(
                "reference {:?}: embedded value has the wrong shape",
                reference.link
            )))
        }
    };

    let array = Array::new();
    array.seed(target.table(), rows, target.id_field())?;
    target.set_persistence(Rc::new(Persistence::Array(array)))?;
    Ok(target)
}

/// Writes a contained model's store back into the owner's embedded field.
/// Has-one and has-many traversals need no write-back.
pub(crate) fn sync_back(owner: &mut Model, link: &str, target: &Model) -> Result<()> {
    let reference = owner.reference(link)?.clone();
    let value = match reference.kind {
        RefKind::ContainsOne => match target.export()?.first() {
            Some(row) => Value::Json(typecast::row_to_json(row)),
            None => Value::Null,
        },
        RefKind::ContainsMany => {
            let rows = target.export()?;
            if rows.is_empty() {
                Value::Null
            } else {
                Value::Json(serde_json::Value::Array(
                    rows.iter().map(typecast::row_to_json).collect(),
                ))
            }
        }
        _ => return Ok(()),
    };
    owner.set_embedded(link, value)
}

/// Before-save handler behind a has-one title field: a dirty title is
/// looked up on the related model and translated into the link value.
pub(crate) fn sync_title(model: &mut Model, link: &str, title_field: &str) -> Result<()> {
    if !model.is_dirty(title_field) {
        return Ok(());
    }
    let reference = model.reference(link)?.clone();
    if reference.kind != RefKind::HasOne {
        return Err(Error::configuration(format!(
            "title field {title_field:?} requires a has-one reference"
        )));
    }
    let title = model.get(title_field)?;
    let mut target = reference.create_target(model)?;
    let their_title = target.title_field().to_string();
    target
        .load_by(&their_title, title)
        .map_err(|err| err.context(format!("cannot resolve title for {link:?}")))?;

    let our = reference.our_field_name(model);
    let id = target.get(target.id_field())?;
    model.set(&our, id)?;
    Ok(())
}

/// Builds the SQL expression behind a computed field: raw expressions pass
/// through, linked fields and aggregates become correlated sub-selects.
pub(crate) fn field_expression(model: &Model, field: &Field, dialect: Dialect) -> Result<Expression> {
    let expr = match &field.expr {
        None => {
            return Err(Error::configuration(format!(
                "field {:?} is not an expression field",
                field.name()
            )))
        }
        Some(expr) => expr,
    };
    match expr {
        FieldExpr::Raw(raw) => Ok(raw.clone()),
        FieldExpr::TheirField { link, field: their } => {
            let reference = model.reference(link)?;
            if reference.kind != RefKind::HasOne {
                return Err(Error::configuration(format!(
                    "field {:?} imports from {link:?}, which is not a has-one reference",
                    field.name()
                )));
            }
            let target = reference.source.create();
            let select = target.field(their)?.column_expression(Some(target_prefix(&target)));
            correlated_query(model, &target, reference, select, dialect)
        }
        FieldExpr::Aggregate { link, aggregate } => {
            let reference = model.reference(link)?;
            if reference.kind != RefKind::HasMany {
                return Err(Error::configuration(format!(
                    "field {:?} aggregates over {link:?}, which is not a has-many reference",
                    field.name()
                )));
            }
            let target = reference.source.create();
            let select = aggregate_expression(&target, aggregate, dialect)?;
            correlated_query(model, &target, reference, select, dialect)
        }
    }
}

fn target_prefix(target: &Model) -> &str {
    target.table_alias().unwrap_or_else(|| target.table())
}

/// `(select <expr> from <their table> where <their link> = <owner link>)`
/// with the related model's own conditions folded in.
fn correlated_query(
    owner: &Model,
    target: &Model,
    reference: &Reference,
    select: Expression,
    dialect: Dialect,
) -> Result<Expression> {
    let our = reference.our_field_name(owner);
    let their = reference.their_field_name(owner, target)?;

    let owner_prefix = owner.sql_prefix().unwrap_or_else(|| owner.table());
    let owner_column = owner
        .field(&our)?
        .column_expression(Some(owner_prefix));
    let their_column = target
        .field(&their)?
        .column_expression(Some(target_prefix(target)));

    let mut query = Query::new();
    query.field(select);
    match target.table_alias() {
        Some(alias) => query.table_as(target.table(), alias)?,
        None => query.table(target.table())?,
    };
    query.where_(WhereTerm::Cond {
        field: CondField::Expr(their_column),
        op: Operator::Eq,
        value: CondValue::Expr(owner_column),
    });
    target.scope().apply(target, &mut query, dialect, false)?;

    Ok(Expression::new("[]").arg(query))
}

fn aggregate_expression(target: &Model, aggregate: &Aggregate, dialect: Dialect) -> Result<Expression> {
    let column = |name: &str| -> Result<Expression> {
        Ok(target
            .field(name)?
            .column_expression(Some(target_prefix(target))))
    };
    let expr = match aggregate {
        Aggregate::Count => Expression::new("count(*)"),
        Aggregate::Sum(field) => Expression::new("sum([])").arg(column(field)?),
        Aggregate::Avg(field) => Expression::new("avg([])").arg(column(field)?),
        Aggregate::Min(field) => Expression::new("min([])").arg(column(field)?),
        Aggregate::Max(field) => Expression::new("max([])").arg(column(field)?),
        Aggregate::Concat { field, separator } => {
            let sep = Value::from(separator.as_str());
            match dialect {
                Dialect::Sqlite => Expression::new("group_concat([], [])")
                    .arg(column(field)?)
                    .arg(sep),
                Dialect::Mysql => Expression::new("group_concat([] separator [])")
                    .arg(column(field)?)
                    .arg(sep),
                Dialect::Postgresql => Expression::new("string_agg([], [])")
                    .arg(column(field)?)
                    .arg(sep),
            }
        }
        Aggregate::Expr(expr) => expr.clone(),
    };
    Ok(expr)
}
