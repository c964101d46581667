use crate::reference::Aggregate;

use chrono::FixedOffset;
use griddle_core::{FieldType, Value};
use griddle_sql::Expression;

/// Typed column descriptor owned by a model.
///
/// A field carries no value; values live in the owning model's data and
/// dirty maps. The descriptor knows how the column is named in storage, how
/// it typecasts, and whether it is sourced through a join or an expression.
///
/// ```
/// use griddle::Field;
/// use griddle_core::FieldType;
///
/// let field = Field::new(FieldType::String).actual("full_name").required();
/// assert!(field.use_alias());
/// ```
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: String,
    ty: FieldType,
    actual: Option<String>,
    nullable: bool,
    required: bool,
    system: bool,
    read_only: bool,
    never_persist: bool,
    never_save: bool,
    default: Option<Value>,
    enum_values: Option<Vec<Value>>,
    persist_format: Option<String>,
    persist_timezone: Option<FixedOffset>,

    /// Index into the owning model's join list when this field is sourced
    /// through a join instead of the model's own table.
    pub(crate) join: Option<usize>,

    /// Set for computed fields; evaluated at select-build time.
    pub(crate) expr: Option<FieldExpr>,

    /// Backing field of a contains-one/contains-many reference. Only the
    /// reference's own load/save path may write it.
    pub(crate) contains_backing: bool,
}

/// Source of a computed field, kept unevaluated until a select is built.
#[derive(Debug, Clone)]
pub(crate) enum FieldExpr {
    /// A caller-supplied expression used verbatim.
    Raw(Expression),

    /// An aggregate over a has-many link, built as a correlated sub-select.
    Aggregate { link: String, aggregate: Aggregate },

    /// A column imported from a has-one link, built as a correlated
    /// sub-select returning one value.
    TheirField { link: String, field: String },
}

impl Field {
    pub fn new(ty: FieldType) -> Field {
        Field {
            name: String::new(),
            ty,
            actual: None,
            nullable: true,
            required: false,
            system: false,
            read_only: false,
            never_persist: false,
            never_save: false,
            default: None,
            enum_values: None,
            persist_format: None,
            persist_timezone: None,
            join: None,
            expr: None,
            contains_backing: false,
        }
    }

    /// Sets the persisted column name when it differs from the field name.
    pub fn actual(mut self, name: &str) -> Field {
        self.actual = Some(name.to_string());
        self
    }

    /// Requires a non-empty value at save time.
    pub fn required(mut self) -> Field {
        self.required = true;
        self
    }

    /// Rejects an explicitly assigned null at save time. A field left unset
    /// still passes; [`required`](Field::required) rejects both.
    pub fn not_null(mut self) -> Field {
        self.nullable = false;
        self
    }

    /// Marks a bookkeeping field that is always selected, even when the
    /// caller restricts the field list.
    pub fn system(mut self) -> Field {
        self.system = true;
        self
    }

    /// Rejects writes through `Model::set`.
    pub fn read_only(mut self) -> Field {
        self.read_only = true;
        self
    }

    /// Excludes the field from select, insert and update entirely.
    pub fn never_persist(mut self) -> Field {
        self.never_persist = true;
        self
    }

    /// Loads the field but never writes it back.
    pub fn never_save(mut self) -> Field {
        self.never_save = true;
        self
    }

    /// Value used on insert when the field was never set.
    pub fn default_value(mut self, value: impl Into<Value>) -> Field {
        self.default = Some(value.into());
        self
    }

    /// Restricts accepted values to this list. For boolean fields a
    /// two-element list doubles as the persisted (false, true) pair.
    pub fn enum_values(mut self, values: Vec<Value>) -> Field {
        self.enum_values = Some(values);
        self
    }

    /// Overrides the storage format for date, time and datetime fields
    /// (chrono format string).
    pub fn persist_format(mut self, format: &str) -> Field {
        self.persist_format = Some(format.to_string());
        self
    }

    /// Stores datetimes shifted into this offset instead of UTC.
    pub fn persist_timezone(mut self, timezone: FixedOffset) -> Field {
        self.persist_timezone = Some(timezone);
        self
    }

    /// Derives the field from an expression instead of a column. Expression
    /// fields are read-only and never written back.
    pub fn expression(mut self, expr: Expression) -> Field {
        self.expr = Some(FieldExpr::Raw(expr));
        self.read_only = true;
        self
    }

    /// Sources the field from the join registered at `join` on the owning
    /// model rather than from the model's own table.
    pub fn joined(mut self, join: usize) -> Field {
        self.join = Some(join);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_never_persist(&self) -> bool {
        self.never_persist
    }

    pub fn is_never_save(&self) -> bool {
        self.never_save
    }

    pub fn is_expression(&self) -> bool {
        self.expr.is_some()
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub(crate) fn enum_pair(&self) -> Option<(&Value, &Value)> {
        match self.enum_values.as_deref() {
            Some([falsy, truthy]) => Some((falsy, truthy)),
            _ => None,
        }
    }

    pub(crate) fn allows(&self, value: &Value) -> bool {
        match &self.enum_values {
            Some(values) => value.is_null() || values.contains(value),
            None => true,
        }
    }

    pub(crate) fn format(&self) -> Option<&str> {
        self.persist_format.as_deref()
    }

    pub(crate) fn timezone(&self) -> Option<FixedOffset> {
        self.persist_timezone
    }

    /// The column name used in storage.
    pub fn persisted_name(&self) -> &str {
        self.actual.as_deref().unwrap_or(&self.name)
    }

    /// Whether a select must alias this field so the caller can read the
    /// value back under the field's own name.
    pub fn use_alias(&self) -> bool {
        self.actual.is_some() || self.expr.is_some()
    }

    /// The column reference for this field, table-prefixed when requested.
    /// Computed fields are handled separately by the select builder.
    pub(crate) fn column_expression(&self, prefix: Option<&str>) -> Expression {
        match prefix {
            Some(prefix) => Expression::new("{}.{}")
                .arg(prefix)
                .arg(self.persisted_name()),
            None => Expression::new("{}").arg(self.persisted_name()),
        }
    }
}
