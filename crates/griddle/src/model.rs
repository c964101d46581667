use crate::field::FieldExpr;
use crate::hooks::{self, EventKind, Handler, Hooks};
use crate::persistence::{Action, Persistence};
use crate::reference::{self, Aggregate, Reference, RefKind};
use crate::scope::{Scope, ScopeNode};
use crate::{typecast, Field, Join};

use griddle_core::{Error, FieldType, Result, Row, Value};
use griddle_sql::{Dialect, Expression, Query};
use indexmap::IndexMap;

use std::rc::Rc;

/// A business entity bound to a table (or array store) of a persistence.
///
/// A model doubles as a record and as a dataset: conditions, order and
/// limit describe the dataset, while `load`/`save`/`delete` operate on the
/// one record currently held. Cloning a model clones its definition and
/// its record state; the persistence itself is shared.
#[derive(Debug, Clone)]
pub struct Model {
    table: String,
    table_alias: Option<String>,
    id_field: String,
    title_field: String,
    persistence: Option<Rc<Persistence>>,
    fields: IndexMap<String, Field>,
    references: IndexMap<String, Reference>,
    joins: Vec<Join>,
    scope: Scope,
    order: Vec<(String, bool)>,
    limit: Option<(i64, Option<i64>)>,
    only_fields: Option<Vec<String>>,
    hooks: Hooks,
    reload_after_save: bool,
    data: Row,
    dirty: IndexMap<String, Value>,
    loaded_id: Option<Value>,
}

impl Model {
    /// A model over `table` with the conventional integer `id` field.
    pub fn new(table: &str) -> Model {
        let mut scope = Scope::and();
        scope.root = true;
        let mut model = Model {
            table: table.to_string(),
            table_alias: None,
            id_field: "id".to_string(),
            title_field: "name".to_string(),
            persistence: None,
            fields: IndexMap::new(),
            references: IndexMap::new(),
            joins: Vec::new(),
            scope,
            order: Vec::new(),
            limit: None,
            only_fields: None,
            hooks: Hooks::default(),
            reload_after_save: true,
            data: Row::new(),
            dirty: IndexMap::new(),
            loaded_id: None,
        };
        let mut id = Field::new(FieldType::Integer).system();
        id.name = "id".to_string();
        model.fields.insert("id".to_string(), id);
        model
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn table_alias(&self) -> Option<&str> {
        self.table_alias.as_deref()
    }

    pub fn set_table_alias(&mut self, alias: &str) -> &mut Model {
        self.table_alias = Some(alias.to_string());
        self
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn title_field(&self) -> &str {
        &self.title_field
    }

    pub fn set_title_field(&mut self, name: &str) -> &mut Model {
        self.title_field = name.to_string();
        self
    }

    /// Skips the automatic reload that follows a successful save.
    pub fn set_reload_after_save(&mut self, reload: bool) -> &mut Model {
        self.reload_after_save = reload;
        self
    }

    // --- persistence association ---------------------------------------

    pub fn persistence(&self) -> Option<&Rc<Persistence>> {
        self.persistence.as_ref()
    }

    /// Associates the model with a persistence. A model belongs to one
    /// persistence for its whole life.
    pub fn set_persistence(&mut self, persistence: Rc<Persistence>) -> Result<&mut Model> {
        if self.persistence.is_some() {
            return Err(Error::configuration(
                "model is already associated with a persistence",
            ));
        }
        self.persistence = Some(persistence);
        Ok(self)
    }

    fn persistence_rc(&self) -> Result<Rc<Persistence>> {
        self.persistence.clone().ok_or_else(|| {
            Error::configuration("model is not associated with a persistence")
        })
    }

    // --- field registry -------------------------------------------------

    /// Registers a field under `name`. Field names are unique.
    pub fn add_field(&mut self, name: &str, mut field: Field) -> Result<&mut Field> {
        if self.fields.contains_key(name) {
            return Err(Error::configuration(format!(
                "field {name:?} is already defined"
            )));
        }
        if let Some(join) = field.join {
            if join >= self.joins.len() {
                return Err(Error::configuration(format!(
                    "field {name:?} references an unknown join"
                )));
            }
        }
        field.name = name.to_string();
        Ok(self.fields.entry(name.to_string()).or_insert(field))
    }

    /// Registers a read-only field computed by a SQL expression.
    pub fn add_expression(&mut self, name: &str, expr: Expression) -> Result<&mut Field> {
        self.add_field(name, Field::new(FieldType::String).expression(expr))
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::configuration(format!("no such field {name:?}")))
    }

    pub fn field_mut(&mut self, name: &str) -> Result<&mut Field> {
        self.fields
            .get_mut(name)
            .ok_or_else(|| Error::configuration(format!("no such field {name:?}")))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub(crate) fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Whether a select for this model includes the field.
    pub(crate) fn projects(&self, field: &Field) -> bool {
        if field.is_never_persist() {
            return false;
        }
        match &self.only_fields {
            Some(names) => field.is_system() || names.iter().any(|name| name == field.name()),
            None => true,
        }
    }

    // --- record values --------------------------------------------------

    /// Current value of a field: record data, else the field default, else
    /// null.
    pub fn get(&self, name: &str) -> Result<Value> {
        let field = self.field(name)?;
        Ok(match self.data.get(name) {
            Some(value) => value.clone(),
            None => field.default().cloned().unwrap_or(Value::Null),
        })
    }

    /// Sets a field, tracking the original value so an unchanged save is a
    /// no-op and a set back to the original clears the dirty mark.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Model> {
        let value = value.into();
        let field = self.field(name)?;
        if field.contains_backing {
            return Err(Error::configuration(format!(
                "field {name:?} holds a contained document; edit it through its reference"
            )));
        }
        if field.is_read_only() {
            return Err(Error::configuration(format!("field {name:?} is read-only")));
        }
        if !field.allows(&value) {
            return Err(Error::invalid_format(format!(
                "value is not allowed for enum field {name:?}"
            )));
        }
        self.store(name, value);
        Ok(self)
    }

    /// Multi-field `set`, handy for seeding records.
    pub fn set_multi(&mut self, values: Row) -> Result<&mut Model> {
        for (name, value) in values {
            self.set(&name, value)?;
        }
        Ok(self)
    }

    /// Reverts a field to its value before the first unsaved change.
    pub fn revert(&mut self, name: &str) -> Result<&mut Model> {
        self.field(name)?;
        if let Some(original) = self.dirty.shift_remove(name) {
            self.data.insert(name.to_string(), original);
        }
        Ok(self)
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains_key(name)
    }

    pub(crate) fn dirty(&self) -> &IndexMap<String, Value> {
        &self.dirty
    }

    /// Writes a contained document without the read-only and enum guards.
    pub(crate) fn set_embedded(&mut self, name: &str, value: Value) -> Result<()> {
        self.field(name)?;
        self.store(name, value);
        Ok(())
    }

    fn store(&mut self, name: &str, value: Value) {
        let previous = self.data.get(name).cloned().unwrap_or(Value::Null);
        match self.dirty.get(name) {
            Some(original) if *original == value => {
                self.dirty.shift_remove(name);
            }
            Some(_) => {}
            None if previous != value => {
                self.dirty.insert(name.to_string(), previous);
            }
            None => {}
        }
        self.data.insert(name.to_string(), value);
    }

    // --- dataset shape --------------------------------------------------

    /// Restricts the dataset. Accepts a raw expression, a `(field, value)`
    /// pair, a `(field, operator, value)` triple, a nested [`Scope`], or a
    /// bare `Vec` of any of these, which forms an OR group.
    pub fn add_condition(&mut self, node: impl Into<ScopeNode>) -> &mut Model {
        self.scope.add(node);
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub(crate) fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    /// Appends an ordering field; earlier calls take precedence.
    pub fn set_order(&mut self, field: &str, descending: bool) -> Result<&mut Model> {
        self.field(field)?;
        self.order.push((field.to_string(), descending));
        Ok(self)
    }

    pub fn set_limit(&mut self, count: i64, shift: Option<i64>) -> &mut Model {
        self.limit = Some((count, shift));
        self
    }

    pub(crate) fn order_spec(&self) -> &[(String, bool)] {
        &self.order
    }

    pub(crate) fn limit_spec(&self) -> Option<(i64, Option<i64>)> {
        self.limit
    }

    /// Restricts selects to these fields; system fields stay included.
    pub fn set_only_fields(&mut self, names: &[&str]) -> Result<&mut Model> {
        for name in names {
            self.field(name)?;
        }
        self.only_fields = Some(names.iter().map(|name| name.to_string()).collect());
        Ok(self)
    }

    // --- joins ----------------------------------------------------------

    /// Stitches another table onto the model. Returns the join's index,
    /// which joined fields refer to via [`Field::joined`].
    pub fn add_join(&mut self, spec: &str) -> Result<usize> {
        let join = Join::parse(spec, &self.id_field)?;
        if !join.is_reverse() && !self.has_field(join.master_field()) {
            let master_field = join.master_field().to_string();
            self.add_field(&master_field, Field::new(FieldType::Integer).system())?;
        }
        self.joins.push(join);
        Ok(self.joins.len() - 1)
    }

    /// A join that is read during select but never written during save or
    /// delete.
    pub fn add_weak_join(&mut self, spec: &str) -> Result<usize> {
        let index = self.add_join(spec)?;
        self.joins[index].set_weak();
        Ok(index)
    }

    pub fn join_mut(&mut self, index: usize) -> Result<&mut Join> {
        self.joins
            .get_mut(index)
            .ok_or_else(|| Error::configuration(format!("no join at index {index}")))
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    // --- references -----------------------------------------------------

    /// Registers a reference. Has-one links get their link field added
    /// automatically; contained links get their backing document field.
    pub fn add_reference(&mut self, reference: Reference) -> Result<&mut Model> {
        if self.references.contains_key(reference.link()) {
            return Err(Error::configuration(format!(
                "reference {:?} is already defined",
                reference.link()
            )));
        }
        match reference.kind() {
            RefKind::HasOne => {
                let our = reference.our_field_name(self);
                if !self.has_field(&our) {
                    self.add_field(&our, Field::new(FieldType::Integer))?;
                }
            }
            RefKind::ContainsOne => {
                let mut backing = Field::new(FieldType::Object).system();
                backing.contains_backing = true;
                self.add_field(reference.link(), backing)?;
            }
            RefKind::ContainsMany => {
                let mut backing = Field::new(FieldType::Array).system();
                backing.contains_backing = true;
                self.add_field(reference.link(), backing)?;
            }
            RefKind::HasMany => {}
        }
        self.references
            .insert(reference.link().to_string(), reference);
        Ok(self)
    }

    pub fn has_one(&mut self, link: &str, source: impl Into<crate::ModelSource>) -> Result<&mut Model> {
        self.add_reference(Reference::has_one(link, source))
    }

    pub fn has_many(&mut self, link: &str, source: impl Into<crate::ModelSource>) -> Result<&mut Model> {
        self.add_reference(Reference::has_many(link, source))
    }

    pub fn contains_one(&mut self, link: &str, source: impl Into<crate::ModelSource>) -> Result<&mut Model> {
        self.add_reference(Reference::contains_one(link, source))
    }

    pub fn contains_many(&mut self, link: &str, source: impl Into<crate::ModelSource>) -> Result<&mut Model> {
        self.add_reference(Reference::contains_many(link, source))
    }

    pub fn reference(&self, link: &str) -> Result<&Reference> {
        self.references
            .get(link)
            .ok_or_else(|| Error::configuration(format!("no such reference {link:?}")))
    }

    /// Traverses a reference: the related model restricted to the current
    /// record, or to the whole dataset when no record is loaded.
    pub fn ref_(&self, link: &str) -> Result<Model> {
        reference::resolve(self, link)
    }

    /// Traverses a reference and, for contained documents, writes the
    /// edited document back into this model afterwards.
    pub fn with_ref<T>(
        &mut self,
        link: &str,
        f: impl FnOnce(&mut Model) -> Result<T>,
    ) -> Result<T> {
        let mut target = reference::resolve(self, link)?;
        let result = f(&mut target)?;
        reference::sync_back(self, link, &target)?;
        Ok(result)
    }

    /// Imports a single field from a has-one link as a read-only column.
    pub fn add_ref_field(&mut self, link: &str, name: &str, their_field: &str) -> Result<&mut Model> {
        self.reference(link)?;
        let mut field = Field::new(FieldType::String).read_only();
        field.expr = Some(FieldExpr::TheirField {
            link: link.to_string(),
            field: their_field.to_string(),
        });
        self.add_field(name, field)?;
        Ok(self)
    }

    /// Adds an editable title field for a has-one link. Reading it returns
    /// the related record's title; setting it resolves the title to a
    /// related record before save and updates the link field.
    pub fn add_title(&mut self, link: &str, name: &str) -> Result<&mut Model> {
        let reference = self.reference(link)?;
        if reference.kind() != RefKind::HasOne {
            return Err(Error::configuration(format!(
                "title field {name:?} requires a has-one reference"
            )));
        }
        let their_title = reference.source.create().title_field().to_string();
        let mut field = Field::new(FieldType::String).never_save();
        field.expr = Some(FieldExpr::TheirField {
            link: link.to_string(),
            field: their_title,
        });
        self.add_field(name, field)?;
        self.hooks.add(
            EventKind::BeforeSave,
            Handler::TitleSync {
                link: link.to_string(),
                title_field: name.to_string(),
            },
        );
        Ok(self)
    }

    /// Imports an aggregate over a has-many link as a read-only field.
    pub fn add_aggregate(
        &mut self,
        link: &str,
        name: &str,
        ty: FieldType,
        aggregate: Aggregate,
    ) -> Result<&mut Model> {
        self.reference(link)?;
        let mut field = Field::new(ty).read_only();
        field.expr = Some(FieldExpr::Aggregate {
            link: link.to_string(),
            aggregate,
        });
        self.add_field(name, field)?;
        Ok(self)
    }

    // --- hooks ----------------------------------------------------------

    pub fn on_model(
        &mut self,
        kind: EventKind,
        f: impl Fn(&mut Model) -> Result<()> + 'static,
    ) -> &mut Model {
        self.hooks.add(kind, Handler::Model(Rc::new(f)));
        self
    }

    pub fn on_row(
        &mut self,
        kind: EventKind,
        f: impl Fn(&mut Model, &mut Row) -> Result<()> + 'static,
    ) -> &mut Model {
        self.hooks.add(kind, Handler::Row(Rc::new(f)));
        self
    }

    pub fn on_query(
        &mut self,
        kind: EventKind,
        f: impl Fn(&Model, &mut Query) -> Result<()> + 'static,
    ) -> &mut Model {
        self.hooks.add(kind, Handler::Query(Rc::new(f)));
        self
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    // --- sql shaping ----------------------------------------------------

    /// Prefix qualifying this model's own columns, when one is needed.
    pub(crate) fn sql_prefix(&self) -> Option<&str> {
        if let Some(alias) = &self.table_alias {
            Some(alias)
        } else if self.joins.is_empty() {
            None
        } else {
            Some(&self.table)
        }
    }

    /// The SQL expression a field renders as: a (possibly prefixed) column
    /// for plain fields, a computed expression otherwise.
    pub(crate) fn field_expression(&self, name: &str, dialect: Dialect) -> Result<Expression> {
        let field = self.field(name)?;
        if field.expr.is_some() {
            return reference::field_expression(self, field, dialect);
        }
        let prefix = match field.join {
            Some(index) => {
                let join = self.joins.get(index).ok_or_else(|| {
                    Error::configuration(format!("field {name:?} references an unknown join"))
                })?;
                Some(join.prefix())
            }
            None => self.sql_prefix(),
        };
        Ok(field.column_expression(prefix))
    }

    /// The statement behind a persistence operation on this dataset.
    /// Requires a SQL persistence.
    pub fn action(&self, action: Action) -> Result<Query> {
        let persistence = self.persistence_rc()?;
        match persistence.as_ref() {
            Persistence::Sql(sql) => sql.action(self, action),
            Persistence::Array(_) => Err(Error::unsupported(
                "sql actions are not available for this persistence",
            )),
        }
    }

    // --- record lifecycle -----------------------------------------------

    pub fn is_loaded(&self) -> bool {
        self.loaded_id.is_some()
    }

    pub fn id(&self) -> Option<&Value> {
        self.loaded_id.as_ref()
    }

    /// Forgets the current record, keeping the dataset definition.
    pub fn unload(&mut self) -> &mut Model {
        self.data.clear();
        self.dirty.clear();
        self.loaded_id = None;
        for join in &mut self.joins {
            join.unload();
        }
        self
    }

    pub fn try_load(&mut self, id: impl Into<Value>) -> Result<bool> {
        let id = id.into();
        self.unload();
        let persistence = self.persistence_rc()?;
        match persistence.load(self, &id)? {
            Some(row) => {
                let loaded_id = row.get(&self.id_field).cloned().unwrap_or(id);
                self.hydrate(row, loaded_id)?;
                hooks::fire(self, EventKind::AfterLoad)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn load(&mut self, id: impl Into<Value>) -> Result<&mut Model> {
        let id = id.into();
        if !self.try_load(id.clone())? {
            return Err(Error::not_found(format!(
                "no record matching id={}",
                value_label(&id)
            ))
            .context("load failed")
            .context(self.table.clone()));
        }
        Ok(self)
    }

    /// Loads the first record of the dataset, honoring order and limit.
    pub fn try_load_any(&mut self) -> Result<bool> {
        self.unload();
        let persistence = self.persistence_rc()?;
        match persistence.load_any(self)? {
            Some(row) => {
                let id = row.get(&self.id_field).cloned().ok_or_else(|| {
                    Error::configuration("loaded row carries no id value")
                })?;
                self.hydrate(row, id)?;
                hooks::fire(self, EventKind::AfterLoad)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn load_any(&mut self) -> Result<&mut Model> {
        if !self.try_load_any()? {
            return Err(Error::not_found("no record matching the conditions")
                .context("load failed")
                .context(self.table.clone()));
        }
        Ok(self)
    }

    pub fn try_load_by(&mut self, field: &str, value: impl Into<Value>) -> Result<bool> {
        self.field(field)?;
        let saved = self.scope.clone();
        self.add_condition((field, value.into()));
        let result = self.try_load_any();
        self.scope = saved;
        result
    }

    pub fn load_by(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Model> {
        let value = value.into();
        if !self.try_load_by(field, value.clone())? {
            return Err(Error::not_found(format!(
                "no record matching {field}={}",
                value_label(&value)
            ))
            .context("load failed")
            .context(self.table.clone()));
        }
        Ok(self)
    }

    /// The id as it is stored, for use as a raw key.
    pub(crate) fn wire_id(&self, id: &Value) -> Result<Value> {
        typecast::save_value(self.field(&self.id_field)?, id)
    }

    fn hydrate(&mut self, row: Row, id: Value) -> Result<()> {
        self.data = row;
        self.dirty.clear();
        self.loaded_id = Some(id.clone());

        let wire_id = self.wire_id(&id)?;
        let mut captured = Vec::with_capacity(self.joins.len());
        for join in &self.joins {
            if join.is_weak() {
                captured.push(None);
                continue;
            }
            let value = if join.is_reverse() {
                Some(wire_id.clone())
            } else {
                match self.data.get(join.master_field()) {
                    Some(value) if !value.is_null() => Some(match self.fields.get(join.master_field()) {
                        Some(field) => typecast::save_value(field, value)?,
                        None => value.clone(),
                    }),
                    _ => None,
                }
            };
            captured.push(value);
        }
        for (join, value) in self.joins.iter_mut().zip(captured) {
            join.joined_id = value;
        }
        Ok(())
    }

    /// Inserts or updates the current record, with joined rows written in
    /// the same transaction.
    pub fn save(&mut self) -> Result<&mut Model> {
        if self.is_loaded() {
            self.perform_update()?;
        } else {
            self.perform_insert()?;
        }
        Ok(self)
    }

    fn perform_insert(&mut self) -> Result<()> {
        hooks::fire(self, EventKind::BeforeSave)?;
        let persistence = self.persistence_rc()?;

        let mut master = Row::new();
        let mut staged = Vec::new();
        self.build_insert_rows(&mut master, &mut staged)?;
        hooks::fire_row(self, EventKind::BeforeInsert, &mut master)?;

        let id = persistence.atomic(|| {
            // strong forward joins insert their row first so the link value
            // can travel into the master row
            for (index, row) in &staged {
                let (reverse, table, master_field) = {
                    let join = &self.joins[*index];
                    (
                        join.is_reverse(),
                        join.foreign_table().to_string(),
                        join.master_field().to_string(),
                    )
                };
                if reverse {
                    continue;
                }
                let foreign_id = persistence.insert_raw(&table, row)?;
                master.insert(master_field, foreign_id.clone());
                self.joins[*index].joined_id = Some(foreign_id);
            }

            let id = persistence.insert_row(self, &master)?;
            let wire_id = self.wire_id(&id)?;

            // reverse joins point back at the master id, so they insert after
            for (index, row) in &staged {
                let (reverse, table, foreign_field) = {
                    let join = &self.joins[*index];
                    (
                        join.is_reverse(),
                        join.foreign_table().to_string(),
                        join.foreign_field().to_string(),
                    )
                };
                if !reverse {
                    continue;
                }
                let mut row = row.clone();
                row.insert(foreign_field, wire_id.clone());
                persistence.insert_raw(&table, &row)?;
                self.joins[*index].joined_id = Some(wire_id.clone());
            }
            Ok(id)
        })?;

        self.data.insert(self.id_field.clone(), id.clone());
        self.loaded_id = Some(id);
        self.dirty.clear();
        hooks::fire(self, EventKind::AfterInsert)?;
        if self.reload_after_save {
            self.reload()?;
        }
        hooks::fire(self, EventKind::AfterSave)?;
        Ok(())
    }

    fn perform_update(&mut self) -> Result<()> {
        hooks::fire(self, EventKind::BeforeSave)?;
        if self.dirty.is_empty() {
            return Ok(());
        }
        let persistence = self.persistence_rc()?;
        let (master, staged) = self.build_update_rows()?;
        if master.is_empty() && staged.is_empty() {
            self.dirty.clear();
            return Ok(());
        }
        let id = self
            .loaded_id
            .clone()
            .ok_or_else(|| Error::configuration("record is not loaded"))?;
        let wire_id = self.wire_id(&id)?;

        persistence.atomic(|| {
            if !master.is_empty() {
                persistence.update_row(self, &master)?;
            }
            for (index, changes) in &staged {
                let (reverse, table, foreign_field, joined_id) = {
                    let join = &self.joins[*index];
                    (
                        join.is_reverse(),
                        join.foreign_table().to_string(),
                        join.foreign_field().to_string(),
                        join.joined_id.clone(),
                    )
                };
                let key = if reverse {
                    wire_id.clone()
                } else {
                    match joined_id {
                        Some(value) => value,
                        None => continue,
                    }
                };
                persistence.update_raw(&table, changes, &foreign_field, &key)?;
            }
            Ok(())
        })?;

        self.dirty.clear();
        if self.reload_after_save {
            self.reload()?;
        }
        hooks::fire(self, EventKind::AfterSave)?;
        Ok(())
    }

    /// Deletes the current record, and its joined rows, atomically.
    pub fn delete(&mut self) -> Result<()> {
        if !self.is_loaded() {
            return Err(Error::configuration("cannot delete an unloaded record"));
        }
        hooks::fire(self, EventKind::BeforeDelete)?;
        let persistence = self.persistence_rc()?;
        let id = self
            .loaded_id
            .clone()
            .ok_or_else(|| Error::configuration("record is not loaded"))?;
        let wire_id = self.wire_id(&id)?;

        let mut reverse = Vec::new();
        let mut forward = Vec::new();
        for join in &self.joins {
            if join.is_weak() {
                continue;
            }
            if join.is_reverse() {
                reverse.push((join.foreign_table().to_string(), join.foreign_field().to_string()));
            } else if let Some(joined_id) = join.joined_id.clone() {
                forward.push((
                    join.foreign_table().to_string(),
                    join.foreign_field().to_string(),
                    joined_id,
                ));
            }
        }

        persistence.atomic(|| {
            // reverse rows reference the master and must go first
            for (table, field) in &reverse {
                persistence.delete_raw(table, field, &wire_id)?;
            }
            persistence.delete_row(self)?;
            for (table, field, joined_id) in &forward {
                persistence.delete_raw(table, field, joined_id)?;
            }
            Ok(())
        })?;

        hooks::fire(self, EventKind::AfterDelete)?;
        self.unload();
        Ok(())
    }

    /// Re-reads the current record from the persistence.
    pub fn reload(&mut self) -> Result<()> {
        let Some(id) = self.loaded_id.clone() else {
            return Ok(());
        };
        if !self.try_load(id.clone())? {
            return Err(Error::not_found(format!(
                "no record matching id={}",
                value_label(&id)
            ))
            .context("reload after save failed")
            .context(self.table.clone()));
        }
        Ok(())
    }

    fn build_insert_rows(
        &self,
        master: &mut Row,
        staged: &mut Vec<(usize, Row)>,
    ) -> Result<()> {
        let mut buffers: IndexMap<usize, Row> = IndexMap::new();
        for (name, field) in &self.fields {
            if field.expr.is_some() || field.is_never_persist() || field.is_never_save() {
                continue;
            }
            if let Some(index) = field.join {
                if self.joins[index].is_weak() {
                    continue;
                }
            }
            let value = match self.data.get(name) {
                Some(value) => value.clone(),
                None => field.default().cloned().unwrap_or(Value::Null),
            };
            if value.is_null() {
                if field.is_required() {
                    return Err(Error::invalid_format(format!(
                        "field {name:?} is required"
                    )));
                }
                if !field.is_nullable() && self.data.contains_key(name) {
                    return Err(Error::invalid_format(format!(
                        "field {name:?} must not be null"
                    )));
                }
                continue;
            }
            match field.join {
                Some(index) => {
                    let wire = typecast::save_value(field, &value)?;
                    buffers
                        .entry(index)
                        .or_default()
                        .insert(field.persisted_name().to_string(), wire);
                }
                None => {
                    master.insert(name.clone(), value);
                }
            }
        }
        staged.extend(buffers);
        Ok(())
    }

    fn build_update_rows(&self) -> Result<(Row, Vec<(usize, Row)>)> {
        let mut master = Row::new();
        let mut buffers: IndexMap<usize, Row> = IndexMap::new();
        for name in self.dirty.keys() {
            let field = self.field(name)?;
            if field.expr.is_some() || field.is_never_persist() || field.is_never_save() {
                continue;
            }
            if let Some(index) = field.join {
                if self.joins[index].is_weak() {
                    continue;
                }
            }
            let value = self.data.get(name).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                if field.is_required() {
                    return Err(Error::invalid_format(format!("field {name:?} is required")));
                }
                if !field.is_nullable() {
                    return Err(Error::invalid_format(format!(
                        "field {name:?} must not be null"
                    )));
                }
            }
            match field.join {
                Some(index) => {
                    let wire = typecast::save_value(field, &value)?;
                    buffers
                        .entry(index)
                        .or_default()
                        .insert(field.persisted_name().to_string(), wire);
                }
                None => {
                    master.insert(name.clone(), value);
                }
            }
        }
        Ok((master, buffers.into_iter().collect()))
    }

    /// Inserts a record built from `row` without touching the current
    /// record state. Returns the new id.
    pub fn insert(&self, row: Row) -> Result<Value> {
        let mut entity = self.clone();
        entity.unload();
        entity.set_multi(row)?;
        entity.save()?;
        entity
            .id()
            .cloned()
            .ok_or_else(|| Error::configuration("insert produced no id"))
    }

    /// Inserts many records; handy for seeding.
    pub fn import(&self, rows: Vec<Row>) -> Result<&Model> {
        for row in rows {
            self.insert(row)?;
        }
        Ok(self)
    }

    // --- dataset operations ----------------------------------------------

    /// All records of the dataset as field-name-keyed rows.
    pub fn export(&self) -> Result<Vec<Row>> {
        self.persistence_rc()?.select(self)
    }

    pub fn count(&self) -> Result<i64> {
        self.persistence_rc()?.count(self)?.to_i64()
    }

    pub fn exists(&self) -> Result<bool> {
        self.persistence_rc()?.exists(self)
    }

    /// Aggregates `field` across the dataset with the SQL function `fx`
    /// (`sum`, `min`, `max`, `avg`, ...). Null when the dataset is empty.
    pub fn fx(&self, fx: &str, field: &str) -> Result<Value> {
        self.field(field)?;
        self.persistence_rc()?.fx(self, fx, field, false)
    }

    /// Like [`Model::fx`] but coalesces an empty dataset to zero.
    pub fn fx0(&self, fx: &str, field: &str) -> Result<Value> {
        self.field(field)?;
        self.persistence_rc()?.fx(self, fx, field, true)
    }

    /// Runs `f` inside a persistence transaction.
    pub fn atomic<T>(&mut self, f: impl FnOnce(&mut Model) -> Result<T>) -> Result<T> {
        let persistence = self.persistence_rc()?;
        persistence.atomic(|| f(self))
    }
}

fn value_label(value: &Value) -> String {
    typecast::stringify(value).unwrap_or_else(|_| value.type_name().to_string())
}
