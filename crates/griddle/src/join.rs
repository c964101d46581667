use griddle_core::{Error, Result, Value};
use griddle_sql::Expression;

/// SQL join flavor used when the joined table is folded into a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// A secondary table stitched onto a model so its columns read and write
/// as if they were the model's own.
///
/// The spec string names the foreign table; `"contact"` joins forward
/// (this model's `contact_id` points at `contact.id`) while
/// `"contact.order_id"` joins in reverse (the contact table carries an
/// `order_id` pointing back at this model's id).
#[derive(Debug, Clone)]
pub struct Join {
    link: String,
    foreign_table: String,
    foreign_field: String,
    master_field: String,
    reverse: bool,
    weak: bool,
    kind: JoinKind,
    alias: Option<String>,
    /// Id of the currently joined foreign row, captured on load or insert.
    pub(crate) joined_id: Option<Value>,
}

impl Join {
    /// Parses a join spec against the owning model's id field name.
    pub fn parse(spec: &str, id_field: &str) -> Result<Join> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(Error::configuration("join specification is empty"));
        }
        let (table, dot_field) = match spec.split_once('.') {
            Some((table, field)) => (table, Some(field)),
            None => (spec, None),
        };
        if table.is_empty() || dot_field == Some("") {
            return Err(Error::configuration(format!(
                "invalid join specification {spec:?}"
            )));
        }

        let join = match dot_field {
            Some(field) => Join {
                link: spec.to_string(),
                foreign_table: table.to_string(),
                foreign_field: field.to_string(),
                master_field: id_field.to_string(),
                reverse: true,
                weak: false,
                kind: JoinKind::Inner,
                alias: None,
                joined_id: None,
            },
            None => Join {
                link: spec.to_string(),
                foreign_table: table.to_string(),
                foreign_field: id_field.to_string(),
                master_field: format!("{table}_{id_field}"),
                reverse: false,
                weak: false,
                kind: JoinKind::Inner,
                alias: None,
                joined_id: None,
            },
        };
        Ok(join)
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn foreign_table(&self) -> &str {
        &self.foreign_table
    }

    pub fn foreign_field(&self) -> &str {
        &self.foreign_field
    }

    pub fn master_field(&self) -> &str {
        &self.master_field
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    /// Marks the join read-only: selects still include the table, but
    /// saves and deletes never touch its rows. Weak joins fold in with a
    /// left join so missing foreign rows do not drop the master row.
    pub fn set_weak(&mut self) -> &mut Join {
        self.weak = true;
        self.kind = JoinKind::Left;
        self
    }

    pub fn set_kind(&mut self, kind: JoinKind) -> &mut Join {
        self.kind = kind;
        self
    }

    pub fn set_alias(&mut self, alias: &str) -> &mut Join {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn set_master_field(&mut self, field: &str) -> &mut Join {
        self.master_field = field.to_string();
        self
    }

    pub fn set_foreign_field(&mut self, field: &str) -> &mut Join {
        self.foreign_field = field.to_string();
        self
    }

    /// Prefix that qualifies this join's columns in rendered SQL.
    pub(crate) fn prefix(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.foreign_table)
    }

    /// The `table [alias]` spec understood by the statement builder.
    pub(crate) fn table_spec(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} {alias}", self.foreign_table),
            None => self.foreign_table.clone(),
        }
    }

    pub(crate) fn kind_str(&self) -> &'static str {
        match self.kind {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
        }
    }

    /// The ON condition linking the foreign table to the master table.
    pub(crate) fn on_expression(&self, master_prefix: &str) -> Expression {
        Expression::new("{}.{} = {}.{}")
            .arg(self.prefix())
            .arg(self.foreign_field.as_str())
            .arg(master_prefix)
            .arg(self.master_field.as_str())
    }

    pub(crate) fn unload(&mut self) {
        self.joined_id = None;
    }
}
