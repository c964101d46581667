use crate::expression::{Arg, Expression, Rendered};
use crate::{Dialect, Operator};

use griddle_core::{Error, Result, Value};
use indexmap::IndexMap;

/// A full SQL statement assembled from named clause buckets.
///
/// A query starts in select mode and can be switched with [`Query::mode`].
/// Clause methods append state; nothing is rendered until [`Query::render`],
/// which assembles a template for the active mode and runs it through the
/// expression renderer. The same query can be rendered repeatedly and for
/// different dialects.
///
/// ```
/// use griddle_sql::{Dialect, Operator, Query};
///
/// let mut query = Query::new();
/// query
///     .field("name")
///     .table("employee")
///     .unwrap()
///     .where_(("salary", Operator::Gt, 50_000i64));
///
/// let rendered = query.render(Dialect::Sqlite).unwrap();
/// assert_eq!(
///     rendered.sql,
///     "select \"name\" from \"employee\" where \"salary\" > :a"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    mode: Mode,

    /// Whether this query is parenthesized when embedded in another
    /// expression. Disabled for members of union-style composites.
    wrap: bool,

    options: Vec<String>,
    with: Vec<Cte>,
    fields: Vec<SelectItem>,
    tables: Vec<TableItem>,
    joins: Vec<JoinClause>,
    where_clause: Vec<WhereTerm>,
    having_clause: Vec<WhereTerm>,
    group: Vec<SqlSource>,
    order: Vec<OrderItem>,
    limit: Option<Limit>,
    set_clause: IndexMap<String, Arg>,
}

/// The statement kind a [`Query`] renders as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
}

/// A clause bucket that [`Query::reset`] can clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Options,
    With,
    Fields,
    Tables,
    Joins,
    Where,
    Having,
    Group,
    Order,
    Limit,
    Set,
}

/// A field, table, group or order target: a plain identifier, an expression,
/// or a sub-query.
#[derive(Debug, Clone)]
pub enum SqlSource {
    Name(String),
    Expr(Expression),
    Query(Box<Query>),
}

/// One entry of a `where` or `having` clause. Entries are joined with `and`;
/// grouping with `or` is done by passing an already-composed expression.
#[derive(Debug, Clone)]
pub enum WhereTerm {
    /// A raw boolean expression used verbatim.
    Expr(Expression),

    /// A field compared against a value.
    Cond {
        field: CondField,
        op: Operator,
        value: CondValue,
    },
}

/// The left-hand side of a condition.
#[derive(Debug, Clone)]
pub enum CondField {
    Name(String),
    Expr(Expression),
}

/// The right-hand side of a condition.
#[derive(Debug, Clone)]
pub enum CondValue {
    Value(Value),
    List(Vec<Value>),
    Expr(Expression),
    Query(Box<Query>),
}

#[derive(Debug, Clone)]
struct SelectItem {
    source: SqlSource,
    alias: Option<String>,
}

#[derive(Debug, Clone)]
struct TableItem {
    source: SqlSource,
    alias: Option<String>,
}

#[derive(Debug, Clone)]
struct JoinClause {
    kind: String,
    table: SqlSource,
    alias: Option<String>,
    on: Option<Expression>,
}

#[derive(Debug, Clone)]
struct OrderItem {
    target: SqlSource,
    desc: bool,
}

#[derive(Debug, Clone)]
struct Cte {
    alias: String,
    fields: Option<Vec<String>>,
    query: Box<Query>,
    recursive: bool,
}

#[derive(Debug, Clone, Copy)]
struct Limit {
    count: Option<i64>,
    shift: Option<i64>,
}

impl Query {
    pub fn new() -> Query {
        Query {
            mode: Mode::Select,
            wrap: true,
            options: Vec::new(),
            with: Vec::new(),
            fields: Vec::new(),
            tables: Vec::new(),
            joins: Vec::new(),
            where_clause: Vec::new(),
            having_clause: Vec::new(),
            group: Vec::new(),
            order: Vec::new(),
            limit: None,
            set_clause: IndexMap::new(),
        }
    }

    /// Switches the statement kind.
    ///
    /// Fails when a sub-query is registered as the table, since only select
    /// statements can read from a derived table.
    pub fn mode(&mut self, mode: Mode) -> Result<&mut Self> {
        if mode != Mode::Select
            && self
                .tables
                .iter()
                .any(|t| matches!(t.source, SqlSource::Query(_)))
        {
            return Err(Error::configuration(format!(
                "{mode} statement cannot use a sub-query as its table"
            )));
        }
        self.mode = mode;
        Ok(self)
    }

    /// Controls parenthesization when this query is embedded in another
    /// expression. Defaults to wrapped.
    pub fn wrap(&mut self, wrap: bool) -> &mut Self {
        self.wrap = wrap;
        self
    }

    pub(crate) fn is_wrapped(&self) -> bool {
        self.wrap
    }

    /// Appends a field to the select list.
    pub fn field(&mut self, source: impl Into<SqlSource>) -> &mut Self {
        self.fields.push(SelectItem {
            source: source.into(),
            alias: None,
        });
        self
    }

    /// Appends an aliased field to the select list. A duplicate alias fails
    /// instead of silently overwriting the earlier field.
    pub fn field_as(&mut self, source: impl Into<SqlSource>, alias: &str) -> Result<&mut Self> {
        if self
            .fields
            .iter()
            .any(|f| f.alias.as_deref() == Some(alias))
        {
            return Err(Error::configuration(format!(
                "field alias {alias:?} is already in use"
            )));
        }
        self.fields.push(SelectItem {
            source: source.into(),
            alias: Some(alias.to_string()),
        });
        Ok(self)
    }

    /// Registers a FROM source.
    ///
    /// A sub-query source must either carry an alias (see
    /// [`Query::table_as`]) or have wrapping disabled, as union members do.
    pub fn table(&mut self, source: impl Into<SqlSource>) -> Result<&mut Self> {
        let source = source.into();
        if let SqlSource::Query(query) = &source {
            if query.is_wrapped() {
                return Err(Error::configuration(
                    "sub-query used as a table requires an alias",
                ));
            }
        }
        self.push_table(source, None)
    }

    /// Registers an aliased FROM source.
    pub fn table_as(&mut self, source: impl Into<SqlSource>, alias: &str) -> Result<&mut Self> {
        self.push_table(source.into(), Some(alias.to_string()))
    }

    fn push_table(&mut self, source: SqlSource, alias: Option<String>) -> Result<&mut Self> {
        if self.mode != Mode::Select {
            if let SqlSource::Query(_) = source {
                return Err(Error::configuration(format!(
                    "{} statement cannot use a sub-query as its table",
                    self.mode
                )));
            }
        }
        if let Some(alias) = &alias {
            if self
                .tables
                .iter()
                .any(|t| t.alias.as_deref() == Some(alias.as_str()))
            {
                return Err(Error::configuration(format!(
                    "table alias {alias:?} is already in use"
                )));
            }
        }
        self.tables.push(TableItem { source, alias });
        Ok(self)
    }

    /// Registers a LEFT JOIN. `spec` is the foreign table, optionally
    /// followed by an alias (`"address a"`). Without an explicit ON
    /// expression the join condition is inferred by convention:
    /// `<foreign>.id = <base>.<foreign>_id`.
    pub fn join(&mut self, spec: &str, on: Option<Expression>) -> &mut Self {
        self.join_kind("left", spec, on)
    }

    /// Registers a join of an explicit kind (`inner`, `left`, `right`, ...).
    pub fn join_kind(&mut self, kind: &str, spec: &str, on: Option<Expression>) -> &mut Self {
        let mut parts = spec.split_whitespace();
        let table = parts.next().unwrap_or_default().to_string();
        let alias = parts.next().map(|s| s.to_string());
        self.joins.push(JoinClause {
            kind: kind.to_string(),
            table: SqlSource::Name(table),
            alias,
            on,
        });
        self
    }

    /// Registers a join against an expression source. The ON expression is
    /// required since no convention applies.
    pub fn join_expr(&mut self, kind: &str, table: Expression, alias: &str, on: Expression) -> &mut Self {
        self.joins.push(JoinClause {
            kind: kind.to_string(),
            table: SqlSource::Expr(table),
            alias: Some(alias.to_string()),
            on: Some(on),
        });
        self
    }

    /// Appends a WHERE entry; entries are joined with `and`.
    ///
    /// Accepts a raw expression, a `(field, value)` pair (`=` implied, null
    /// aware), or a `(field, operator, value)` triple.
    pub fn where_(&mut self, term: impl Into<WhereTerm>) -> &mut Self {
        self.where_clause.push(term.into());
        self
    }

    /// Appends a HAVING entry; same forms as [`Query::where_`].
    pub fn having(&mut self, term: impl Into<WhereTerm>) -> &mut Self {
        self.having_clause.push(term.into());
        self
    }

    /// Appends a GROUP BY target.
    pub fn group(&mut self, target: impl Into<SqlSource>) -> &mut Self {
        self.group.push(target.into());
        self
    }

    /// Appends an ORDER BY target, descending when `desc` is set.
    pub fn order(&mut self, target: impl Into<SqlSource>, desc: bool) -> &mut Self {
        self.order.push(OrderItem {
            target: target.into(),
            desc,
        });
        self
    }

    /// Sets the LIMIT clause. A missing count with a set offset renders the
    /// maximum integer as count, since offset cannot stand alone.
    pub fn limit(&mut self, count: Option<i64>, shift: Option<i64>) -> &mut Self {
        self.limit = Some(Limit { count, shift });
        self
    }

    /// Sets a field value for insert and update statements. Setting the same
    /// field again replaces the pending value.
    pub fn set(&mut self, field: &str, value: impl Into<Arg>) -> &mut Self {
        self.set_clause.insert(field.to_string(), value.into());
        self
    }

    /// Appends a statement option rendered right after the statement keyword,
    /// such as `distinct`. The option is raw SQL.
    pub fn option(&mut self, option: &str) -> &mut Self {
        self.options.push(option.to_string());
        self
    }

    /// Registers a common table expression rendered before the statement.
    pub fn with_cte(
        &mut self,
        query: Query,
        alias: &str,
        fields: Option<Vec<String>>,
        recursive: bool,
    ) -> Result<&mut Self> {
        if self.with.iter().any(|c| c.alias == alias) {
            return Err(Error::configuration(format!(
                "cte alias {alias:?} is already in use"
            )));
        }
        let mut query = query;
        // The template parenthesizes the cte body itself
        query.wrap(false);
        self.with.push(Cte {
            alias: alias.to_string(),
            fields,
            query: Box::new(query),
            recursive,
        });
        Ok(self)
    }

    /// Clears one clause bucket.
    pub fn reset(&mut self, clause: Clause) -> &mut Self {
        match clause {
            Clause::Options => self.options.clear(),
            Clause::With => self.with.clear(),
            Clause::Fields => self.fields.clear(),
            Clause::Tables => self.tables.clear(),
            Clause::Joins => self.joins.clear(),
            Clause::Where => self.where_clause.clear(),
            Clause::Having => self.having_clause.clear(),
            Clause::Group => self.group.clear(),
            Clause::Order => self.order.clear(),
            Clause::Limit => self.limit = None,
            Clause::Set => self.set_clause.clear(),
        }
        self
    }

    /// Clears every clause bucket, reverting to a bare `select *`.
    pub fn reset_all(&mut self) -> &mut Self {
        *self = Query::new();
        self
    }

    /// Renders the statement for the given dialect.
    pub fn render(&self, dialect: Dialect) -> Result<Rendered> {
        self.build(dialect)?.render(dialect)
    }

    /// Renders with parameters inlined as literals, for diagnostics only.
    pub fn preview(&self, dialect: Dialect) -> Result<String> {
        self.build(dialect)?.preview(dialect)
    }

    /// Assembles the mode-specific template with one named argument per
    /// non-empty clause.
    pub(crate) fn build(&self, dialect: Dialect) -> Result<Expression> {
        match self.mode {
            Mode::Select => self.build_select(dialect),
            Mode::Insert => self.build_insert(dialect),
            Mode::Update => self.build_update(dialect),
            Mode::Delete => self.build_delete(dialect),
            Mode::Truncate => self.build_truncate(dialect),
        }
    }

    fn build_select(&self, dialect: Dialect) -> Result<Expression> {
        let mut template = String::new();
        let mut named = IndexMap::new();

        if !self.with.is_empty() {
            template.push_str("[with]");
            named.insert("with".to_string(), Arg::Expr(self.with_fragment()));
        }
        template.push_str("select");
        if !self.options.is_empty() {
            template.push_str("[option]");
            named.insert("option".to_string(), Arg::Expr(self.option_fragment()));
        }
        template.push_str(" [field]");
        named.insert("field".to_string(), Arg::Expr(self.field_fragment()));
        if !self.tables.is_empty() {
            template.push_str(" from [table]");
            named.insert("table".to_string(), Arg::Expr(self.table_fragment()));
        }
        if !self.joins.is_empty() {
            template.push_str("[join]");
            named.insert("join".to_string(), Arg::Expr(self.join_fragment()?));
        }
        if !self.where_clause.is_empty() {
            template.push_str("[where]");
            named.insert(
                "where".to_string(),
                Arg::Expr(condition_fragment(&self.where_clause, " where ", dialect)?),
            );
        }
        if !self.group.is_empty() {
            template.push_str("[group]");
            named.insert("group".to_string(), Arg::Expr(self.group_fragment()));
        }
        if !self.having_clause.is_empty() {
            template.push_str("[having]");
            named.insert(
                "having".to_string(),
                Arg::Expr(condition_fragment(&self.having_clause, " having ", dialect)?),
            );
        }
        if !self.order.is_empty() {
            template.push_str("[order]");
            named.insert("order".to_string(), Arg::Expr(self.order_fragment()));
        }
        if let Some(limit) = self.limit_fragment() {
            template.push_str(&limit);
        }

        Ok(Expression::with_named(template, named))
    }

    fn build_insert(&self, dialect: Dialect) -> Result<Expression> {
        let table = self.single_table()?;
        let mut template = String::from("insert");
        let mut named = IndexMap::new();

        if !self.options.is_empty() {
            template.push_str("[option]");
            named.insert("option".to_string(), Arg::Expr(self.option_fragment()));
        }
        template.push_str(" into {table}");
        named.insert("table".to_string(), Arg::Value(Value::String(table.to_string())));

        if self.set_clause.is_empty() {
            // Engines disagree on how to insert a row of defaults
            match dialect {
                Dialect::Mysql => template.push_str(" () values ()"),
                Dialect::Sqlite | Dialect::Postgresql => template.push_str(" default values"),
            }
            return Ok(Expression::with_named(template, named));
        }

        template.push_str(" ([set_fields]) values ([set_values])");
        let mut fields_template = String::new();
        let mut fields_args = Vec::new();
        let mut values_template = String::new();
        let mut values_args = Vec::new();
        for (i, (field, value)) in self.set_clause.iter().enumerate() {
            if i > 0 {
                fields_template.push_str(", ");
                values_template.push_str(", ");
            }
            fields_template.push_str("{}");
            fields_args.push(Arg::Value(Value::String(field.clone())));
            values_template.push_str("[]");
            values_args.push(value.clone());
        }
        named.insert(
            "set_fields".to_string(),
            Arg::Expr(Expression::with_args(fields_template, fields_args)),
        );
        named.insert(
            "set_values".to_string(),
            Arg::Expr(Expression::with_args(values_template, values_args)),
        );

        Ok(Expression::with_named(template, named))
    }

    fn build_update(&self, dialect: Dialect) -> Result<Expression> {
        let table = self.single_table()?;
        if self.set_clause.is_empty() {
            return Err(Error::render("update requires at least one field to set"));
        }

        let mut template = String::from("update {table} set [set]");
        let mut named = IndexMap::new();
        named.insert("table".to_string(), Arg::Value(Value::String(table.to_string())));

        let mut set_template = String::new();
        let mut set_args = Vec::new();
        for (i, (field, value)) in self.set_clause.iter().enumerate() {
            if i > 0 {
                set_template.push_str(", ");
            }
            set_template.push_str("{} = []");
            set_args.push(Arg::Value(Value::String(field.clone())));
            set_args.push(value.clone());
        }
        named.insert(
            "set".to_string(),
            Arg::Expr(Expression::with_args(set_template, set_args)),
        );

        if !self.where_clause.is_empty() {
            template.push_str("[where]");
            named.insert(
                "where".to_string(),
                Arg::Expr(condition_fragment(&self.where_clause, " where ", dialect)?),
            );
        }

        Ok(Expression::with_named(template, named))
    }

    fn build_delete(&self, dialect: Dialect) -> Result<Expression> {
        let table = self.single_table()?;
        let mut template = String::from("delete from {table}");
        let mut named = IndexMap::new();
        named.insert("table".to_string(), Arg::Value(Value::String(table.to_string())));

        if !self.where_clause.is_empty() {
            template.push_str("[where]");
            named.insert(
                "where".to_string(),
                Arg::Expr(condition_fragment(&self.where_clause, " where ", dialect)?),
            );
        }

        Ok(Expression::with_named(template, named))
    }

    fn build_truncate(&self, dialect: Dialect) -> Result<Expression> {
        let table = self.single_table()?;
        let mut named = IndexMap::new();
        named.insert("table".to_string(), Arg::Value(Value::String(table.to_string())));

        // SQLite has no truncate statement; an unconditional delete is its
        // documented equivalent.
        let template = match dialect {
            Dialect::Sqlite => "delete from {table}",
            Dialect::Mysql | Dialect::Postgresql => "truncate table {table}",
        };

        Ok(Expression::with_named(template, named))
    }

    /// The single named table that insert, update, delete and truncate
    /// statements operate on.
    fn single_table(&self) -> Result<&str> {
        match self.tables.as_slice() {
            [TableItem {
                source: SqlSource::Name(name),
                ..
            }] => Ok(name.as_str()),
            [] => Err(Error::configuration(format!(
                "{} statement requires a table",
                self.mode
            ))),
            _ => Err(Error::configuration(format!(
                "{} statement requires a single named table",
                self.mode
            ))),
        }
    }

    fn field_fragment(&self) -> Expression {
        if self.fields.is_empty() {
            return Expression::new("*");
        }

        let mut template = String::new();
        let mut args = Vec::new();
        for (i, item) in self.fields.iter().enumerate() {
            if i > 0 {
                template.push_str(", ");
            }
            push_source(&mut template, &mut args, &item.source);
            if let Some(alias) = &item.alias {
                template.push_str(" {}");
                args.push(Arg::Value(Value::String(alias.clone())));
            }
        }
        Expression::with_args(template, args)
    }

    fn table_fragment(&self) -> Expression {
        let mut template = String::new();
        let mut args = Vec::new();
        for (i, item) in self.tables.iter().enumerate() {
            if i > 0 {
                template.push_str(", ");
            }
            push_source(&mut template, &mut args, &item.source);
            if let Some(alias) = &item.alias {
                template.push_str(" {}");
                args.push(Arg::Value(Value::String(alias.clone())));
            }
        }
        Expression::with_args(template, args)
    }

    fn join_fragment(&self) -> Result<Expression> {
        let mut template = String::new();
        let mut args = Vec::new();

        for join in &self.joins {
            template.push(' ');
            template.push_str(&join.kind);
            template.push_str(" join ");
            push_source(&mut template, &mut args, &join.table);
            if let Some(alias) = &join.alias {
                template.push_str(" {}");
                args.push(Arg::Value(Value::String(alias.clone())));
            }
            template.push_str(" on []");
            let on = match &join.on {
                Some(on) => on.clone(),
                None => self.infer_join_condition(join)?,
            };
            args.push(Arg::Expr(on));
        }

        Ok(Expression::with_args(template, args))
    }

    /// Builds the conventional join condition `<foreign>.id =
    /// <base>.<foreign>_id` against the first registered table.
    fn infer_join_condition(&self, join: &JoinClause) -> Result<Expression> {
        let foreign_table = match &join.table {
            SqlSource::Name(name) => name,
            _ => {
                return Err(Error::configuration(
                    "join against an expression requires an explicit on condition",
                ))
            }
        };
        let base = match self.tables.first() {
            Some(TableItem {
                alias: Some(alias), ..
            }) => alias.clone(),
            Some(TableItem {
                source: SqlSource::Name(name),
                ..
            }) => name.clone(),
            _ => {
                return Err(Error::configuration(
                    "join condition inference requires a named base table",
                ))
            }
        };
        let foreign = join.alias.clone().unwrap_or_else(|| foreign_table.clone());

        Ok(Expression::new("{}.{} = {}.{}")
            .arg(foreign)
            .arg("id")
            .arg(base)
            .arg(format!("{foreign_table}_id")))
    }

    fn group_fragment(&self) -> Expression {
        let mut template = String::from(" group by ");
        let mut args = Vec::new();
        for (i, target) in self.group.iter().enumerate() {
            if i > 0 {
                template.push_str(", ");
            }
            push_source(&mut template, &mut args, target);
        }
        Expression::with_args(template, args)
    }

    fn order_fragment(&self) -> Expression {
        let mut template = String::from(" order by ");
        let mut args = Vec::new();
        for (i, item) in self.order.iter().enumerate() {
            if i > 0 {
                template.push_str(", ");
            }
            push_source(&mut template, &mut args, &item.target);
            if item.desc {
                template.push_str(" desc");
            }
        }
        Expression::with_args(template, args)
    }

    fn limit_fragment(&self) -> Option<String> {
        let limit = self.limit?;
        match (limit.count, limit.shift) {
            (Some(count), Some(shift)) => Some(format!(" limit {count} offset {shift}")),
            (Some(count), None) => Some(format!(" limit {count}")),
            // Offset cannot stand alone, so an unknown count becomes the
            // largest representable one.
            (None, Some(shift)) => Some(format!(" limit {} offset {shift}", i64::MAX)),
            (None, None) => None,
        }
    }

    fn option_fragment(&self) -> Expression {
        let mut template = String::new();
        for option in &self.options {
            template.push(' ');
            template.push_str(option);
        }
        Expression::new(template)
    }

    fn with_fragment(&self) -> Expression {
        let mut template = String::from("with ");
        if self.with.iter().any(|c| c.recursive) {
            template.push_str("recursive ");
        }

        let mut args = Vec::new();
        for (i, cte) in self.with.iter().enumerate() {
            if i > 0 {
                template.push_str(", ");
            }
            template.push_str("{}");
            args.push(Arg::Value(Value::String(cte.alias.clone())));
            if let Some(fields) = &cte.fields {
                template.push_str(" (");
                for (j, field) in fields.iter().enumerate() {
                    if j > 0 {
                        template.push_str(", ");
                    }
                    template.push_str("{}");
                    args.push(Arg::Value(Value::String(field.clone())));
                }
                template.push(')');
            }
            template.push_str(" as ([])");
            args.push(Arg::Query(cte.query.clone()));
        }
        template.push(' ');

        Expression::with_args(template, args)
    }
}

impl Default for Query {
    fn default() -> Query {
        Query::new()
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(match self {
            Mode::Select => "select",
            Mode::Insert => "insert",
            Mode::Update => "update",
            Mode::Delete => "delete",
            Mode::Truncate => "truncate",
        })
    }
}

fn push_source(template: &mut String, args: &mut Vec<Arg>, source: &SqlSource) {
    match source {
        SqlSource::Name(name) => {
            template.push_str("{{}}");
            args.push(Arg::Value(Value::String(name.clone())));
        }
        SqlSource::Expr(expr) => {
            template.push_str("[]");
            args.push(Arg::Expr(expr.clone()));
        }
        SqlSource::Query(query) => {
            template.push_str("[]");
            args.push(Arg::Query(query.clone()));
        }
    }
}

fn condition_fragment(terms: &[WhereTerm], keyword: &str, dialect: Dialect) -> Result<Expression> {
    let mut template = String::from(keyword);
    let mut args = Vec::new();
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            template.push_str(" and ");
        }
        template.push_str("[]");
        args.push(Arg::Expr(term.to_expression(dialect)?));
    }
    Ok(Expression::with_args(template, args))
}

impl WhereTerm {
    /// Lowers the term into a renderable expression for one dialect.
    pub fn to_expression(&self, dialect: Dialect) -> Result<Expression> {
        let (field, op, value) = match self {
            WhereTerm::Expr(expr) => return Ok(expr.clone()),
            WhereTerm::Cond { field, op, value } => (field, *op, value),
        };

        let (field_part, field_arg): (&str, Arg) = match field {
            CondField::Name(name) => ("{{}}", Arg::Value(Value::String(name.clone()))),
            CondField::Expr(expr) => ("[]", Arg::Expr(expr.clone())),
        };

        match value {
            // Equality against null has a dedicated SQL spelling
            CondValue::Value(Value::Null) if op == Operator::Eq => Ok(Expression::with_args(
                format!("{field_part} is null"),
                vec![field_arg],
            )),
            CondValue::Value(Value::Null) if op == Operator::Ne => Ok(Expression::with_args(
                format!("{field_part} is not null"),
                vec![field_arg],
            )),
            CondValue::List(items) => {
                let op = match op {
                    Operator::Eq | Operator::In => Operator::In,
                    Operator::Ne | Operator::NotIn => Operator::NotIn,
                    other => {
                        return Err(Error::configuration(format!(
                            "operator {other} cannot compare against a list"
                        )))
                    }
                };
                if items.is_empty() {
                    // Nothing is in the empty set
                    return Ok(Expression::new(match op {
                        Operator::In => "1 = 0",
                        _ => "1 = 1",
                    }));
                }
                Ok(Expression::with_args(
                    format!("{field_part} {} []", op.sql(dialect)),
                    vec![field_arg, Arg::Value(Value::List(items.clone()))],
                ))
            }
            CondValue::Value(scalar) => {
                // Membership against a scalar degrades to plain comparison
                let op = match op {
                    Operator::In => Operator::Eq,
                    Operator::NotIn => Operator::Ne,
                    other => other,
                };
                Ok(Expression::with_args(
                    format!("{field_part} {} []", op.sql(dialect)),
                    vec![field_arg, Arg::Value(scalar.clone())],
                ))
            }
            CondValue::Expr(expr) => Ok(Expression::with_args(
                format!("{field_part} {} []", op.sql(dialect)),
                vec![field_arg, Arg::Expr(expr.clone())],
            )),
            CondValue::Query(query) => Ok(Expression::with_args(
                format!("{field_part} {} []", op.sql(dialect)),
                vec![field_arg, Arg::Query(query.clone())],
            )),
        }
    }
}

impl From<&str> for SqlSource {
    fn from(name: &str) -> SqlSource {
        SqlSource::Name(name.to_string())
    }
}

impl From<String> for SqlSource {
    fn from(name: String) -> SqlSource {
        SqlSource::Name(name)
    }
}

impl From<Expression> for SqlSource {
    fn from(expr: Expression) -> SqlSource {
        SqlSource::Expr(expr)
    }
}

impl From<Query> for SqlSource {
    fn from(query: Query) -> SqlSource {
        SqlSource::Query(Box::new(query))
    }
}

impl From<Expression> for WhereTerm {
    fn from(expr: Expression) -> WhereTerm {
        WhereTerm::Expr(expr)
    }
}

impl<F, V> From<(F, V)> for WhereTerm
where
    F: Into<CondField>,
    V: Into<CondValue>,
{
    fn from((field, value): (F, V)) -> WhereTerm {
        WhereTerm::Cond {
            field: field.into(),
            op: Operator::Eq,
            value: value.into(),
        }
    }
}

impl<F, V> From<(F, Operator, V)> for WhereTerm
where
    F: Into<CondField>,
    V: Into<CondValue>,
{
    fn from((field, op, value): (F, Operator, V)) -> WhereTerm {
        WhereTerm::Cond {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

impl From<&str> for CondField {
    fn from(name: &str) -> CondField {
        CondField::Name(name.to_string())
    }
}

impl From<String> for CondField {
    fn from(name: String) -> CondField {
        CondField::Name(name)
    }
}

impl From<Expression> for CondField {
    fn from(expr: Expression) -> CondField {
        CondField::Expr(expr)
    }
}

impl From<Value> for CondValue {
    fn from(value: Value) -> CondValue {
        CondValue::Value(value)
    }
}

impl From<Expression> for CondValue {
    fn from(expr: Expression) -> CondValue {
        CondValue::Expr(expr)
    }
}

impl From<Query> for CondValue {
    fn from(query: Query) -> CondValue {
        CondValue::Query(Box::new(query))
    }
}

impl<T> From<Vec<T>> for CondValue
where
    Value: From<T>,
{
    fn from(items: Vec<T>) -> CondValue {
        CondValue::List(items.into_iter().map(Value::from).collect())
    }
}

macro_rules! impl_cond_value_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CondValue {
                fn from(value: $ty) -> CondValue {
                    CondValue::Value(value.into())
                }
            }
        )*
    };
}

impl_cond_value_from_scalar!(bool, i32, i64, f64, &str, String);
