use crate::{typecast, Model};

use griddle_core::{Error, Result, Row, Value};
use griddle_sql::{CondField, CondValue, Dialect, Expression, Operator, Query, WhereTerm};

/// How sibling nodes of a scope combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Junction {
    #[default]
    And,
    Or,
}

/// A boolean tree of conditions restricting a model's dataset.
///
/// Nodes are atomic conditions, raw expressions, or nested groups. A model
/// owns one root scope (AND-joined); OR semantics come from nested groups.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    junction: Junction,
    nodes: Vec<ScopeNode>,
    pub(crate) root: bool,
}

/// One node of a scope tree.
#[derive(Debug, Clone)]
pub enum ScopeNode {
    Condition(Condition),
    Group(Scope),
    Expr(Expression),
}

/// An atomic `(field, operator, value)` condition against a model field.
#[derive(Debug, Clone)]
pub struct Condition {
    pub(crate) field: String,
    pub(crate) op: Operator,
    pub(crate) value: CondTarget,
}

/// The comparison target of a condition.
#[derive(Debug, Clone)]
pub enum CondTarget {
    Value(Value),
    List(Vec<Value>),
    Expr(Expression),
}

impl Scope {
    /// An AND-joined group.
    pub fn and() -> Scope {
        Scope {
            junction: Junction::And,
            nodes: Vec::new(),
            root: false,
        }
    }

    /// An OR-joined group.
    pub fn or() -> Scope {
        Scope {
            junction: Junction::Or,
            nodes: Vec::new(),
            root: false,
        }
    }

    pub fn junction(&self) -> Junction {
        self.junction
    }

    pub fn add(&mut self, node: impl Into<ScopeNode>) -> &mut Self {
        self.nodes.push(node.into());
        self
    }

    /// True when the scope holds no conditions at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[ScopeNode] {
        &self.nodes
    }

    /// Returns a truth-equivalent scope with redundant single-child group
    /// wrappers removed. Sibling order is preserved and same-junction
    /// groups are not merged.
    pub fn simplify(&self) -> Scope {
        Scope {
            junction: self.junction,
            nodes: self.nodes.iter().map(simplify_node).collect(),
            root: self.root,
        }
    }

    /// Returns the negation of this scope via De Morgan's laws.
    ///
    /// A root scope cannot be negated; raw expression nodes cannot be
    /// negated either since their text is opaque.
    pub fn negate(&self) -> Result<Scope> {
        if self.root {
            return Err(Error::configuration("cannot negate a root scope"));
        }
        let junction = match self.junction {
            Junction::And => Junction::Or,
            Junction::Or => Junction::And,
        };
        let nodes = self
            .nodes
            .iter()
            .map(|node| match node {
                ScopeNode::Condition(cond) => Ok(ScopeNode::Condition(cond.negate())),
                ScopeNode::Group(group) => Ok(ScopeNode::Group(group.negate()?)),
                ScopeNode::Expr(_) => Err(Error::configuration(
                    "cannot negate a raw expression condition",
                )),
            })
            .collect::<Result<_>>()?;
        Ok(Scope {
            junction,
            nodes,
            root: false,
        })
    }

    /// Contributes this scope to a query's where or having clause.
    ///
    /// An AND root adds its children as individual terms; anything else
    /// renders as one composed expression.
    pub(crate) fn apply(
        &self,
        model: &Model,
        query: &mut Query,
        dialect: Dialect,
        having: bool,
    ) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let push = |query: &mut Query, term: WhereTerm| {
            if having {
                query.having(term);
            } else {
                query.where_(term);
            }
        };
        if self.junction == Junction::And {
            for node in &self.nodes {
                push(query, node.to_where_term(model, dialect)?);
            }
        } else {
            push(query, WhereTerm::Expr(self.to_expression(model, dialect)?));
        }
        Ok(())
    }

    /// Renders the whole group as one parenthesized expression.
    pub(crate) fn to_expression(&self, model: &Model, dialect: Dialect) -> Result<Expression> {
        let glue = match self.junction {
            Junction::And => " and ",
            Junction::Or => " or ",
        };
        let mut template = String::from("(");
        let mut children = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                template.push_str(glue);
            }
            template.push_str("[]");
            children.push(node.to_where_term(model, dialect)?.to_expression(dialect)?);
        }
        template.push(')');

        let mut expr = Expression::new(template);
        for child in children {
            expr = expr.arg(child);
        }
        Ok(expr)
    }

    /// Evaluates the tree against an in-memory row, mirroring the SQL
    /// operator semantics.
    pub(crate) fn matches(&self, model: &Model, row: &Row) -> Result<bool> {
        if self.is_empty() {
            return Ok(true);
        }
        match self.junction {
            Junction::And => {
                for node in &self.nodes {
                    if !node.matches(model, row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Junction::Or => {
                for node in &self.nodes {
                    if node.matches(model, row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn simplify_node(node: &ScopeNode) -> ScopeNode {
    match node {
        ScopeNode::Group(group) => {
            if group.nodes.len() == 1 {
                simplify_node(&group.nodes[0])
            } else {
                ScopeNode::Group(group.simplify())
            }
        }
        other => other.clone(),
    }
}

impl ScopeNode {
    fn to_where_term(&self, model: &Model, dialect: Dialect) -> Result<WhereTerm> {
        match self {
            ScopeNode::Condition(cond) => cond.to_query_arguments(model, dialect),
            ScopeNode::Expr(expr) => Ok(WhereTerm::Expr(expr.clone())),
            ScopeNode::Group(group) => {
                Ok(WhereTerm::Expr(group.to_expression(model, dialect)?))
            }
        }
    }

    fn matches(&self, model: &Model, row: &Row) -> Result<bool> {
        match self {
            ScopeNode::Condition(cond) => cond.matches(model, row),
            ScopeNode::Group(group) => group.matches(model, row),
            ScopeNode::Expr(_) => Err(Error::unsupported(
                "expression conditions are not supported by the array persistence",
            )),
        }
    }
}

impl Condition {
    pub fn new(field: &str, op: Operator, value: impl Into<CondTarget>) -> Condition {
        Condition {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    /// The same condition with its operator inverted.
    pub fn negate(&self) -> Condition {
        let op = match self.op {
            Operator::Eq => Operator::Ne,
            Operator::Ne => Operator::Eq,
            Operator::Gt => Operator::Le,
            Operator::Le => Operator::Gt,
            Operator::Ge => Operator::Lt,
            Operator::Lt => Operator::Ge,
            Operator::Like => Operator::NotLike,
            Operator::NotLike => Operator::Like,
            Operator::In => Operator::NotIn,
            Operator::NotIn => Operator::In,
            Operator::Regexp => Operator::NotRegexp,
            Operator::NotRegexp => Operator::Regexp,
        };
        Condition {
            field: self.field.clone(),
            op,
            value: self.value.clone(),
        }
    }

    /// Converts the condition into the tuple form `Query::where_` consumes,
    /// resolving the field through the owning model so identifier escaping
    /// and typecasting apply.
    pub(crate) fn to_query_arguments(&self, model: &Model, dialect: Dialect) -> Result<WhereTerm> {
        let field = model.field(&self.field)?;
        let column = model.field_expression(&self.field, dialect)?;
        let value = match &self.value {
            CondTarget::Value(value) => CondValue::Value(typecast::save_value(field, value)?),
            CondTarget::List(items) => CondValue::List(
                items
                    .iter()
                    .map(|value| typecast::save_value(field, value))
                    .collect::<Result<_>>()?,
            ),
            CondTarget::Expr(expr) => CondValue::Expr(expr.clone()),
        };
        Ok(WhereTerm::Cond {
            field: CondField::Expr(column),
            op: self.op,
            value,
        })
    }

    fn matches(&self, model: &Model, row: &Row) -> Result<bool> {
        let field = model.field(&self.field)?;
        if field.is_expression() {
            return Err(Error::unsupported(
                "computed fields cannot be matched by the array persistence",
            ));
        }
        let actual = row
            .get(field.persisted_name())
            .cloned()
            .unwrap_or(Value::Null);
        let expected = match &self.value {
            CondTarget::Value(value) => Expected::One(typecast::save_value(field, value)?),
            CondTarget::List(items) => Expected::Many(
                items
                    .iter()
                    .map(|value| typecast::save_value(field, value))
                    .collect::<Result<_>>()?,
            ),
            CondTarget::Expr(_) => {
                return Err(Error::unsupported(
                    "expression conditions are not supported by the array persistence",
                ))
            }
        };
        evaluate(self.op, &actual, &expected)
    }
}

enum Expected {
    One(Value),
    Many(Vec<Value>),
}

/// Evaluates one operator the way the SQL backend would, including
/// three-valued-logic collapse of null comparisons to "no match".
fn evaluate(op: Operator, actual: &Value, expected: &Expected) -> Result<bool> {
    let value = match expected {
        Expected::Many(items) => {
            return match op {
                _ if items.is_empty() => Ok(matches!(op, Operator::Ne | Operator::NotIn)),
                _ if actual.is_null() => Ok(false),
                Operator::Eq | Operator::In => Ok(contains(items, actual)),
                Operator::Ne | Operator::NotIn => Ok(!contains(items, actual)),
                other => Err(Error::configuration(format!(
                    "operator {other} cannot compare against a list"
                ))),
            }
        }
        Expected::One(value) => value,
    };

    if value.is_null() {
        return Ok(match op {
            Operator::Eq => actual.is_null(),
            Operator::Ne => !actual.is_null(),
            _ => false,
        });
    }
    if actual.is_null() {
        return Ok(false);
    }

    match op {
        Operator::Eq | Operator::In => Ok(loose_eq(actual, value)),
        Operator::Ne | Operator::NotIn => Ok(!loose_eq(actual, value)),
        Operator::Gt => Ok(ordered(actual, value, |o| o.is_gt())),
        Operator::Ge => Ok(ordered(actual, value, |o| o.is_ge())),
        Operator::Lt => Ok(ordered(actual, value, |o| o.is_lt())),
        Operator::Le => Ok(ordered(actual, value, |o| o.is_le())),
        Operator::Like => Ok(like_regex(&text_of(value))?.is_match(&text_of(actual))),
        Operator::NotLike => Ok(!like_regex(&text_of(value))?.is_match(&text_of(actual))),
        Operator::Regexp => Ok(plain_regex(&text_of(value))?.is_match(&text_of(actual))),
        Operator::NotRegexp => Ok(!plain_regex(&text_of(value))?.is_match(&text_of(actual))),
    }
}

fn contains(items: &[Value], actual: &Value) -> bool {
    items.iter().any(|item| loose_eq(actual, item))
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    matches!(a.compare(b), Some(core::cmp::Ordering::Equal))
}

fn ordered(a: &Value, b: &Value, check: impl Fn(core::cmp::Ordering) -> bool) -> bool {
    a.compare(b).is_some_and(check)
}

fn text_of(value: &Value) -> String {
    typecast::stringify(value).unwrap_or_default()
}

/// Translates a SQL `like` pattern into an anchored, case-insensitive
/// regex: `%` becomes a greedy wildcard, `_` a single character.
fn like_regex(pattern: &str) -> Result<regex::Regex> {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    regex::RegexBuilder::new(&out)
        .case_insensitive(true)
        .build()
        .map_err(|err| Error::configuration(format!("invalid like pattern {pattern:?}: {err}")))
}

fn plain_regex(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern)
        .map_err(|err| Error::configuration(format!("invalid regexp pattern {pattern:?}: {err}")))
}

impl From<Condition> for ScopeNode {
    fn from(cond: Condition) -> ScopeNode {
        ScopeNode::Condition(cond)
    }
}

impl From<Scope> for ScopeNode {
    fn from(scope: Scope) -> ScopeNode {
        ScopeNode::Group(scope)
    }
}

impl From<Expression> for ScopeNode {
    fn from(expr: Expression) -> ScopeNode {
        ScopeNode::Expr(expr)
    }
}

impl<F, V> From<(F, V)> for ScopeNode
where
    F: Into<String>,
    V: Into<CondTarget>,
{
    fn from((field, value): (F, V)) -> ScopeNode {
        ScopeNode::Condition(Condition {
            field: field.into(),
            op: Operator::Eq,
            value: value.into(),
        })
    }
}

impl<F, V> From<(F, Operator, V)> for ScopeNode
where
    F: Into<String>,
    V: Into<CondTarget>,
{
    fn from((field, op, value): (F, Operator, V)) -> ScopeNode {
        ScopeNode::Condition(Condition {
            field: field.into(),
            op,
            value: value.into(),
        })
    }
}

/// A bare list of conditions forms an **OR** group. This asymmetry (every
/// other path joins with AND) is long-standing, documented behavior that
/// callers rely on.
impl<T> From<Vec<T>> for ScopeNode
where
    T: Into<ScopeNode>,
{
    fn from(nodes: Vec<T>) -> ScopeNode {
        let mut group = Scope::or();
        for node in nodes {
            group.add(node);
        }
        ScopeNode::Group(group)
    }
}

impl From<Value> for CondTarget {
    fn from(value: Value) -> CondTarget {
        CondTarget::Value(value)
    }
}

impl From<Expression> for CondTarget {
    fn from(expr: Expression) -> CondTarget {
        CondTarget::Expr(expr)
    }
}

impl<T> From<Vec<T>> for CondTarget
where
    Value: From<T>,
{
    fn from(items: Vec<T>) -> CondTarget {
        CondTarget::List(items.into_iter().map(Value::from).collect())
    }
}

macro_rules! impl_cond_target_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CondTarget {
                fn from(value: $ty) -> CondTarget {
                    CondTarget::Value(value.into())
                }
            }
        )*
    };
}

impl_cond_target_from_scalar!(bool, i32, i64, f64, &str, String);
