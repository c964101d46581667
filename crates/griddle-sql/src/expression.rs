use crate::renderer::Renderer;
use crate::{Dialect, Query};

use griddle_core::{Result, Value};
use indexmap::IndexMap;

/// A composable SQL fragment built from a template and arguments.
///
/// Templates mix literal SQL with three placeholder kinds:
///
/// - `[]` and `[tag]` bind an argument as a parameter. Nested expressions and
///   queries are rendered inline, merging their parameters into the parent's
///   map. Scalar values become named parameters (`:a`, `:b`, ...).
/// - `{}` and `{tag}` escape an argument as an identifier, always quoted.
/// - `{{}}` and `{{tag}}` escape an argument as an identifier unless it is a
///   form that must pass through untouched (`*`, dotted paths, parenthesized
///   sub-expressions, pre-quoted names).
///
/// Quoted string literals inside the template are never scanned for
/// placeholders. Rendering never interpolates values into the SQL text.
///
/// ```
/// use griddle_sql::{Dialect, Expression};
///
/// let expr = Expression::new("{{}} > []").arg("age").arg(30i64);
/// let rendered = expr.render(Dialect::Sqlite).unwrap();
/// assert_eq!(rendered.sql, "\"age\" > :a");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Expression {
    pub(crate) template: String,
    pub(crate) positional: Vec<Arg>,
    pub(crate) named: IndexMap<String, Arg>,
}

/// An argument bound into an [`Expression`] template.
#[derive(Debug, Clone)]
pub enum Arg {
    /// A plain value, bound as a parameter.
    Value(Value),

    /// A nested expression, rendered inline.
    Expr(Expression),

    /// A nested query, rendered inline and parenthesized unless the query
    /// opted out of wrapping.
    Query(Box<Query>),
}

/// The result of rendering an expression or query: the SQL text and the
/// parameters to bind, keyed by placeholder name (`:a`, `:b`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: IndexMap<String, Value>,
}

impl Expression {
    /// Creates an expression from a template with no arguments bound yet.
    pub fn new(template: impl Into<String>) -> Expression {
        Expression {
            template: template.into(),
            positional: Vec::new(),
            named: IndexMap::new(),
        }
    }

    /// Creates an expression with positional arguments.
    pub fn with_args(template: impl Into<String>, args: Vec<Arg>) -> Expression {
        Expression {
            template: template.into(),
            positional: args,
            named: IndexMap::new(),
        }
    }

    pub(crate) fn with_named(template: impl Into<String>, named: IndexMap<String, Arg>) -> Expression {
        Expression {
            template: template.into(),
            positional: Vec::new(),
            named,
        }
    }

    /// Appends a positional argument, consumed left to right by `[]`, `{}`
    /// and `{{}}` placeholders.
    pub fn arg(mut self, arg: impl Into<Arg>) -> Expression {
        self.positional.push(arg.into());
        self
    }

    /// Binds a named argument, looked up by `[tag]`, `{tag}` and `{{tag}}`
    /// placeholders.
    pub fn named_arg(mut self, tag: impl Into<String>, arg: impl Into<Arg>) -> Expression {
        self.named.insert(tag.into(), arg.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the named argument bound under `tag`, if any.
    pub fn arg_named(&self, tag: &str) -> Option<&Arg> {
        self.named.get(tag)
    }

    /// Replaces or inserts the named argument bound under `tag`.
    pub fn set_arg(&mut self, tag: impl Into<String>, arg: impl Into<Arg>) {
        self.named.insert(tag.into(), arg.into());
    }

    /// Returns the positional argument at `index`, if any.
    pub fn arg_at(&self, index: usize) -> Option<&Arg> {
        self.positional.get(index)
    }

    /// Replaces the positional argument at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set_arg_at(&mut self, index: usize, arg: impl Into<Arg>) {
        self.positional[index] = arg.into();
    }

    /// Renders the template into SQL text plus a parameter map.
    ///
    /// Rendering is idempotent: the expression is not mutated, and parameter
    /// naming restarts at `:a` on every call.
    pub fn render(&self, dialect: Dialect) -> Result<Rendered> {
        let mut renderer = Renderer::new(dialect);
        renderer.render_expression(self)?;
        Ok(renderer.finish())
    }

    /// Renders with parameter values inlined as SQL literals.
    ///
    /// For logs and error messages only. The output must never be executed,
    /// since literal inlining bypasses parameter binding.
    pub fn preview(&self, dialect: Dialect) -> Result<String> {
        let mut renderer = Renderer::new_preview(dialect);
        renderer.render_expression(self)?;
        Ok(renderer.finish().sql)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Arg {
        Arg::Value(value)
    }
}

impl From<Expression> for Arg {
    fn from(expr: Expression) -> Arg {
        Arg::Expr(expr)
    }
}

impl From<Query> for Arg {
    fn from(query: Query) -> Arg {
        Arg::Query(Box::new(query))
    }
}

macro_rules! impl_arg_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Arg {
                    Arg::Value(value.into())
                }
            }
        )*
    };
}

impl_arg_from_value!(bool, i32, i64, f64, &str, String, Vec<Value>);
