use crate::Dialect;

use griddle_core::Error;

/// A comparison operator usable in `where` and `having` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    In,
    NotIn,
    Regexp,
    NotRegexp,
}

impl Operator {
    /// The SQL spelling of this operator for the given dialect.
    pub fn sql(&self, dialect: Dialect) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Like => "like",
            Operator::NotLike => "not like",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Regexp => dialect.regexp_operator(),
            Operator::NotRegexp => dialect.not_regexp_operator(),
        }
    }

    /// Whether this operator takes a set of values on the right-hand side.
    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl std::str::FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "=" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "regexp" => Operator::Regexp,
            "not regexp" => Operator::NotRegexp,
            _ => {
                return Err(Error::configuration(format!(
                    "operator {s:?} is not supported"
                )))
            }
        })
    }
}

impl core::fmt::Display for Operator {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(self.sql(Dialect::Sqlite))
    }
}
