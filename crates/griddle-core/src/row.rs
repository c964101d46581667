use crate::Value;

use indexmap::IndexMap;

/// A single result row: column names mapped to values, in select order.
pub type Row = IndexMap<String, Value>;
