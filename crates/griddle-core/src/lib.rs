mod error;
pub use error::Error;

mod field_type;
pub use field_type::FieldType;

mod row;
pub use row::Row;

mod value;
pub use value::Value;

mod value_chrono;

/// A Result type alias that uses Griddle's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;
