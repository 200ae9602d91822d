//! Security module for query validation and identifier handling.

mod identifiers;
mod validation;

pub use identifiers::{
    parse_table_name, quote_identifier, validate_identifier, TableName, MAX_IDENTIFIER_LENGTH,
};
pub use validation::{QueryValidator, ValidationMode};
