use crate::error::Result;
use crate::writer::value::{escape, SqlValue};
use crate::writer::{check_valid, fail, Quantity, QueryWriter};

/// `LET $name = value`. Produces no result of its own.
#[derive(Debug, Clone)]
pub struct LetQueryWriter {
    name: String,
    value: SqlValue,
    invalid: Option<String>,
}

/// Assign `value` (plain, raw or a subquery) to the parameter `$name` for
/// the remaining statements of the batch.
pub fn let_value(name: &str, value: impl Into<SqlValue>) -> LetQueryWriter {
    let mut invalid = None;
    let valid_name = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
        fail(&mut invalid, format!("Invalid LET name: {}", name));
    }

    LetQueryWriter {
        name: name.to_string(),
        value: value.into(),
        invalid,
    }
}

impl QueryWriter for LetQueryWriter {
    fn to_query(&self) -> Result<String> {
        check_valid(&self.invalid)?;
        Ok(format!("LET ${} = {}", self.name, escape(&self.value)?))
    }

    fn quantity(&self) -> Quantity {
        Quantity::Zero
    }
}
