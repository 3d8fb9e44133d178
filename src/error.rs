//! Errors raised by rule evaluation. Bad payloads never show up here: they
//! fail validation with `Ok(false)`. These variants are configuration or
//! environment problems.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule was declared with fewer parameters than it needs
    #[error("validation rule {rule} requires at least {required} parameter(s)")]
    MissingParameters { rule: &'static str, required: usize },

    /// A rule parameter could not be interpreted
    #[error("validation rule {rule} has an invalid parameter: {value:?}")]
    InvalidParameter { rule: &'static str, value: String },

    /// The rule name is not one this crate knows about
    #[error("unknown validation rule {0:?}")]
    UnknownRule(String),

    /// The transient file for a decoded payload could not be created or written
    #[error("failed to materialize decoded payload: {0}")]
    Storage(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
