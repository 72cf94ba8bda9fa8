//! Error types for the masking engine.

use crate::entity::Category;
use thiserror::Error;

/// Errors surfaced by mapping operations and substitution passes.
///
/// Parse problems in the SQL itself are never reported here; those degrade
/// to the regex fallback and show up as [`crate::summary::ParseWarning`]s.
#[derive(Error, Debug)]
pub enum ConcealError {
    #[error("invalid mapping entry '{section}.{key}': {reason}")]
    InvalidEntry {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid mapping document: {0}")]
    InvalidDocument(String),

    #[error("placeholder '{placeholder}' of '{section}.{key}' is already used by another entry")]
    DuplicatePlaceholder {
        section: String,
        key: String,
        placeholder: String,
    },

    #[error("no {category} mapping for '{original}'")]
    UnknownEntry { category: Category, original: String },

    #[error("failed to compile substitution pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConcealError>;
