//! Error types shared across Beatlake crates

use thiserror::Error;

/// Failure to extract a natural key from a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key field is absent or null
    #[error("record has no value for key field '{field}'")]
    Missing { field: String },

    /// The key field holds a value that cannot identify a record
    #[error("key field '{field}' holds an unsupported {kind} value")]
    Unsupported { field: String, kind: &'static str },
}
