//! Beatlake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, key errors, and logging for the Beatlake workspace.
//!
//! # Overview
//!
//! - **Types**: tabular records, natural keys, snapshots and batches
//! - **Error Handling**: natural-key extraction errors
//! - **Logging**: centralized `tracing` setup shared by every binary
//!
//! # Example
//!
//! ```
//! use beatlake_common::{NaturalKey, Record};
//!
//! let record = Record::new().with("video_id", "Eb8rXCzJMUc").with("views", 42);
//! assert_eq!(
//!     record.natural_key("video_id").ok(),
//!     Some(NaturalKey::Str("Eb8rXCzJMUc".to_string()))
//! );
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::KeyError;
pub use types::{Batch, NaturalKey, Record, Snapshot, Value};
