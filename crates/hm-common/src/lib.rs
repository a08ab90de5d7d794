//! hpcmail common types, IDs, and errors.
//!
//! This crate provides foundational types shared across hm-core modules:
//! - Process identity types
//! - Common error types with stable codes
//! - Output format selection

pub mod error;
pub mod id;
pub mod output;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use id::ProcessId;
pub use output::OutputFormat;
