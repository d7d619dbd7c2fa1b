//! Domain layer - tag field rules with no I/O
//!
//! This crate contains:
//! - The tag string grammar (parse/render) and slug derivation
//! - Field options, bindings and tree path rules
//! - Manager state and set reconciliation
//! - Repository interfaces (traits)
//!
//! Storage lives in the infrastructure crate; the application crate drives
//! these rules inside host entity save/delete transactions.

pub mod binding;
pub mod error;
pub mod query;
pub mod tag;

// Re-export commonly used types
pub use binding::{FieldBinding, FieldKind, ModelBinding, TagReference, TagTable};
pub use error::{DomainError, Result};
pub use query::{Lookup, LookupOp};
pub use tag::{EntityPk, Tag, TagOptions, TagPk, TagSet};
