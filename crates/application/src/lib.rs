//! Application layer - tag field workflows
//!
//! Resolves field bindings, keeps tag counts in step with host entity
//! writes, seeds initial tags and merges tags.

pub mod registry;
pub mod tag;

pub use registry::TagRegistry;
pub use tag::{
    InitialTagReport, MergeEngine, MergeReport, MultiTagManager, SingleTagManager, TaggedInstance,
    TaggedModel, load_initial_tags,
};
