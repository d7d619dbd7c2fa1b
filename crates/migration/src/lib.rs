//! Schema for tag field storage
//!
//! Auxiliary tag tables, multi-tag join tables and single-tag foreign key
//! columns are named at runtime from field bindings, so the schema is
//! described by a [`TagSchema`] value rather than a fixed migrator.

mod m20250101_000001_tag_schema;

pub use m20250101_000001_tag_schema::{
    JoinColumn, JoinTableDef, SingleColumnDef, TagColumn, TagSchema, TagTableDef,
};
pub use sea_orm_migration::prelude::{DbErr, SchemaManager};
