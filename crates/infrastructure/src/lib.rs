//! Infrastructure layer - storage and configuration

pub mod config;
pub mod database;

pub use config::{FieldConfig, ModelConfig, ServerConfig, TagFieldConfig};
pub use database::{
    ResolvedTags, SeaOrmLinkRepository, SeaOrmTagRepository, TagQuery, install_schema,
    tag_schema,
};
