pub mod link_repository;
pub mod query_rewriter;
mod rows;
pub mod schema;
pub mod tag_repository;

pub use link_repository::SeaOrmLinkRepository;
pub use query_rewriter::{ResolvedTags, TagQuery};
pub use schema::{install_schema, tag_schema};
pub use tag_repository::SeaOrmTagRepository;

use domain::DomainError;
use sea_orm::DbErr;

pub(crate) fn db_err(e: DbErr) -> DomainError {
    DomainError::Database(e.to_string())
}
