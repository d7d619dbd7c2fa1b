use async_trait::async_trait;

use crate::error::Result;
use crate::tag::entity::{AutocompletePage, EntityPk, Tag, TagPk, WeightedTag};

/// Storage of one auxiliary tag table
///
/// Every count change applies the deletion rule: a row left at count 0
/// that is not protected (and has no tree children) is removed.
/// Implementations are expected to run on the caller's transaction so that
/// count changes commit or roll back together with the host entity write.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Find a tag by name under the table's case policy; lowest id wins
    async fn find(&self, name: &str) -> Result<Option<Tag>>;

    async fn find_by_id(&self, id: TagPk) -> Result<Option<Tag>>;

    /// Find or create a tag; new rows start at count 0
    async fn get_or_create(&self, name: &str, protected: bool) -> Result<Tag>;

    async fn increment(&self, id: TagPk) -> Result<Tag>;

    /// Returns `None` if the row was deleted
    async fn decrement(&self, id: TagPk) -> Result<Option<Tag>>;

    /// Returns `None` if the row was deleted
    async fn set_count(&self, id: TagPk, count: i64) -> Result<Option<Tag>>;

    /// Recompute the count from referring rows
    async fn recount(&self, id: TagPk) -> Result<Option<Tag>>;

    /// Delete the row if the deletion rule allows; returns whether it did
    async fn try_delete(&self, id: TagPk) -> Result<bool>;

    /// Unprotecting a zero-count tag applies the deletion rule
    async fn set_protected(&self, id: TagPk, protected: bool) -> Result<Option<Tag>>;

    async fn rename(&self, id: TagPk, new_name: &str) -> Result<Tag>;

    /// All rows ordered by name
    async fn all(&self) -> Result<Vec<Tag>>;

    /// Rows named in the table's initial tags
    async fn initial(&self) -> Result<Vec<Tag>>;

    async fn weighted(&self, min: i64, max: i64) -> Result<Vec<WeightedTag>>;

    /// One page of names matching `query`; pages start at 1
    async fn autocomplete(&self, query: &str, page: u64) -> Result<AutocompletePage>;
}

/// Structural queries on a tree tag table
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait TagTreeRepository: Send + Sync {
    async fn parent(&self, tag: &Tag) -> Result<Option<Tag>>;

    /// Ancestors, root first
    async fn ancestors(&self, tag: &Tag) -> Result<Vec<Tag>>;

    async fn children(&self, tag: &Tag) -> Result<Vec<Tag>>;

    /// Tags sharing the parent of `tag`, including `tag` itself
    async fn siblings(&self, tag: &Tag) -> Result<Vec<Tag>>;

    async fn descendants(&self, tag: &Tag) -> Result<Vec<Tag>>;

    /// Sum of the counts of all descendants
    async fn descendant_count(&self, tag: &Tag) -> Result<i64>;

    /// Own count plus `descendant_count`
    async fn family_count(&self, tag: &Tag) -> Result<i64>;

    /// Recompute parent, label, level and path of every row from its name
    async fn rebuild(&self) -> Result<usize>;
}

/// References from host entities to tags through one bound field
///
/// A single-tag field holds at most one link per entity; `link` replaces it.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait TagLinkRepository: Send + Sync {
    async fn linked_tags(&self, entity: EntityPk) -> Result<Vec<Tag>>;

    async fn link(&self, entity: EntityPk, tag: TagPk) -> Result<()>;

    async fn unlink(&self, entity: EntityPk, tag: TagPk) -> Result<()>;

    async fn entities_for(&self, tag: TagPk) -> Result<Vec<EntityPk>>;

    async fn reference_count(&self, tag: TagPk) -> Result<i64>;
}
