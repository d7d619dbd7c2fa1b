mod entity;
mod manager;
mod options;
pub mod parser;
mod repository;
pub mod slug;
pub mod tree;

pub use entity::{
    AutocompletePage, EntityPk, Tag, TagPk, TreeFields, WEIGHT_MAX, WEIGHT_MIN, WeightedTag, weight,
};
pub use manager::{SingleTagState, TagDiff, TagSet};
pub use options::{
    DEFAULT_AUTOCOMPLETE_LIMIT, DEFAULT_MAX_LENGTH, InitialTags, TagOptions, TagOptionsOverride,
};
pub use parser::{parse_tags, render_tags};
pub use repository::{TagLinkRepository, TagRepository, TagTreeRepository};
#[cfg(any(test, feature = "mock"))]
pub use repository::{MockTagLinkRepository, MockTagRepository, MockTagTreeRepository};
pub use tree::{NestedTag, TreePosition, as_nested_list};
