use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tag::options::TagOptions;
use crate::tag::parser::split_tree_name;
use crate::tag::slug::slugify;

/// Primary key of a row in an auxiliary tag table
pub type TagPk = i64;

/// Primary key of a host entity row
pub type EntityPk = i64;

pub const WEIGHT_MIN: i64 = 1;
pub const WEIGHT_MAX: i64 = 6;

/// Columns that only exist on tree tag tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeFields {
    pub parent_id: Option<TagPk>,
    /// Last segment of the name
    pub label: String,
    /// 1-based depth, roots are level 1
    pub level: i32,
    /// Slugs from the root down to this tag, joined with `/`
    pub path: String,
}

/// A row of an auxiliary tag table
///
/// A tag without an `id` is transient: it stands for a name that has been
/// assigned to an unsaved field but has no row yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<TagPk>,
    pub name: String,
    pub slug: String,
    pub count: i64,
    pub protected: bool,
    pub tree: Option<TreeFields>,
}

impl Tag {
    /// Unsaved stand-in for `name`
    pub fn transient(name: impl Into<String>, options: &TagOptions) -> Self {
        let name = name.into();
        if !options.is_tree() {
            return Self {
                id: None,
                slug: slugify(&name),
                name,
                count: 0,
                protected: false,
                tree: None,
            };
        }

        let parts = split_tree_name(&name);
        let label = parts.last().cloned().unwrap_or_default();
        let path = parts
            .iter()
            .map(|p| slugify(p))
            .collect::<Vec<_>>()
            .join("/");
        Self {
            id: None,
            slug: slugify(&label),
            count: 0,
            protected: false,
            tree: Some(TreeFields {
                parent_id: None,
                level: parts.len() as i32,
                label,
                path,
            }),
            name,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Label of a tree tag, or the whole name for flat tags
    pub fn label(&self) -> &str {
        match &self.tree {
            Some(tree) => &tree.label,
            None => &self.name,
        }
    }

    pub fn parent_id(&self) -> Option<TagPk> {
        self.tree.as_ref().and_then(|t| t.parent_id)
    }

    pub fn path(&self) -> Option<&str> {
        self.tree.as_ref().map(|t| t.path.as_str())
    }

    pub fn level(&self) -> i32 {
        self.tree.as_ref().map(|t| t.level).unwrap_or(1)
    }

    /// Whether the zero-count deletion rule applies to this row
    ///
    /// Tree children are checked by the store, which can see them.
    pub fn is_deletable(&self, options: &TagOptions) -> bool {
        self.count <= 0 && !self.protected && !options.protect_all()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A tag with its tag cloud weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTag {
    pub tag: Tag,
    pub weight: i64,
}

/// Scale `count` into `min..=max` relative to the busiest tag
pub fn weight(count: i64, max_count: i64, min: i64, max: i64) -> i64 {
    let max_count = if max_count <= 0 { 1 } else { max_count };
    (count * (max - min)) / max_count + min
}

/// One page of autocomplete suggestions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompletePage {
    pub results: Vec<String>,
    pub more: bool,
}
