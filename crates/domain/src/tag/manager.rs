//! In-memory state of the per-entity field managers

use crate::error::{DomainError, Result};
use crate::tag::entity::Tag;
use crate::tag::options::TagOptions;
use crate::tag::parser::{parse_tags, render_tags};

/// State of a single-tag field on one entity instance
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SingleTagState {
    /// Nothing assigned or loaded
    #[default]
    Clean,
    /// Assigned but not yet saved; `None` clears the field
    Dirty(Option<String>),
    /// Matches the database
    Persisted(Option<Tag>),
}

/// Normalized, de-duplicated tag names ready for assignment
///
/// Names keep the case of their first occurrence; later names that compare
/// equal under the field's case policy are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    names: Vec<String>,
}

impl TagSet {
    pub fn parse(input: &str, options: &TagOptions) -> Result<Self> {
        Self::from_names(parse_tags(input, options)?, options)
    }

    /// Normalize names and enforce `max_count` once duplicates are gone
    pub fn from_names<I, S>(names: I, options: &TagOptions) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for raw in names {
            if let Some(name) = options.normalize_name(raw.as_ref())? {
                if !set.contains(&name, options) {
                    set.names.push(name);
                }
            }
        }

        let max = options.max_count();
        if max > 0 && set.names.len() > max {
            return Err(DomainError::TooManyTags {
                max,
                count: set.names.len(),
            });
        }
        Ok(set)
    }

    /// Names of existing tags, taken as they are
    pub fn from_tags(tags: &[Tag]) -> Self {
        Self {
            names: tags.iter().map(|t| t.name.clone()).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str, options: &TagOptions) -> bool {
        self.names.iter().any(|n| options.names_match(n, name))
    }

    pub fn with_added<I, S>(&self, names: I, options: &TagOptions) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let combined: Vec<String> = self
            .names
            .iter()
            .cloned()
            .chain(names.into_iter().map(|n| n.as_ref().to_string()))
            .collect();
        Self::from_names(combined, options)
    }

    pub fn without<I, S>(&self, names: I, options: &TagOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed: Vec<String> = names
            .into_iter()
            .map(|n| {
                let n = n.as_ref().trim();
                if options.force_lowercase() {
                    n.to_lowercase()
                } else {
                    n.to_string()
                }
            })
            .collect();
        Self {
            names: self
                .names
                .iter()
                .filter(|n| !removed.iter().any(|r| options.names_match(n, r)))
                .cloned()
                .collect(),
        }
    }

    /// Set equality under the field's case policy
    pub fn matches(&self, other: &TagSet, options: &TagOptions) -> bool {
        self.len() == other.len() && self.names.iter().all(|n| other.contains(n, options))
    }

    pub fn render(&self, options: &TagOptions) -> String {
        render_tags(&self.names, options)
    }

    /// Work out how to turn the `actual` linked tags into this set
    pub fn diff(&self, actual: &[Tag], options: &TagOptions) -> TagDiff {
        let mut diff = TagDiff::default();
        for tag in actual {
            if self.contains(&tag.name, options) {
                diff.keep.push(tag.clone());
            } else {
                diff.remove.push(tag.clone());
            }
        }
        for name in &self.names {
            if !actual.iter().any(|t| options.names_match(&t.name, name)) {
                diff.add.push(name.clone());
            }
        }
        diff
    }
}

/// Changes needed to reconcile linked tags with a desired set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    pub add: Vec<String>,
    pub remove: Vec<Tag>,
    pub keep: Vec<Tag>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}
