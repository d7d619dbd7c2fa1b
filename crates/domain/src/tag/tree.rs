//! Path rules for hierarchical tag tables

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::tag::entity::{Tag, TagPk};
use crate::tag::options::TagOptions;
use crate::tag::parser::{join_tree_name, split_tree_name};

/// Where a tree name sits, derived from the name alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePosition {
    pub parent_name: Option<String>,
    pub label: String,
    pub level: i32,
}

impl TreePosition {
    pub fn of(name: &str) -> Self {
        let mut parts = split_tree_name(name);
        let label = parts.pop().unwrap_or_default();
        let level = parts.len() as i32 + 1;
        let parent_name = if parts.is_empty() {
            None
        } else {
            Some(join_tree_name(&parts))
        };
        Self {
            parent_name,
            label,
            level,
        }
    }
}

/// Names of every strict ancestor, root first
pub fn ancestor_names(name: &str) -> Vec<String> {
    let parts = split_tree_name(name);
    (1..parts.len())
        .map(|i| join_tree_name(&parts[..i]))
        .collect()
}

/// Paths of every strict ancestor, root first
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').collect();
    (1..parts.len()).map(|i| parts[..i].join("/")).collect()
}

pub fn child_path(parent_path: Option<&str>, slug: &str) -> String {
    match parent_path {
        Some(parent) => format!("{}/{}", parent, slug),
        None => slug.to_string(),
    }
}

/// Whether `name` lies strictly below `ancestor` under the field's case policy
pub fn is_descendant_name(name: &str, ancestor: &str, options: &TagOptions) -> bool {
    let name = split_tree_name(&options.compare_key(name));
    let ancestor = split_tree_name(&options.compare_key(ancestor));
    name.len() > ancestor.len() && name[..ancestor.len()] == ancestor[..]
}

/// Reject a rename that would move a tag beneath itself
pub fn check_rename(old_name: &str, new_name: &str, options: &TagOptions) -> Result<()> {
    if is_descendant_name(new_name, old_name, options) {
        return Err(DomainError::TagTreeCycle(format!(
            "cannot move \"{}\" beneath itself as \"{}\"",
            old_name, new_name
        )));
    }
    Ok(())
}

/// Name of a descendant once its ancestor `old_prefix` becomes `new_prefix`
pub fn rebase_name(name: &str, old_prefix: &str, new_prefix: &str) -> String {
    let parts = split_tree_name(name);
    let depth = split_tree_name(old_prefix).len();
    let mut rebased = split_tree_name(new_prefix);
    rebased.extend(parts.into_iter().skip(depth));
    join_tree_name(&rebased)
}

/// Same as [`rebase_name`], for slug paths
pub fn rebase_path(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    match path.strip_prefix(old_prefix) {
        Some(rest) => format!("{}{}", new_prefix, rest),
        None => path.to_string(),
    }
}

/// A tag with its children, for rendering trees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedTag {
    pub name: String,
    pub label: String,
    pub slug: String,
    pub count: i64,
    pub children: Vec<NestedTag>,
}

/// Arrange tree rows into nested roots, siblings ordered by name
pub fn as_nested_list(tags: &[Tag]) -> Vec<NestedTag> {
    fn build(tags: &[Tag], parent: Option<TagPk>) -> Vec<NestedTag> {
        let mut level: Vec<&Tag> = tags.iter().filter(|t| t.parent_id() == parent).collect();
        level.sort_by(|a, b| a.name.cmp(&b.name));
        level
            .into_iter()
            .map(|tag| NestedTag {
                name: tag.name.clone(),
                label: tag.label().to_string(),
                slug: tag.slug.clone(),
                count: tag.count,
                children: match tag.id {
                    Some(id) => build(tags, Some(id)),
                    None => Vec::new(),
                },
            })
            .collect()
    }
    build(tags, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::entity::TreeFields;

    fn row(id: TagPk, name: &str, parent_id: Option<TagPk>) -> Tag {
        let position = TreePosition::of(name);
        Tag {
            id: Some(id),
            name: name.to_string(),
            slug: position.label.to_lowercase(),
            count: 0,
            protected: false,
            tree: Some(TreeFields {
                parent_id,
                label: position.label,
                level: position.level,
                path: name.to_lowercase(),
            }),
        }
    }

    #[test]
    fn test_position_of_root_and_leaf() {
        let root = TreePosition::of("Animal");
        assert_eq!(root.parent_name, None);
        assert_eq!(root.level, 1);

        let leaf = TreePosition::of("Animal/Mammal/Dog");
        assert_eq!(leaf.parent_name.as_deref(), Some("Animal/Mammal"));
        assert_eq!(leaf.label, "Dog");
        assert_eq!(leaf.level, 3);
    }

    #[test]
    fn test_position_keeps_escaped_slash() {
        let position = TreePosition::of("Media/AC//DC");
        assert_eq!(position.label, "AC/DC");
        assert_eq!(position.parent_name.as_deref(), Some("Media"));
    }

    #[test]
    fn test_ancestor_names() {
        assert_eq!(ancestor_names("a/b/c"), ["a", "a/b"]);
        assert!(ancestor_names("a").is_empty());
        assert_eq!(ancestor_paths("a/b/c"), ["a", "a/b"]);
    }

    #[test]
    fn test_check_rename_rejects_cycle() {
        let options = TagOptions::tree();
        assert!(check_rename("a/b", "a/b/c", &options).is_err());
        assert!(check_rename("a/b", "a/bc", &options).is_ok());
        assert!(check_rename("a/b", "x/a/b", &options).is_ok());
        assert!(check_rename("A/B", "a/b/c", &options).is_err());

        let case_sensitive = TagOptions::tree().with_case_sensitive(true);
        assert!(check_rename("A/B", "a/b/c", &case_sensitive).is_ok());
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase_name("a/b/c/d", "a/b", "x"), "x/c/d");
        assert_eq!(rebase_path("a/b/c", "a/b", "x/y"), "x/y/c");
    }

    #[test]
    fn test_as_nested_list() {
        let tags = vec![
            row(1, "a", None),
            row(2, "a/c", Some(1)),
            row(3, "a/b", Some(1)),
            row(4, "z", None),
        ];
        let nested = as_nested_list(&tags);
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].name, "a");
        let children: Vec<&str> = nested[0].children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(children, ["b", "c"]);
        assert!(nested[1].children.is_empty());
    }
}
