//! Static association between host entity fields and auxiliary tag tables
//!
//! Bindings are built once at startup and shared behind `Arc`; everything
//! else refers to a field by its binding.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::tag::TagOptions;

pub const DEFAULT_PRIMARY_KEY: &str = "id";
pub const JOIN_ENTITY_COLUMN: &str = "entity_id";
pub const JOIN_TAG_COLUMN: &str = "tag_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Foreign key column on the host table, at most one tag
    Single,
    /// Join table between host and tag table
    Multi,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Single => write!(f, "single"),
            FieldKind::Multi => write!(f, "multi"),
        }
    }
}

/// One tag field on a host entity
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub app: String,
    pub model: String,
    pub host_table: String,
    pub host_pk: String,
    pub field: String,
    pub kind: FieldKind,
    pub tag_table: String,
    pub options: TagOptions,
}

impl FieldBinding {
    pub fn new(
        app: impl Into<String>,
        model: impl Into<String>,
        host_table: impl Into<String>,
        field: impl Into<String>,
        kind: FieldKind,
        options: TagOptions,
    ) -> Self {
        let host_table = host_table.into();
        let field = field.into();
        let tag_table = default_tag_table(&host_table, &field);
        Self {
            app: app.into(),
            model: model.into(),
            host_table,
            host_pk: DEFAULT_PRIMARY_KEY.to_string(),
            field,
            kind,
            tag_table,
            options,
        }
    }

    pub fn with_tag_table(mut self, tag_table: impl Into<String>) -> Self {
        self.tag_table = tag_table.into();
        self
    }

    pub fn with_host_pk(mut self, host_pk: impl Into<String>) -> Self {
        self.host_pk = host_pk.into();
        self
    }

    /// `app.model.field`
    pub fn id(&self) -> String {
        format!("{}.{}.{}", self.app, self.model, self.field)
    }

    pub fn join_table(&self) -> String {
        format!("{}_{}", self.host_table, self.field)
    }

    pub fn fk_column(&self) -> String {
        format!("{}_id", self.field)
    }

    pub fn reference(&self) -> TagReference {
        match self.kind {
            FieldKind::Single => TagReference::Column {
                table: self.host_table.clone(),
                column: self.fk_column(),
            },
            FieldKind::Multi => TagReference::JoinTable {
                table: self.join_table(),
            },
        }
    }

    /// Whether this binding falls under an `app[.model[.field]]` scope
    pub fn in_scope(&self, scope: Option<&str>) -> bool {
        let Some(scope) = scope else {
            return true;
        };
        let mut parts = scope.split('.');
        let app = parts.next();
        let model = parts.next();
        let field = parts.next();
        app.is_none_or(|a| a == self.app)
            && model.is_none_or(|m| m == self.model)
            && field.is_none_or(|f| f == self.field)
    }
}

impl fmt::Display for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

pub fn default_tag_table(host_table: &str, field: &str) -> String {
    format!("tag_{}_{}", host_table, field)
}

/// Where rows referring to a tag live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagReference {
    /// Nullable foreign key column on the host table
    Column { table: String, column: String },
    /// Join table with `entity_id` and `tag_id`
    JoinTable { table: String },
}

/// An auxiliary table together with every field that refers to it
#[derive(Debug, Clone, PartialEq)]
pub struct TagTable {
    pub name: String,
    pub options: TagOptions,
    pub references: Vec<TagReference>,
}

impl TagTable {
    pub fn is_tree(&self) -> bool {
        self.options.is_tree()
    }

    /// Build the table from the fields bound to it
    ///
    /// Fields sharing a table must agree on their options.
    pub fn from_fields(name: &str, fields: &[&FieldBinding]) -> Result<Self> {
        let first = fields.first().ok_or_else(|| {
            DomainError::InvalidConfiguration(format!("tag table {} has no fields", name))
        })?;
        if let Some(other) = fields.iter().find(|f| f.options != first.options) {
            return Err(DomainError::InvalidConfiguration(format!(
                "fields {} and {} share tag table {} with different options",
                first, other, name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            options: first.options.clone(),
            references: fields.iter().map(|f| f.reference()).collect(),
        })
    }
}

/// A host entity and its tag fields
#[derive(Debug, Clone)]
pub struct ModelBinding {
    pub app: String,
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub fields: Vec<Arc<FieldBinding>>,
}

impl ModelBinding {
    pub fn field(&self, name: &str) -> Option<&Arc<FieldBinding>> {
        self.fields.iter().find(|f| f.field == name)
    }

    /// `app.model`
    pub fn id(&self) -> String {
        format!("{}.{}", self.app, self.name)
    }
}
