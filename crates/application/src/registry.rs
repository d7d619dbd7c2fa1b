//! Field bindings for every tagged model, resolved once at startup

use std::collections::BTreeMap;
use std::sync::Arc;

use domain::{DomainError, FieldBinding, ModelBinding, TagOptions, TagTable};
use infrastructure::{ModelConfig, tag_schema};
use migration::TagSchema;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    models: Vec<Arc<ModelBinding>>,
    tables: BTreeMap<String, TagTable>,
}

impl TagRegistry {
    /// Index models and group their fields by tag table
    ///
    /// Fails if a field id is bound twice or if fields sharing a tag table
    /// disagree on their options.
    pub fn new(models: Vec<ModelBinding>) -> domain::Result<Self> {
        let models: Vec<Arc<ModelBinding>> = models.into_iter().map(Arc::new).collect();

        let mut seen = Vec::new();
        let mut by_table: BTreeMap<String, Vec<&FieldBinding>> = BTreeMap::new();
        for field in models.iter().flat_map(|m| m.fields.iter()) {
            let id = field.id();
            if seen.contains(&id) {
                return Err(DomainError::InvalidConfiguration(format!(
                    "field {} is bound twice",
                    id
                )));
            }
            seen.push(id);
            by_table
                .entry(field.tag_table.clone())
                .or_default()
                .push(field.as_ref());
        }

        let mut tables = BTreeMap::new();
        for (name, fields) in by_table {
            let table = TagTable::from_fields(&name, &fields)?;
            debug!(
                table = %name,
                fields = fields.len(),
                tree = table.is_tree(),
                "Registered tag table"
            );
            tables.insert(name, table);
        }

        Ok(Self { models, tables })
    }

    pub fn from_config(models: &[ModelConfig]) -> domain::Result<Self> {
        let mut bindings = Vec::with_capacity(models.len());
        for model in models {
            let mut fields = Vec::with_capacity(model.fields.len());
            for field in &model.fields {
                let options = TagOptions::default().merge(&field.options)?;
                let mut binding = FieldBinding::new(
                    &model.app,
                    &model.name,
                    &model.table,
                    &field.name,
                    field.kind,
                    options,
                )
                .with_host_pk(&model.primary_key);
                if let Some(tag_table) = &field.tag_table {
                    binding = binding.with_tag_table(tag_table);
                }
                fields.push(Arc::new(binding));
            }
            bindings.push(ModelBinding {
                app: model.app.clone(),
                name: model.name.clone(),
                table: model.table.clone(),
                primary_key: model.primary_key.clone(),
                fields,
            });
        }
        Self::new(bindings)
    }

    pub fn models(&self) -> &[Arc<ModelBinding>] {
        &self.models
    }

    pub fn model(&self, app: &str, name: &str) -> Option<&Arc<ModelBinding>> {
        self.models.iter().find(|m| m.app == app && m.name == name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldBinding>> {
        self.models.iter().flat_map(|m| m.fields.iter())
    }

    /// Look up a field by `app.model.field`
    pub fn field(&self, id: &str) -> Option<&Arc<FieldBinding>> {
        self.fields().find(|f| f.id() == id)
    }

    pub fn require_field(&self, id: &str) -> domain::Result<&Arc<FieldBinding>> {
        self.field(id)
            .ok_or_else(|| DomainError::UnknownField(id.to_string()))
    }

    pub fn table(&self, name: &str) -> Option<&TagTable> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TagTable> {
        self.tables.values()
    }

    /// Tag table a field stores its tags in
    pub fn table_for(&self, field: &FieldBinding) -> domain::Result<&TagTable> {
        self.table(&field.tag_table).ok_or_else(|| {
            DomainError::InvalidConfiguration(format!(
                "no tag table {} for field {}",
                field.tag_table, field
            ))
        })
    }

    pub fn fields_for_table(&self, table: &str) -> Vec<&Arc<FieldBinding>> {
        self.fields().filter(|f| f.tag_table == table).collect()
    }

    /// Fields selected by an `app[.model[.field]]` scope; `None` selects all
    pub fn fields_in_scope(&self, scope: Option<&str>) -> Vec<&Arc<FieldBinding>> {
        self.fields().filter(|f| f.in_scope(scope)).collect()
    }

    pub fn schema(&self) -> TagSchema {
        let fields: Vec<Arc<FieldBinding>> = self.fields().cloned().collect();
        tag_schema(&fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::FieldKind;
    use infrastructure::TagFieldConfig;

    fn registry() -> TagRegistry {
        let config = TagFieldConfig::from_toml_str(
            r#"
            [[models]]
            app = "blog"
            name = "post"
            table = "posts"

            [[models.fields]]
            name = "tags"
            kind = "multi"
            tag_table = "tag_shared"

            [[models.fields]]
            name = "title"
            kind = "single"
            options = { initial = "Mr, Mrs", case_sensitive = true }

            [[models]]
            app = "shop"
            name = "item"
            table = "items"
            primary_key = "item_id"

            [[models.fields]]
            name = "labels"
            kind = "multi"
            tag_table = "tag_shared"
            "#,
        )
        .unwrap();
        TagRegistry::from_config(&config.models).unwrap()
    }

    #[test]
    fn test_fields_resolve_by_id_and_scope() {
        let registry = registry();

        let title = registry.field("blog.post.title").unwrap();
        assert_eq!(title.kind, FieldKind::Single);
        assert_eq!(title.tag_table, "tag_posts_title");
        assert_eq!(title.options.initial(), ["Mr", "Mrs"]);
        assert_eq!(registry.field("shop.item.labels").unwrap().host_pk, "item_id");

        assert_eq!(registry.fields_in_scope(None).len(), 3);
        assert_eq!(registry.fields_in_scope(Some("blog")).len(), 2);
        assert_eq!(registry.fields_in_scope(Some("blog.post.tags")).len(), 1);
        assert!(registry.fields_in_scope(Some("news")).is_empty());
        assert!(matches!(
            registry.require_field("blog.post.missing"),
            Err(DomainError::UnknownField(_))
        ));
    }

    #[test]
    fn test_shared_tables_collect_references() {
        let registry = registry();
        let shared = registry.table("tag_shared").unwrap();
        assert_eq!(shared.references.len(), 2);
        assert_eq!(registry.fields_for_table("tag_shared").len(), 2);
        assert_eq!(registry.schema().tag_tables.len(), 2);
    }

    #[test]
    fn test_conflicting_shared_options_are_rejected() {
        let a = FieldBinding::new("a", "m", "t", "x", FieldKind::Multi, TagOptions::new())
            .with_tag_table("shared");
        let b = FieldBinding::new("a", "m", "t", "y", FieldKind::Multi, TagOptions::tree())
            .with_tag_table("shared");
        let model = ModelBinding {
            app: "a".into(),
            name: "m".into(),
            table: "t".into(),
            primary_key: "id".into(),
            fields: vec![Arc::new(a), Arc::new(b)],
        };
        assert!(matches!(
            TagRegistry::new(vec![model]),
            Err(DomainError::InvalidConfiguration(_))
        ));
    }
}
