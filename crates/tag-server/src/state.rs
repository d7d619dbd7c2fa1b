use application::TagRegistry;
use domain::{FieldBinding, TagTable};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub struct AppState {
    pub registry: Arc<TagRegistry>,
    pub db: DatabaseConnection,
}

impl AppState {
    pub fn new(registry: Arc<TagRegistry>, db: DatabaseConnection) -> Self {
        Self { registry, db }
    }

    /// Resolve a routed field to its binding and tag table
    pub fn tag_table(
        &self,
        app: &str,
        model: &str,
        field: &str,
    ) -> Option<(&FieldBinding, &TagTable)> {
        let binding = self.registry.field(&format!("{}.{}.{}", app, model, field))?;
        let table = self.registry.table_for(binding).ok()?;
        Some((binding.as_ref(), table))
    }
}
