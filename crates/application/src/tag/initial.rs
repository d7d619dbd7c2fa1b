use std::collections::BTreeSet;

use domain::FieldBinding;
use domain::tag::TagRepository;
use infrastructure::SeaOrmTagRepository;
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{info, warn};

use crate::registry::TagRegistry;

/// Outcome of one seeding run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitialTagReport {
    /// Tag tables seeded
    pub tables: usize,
    /// Initial names processed
    pub tags: usize,
    /// Ids of fields whose seeding failed
    pub failed: Vec<String>,
}

/// Create the configured initial tags of every field in `scope`
///
/// Safe to re-run. A field that fails is logged and skipped so the other
/// fields still get their tags.
pub async fn load_initial_tags(
    registry: &TagRegistry,
    db: &DatabaseConnection,
    scope: Option<&str>,
) -> domain::Result<InitialTagReport> {
    let mut report = InitialTagReport::default();
    let mut seeded_tables = BTreeSet::new();

    for field in registry.fields_in_scope(scope) {
        if field.options.initial().is_empty() || !seeded_tables.insert(field.tag_table.clone()) {
            continue;
        }
        match seed_field(registry, db, field).await {
            Ok(count) => {
                report.tables += 1;
                report.tags += count;
            }
            Err(e) => {
                warn!(field = %field, error = %e, "Failed to load initial tags");
                report.failed.push(field.id());
            }
        }
    }

    info!(
        scope = scope.unwrap_or("all"),
        tables = report.tables,
        tags = report.tags,
        failed = report.failed.len(),
        "Initial tags loaded"
    );
    Ok(report)
}

async fn seed_field(
    registry: &TagRegistry,
    db: &DatabaseConnection,
    field: &FieldBinding,
) -> domain::Result<usize> {
    let table = registry.table_for(field)?;
    let protect = table.options.protect_initial();
    let txn = db
        .begin()
        .await
        .map_err(|e| domain::DomainError::Database(e.to_string()))?;
    let store = SeaOrmTagRepository::new(&txn, table);

    for name in table.options.initial() {
        let tag = store.get_or_create(name, protect).await?;
        // Existing rows are protected too, not only the ones created here
        if protect && !tag.protected {
            if let Some(id) = tag.id {
                store.set_protected(id, true).await?;
            }
        }
    }

    txn.commit()
        .await
        .map_err(|e| domain::DomainError::Database(e.to_string()))?;
    Ok(table.options.initial().len())
}
