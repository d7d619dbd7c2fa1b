use std::collections::BTreeMap;
use std::sync::Arc;

use domain::{FieldBinding, FieldKind};
use migration::{JoinTableDef, SchemaManager, SingleColumnDef, TagSchema, TagTableDef};
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::database::db_err;

/// Describe the storage needed by a set of bound fields
///
/// Fields sharing a tag table produce one table definition.
pub fn tag_schema(fields: &[Arc<FieldBinding>]) -> TagSchema {
    let mut tag_tables: BTreeMap<String, TagTableDef> = BTreeMap::new();
    let mut schema = TagSchema::default();

    for field in fields {
        tag_tables
            .entry(field.tag_table.clone())
            .or_insert_with(|| TagTableDef {
                name: field.tag_table.clone(),
                tree: field.options.is_tree(),
            });
        match field.kind {
            FieldKind::Single => schema.single_columns.push(SingleColumnDef {
                host_table: field.host_table.clone(),
                column: field.fk_column(),
            }),
            FieldKind::Multi => schema.join_tables.push(JoinTableDef {
                name: field.join_table(),
                host_table: field.host_table.clone(),
                host_pk: field.host_pk.clone(),
                tag_table: field.tag_table.clone(),
            }),
        }
    }

    schema.tag_tables = tag_tables.into_values().collect();
    schema
}

/// Create any missing tag tables, join tables and foreign key columns
pub async fn install_schema(db: &DatabaseConnection, schema: &TagSchema) -> domain::Result<()> {
    let manager = SchemaManager::new(db);
    schema.up(&manager).await.map_err(db_err)?;
    info!(
        tag_tables = schema.tag_tables.len(),
        join_tables = schema.join_tables.len(),
        single_columns = schema.single_columns.len(),
        "Tag schema installed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::TagOptions;

    #[test]
    fn test_shared_tag_table_is_described_once() {
        let tags = FieldBinding::new(
            "blog",
            "post",
            "posts",
            "tags",
            FieldKind::Multi,
            TagOptions::new(),
        )
        .with_tag_table("tag_shared");
        let primary = FieldBinding::new(
            "blog",
            "post",
            "posts",
            "primary",
            FieldKind::Single,
            TagOptions::new(),
        )
        .with_tag_table("tag_shared");

        let schema = tag_schema(&[Arc::new(tags), Arc::new(primary)]);

        assert_eq!(schema.tag_tables.len(), 1);
        assert_eq!(schema.tag_tables[0].name, "tag_shared");
        assert_eq!(schema.join_tables[0].name, "posts_tags");
        assert_eq!(schema.single_columns[0].column, "primary_id");
    }
}
