//! Fold source tags into a target tag
//!
//! Every reference to a source, through any field bound to the table, is
//! moved to the target with the usual increment and decrement, so sources
//! end at count 0 and are removed unless protected. Merging again is a
//! no-op because nothing refers to the sources any more.

use domain::tag::tree::rebase_name;
use domain::tag::{Tag, TagLinkRepository, TagPk, TagRepository, TagTreeRepository};
use domain::{DomainError, FieldBinding, FieldKind};
use infrastructure::{SeaOrmLinkRepository, SeaOrmTagRepository};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use tracing::{debug, info};

use crate::registry::TagRegistry;

fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::Database(e.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Target as it stands after the merge, if it survived
    pub target: Option<Tag>,
    /// Source tags that existed and were merged
    pub merged: usize,
    /// Entity references moved to the target
    pub references: usize,
    /// Tree children moved under the target rather than merged
    pub moved: usize,
}

pub struct MergeEngine<'a> {
    registry: &'a TagRegistry,
    db: &'a DatabaseConnection,
}

impl<'a> MergeEngine<'a> {
    pub fn new(registry: &'a TagRegistry, db: &'a DatabaseConnection) -> Self {
        Self { registry, db }
    }

    /// Merge `sources` into `target` in the tag table `table`
    pub async fn merge(
        &self,
        table: &str,
        target: &str,
        sources: &[String],
    ) -> domain::Result<MergeReport> {
        self.merge_tree(table, target, sources, false).await
    }

    /// Like [`merge`](Self::merge); with `children` set, the children of each
    /// source are merged into or moved under the target too
    pub async fn merge_tree(
        &self,
        table: &str,
        target: &str,
        sources: &[String],
        children: bool,
    ) -> domain::Result<MergeReport> {
        let tag_table = self
            .registry
            .table(table)
            .ok_or_else(|| {
                DomainError::InvalidConfiguration(format!("unknown tag table {}", table))
            })?;
        if children && !tag_table.is_tree() {
            return Err(DomainError::InvalidConfiguration(format!(
                "{} is not a tree tag table",
                table
            )));
        }
        let fields = self.registry.fields_for_table(table);

        let txn = self.db.begin().await.map_err(db_err)?;
        let store = SeaOrmTagRepository::new(&txn, tag_table);
        let target_tag = store.get_or_create(target, false).await?;
        let target_id = target_tag.id.unwrap_or_default();

        let mut report = MergeReport {
            target: None,
            merged: 0,
            references: 0,
            moved: 0,
        };
        let mut pending: Vec<(Tag, Tag)> = Vec::new();
        for name in sources {
            match store.find(name).await? {
                Some(source) if source.id != target_tag.id => {
                    pending.push((target_tag.clone(), source));
                }
                _ => debug!(table, source = %name, "Nothing to merge"),
            }
        }

        let mut processed: Vec<TagPk> = Vec::new();
        while let Some((into, source)) = pending.pop() {
            if children {
                for child in store.children(&source).await? {
                    let new_name = rebase_name(&child.name, &source.name, &into.name);
                    match store.find(&new_name).await? {
                        Some(existing) => pending.push((existing, child)),
                        None => {
                            if let Some(id) = child.id {
                                store.rename(id, &new_name).await?;
                                report.moved += 1;
                            }
                        }
                    }
                }
            }

            let (Some(from), Some(to)) = (source.id, into.id) else {
                continue;
            };
            for field in &fields {
                let links = SeaOrmLinkRepository::new(&txn, field.as_ref());
                report.references += move_references(&store, &links, field, from, to).await?;
            }
            processed.push(from);
            report.merged += 1;
        }

        // Deepest first, so emptied parents can go once their children have
        for id in processed.into_iter().rev() {
            store.recount(id).await?;
        }
        report.target = store.find_by_id(target_id).await?;
        if report.target.as_ref().is_some_and(|t| t.count == 0) {
            store.try_delete(target_id).await?;
            report.target = store.find_by_id(target_id).await?;
        }

        txn.commit().await.map_err(db_err)?;
        info!(
            table,
            target,
            merged = report.merged,
            references = report.references,
            moved = report.moved,
            "Merged tags"
        );
        Ok(report)
    }
}

/// Point every reference to `from` through one field at `to`
async fn move_references<C>(
    store: &SeaOrmTagRepository<'_, C>,
    links: &SeaOrmLinkRepository<'_, C>,
    field: &FieldBinding,
    from: TagPk,
    to: TagPk,
) -> domain::Result<usize>
where
    C: ConnectionTrait + Send + Sync,
{
    let entities = links.entities_for(from).await?;
    for &entity in &entities {
        match field.kind {
            FieldKind::Single => {
                links.link(entity, to).await?;
                store.increment(to).await?;
            }
            FieldKind::Multi => {
                links.unlink(entity, from).await?;
                let linked = links.linked_tags(entity).await?;
                if !linked.iter().any(|t| t.id == Some(to)) {
                    links.link(entity, to).await?;
                    store.increment(to).await?;
                }
            }
        }
        store.decrement(from).await?;
    }
    Ok(entities.len())
}
