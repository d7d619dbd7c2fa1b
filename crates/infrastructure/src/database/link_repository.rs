use async_trait::async_trait;
use domain::DomainError;
use domain::binding::JOIN_ENTITY_COLUMN;
use domain::tag::{EntityPk, Tag, TagLinkRepository, TagPk};
use domain::{FieldBinding, FieldKind};
use migration::{JoinColumn, TagColumn};
use sea_orm::sea_query::{Alias, Expr, OnConflict, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use tracing::debug;

use crate::database::db_err;
use crate::database::rows::{select_tag_columns, tag_from_row};

/// Links between host entities and tags for one bound field
///
/// Single-tag fields store the tag id in a nullable column on the host
/// table; multi-tag fields use a join table.
pub struct SeaOrmLinkRepository<'c, C> {
    conn: &'c C,
    binding: &'c FieldBinding,
}

impl<'c, C> SeaOrmLinkRepository<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(conn: &'c C, binding: &'c FieldBinding) -> Self {
        Self { conn, binding }
    }

    fn backend(&self) -> DbBackend {
        self.conn.get_database_backend()
    }

    fn host(&self) -> Alias {
        Alias::new(&self.binding.host_table)
    }

    fn host_pk(&self) -> Alias {
        Alias::new(&self.binding.host_pk)
    }

    fn fk(&self) -> Alias {
        Alias::new(self.binding.fk_column())
    }

    fn join(&self) -> Alias {
        Alias::new(self.binding.join_table())
    }

    /// Ids of the tags an entity refers to
    fn linked_ids(&self, entity: EntityPk) -> SelectStatement {
        match self.binding.kind {
            FieldKind::Single => Query::select()
                .column(self.fk())
                .from(self.host())
                .and_where(Expr::col(self.host_pk()).eq(entity))
                .to_owned(),
            FieldKind::Multi => Query::select()
                .column(JoinColumn::TagId)
                .from(self.join())
                .and_where(Expr::col(JoinColumn::EntityId).eq(entity))
                .to_owned(),
        }
    }

    async fn execute(&self, statement: Statement) -> domain::Result<()> {
        self.conn.execute(statement).await.map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl<'c, C> TagLinkRepository for SeaOrmLinkRepository<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn linked_tags(&self, entity: EntityPk) -> domain::Result<Vec<Tag>> {
        let tag_table = Alias::new(&self.binding.tag_table);
        let tree = self.binding.options.is_tree();
        let mut select = Query::select();
        select.from(tag_table.clone());
        select_tag_columns(&mut select, &tag_table, tree);
        let linked = self.linked_ids(entity);
        select
            .and_where(Expr::col((tag_table.clone(), TagColumn::Id)).in_subquery(linked))
            .order_by((tag_table, TagColumn::Name), Order::Asc);

        let rows = self
            .conn
            .query_all(self.backend().build(&select))
            .await
            .map_err(db_err)?;
        rows.iter().map(|r| tag_from_row(r, tree)).collect()
    }

    async fn link(&self, entity: EntityPk, tag: TagPk) -> domain::Result<()> {
        let statement = match self.binding.kind {
            FieldKind::Single => self.backend().build(
                Query::update()
                    .table(self.host())
                    .value(self.fk(), tag)
                    .and_where(Expr::col(self.host_pk()).eq(entity)),
            ),
            FieldKind::Multi => {
                let mut insert = Query::insert();
                insert
                    .into_table(self.join())
                    .columns([JoinColumn::EntityId, JoinColumn::TagId])
                    .values([entity.into(), tag.into()])
                    .map_err(|e| DomainError::Database(e.to_string()))?;
                insert.on_conflict(
                    OnConflict::columns([JoinColumn::EntityId, JoinColumn::TagId])
                        .do_nothing()
                        .to_owned(),
                );
                self.backend().build(&insert)
            }
        };
        self.execute(statement).await?;
        debug!(field = %self.binding, entity, tag, "Linked tag");
        Ok(())
    }

    async fn unlink(&self, entity: EntityPk, tag: TagPk) -> domain::Result<()> {
        let statement = match self.binding.kind {
            FieldKind::Single => self.backend().build(
                Query::update()
                    .table(self.host())
                    .value(self.fk(), Option::<TagPk>::None)
                    .and_where(Expr::col(self.host_pk()).eq(entity))
                    .and_where(Expr::col(self.fk()).eq(tag)),
            ),
            FieldKind::Multi => self.backend().build(
                Query::delete()
                    .from_table(self.join())
                    .and_where(Expr::col(JoinColumn::EntityId).eq(entity))
                    .and_where(Expr::col(JoinColumn::TagId).eq(tag)),
            ),
        };
        self.execute(statement).await?;
        debug!(field = %self.binding, entity, tag, "Unlinked tag");
        Ok(())
    }

    async fn entities_for(&self, tag: TagPk) -> domain::Result<Vec<EntityPk>> {
        let (select, column) = match self.binding.kind {
            FieldKind::Single => (
                Query::select()
                    .column(self.host_pk())
                    .from(self.host())
                    .and_where(Expr::col(self.fk()).eq(tag))
                    .order_by(self.host_pk(), Order::Asc)
                    .to_owned(),
                self.binding.host_pk.clone(),
            ),
            FieldKind::Multi => (
                Query::select()
                    .column(JoinColumn::EntityId)
                    .from(self.join())
                    .and_where(Expr::col(JoinColumn::TagId).eq(tag))
                    .order_by(JoinColumn::EntityId, Order::Asc)
                    .to_owned(),
                JOIN_ENTITY_COLUMN.to_string(),
            ),
        };

        let rows = self
            .conn
            .query_all(self.backend().build(&select))
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|r| r.try_get::<EntityPk>("", &column).map_err(db_err))
            .collect()
    }

    async fn reference_count(&self, tag: TagPk) -> domain::Result<i64> {
        Ok(self.entities_for(tag).await?.len() as i64)
    }
}
