use std::collections::HashMap;

use async_trait::async_trait;
use domain::DomainError;
use domain::tag::parser::clean_tree_name;
use domain::tag::slug::{slugify, unique_slug};
use domain::tag::tree::{TreePosition, ancestor_paths, child_path};
use domain::tag::{Tag, TagPk, TagRepository, TagTreeRepository};
use migration::TagColumn;
use sea_orm::ConnectionTrait;
use sea_orm::sea_query::{Expr, Order, Query};
use tracing::info;

use super::SeaOrmTagRepository;

impl<'c, C> SeaOrmTagRepository<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    fn require_tree(&self) -> domain::Result<()> {
        if self.table.is_tree() {
            Ok(())
        } else {
            Err(DomainError::InvalidConfiguration(format!(
                "{} is not a tree tag table",
                self.table.name
            )))
        }
    }

    fn tree_path(&self, tag: &Tag) -> domain::Result<String> {
        tag.path()
            .map(str::to_string)
            .ok_or_else(|| DomainError::TagNotFound(format!("{} has no tree path", tag.name)))
    }
}

#[async_trait]
impl<'c, C> TagTreeRepository for SeaOrmTagRepository<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn parent(&self, tag: &Tag) -> domain::Result<Option<Tag>> {
        self.require_tree()?;
        match tag.parent_id() {
            Some(parent) => self.find_by_id(parent).await,
            None => Ok(None),
        }
    }

    async fn ancestors(&self, tag: &Tag) -> domain::Result<Vec<Tag>> {
        self.require_tree()?;
        let paths = ancestor_paths(&self.tree_path(tag)?);
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let select = self
            .select()
            .and_where(Expr::col(TagColumn::Path).is_in(paths))
            .order_by(TagColumn::Level, Order::Asc)
            .to_owned();
        self.fetch_all(&select).await
    }

    async fn children(&self, tag: &Tag) -> domain::Result<Vec<Tag>> {
        self.require_tree()?;
        let select = self
            .select()
            .and_where(Expr::col(TagColumn::ParentId).eq(tag.id))
            .order_by(TagColumn::Name, Order::Asc)
            .to_owned();
        self.fetch_all(&select).await
    }

    async fn siblings(&self, tag: &Tag) -> domain::Result<Vec<Tag>> {
        self.require_tree()?;
        let mut select = self.select();
        match tag.parent_id() {
            Some(parent) => select.and_where(Expr::col(TagColumn::ParentId).eq(parent)),
            None => select.and_where(Expr::col(TagColumn::ParentId).is_null()),
        };
        select.order_by(TagColumn::Name, Order::Asc);
        self.fetch_all(&select).await
    }

    async fn descendants(&self, tag: &Tag) -> domain::Result<Vec<Tag>> {
        self.require_tree()?;
        self.descendants_of(&self.tree_path(tag)?).await
    }

    async fn descendant_count(&self, tag: &Tag) -> domain::Result<i64> {
        Ok(self.descendants(tag).await?.iter().map(|t| t.count).sum())
    }

    async fn family_count(&self, tag: &Tag) -> domain::Result<i64> {
        let own = match tag.id {
            Some(id) => self.find_by_id(id).await?.map(|t| t.count).unwrap_or(0),
            None => 0,
        };
        Ok(own + self.descendant_count(tag).await?)
    }

    async fn rebuild(&self) -> domain::Result<usize> {
        self.require_tree()?;
        let rows = self.all().await?;

        // Park every row outside the unique (parent_id, slug) and path scopes
        for tag in &rows {
            let update = Query::update()
                .table(self.alias())
                .value(TagColumn::ParentId, Option::<TagPk>::None)
                .value(TagColumn::Path, format!("#{}", tag.id.unwrap_or_default()))
                .and_where(Expr::col(TagColumn::Id).eq(tag.id))
                .to_owned();
            self.execute(self.conn.get_database_backend().build(&update))
                .await?;
        }

        let mut ordered: Vec<(TreePosition, String, Tag)> = rows
            .into_iter()
            .map(|tag| {
                let name = clean_tree_name(&tag.name);
                (TreePosition::of(&name), name, tag)
            })
            .collect();
        ordered.sort_by(|a, b| a.0.level.cmp(&b.0.level).then_with(|| a.1.cmp(&b.1)));

        let mut placed: HashMap<String, Tag> = HashMap::new();
        let mut taken: HashMap<Option<TagPk>, Vec<String>> = HashMap::new();
        let mut created = 0;

        for (position, name, tag) in ordered {
            let parent = match &position.parent_name {
                Some(parent_name) => match placed.get(parent_name) {
                    Some(parent) => Some(parent.clone()),
                    None => {
                        // Missing ancestors are created on the way down
                        let chain = self.ensure_chain(parent_name).await?;
                        created += self.remember_chain(&chain, &mut placed, &mut taken).await?;
                        Some(chain)
                    }
                },
                None => None,
            };
            let parent_id = parent.as_ref().and_then(|p| p.id);
            let siblings = taken.entry(parent_id).or_default();
            let slug = unique_slug(&slugify(&position.label), siblings);
            siblings.push(slug.clone());
            let path = child_path(parent.as_ref().and_then(|p| p.path()), &slug);

            let update = Query::update()
                .table(self.alias())
                .value(TagColumn::Name, name.clone())
                .value(TagColumn::Slug, slug)
                .value(TagColumn::ParentId, parent_id)
                .value(TagColumn::Label, position.label.clone())
                .value(TagColumn::Level, position.level)
                .value(TagColumn::Path, path)
                .and_where(Expr::col(TagColumn::Id).eq(tag.id))
                .to_owned();
            self.execute(self.conn.get_database_backend().build(&update))
                .await?;

            if let Some(id) = tag.id {
                if let Some(fresh) = self.find_by_id(id).await? {
                    placed.insert(name, fresh);
                }
            }
        }

        let total = placed.len();
        info!(table = %self.table.name, rows = total, created, "Rebuilt tag tree");
        Ok(total)
    }
}

impl<'c, C> SeaOrmTagRepository<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    /// Record a freshly ensured ancestor chain so later rows can find it
    async fn remember_chain(
        &self,
        leaf: &Tag,
        placed: &mut HashMap<String, Tag>,
        taken: &mut HashMap<Option<TagPk>, Vec<String>>,
    ) -> domain::Result<usize> {
        let mut created = 0;
        let mut ancestors = self.ancestors(leaf).await?;
        ancestors.push(leaf.clone());
        for tag in ancestors {
            if placed.contains_key(&tag.name) {
                continue;
            }
            taken.entry(tag.parent_id()).or_default().push(tag.slug.clone());
            placed.insert(tag.name.clone(), tag);
            created += 1;
        }
        Ok(created)
    }
}
