use async_trait::async_trait;
use domain::DomainError;
use domain::tag::slug::{slug_stem, slugify, unique_slug};
use domain::tag::tree::{
    TreePosition, ancestor_names, check_rename, child_path, rebase_name, rebase_path,
};
use domain::tag::{AutocompletePage, Tag, TagPk, TagRepository, WeightedTag, weight};
use domain::{TagOptions, TagReference, TagTable};
use migration::{JoinColumn, TagColumn};
use sea_orm::sea_query::{Alias, Expr, Order, Query, SelectStatement, SimpleExpr};
use sea_orm::{ConnectionTrait, DbBackend, ExecResult, QueryResult, Statement};
use tracing::debug;

use crate::database::db_err;
use crate::database::query_rewriter::{escape_like, like};
use crate::database::rows::{select_tag_columns, tag_from_row};

/// Rows fetched per statement when autocomplete has no page size
const AUTOCOMPLETE_BATCH: u64 = 200;

/// Tag store over one auxiliary table
///
/// Borrows a connection so it can run on the transaction of the host entity
/// write. Works for flat and tree tables; the tree half lives in
/// `sea_orm_tree_repository.rs`.
pub struct SeaOrmTagRepository<'c, C> {
    pub(super) conn: &'c C,
    pub(super) table: &'c TagTable,
}

impl<'c, C> SeaOrmTagRepository<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(conn: &'c C, table: &'c TagTable) -> Self {
        Self { conn, table }
    }

    pub fn options(&self) -> &TagOptions {
        &self.table.options
    }

    pub(super) fn alias(&self) -> Alias {
        Alias::new(&self.table.name)
    }

    fn backend(&self) -> DbBackend {
        self.conn.get_database_backend()
    }

    pub(super) fn select(&self) -> SelectStatement {
        let mut select = Query::select();
        select.from(self.alias());
        select_tag_columns(&mut select, &self.alias(), self.table.is_tree());
        select
    }

    pub(super) async fn fetch_one(&self, select: &SelectStatement) -> domain::Result<Option<Tag>> {
        let row = self
            .conn
            .query_one(self.backend().build(select))
            .await
            .map_err(db_err)?;
        row.map(|r| tag_from_row(&r, self.table.is_tree()))
            .transpose()
    }

    pub(super) async fn fetch_all(&self, select: &SelectStatement) -> domain::Result<Vec<Tag>> {
        let rows = self
            .conn
            .query_all(self.backend().build(select))
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|r| tag_from_row(r, self.table.is_tree()))
            .collect()
    }

    pub(super) async fn execute(&self, statement: Statement) -> domain::Result<ExecResult> {
        self.conn.execute(statement).await.map_err(db_err)
    }

    async fn query_one(&self, statement: Statement) -> domain::Result<Option<QueryResult>> {
        self.conn.query_one(statement).await.map_err(db_err)
    }

    pub(super) fn require_name(&self, raw: &str) -> domain::Result<String> {
        self.options().normalize_name(raw)?.ok_or_else(|| {
            DomainError::MalformedTagString(format!("empty tag name in {}", self.table.name))
        })
    }

    pub(super) async fn get(&self, id: TagPk) -> domain::Result<Tag> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::TagNotFound(format!("{}#{}", self.table.name, id)))
    }

    /// Slugs already used in the scope a new slug must be unique in
    ///
    /// Only slugs sharing the stem of `base` can collide, so only those are
    /// loaded.
    pub(super) async fn taken_slugs(
        &self,
        base: &str,
        parent: Option<TagPk>,
        exclude: Option<TagPk>,
    ) -> domain::Result<Vec<String>> {
        let mut select = Query::select();
        select
            .column(TagColumn::Slug)
            .from(self.alias())
            .and_where(Expr::col(TagColumn::Slug).like(format!("{}%", slug_stem(base))));
        if self.table.is_tree() {
            match parent {
                Some(parent) => select.and_where(Expr::col(TagColumn::ParentId).eq(parent)),
                None => select.and_where(Expr::col(TagColumn::ParentId).is_null()),
            };
        }
        if let Some(id) = exclude {
            select.and_where(Expr::col(TagColumn::Id).ne(id));
        }

        let rows = self
            .conn
            .query_all(self.backend().build(&select))
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|r| r.try_get::<String>("", "slug").map_err(db_err))
            .collect()
    }

    /// Insert a row for a name known not to exist
    pub(super) async fn insert(
        &self,
        name: &str,
        protected: bool,
        parent: Option<&Tag>,
    ) -> domain::Result<Tag> {
        let position = TreePosition::of(name);
        let parent_id = parent.and_then(|p| p.id);
        let label = if self.table.is_tree() {
            position.label.as_str()
        } else {
            name
        };
        let base = slugify(label);
        let taken = self.taken_slugs(&base, parent_id, None).await?;
        let slug = unique_slug(&base, &taken);

        let mut insert = Query::insert();
        insert.into_table(self.alias());
        if self.table.is_tree() {
            let path = child_path(parent.and_then(|p| p.path()), &slug);
            insert
                .columns([
                    TagColumn::Name,
                    TagColumn::Slug,
                    TagColumn::Count,
                    TagColumn::Protected,
                    TagColumn::ParentId,
                    TagColumn::Label,
                    TagColumn::Level,
                    TagColumn::Path,
                ])
                .values([
                    name.into(),
                    slug.into(),
                    0i64.into(),
                    protected.into(),
                    parent_id.into(),
                    position.label.clone().into(),
                    position.level.into(),
                    path.into(),
                ])
                .map_err(|e| DomainError::Database(e.to_string()))?;
        } else {
            insert
                .columns([
                    TagColumn::Name,
                    TagColumn::Slug,
                    TagColumn::Count,
                    TagColumn::Protected,
                ])
                .values([name.into(), slug.into(), 0i64.into(), protected.into()])
                .map_err(|e| DomainError::Database(e.to_string()))?;
        }
        insert.returning_col(TagColumn::Id);

        let row = self
            .query_one(self.backend().build(&insert))
            .await?
            .ok_or_else(|| {
                DomainError::Database(format!("insert into {} returned nothing", self.table.name))
            })?;
        let id: TagPk = row.try_get("", "id").map_err(db_err)?;
        debug!(table = %self.table.name, tag = %name, id, protected, "Created tag");

        self.get(id).await
    }

    async fn has_children(&self, id: TagPk) -> domain::Result<bool> {
        if !self.table.is_tree() {
            return Ok(false);
        }
        let select = Query::select()
            .column(TagColumn::Id)
            .from(self.alias())
            .and_where(Expr::col(TagColumn::ParentId).eq(id))
            .limit(1)
            .to_owned();
        Ok(self.query_one(self.backend().build(&select)).await?.is_some())
    }

    async fn count_references(&self, id: TagPk) -> domain::Result<i64> {
        let mut total = 0;
        for reference in &self.table.references {
            let select = match reference {
                TagReference::Column { table, column } => Query::select()
                    .expr_as(Expr::col(Alias::new(column)).count(), Alias::new("n"))
                    .from(Alias::new(table))
                    .and_where(Expr::col(Alias::new(column)).eq(id))
                    .to_owned(),
                TagReference::JoinTable { table } => Query::select()
                    .expr_as(Expr::col(JoinColumn::TagId).count(), Alias::new("n"))
                    .from(Alias::new(table))
                    .and_where(Expr::col(JoinColumn::TagId).eq(id))
                    .to_owned(),
            };
            if let Some(row) = self.query_one(self.backend().build(&select)).await? {
                total += row.try_get::<i64>("", "n").map_err(db_err)?;
            }
        }
        Ok(total)
    }

    /// SQL prefilter for autocomplete; never narrower than the final check
    ///
    /// Without case sensitivity the backend's `LOWER` is only trusted for
    /// ASCII queries, so other queries are filtered in Rust alone.
    fn autocomplete_condition(&self, key: &str, fulltext: bool) -> Option<SimpleExpr> {
        if key.is_empty() {
            return None;
        }
        let pattern = if fulltext {
            format!("%{}%", escape_like(key))
        } else {
            format!("{}%", escape_like(key))
        };
        let name = Expr::col(TagColumn::Name);
        if self.options().case_sensitive() {
            Some(like(name, pattern, false))
        } else if key.is_ascii() {
            Some(like(name, pattern, true))
        } else {
            None
        }
    }

    /// Whether the SQL prefilter selects exactly the matching rows, so the
    /// page offset can go straight into the statement
    fn autocomplete_filter_is_exact(&self, key: &str) -> bool {
        if key.is_empty() {
            return true;
        }
        // SQLite LIKE folds ASCII case even when the field is case sensitive
        if self.options().case_sensitive() {
            self.backend() == DbBackend::Postgres
        } else {
            key.is_ascii()
        }
    }

    async fn write_count(&self, id: TagPk, count: i64) -> domain::Result<()> {
        let update = Query::update()
            .table(self.alias())
            .value(TagColumn::Count, count.max(0))
            .and_where(Expr::col(TagColumn::Id).eq(id))
            .to_owned();
        self.execute(self.backend().build(&update)).await?;
        Ok(())
    }

    async fn rename_flat(&self, tag: &Tag, new_name: &str) -> domain::Result<Tag> {
        let id = tag.id.unwrap_or_default();
        let base = slugify(new_name);
        let taken = self.taken_slugs(&base, None, Some(id)).await?;
        let update = Query::update()
            .table(self.alias())
            .value(TagColumn::Name, new_name)
            .value(TagColumn::Slug, unique_slug(&base, &taken))
            .and_where(Expr::col(TagColumn::Id).eq(id))
            .to_owned();
        self.execute(self.backend().build(&update)).await?;
        self.get(id).await
    }

    async fn rename_tree(&self, tag: &Tag, new_name: &str) -> domain::Result<Tag> {
        check_rename(&tag.name, new_name, self.options())?;
        let id = tag.id.unwrap_or_default();
        let old_path = tag.path().unwrap_or_default().to_string();
        let descendants = self.descendants_of(&old_path).await?;

        let position = TreePosition::of(new_name);
        let parent = match &position.parent_name {
            Some(parent_name) => Some(self.ensure_chain(parent_name).await?),
            None => None,
        };
        let parent_id = parent.as_ref().and_then(|p| p.id);
        if let Some(parent) = &parent {
            let parent_path = parent.path().unwrap_or_default();
            if parent.id == Some(id) || parent_path.starts_with(&format!("{}/", old_path)) {
                return Err(DomainError::TagTreeCycle(format!(
                    "cannot move \"{}\" beneath itself as \"{}\"",
                    tag.name, new_name
                )));
            }
        }

        let base = slugify(&position.label);
        let taken = self.taken_slugs(&base, parent_id, Some(id)).await?;
        let slug = unique_slug(&base, &taken);
        let new_path = child_path(parent.as_ref().and_then(|p| p.path()), &slug);

        let update = Query::update()
            .table(self.alias())
            .value(TagColumn::Name, new_name)
            .value(TagColumn::Slug, slug)
            .value(TagColumn::ParentId, parent_id)
            .value(TagColumn::Label, position.label.clone())
            .value(TagColumn::Level, position.level)
            .value(TagColumn::Path, new_path.clone())
            .and_where(Expr::col(TagColumn::Id).eq(id))
            .to_owned();
        self.execute(self.backend().build(&update)).await?;

        let level_shift = position.level - tag.level();
        for child in &descendants {
            let update = Query::update()
                .table(self.alias())
                .value(TagColumn::Name, rebase_name(&child.name, &tag.name, new_name))
                .value(
                    TagColumn::Path,
                    rebase_path(child.path().unwrap_or_default(), &old_path, &new_path),
                )
                .value(TagColumn::Level, child.level() + level_shift)
                .and_where(Expr::col(TagColumn::Id).eq(child.id))
                .to_owned();
            self.execute(self.backend().build(&update)).await?;
        }
        debug!(
            table = %self.table.name,
            from = %tag.name,
            to = %new_name,
            descendants = descendants.len(),
            "Renamed tree tag"
        );

        if let Some(old_parent) = tag.parent_id() {
            if Some(old_parent) != parent_id {
                self.try_delete(old_parent).await?;
            }
        }
        self.get(id).await
    }

    /// Find or create every level of a tree name, unprotected, returning the deepest
    pub(super) async fn ensure_chain(&self, name: &str) -> domain::Result<Tag> {
        let mut parent: Option<Tag> = None;
        for level_name in ancestor_names(name)
            .into_iter()
            .chain(std::iter::once(name.to_string()))
        {
            let tag = match self.find(&level_name).await? {
                Some(tag) => tag,
                None => self.insert(&level_name, false, parent.as_ref()).await?,
            };
            parent = Some(tag);
        }
        parent.ok_or_else(|| DomainError::MalformedTagString(name.to_string()))
    }

    /// Rows strictly below `path`, ordered by name
    pub(super) async fn descendants_of(&self, path: &str) -> domain::Result<Vec<Tag>> {
        let prefix = format!("{}/", path);
        let select = self
            .select()
            .and_where(Expr::col(TagColumn::Path).like(format!("{}%", prefix)))
            .order_by(TagColumn::Name, Order::Asc)
            .to_owned();
        let rows = self.fetch_all(&select).await?;
        // LIKE treats `_` as a wildcard
        Ok(rows
            .into_iter()
            .filter(|t| t.path().is_some_and(|p| p.starts_with(&prefix)))
            .collect())
    }
}

#[async_trait]
impl<'c, C> TagRepository for SeaOrmTagRepository<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find(&self, name: &str) -> domain::Result<Option<Tag>> {
        let Some(name) = self.options().normalize_name(name)? else {
            return Ok(None);
        };

        if self.options().case_sensitive() {
            let select = self
                .select()
                .and_where(Expr::col(TagColumn::Name).eq(name.as_str()))
                .order_by(TagColumn::Id, Order::Asc)
                .to_owned();
            return self.fetch_one(&select).await;
        }

        // Names equal under case folding share a slug stem
        let label = if self.table.is_tree() {
            TreePosition::of(&name).label
        } else {
            name.clone()
        };
        let stem = slug_stem(&slugify(&label));
        let select = self
            .select()
            .and_where(Expr::col(TagColumn::Slug).like(format!("{}%", stem)))
            .order_by(TagColumn::Id, Order::Asc)
            .to_owned();
        let key = self.options().compare_key(&name);
        Ok(self
            .fetch_all(&select)
            .await?
            .into_iter()
            .find(|t| self.options().compare_key(&t.name) == key))
    }

    async fn find_by_id(&self, id: TagPk) -> domain::Result<Option<Tag>> {
        let select = self
            .select()
            .and_where(Expr::col(TagColumn::Id).eq(id))
            .to_owned();
        self.fetch_one(&select).await
    }

    async fn get_or_create(&self, name: &str, protected: bool) -> domain::Result<Tag> {
        let name = self.require_name(name)?;
        if let Some(tag) = self.find(&name).await? {
            return Ok(tag);
        }
        if !self.table.is_tree() {
            return self.insert(&name, protected, None).await;
        }

        // Ancestors are structural placeholders and never inherit protection
        let parent = match TreePosition::of(&name).parent_name {
            Some(parent_name) => Some(self.ensure_chain(&parent_name).await?),
            None => None,
        };
        self.insert(&name, protected, parent.as_ref()).await
    }

    async fn increment(&self, id: TagPk) -> domain::Result<Tag> {
        let update = Query::update()
            .table(self.alias())
            .value(TagColumn::Count, Expr::col(TagColumn::Count).add(1))
            .and_where(Expr::col(TagColumn::Id).eq(id))
            .to_owned();
        self.execute(self.backend().build(&update)).await?;
        let tag = self.get(id).await?;
        debug!(table = %self.table.name, tag = %tag.name, count = tag.count, "Incremented tag");
        Ok(tag)
    }

    async fn decrement(&self, id: TagPk) -> domain::Result<Option<Tag>> {
        let update = Query::update()
            .table(self.alias())
            .value(TagColumn::Count, Expr::col(TagColumn::Count).sub(1))
            .and_where(Expr::col(TagColumn::Id).eq(id))
            .and_where(Expr::col(TagColumn::Count).gt(0))
            .to_owned();
        self.execute(self.backend().build(&update)).await?;
        self.try_delete(id).await?;
        let tag = self.find_by_id(id).await?;
        if let Some(tag) = &tag {
            debug!(table = %self.table.name, tag = %tag.name, count = tag.count, "Decremented tag");
        }
        Ok(tag)
    }

    async fn set_count(&self, id: TagPk, count: i64) -> domain::Result<Option<Tag>> {
        self.write_count(id, count).await?;
        self.try_delete(id).await?;
        self.find_by_id(id).await
    }

    async fn recount(&self, id: TagPk) -> domain::Result<Option<Tag>> {
        let count = self.count_references(id).await?;
        debug!(table = %self.table.name, id, count, "Recounted tag");
        self.set_count(id, count).await
    }

    async fn try_delete(&self, id: TagPk) -> domain::Result<bool> {
        let mut next = Some(id);
        let mut deleted = false;

        // Deleting a tree tag can leave its parent empty; walk up until a row stays
        while let Some(current) = next.take() {
            let Some(tag) = self.find_by_id(current).await? else {
                break;
            };
            if !tag.is_deletable(self.options()) || self.has_children(current).await? {
                break;
            }

            let delete = Query::delete()
                .from_table(self.alias())
                .and_where(Expr::col(TagColumn::Id).eq(current))
                .to_owned();
            self.execute(self.backend().build(&delete)).await?;
            debug!(table = %self.table.name, tag = %tag.name, "Deleted unused tag");

            deleted |= current == id;
            next = tag.parent_id();
        }
        Ok(deleted)
    }

    async fn set_protected(&self, id: TagPk, protected: bool) -> domain::Result<Option<Tag>> {
        let update = Query::update()
            .table(self.alias())
            .value(TagColumn::Protected, protected)
            .and_where(Expr::col(TagColumn::Id).eq(id))
            .to_owned();
        self.execute(self.backend().build(&update)).await?;
        if !protected {
            self.try_delete(id).await?;
        }
        self.find_by_id(id).await
    }

    async fn rename(&self, id: TagPk, new_name: &str) -> domain::Result<Tag> {
        let tag = self.get(id).await?;
        let new_name = self.require_name(new_name)?;
        if tag.name == new_name {
            return Ok(tag);
        }
        if let Some(existing) = self.find(&new_name).await? {
            if existing.id != tag.id {
                return Err(DomainError::DuplicateTag(new_name));
            }
        }

        if self.table.is_tree() {
            self.rename_tree(&tag, &new_name).await
        } else {
            self.rename_flat(&tag, &new_name).await
        }
    }

    async fn all(&self) -> domain::Result<Vec<Tag>> {
        let select = self
            .select()
            .order_by(TagColumn::Name, Order::Asc)
            .to_owned();
        self.fetch_all(&select).await
    }

    async fn initial(&self) -> domain::Result<Vec<Tag>> {
        let mut tags = Vec::new();
        for name in self.options().initial() {
            if let Some(tag) = self.find(name).await? {
                if !tags.iter().any(|t: &Tag| t.id == tag.id) {
                    tags.push(tag);
                }
            }
        }
        Ok(tags)
    }

    async fn weighted(&self, min: i64, max: i64) -> domain::Result<Vec<WeightedTag>> {
        let tags = self.all().await?;
        let max_count = tags.iter().map(|t| t.count).max().unwrap_or(0);
        Ok(tags
            .into_iter()
            .map(|tag| WeightedTag {
                weight: weight(tag.count, max_count, min, max),
                tag,
            })
            .collect())
    }

    async fn autocomplete(&self, query: &str, page: u64) -> domain::Result<AutocompletePage> {
        let options = self.options();
        let query = if options.force_lowercase() {
            query.trim().to_lowercase()
        } else {
            query.trim().to_string()
        };
        let key = options.compare_key(&query);
        let fulltext = options.autocomplete_view_fulltext();
        let matches = |name: &str| {
            let name = options.compare_key(name);
            if fulltext {
                name.contains(&key)
            } else {
                name.starts_with(&key)
            }
        };

        let limit = options.autocomplete_limit();
        let skip = (page.max(1) - 1).saturating_mul(limit) as usize;
        // One past the page tells whether there is more
        let wanted = (limit > 0).then(|| limit as usize + 1);
        let batch = if limit > 0 { limit + 1 } else { AUTOCOMPLETE_BATCH };

        let mut select = self.select();
        if let Some(condition) = self.autocomplete_condition(&key, fulltext) {
            select.and_where(condition);
        }
        select.order_by(TagColumn::Name, Order::Asc);

        // The SQL filter may let extra rows through, so rows are checked again
        // here and the offset only advances in whole batches
        let mut offset = if self.autocomplete_filter_is_exact(&key) {
            skip as u64
        } else {
            0
        };
        let mut skipped = offset as usize;
        let mut results = Vec::new();
        'scan: loop {
            let rows = self
                .fetch_all(&select.clone().limit(batch).offset(offset).to_owned())
                .await?;
            let fetched = rows.len() as u64;
            for tag in rows {
                if !matches(&tag.name) {
                    continue;
                }
                if skipped < skip {
                    skipped += 1;
                    continue;
                }
                results.push(tag.name);
                if wanted.is_some_and(|w| results.len() >= w) {
                    break 'scan;
                }
            }
            if fetched < batch {
                break;
            }
            offset += batch;
        }

        let more = wanted.is_some_and(|w| results.len() >= w);
        if more {
            results.truncate(limit as usize);
        }
        debug!(
            table = %self.table.name,
            query = %query,
            page,
            results = results.len(),
            "Autocomplete"
        );
        Ok(AutocompletePage { results, more })
    }
}
