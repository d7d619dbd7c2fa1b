//! Host entity access with tag field bookkeeping
//!
//! A `TaggedModel` is the explicit wrapper around one bound host table.
//! Instances carry plain column values plus one manager per tag field, and
//! every save or delete runs the managers inside the same transaction as
//! the host row write.

use std::collections::BTreeMap;
use std::sync::Arc;

use domain::tag::{EntityPk, Tag, TagPk, TagRepository};
use domain::{DomainError, FieldBinding, FieldKind, ModelBinding};
use infrastructure::{SeaOrmLinkRepository, SeaOrmTagRepository, TagQuery};
use sea_orm::sea_query::{Alias, Expr, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait, Value};
use tracing::debug;

use crate::registry::TagRegistry;
use crate::tag::{MultiTagManager, SingleTagManager};

fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::Database(e.to_string())
}

#[derive(Debug, Clone)]
pub enum FieldManager {
    Single(SingleTagManager),
    Multi(MultiTagManager),
}

/// One host row, saved or not
#[derive(Debug, Clone)]
pub struct TaggedInstance {
    pk: Option<EntityPk>,
    attrs: BTreeMap<String, Value>,
    fields: BTreeMap<String, FieldManager>,
}

impl TaggedInstance {
    pub fn pk(&self) -> Option<EntityPk> {
        self.pk
    }

    pub fn is_saved(&self) -> bool {
        self.pk.is_some()
    }

    /// Set a plain host column, written on the next save
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.attrs.insert(column.to_string(), value.into());
    }

    pub fn attr(&self, column: &str) -> Option<&Value> {
        self.attrs.get(column)
    }

    fn manager(&self, field: &str) -> domain::Result<&FieldManager> {
        self.fields
            .get(field)
            .ok_or_else(|| DomainError::UnknownField(field.to_string()))
    }

    fn manager_mut(&mut self, field: &str) -> domain::Result<&mut FieldManager> {
        self.fields
            .get_mut(field)
            .ok_or_else(|| DomainError::UnknownField(field.to_string()))
    }

    /// Assign a tag string to any tag field
    pub fn set_tags(&mut self, field: &str, input: &str) -> domain::Result<()> {
        match self.manager_mut(field)? {
            FieldManager::Single(m) => m.set(Some(input)),
            FieldManager::Multi(m) => m.set_tag_string(input),
        }
    }

    pub fn tag_string(&self, field: &str) -> domain::Result<String> {
        Ok(match self.manager(field)? {
            FieldManager::Single(m) => m.tag_string(),
            FieldManager::Multi(m) => m.get_tag_string(),
        })
    }

    pub fn tags(&self, field: &str) -> domain::Result<Vec<Tag>> {
        Ok(match self.manager(field)? {
            FieldManager::Single(m) => m.get().into_iter().collect(),
            FieldManager::Multi(m) => m.tags(),
        })
    }

    pub fn single(&self, field: &str) -> domain::Result<&SingleTagManager> {
        match self.manager(field)? {
            FieldManager::Single(m) => Ok(m),
            FieldManager::Multi(_) => Err(DomainError::UnknownField(format!(
                "{} is not single",
                field
            ))),
        }
    }

    pub fn single_mut(&mut self, field: &str) -> domain::Result<&mut SingleTagManager> {
        match self.manager_mut(field)? {
            FieldManager::Single(m) => Ok(m),
            FieldManager::Multi(_) => Err(DomainError::UnknownField(format!(
                "{} is not single",
                field
            ))),
        }
    }

    pub fn multi(&self, field: &str) -> domain::Result<&MultiTagManager> {
        match self.manager(field)? {
            FieldManager::Multi(m) => Ok(m),
            FieldManager::Single(_) => Err(DomainError::UnknownField(format!(
                "{} is not multi",
                field
            ))),
        }
    }

    pub fn multi_mut(&mut self, field: &str) -> domain::Result<&mut MultiTagManager> {
        match self.manager_mut(field)? {
            FieldManager::Multi(m) => Ok(m),
            FieldManager::Single(_) => Err(DomainError::UnknownField(format!(
                "{} is not multi",
                field
            ))),
        }
    }
}

/// Tag-aware access to one host table
#[derive(Clone)]
pub struct TaggedModel {
    registry: Arc<TagRegistry>,
    model: Arc<ModelBinding>,
    db: DatabaseConnection,
}

impl TaggedModel {
    pub fn new(
        registry: Arc<TagRegistry>,
        app: &str,
        model: &str,
        db: DatabaseConnection,
    ) -> domain::Result<Self> {
        let model = registry
            .model(app, model)
            .cloned()
            .ok_or_else(|| DomainError::UnknownField(format!("{}.{}", app, model)))?;
        Ok(Self {
            registry,
            model,
            db,
        })
    }

    pub fn binding(&self) -> &ModelBinding {
        &self.model
    }

    fn host(&self) -> Alias {
        Alias::new(&self.model.table)
    }

    fn pk(&self) -> Alias {
        Alias::new(&self.model.primary_key)
    }

    fn field(&self, name: &str) -> domain::Result<&Arc<FieldBinding>> {
        self.model
            .field(name)
            .ok_or_else(|| DomainError::UnknownField(name.to_string()))
    }

    fn store<'c, C>(
        &'c self,
        conn: &'c C,
        field: &FieldBinding,
    ) -> domain::Result<SeaOrmTagRepository<'c, C>>
    where
        C: ConnectionTrait + Send + Sync,
    {
        Ok(SeaOrmTagRepository::new(conn, self.registry.table_for(field)?))
    }

    /// A new, unsaved instance with empty tag fields
    pub fn instance(&self) -> TaggedInstance {
        let fields = self
            .model
            .fields
            .iter()
            .map(|binding| {
                let manager = match binding.kind {
                    FieldKind::Single => {
                        FieldManager::Single(SingleTagManager::new(binding.clone()))
                    }
                    FieldKind::Multi => FieldManager::Multi(MultiTagManager::new(binding.clone())),
                };
                (binding.field.clone(), manager)
            })
            .collect();
        TaggedInstance {
            pk: None,
            attrs: BTreeMap::new(),
            fields,
        }
    }

    /// Load the tag fields of a stored row; plain columns are not read
    pub async fn load(&self, pk: EntityPk) -> domain::Result<Option<TaggedInstance>> {
        let mut select = Query::select();
        select
            .column(self.pk())
            .from(self.host())
            .and_where(Expr::col(self.pk()).eq(pk));
        for binding in &self.model.fields {
            if binding.kind == FieldKind::Single {
                select.column(Alias::new(binding.fk_column()));
            }
        }
        let Some(row) = self
            .db
            .query_one(self.db.get_database_backend().build(&select))
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let mut fields = BTreeMap::new();
        for binding in &self.model.fields {
            let manager = match binding.kind {
                FieldKind::Single => {
                    let fk: Option<TagPk> = row.try_get("", &binding.fk_column()).map_err(db_err)?;
                    let tag = match fk {
                        Some(id) => self.store(&self.db, binding)?.find_by_id(id).await?,
                        None => None,
                    };
                    FieldManager::Single(SingleTagManager::loaded(binding.clone(), tag))
                }
                FieldKind::Multi => {
                    let links = SeaOrmLinkRepository::new(&self.db, binding);
                    FieldManager::Multi(MultiTagManager::load(binding.clone(), pk, &links).await?)
                }
            };
            fields.insert(binding.field.clone(), manager);
        }

        Ok(Some(TaggedInstance {
            pk: Some(pk),
            attrs: BTreeMap::new(),
            fields,
        }))
    }

    pub async fn save(&self, instance: &mut TaggedInstance) -> domain::Result<EntityPk> {
        self.save_with(instance, false).await
    }

    /// Save after an out-of-band data load: counts are recomputed, not adjusted
    pub async fn save_raw(&self, instance: &mut TaggedInstance) -> domain::Result<EntityPk> {
        self.save_with(instance, true).await
    }

    /// Managers run on a copy that replaces the instance's only after commit,
    /// so a rolled-back save leaves the instance as it was
    async fn save_with(
        &self,
        instance: &mut TaggedInstance,
        raw: bool,
    ) -> domain::Result<EntityPk> {
        let mut fields = instance.fields.clone();
        let txn = self.db.begin().await.map_err(db_err)?;
        let pk = self
            .save_in(&txn, instance.pk, &instance.attrs, &mut fields, raw)
            .await?;
        txn.commit().await.map_err(db_err)?;

        instance.pk = Some(pk);
        instance.fields = fields;
        debug!(model = %self.model.id(), pk, raw, "Saved tagged entity");
        Ok(pk)
    }

    async fn save_in(
        &self,
        txn: &DatabaseTransaction,
        pk: Option<EntityPk>,
        attrs: &BTreeMap<String, Value>,
        fields: &mut BTreeMap<String, FieldManager>,
        raw: bool,
    ) -> domain::Result<EntityPk> {
        let mut values: Vec<(String, Value)> = attrs
            .iter()
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        for (name, manager) in fields.iter_mut() {
            if let FieldManager::Single(single) = manager {
                let binding = self.field(name)?;
                let store = self.store(txn, binding)?;
                let fk = single.pre_save(&store).await?;
                values.push((binding.fk_column(), fk.into()));
            }
        }

        let pk = match pk {
            Some(pk) => {
                self.update_host(txn, pk, &values).await?;
                pk
            }
            None => self.insert_host(txn, &values).await?,
        };

        for (name, manager) in fields.iter_mut() {
            let binding = self.field(name)?;
            let store = self.store(txn, binding)?;
            match manager {
                FieldManager::Single(single) => single.post_save(&store, raw).await?,
                FieldManager::Multi(multi) => {
                    let links = SeaOrmLinkRepository::new(txn, binding);
                    multi.post_save(pk, &store, &links, raw).await?;
                }
            }
        }
        Ok(pk)
    }

    async fn insert_host(
        &self,
        txn: &DatabaseTransaction,
        values: &[(String, Value)],
    ) -> domain::Result<EntityPk> {
        let mut insert = Query::insert();
        insert.into_table(self.host());
        if values.is_empty() {
            insert.or_default_values();
        } else {
            insert.columns(values.iter().map(|(column, _)| Alias::new(column)));
            insert
                .values(values.iter().map(|(_, value)| SimpleExpr::from(value.clone())))
                .map_err(|e| DomainError::Database(e.to_string()))?;
        }
        insert.returning_col(self.pk());

        let row = txn
            .query_one(txn.get_database_backend().build(&insert))
            .await
            .map_err(db_err)?
            .ok_or_else(|| {
                DomainError::Database(format!("insert into {} returned nothing", self.model.table))
            })?;
        row.try_get::<EntityPk>("", &self.model.primary_key)
            .map_err(db_err)
    }

    async fn update_host(
        &self,
        txn: &DatabaseTransaction,
        pk: EntityPk,
        values: &[(String, Value)],
    ) -> domain::Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut update = Query::update();
        update
            .table(self.host())
            .and_where(Expr::col(self.pk()).eq(pk));
        for (column, value) in values {
            update.value(Alias::new(column), value.clone());
        }
        txn.execute(txn.get_database_backend().build(&update))
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Delete a stored row, releasing its tags in the same transaction
    pub async fn delete(&self, instance: &mut TaggedInstance) -> domain::Result<()> {
        let pk = instance.pk.ok_or_else(|| {
            DomainError::UnsavedEntityOperation(format!("delete on unsaved {}", self.model.id()))
        })?;
        let mut fields = instance.fields.clone();
        let txn = self.db.begin().await.map_err(db_err)?;
        self.delete_in(&txn, pk, &mut fields).await?;
        txn.commit().await.map_err(db_err)?;

        instance.pk = None;
        instance.fields = fields;
        debug!(model = %self.model.id(), pk, "Deleted tagged entity");
        Ok(())
    }

    async fn delete_in(
        &self,
        txn: &DatabaseTransaction,
        pk: EntityPk,
        fields: &mut BTreeMap<String, FieldManager>,
    ) -> domain::Result<()> {
        for (name, manager) in fields.iter_mut() {
            if let FieldManager::Multi(multi) = manager {
                let binding = self.field(name)?;
                let store = self.store(txn, binding)?;
                let links = SeaOrmLinkRepository::new(txn, binding);
                multi.pre_delete(&store, &links).await?;
            }
        }

        let delete = Query::delete()
            .from_table(self.host())
            .and_where(Expr::col(self.pk()).eq(pk))
            .to_owned();
        txn.execute(txn.get_database_backend().build(&delete))
            .await
            .map_err(db_err)?;

        for (name, manager) in fields.iter_mut() {
            if let FieldManager::Single(single) = manager {
                let store = self.store(txn, self.field(name)?)?;
                single.post_delete(&store).await?;
            }
        }
        Ok(())
    }

    /// Tag fields take tag strings; other keys are host columns
    fn assign(&self, instance: &mut TaggedInstance, key: &str, value: Value) -> domain::Result<()> {
        if self.model.field(key).is_none() {
            instance.set(key, value);
            return Ok(());
        }
        let input = match &value {
            Value::String(Some(s)) => s.to_string(),
            Value::String(None) => String::new(),
            _ => {
                return Err(DomainError::MalformedTagString(format!(
                    "{} expects a tag string",
                    key
                )));
            }
        };
        instance.set_tags(key, &input)
    }

    /// Build, assign and save a new row
    pub async fn create<I, K>(&self, values: I) -> domain::Result<TaggedInstance>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut instance = self.instance();
        for (key, value) in values {
            self.assign(&mut instance, key.as_ref(), value)?;
        }
        self.save(&mut instance).await?;
        Ok(instance)
    }

    /// Load the first row matching `lookups`, or create one from them
    ///
    /// Lookups are plain column or field names, optionally with `__exact`.
    pub async fn get_or_create(
        &self,
        lookups: Vec<(String, Value)>,
    ) -> domain::Result<(TaggedInstance, bool)> {
        let mut query = self.query();
        for (key, value) in &lookups {
            query = query.filter(key, value.clone())?;
        }
        if let Some(pk) = query.fetch_pks(&self.db).await?.first() {
            if let Some(instance) = self.load(*pk).await? {
                return Ok((instance, false));
            }
        }

        let values = lookups.into_iter().map(|(key, value)| {
            let key = key.strip_suffix("__exact").map(str::to_string).unwrap_or(key);
            (key, value)
        });
        Ok((self.create(values).await?, true))
    }

    pub fn query(&self) -> TagQuery<'_> {
        TagQuery::new(&self.model)
    }

    /// Load every row a query selects
    pub async fn fetch(&self, query: &TagQuery<'_>) -> domain::Result<Vec<TaggedInstance>> {
        let mut instances = Vec::new();
        for pk in query.fetch_pks(&self.db).await? {
            if let Some(instance) = self.load(pk).await? {
                instances.push(instance);
            }
        }
        Ok(instances)
    }

    /// Tag store for one of this model's fields, on the model's connection
    pub fn tag_store(
        &self,
        field: &str,
    ) -> domain::Result<SeaOrmTagRepository<'_, DatabaseConnection>> {
        let binding = self.field(field)?;
        self.store(&self.db, binding)
    }
}
