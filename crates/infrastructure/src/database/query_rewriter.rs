//! Tag-aware host entity queries
//!
//! Filters on tag fields take tag strings and are rewritten into joins on
//! the auxiliary tables. A multi-tag filter such as `tags = "a, b"` matches
//! entities whose tag set is exactly `{a, b}`: one join per name, each under
//! its own alias, plus a per-entity tag count equal to the number of names.
//!
//! Names are resolved to tag ids through the tag store before the statement
//! is built, so matching follows the field's case policy in Rust rather than
//! the backend's `LOWER`.

use std::collections::HashMap;

use domain::query::TAG_COLUMNS;
use domain::tag::{EntityPk, TagPk, TagRepository};
use domain::{
    DomainError, FieldBinding, FieldKind, Lookup, LookupOp, ModelBinding, TagSet, TagTable,
};
use migration::{JoinColumn, TagColumn};
use sea_orm::sea_query::{
    Alias, Expr, Func, JoinType, LikeExpr, Order, Query, SelectStatement, SimpleExpr,
};
use sea_orm::{ConnectionTrait, Value};

use crate::database::SeaOrmTagRepository;
use crate::database::db_err;

const PK_ALIAS: &str = "pk";

#[derive(Debug, Clone)]
struct Predicate {
    key: String,
    lookup: Lookup,
    value: Value,
    negated: bool,
}

/// Tag ids of the names used by tag-string predicates, keyed by field
#[derive(Debug, Clone, Default)]
pub struct ResolvedTags {
    ids: HashMap<(String, String), Option<TagPk>>,
}

impl ResolvedTags {
    /// Record the tag `name` resolves to in `field`'s table, `None` if absent
    pub fn insert(&mut self, field: &FieldBinding, name: &str, id: Option<TagPk>) {
        self.ids.insert((field.id(), name.to_string()), id);
    }

    fn get(&self, field: &FieldBinding, name: &str) -> Option<TagPk> {
        self.ids.get(&(field.id(), name.to_string())).copied().flatten()
    }
}

/// Query over the rows of one host entity
#[derive(Debug, Clone)]
pub struct TagQuery<'m> {
    model: &'m ModelBinding,
    predicates: Vec<Predicate>,
}

impl<'m> TagQuery<'m> {
    pub fn new(model: &'m ModelBinding) -> Self {
        Self {
            model,
            predicates: Vec::new(),
        }
    }

    /// Keep rows matching `key = value`
    ///
    /// Fails with `UnknownField` if `key` reaches through a field that is
    /// not a tag field or names a column the tag table does not have.
    pub fn filter(mut self, key: &str, value: impl Into<Value>) -> domain::Result<Self> {
        self.push(key, value.into(), false)?;
        Ok(self)
    }

    /// Drop rows matching `key = value`
    pub fn exclude(mut self, key: &str, value: impl Into<Value>) -> domain::Result<Self> {
        self.push(key, value.into(), true)?;
        Ok(self)
    }

    fn push(&mut self, key: &str, value: Value, negated: bool) -> domain::Result<()> {
        let lookup = Lookup::parse(key)?;
        match (self.model.field(&lookup.field), &lookup.column) {
            (Some(_), Some(column)) if !TAG_COLUMNS.contains(&column.as_str()) => {
                return Err(DomainError::UnknownField(key.to_string()));
            }
            (None, Some(_)) => return Err(DomainError::UnknownField(key.to_string())),
            _ => {}
        }
        self.predicates.push(Predicate {
            key: key.to_string(),
            lookup,
            value,
            negated,
        });
        Ok(())
    }

    fn host(&self) -> Alias {
        Alias::new(&self.model.table)
    }

    fn pk(&self) -> Alias {
        Alias::new(&self.model.primary_key)
    }

    fn base_select(&self) -> SelectStatement {
        Query::select()
            .expr_as(Expr::col((self.host(), self.pk())), Alias::new(PK_ALIAS))
            .from(self.host())
            .to_owned()
    }

    /// Normalised names each tag-string predicate on `binding` refers to
    fn tag_string_names(
        &self,
        binding: &FieldBinding,
        predicate: &Predicate,
    ) -> domain::Result<Vec<String>> {
        let input = tag_string(&predicate.value, &predicate.key)?;
        Ok(match binding.kind {
            FieldKind::Single => binding.options.normalize_name(&input)?.into_iter().collect(),
            FieldKind::Multi => {
                TagSet::parse(&input, &binding.options.clone().with_max_count(0))?
                    .names()
                    .to_vec()
            }
        })
    }

    /// Look up every name used by a tag-string predicate in its tag table
    pub async fn resolve<C>(&self, conn: &C) -> domain::Result<ResolvedTags>
    where
        C: ConnectionTrait + Send + Sync,
    {
        let mut resolved = ResolvedTags::default();
        for predicate in &self.predicates {
            let Some(binding) = self.model.field(&predicate.lookup.field) else {
                continue;
            };
            if !predicate.lookup.is_tag_string() {
                continue;
            }
            let table = TagTable::from_fields(&binding.tag_table, &[binding.as_ref()])?;
            let store = SeaOrmTagRepository::new(conn, &table);
            for name in self.tag_string_names(binding, predicate)? {
                let id = store.find(&name).await?.and_then(|t| t.id);
                resolved.insert(binding, &name, id);
            }
        }
        Ok(resolved)
    }

    /// Select statement returning matching primary keys in order
    pub fn build(&self, resolved: &ResolvedTags) -> domain::Result<SelectStatement> {
        let mut select = self.base_select();
        select.distinct();
        let mut aliases = 0;
        for predicate in &self.predicates {
            if predicate.negated {
                // Same predicate as an inclusion query, removed by primary key
                let mut inclusion = self.base_select();
                self.apply(&mut inclusion, predicate, resolved, &mut aliases)?;
                select.and_where(Expr::col((self.host(), self.pk())).not_in_subquery(inclusion));
            } else {
                self.apply(&mut select, predicate, resolved, &mut aliases)?;
            }
        }
        select.order_by((self.host(), self.pk()), Order::Asc);
        Ok(select)
    }

    pub async fn fetch_pks<C>(&self, conn: &C) -> domain::Result<Vec<EntityPk>>
    where
        C: ConnectionTrait + Send + Sync,
    {
        let resolved = self.resolve(conn).await?;
        let select = self.build(&resolved)?;
        let rows = conn
            .query_all(conn.get_database_backend().build(&select))
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|r| r.try_get::<EntityPk>("", PK_ALIAS).map_err(db_err))
            .collect()
    }

    pub async fn count<C>(&self, conn: &C) -> domain::Result<usize>
    where
        C: ConnectionTrait + Send + Sync,
    {
        Ok(self.fetch_pks(conn).await?.len())
    }

    fn apply(
        &self,
        select: &mut SelectStatement,
        predicate: &Predicate,
        resolved: &ResolvedTags,
        aliases: &mut usize,
    ) -> domain::Result<()> {
        let lookup = &predicate.lookup;
        let Some(binding) = self.model.field(&lookup.field) else {
            let column = Expr::col((self.host(), Alias::new(&lookup.field)));
            select.and_where(compare(column, lookup.op, &predicate.value, &predicate.key)?);
            return Ok(());
        };

        if lookup.is_tag_string() {
            let names = self.tag_string_names(binding, predicate)?;
            match binding.kind {
                FieldKind::Single => self.single_tag_string(select, binding, &names, resolved),
                FieldKind::Multi => {
                    self.multi_tag_string(select, binding, &names, resolved, aliases)
                }
            }
            return Ok(());
        }

        if lookup.column.is_none() && lookup.op == LookupOp::IsNull {
            let is_null = matches!(predicate.value, Value::Bool(Some(true)));
            select.and_where(self.has_no_tags(binding, is_null));
            return Ok(());
        }

        // Anything else compares a column of the tag table, `name` by default
        let column = lookup.column.as_deref().unwrap_or("name");
        let tag_table = Alias::new(&binding.tag_table);
        let condition = compare(
            Expr::col((tag_table.clone(), Alias::new(column))),
            lookup.op,
            &predicate.value,
            &predicate.key,
        )?;
        select.and_where(self.linked_where(binding, condition));
        Ok(())
    }

    fn single_tag_string(
        &self,
        select: &mut SelectStatement,
        binding: &FieldBinding,
        names: &[String],
        resolved: &ResolvedTags,
    ) {
        let fk = Expr::col((self.host(), Alias::new(binding.fk_column())));
        match names.first() {
            None => {
                select.and_where(fk.is_null());
            }
            Some(name) => match resolved.get(binding, name) {
                Some(id) => {
                    select.and_where(fk.eq(id));
                }
                None => {
                    select.and_where(matches_nothing());
                }
            },
        }
    }

    fn multi_tag_string(
        &self,
        select: &mut SelectStatement,
        binding: &FieldBinding,
        names: &[String],
        resolved: &ResolvedTags,
        aliases: &mut usize,
    ) {
        let join_table = Alias::new(binding.join_table());
        let pk = Expr::col((self.host(), self.pk()));

        if names.is_empty() {
            let linked = Query::select()
                .column(JoinColumn::EntityId)
                .from(join_table)
                .to_owned();
            select.and_where(pk.not_in_subquery(linked));
            return;
        }

        let ids: Option<Vec<TagPk>> = names.iter().map(|n| resolved.get(binding, n)).collect();
        let Some(ids) = ids else {
            // A name with no tag row cannot be part of any tag set
            select.and_where(matches_nothing());
            return;
        };

        // A conjunction on a single join matches nothing, so each name gets its own
        for id in &ids {
            *aliases += 1;
            let join_alias = Alias::new(format!("{}_j{}", binding.field, aliases));
            select.join_as(
                JoinType::InnerJoin,
                join_table.clone(),
                join_alias.clone(),
                Expr::col((join_alias.clone(), JoinColumn::EntityId))
                    .equals((self.host(), self.pk()))
                    .and(Expr::col((join_alias, JoinColumn::TagId)).eq(*id)),
            );
        }

        let exact_count = Query::select()
            .column(JoinColumn::EntityId)
            .from(join_table)
            .group_by_col(JoinColumn::EntityId)
            .and_having(Expr::col(JoinColumn::TagId).count().eq(ids.len() as i64))
            .to_owned();
        select.and_where(pk.in_subquery(exact_count));
    }

    fn has_no_tags(&self, binding: &FieldBinding, is_null: bool) -> SimpleExpr {
        match binding.kind {
            FieldKind::Single => {
                let fk = Expr::col((self.host(), Alias::new(binding.fk_column())));
                if is_null { fk.is_null() } else { fk.is_not_null() }
            }
            FieldKind::Multi => {
                let linked = Query::select()
                    .column(JoinColumn::EntityId)
                    .from(Alias::new(binding.join_table()))
                    .to_owned();
                let pk = Expr::col((self.host(), self.pk()));
                if is_null {
                    pk.not_in_subquery(linked)
                } else {
                    pk.in_subquery(linked)
                }
            }
        }
    }

    /// Host rows linked to at least one tag satisfying `condition`
    fn linked_where(&self, binding: &FieldBinding, condition: SimpleExpr) -> SimpleExpr {
        let tag_table = Alias::new(&binding.tag_table);
        match binding.kind {
            FieldKind::Single => {
                let ids = Query::select()
                    .column((tag_table.clone(), TagColumn::Id))
                    .from(tag_table)
                    .and_where(condition)
                    .to_owned();
                Expr::col((self.host(), Alias::new(binding.fk_column()))).in_subquery(ids)
            }
            FieldKind::Multi => {
                let join_table = Alias::new(binding.join_table());
                let entities = Query::select()
                    .column((join_table.clone(), JoinColumn::EntityId))
                    .from(join_table.clone())
                    .inner_join(
                        tag_table.clone(),
                        Expr::col((tag_table, TagColumn::Id))
                            .equals((join_table, JoinColumn::TagId)),
                    )
                    .and_where(condition)
                    .to_owned();
                Expr::col((self.host(), self.pk())).in_subquery(entities)
            }
        }
    }
}

fn matches_nothing() -> SimpleExpr {
    Expr::val(1).eq(0)
}

fn tag_string(value: &Value, key: &str) -> domain::Result<String> {
    match value {
        Value::String(Some(s)) => Ok(s.to_string()),
        Value::String(None) => Ok(String::new()),
        _ => Err(DomainError::MalformedTagString(format!(
            "{} expects a tag string",
            key
        ))),
    }
}

fn string_value(value: &Value, key: &str) -> domain::Result<String> {
    match value {
        Value::String(Some(s)) => Ok(s.to_string()),
        _ => Err(DomainError::InvalidConfiguration(format!(
            "{} expects a string",
            key
        ))),
    }
}

pub(crate) fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub(crate) fn like(column: Expr, pattern: String, insensitive: bool) -> SimpleExpr {
    let pattern = LikeExpr::new(pattern).escape('\\');
    if insensitive {
        Expr::expr(Func::lower(column)).like(pattern)
    } else {
        column.like(pattern)
    }
}

fn compare(column: Expr, op: LookupOp, value: &Value, key: &str) -> domain::Result<SimpleExpr> {
    let condition = match op {
        LookupOp::Exact => match value {
            Value::String(None) | Value::BigInt(None) | Value::Int(None) | Value::Bool(None) => {
                column.is_null()
            }
            _ => column.eq(value.clone()),
        },
        LookupOp::IExact => {
            Expr::expr(Func::lower(column)).eq(string_value(value, key)?.to_lowercase())
        }
        LookupOp::Contains => like(
            column,
            format!("%{}%", escape_like(&string_value(value, key)?)),
            false,
        ),
        LookupOp::IContains => like(
            column,
            format!("%{}%", escape_like(&string_value(value, key)?.to_lowercase())),
            true,
        ),
        LookupOp::StartsWith => like(
            column,
            format!("{}%", escape_like(&string_value(value, key)?)),
            false,
        ),
        LookupOp::IStartsWith => like(
            column,
            format!("{}%", escape_like(&string_value(value, key)?.to_lowercase())),
            true,
        ),
        LookupOp::EndsWith => like(
            column,
            format!("%{}", escape_like(&string_value(value, key)?)),
            false,
        ),
        LookupOp::IEndsWith => like(
            column,
            format!("%{}", escape_like(&string_value(value, key)?.to_lowercase())),
            true,
        ),
        LookupOp::Gt => column.gt(value.clone()),
        LookupOp::Gte => column.gte(value.clone()),
        LookupOp::Lt => column.lt(value.clone()),
        LookupOp::Lte => column.lte(value.clone()),
        LookupOp::IsNull => {
            if matches!(value, Value::Bool(Some(true))) {
                column.is_null()
            } else {
                column.is_not_null()
            }
        }
    };
    Ok(condition)
}
