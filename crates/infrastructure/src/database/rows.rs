use domain::tag::{Tag, TreeFields};
use migration::TagColumn;
use sea_orm::QueryResult;
use sea_orm::sea_query::{Alias, SelectStatement};

use crate::database::db_err;

pub(crate) fn flat_columns() -> [TagColumn; 5] {
    [
        TagColumn::Id,
        TagColumn::Name,
        TagColumn::Slug,
        TagColumn::Count,
        TagColumn::Protected,
    ]
}

pub(crate) fn tree_columns() -> [TagColumn; 4] {
    [
        TagColumn::ParentId,
        TagColumn::Label,
        TagColumn::Level,
        TagColumn::Path,
    ]
}

/// Add the tag columns of `table`, qualified by `alias`, to a select
pub(crate) fn select_tag_columns(select: &mut SelectStatement, alias: &Alias, tree: bool) {
    for column in flat_columns() {
        select.column((alias.clone(), column));
    }
    if tree {
        for column in tree_columns() {
            select.column((alias.clone(), column));
        }
    }
}

pub(crate) fn tag_from_row(row: &QueryResult, tree: bool) -> domain::Result<Tag> {
    let tree_fields = if tree {
        Some(TreeFields {
            parent_id: row.try_get("", "parent_id").map_err(db_err)?,
            label: row.try_get("", "label").map_err(db_err)?,
            level: row.try_get("", "level").map_err(db_err)?,
            path: row.try_get("", "path").map_err(db_err)?,
        })
    } else {
        None
    };

    Ok(Tag {
        id: Some(row.try_get("", "id").map_err(db_err)?),
        name: row.try_get("", "name").map_err(db_err)?,
        slug: row.try_get("", "slug").map_err(db_err)?,
        count: row.try_get("", "count").map_err(db_err)?,
        protected: row.try_get("", "protected").map_err(db_err)?,
        tree: tree_fields,
    })
}
