use sea_orm_migration::prelude::*;

/// Columns of an auxiliary tag table
#[derive(DeriveIden, Clone, Copy)]
pub enum TagColumn {
    Id,
    Name,
    Slug,
    Count,
    Protected,
    // Tree tables only
    ParentId,
    Label,
    Level,
    Path,
}

/// Columns of a multi-tag join table
#[derive(DeriveIden, Clone, Copy)]
pub enum JoinColumn {
    EntityId,
    TagId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTableDef {
    pub name: String,
    pub tree: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableDef {
    pub name: String,
    pub host_table: String,
    pub host_pk: String,
    pub tag_table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleColumnDef {
    pub host_table: String,
    pub column: String,
}

/// Everything the bound tag fields need in the database
///
/// Host tables are owned by the application and must exist before `up`
/// runs. Every step is skipped when its table or column already exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSchema {
    pub tag_tables: Vec<TagTableDef>,
    pub join_tables: Vec<JoinTableDef>,
    pub single_columns: Vec<SingleColumnDef>,
}

impl TagSchema {
    pub async fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        for table in &self.tag_tables {
            create_tag_table(manager, table).await?;
        }
        for join in &self.join_tables {
            create_join_table(manager, join).await?;
        }
        for column in &self.single_columns {
            add_single_column(manager, column).await?;
        }
        Ok(())
    }

    /// Drop join and tag tables; single-tag columns stay on their host tables
    pub async fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        for join in &self.join_tables {
            manager
                .drop_table(
                    Table::drop()
                        .table(Alias::new(&join.name))
                        .if_exists()
                        .to_owned(),
                )
                .await?;
        }
        for table in &self.tag_tables {
            manager
                .drop_table(
                    Table::drop()
                        .table(Alias::new(&table.name))
                        .if_exists()
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }
}

async fn create_tag_table(manager: &SchemaManager<'_>, def: &TagTableDef) -> Result<(), DbErr> {
    let table = Alias::new(&def.name);
    let mut create = Table::create();
    create
        .table(table.clone())
        .if_not_exists()
        .col(
            ColumnDef::new(TagColumn::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(TagColumn::Name)
                .string_len(255)
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(TagColumn::Slug).string_len(50).not_null())
        .col(
            ColumnDef::new(TagColumn::Count)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(TagColumn::Protected)
                .boolean()
                .not_null()
                .default(false),
        );

    if def.tree {
        create
            .col(ColumnDef::new(TagColumn::ParentId).big_integer().null())
            .col(ColumnDef::new(TagColumn::Label).string_len(255).not_null())
            .col(
                ColumnDef::new(TagColumn::Level)
                    .integer()
                    .not_null()
                    .default(1),
            )
            .col(ColumnDef::new(TagColumn::Path).text().not_null())
            .foreign_key(
                ForeignKey::create()
                    .name(format!("fk_{}_parent", def.name))
                    .from(table.clone(), TagColumn::ParentId)
                    .to(table.clone(), TagColumn::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            );
    }
    manager.create_table(create.to_owned()).await?;

    if def.tree {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(format!("idx_{}_parent_slug", def.name))
                    .table(table.clone())
                    .col(TagColumn::ParentId)
                    .col(TagColumn::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(format!("idx_{}_path", def.name))
                    .table(table)
                    .col(TagColumn::Path)
                    .unique()
                    .to_owned(),
            )
            .await?;
    } else {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(format!("idx_{}_slug", def.name))
                    .table(table)
                    .col(TagColumn::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;
    }
    Ok(())
}

async fn create_join_table(manager: &SchemaManager<'_>, def: &JoinTableDef) -> Result<(), DbErr> {
    let table = Alias::new(&def.name);
    manager
        .create_table(
            Table::create()
                .table(table.clone())
                .if_not_exists()
                .col(
                    ColumnDef::new(JoinColumn::EntityId)
                        .big_integer()
                        .not_null(),
                )
                .col(ColumnDef::new(JoinColumn::TagId).big_integer().not_null())
                .primary_key(
                    Index::create()
                        .col(JoinColumn::EntityId)
                        .col(JoinColumn::TagId),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name(format!("fk_{}_entity", def.name))
                        .from(table.clone(), JoinColumn::EntityId)
                        .to(Alias::new(&def.host_table), Alias::new(&def.host_pk))
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name(format!("fk_{}_tag", def.name))
                        .from(table.clone(), JoinColumn::TagId)
                        .to(Alias::new(&def.tag_table), TagColumn::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .to_owned(),
        )
        .await?;

    manager
        .create_index(
            Index::create()
                .if_not_exists()
                .name(format!("idx_{}_tag", def.name))
                .table(table)
                .col(JoinColumn::TagId)
                .to_owned(),
        )
        .await
}

async fn add_single_column(
    manager: &SchemaManager<'_>,
    def: &SingleColumnDef,
) -> Result<(), DbErr> {
    if manager.has_column(&def.host_table, &def.column).await? {
        return Ok(());
    }
    manager
        .alter_table(
            Table::alter()
                .table(Alias::new(&def.host_table))
                .add_column(ColumnDef::new(Alias::new(&def.column)).big_integer().null())
                .to_owned(),
        )
        .await
}
