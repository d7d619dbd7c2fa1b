//! Shared fixtures for the SQLite integration tests
#![allow(dead_code)]

use std::sync::Arc;

use domain::tag::{TagLinkRepository, TagRepository};
use domain::{FieldBinding, FieldKind, ModelBinding, TagOptions, TagTable};
use infrastructure::{SeaOrmLinkRepository, SeaOrmTagRepository, install_schema, tag_schema};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};

pub struct Fixture {
    pub db: DatabaseConnection,
    pub model: ModelBinding,
}

impl Fixture {
    pub fn field(&self, name: &str) -> &FieldBinding {
        self.model.field(name).expect("bound field")
    }

    pub fn table(&self, field: &str) -> TagTable {
        let binding = self.field(field);
        TagTable::from_fields(&binding.tag_table, &[binding]).expect("tag table")
    }

    /// Insert a host row and return its primary key
    pub async fn insert_post(&self, title: &str) -> i64 {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                "INSERT INTO posts (title) VALUES (?) RETURNING id",
                [title.into()],
            ))
            .await
            .expect("insert post")
            .expect("returned row");
        row.try_get("", "id").expect("id column")
    }

    /// Link `names` to a post the way a manager would: create, link, count
    pub async fn tag_post(&self, field: &str, post: i64, names: &[&str]) {
        let binding = self.field(field);
        let table = self.table(field);
        let store = SeaOrmTagRepository::new(&self.db, &table);
        let links = SeaOrmLinkRepository::new(&self.db, binding);
        for name in names {
            let tag = store.get_or_create(name, false).await.unwrap();
            let id = tag.id.unwrap();
            links.link(post, id).await.unwrap();
            store.increment(id).await.unwrap();
        }
    }
}

/// Posts with a flat multi-tag field, a tree multi-tag field and a
/// single-tag field, on an in-memory database
pub async fn fixture(tags: TagOptions) -> Fixture {
    // Every pooled connection would otherwise get its own empty database
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("in-memory database");
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL)",
    ))
    .await
    .expect("posts table");

    let fields = vec![
        Arc::new(FieldBinding::new("blog", "post", "posts", "tags", FieldKind::Multi, tags)),
        Arc::new(FieldBinding::new(
            "blog",
            "post",
            "posts",
            "topics",
            FieldKind::Multi,
            TagOptions::tree(),
        )),
        Arc::new(FieldBinding::new(
            "blog",
            "post",
            "posts",
            "title_tag",
            FieldKind::Single,
            TagOptions::new().with_case_sensitive(true),
        )),
    ];
    install_schema(&db, &tag_schema(&fields))
        .await
        .expect("tag schema");

    Fixture {
        db,
        model: ModelBinding {
            app: "blog".into(),
            name: "post".into(),
            table: "posts".into(),
            primary_key: "id".into(),
            fields,
        },
    }
}
