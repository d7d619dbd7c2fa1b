//! Shared fixtures for the SQLite integration tests
#![allow(dead_code)]

use std::sync::Arc;

use application::{TagRegistry, TaggedModel};
use domain::Tag;
use domain::tag::{TagLinkRepository, TagRepository};
use infrastructure::{SeaOrmLinkRepository, SeaOrmTagRepository, TagFieldConfig, install_schema};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};

const CONFIG: &str = r#"
[[models]]
app = "blog"
name = "post"
table = "posts"

[[models.fields]]
name = "tags"
kind = "multi"

[[models.fields]]
name = "title"
kind = "single"
options = { initial = ["Mr", "Mrs"] }

[[models.fields]]
name = "topics"
kind = "multi"
options = { tree = true }
"#;

pub struct App {
    pub db: DatabaseConnection,
    pub registry: Arc<TagRegistry>,
}

pub async fn app() -> App {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("in-memory database");
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, headline TEXT)",
    ))
    .await
    .expect("posts table");

    let config = TagFieldConfig::from_toml_str(CONFIG).expect("config");
    let registry = TagRegistry::from_config(&config.models).expect("registry");
    install_schema(&db, &registry.schema()).await.expect("tag schema");

    App {
        db,
        registry: Arc::new(registry),
    }
}

impl App {
    pub fn posts(&self) -> TaggedModel {
        TaggedModel::new(self.registry.clone(), "blog", "post", self.db.clone()).expect("model")
    }

    pub fn store(&self, field: &str) -> SeaOrmTagRepository<'_, DatabaseConnection> {
        let binding = self
            .registry
            .field(&format!("blog.post.{}", field))
            .expect("field");
        SeaOrmTagRepository::new(&self.db, self.registry.table_for(binding).expect("table"))
    }

    pub async fn tag(&self, field: &str, name: &str) -> Option<Tag> {
        self.store(field).find(name).await.unwrap()
    }

    pub async fn count(&self, field: &str, name: &str) -> Option<i64> {
        self.tag(field, name).await.map(|t| t.count)
    }

    /// Every stored count equals the number of references to the tag
    pub async fn assert_counts_match_references(&self) {
        for table in self.registry.tables() {
            let store = SeaOrmTagRepository::new(&self.db, table);
            for tag in store.all().await.unwrap() {
                let mut references = 0;
                for field in self.registry.fields_for_table(&table.name) {
                    let links = SeaOrmLinkRepository::new(&self.db, field.as_ref());
                    references += links.reference_count(tag.id.unwrap()).await.unwrap();
                }
                assert_eq!(tag.count, references, "count of {} in {}", tag.name, table.name);
            }
        }
    }
}
