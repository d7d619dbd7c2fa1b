use std::sync::Arc;

use application::TagRegistry;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::tag::TagRepository;
use infrastructure::{SeaOrmTagRepository, TagFieldConfig, install_schema};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, Statement};
use serde_json::{Value, json};
use tag_server::{api, setup_app_state, state::AppState};
use tower::ServiceExt;

const CONFIG: &str = r#"
[[models]]
app = "blog"
name = "post"
table = "posts"

[[models.fields]]
name = "tags"
kind = "multi"
options = { autocomplete_limit = 2 }

[[models.fields]]
name = "title"
kind = "single"
options = { force_lowercase = true, autocomplete_view_fulltext = true }
"#;

async fn state() -> Arc<AppState> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT)",
    ))
    .await
    .unwrap();

    let config = TagFieldConfig::from_toml_str(CONFIG).unwrap();
    let registry = TagRegistry::from_config(&config.models).unwrap();
    install_schema(&db, &registry.schema()).await.unwrap();

    for (table, names) in [
        ("tag_posts_tags", vec!["Python", "pylons", "pyramid", "rust"]),
        ("tag_posts_title", vec!["doctor", "professor"]),
    ] {
        let store = SeaOrmTagRepository::new(&db, registry.table(table).unwrap());
        for name in names {
            store.get_or_create(name, false).await.unwrap();
        }
    }

    setup_app_state(Arc::new(registry), db)
}

async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = api::create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_autocomplete_pages_prefix_matches() {
    let state = state().await;

    let (status, body) = get(state.clone(), "/autocomplete/blog/post/tags?q=PY").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "results": ["Python", "pylons"], "more": true }));

    let (_, body) = get(state, "/autocomplete/blog/post/tags?q=py&p=2").await;
    assert_eq!(body, json!({ "results": ["pyramid"], "more": false }));
}

#[tokio::test]
async fn test_autocomplete_without_query_lists_everything() {
    let state = state().await;
    let (_, body) = get(state, "/autocomplete/blog/post/title").await;
    assert_eq!(body, json!({ "results": ["doctor", "professor"], "more": false }));
}

#[tokio::test]
async fn test_autocomplete_fulltext_matches_anywhere() {
    let state = state().await;
    let (_, body) = get(state, "/autocomplete/blog/post/title?q=SSOR").await;
    assert_eq!(body, json!({ "results": ["professor"], "more": false }));
}

#[tokio::test]
async fn test_unknown_field_is_not_found() {
    let state = state().await;
    let (status, body) = get(state, "/autocomplete/blog/post/missing?q=a").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("blog.post.missing"));
}
