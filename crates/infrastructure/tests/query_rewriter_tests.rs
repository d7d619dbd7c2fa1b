//! Tag-aware host queries against an in-memory SQLite database

mod common;

use common::{Fixture, fixture};
use domain::{DomainError, TagOptions};
use infrastructure::TagQuery;

/// one {x, y}, two {x, y, z}, three {x}, four {}
async fn tagged_posts() -> (Fixture, [i64; 4]) {
    let fx = fixture(TagOptions::new()).await;
    let one = fx.insert_post("one").await;
    let two = fx.insert_post("two").await;
    let three = fx.insert_post("three").await;
    let four = fx.insert_post("four").await;
    fx.tag_post("tags", one, &["x", "y"]).await;
    fx.tag_post("tags", two, &["x", "y", "z"]).await;
    fx.tag_post("tags", three, &["x"]).await;
    fx.tag_post("title_tag", one, &["Mr"]).await;
    (fx, [one, two, three, four])
}

#[tokio::test]
async fn test_tag_string_matches_exact_set() {
    let (fx, [one, _, three, four]) = tagged_posts().await;
    let query = |key: &str, value: &str| {
        TagQuery::new(&fx.model).filter(key, value.to_string()).unwrap()
    };

    assert_eq!(query("tags", "x, y").fetch_pks(&fx.db).await.unwrap(), vec![one]);
    assert_eq!(query("tags", "Y X").fetch_pks(&fx.db).await.unwrap(), vec![one]);
    assert_eq!(query("tags__exact", "x").fetch_pks(&fx.db).await.unwrap(), vec![three]);
    assert_eq!(query("tags", "").fetch_pks(&fx.db).await.unwrap(), vec![four]);
    assert_eq!(query("tags", "x, q").count(&fx.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_exclude_removes_exact_matches_only() {
    let (fx, [_, two, three, four]) = tagged_posts().await;
    let pks = TagQuery::new(&fx.model)
        .exclude("tags", "x, y".to_string())
        .unwrap()
        .fetch_pks(&fx.db)
        .await
        .unwrap();
    assert_eq!(pks, vec![two, three, four]);
}

#[tokio::test]
async fn test_column_lookups_fall_through_to_tag_rows() {
    let (fx, [one, two, three, four]) = tagged_posts().await;

    let pks = TagQuery::new(&fx.model)
        .filter("tags__name", "z".to_string())
        .unwrap()
        .fetch_pks(&fx.db)
        .await
        .unwrap();
    assert_eq!(pks, vec![two]);

    let pks = TagQuery::new(&fx.model)
        .filter("tags__name__icontains", "Z".to_string())
        .unwrap()
        .fetch_pks(&fx.db)
        .await
        .unwrap();
    assert_eq!(pks, vec![two]);

    let pks = TagQuery::new(&fx.model)
        .filter("tags__count__gte", 2i64)
        .unwrap()
        .fetch_pks(&fx.db)
        .await
        .unwrap();
    assert_eq!(pks, vec![one, two, three]);

    let pks = TagQuery::new(&fx.model)
        .filter("tags__isnull", true)
        .unwrap()
        .fetch_pks(&fx.db)
        .await
        .unwrap();
    assert_eq!(pks, vec![four]);

    let pks = TagQuery::new(&fx.model)
        .filter("tags__name", "x".to_string())
        .unwrap()
        .exclude("tags", "x".to_string())
        .unwrap()
        .filter("title__startswith", "t".to_string())
        .unwrap()
        .fetch_pks(&fx.db)
        .await
        .unwrap();
    assert_eq!(pks, vec![two]);
}

#[tokio::test]
async fn test_single_tag_string_is_case_sensitive_when_configured() {
    let (fx, [one, two, three, four]) = tagged_posts().await;
    let query = |value: &str| {
        TagQuery::new(&fx.model)
            .filter("title_tag", value.to_string())
            .unwrap()
    };

    assert_eq!(query("Mr").fetch_pks(&fx.db).await.unwrap(), vec![one]);
    assert!(query("mr").fetch_pks(&fx.db).await.unwrap().is_empty());
    assert_eq!(query("").fetch_pks(&fx.db).await.unwrap(), vec![two, three, four]);
}

#[tokio::test]
async fn test_unresolvable_lookups_are_rejected() {
    let (fx, _) = tagged_posts().await;
    assert!(matches!(
        TagQuery::new(&fx.model).filter("tags__colour", "red".to_string()),
        Err(DomainError::UnknownField(_))
    ));
    assert!(matches!(
        TagQuery::new(&fx.model).filter("author__name", "ann".to_string()),
        Err(DomainError::UnknownField(_))
    ));
}

#[tokio::test]
async fn test_tag_string_matches_non_ascii_names() {
    let fx = fixture(TagOptions::new()).await;
    let one = fx.insert_post("one").await;
    let two = fx.insert_post("two").await;
    fx.tag_post("tags", one, &["CAFÉ"]).await;
    fx.tag_post("tags", two, &["CAFÉ", "Ärger"]).await;
    fx.tag_post("title_tag", one, &["Señor"]).await;

    let query = |key: &str, value: &str| {
        TagQuery::new(&fx.model).filter(key, value.to_string()).unwrap()
    };
    assert_eq!(query("tags", "CAFÉ").fetch_pks(&fx.db).await.unwrap(), vec![one]);
    assert_eq!(query("tags", "café").fetch_pks(&fx.db).await.unwrap(), vec![one]);
    assert_eq!(query("tags", "ärger, Café").fetch_pks(&fx.db).await.unwrap(), vec![two]);
    assert_eq!(query("title_tag", "Señor").fetch_pks(&fx.db).await.unwrap(), vec![one]);

    let pks = TagQuery::new(&fx.model)
        .exclude("tags", "café".to_string())
        .unwrap()
        .fetch_pks(&fx.db)
        .await
        .unwrap();
    assert_eq!(pks, vec![two]);
}
