//! Flat tag table storage against an in-memory SQLite database

mod common;

use common::fixture;
use domain::tag::{TagLinkRepository, TagRepository};
use domain::{DomainError, TagOptions};
use infrastructure::{SeaOrmLinkRepository, SeaOrmTagRepository};

#[tokio::test]
async fn test_get_or_create_is_idempotent_and_case_folded() {
    let fx = fixture(TagOptions::new()).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);

    let created = store.get_or_create("Django", false).await.unwrap();
    assert_eq!(created.count, 0);
    assert_eq!(created.slug, "django");
    assert!(!created.protected);

    let again = store.get_or_create("django", false).await.unwrap();
    assert_eq!(again.id, created.id);
    assert_eq!(store.find("DJANGO").await.unwrap().unwrap().name, "Django");
    assert!(store.find("flask").await.unwrap().is_none());
    assert!(store.find("  ").await.unwrap().is_none());
}

#[tokio::test]
async fn test_slug_collisions_get_numbered_suffix() {
    let fx = fixture(TagOptions::new().with_case_sensitive(true)).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);

    let first = store.get_or_create("Foo Bar", false).await.unwrap();
    let second = store.get_or_create("foo bar", false).await.unwrap();
    let third = store.get_or_create("FOO BAR", false).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.slug, "foo-bar");
    assert_eq!(second.slug, "foo-bar_1");
    assert_eq!(third.slug, "foo-bar_2");
    assert_eq!(store.find("foo bar").await.unwrap().unwrap().id, second.id);
}

#[tokio::test]
async fn test_decrement_to_zero_deletes_unless_protected() {
    let fx = fixture(TagOptions::new()).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);

    let rust = store.get_or_create("rust", false).await.unwrap();
    let id = rust.id.unwrap();
    assert_eq!(store.increment(id).await.unwrap().count, 1);
    assert!(store.decrement(id).await.unwrap().is_none());
    assert!(store.find("rust").await.unwrap().is_none());

    let go = store.get_or_create("go", true).await.unwrap();
    let id = go.id.unwrap();
    store.increment(id).await.unwrap();
    let kept = store.decrement(id).await.unwrap().unwrap();
    assert_eq!(kept.count, 0);
    assert!(kept.protected);

    // Count never goes below zero
    let kept = store.decrement(id).await.unwrap().unwrap();
    assert_eq!(kept.count, 0);

    assert!(store.set_protected(id, false).await.unwrap().is_none());
}

#[tokio::test]
async fn test_protect_all_keeps_zero_count_rows() {
    let fx = fixture(TagOptions::new().with_protect_all(true)).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);

    let tag = store.get_or_create("keep", false).await.unwrap();
    let id = tag.id.unwrap();
    store.increment(id).await.unwrap();
    assert!(store.decrement(id).await.unwrap().is_some());
    assert!(!store.try_delete(id).await.unwrap());
}

#[tokio::test]
async fn test_multi_links_and_recount() {
    let fx = fixture(TagOptions::new()).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);
    let links = SeaOrmLinkRepository::new(&fx.db, fx.field("tags"));
    let one = fx.insert_post("one").await;
    let two = fx.insert_post("two").await;

    let id = store.get_or_create("rust", false).await.unwrap().id.unwrap();
    links.link(one, id).await.unwrap();
    links.link(two, id).await.unwrap();
    links.link(one, id).await.unwrap();

    assert_eq!(links.entities_for(id).await.unwrap(), vec![one, two]);
    assert_eq!(links.reference_count(id).await.unwrap(), 2);
    assert_eq!(store.recount(id).await.unwrap().unwrap().count, 2);

    links.unlink(one, id).await.unwrap();
    assert!(links.linked_tags(one).await.unwrap().is_empty());
    let names: Vec<String> = links
        .linked_tags(two)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["rust"]);
    assert_eq!(store.recount(id).await.unwrap().unwrap().count, 1);
}

#[tokio::test]
async fn test_single_link_replaces_previous_reference() {
    let fx = fixture(TagOptions::new()).await;
    let table = fx.table("title_tag");
    let store = SeaOrmTagRepository::new(&fx.db, &table);
    let links = SeaOrmLinkRepository::new(&fx.db, fx.field("title_tag"));
    let post = fx.insert_post("one").await;

    let mr = store.get_or_create("Mr", false).await.unwrap().id.unwrap();
    let mrs = store.get_or_create("Mrs", false).await.unwrap().id.unwrap();

    links.link(post, mr).await.unwrap();
    links.link(post, mrs).await.unwrap();
    let linked = links.linked_tags(post).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].name, "Mrs");

    // Unlinking a tag the row no longer holds leaves it alone
    links.unlink(post, mr).await.unwrap();
    assert_eq!(links.linked_tags(post).await.unwrap().len(), 1);

    assert!(store.recount(mr).await.unwrap().is_none());
    assert_eq!(store.recount(mrs).await.unwrap().unwrap().count, 1);

    links.unlink(post, mrs).await.unwrap();
    assert!(links.linked_tags(post).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rename_flat_tag() {
    let fx = fixture(TagOptions::new()).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);

    let id = store.get_or_create("rust", false).await.unwrap().id.unwrap();
    store.get_or_create("go", false).await.unwrap();

    let renamed = store.rename(id, "Rust Lang").await.unwrap();
    assert_eq!(renamed.name, "Rust Lang");
    assert_eq!(renamed.slug, "rust-lang");

    assert_eq!(
        store.rename(id, "GO").await.unwrap_err(),
        DomainError::DuplicateTag("GO".into())
    );
}

#[tokio::test]
async fn test_weighted_and_autocomplete() {
    let fx = fixture(TagOptions::new().with_autocomplete_limit(2)).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);

    for name in ["django", "djangorest", "dj-tools", "flask"] {
        store.get_or_create(name, false).await.unwrap();
    }
    let django = store.find("django").await.unwrap().unwrap().id.unwrap();
    let flask = store.find("flask").await.unwrap().unwrap().id.unwrap();
    store.set_count(django, 4).await.unwrap();
    store.set_count(flask, 1).await.unwrap();

    let weights: Vec<(String, i64)> = store
        .weighted(1, 6)
        .await
        .unwrap()
        .into_iter()
        .filter(|w| w.tag.count > 0)
        .map(|w| (w.tag.name, w.weight))
        .collect();
    assert_eq!(weights, vec![("django".into(), 6), ("flask".into(), 2)]);

    let page = store.autocomplete("DJ", 1).await.unwrap();
    assert_eq!(page.results, vec!["dj-tools", "django"]);
    assert!(page.more);

    let page = store.autocomplete("DJ", 2).await.unwrap();
    assert_eq!(page.results, vec!["djangorest"]);
    assert!(!page.more);
}

#[tokio::test]
async fn test_autocomplete_filters_in_sql_without_losing_matches() {
    let fx = fixture(TagOptions::new().with_autocomplete_limit(1)).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);

    for name in ["100%", "100 percent", "a_b", "axb", "eagle", "Éclair", "élan"] {
        store.get_or_create(name, false).await.unwrap();
    }

    let page = store.autocomplete("É", 1).await.unwrap();
    assert_eq!(page.results, vec!["Éclair"]);
    assert!(page.more);
    let page = store.autocomplete("é", 2).await.unwrap();
    assert_eq!(page.results, vec!["élan"]);
    assert!(!page.more);

    let page = store.autocomplete("100%", 1).await.unwrap();
    assert_eq!(page.results, vec!["100%"]);
    assert!(!page.more);
    let page = store.autocomplete("A_", 1).await.unwrap();
    assert_eq!(page.results, vec!["a_b"]);
    assert!(!page.more);

    let page = store.autocomplete("", 3).await.unwrap();
    assert_eq!(page.results, vec!["a_b"]);
    assert!(page.more);

    let table = fx.table("title_tag");
    let titles = SeaOrmTagRepository::new(&fx.db, &table);
    for name in ["Dr", "dr-who", "Drake", "Mr"] {
        titles.get_or_create(name, false).await.unwrap();
    }
    let page = titles.autocomplete("Dr", 1).await.unwrap();
    assert_eq!(page.results, vec!["Dr", "Drake"]);
    assert!(!page.more);
}

#[tokio::test]
async fn test_initial_lists_seeded_names() {
    let fx = fixture(TagOptions::new().with_initial(["Mr", "Mrs"])).await;
    let table = fx.table("tags");
    let store = SeaOrmTagRepository::new(&fx.db, &table);

    assert!(store.initial().await.unwrap().is_empty());
    store.get_or_create("mr", true).await.unwrap();
    store.get_or_create("other", false).await.unwrap();

    let initial = store.initial().await.unwrap();
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].name, "mr");
}
