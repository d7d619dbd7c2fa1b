use std::sync::Arc;

use domain::tag::{EntityPk, Tag, TagLinkRepository, TagRepository, TagSet};
use domain::{DomainError, FieldBinding, TagOptions};
use tracing::debug;

/// Tags of one multi-tag field on one entity instance
///
/// Assignments are buffered until the host is saved, whether or not the
/// host has a primary key yet. Reads see the buffer when there is one and
/// the last loaded tags otherwise.
#[derive(Debug, Clone)]
pub struct MultiTagManager {
    binding: Arc<FieldBinding>,
    entity: Option<EntityPk>,
    loaded: Vec<Tag>,
    desired: Option<TagSet>,
}

impl MultiTagManager {
    pub fn new(binding: Arc<FieldBinding>) -> Self {
        Self {
            binding,
            entity: None,
            loaded: Vec::new(),
            desired: None,
        }
    }

    pub async fn load(
        binding: Arc<FieldBinding>,
        entity: EntityPk,
        links: &dyn TagLinkRepository,
    ) -> domain::Result<Self> {
        let loaded = links.linked_tags(entity).await?;
        Ok(Self {
            binding,
            entity: Some(entity),
            loaded,
            desired: None,
        })
    }

    pub fn binding(&self) -> &FieldBinding {
        &self.binding
    }

    fn options(&self) -> &TagOptions {
        &self.binding.options
    }

    /// Options for parsing strings that are compared, not assigned
    fn lookup_options(&self) -> TagOptions {
        self.options().clone().with_max_count(0)
    }

    pub fn entity(&self) -> Option<EntityPk> {
        self.entity
    }

    pub fn is_dirty(&self) -> bool {
        self.desired.is_some()
    }

    fn require_entity(&self, operation: &str) -> domain::Result<EntityPk> {
        self.entity.ok_or_else(|| {
            DomainError::UnsavedEntityOperation(format!(
                "{} on {} needs a saved entity",
                operation, self.binding
            ))
        })
    }

    fn current(&self) -> TagSet {
        match &self.desired {
            Some(set) => set.clone(),
            None => TagSet::from_tags(&self.loaded),
        }
    }

    pub fn set_tag_string(&mut self, input: &str) -> domain::Result<()> {
        self.desired = Some(TagSet::parse(input, self.options())?);
        Ok(())
    }

    pub fn set_tag_list<I, S>(&mut self, names: I) -> domain::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.desired = Some(TagSet::from_names(names, self.options())?);
        Ok(())
    }

    pub fn add<I, S>(&mut self, names: I) -> domain::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.desired = Some(self.current().with_added(names, self.options())?);
        Ok(())
    }

    pub fn remove<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.desired = Some(self.current().without(names, self.options()));
    }

    pub fn clear(&mut self) {
        self.desired = Some(TagSet::default());
    }

    pub fn get_tag_string(&self) -> String {
        self.current().render(self.options())
    }

    /// Current tags; names not stored yet come back as transient tags
    pub fn tags(&self) -> Vec<Tag> {
        self.current()
            .names()
            .iter()
            .map(|name| {
                self.loaded
                    .iter()
                    .find(|t| self.options().names_match(&t.name, name))
                    .cloned()
                    .unwrap_or_else(|| Tag::transient(name.clone(), self.options()))
            })
            .collect()
    }

    /// Whether the current tags equal those in `input`, ignoring order
    pub fn matches(&self, input: &str) -> domain::Result<bool> {
        let options = self.lookup_options();
        let other = TagSet::parse(input, &options)?;
        Ok(self.current().matches(&other, &options))
    }

    pub fn contains(&self, name: &str) -> bool {
        match self.options().normalize_name(name) {
            Ok(Some(name)) => self.current().contains(&name, self.options()),
            _ => false,
        }
    }

    /// Drop the buffer and re-read the linked tags
    pub async fn reload(&mut self, links: &dyn TagLinkRepository) -> domain::Result<()> {
        let entity = self.require_entity("reload")?;
        self.loaded = links.linked_tags(entity).await?;
        self.desired = None;
        Ok(())
    }

    /// Write the buffer for an entity that is already saved
    pub async fn save(
        &mut self,
        store: &dyn TagRepository,
        links: &dyn TagLinkRepository,
    ) -> domain::Result<()> {
        let entity = self.require_entity("save")?;
        self.post_save(entity, store, links, false).await
    }

    /// Reconcile the linked tags with the buffer after the host row is written
    pub async fn post_save(
        &mut self,
        entity: EntityPk,
        store: &dyn TagRepository,
        links: &dyn TagLinkRepository,
        raw: bool,
    ) -> domain::Result<()> {
        self.entity = Some(entity);
        let actual = links.linked_tags(entity).await?;

        if raw {
            return self.raw_save(entity, actual, store, links).await;
        }

        let Some(desired) = self.desired.take() else {
            self.loaded = actual;
            return Ok(());
        };

        let diff = desired.diff(&actual, self.options());
        for name in &diff.add {
            let tag = store.get_or_create(name, false).await?;
            let Some(id) = tag.id else { continue };
            links.link(entity, id).await?;
            store.increment(id).await?;
        }
        for tag in &diff.remove {
            let Some(id) = tag.id else { continue };
            links.unlink(entity, id).await?;
            store.decrement(id).await?;
        }
        if !diff.is_empty() {
            debug!(
                field = %self.binding,
                entity,
                added = diff.add.len(),
                removed = diff.remove.len(),
                "Reconciled tags"
            );
        }

        self.loaded = links.linked_tags(entity).await?;
        Ok(())
    }

    /// Links were written out of band; fix the links to the buffer without
    /// deltas, then recount everything touched
    async fn raw_save(
        &mut self,
        entity: EntityPk,
        actual: Vec<Tag>,
        store: &dyn TagRepository,
        links: &dyn TagLinkRepository,
    ) -> domain::Result<()> {
        let mut touched: Vec<i64> = actual.iter().filter_map(|t| t.id).collect();

        if let Some(desired) = self.desired.take() {
            let diff = desired.diff(&actual, self.options());
            for name in &diff.add {
                let tag = store.get_or_create(name, false).await?;
                if let Some(id) = tag.id {
                    links.link(entity, id).await?;
                    touched.push(id);
                }
            }
            for tag in &diff.remove {
                if let Some(id) = tag.id {
                    links.unlink(entity, id).await?;
                }
            }
        }

        for id in touched {
            store.recount(id).await?;
        }
        self.loaded = links.linked_tags(entity).await?;
        Ok(())
    }

    /// Unlink every tag before the host row is deleted
    ///
    /// The unlinked tags stay readable on the manager afterwards.
    pub async fn pre_delete(
        &mut self,
        store: &dyn TagRepository,
        links: &dyn TagLinkRepository,
    ) -> domain::Result<()> {
        let Some(entity) = self.entity else {
            return Ok(());
        };
        let snapshot = links.linked_tags(entity).await?;
        for tag in &snapshot {
            let Some(id) = tag.id else { continue };
            links.unlink(entity, id).await?;
            store.decrement(id).await?;
        }
        self.loaded = snapshot;
        self.desired = None;
        self.entity = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::FieldKind;
    use domain::tag::{MockTagLinkRepository, MockTagRepository, TagPk};
    use mockall::predicate::eq;

    fn binding(options: TagOptions) -> Arc<FieldBinding> {
        Arc::new(FieldBinding::new(
            "blog",
            "post",
            "posts",
            "tags",
            FieldKind::Multi,
            options,
        ))
    }

    fn saved(id: TagPk, name: &str) -> Tag {
        let mut tag = Tag::transient(name, &TagOptions::new());
        tag.id = Some(id);
        tag.count = 1;
        tag
    }

    #[test]
    fn test_unsaved_manager_buffers_assignments() {
        let mut manager = MultiTagManager::new(binding(TagOptions::new()));
        manager.set_tag_string("a,b").unwrap();

        let tags = manager.tags();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "a");
        assert!(tags.iter().all(|t| !t.is_saved()));

        manager.add(["c", "A"]).unwrap();
        assert_eq!(manager.get_tag_string(), "a, b, c");
        manager.remove(["B"]);
        assert_eq!(manager.get_tag_string(), "a, c");
        assert!(manager.contains("C"));
        assert!(manager.matches("c a").unwrap());
        assert!(!manager.matches("a").unwrap());

        manager.clear();
        assert_eq!(manager.get_tag_string(), "");
    }

    #[tokio::test]
    async fn test_reload_requires_saved_entity() {
        let links = MockTagLinkRepository::new();
        let store = MockTagRepository::new();
        let mut manager = MultiTagManager::new(binding(TagOptions::new()));

        assert!(matches!(
            manager.reload(&links).await,
            Err(DomainError::UnsavedEntityOperation(_))
        ));
        assert!(matches!(
            manager.save(&store, &links).await,
            Err(DomainError::UnsavedEntityOperation(_))
        ));
    }

    #[test]
    fn test_max_count_is_enforced_on_assignment() {
        let mut manager = MultiTagManager::new(binding(TagOptions::new().with_max_count(2)));
        assert!(matches!(
            manager.set_tag_string("a, b, c"),
            Err(DomainError::TooManyTags { max: 2, count: 3 })
        ));
        manager.set_tag_string("a, b, A").unwrap();
        assert!(manager.add(["c"]).is_err());
        // Comparisons are not assignments
        assert!(!manager.matches("a, b, c").unwrap());
    }

    #[tokio::test]
    async fn test_post_save_links_added_and_unlinks_removed() {
        let mut links = MockTagLinkRepository::new();
        let mut store = MockTagRepository::new();

        let mut loads = 0;
        links.expect_linked_tags().with(eq(7)).returning(move |_| {
            loads += 1;
            if loads == 1 {
                Ok(vec![saved(1, "a"), saved(2, "b")])
            } else {
                Ok(vec![saved(1, "a"), saved(3, "c")])
            }
        });
        store
            .expect_get_or_create()
            .withf(|name, _| name == "c")
            .times(1)
            .returning(|_, _| Ok(saved(3, "c")));
        links.expect_link().with(eq(7), eq(3)).times(1).returning(|_, _| Ok(()));
        store.expect_increment().with(eq(3)).times(1).returning(|_| Ok(saved(3, "c")));
        links.expect_unlink().with(eq(7), eq(2)).times(1).returning(|_, _| Ok(()));
        store.expect_decrement().with(eq(2)).times(1).returning(|_| Ok(None));

        let mut manager = MultiTagManager::new(binding(TagOptions::new()));
        manager.set_tag_string("A, c").unwrap();
        manager.post_save(7, &store, &links, false).await.unwrap();

        assert_eq!(manager.entity(), Some(7));
        assert!(!manager.is_dirty());
        assert_eq!(manager.get_tag_string(), "a, c");
    }

    #[tokio::test]
    async fn test_raw_post_save_recounts_without_deltas() {
        let mut links = MockTagLinkRepository::new();
        let mut store = MockTagRepository::new();

        links
            .expect_linked_tags()
            .returning(|_| Ok(vec![saved(1, "a")]));
        store.expect_recount().with(eq(1)).times(1).returning(|_| Ok(Some(saved(1, "a"))));
        store.expect_increment().never();
        store.expect_decrement().never();

        let mut manager = MultiTagManager::new(binding(TagOptions::new()));
        manager.post_save(7, &store, &links, true).await.unwrap();
        assert_eq!(manager.get_tag_string(), "a");
    }

    #[tokio::test]
    async fn test_pre_delete_keeps_snapshot() {
        let mut links = MockTagLinkRepository::new();
        let mut store = MockTagRepository::new();

        links
            .expect_linked_tags()
            .returning(|_| Ok(vec![saved(1, "a"), saved(2, "b")]));
        links.expect_unlink().times(2).returning(|_, _| Ok(()));
        store.expect_decrement().times(2).returning(|_| Ok(None));

        let mut manager = MultiTagManager::load(binding(TagOptions::new()), 7, &links)
            .await
            .unwrap();
        manager.pre_delete(&store, &links).await.unwrap();

        assert_eq!(manager.entity(), None);
        assert_eq!(manager.get_tag_string(), "a, b");
    }
}
