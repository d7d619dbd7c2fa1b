use std::sync::Arc;

use domain::tag::{SingleTagState, Tag, TagPk, TagRepository};
use domain::{FieldBinding, TagOptions};
use tracing::debug;

/// Tracks the tag held by one single-tag field of one entity instance
///
/// `set` only records the assignment. The host save calls `pre_save` to
/// resolve the tag row and obtain the foreign key, then `post_save` once the
/// host row is written to move the counts.
#[derive(Debug, Clone)]
pub struct SingleTagManager {
    binding: Arc<FieldBinding>,
    state: SingleTagState,
    /// Tag referenced by the stored host row
    actual: Option<Tag>,
    /// Tag resolved by `pre_save`, waiting for `post_save`
    staged: Option<Tag>,
}

impl SingleTagManager {
    pub fn new(binding: Arc<FieldBinding>) -> Self {
        Self {
            binding,
            state: SingleTagState::Clean,
            actual: None,
            staged: None,
        }
    }

    /// Manager for a stored host row referencing `tag`
    pub fn loaded(binding: Arc<FieldBinding>, tag: Option<Tag>) -> Self {
        Self {
            binding,
            state: SingleTagState::Persisted(tag.clone()),
            actual: tag,
            staged: None,
        }
    }

    pub fn binding(&self) -> &FieldBinding {
        &self.binding
    }

    fn options(&self) -> &TagOptions {
        &self.binding.options
    }

    pub fn state(&self) -> &SingleTagState {
        &self.state
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, SingleTagState::Dirty(_))
    }

    /// Assign a tag by name; `None` or an empty name clears the field
    pub fn set(&mut self, name: Option<&str>) -> domain::Result<()> {
        let name = match name {
            Some(raw) => self.options().normalize_name(raw)?,
            None => None,
        };
        self.state = SingleTagState::Dirty(name);
        Ok(())
    }

    /// The persisted tag, or a transient stand-in for an unsaved assignment
    pub fn get(&self) -> Option<Tag> {
        match &self.state {
            SingleTagState::Clean => self.actual.clone(),
            SingleTagState::Persisted(tag) => tag.clone(),
            SingleTagState::Dirty(None) => None,
            SingleTagState::Dirty(Some(name)) => match &self.actual {
                Some(tag) if self.options().names_match(&tag.name, name) => Some(tag.clone()),
                _ => Some(Tag::transient(name.clone(), self.options())),
            },
        }
    }

    pub fn tag_string(&self) -> String {
        self.get().map(|t| t.name).unwrap_or_default()
    }

    /// Resolve the assigned tag and return the foreign key to store
    pub async fn pre_save(&mut self, store: &dyn TagRepository) -> domain::Result<Option<TagPk>> {
        self.staged = match &self.state {
            SingleTagState::Dirty(Some(name)) => Some(store.get_or_create(name, false).await?),
            SingleTagState::Dirty(None) => None,
            SingleTagState::Clean | SingleTagState::Persisted(_) => self.actual.clone(),
        };
        Ok(self.staged.as_ref().and_then(|t| t.id))
    }

    /// Move counts from the previously stored tag to the staged one
    ///
    /// With `raw` set the host row was written out of band, so the affected
    /// rows are recounted instead.
    pub async fn post_save(&mut self, store: &dyn TagRepository, raw: bool) -> domain::Result<()> {
        let staged = self.staged.take();
        let prior = self.actual.take();
        let prior_id = prior.as_ref().and_then(|t| t.id);
        let staged_id = staged.as_ref().and_then(|t| t.id);

        let current = if raw {
            if let Some(id) = prior_id.filter(|id| Some(*id) != staged_id) {
                store.recount(id).await?;
            }
            match staged_id {
                Some(id) => store.recount(id).await?,
                None => None,
            }
        } else if prior_id == staged_id {
            staged
        } else {
            // Increment first so a shared ancestor is never left briefly empty
            let current = match staged_id {
                Some(id) => Some(store.increment(id).await?),
                None => None,
            };
            if let Some(id) = prior_id {
                store.decrement(id).await?;
            }
            current
        };

        debug!(
            field = %self.binding,
            from = ?prior.map(|t| t.name),
            to = ?current.as_ref().map(|t| t.name.as_str()),
            "Saved single tag"
        );
        self.actual = current.clone();
        self.state = SingleTagState::Persisted(current);
        Ok(())
    }

    /// Release the stored tag after the host row is deleted
    pub async fn post_delete(&mut self, store: &dyn TagRepository) -> domain::Result<()> {
        if let Some(id) = self.actual.take().and_then(|t| t.id) {
            store.decrement(id).await?;
        }
        self.staged = None;
        self.state = SingleTagState::Clean;
        Ok(())
    }
}
