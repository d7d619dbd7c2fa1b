use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::tag::parser::{clean_tree_name, parse_tags};

pub const DEFAULT_MAX_LENGTH: usize = 255;
pub const DEFAULT_AUTOCOMPLETE_LIMIT: u64 = 100;

/// Effective tag field policy
///
/// Built once when a field is bound and never mutated afterwards; the
/// `with_*` methods consume and return a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagOptions {
    initial: Vec<String>,
    protect_initial: bool,
    protect_all: bool,
    case_sensitive: bool,
    force_lowercase: bool,
    max_count: usize,
    max_length: usize,
    tree: bool,
    space_delimiter: Option<bool>,
    autocomplete_limit: u64,
    autocomplete_view_fulltext: bool,
    autocomplete_settings: Option<serde_json::Value>,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            initial: Vec::new(),
            protect_initial: true,
            protect_all: false,
            case_sensitive: false,
            force_lowercase: false,
            max_count: 0,
            max_length: DEFAULT_MAX_LENGTH,
            tree: false,
            space_delimiter: None,
            autocomplete_limit: DEFAULT_AUTOCOMPLETE_LIMIT,
            autocomplete_view_fulltext: false,
            autocomplete_settings: None,
        }
    }
}

impl TagOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree() -> Self {
        Self {
            tree: true,
            ..Self::default()
        }
    }

    pub fn with_initial<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_protect_initial(mut self, protect: bool) -> Self {
        self.protect_initial = protect;
        self
    }

    pub fn with_protect_all(mut self, protect: bool) -> Self {
        self.protect_all = protect;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_force_lowercase(mut self, force_lowercase: bool) -> Self {
        self.force_lowercase = force_lowercase;
        self
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_space_delimiter(mut self, space_delimiter: bool) -> Self {
        self.space_delimiter = Some(space_delimiter);
        self
    }

    pub fn with_autocomplete_limit(mut self, limit: u64) -> Self {
        self.autocomplete_limit = limit;
        self
    }

    pub fn with_autocomplete_view_fulltext(mut self, fulltext: bool) -> Self {
        self.autocomplete_view_fulltext = fulltext;
        self
    }

    pub fn initial(&self) -> &[String] {
        &self.initial
    }

    pub fn protect_initial(&self) -> bool {
        self.protect_initial
    }

    pub fn protect_all(&self) -> bool {
        self.protect_all
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn force_lowercase(&self) -> bool {
        self.force_lowercase
    }

    /// Maximum number of tags on a multi-tag field; 0 means unlimited
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn is_tree(&self) -> bool {
        self.tree
    }

    /// Whitespace separates tags unless configured otherwise; off by default for trees
    pub fn space_delimiter(&self) -> bool {
        self.space_delimiter.unwrap_or(!self.tree)
    }

    pub fn autocomplete_limit(&self) -> u64 {
        self.autocomplete_limit
    }

    pub fn autocomplete_view_fulltext(&self) -> bool {
        self.autocomplete_view_fulltext
    }

    pub fn autocomplete_settings(&self) -> Option<&serde_json::Value> {
        self.autocomplete_settings.as_ref()
    }

    /// Apply an override on top of these options
    ///
    /// Each option is taken from `extra` when present there, otherwise from
    /// `self`. A string `initial` is parsed under the merged options.
    pub fn merge(&self, extra: &TagOptionsOverride) -> Result<TagOptions> {
        let mut merged = self.clone();
        if let Some(v) = extra.protect_initial {
            merged.protect_initial = v;
        }
        if let Some(v) = extra.protect_all {
            merged.protect_all = v;
        }
        if let Some(v) = extra.case_sensitive {
            merged.case_sensitive = v;
        }
        if let Some(v) = extra.force_lowercase {
            merged.force_lowercase = v;
        }
        if let Some(v) = extra.max_count {
            merged.max_count = v;
        }
        if let Some(v) = extra.max_length {
            merged.max_length = v;
        }
        if let Some(v) = extra.tree {
            merged.tree = v;
        }
        if extra.space_delimiter.is_some() {
            merged.space_delimiter = extra.space_delimiter;
        }
        if let Some(v) = extra.autocomplete_limit {
            merged.autocomplete_limit = v;
        }
        if let Some(v) = extra.autocomplete_view_fulltext {
            merged.autocomplete_view_fulltext = v;
        }
        if extra.autocomplete_settings.is_some() {
            merged.autocomplete_settings = extra.autocomplete_settings.clone();
        }
        match &extra.initial {
            Some(InitialTags::String(s)) => {
                merged.initial = parse_tags(s, &merged)?;
            }
            Some(InitialTags::List(names)) => {
                merged.initial = names.clone();
            }
            None => {}
        }
        Ok(merged)
    }

    /// Clean a raw tag name for storage and comparison
    ///
    /// Trims whitespace, tidies tree segments and applies `force_lowercase`.
    /// Returns `None` for names that are empty after cleaning.
    pub fn normalize_name(&self, raw: &str) -> Result<Option<String>> {
        let mut name = if self.tree {
            clean_tree_name(raw)
        } else {
            raw.trim().to_string()
        };
        if name.is_empty() {
            return Ok(None);
        }
        if self.force_lowercase {
            name = name.to_lowercase();
        }
        if name.chars().count() > self.max_length {
            return Err(DomainError::MalformedTagString(format!(
                "Tag \"{}\" is longer than {} characters",
                name, self.max_length
            )));
        }
        Ok(Some(name))
    }

    /// Key used when comparing names under this field's case policy
    pub fn compare_key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    pub fn names_match(&self, a: &str, b: &str) -> bool {
        self.compare_key(a) == self.compare_key(b)
    }
}

/// Initial tags may be configured as a tag string or as a list of names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialTags {
    String(String),
    List(Vec<String>),
}

/// Partial options, as read from configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagOptionsOverride {
    pub initial: Option<InitialTags>,
    pub protect_initial: Option<bool>,
    pub protect_all: Option<bool>,
    pub case_sensitive: Option<bool>,
    pub force_lowercase: Option<bool>,
    pub max_count: Option<usize>,
    pub max_length: Option<usize>,
    pub tree: Option<bool>,
    pub space_delimiter: Option<bool>,
    pub autocomplete_limit: Option<u64>,
    pub autocomplete_view_fulltext: Option<bool>,
    pub autocomplete_settings: Option<serde_json::Value>,
}
