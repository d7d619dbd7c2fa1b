use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Malformed tag string: {0}")]
    MalformedTagString(String),

    #[error("Too many tags: at most {max} allowed, got {count}")]
    TooManyTags { max: usize, count: usize },

    #[error("Tag tree cycle: {0}")]
    TagTreeCycle(String),

    #[error("{0} needs to be saved before its tag field can use the database")]
    UnsavedEntityOperation(String),

    #[error("Unknown tag field: {0}")]
    UnknownField(String),

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("Tag already exists: {0}")]
    DuplicateTag(String),

    #[error("Invalid tag configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
