use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// The entity does not exist, or the caller may not read it. Callers
    /// cannot tell the two apart.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error(
        "Still in use by projects [{}] with names [{}]",
        .projects.join(", "),
        .names.join(", ")
    )]
    Conflict {
        projects: Vec<String>,
        names: Vec<String>,
    },

    #[error("Sorting by '{0}' is not supported")]
    SortNotSupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CatalogError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
