use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocProofError {
    #[error("Content error: {0}")]
    Content(String),

    #[error("Context '{name}' is not registered (available: {available})")]
    ContextNotFound { name: String, available: String },

    #[error("Database '{0}' does not exist")]
    DatabaseNotFound(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DocProofError>;
