use prov_files::FilesError;
use prov_types::ContentHash;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no catalog entry matches {query}")]
    NotFound { query: String },
    #[error("{count} catalog entries match {query}: {listing}", count = .matches.len(), listing = .matches.join(", "))]
    AmbiguousMatch { query: String, matches: Vec<String> },
    #[error(
        "hash mismatch for {path}: recorded {expected}, calculated {actual}",
        path = .path.display()
    )]
    HashMismatch {
        path: PathBuf,
        expected: ContentHash,
        actual: ContentHash,
    },
    #[error("session is closed")]
    SessionClosed,

    #[error("file layer error: {0}")]
    Files(#[from] FilesError),
    #[error("failed to read {path}: {source}", path = .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}", path = .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write access log {path}: {source}", path = .path.display())]
    AccessLogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
}

pub type ProvenanceResult<T> = std::result::Result<T, ProvenanceError>;
