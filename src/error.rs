use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds, grouped by how a caller is expected to react rather than
/// by which internal operation produced them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open vault for owner {owner_id} at {path}: {source}")]
    VaultOpen {
        owner_id: u64,
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("schema migration failed: {0}")]
    Migration(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} enrichment failed: {source}")]
    Enrichment {
        stage: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{stage} timed out after {budget_secs}s")]
    Timeout { stage: &'static str, budget_secs: u64 },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn enrichment(
        stage: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Enrichment {
            stage,
            source: Box::new(source),
        }
    }
}
