use std::path::Path;

use thiserror::Error;

use crate::db::ContentSnapshot;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid seed file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads a JSON `ContentSnapshot` (official topics, scans, questions and
/// study material) from disk.
pub fn load_seed_file(path: impl AsRef<Path>) -> Result<ContentSnapshot, SeedError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let snapshot: ContentSnapshot =
        serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    tracing::info!(
        path = %path.display(),
        topics = snapshot.topics.len(),
        sources = snapshot.sources.len(),
        questions = snapshot.questions.len(),
        "seed content loaded"
    );

    Ok(snapshot)
}
