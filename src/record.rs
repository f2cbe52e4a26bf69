//! `record` collaborator (spec §6): writes the hash-store entries the
//! verifier (C1) reads at runtime. Deliberately thin — out of core scope.

use crate::verify::{hash_file, HashStore};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{0}")]
    Verification(#[from] crate::error::VerificationError),

    #[error("{path} already has a recorded hash that differs; pass --force to overwrite")]
    AlreadyRecorded { path: PathBuf },

    #[error("failed to write hash-store entry for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Record (or overwrite, with `force`) the hash of `file` under `store_dir`.
pub async fn record_one(store_dir: &Path, file: &Path, force: bool) -> Result<(), RecordError> {
    let canonical = crate::path_resolve::resolve(&file.to_string_lossy())
        .map_err(RecordError::Verification)?;
    let digest = hash_file(&canonical).await.map_err(RecordError::Verification)?;

    tokio::fs::create_dir_all(store_dir)
        .await
        .map_err(|source| RecordError::Io {
            path: store_dir.to_path_buf(),
            source,
        })?;

    let store = HashStore::new(store_dir);
    let entry_path = store_dir.join(HashStore::filename_for(&canonical));

    if !force {
        if let Ok(existing) = store.recorded_hash(&canonical).await {
            if existing != digest {
                return Err(RecordError::AlreadyRecorded {
                    path: canonical.clone(),
                });
            }
        }
    }

    tokio::fs::write(&entry_path, format!("{digest}\n"))
        .await
        .map_err(|source| RecordError::Io {
            path: entry_path.clone(),
            source,
        })?;

    tracing::info!(path = %canonical.display(), digest = %digest, "recorded hash");
    Ok(())
}

/// Record every file in `files`, stopping at the first failure.
pub async fn record_all(store_dir: &Path, files: &[PathBuf], force: bool) -> Result<(), RecordError> {
    for file in files {
        record_one(store_dir, file, force).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_rereads_hash() {
        let dir = std::env::temp_dir().join(format!("scr-record-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file = dir.join("target");
        tokio::fs::write(&file, b"payload").await.unwrap();
        let store_dir = dir.join("store");

        record_one(&store_dir, &file, false).await.unwrap();

        let store = HashStore::new(&store_dir);
        let canonical = crate::path_resolve::resolve(&file.to_string_lossy()).unwrap();
        let recorded = store.recorded_hash(&canonical).await.unwrap();
        let actual = hash_file(&canonical).await.unwrap();
        assert_eq!(recorded, actual);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn differing_rerecord_without_force_is_rejected() {
        let dir = std::env::temp_dir().join(format!("scr-record-test2-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file = dir.join("target");
        tokio::fs::write(&file, b"v1").await.unwrap();
        let store_dir = dir.join("store");
        record_one(&store_dir, &file, false).await.unwrap();

        tokio::fs::write(&file, b"v2-different").await.unwrap();
        let err = record_one(&store_dir, &file, false).await.unwrap_err();
        assert!(matches!(err, RecordError::AlreadyRecorded { .. }));

        record_one(&store_dir, &file, true).await.unwrap();

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
