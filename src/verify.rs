//! File hasher/verifier (C1).
//!
//! Computes SHA-256 over a file's full byte content and compares it to an
//! entry in the recorded hash store written by the `record` collaborator
//! (spec §6). The teacher has no hashing of its own; the async read loop
//! follows the `BufReader`-based idiom used throughout `process.rs` and
//! `session.rs`.

use crate::allowlist;
use crate::error::VerificationError;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// A read-only view over the on-disk hash store: one file per verified path,
/// named by the base64-url encoding of its canonical absolute path, content
/// = lowercase hex SHA-256.
pub struct HashStore {
    dir: PathBuf,
}

impl HashStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn filename_for(path: &Path) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(path.to_string_lossy().as_bytes())
    }

    pub async fn recorded_hash(&self, canonical_path: &Path) -> Result<String, VerificationError> {
        let entry = self.dir.join(Self::filename_for(canonical_path));
        let contents = tokio::fs::read_to_string(&entry)
            .await
            .map_err(|_| VerificationError::NoRecordedHash {
                path: canonical_path.to_path_buf(),
            })?;
        Ok(contents.trim().to_lowercase())
    }
}

/// Compute the SHA-256 hex digest of a regular file's contents.
pub async fn hash_file(path: &Path) -> Result<String, VerificationError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => VerificationError::Missing {
                path: path.to_path_buf(),
            },
            _ => VerificationError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
    if !meta.is_file() {
        return Err(VerificationError::NotRegularFile {
            path: path.to_path_buf(),
        });
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| VerificationError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|source| VerificationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(encode_hex(&hasher.finalize()))
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Whether `canonical_path` may skip verification because it matches a
/// standard-paths pattern and `verify_standard_paths` is disabled.
#[must_use]
pub fn is_skippable(canonical_path: &Path, verify_standard_paths: bool) -> bool {
    if verify_standard_paths {
        return false;
    }
    allowlist::is_standard_path(&canonical_path.to_string_lossy())
}

/// Verify one file against the hash store, honoring the standard-paths skip.
pub async fn verify(
    store: &HashStore,
    canonical_path: &Path,
    verify_standard_paths: bool,
) -> Result<(), VerificationError> {
    if is_skippable(canonical_path, verify_standard_paths) {
        return Ok(());
    }
    let expected = store.recorded_hash(canonical_path).await?;
    let actual = hash_file(canonical_path).await?;
    if expected != actual {
        return Err(VerificationError::Mismatch {
            path: canonical_path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_file_is_deterministic_and_well_formed() {
        let dir = std::env::temp_dir();
        let file = dir.join(format!("scr-verify-test-{}", std::process::id()));
        tokio::fs::write(&file, b"hello world").await.unwrap();
        let digest_a = hash_file(&file).await.unwrap();
        let digest_b = hash_file(&file).await.unwrap();
        assert_eq!(digest_a, digest_b);
        assert_eq!(digest_a.len(), 64);
        assert!(digest_a.chars().all(|c| c.is_ascii_hexdigit()));
        tokio::fs::remove_file(&file).await.unwrap();
    }

    #[tokio::test]
    async fn mismatch_is_reported() {
        let store_dir = std::env::temp_dir().join(format!("scr-store-{}", std::process::id()));
        tokio::fs::create_dir_all(&store_dir).await.unwrap();
        let file = std::env::temp_dir().join(format!("scr-verify-mismatch-{}", std::process::id()));
        tokio::fs::write(&file, b"actual contents").await.unwrap();

        let store = HashStore::new(&store_dir);
        let name = HashStore::filename_for(&file);
        let zero_digest = "0".repeat(64);
        tokio::fs::write(store_dir.join(name), zero_digest).await.unwrap();

        let err = verify(&store, &file, true).await.unwrap_err();
        assert!(matches!(err, VerificationError::Mismatch { .. }));

        tokio::fs::remove_file(&file).await.unwrap();
        tokio::fs::remove_dir_all(&store_dir).await.unwrap();
    }

    #[tokio::test]
    async fn standard_path_is_skipped_when_disabled() {
        let store = HashStore::new(std::env::temp_dir());
        assert!(verify(&store, Path::new("/bin/ls"), false).await.is_ok());
    }
}
