//! Path & symlink resolver (C2).
//!
//! Canonicalizes paths that enter the security perimeter (a command's `cmd`
//! when it changes identity, `verify_files` entries, `cmd_allowed` entries)
//! so hash verification and allowlist matching both operate on the same
//! real, symlink-free path. Grounded on `just-bash`'s defensive path
//! canonicalization helpers; the teacher has no equivalent.

use crate::error::VerificationError;
use std::path::{Path, PathBuf};

/// Matches the `ELOOP` convention most libc implementations use internally.
const MAX_SYMLINK_HOPS: usize = 40;

/// Reject empty/relative paths, then resolve symlinks with a bounded hop
/// count, returning the canonical real path. Does not require the path to
/// exist for the relative/absolute check, but canonicalization does require
/// existence (a dangling path fails with `VerificationError::Missing`).
pub fn resolve(path: &str) -> Result<PathBuf, VerificationError> {
    if path.is_empty() {
        return Err(VerificationError::NotAbsolute {
            path: path.to_string(),
        });
    }
    let p = Path::new(path);
    if !p.is_absolute() {
        return Err(VerificationError::NotAbsolute {
            path: path.to_string(),
        });
    }
    canonicalize_bounded(p)
}

/// Canonicalize without requiring absoluteness up front (used for paths
/// already known absolute, e.g. post variable-expansion).
fn canonicalize_bounded(path: &Path) -> Result<PathBuf, VerificationError> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = std::fs::read_link(&current).map_err(|source| VerificationError::Io {
                    path: current.clone(),
                    source,
                })?;
                current = if target.is_absolute() {
                    target
                } else {
                    current
                        .parent()
                        .map(|p| p.join(&target))
                        .unwrap_or(target)
                };
            }
            Ok(_) => {
                return current.canonicalize().map_err(|source| {
                    if source.kind() == std::io::ErrorKind::NotFound {
                        VerificationError::Missing {
                            path: current.clone(),
                        }
                    } else {
                        VerificationError::Io {
                            path: current.clone(),
                            source,
                        }
                    }
                });
            }
            Err(source) => {
                return if source.kind() == std::io::ErrorKind::NotFound {
                    Err(VerificationError::Missing {
                        path: current.clone(),
                    })
                } else {
                    Err(VerificationError::Io {
                        path: current.clone(),
                        source,
                    })
                };
            }
        }
    }
    Err(VerificationError::SymlinkLoop {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_is_rejected() {
        let err = resolve("relative/path").unwrap_err();
        assert!(matches!(err, VerificationError::NotAbsolute { .. }));
    }

    #[test]
    fn empty_path_is_rejected() {
        let err = resolve("").unwrap_err();
        assert!(matches!(err, VerificationError::NotAbsolute { .. }));
    }

    #[test]
    fn missing_absolute_path_reports_missing() {
        let err = resolve("/definitely/does/not/exist/scr-test").unwrap_err();
        assert!(matches!(err, VerificationError::Missing { .. }));
    }

    #[test]
    fn existing_file_resolves_to_itself() {
        let dir = std::env::temp_dir();
        let file = dir.join(format!("scr-path-resolve-test-{}", std::process::id()));
        std::fs::write(&file, b"x").unwrap();
        let resolved = resolve(file.to_str().unwrap()).unwrap();
        assert_eq!(resolved, file.canonicalize().unwrap());
        std::fs::remove_file(&file).unwrap();
    }
}
