//! Group workspace (C8).
//!
//! Resolves or creates the per-group working directory and binds it to the
//! `__runner_workdir` internal variable for every command in the group.
//! Grounded on the teacher's `uuid::Uuid::new_v4()` id generation
//! (`server.rs`) for naming auto-created directories, and on the 0700/0600
//! mode-bit handling used throughout the pack's security-sensitive writers.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// An active group workspace. Dropping this value does not remove the
/// directory; callers explicitly call [`Workspace::cleanup`] once the
/// group's commands have finished, honoring `--keep-temp-dirs`.
pub struct Workspace {
    pub path: PathBuf,
    auto_created: bool,
}

impl Workspace {
    /// Resolve a group's workdir: use the fixed one if configured (must
    /// already exist), otherwise create `/tmp/scr-<group>-<uuid>` mode 0700.
    pub fn resolve(group_name: &str, fixed: Option<&Path>) -> std::io::Result<Self> {
        if let Some(path) = fixed {
            let meta = std::fs::metadata(path)?;
            if !meta.is_dir() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} is not a directory", path.display()),
                ));
            }
            return Ok(Self {
                path: path.to_path_buf(),
                auto_created: false,
            });
        }

        let path = std::env::temp_dir().join(format!("scr-{group_name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))?;
        Ok(Self {
            path,
            auto_created: true,
        })
    }

    /// Remove the directory if it was auto-created, unless the operator
    /// asked to keep it (`--keep-temp-dirs`).
    pub fn cleanup(&self, keep: bool) -> std::io::Result<()> {
        if self.auto_created && !keep {
            std::fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_created_workspace_has_mode_0700() {
        let ws = Workspace::resolve("test-group", None).unwrap();
        let mode = std::fs::metadata(&ws.path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
        ws.cleanup(false).unwrap();
        assert!(!ws.path.exists());
    }

    #[test]
    fn keep_flag_preserves_directory() {
        let ws = Workspace::resolve("test-group-keep", None).unwrap();
        let path = ws.path.clone();
        ws.cleanup(true).unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn fixed_workdir_must_exist() {
        let err = Workspace::resolve("g", Some(Path::new("/nonexistent/scr-fixture"))).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
