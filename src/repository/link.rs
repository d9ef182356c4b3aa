use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::runtime::{Runtime, relative_symlink_path};

use super::error::RepositoryError;

/// A named symbolic reference (`stable` or `experiment`) to a version
/// directory of the repository.
#[derive(Debug)]
pub(crate) struct Link {
    link_path: PathBuf,
    package_path: Option<PathBuf>,
}

impl Link {
    /// Inspect `link_path` on disk.
    ///
    /// A missing link loads as an unset `Link`. A link whose target is gone,
    /// or an entry with a link name that is not a symlink at all, is
    /// corruption and is never repaired silently.
    pub(crate) fn load<R: Runtime>(runtime: &R, link_path: PathBuf) -> Result<Self> {
        if !runtime.is_symlink(&link_path) {
            if runtime.exists(&link_path) {
                return Err(RepositoryError::Corruption {
                    link: link_path,
                    reason: "exists but is not a symbolic link".to_string(),
                }
                .into());
            }
            return Ok(Self {
                link_path,
                package_path: None,
            });
        }

        let package_path = match runtime.canonicalize(&link_path) {
            Ok(path) => path,
            Err(e) => {
                return Err(RepositoryError::Corruption {
                    link: link_path,
                    reason: format!("could not read package: {:#}", e),
                }
                .into());
            }
        };
        if !runtime.is_dir(&package_path) {
            return Err(RepositoryError::Corruption {
                link: link_path,
                reason: format!("target {:?} is not a directory", package_path),
            }
            .into());
        }

        Ok(Self {
            link_path,
            package_path: Some(package_path),
        })
    }

    pub(crate) fn exists(&self) -> bool {
        self.package_path.is_some()
    }

    /// Version identifier the link points at, empty if unset.
    pub(crate) fn target(&self) -> &str {
        self.target_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    /// Whether `name` is the directory this link points at.
    pub(crate) fn references(&self, name: &OsStr) -> bool {
        self.target_name() == Some(name)
    }

    pub(crate) fn package_path(&self) -> Option<&Path> {
        self.package_path.as_deref()
    }

    fn target_name(&self) -> Option<&OsStr> {
        self.package_path.as_deref().and_then(Path::file_name)
    }

    /// Atomically repoint the link at `path`, which must already exist.
    ///
    /// The link stores `path` relative to its own directory, so it resolves
    /// the same whatever the working directory of the caller was.
    pub(crate) fn set<R: Runtime>(&mut self, runtime: &R, path: &Path) -> Result<()> {
        let target =
            relative_symlink_path(&self.link_path, path).unwrap_or_else(|| path.to_path_buf());
        runtime
            .replace_symlink(&target, &self.link_path)
            .with_context(|| format!("could not set link {:?}", self.link_path))?;
        self.package_path = Some(path.to_path_buf());
        Ok(())
    }

    pub(crate) fn delete<R: Runtime>(&mut self, runtime: &R) -> Result<()> {
        runtime
            .remove_symlink(&self.link_path)
            .with_context(|| format!("could not delete link {:?}", self.link_path))?;
        self.package_path = None;
        Ok(())
    }
}
