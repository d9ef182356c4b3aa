//! Symlink operations (create, atomic replace, resolve, remove).

use anyhow::{Context, Result};
use log::debug;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use super::RealRuntime;

impl RealRuntime {
    /// Create `link` pointing at `original`. A relative `original` resolves
    /// from `base`, the directory the link finally lives in.
    #[tracing::instrument(skip(self))]
    pub(crate) fn symlink_impl(&self, original: &Path, link: &Path, base: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::symlink as unix_symlink;
            let _ = base;
            unix_symlink(original, link).context("Failed to create symlink")?;
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::{symlink_dir, symlink_file};

            // `is_dir()` on a relative path is relative to CWD; we want it relative to `base`.
            let target_path = if original.is_absolute() {
                original.to_path_buf()
            } else {
                base.join(original)
            };

            if target_path.is_dir() {
                symlink_dir(original, link).context("Failed to create directory symlink")?;
            } else {
                symlink_file(original, link).context("Failed to create file symlink")?;
            }
        }
        Ok(())
    }

    /// Stage the new link in a hidden temp directory next to `link`, then
    /// rename it over the old one. A crash between the two steps leaves only
    /// the staging directory behind.
    #[tracing::instrument(skip(self))]
    pub(crate) fn replace_symlink_impl(&self, original: &Path, link: &Path) -> Result<()> {
        let parent = link
            .parent()
            .context("Failed to get parent directory of symlink")?;
        let file_name = link.file_name().context("Symlink path has no file name")?;

        let mut prefix = OsString::from(".");
        prefix.push(file_name);
        let staging = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(parent)
            .context("Failed to create staging directory for symlink")?;

        let staged_link = staging.path().join(file_name);
        self.symlink_impl(original, &staged_link, parent)?;

        #[cfg(windows)]
        {
            // Windows refuses to rename over an existing directory symlink, so
            // the link is briefly missing here. Cleanup restores a missing
            // stable link from experiment.
            if self.is_symlink_impl(link) {
                self.remove_symlink_impl(link)?;
            }
        }

        fs::rename(&staged_link, link).context("Failed to move symlink into place")?;

        if let Err(e) = staging.close() {
            debug!("Failed to remove symlink staging directory: {}", e);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_symlink_impl(&self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            fs::remove_file(path).context("Failed to remove symlink")?;
        }
        #[cfg(windows)]
        {
            // On Windows, removing a symlink requires remove_dir for a directory symlink
            // and remove_file for a file symlink.
            fs::remove_dir(path)
                .or_else(|_| fs::remove_file(path))
                .context("Failed to remove symlink")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_symlink_impl(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn canonicalize_impl(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).context("Failed to canonicalize path")
    }
}
