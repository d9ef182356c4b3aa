//! On-disk stable/experiment repository for a single package.
//!
//! On disk a repository is structured as follows:
//!
//! ```text
//! .
//! ├── 7.50.0
//! ├── 7.51.0
//! ├── stable -> 7.50.0 (symlink)
//! └── experiment -> 7.51.0 (symlink)
//! ```
//!
//! The state of the repository is never kept in memory: every operation
//! re-reads the links, performs one transition and forgets everything. Each
//! transition is a short sequence of atomic primitives (rename, symlink
//! replace), so an interrupted operation can leave unreferenced version
//! directories behind but never a broken link. Leftovers are swept by the
//! cleanup that starts every mutating operation.
//!
//! There is no locking: callers must serialize operations on a given root.

mod error;
mod files;
mod link;
mod repositories;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::context::OperationContext;
use crate::hooks::PreRemoveHooks;
use crate::runtime::Runtime;

pub use error::RepositoryError;
pub use repositories::Repositories;

use files::RepositoryFiles;

pub const STABLE_VERSION_LINK: &str = "stable";
pub const EXPERIMENT_VERSION_LINK: &str = "experiment";

/// State of a repository.
///
/// `experiment` is empty when the experiment link points at the same version
/// as stable.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub stable: String,
    pub experiment: String,
}

impl State {
    pub fn has_stable(&self) -> bool {
        !self.stable.is_empty()
    }

    pub fn has_experiment(&self) -> bool {
        !self.experiment.is_empty()
    }
}

/// State of every package under a packages root.
///
/// Only version repositories are reported; there is no `config_states` map.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageStates {
    pub states: BTreeMap<String, State>,
}

/// Check that `name` can be used as a version directory or package name.
pub fn validate_package_name(name: &str) -> Result<()> {
    let reserved = name == STABLE_VERSION_LINK || name == EXPERIMENT_VERSION_LINK;
    let not_a_single_component = name == "." || name == ".." || name.contains(['/', '\\']);
    if name.is_empty() || reserved || not_a_single_component {
        return Err(RepositoryError::InvalidName(name.to_string()).into());
    }
    Ok(())
}

/// The stable and experiment versions of a single package.
pub struct Repository<'a, R: Runtime> {
    runtime: &'a R,
    root_path: PathBuf,
    hooks: PreRemoveHooks,
}

impl<'a, R: Runtime> Repository<'a, R> {
    pub fn new(runtime: &'a R, root_path: impl Into<PathBuf>, hooks: PreRemoveHooks) -> Self {
        Self {
            runtime,
            root_path: root_path.into(),
            hooks,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Files of the stable version, read through the `stable` link.
    pub fn stable_dir(&self) -> PathBuf {
        self.root_path.join(STABLE_VERSION_LINK)
    }

    /// Files of the experiment version, read through the `experiment` link.
    pub fn experiment_dir(&self) -> PathBuf {
        self.root_path.join(EXPERIMENT_VERSION_LINK)
    }

    fn read(&self) -> Result<RepositoryFiles<'_, R>> {
        RepositoryFiles::read(self.runtime, &self.root_path, &self.hooks)
    }

    fn is_created(&self) -> bool {
        self.runtime.is_dir(&self.root_path)
    }

    /// Current state, empty if the repository was never created.
    #[tracing::instrument(skip(self), fields(root = ?self.root_path))]
    pub fn get_state(&self) -> Result<State> {
        let files = match self.read() {
            Ok(files) => files,
            Err(e) if matches!(RepositoryError::find(&e), Some(RepositoryError::NotCreated)) => {
                return Ok(State::default());
            }
            Err(e) => return Err(e),
        };

        let stable = files.stable.target().to_string();
        let mut experiment = files.experiment.target().to_string();
        if experiment == stable {
            experiment.clear();
        }
        Ok(State { stable, experiment })
    }

    /// Create the repository with `source_path` as its first stable version.
    ///
    /// An existing repository at the same root is reset: both links are
    /// dropped and its versions are swept before the new one moves in.
    ///
    /// 1. Create the root directory.
    /// 2. Remove the stable and experiment links.
    /// 3. Cleanup the repository.
    /// 4. Move the source in and point stable at it.
    /// 5. Point experiment at stable.
    #[tracing::instrument(skip(self, ctx), fields(root = ?self.root_path))]
    pub fn create(&self, ctx: &OperationContext, name: &str, source_path: &Path) -> Result<()> {
        validate_package_name(name)?;

        self.runtime
            .create_dir_all(&self.root_path)
            .context("could not create packages root directory")?;

        let mut files = self.read()?;
        files.delete_links()?;
        files.cleanup(ctx).context("could not cleanup repository")?;
        files
            .set_stable(name, source_path)
            .context("could not set first stable")?;
        files
            .set_experiment_to_stable()
            .context("could not set first experiment")?;

        info!("Created repository {:?} with stable {}", self.root_path, name);
        Ok(())
    }

    /// Delete the repository and every version in it.
    ///
    /// Fails with [`RepositoryError::NotEmpty`] when a pre-remove hook kept
    /// some versions; the root is left in place so a later call can retry.
    ///
    /// 1. Remove the stable and experiment links.
    /// 2. Cleanup the repository, running the pre-remove hooks.
    /// 3. Remove the root directory.
    #[tracing::instrument(skip(self, ctx), fields(root = ?self.root_path))]
    pub fn delete(&self, ctx: &OperationContext) -> Result<()> {
        if !self.is_created() {
            debug!("Repository {:?} does not exist, nothing to delete", self.root_path);
            return Ok(());
        }

        let mut files = self.read()?;
        files.delete_links()?;
        files
            .cleanup(ctx)
            .context("could not cleanup repository")?;

        let remaining = self
            .runtime
            .read_dir(&self.root_path)
            .context("could not read root directory")?;
        if !remaining.is_empty() {
            return Err(RepositoryError::NotEmpty(self.root_path.clone()).into());
        }

        self.runtime
            .remove_dir(&self.root_path)
            .context("could not delete root directory")?;

        info!("Deleted repository {:?}", self.root_path);
        Ok(())
    }

    /// Move `source_path` in as version `name` and make it the experiment.
    ///
    /// 1. Cleanup the repository.
    /// 2. Move the experiment source to the repository.
    /// 3. Point the experiment link at it.
    #[tracing::instrument(skip(self, ctx), fields(root = ?self.root_path))]
    pub fn set_experiment(
        &self,
        ctx: &OperationContext,
        name: &str,
        source_path: &Path,
    ) -> Result<()> {
        validate_package_name(name)?;

        let mut files = self.read()?;
        files.cleanup(ctx).context("could not cleanup repository")?;
        files.require_links()?;
        files
            .set_experiment(name, source_path)
            .context("could not set experiment")?;

        info!("Set experiment of {:?} to {}", self.root_path, name);
        Ok(())
    }

    /// Make the experiment the new stable.
    ///
    /// 1. Cleanup the repository.
    /// 2. Point stable at the experiment version. The experiment link stays.
    /// 3. Cleanup the repository to reclaim the previous stable.
    #[tracing::instrument(skip(self, ctx), fields(root = ?self.root_path))]
    pub fn promote_experiment(&self, ctx: &OperationContext) -> Result<()> {
        let mut files = self.read()?;
        files.cleanup(ctx).context("could not cleanup repository")?;
        files.require_links()?;
        if !files.has_experiment() {
            return Err(RepositoryError::NoExperiment.into());
        }

        let promoted = files.experiment.target().to_string();
        files
            .set_stable_to_experiment()
            .context("could not set stable")?;
        files.cleanup(ctx).context("could not cleanup repository")?;

        info!("Promoted {} to stable in {:?}", promoted, self.root_path);
        Ok(())
    }

    /// Drop the experiment and go back to stable only.
    ///
    /// 1. Cleanup the repository.
    /// 2. Point the experiment link at the stable version.
    /// 3. Cleanup the repository to reclaim the previous experiment.
    #[tracing::instrument(skip(self, ctx), fields(root = ?self.root_path))]
    pub fn delete_experiment(&self, ctx: &OperationContext) -> Result<()> {
        let mut files = self.read()?;
        files.cleanup(ctx).context("could not cleanup repository")?;
        files.require_links()?;
        files
            .set_experiment_to_stable()
            .context("could not set experiment to stable")?;
        files.cleanup(ctx).context("could not cleanup repository")?;

        info!("Deleted experiment of {:?}", self.root_path);
        Ok(())
    }

    /// Sweep versions that neither link references.
    #[tracing::instrument(skip(self, ctx), fields(root = ?self.root_path))]
    pub fn cleanup(&self, ctx: &OperationContext) -> Result<()> {
        if !self.is_created() {
            debug!("Repository {:?} does not exist, nothing to clean", self.root_path);
            return Ok(());
        }
        self.read()?.cleanup(ctx)
    }
}
