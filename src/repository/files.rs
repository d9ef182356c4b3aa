//! A snapshot of a repository's links and the transitions applied to them.
//!
//! A [`RepositoryFiles`] is read from disk at the start of every public
//! operation and dropped at its end; nothing in it outlives the call.

use anyhow::{Context, Result, bail};
use log::{debug, error, warn};
use std::path::{Path, PathBuf};

use crate::context::OperationContext;
use crate::hooks::PreRemoveHooks;
use crate::runtime::Runtime;

use super::error::RepositoryError;
use super::link::Link;
use super::{EXPERIMENT_VERSION_LINK, STABLE_VERSION_LINK, validate_package_name};

/// Mode applied to every version directory before it is moved in.
const REPOSITORY_MODE: u32 = 0o755;

pub(crate) struct RepositoryFiles<'a, R: Runtime> {
    runtime: &'a R,
    root_path: &'a Path,
    hooks: &'a PreRemoveHooks,

    pub(crate) stable: Link,
    pub(crate) experiment: Link,
}

impl<'a, R: Runtime> RepositoryFiles<'a, R> {
    /// Load both links from disk.
    pub(crate) fn read(runtime: &'a R, root_path: &'a Path, hooks: &'a PreRemoveHooks) -> Result<Self> {
        if !runtime.is_dir(root_path) {
            return Err(RepositoryError::NotCreated.into());
        }

        let stable = Link::load(runtime, root_path.join(STABLE_VERSION_LINK))
            .context("could not load stable link")?;
        let experiment = Link::load(runtime, root_path.join(EXPERIMENT_VERSION_LINK))
            .context("could not load experiment link")?;

        Ok(Self {
            runtime,
            root_path,
            hooks,
            stable,
            experiment,
        })
    }

    /// Package identifier hooks are registered under.
    fn package_name(&self) -> &str {
        self.root_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    pub(crate) fn require_links(&self) -> Result<()> {
        if !self.stable.exists() {
            return Err(RepositoryError::InvalidState("stable link does not exist".into()).into());
        }
        if !self.experiment.exists() {
            return Err(
                RepositoryError::InvalidState("experiment link does not exist".into()).into(),
            );
        }
        Ok(())
    }

    pub(crate) fn has_experiment(&self) -> bool {
        self.stable.target() != self.experiment.target()
    }

    pub(crate) fn set_stable(&mut self, name: &str, source_path: &Path) -> Result<()> {
        let path = self
            .move_package_from_source(name, source_path)
            .context("could not move stable source")?;
        self.stable.set(self.runtime, &path)
    }

    pub(crate) fn set_experiment(&mut self, name: &str, source_path: &Path) -> Result<()> {
        let path = self
            .move_package_from_source(name, source_path)
            .context("could not move experiment source")?;
        self.experiment.set(self.runtime, &path)
    }

    /// Point experiment at the directory stable currently references.
    pub(crate) fn set_experiment_to_stable(&mut self) -> Result<()> {
        let target = self
            .version_path(&self.stable)
            .ok_or_else(|| RepositoryError::InvalidState("stable link does not exist".into()))?;
        self.experiment.set(self.runtime, &target)
    }

    /// Point stable at the directory experiment currently references.
    /// The experiment link is left in place.
    pub(crate) fn set_stable_to_experiment(&mut self) -> Result<()> {
        let target = self
            .version_path(&self.experiment)
            .ok_or_else(|| {
                RepositoryError::InvalidState("experiment link does not exist".into())
            })?;
        self.stable.set(self.runtime, &target)
    }

    /// Path of the version `link` references, spelled from the root as given
    /// rather than the resolved one, so relinking stays relative to the root.
    fn version_path(&self, link: &Link) -> Option<PathBuf> {
        link.package_path()
            .and_then(Path::file_name)
            .map(|name| self.root_path.join(name))
    }

    pub(crate) fn delete_links(&mut self) -> Result<()> {
        if self.experiment.exists() {
            self.experiment
                .delete(self.runtime)
                .context("could not delete experiment link")?;
        }
        if self.stable.exists() {
            self.stable
                .delete(self.runtime)
                .context("could not delete stable link")?;
        }
        Ok(())
    }

    /// Move `source_path` into the root as version `name`.
    ///
    /// The move is a single rename, so after a crash the version is either
    /// fully present under its final name or still at the source.
    fn move_package_from_source(&self, name: &str, source_path: &Path) -> Result<PathBuf> {
        validate_package_name(name)?;

        let target_path = self.root_path.join(name);
        if self.runtime.exists(&target_path) || self.runtime.is_symlink(&target_path) {
            return Err(RepositoryError::AlreadyExists(name.to_string()).into());
        }
        if !self.runtime.is_dir(source_path) {
            bail!("source {:?} is not a directory", source_path);
        }

        set_repository_permissions(self.runtime, source_path)
            .context("could not set permissions on package")?;
        self.runtime
            .rename(source_path, &target_path)
            .context("could not move source")?;

        debug!("Moved {:?} to {:?}", source_path, target_path);
        Ok(target_path)
    }

    /// Sweep every entry that neither link references.
    ///
    /// A repository that only has a stable link is first migrated by pointing
    /// experiment at stable. One that only has an experiment link was
    /// interrupted while stable was being repointed at it, so stable is
    /// pointed at experiment. Hook failures and removal failures are logged
    /// and the entry is left for the next sweep.
    pub(crate) fn cleanup(&mut self, ctx: &OperationContext) -> Result<()> {
        if self.stable.exists() && !self.experiment.exists() {
            debug!(
                "Repository {:?} has no experiment link, pointing it at stable",
                self.root_path
            );
            self.set_experiment_to_stable()
                .context("could not migrate old repository without experiment link")?;
        } else if !self.stable.exists() && self.experiment.exists() {
            warn!(
                "Repository {:?} has no stable link, finishing promotion of {}",
                self.root_path,
                self.experiment.target()
            );
            self.set_stable_to_experiment()
                .context("could not restore stable link from experiment")?;
        }

        let entries = self
            .runtime
            .read_dir(self.root_path)
            .context("could not read root directory")?;
        let hook = self.hooks.get(self.package_name());

        for entry in entries {
            if ctx.is_cancelled() {
                debug!("Cleanup of {:?} cancelled, leaving the rest", self.root_path);
                break;
            }

            let Some(name) = entry.file_name() else {
                continue;
            };
            let is_link = name == STABLE_VERSION_LINK || name == EXPERIMENT_VERSION_LINK;
            if is_link || self.stable.references(name) || self.experiment.references(name) {
                continue;
            }

            if let Some(hook) = hook {
                let decision = hook.try_remove(ctx, &entry);
                if let Some(e) = decision.error {
                    error!(
                        "Pre-remove hook for package {:?} returned an error: {:#}",
                        entry, e
                    );
                }
                if !decision.can_delete {
                    debug!("Pre-remove hook kept package {:?}", entry);
                    continue;
                }
            }

            debug!("Removing package {:?}", entry);
            if let Err(e) = self.remove_entry(&entry) {
                error!(
                    "could not remove package {:?} directory, will retry: {:#}",
                    entry, e
                );
            }
        }

        Ok(())
    }

    fn remove_entry(&self, path: &Path) -> Result<()> {
        if self.runtime.is_symlink(path) {
            self.runtime.remove_symlink(path)
        } else if self.runtime.is_dir(path) {
            self.runtime.remove_dir_all(path)
        } else {
            self.runtime.remove_file(path)
        }
    }
}

/// Apply the repository ownership/permission policy to a directory about to
/// be moved in.
pub(crate) fn set_repository_permissions<R: Runtime>(runtime: &R, path: &Path) -> Result<()> {
    runtime.set_permissions(path, REPOSITORY_MODE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{MockPreRemoveHook, RemovalDecision};
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    fn root() -> PathBuf {
        PathBuf::from("/opt/packages/agent")
    }

    /// Mock a root holding `stable -> stable_target`, `experiment -> experiment_target`
    /// and the given extra entries.
    fn configure_repository(
        runtime: &mut MockRuntime,
        stable_target: &'static str,
        experiment_target: &'static str,
        entries: &'static [&'static str],
    ) {
        let root = root();
        runtime.expect_is_dir().returning(|_| true);
        runtime.expect_is_symlink().returning(|p| {
            p.ends_with(STABLE_VERSION_LINK) || p.ends_with(EXPERIMENT_VERSION_LINK)
        });
        let resolve_root = root.clone();
        runtime.expect_canonicalize().returning(move |p| {
            let target = if p.ends_with(STABLE_VERSION_LINK) {
                stable_target
            } else {
                experiment_target
            };
            Ok(resolve_root.join(target))
        });
        runtime
            .expect_read_dir()
            .with(eq(root))
            .returning(move |p| {
                let mut all = vec![p.join(STABLE_VERSION_LINK), p.join(EXPERIMENT_VERSION_LINK)];
                all.extend(entries.iter().map(|e| p.join(e)));
                Ok(all)
            });
    }

    #[test]
    fn test_read_missing_root() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| false);

        let hooks = PreRemoveHooks::new();
        let root = root();
        let result = RepositoryFiles::read(&runtime, &root, &hooks);

        assert!(matches!(
            RepositoryError::find(&result.err().unwrap()),
            Some(RepositoryError::NotCreated)
        ));
    }

    #[test]
    fn test_cleanup_removes_unreferenced_versions() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.51.0", &["7.50.0", "7.51.0", "7.49.0"]);
        runtime
            .expect_remove_dir_all()
            .with(eq(root().join("7.49.0")))
            .times(1)
            .returning(|_| Ok(()));

        let hooks = PreRemoveHooks::new();
        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        files.cleanup(&OperationContext::new()).unwrap();
    }

    #[test]
    fn test_cleanup_continues_after_removal_failure() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0", "7.48.0", "7.49.0"]);
        runtime
            .expect_remove_dir_all()
            .with(eq(root().join("7.48.0")))
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("device busy")));
        runtime
            .expect_remove_dir_all()
            .with(eq(root().join("7.49.0")))
            .times(1)
            .returning(|_| Ok(()));

        let hooks = PreRemoveHooks::new();
        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        assert!(files.cleanup(&OperationContext::new()).is_ok());
    }

    #[test]
    fn test_cleanup_hook_error_does_not_block_deletion() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0", "7.49.0"]);
        runtime
            .expect_remove_dir_all()
            .with(eq(root().join("7.49.0")))
            .times(1)
            .returning(|_| Ok(()));

        let mut hook = MockPreRemoveHook::new();
        hook.expect_try_remove()
            .with(mockall::predicate::always(), eq(root().join("7.49.0")))
            .times(1)
            .returning(|_, _| RemovalDecision::allow().with_error(anyhow::anyhow!("stop failed")));
        let hooks = PreRemoveHooks::new().with("agent", hook);

        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        files.cleanup(&OperationContext::new()).unwrap();
    }

    #[test]
    fn test_cleanup_hook_veto_keeps_directory() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0", "7.49.0"]);
        runtime.expect_remove_dir_all().never();

        let mut hook = MockPreRemoveHook::new();
        hook.expect_try_remove()
            .times(1)
            .returning(|_, _| RemovalDecision::deny());
        let hooks = PreRemoveHooks::new().with("agent", hook);

        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        files.cleanup(&OperationContext::new()).unwrap();
    }

    #[test]
    fn test_cleanup_ignores_hooks_of_other_packages() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0", "7.49.0"]);
        runtime
            .expect_remove_dir_all()
            .times(1)
            .returning(|_| Ok(()));

        let mut hook = MockPreRemoveHook::new();
        hook.expect_try_remove().never();
        let hooks = PreRemoveHooks::new().with("installer", hook);

        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        files.cleanup(&OperationContext::new()).unwrap();
    }

    #[test]
    fn test_cleanup_stops_when_cancelled() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0", "7.49.0"]);
        runtime.expect_remove_dir_all().never();

        let hooks = PreRemoveHooks::new();
        let root = root();
        let ctx = OperationContext::new();
        ctx.cancel();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        assert!(files.cleanup(&ctx).is_ok());
    }

    #[test]
    fn test_move_rejects_existing_target() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0"]);
        runtime
            .expect_exists()
            .with(eq(root().join("7.50.0")))
            .returning(|_| true);
        runtime.expect_rename().never();

        let hooks = PreRemoveHooks::new();
        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        let err = files
            .set_experiment("7.50.0", Path::new("/tmp/download"))
            .unwrap_err();

        assert!(matches!(
            RepositoryError::find(&err),
            Some(RepositoryError::AlreadyExists(name)) if name == "7.50.0"
        ));
    }

    #[test]
    fn test_move_aborts_when_permissions_fail() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0"]);
        runtime.expect_exists().returning(|_| false);
        runtime
            .expect_set_permissions()
            .with(eq(PathBuf::from("/tmp/download")), eq(0o755))
            .returning(|_, _| Err(anyhow::anyhow!("operation not permitted")));
        runtime.expect_rename().never();
        runtime.expect_replace_symlink().never();

        let hooks = PreRemoveHooks::new();
        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        let err = files
            .set_experiment("7.51.0", Path::new("/tmp/download"))
            .unwrap_err();

        assert!(format!("{:#}", err).contains("could not set permissions on package"));
        assert_eq!(files.experiment.target(), "7.50.0");
    }

    #[test]
    fn test_move_failure_leaves_link_untouched() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0"]);
        runtime.expect_exists().returning(|_| false);
        runtime.expect_set_permissions().returning(|_, _| Ok(()));
        runtime
            .expect_rename()
            .with(eq(PathBuf::from("/tmp/download")), eq(root().join("7.51.0")))
            .returning(|_, _| Err(anyhow::anyhow!("cross-device link")));
        runtime.expect_replace_symlink().never();

        let hooks = PreRemoveHooks::new();
        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        let err = files
            .set_experiment("7.51.0", Path::new("/tmp/download"))
            .unwrap_err();

        assert!(format!("{:#}", err).contains("could not move source"));
        assert_eq!(files.experiment.target(), "7.50.0");
    }

    #[test]
    fn test_set_experiment_moves_then_links() {
        let mut runtime = MockRuntime::new();
        configure_repository(&mut runtime, "7.50.0", "7.50.0", &["7.50.0"]);
        runtime.expect_exists().returning(|_| false);
        runtime.expect_set_permissions().returning(|_, _| Ok(()));
        runtime.expect_rename().times(1).returning(|_, _| Ok(()));
        runtime
            .expect_replace_symlink()
            .with(
                eq(PathBuf::from("7.51.0")),
                eq(root().join(EXPERIMENT_VERSION_LINK)),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let hooks = PreRemoveHooks::new();
        let root = root();
        let mut files = RepositoryFiles::read(&runtime, &root, &hooks).unwrap();
        files
            .set_experiment("7.51.0", Path::new("/tmp/download"))
            .unwrap();

        assert_eq!(files.stable.target(), "7.50.0");
        assert_eq!(files.experiment.target(), "7.51.0");
        assert!(files.has_experiment());
    }
}
