use anyhow::{Context, Result};
use log::warn;
use std::path::PathBuf;

use crate::hooks::PreRemoveHooks;
use crate::runtime::Runtime;

use super::{PackageStates, Repository, validate_package_name};

/// The repositories of every package under a packages root.
///
/// `<packages_root>/<package>` is the repository root of `<package>`, and the
/// package name is also the key its pre-remove hook is registered under.
pub struct Repositories<'a, R: Runtime> {
    runtime: &'a R,
    packages_root: PathBuf,
    hooks: PreRemoveHooks,
}

impl<'a, R: Runtime> Repositories<'a, R> {
    pub fn new(runtime: &'a R, packages_root: impl Into<PathBuf>, hooks: PreRemoveHooks) -> Self {
        Self {
            runtime,
            packages_root: packages_root.into(),
            hooks,
        }
    }

    /// Repository of `package`. It does not have to exist yet.
    pub fn get(&self, package: &str) -> Result<Repository<'a, R>> {
        validate_package_name(package)
            .with_context(|| format!("invalid package {:?}", package))?;
        Ok(Repository::new(
            self.runtime,
            self.packages_root.join(package),
            self.hooks.clone(),
        ))
    }

    /// Names of the packages that have a repository directory, sorted.
    pub fn packages(&self) -> Result<Vec<String>> {
        if !self.runtime.is_dir(&self.packages_root) {
            return Ok(vec![]);
        }

        let mut packages = Vec::new();
        for entry in self
            .runtime
            .read_dir(&self.packages_root)
            .context("could not read packages root")?
        {
            if let Some(name) = entry.file_name().and_then(|n| n.to_str())
                && !name.starts_with('.')
                && self.runtime.is_dir(&entry)
            {
                packages.push(name.to_string());
            }
        }
        packages.sort();
        Ok(packages)
    }

    /// State of every package. A package whose repository cannot be read is
    /// skipped with a warning rather than failing the whole listing.
    pub fn states(&self) -> Result<PackageStates> {
        let mut states = PackageStates::default();
        for package in self.packages()? {
            let state = self.get(&package).and_then(|repo| repo.get_state());
            match state {
                Ok(state) => {
                    states.states.insert(package, state);
                }
                Err(e) => warn!("could not read state of package {}: {:#}", package, e),
            }
        }
        Ok(states)
    }
}
