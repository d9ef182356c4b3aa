use anyhow::{Context, Result, bail};
use log::debug;
use std::path::PathBuf;

use crate::{
    hooks::{CommandHook, PreRemoveHooks},
    repository::Repositories,
    runtime::Runtime,
};

use super::paths::default_packages_root;

/// Resolved settings for one CLI invocation.
pub struct Config<R: Runtime> {
    pub runtime: R,
    pub packages_root: PathBuf,
    pub hooks: PreRemoveHooks,
}

impl<R: Runtime> Config<R> {
    /// `hook_specs` are `PACKAGE=PROGRAM` pairs registering a [`CommandHook`].
    pub fn new(runtime: R, packages_root: Option<PathBuf>, hook_specs: &[String]) -> Result<Self> {
        let packages_root = match packages_root {
            Some(path) => path,
            None => default_packages_root(&runtime)?,
        };
        debug!("Using packages root: {}", packages_root.display());

        let mut hooks = PreRemoveHooks::new();
        for spec in hook_specs {
            let (package, program) = parse_hook_spec(spec)
                .with_context(|| format!("Invalid hook specification {:?}", spec))?;
            debug!("Registering pre-remove hook {:?} for {}", program, package);
            hooks.register(package, CommandHook::new(program));
        }

        Ok(Self {
            runtime,
            packages_root,
            hooks,
        })
    }

    pub fn repositories(&self) -> Repositories<'_, R> {
        Repositories::new(&self.runtime, &self.packages_root, self.hooks.clone())
    }
}

fn parse_hook_spec(spec: &str) -> Result<(&str, &str)> {
    let Some((package, program)) = spec.split_once('=') else {
        bail!("expected PACKAGE=PROGRAM");
    };
    let (package, program) = (package.trim(), program.trim());
    if package.is_empty() || program.is_empty() {
        bail!("package and program must not be empty");
    }
    Ok((package, program))
}
