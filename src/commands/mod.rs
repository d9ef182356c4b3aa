//! CLI commands. Each maps onto exactly one repository operation.

use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

use crate::{context::OperationContext, runtime::Runtime};

pub mod config;
mod paths;

pub use paths::default_packages_root;

use config::Config;

/// Install `source` as the first stable version of `package`
#[tracing::instrument(skip(config, ctx))]
pub fn create<R: Runtime>(
    config: &Config<R>,
    ctx: &OperationContext,
    package: &str,
    version: &str,
    source: &Path,
) -> Result<()> {
    let repo = config.repositories().get(package)?;
    repo.create(ctx, version, source)
        .with_context(|| format!("Failed to install {} {}", package, version))?;
    println!("Installed {} {} as stable", package, version);
    Ok(())
}

/// Print the state of a package as JSON
#[tracing::instrument(skip(config))]
pub fn state<R: Runtime>(config: &Config<R>, package: &str) -> Result<()> {
    let state = config.repositories().get(package)?.get_state()?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Print the state of every package as JSON
#[tracing::instrument(skip(config))]
pub fn list<R: Runtime>(config: &Config<R>) -> Result<()> {
    debug!("Listing packages from {:?}", config.packages_root);
    let states = config.repositories().states()?;
    println!("{}", serde_json::to_string_pretty(&states)?);
    Ok(())
}

/// Stage `source` as the experiment of `package`
#[tracing::instrument(skip(config, ctx))]
pub fn set_experiment<R: Runtime>(
    config: &Config<R>,
    ctx: &OperationContext,
    package: &str,
    version: &str,
    source: &Path,
) -> Result<()> {
    let repo = config.repositories().get(package)?;
    repo.set_experiment(ctx, version, source)
        .with_context(|| format!("Failed to start experiment {} {}", package, version))?;
    println!("Started experiment {} {}", package, version);
    Ok(())
}

/// Make the experiment of `package` its stable version
#[tracing::instrument(skip(config, ctx))]
pub fn promote<R: Runtime>(config: &Config<R>, ctx: &OperationContext, package: &str) -> Result<()> {
    let repo = config.repositories().get(package)?;
    repo.promote_experiment(ctx)
        .with_context(|| format!("Failed to promote experiment of {}", package))?;
    let state = repo.get_state()?;
    println!("Promoted {} {} to stable", package, state.stable);
    Ok(())
}

/// Roll `package` back to its stable version
#[tracing::instrument(skip(config, ctx))]
pub fn delete_experiment<R: Runtime>(
    config: &Config<R>,
    ctx: &OperationContext,
    package: &str,
) -> Result<()> {
    let repo = config.repositories().get(package)?;
    repo.delete_experiment(ctx)
        .with_context(|| format!("Failed to stop experiment of {}", package))?;
    println!("Stopped experiment of {}", package);
    Ok(())
}

/// Remove `package` and all of its versions
#[tracing::instrument(skip(config, ctx))]
pub fn delete<R: Runtime>(config: &Config<R>, ctx: &OperationContext, package: &str) -> Result<()> {
    let repo = config.repositories().get(package)?;
    repo.delete(ctx)
        .with_context(|| format!("Failed to remove {}", package))?;
    println!("Removed {}", package);
    Ok(())
}

/// Sweep unreferenced versions of `package`
#[tracing::instrument(skip(config, ctx))]
pub fn cleanup<R: Runtime>(config: &Config<R>, ctx: &OperationContext, package: &str) -> Result<()> {
    let repo = config.repositories().get(package)?;
    repo.cleanup(ctx)
        .with_context(|| format!("Failed to clean up {}", package))
}

/// Print the directory holding the stable (or experiment) files of `package`
#[tracing::instrument(skip(config))]
pub fn path<R: Runtime>(config: &Config<R>, package: &str, experiment: bool) -> Result<()> {
    let repo = config.repositories().get(package)?;
    let state = repo.get_state()?;
    if !state.has_stable() {
        anyhow::bail!("Package {} is not installed.", package);
    }
    let dir = if experiment {
        repo.experiment_dir()
    } else {
        repo.stable_dir()
    };
    println!("{}", dir.display());
    Ok(())
}
