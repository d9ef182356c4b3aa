use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::runtime::Runtime;

/// Get the default packages root directory
#[tracing::instrument(skip(runtime))]
pub fn default_packages_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_packages_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".fleetrepo").join("packages"))
    }
}

#[cfg(target_os = "windows")]
fn system_packages_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\fleetrepo\packages")
}

#[cfg(not(target_os = "windows"))]
fn system_packages_root() -> PathBuf {
    PathBuf::from("/opt/fleetrepo/packages")
}
