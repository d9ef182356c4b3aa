//! Pre-remove hooks.
//!
//! A package can register a hook that is consulted before any of its version
//! directories is permanently deleted by a cleanup sweep. The hook may veto
//! the deletion (the directory is kept and offered again on the next sweep)
//! or prepare for it, e.g. by stopping services that run from that directory.
//!
//! A hook reports both a decision and, optionally, an error. The error is only
//! logged: the decision alone gates deletion, so a hook that fails but still
//! answers "delete" gets its directory removed.

use anyhow::{Context, Result};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::context::OperationContext;

/// What a pre-remove hook decided about one version directory.
#[derive(Debug)]
pub struct RemovalDecision {
    pub can_delete: bool,
    pub error: Option<anyhow::Error>,
}

impl RemovalDecision {
    pub fn allow() -> Self {
        Self {
            can_delete: true,
            error: None,
        }
    }

    pub fn deny() -> Self {
        Self {
            can_delete: false,
            error: None,
        }
    }

    /// Attach an error to report without changing the decision.
    pub fn with_error(mut self, error: anyhow::Error) -> Self {
        self.error = Some(error);
        self
    }
}

impl From<Result<bool>> for RemovalDecision {
    /// `Err` means the hook could not decide, so the directory is kept.
    fn from(result: Result<bool>) -> Self {
        match result {
            Ok(can_delete) => Self {
                can_delete,
                error: None,
            },
            Err(e) => Self::deny().with_error(e),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait PreRemoveHook: Send + Sync {
    /// Called once per candidate directory during every cleanup sweep.
    fn try_remove(&self, ctx: &OperationContext, path: &Path) -> RemovalDecision;
}

impl<F> PreRemoveHook for F
where
    F: Fn(&OperationContext, &Path) -> Result<bool> + Send + Sync,
{
    fn try_remove(&self, ctx: &OperationContext, path: &Path) -> RemovalDecision {
        self(ctx, path).into()
    }
}

/// Hooks keyed by package identifier (the base name of a repository root).
#[derive(Clone, Default)]
pub struct PreRemoveHooks {
    hooks: HashMap<String, Arc<dyn PreRemoveHook>>,
}

impl PreRemoveHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `package`, replacing any previous one.
    pub fn register(&mut self, package: impl Into<String>, hook: impl PreRemoveHook + 'static) {
        self.hooks.insert(package.into(), Arc::new(hook));
    }

    pub fn with(mut self, package: impl Into<String>, hook: impl PreRemoveHook + 'static) -> Self {
        self.register(package, hook);
        self
    }

    pub fn get(&self, package: &str) -> Option<&dyn PreRemoveHook> {
        self.hooks.get(package).map(|hook| hook.as_ref())
    }
}

impl fmt::Debug for PreRemoveHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut packages: Vec<_> = self.hooks.keys().collect();
        packages.sort();
        f.debug_struct("PreRemoveHooks")
            .field("packages", &packages)
            .finish()
    }
}

/// Hook backed by an external program, invoked as `<program> <path>`.
///
/// Exit status 0 allows the deletion; any other status vetoes it.
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: PathBuf,
}

impl CommandHook {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, path: &Path) -> Result<bool> {
        let status = Command::new(&self.program)
            .arg(path)
            .status()
            .with_context(|| format!("Failed to run pre-remove hook {:?}", self.program))?;
        debug!(
            "Pre-remove hook {:?} for {:?} exited with {}",
            self.program, path, status
        );
        Ok(status.success())
    }
}

impl PreRemoveHook for CommandHook {
    fn try_remove(&self, ctx: &OperationContext, path: &Path) -> RemovalDecision {
        if ctx.is_cancelled() {
            debug!("Skipping pre-remove hook for {:?}: cancelled", path);
            return RemovalDecision::deny();
        }
        self.run(path).into()
    }
}
