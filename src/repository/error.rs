use std::path::PathBuf;

/// Classifiable repository failures.
///
/// Operations return `anyhow::Error` with step context layered on top; use
/// [`RepositoryError::find`] to recover the kind from a wrapped error.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository not created")]
    NotCreated,

    /// A link resolves to something that is not there any more.
    #[error("link {link:?} is corrupted: {reason}")]
    Corruption { link: PathBuf, reason: String },

    #[error("invalid package name {0:?}")]
    InvalidName(String),

    #[error("target package {0:?} already exists")]
    AlreadyExists(String),

    #[error("{0}, invalid state")]
    InvalidState(String),

    #[error("no experiment to promote")]
    NoExperiment,

    /// Some version directories survived cleanup, usually vetoed by a hook.
    #[error("could not delete root directory {0:?}, not empty after cleanup")]
    NotEmpty(PathBuf),
}

impl RepositoryError {
    /// Walk the error chain looking for a repository error.
    pub fn find(error: &anyhow::Error) -> Option<&RepositoryError> {
        error.chain().find_map(|cause| cause.downcast_ref::<RepositoryError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_find_through_context() {
        let err = Err::<(), _>(RepositoryError::NoExperiment)
            .context("could not promote")
            .unwrap_err();

        assert_eq!(err.to_string(), "could not promote");
        assert!(matches!(
            RepositoryError::find(&err),
            Some(RepositoryError::NoExperiment)
        ));
    }

    #[test]
    fn test_find_unrelated_error() {
        let err = anyhow::anyhow!("disk on fire");
        assert!(RepositoryError::find(&err).is_none());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            RepositoryError::InvalidState("stable link does not exist".into()).to_string(),
            "stable link does not exist, invalid state"
        );
        assert_eq!(
            RepositoryError::InvalidName("stable".into()).to_string(),
            r#"invalid package name "stable""#
        );
    }
}
