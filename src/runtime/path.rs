//! Path helpers for link targets.

use std::path::{Path, PathBuf};

/// Target for a symlink at `from_link` that points at `to_target`, relative
/// to the directory holding the link.
///
/// A version link at `pkgs/agent/stable` pointing at `pkgs/agent/7.50.0`
/// becomes `7.50.0`, which resolves the same from any working directory.
///
/// Returns `None` if a relative path cannot be computed (e.g. one path is
/// absolute and the other is not, or different drive letters on Windows).
pub(crate) fn relative_symlink_path(from_link: &Path, to_target: &Path) -> Option<PathBuf> {
    let from_dir = from_link.parent()?;
    if from_dir.is_absolute() != to_target.is_absolute() {
        return None;
    }
    let result = pathdiff::diff_paths(to_target, from_dir)?;

    if result.is_absolute() || result.as_os_str().is_empty() {
        return None;
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_symlink_path_sibling() {
        let result = relative_symlink_path(
            Path::new("/opt/packages/agent/stable"),
            Path::new("/opt/packages/agent/7.50.0"),
        );
        assert_eq!(result, Some(PathBuf::from("7.50.0")));
    }

    #[test]
    fn test_relative_symlink_path_relative_root() {
        let result = relative_symlink_path(
            Path::new("pkgs/agent/experiment"),
            Path::new("pkgs/agent/7.51.0"),
        );
        assert_eq!(result, Some(PathBuf::from("7.51.0")));
    }

    #[test]
    fn test_relative_symlink_path_other_directory() {
        let result = relative_symlink_path(
            Path::new("/opt/packages/agent/stable"),
            Path::new("/srv/versions/7.50.0"),
        );
        assert_eq!(
            result,
            Some(PathBuf::from("../../../srv/versions/7.50.0"))
        );
    }

    #[test]
    fn test_relative_symlink_path_mixed_forms() {
        assert_eq!(
            relative_symlink_path(
                Path::new("pkgs/agent/stable"),
                Path::new("/opt/packages/agent/7.50.0"),
            ),
            None
        );
        assert_eq!(
            relative_symlink_path(Path::new("stable"), Path::new("/opt/7.50.0")),
            None
        );
    }
}
