//! Path helpers

use std::path::{Component, Path, PathBuf};

/// Normalize `.` and `..` components without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `path` against `base` unless it is already absolute
pub fn absolutize(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    normalize_path(&base.join(path.as_ref()))
}

/// Path of `target` relative to the directory `from`. Both must be absolute
/// and normalized.
pub fn relative_path(from: &Path, target: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let target: Vec<Component> = target.components().collect();

    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_absolutize_keeps_absolute_paths() {
        assert_eq!(
            absolutize(Path::new("/project"), "/x/y"),
            PathBuf::from("/x/y")
        );
        assert_eq!(
            absolutize(Path::new("/project"), "build/dev"),
            PathBuf::from("/project/build/dev")
        );
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/p"), Path::new("/p/build/console/runner.js")),
            PathBuf::from("build/console/runner.js")
        );
        assert_eq!(
            relative_path(Path::new("/p/bin"), Path::new("/p/build/runner.js")),
            PathBuf::from("../build/runner.js")
        );
    }
}
