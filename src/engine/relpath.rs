//! Relative-path resolver (§4.2).
//!
//! Given a source and a duplicate path, produces the text a `symlink(2)`
//! call at the duplicate's location should use to reach the source,
//! collapsing the common path prefix so the result stays valid if the pair
//! is later moved together. Mirrors the original's `jc_make_relative_link_name`.

use std::env;
use std::path::{Path, PathBuf};

use crate::engine::platform::FsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelLinkTarget {
    Text(String),
    SameCanonicalPath,
}

pub fn make_relative_link_name(
    source: &Path,
    duplicate: &Path,
) -> Result<RelLinkTarget, FsError> {
    let source_abs = absolutize(source);
    let duplicate_abs = absolutize(duplicate);

    if source_abs == duplicate_abs {
        return Ok(RelLinkTarget::SameCanonicalPath);
    }

    let duplicate_dir = duplicate_abs
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    Ok(RelLinkTarget::Text(relative_from(&source_abs, &duplicate_dir)))
}

fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize(&joined)
}

/// Collapse `.`/`..` components lexically, without touching the filesystem
/// (the path may not exist yet, e.g. the duplicate mid-rename).
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Build the relative path from `from_dir` to `to_path`, sharing the longest
/// common prefix of components.
fn relative_from(to_path: &Path, from_dir: &Path) -> String {
    let to_components: Vec<_> = to_path.components().collect();
    let from_components: Vec<_> = from_dir.components().collect();

    let mut common = 0;
    let max_common = to_components.len().min(from_components.len());
    while common < max_common && to_components[common] == from_components[common] {
        common += 1;
    }

    let mut result = PathBuf::new();
    for _ in common..from_components.len() {
        result.push("..");
    }
    for comp in &to_components[common..] {
        result.push(comp.as_os_str());
    }

    if result.as_os_str().is_empty() {
        ".".to_string()
    } else {
        result.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_file() {
        let r = relative_from(Path::new("/a/b/target.txt"), Path::new("/a/b"));
        assert_eq!(r, "target.txt");
    }

    #[test]
    fn parent_file() {
        let r = relative_from(Path::new("/a/target.txt"), Path::new("/a/b"));
        assert_eq!(r, "../target.txt");
    }

    #[test]
    fn deep_divergence() {
        let r = relative_from(Path::new("/a/b/c/target.txt"), Path::new("/a/x/y"));
        assert_eq!(r, "../../b/c/target.txt");
    }

    #[test]
    fn same_canonical_path_is_detected() {
        let r = make_relative_link_name(Path::new("/a/b/f.txt"), Path::new("/a/b/../b/f.txt"))
            .unwrap();
        assert_eq!(r, RelLinkTarget::SameCanonicalPath);
    }
}
