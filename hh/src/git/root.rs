//! Nearest-repository lookup for a changed path

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Name of the version-control metadata entry (directory, or file for worktrees)
pub const GIT_ENTRY: &str = ".git";

/// A directory known to contain version-control metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitRoot(PathBuf);

impl GitRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for GitRoot {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for GitRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Find the nearest ancestor of `path` that contains a `.git` entry
///
/// The walk starts at the directory containing `path` and never opens the
/// file itself, so paths of files that were just deleted still resolve.
pub fn find_git_root(path: &Path) -> Option<GitRoot> {
    find_git_root_within(path, None)
}

/// Like [`find_git_root`], but stop once `ceiling` has been examined
pub fn find_git_root_within(path: &Path, ceiling: Option<&Path>) -> Option<GitRoot> {
    debug!(?path, ?ceiling, "find_git_root_within: called");
    let absolute = match std::path::absolute(path) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "find_git_root_within: could not make path absolute");
            return None;
        }
    };

    let start = absolute.parent()?;
    for dir in start.ancestors() {
        if dir.join(GIT_ENTRY).exists() {
            debug!(root = ?dir, "find_git_root_within: found");
            return Some(GitRoot::new(dir));
        }
        if ceiling.is_some_and(|c| c == dir) {
            debug!("find_git_root_within: reached ceiling");
            break;
        }
    }

    debug!("find_git_root_within: no repository");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_nearest_ancestor_wins() {
        let temp = TempDir::new().unwrap();
        let outer = temp.path().join("outer");
        let inner = outer.join("inner");
        let nested = inner.join("a").join("b").join("c");
        fs::create_dir_all(outer.join(".git")).unwrap();
        fs::create_dir_all(inner.join(".git")).unwrap();
        fs::create_dir_all(&nested).unwrap();

        let file = nested.join("main.rs");
        fs::write(&file, "fn main() {}").unwrap();

        let root = find_git_root(&file).unwrap();
        assert_eq!(root.path(), inner.as_path());
    }

    #[test]
    fn test_git_file_counts_as_root() {
        let temp = TempDir::new().unwrap();
        let worktree = temp.path().join("wt");
        fs::create_dir_all(worktree.join("src")).unwrap();
        fs::write(worktree.join(".git"), "gitdir: /elsewhere/.git/worktrees/wt\n").unwrap();

        let root = find_git_root(&worktree.join("src").join("lib.rs")).unwrap();
        assert_eq!(root.path(), worktree.as_path());
    }

    #[test]
    fn test_deleted_file_still_resolves() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let gone = temp.path().join("src").join("removed.ts");
        assert!(!gone.exists());

        let root = find_git_root(&gone).unwrap();
        assert_eq!(root.path(), temp.path());
    }

    #[test]
    fn test_not_found_below_ceiling() {
        let temp = TempDir::new().unwrap();
        let deep = temp.path().join("x").join("y");
        fs::create_dir_all(&deep).unwrap();

        let root = find_git_root_within(&deep.join("file.txt"), Some(temp.path()));
        assert!(root.is_none());
    }

    #[test]
    fn test_not_found_up_to_filesystem_root() {
        let path = Path::new("/happyhour-nonexistent-dir/swap.tmp");
        assert!(find_git_root(path).is_none());
    }

    #[test]
    fn test_ceiling_itself_is_examined() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let root = find_git_root_within(&temp.path().join("src").join("a.rs"), Some(temp.path())).unwrap();
        assert_eq!(root.path(), temp.path());
    }
}
