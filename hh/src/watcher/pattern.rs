//! Watch patterns: a glob plus the directory it is rooted in

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use thiserror::Error;

const GLOB_CHARS: &[char] = &['*', '?', '['];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Errors parsing a watch pattern
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty watch pattern")]
    Empty,

    #[error("invalid watch pattern '{pattern}': {reason}")]
    Invalid { pattern: String, reason: String },

    #[error("watch root is not valid UTF-8: {0}")]
    NonUtf8Root(PathBuf),
}

/// A glob describing which paths the session cares about
///
/// Relative patterns are anchored at the session root, so `*.ts` matches only
/// top-level files and `**/*.ts` matches at any depth.
#[derive(Debug, Clone)]
pub struct WatchPattern {
    raw: String,
    base: PathBuf,
    pattern: Pattern,
}

impl WatchPattern {
    pub fn parse(raw: &str, root: &Path) -> Result<Self, PatternError> {
        let raw = raw.trim();
        let relative = raw.strip_prefix("./").unwrap_or(raw);
        if relative.is_empty() {
            return Err(PatternError::Empty);
        }

        let full = if Path::new(relative).is_absolute() {
            relative.to_string()
        } else {
            let root_str = root.to_str().ok_or_else(|| PatternError::NonUtf8Root(root.to_path_buf()))?;
            format!("{}/{}", Pattern::escape(root_str.trim_end_matches('/')), relative)
        };

        let pattern = Pattern::new(&full).map_err(|e| PatternError::Invalid {
            pattern: raw.to_string(),
            reason: e.msg.to_string(),
        })?;

        Ok(Self {
            raw: raw.to_string(),
            base: root.join(literal_base(relative)),
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Deepest directory that contains every possible match
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.pattern.matches_path_with(path, MATCH_OPTIONS)
    }
}

/// Leading components that contain no glob metacharacters
///
/// For a pattern without any glob (a literal file), this is its parent.
fn literal_base(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut base = PathBuf::new();
    let mut saw_glob = false;

    for component in path.components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(GLOB_CHARS) {
            saw_glob = true;
            break;
        }
        base.push(component);
    }

    if !saw_glob {
        base.pop();
    }
    if base.as_os_str().is_empty() || base.components().all(|c| matches!(c, Component::CurDir)) {
        return PathBuf::new();
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/work/project")
    }

    #[test]
    fn test_recursive_pattern() {
        let p = WatchPattern::parse("**/*.ts", &root()).unwrap();
        assert_eq!(p.base(), root().as_path());
        assert!(p.matches(Path::new("/work/project/src/a.ts")));
        assert!(p.matches(Path::new("/work/project/a.ts")));
        assert!(p.matches(Path::new("/work/project/src/deep/er/b.ts")));
        assert!(!p.matches(Path::new("/work/project/src/a.rb")));
        assert!(!p.matches(Path::new("/elsewhere/src/a.ts")));
    }

    #[test]
    fn test_top_level_pattern_does_not_cross_directories() {
        let p = WatchPattern::parse("*.rb", &root()).unwrap();
        assert!(p.matches(Path::new("/work/project/Gemfile.rb")));
        assert!(!p.matches(Path::new("/work/project/app/models/user.rb")));
    }

    #[test]
    fn test_literal_prefix_becomes_base() {
        let p = WatchPattern::parse("app/javascript/**/*.js", &root()).unwrap();
        assert_eq!(p.base(), Path::new("/work/project/app/javascript"));
        assert!(p.matches(Path::new("/work/project/app/javascript/packs/app.js")));
        assert!(!p.matches(Path::new("/work/project/lib/app.js")));
    }

    #[test]
    fn test_dot_slash_prefix_is_ignored() {
        let p = WatchPattern::parse("./src/*.go", &root()).unwrap();
        assert_eq!(p.base(), Path::new("/work/project/src"));
        assert!(p.matches(Path::new("/work/project/src/main.go")));
    }

    #[test]
    fn test_literal_file_watches_its_directory() {
        let p = WatchPattern::parse("config/routes.rb", &root()).unwrap();
        assert_eq!(p.base(), Path::new("/work/project/config"));
        assert!(p.matches(Path::new("/work/project/config/routes.rb")));
    }

    #[test]
    fn test_absolute_pattern() {
        let p = WatchPattern::parse("/srv/app/**/*.py", &root()).unwrap();
        assert_eq!(p.base(), Path::new("/srv/app"));
        assert!(p.matches(Path::new("/srv/app/x/y.py")));
    }

    #[test]
    fn test_root_with_glob_chars_is_escaped() {
        let p = WatchPattern::parse("*.ts", Path::new("/work/[draft]")).unwrap();
        assert!(p.matches(Path::new("/work/[draft]/index.ts")));
    }

    #[test]
    fn test_empty_and_invalid_patterns() {
        assert!(matches!(WatchPattern::parse("  ", &root()), Err(PatternError::Empty)));
        assert!(matches!(
            WatchPattern::parse("src/[a", &root()),
            Err(PatternError::Invalid { .. })
        ));
    }
}
