//! Path resolution: turn a user-supplied image path into an absolute file path.
//!
//! ## Why a second attempt?
//!
//! Tool callers frequently copy a path from a different working-directory
//! context, e.g. `someproject/pic.jpeg` while the server already runs inside
//! `someproject/`. Resolution therefore tries, in order:
//!
//! 1. `<base>/<reference>`
//! 2. `<base>/<reference minus its first component>` (only when the reference
//!    has at least two components)
//!
//! Exactly one leading component is ever stripped. When neither candidate
//! exists the error lists every path that was tried, so the caller can see
//! which directory assumption was wrong.

use crate::error::AnalyzerError;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolves image references against a fixed base directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
    home_dir: Option<PathBuf>,
}

impl PathResolver {
    /// Resolver rooted at `base_dir`, expanding `~` to the user's home.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            home_dir: dirs::home_dir(),
        }
    }

    /// Override the directory `~` expands to.
    pub fn with_home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve `reference` to an existing path, or to the canonical form of
    /// an absolute reference (whose existence the caller checks).
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, AnalyzerError> {
        let path = self.expand_home(reference);

        if path.is_absolute() {
            return Ok(canonicalize_lenient(&path));
        }

        let attempts = self.candidates(&path);
        for (i, candidate) in attempts.iter().enumerate() {
            if candidate.exists() {
                if i == 0 {
                    debug!("Resolved relative path '{}' to: {}", reference, candidate.display());
                } else {
                    debug!(
                        "Resolved relative path '{}' to: {} (stripped first component)",
                        reference,
                        candidate.display()
                    );
                }
                return Ok(candidate.clone());
            }
        }

        Err(AnalyzerError::NotFound {
            reference: reference.to_string(),
            attempts,
        })
    }

    /// Every absolute path a relative reference may resolve to, in order.
    pub fn candidates(&self, relative: &Path) -> Vec<PathBuf> {
        let parts: Vec<Component<'_>> = relative
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();

        let mut out = vec![canonicalize_lenient(&self.base_dir.join(relative))];
        if parts.len() > 1 {
            let stripped: PathBuf = parts[1..].iter().collect();
            out.push(canonicalize_lenient(&self.base_dir.join(stripped)));
        }
        out
    }

    fn expand_home(&self, reference: &str) -> PathBuf {
        match (reference.strip_prefix('~'), &self.home_dir) {
            (Some(""), Some(home)) => home.clone(),
            (Some(rest), Some(home)) if rest.starts_with('/') || rest.starts_with('\\') => {
                home.join(&rest[1..])
            }
            _ => PathBuf::from(reference),
        }
    }
}

/// Follow symlinks when the path exists; otherwise normalise lexically.
///
/// `std::fs::canonicalize` fails on missing paths, but a missing candidate
/// still needs a stable absolute form for the not-found message.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// tmp/
    ///   someproject/image1.jpg
    ///   image2.jpg
    ///   nested/deep/image3.jpg
    fn layout() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        fs::create_dir_all(root.join("someproject")).unwrap();
        fs::create_dir_all(root.join("nested/deep")).unwrap();
        fs::write(root.join("someproject/image1.jpg"), b"fake 1").unwrap();
        fs::write(root.join("image2.jpg"), b"fake 2").unwrap();
        fs::write(root.join("nested/deep/image3.jpg"), b"fake 3").unwrap();
        (tmp, root)
    }

    #[test]
    fn absolute_path_is_returned_canonical() {
        let (_tmp, root) = layout();
        let resolver = PathResolver::new("/definitely/not/used");
        let got = resolver
            .resolve(root.join("someproject/./image1.jpg").to_str().unwrap())
            .unwrap();
        assert_eq!(got, root.join("someproject/image1.jpg"));
    }

    #[test]
    fn absolute_missing_path_is_not_checked() {
        let resolver = PathResolver::new("/unused");
        let got = resolver.resolve("/tmp/whatever/x.jpg").unwrap();
        assert_eq!(got, PathBuf::from("/tmp/whatever/x.jpg"));
    }

    #[test]
    fn first_attempt_wins_when_present() {
        let (_tmp, root) = layout();
        let got = PathResolver::new(&root)
            .resolve("someproject/image1.jpg")
            .unwrap();
        assert_eq!(got, root.join("someproject/image1.jpg"));
    }

    #[test]
    fn fallback_strips_leading_component() {
        let (_tmp, root) = layout();
        let got = PathResolver::new(&root)
            .resolve("someproject/image2.jpg")
            .unwrap();
        assert_eq!(got, root.join("image2.jpg"));
    }

    #[test]
    fn fallback_strips_only_one_component() {
        let (_tmp, root) = layout();
        // a/b/nested/deep/image3.jpg → b/nested/deep/image3.jpg, never nested/…
        let err = PathResolver::new(&root)
            .resolve("a/b/nested/deep/image3.jpg")
            .unwrap_err();
        match err {
            AnalyzerError::NotFound { attempts, .. } => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[1], root.join("b/nested/deep/image3.jpg"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn single_component_makes_one_attempt() {
        let (_tmp, root) = layout();
        let resolver = PathResolver::new(&root);
        assert_eq!(resolver.candidates(Path::new("x.jpg")).len(), 1);
        assert_eq!(resolver.candidates(Path::new("./x.jpg")).len(), 1);

        let msg = resolver.resolve("x.jpg").unwrap_err().to_string();
        assert!(msg.contains("x.jpg"));
        assert!(!msg.contains(" and "), "single component must not list a second path: {msg}");
    }

    #[test]
    fn not_found_message_lists_both_attempts() {
        let (_tmp, root) = layout();
        let msg = PathResolver::new(&root)
            .resolve("proj/missing.png")
            .unwrap_err()
            .to_string();
        assert!(msg.contains("proj/missing.png"));
        assert!(msg.contains(&root.join("proj/missing.png").display().to_string()));
        assert!(msg.contains(&root.join("missing.png").display().to_string()));
    }

    #[test]
    fn tilde_expands_to_home() {
        let (_tmp, root) = layout();
        let resolver = PathResolver::new("/unused").with_home_dir(&root);
        let got = resolver.resolve("~/image2.jpg").unwrap();
        assert_eq!(got, root.join("image2.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_resolve_to_target() {
        let (_tmp, root) = layout();
        std::os::unix::fs::symlink(root.join("image2.jpg"), root.join("link.jpg")).unwrap();
        let got = PathResolver::new(&root).resolve("link.jpg").unwrap();
        assert_eq!(got, root.join("image2.jpg"));
    }

    #[test]
    fn lexical_normalisation_handles_parent_dirs() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}
