use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{DEFAULT_EXCLUDED_DIRS, ExcludeMode};

/// File name of the manifests the locator searches for.
pub const MANIFEST_FILE_NAME: &str = "Cargo.toml";

/// Directory patterns that keep non-workspace manifests out of the matrix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExclusionPolicy {
    mode: ExcludeMode,
    patterns: BTreeSet<String>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(ExcludeMode::Append, Vec::new())
    }
}

impl ExclusionPolicy {
    pub fn new(mode: ExcludeMode, user_patterns: impl IntoIterator<Item = String>) -> Self {
        let mut patterns: BTreeSet<String> = user_patterns
            .into_iter()
            .map(|pattern| pattern.trim().replace('\\', "/"))
            .filter(|pattern| !pattern.is_empty())
            .collect();
        if mode == ExcludeMode::Append {
            patterns.extend(DEFAULT_EXCLUDED_DIRS.iter().map(|dir| dir.to_string()));
        }
        Self { mode, patterns }
    }

    pub fn mode(&self) -> ExcludeMode {
        self.mode
    }

    pub fn patterns(&self) -> &BTreeSet<String> {
        &self.patterns
    }

    /// Returns true when `relative_dir` (relative to the repository root, with
    /// `.` or an empty path for the root itself) matches any pattern.
    ///
    /// Patterns containing `/` match the directory or anything below it.
    /// Bare names match whole path components only, so `target` does not
    /// exclude `target_custom`.
    pub fn is_excluded(&self, relative_dir: &Path) -> bool {
        let components: Vec<String> = relative_dir
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let posix = if components.is_empty() {
            ".".to_string()
        } else {
            components.join("/")
        };

        self.patterns.iter().any(|pattern| {
            let normalized = pattern.replace('\\', "/");
            let normalized = normalized.trim_matches('/');
            if normalized.is_empty() {
                return false;
            }
            if normalized.contains('/') {
                posix == normalized || posix.starts_with(&format!("{normalized}/"))
            } else {
                components.iter().any(|part| part == normalized)
            }
        })
    }
}

/// Returns every manifest below `root`, sorted by path components.
///
/// The walk is unrestricted: exclusion is decided later, once workspace
/// declarations are known. Entries that cannot be read are logged and
/// skipped.
pub fn find_manifests(root: &Path) -> Vec<PathBuf> {
    let mut manifests: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(%err, "skipping unreadable path during manifest discovery");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        if entry.file_name() == MANIFEST_FILE_NAME {
            manifests.push(entry.into_path());
        }
    }
    manifests.sort();
    manifests
}

/// Directory of `manifest` relative to `root`, or `None` when the manifest
/// does not live under `root`.
pub fn relative_manifest_dir(root: &Path, manifest: &Path) -> Option<PathBuf> {
    let dir = manifest.parent()?;
    dir.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Identity used to compare manifests: the canonical path when it exists,
/// otherwise the path made absolute against the current directory.
pub fn resolve_identity(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch_manifest(root: &Path, rel: &str) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        let manifest = dir.join(MANIFEST_FILE_NAME);
        fs::write(&manifest, "[package]\nname = \"x\"\n").unwrap();
        manifest
    }

    #[test]
    fn find_manifests_walks_everything_in_component_order() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        touch_manifest(root, "");
        touch_manifest(root, "a-b");
        touch_manifest(root, "a/b");
        touch_manifest(root, "target/debug/build");
        fs::write(root.join("README.md"), "not a manifest").unwrap();

        let found: Vec<PathBuf> = find_manifests(root)
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            found,
            vec![
                PathBuf::from("Cargo.toml"),
                PathBuf::from("a/b/Cargo.toml"),
                PathBuf::from("a-b/Cargo.toml"),
                PathBuf::from("target/debug/build/Cargo.toml"),
            ]
        );
    }

    #[test]
    fn default_policy_matches_whole_components_only() {
        let policy = ExclusionPolicy::default();
        assert!(policy.is_excluded(Path::new("target")));
        assert!(policy.is_excluded(Path::new("web/node_modules/pkg")));
        assert!(!policy.is_excluded(Path::new("target_custom")));
        assert!(!policy.is_excluded(Path::new("crates/core")));
    }

    #[test]
    fn repository_root_is_never_excluded_by_name() {
        let policy = ExclusionPolicy::default();
        assert!(!policy.is_excluded(Path::new("")));
        assert!(!policy.is_excluded(Path::new(".")));
    }

    #[test]
    fn slash_patterns_match_by_prefix() {
        let policy = ExclusionPolicy::new(
            ExcludeMode::Replace,
            vec!["/tools/legacy/".to_string()],
        );
        assert!(policy.is_excluded(Path::new("tools/legacy")));
        assert!(policy.is_excluded(Path::new("tools/legacy/inner")));
        assert!(!policy.is_excluded(Path::new("tools/legacy-next")));
        assert!(!policy.is_excluded(Path::new("other/tools/legacy")));
    }

    #[test]
    fn replace_mode_drops_default_denylist() {
        let policy = ExclusionPolicy::new(ExcludeMode::Replace, vec!["scratch".to_string()]);
        assert!(!policy.is_excluded(Path::new("target")));
        assert!(policy.is_excluded(Path::new("scratch")));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let policy = ExclusionPolicy::default();
        assert!(!policy.is_excluded(Path::new("Target")));
    }

    #[test]
    fn relative_manifest_dir_strips_root() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_manifest_dir(root, Path::new("/repo/crates/a/Cargo.toml")),
            Some(PathBuf::from("crates/a"))
        );
        assert_eq!(
            relative_manifest_dir(root, Path::new("/repo/Cargo.toml")),
            Some(PathBuf::new())
        );
        assert_eq!(relative_manifest_dir(root, Path::new("/elsewhere/Cargo.toml")), None);
    }
}
