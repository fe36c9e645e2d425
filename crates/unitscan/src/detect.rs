use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::classifier::classify;
use crate::config::DetectionConfig;
use crate::error::UnitscanError;
use crate::locator::{MANIFEST_FILE_NAME, find_manifests, relative_manifest_dir, resolve_identity};
use crate::matrix::{Matrix, MatrixBuilder};
use crate::metadata::MetadataSource;
use crate::resolver::{MembershipResolver, WorkspaceDescriptor};

/// A discovered manifest together with its comparison identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredManifest {
    pub path: PathBuf,
    pub identity: PathBuf,
}

impl DiscoveredManifest {
    fn new(path: PathBuf) -> Self {
        let identity = resolve_identity(&path);
        Self { path, identity }
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Scans `root` and builds the CI matrix.
///
/// `metadata` is the authoritative membership source; pass `None` to rely on
/// `[workspace]` patterns only. Workspace roots are added before standalone
/// packages so they win deduplication.
pub fn detect(
    root: &Path,
    config: &DetectionConfig,
    metadata: Option<&dyn MetadataSource>,
) -> Result<Matrix, UnitscanError> {
    let root = fs::canonicalize(root).map_err(|err| {
        UnitscanError::Repository(err.to_string())
            .context(format!("unable to resolve repository root {}", root.display()))
    })?;

    let all_manifests: Vec<DiscoveredManifest> = find_manifests(&root)
        .into_iter()
        .map(DiscoveredManifest::new)
        .collect();
    let paths: Vec<PathBuf> = all_manifests.iter().map(|m| m.path.clone()).collect();
    let classification = classify(&paths);

    let workspace_identities: HashSet<PathBuf> = classification
        .workspaces
        .iter()
        .map(|manifest| resolve_identity(manifest))
        .collect();

    let candidates: Vec<DiscoveredManifest> = all_manifests
        .into_iter()
        .filter(|manifest| {
            workspace_identities.contains(&manifest.identity)
                || !is_excluded(&root, &manifest.path, config)
        })
        .collect();

    tracing::debug!(
        candidates = candidates.len(),
        workspaces = classification.workspaces.len(),
        unreadable = classification.unreadable.len(),
        "manifest discovery complete"
    );

    if candidates.is_empty() {
        return Ok(Matrix::default());
    }

    let workspace_roots: BTreeSet<PathBuf> = classification
        .workspaces
        .iter()
        .filter_map(|manifest| manifest.parent().map(Path::to_path_buf))
        .collect();

    let mut builder = MatrixBuilder::new();

    if workspace_roots.is_empty() {
        let dirs: BTreeSet<PathBuf> = candidates
            .iter()
            .map(|manifest| manifest.dir().to_path_buf())
            .collect();
        for dir in dirs {
            builder.add_path(&repo_relative(&root, &dir), false)?;
        }
        return builder.finish(config.max_matrix_entries);
    }

    let resolver = MembershipResolver::with_metadata(metadata);
    let mut workspaces: Vec<WorkspaceDescriptor> = Vec::with_capacity(workspace_roots.len());
    for ws_root in &workspace_roots {
        let descriptor = resolver.describe(&ws_root.join(MANIFEST_FILE_NAME));
        tracing::debug!(
            manifest = %descriptor.manifest().display(),
            authoritative = descriptor.membership().is_authoritative(),
            "workspace root added"
        );
        builder.add_path(&repo_relative(&root, ws_root), true)?;
        workspaces.push(descriptor);
    }

    for manifest in &candidates {
        if workspace_identities.contains(&manifest.identity) {
            continue;
        }
        let claimed = workspaces
            .iter()
            .any(|ws| ws.claims(&manifest.path, &manifest.identity));
        if !claimed {
            builder.add_path(&repo_relative(&root, manifest.dir()), false)?;
        }
    }

    builder.finish(config.max_matrix_entries)
}

fn is_excluded(root: &Path, manifest: &Path, config: &DetectionConfig) -> bool {
    match relative_manifest_dir(root, manifest) {
        Some(relative) => config.exclusion.is_excluded(&relative),
        None => true,
    }
}

/// `dir` relative to `root`; directories outside the root are returned as-is
/// and later rejected by path-safety validation.
fn repo_relative(root: &Path, dir: &Path) -> PathBuf {
    dir.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixEntry;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn entry(dir: &str, is_workspace: bool) -> MatrixEntry {
        MatrixEntry {
            dir: dir.to_string(),
            is_workspace,
        }
    }

    #[test]
    fn empty_tree_yields_empty_matrix() {
        let temp = tempdir().unwrap();
        let matrix = detect(temp.path(), &DetectionConfig::default(), None).unwrap();
        assert!(!matrix.has_units());
    }

    #[test]
    fn standalone_packages_are_sorted_and_deduplicated() {
        let temp = tempdir().unwrap();
        write(temp.path(), "b/Cargo.toml", "[package]\nname = \"b\"\n");
        write(temp.path(), "a/Cargo.toml", "[package]\nname = \"a\"\n");
        write(temp.path(), "target/x/Cargo.toml", "[package]\nname = \"x\"\n");

        let matrix = detect(temp.path(), &DetectionConfig::default(), None).unwrap();
        assert_eq!(matrix.include, vec![entry("a", false), entry("b", false)]);
    }

    #[test]
    fn missing_root_is_a_repository_error() {
        let temp = tempdir().unwrap();
        let err = detect(&temp.path().join("absent"), &DetectionConfig::default(), None)
            .unwrap_err();
        assert!(matches!(err, UnitscanError::Repository(_)));
    }
}
