use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

fn workspace_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(?m)^\s*\[\s*workspace\s*\]").expect("workspace marker regex is valid")
    })
}

/// Cheap textual check for a `[workspace]` table header.
///
/// This is a pre-filter only; the structural parse happens when membership
/// patterns are actually needed.
pub fn declares_workspace(contents: &str) -> bool {
    workspace_marker().is_match(contents)
}

/// Outcome of classifying the discovered manifests.
#[derive(Clone, Debug, Default)]
pub struct Classification {
    /// Manifests that declare a workspace, in discovery order.
    pub workspaces: Vec<PathBuf>,
    /// Manifests that could not be read.
    pub unreadable: Vec<PathBuf>,
}

/// Reads every manifest and records which ones declare a workspace.
/// Unreadable manifests are logged and never classified as workspaces.
pub fn classify(manifests: &[PathBuf]) -> Classification {
    let mut classification = Classification::default();
    for manifest in manifests {
        match read_lossy(manifest) {
            Ok(contents) => {
                if declares_workspace(&contents) {
                    classification.workspaces.push(manifest.clone());
                }
            }
            Err(err) => {
                tracing::warn!(
                    manifest = %manifest.display(),
                    %err,
                    "skipping unreadable manifest"
                );
                classification.unreadable.push(manifest.clone());
            }
        }
    }
    classification
}

fn read_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn marker_tolerates_leading_whitespace_and_inner_spaces() {
        assert!(declares_workspace("[workspace]\nmembers = []\n"));
        assert!(declares_workspace("[package]\nname = \"a\"\n\n   [ workspace ]\n"));
        assert!(declares_workspace("\t[workspace]"));
    }

    #[test]
    fn marker_rejects_subtables_and_mentions() {
        assert!(!declares_workspace("[workspace.dependencies]\nserde = \"1\"\n"));
        assert!(!declares_workspace("# [workspace] is commented out\n"));
        assert!(!declares_workspace("description = \"[workspace]\"\n"));
        assert!(!declares_workspace("[package]\nworkspace = \"..\"\n"));
    }

    #[test]
    fn classify_records_workspaces_and_unreadable_manifests() {
        let temp = tempdir().unwrap();
        let ws = temp.path().join("Cargo.toml");
        fs::write(&ws, "[workspace]\nmembers = [\"crates/*\"]\n").unwrap();
        let pkg_dir = temp.path().join("crates/a");
        fs::create_dir_all(&pkg_dir).unwrap();
        let pkg = pkg_dir.join("Cargo.toml");
        fs::write(&pkg, "[package]\nname = \"a\"\n").unwrap();
        let missing = temp.path().join("gone/Cargo.toml");

        let result = classify(&[ws.clone(), pkg, missing.clone()]);
        assert_eq!(result.workspaces, vec![ws]);
        assert_eq!(result.unreadable, vec![missing]);
    }

    #[test]
    fn classify_accepts_invalid_utf8() {
        let temp = tempdir().unwrap();
        let manifest = temp.path().join("Cargo.toml");
        let mut bytes = b"[workspace]\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        fs::write(&manifest, bytes).unwrap();

        let result = classify(std::slice::from_ref(&manifest));
        assert_eq!(result.workspaces, vec![manifest]);
    }
}
