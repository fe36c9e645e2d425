use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use toml_edit::{DocumentMut, Item};

use crate::metadata::MetadataSource;
use crate::pattern::matches_any;

/// How a workspace decides which manifests belong to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Membership {
    /// Canonical member manifest paths reported by `cargo metadata`.
    Authoritative(BTreeSet<PathBuf>),
    /// `[workspace] members` / `exclude` globs from the manifest itself.
    Declared {
        members: Vec<String>,
        exclude: Vec<String>,
    },
}

impl Membership {
    pub fn empty() -> Self {
        Membership::Declared {
            members: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self, Membership::Authoritative(_))
    }
}

/// A resolved workspace: its root directory, manifest and membership rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceDescriptor {
    root: PathBuf,
    manifest: PathBuf,
    membership: Membership,
}

impl WorkspaceDescriptor {
    pub fn new(manifest: PathBuf, membership: Membership) -> Self {
        let root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            root,
            manifest,
            membership,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Decides whether the manifest at `manifest` (with canonical path
    /// `identity`) is a member of this workspace.
    ///
    /// Authoritative membership is decided by identity alone. Declared
    /// membership requires the manifest to live under the workspace root and
    /// its directory to match a `members` glob and no `exclude` glob.
    pub fn claims(&self, manifest: &Path, identity: &Path) -> bool {
        match &self.membership {
            Membership::Authoritative(members) => members.contains(identity),
            Membership::Declared { members, exclude } => {
                if members.is_empty() {
                    return false;
                }
                let Some(dir) = manifest.parent() else {
                    return false;
                };
                let Ok(relative) = dir.strip_prefix(&self.root) else {
                    return false;
                };
                let relative = posix_relative(relative);
                matches_any(&relative, members) && !matches_any(&relative, exclude)
            }
        }
    }
}

fn posix_relative(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// One way of determining a workspace's members.
pub trait MembershipStrategy {
    fn name(&self) -> &'static str;

    /// Returns `None` when this strategy has no answer for `manifest`, letting
    /// the next strategy try.
    fn resolve_members(&self, manifest: &Path) -> Option<Membership>;
}

/// Tier A: ask an external metadata source.
pub struct AuthoritativeMembership<S> {
    source: S,
}

impl<S: MetadataSource> AuthoritativeMembership<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: MetadataSource> MembershipStrategy for AuthoritativeMembership<S> {
    fn name(&self) -> &'static str {
        "cargo-metadata"
    }

    fn resolve_members(&self, manifest: &Path) -> Option<Membership> {
        match self.source.query(manifest) {
            Ok(metadata) => Some(Membership::Authoritative(metadata.member_manifests)),
            Err(err) => {
                tracing::warn!(
                    manifest = %manifest.display(),
                    %err,
                    "authoritative metadata unavailable; falling back to manifest patterns"
                );
                None
            }
        }
    }
}

/// Tier B: read `[workspace] members` and `exclude` from the manifest.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeclaredMembership;

impl MembershipStrategy for DeclaredMembership {
    fn name(&self) -> &'static str {
        "manifest-patterns"
    }

    fn resolve_members(&self, manifest: &Path) -> Option<Membership> {
        let contents = match fs::read_to_string(manifest) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(
                    manifest = %manifest.display(),
                    %err,
                    "unable to read workspace manifest"
                );
                return None;
            }
        };
        match declared_membership(&contents) {
            Ok(membership) => Some(membership),
            Err(err) => {
                tracing::warn!(
                    manifest = %manifest.display(),
                    %err,
                    "unable to parse workspace manifest"
                );
                None
            }
        }
    }
}

/// Parses `[workspace] members` / `exclude` out of manifest text.
pub fn declared_membership(contents: &str) -> Result<Membership, toml_edit::TomlError> {
    let doc: DocumentMut = contents.parse()?;
    let workspace = doc.get("workspace").and_then(Item::as_table_like);
    let members = workspace
        .and_then(|table| table.get("members"))
        .map(normalize_patterns)
        .unwrap_or_default();
    let exclude = workspace
        .and_then(|table| table.get("exclude"))
        .map(normalize_patterns)
        .unwrap_or_default();
    Ok(Membership::Declared { members, exclude })
}

/// A bare string becomes a one-element list; non-string and blank entries are
/// dropped; backslashes become forward slashes.
fn normalize_patterns(item: &Item) -> Vec<String> {
    let clean = |raw: &str| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.replace('\\', "/"))
    };
    if let Some(single) = item.as_str() {
        return clean(single).into_iter().collect();
    }
    item.as_array()
        .map(|array| {
            array
                .iter()
                .filter_map(|value| value.as_str())
                .filter_map(clean)
                .collect()
        })
        .unwrap_or_default()
}

/// Tries membership strategies in priority order; the first answer wins.
pub struct MembershipResolver<'a> {
    strategies: Vec<Box<dyn MembershipStrategy + 'a>>,
}

impl<'a> MembershipResolver<'a> {
    pub fn new(strategies: Vec<Box<dyn MembershipStrategy + 'a>>) -> Self {
        Self { strategies }
    }

    /// Authoritative queries through `source` when present, then declared
    /// patterns.
    pub fn with_metadata(source: Option<&'a dyn MetadataSource>) -> Self {
        let mut strategies: Vec<Box<dyn MembershipStrategy + 'a>> = Vec::new();
        if let Some(source) = source {
            strategies.push(Box::new(AuthoritativeMembership::new(source)));
        }
        strategies.push(Box::new(DeclaredMembership));
        Self::new(strategies)
    }

    pub fn describe(&self, manifest: &Path) -> WorkspaceDescriptor {
        let membership = self
            .strategies
            .iter()
            .find_map(|strategy| {
                let membership = strategy.resolve_members(manifest)?;
                tracing::debug!(
                    manifest = %manifest.display(),
                    strategy = strategy.name(),
                    "resolved workspace membership"
                );
                Some(membership)
            })
            .unwrap_or_else(Membership::empty);
        WorkspaceDescriptor::new(manifest.to_path_buf(), membership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataError, WorkspaceMetadata};
    use tempfile::tempdir;

    struct FixedSource(Option<BTreeSet<PathBuf>>);

    impl MetadataSource for FixedSource {
        fn query(&self, _manifest: &Path) -> Result<WorkspaceMetadata, MetadataError> {
            match &self.0 {
                Some(members) => Ok(WorkspaceMetadata {
                    workspace_root: PathBuf::from("/ws"),
                    member_manifests: members.clone(),
                }),
                None => Err(MetadataError::Shape("stub")),
            }
        }
    }

    fn declared(members: &[&str], exclude: &[&str]) -> Membership {
        Membership::Declared {
            members: members.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn declared_membership_normalizes_lists() {
        let toml = r#"
[workspace]
members = ["crates/*", "", 3, "  tools\\gen  "]
exclude = "crates/legacy"
"#;
        assert_eq!(
            declared_membership(toml).unwrap(),
            declared(&["crates/*", "tools/gen"], &["crates/legacy"])
        );
    }

    #[test]
    fn declared_membership_without_lists_is_empty() {
        assert_eq!(declared_membership("[workspace]\n").unwrap(), Membership::empty());
        assert_eq!(
            declared_membership("[package]\nname = \"a\"\n").unwrap(),
            Membership::empty()
        );
    }

    #[test]
    fn declared_membership_accepts_inline_workspace_table() {
        assert_eq!(
            declared_membership("workspace = { members = [\"a\"] }\n").unwrap(),
            declared(&["a"], &[])
        );
    }

    #[test]
    fn declared_membership_reports_invalid_toml() {
        assert!(declared_membership("[workspace\nmembers = [").is_err());
    }

    #[test]
    fn declared_claims_respect_members_and_exclude() {
        let ws = WorkspaceDescriptor::new(
            PathBuf::from("/repo/Cargo.toml"),
            declared(&["crates/*"], &["crates/legacy"]),
        );
        let claims = |rel: &str| {
            let manifest = PathBuf::from("/repo").join(rel).join("Cargo.toml");
            ws.claims(&manifest, &manifest)
        };
        assert!(claims("crates/a"));
        assert!(!claims("crates/legacy"));
        assert!(!claims("tools/a"));
        assert!(!ws.claims(Path::new("/other/crates/a/Cargo.toml"), Path::new("/x")));
    }

    #[test]
    fn declared_claims_with_no_members_claim_nothing() {
        let ws = WorkspaceDescriptor::new(PathBuf::from("/repo/Cargo.toml"), declared(&[], &[]));
        let manifest = Path::new("/repo/crates/a/Cargo.toml");
        assert!(!ws.claims(manifest, manifest));
    }

    #[test]
    fn authoritative_claims_use_identity_only() {
        let members: BTreeSet<PathBuf> = [PathBuf::from("/real/tools/x/Cargo.toml")].into();
        let ws = WorkspaceDescriptor::new(
            PathBuf::from("/repo/Cargo.toml"),
            Membership::Authoritative(members),
        );
        assert!(ws.claims(
            Path::new("/repo/link/x/Cargo.toml"),
            Path::new("/real/tools/x/Cargo.toml")
        ));
        assert!(!ws.claims(
            Path::new("/repo/crates/a/Cargo.toml"),
            Path::new("/repo/crates/a/Cargo.toml")
        ));
    }

    #[test]
    fn resolver_prefers_authoritative_answer() {
        let temp = tempdir().unwrap();
        let manifest = temp.path().join("Cargo.toml");
        fs::write(&manifest, "[workspace]\nmembers = [\"crates/*\"]\n").unwrap();

        let source = FixedSource(Some(BTreeSet::new()));
        let resolver = MembershipResolver::with_metadata(Some(&source));
        let ws = resolver.describe(&manifest);
        assert_eq!(ws.membership(), &Membership::Authoritative(BTreeSet::new()));
        assert!(ws.membership().is_authoritative());
        assert_eq!(ws.manifest(), manifest.as_path());
        assert_eq!(ws.root(), temp.path());
    }

    #[test]
    fn resolver_falls_back_to_declared_patterns() {
        let temp = tempdir().unwrap();
        let manifest = temp.path().join("Cargo.toml");
        fs::write(&manifest, "[workspace]\nmembers = [\"crates/*\"]\n").unwrap();

        let source = FixedSource(None);
        let resolver = MembershipResolver::with_metadata(Some(&source));
        let ws = resolver.describe(&manifest);
        assert!(!ws.membership().is_authoritative());
        assert_eq!(ws.membership(), &declared(&["crates/*"], &[]));
    }

    #[test]
    fn resolver_defaults_to_empty_membership_on_parse_failure() {
        let temp = tempdir().unwrap();
        let manifest = temp.path().join("Cargo.toml");
        fs::write(&manifest, "[workspace]\nmembers = [\n").unwrap();

        let resolver = MembershipResolver::with_metadata(None);
        assert_eq!(resolver.describe(&manifest).membership(), &Membership::empty());
    }
}
