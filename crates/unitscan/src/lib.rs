pub mod classifier;
pub mod config;
pub mod detect;
pub mod error;
pub mod locator;
pub mod matrix;
pub mod metadata;
pub mod pattern;
pub mod resolver;

pub use classifier::{Classification, classify, declares_workspace};
pub use config::{DEFAULT_EXCLUDED_DIRS, DetectionConfig, ExcludeMode, MetadataMode};
pub use detect::{DiscoveredManifest, detect};
pub use error::{UnitscanError, UnsafeReason};
pub use locator::{ExclusionPolicy, MANIFEST_FILE_NAME, find_manifests};
pub use matrix::{Matrix, MatrixBuilder, MatrixEntry, validate as validate_matrix_dir};
pub use metadata::{CargoMetadataCommand, MetadataError, MetadataSource, WorkspaceMetadata};
pub use pattern::{literal_prefix, matches_any};
pub use resolver::{
    AuthoritativeMembership, DeclaredMembership, Membership, MembershipResolver,
    MembershipStrategy, WorkspaceDescriptor,
};
