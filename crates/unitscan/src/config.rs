use std::time::Duration;

use crate::locator::ExclusionPolicy;

pub const ENV_EXCLUDE_MODE: &str = "CI_MANIFEST_EXCLUDE_MODE";
pub const ENV_EXCLUDE_DIRS: &str = "CI_MANIFEST_EXCLUDE_DIRS";
pub const ENV_USE_CARGO_METADATA: &str = "CI_USE_CARGO_METADATA";
pub const ENV_METADATA_TIMEOUT: &str = "CI_CARGO_METADATA_TIMEOUT_SECONDS";
pub const ENV_MAX_MATRIX_ENTRIES: &str = "CI_MAX_MATRIX_ENTRIES";

pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_MATRIX_ENTRIES: usize = 128;

/// Directory names skipped unless a manifest in them declares a workspace.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".github",
    ".local",
    "target",
    "node_modules",
    "vendor",
    "dist",
    "build",
    "out",
    "tests",
    "test",
    "testdata",
    "fixtures",
    "fixture",
    "examples",
    "benches",
];

/// How user-supplied exclusion patterns combine with [`DEFAULT_EXCLUDED_DIRS`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExcludeMode {
    /// Default denylist plus user patterns.
    #[default]
    Append,
    /// User patterns only.
    Replace,
}

impl ExcludeMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "append" => Some(Self::Append),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

/// Whether membership is resolved through `cargo metadata` before falling back
/// to parsing `[workspace]` patterns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MetadataMode {
    /// Query when cargo is on `PATH`.
    #[default]
    Auto,
    /// Query; warn when cargo is missing and fall back.
    Required,
    /// Never query.
    Disabled,
}

impl MetadataMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "true" => Some(Self::Required),
            "false" => Some(Self::Disabled),
            _ => None,
        }
    }

    pub fn wants_query(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Everything a detection run needs, resolved up front.
#[derive(Clone, Debug)]
pub struct DetectionConfig {
    pub exclusion: ExclusionPolicy,
    pub metadata: MetadataMode,
    pub metadata_timeout: Duration,
    pub max_matrix_entries: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            exclusion: ExclusionPolicy::default(),
            metadata: MetadataMode::Auto,
            metadata_timeout: Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS),
            max_matrix_entries: DEFAULT_MAX_MATRIX_ENTRIES,
        }
    }
}

impl DetectionConfig {
    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Invalid values are
    /// reported at `warn` and replaced with their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let exclude_mode = lookup(ENV_EXCLUDE_MODE)
            .map(|raw| {
                ExcludeMode::parse(&raw).unwrap_or_else(|| {
                    tracing::warn!(
                        "Unknown {ENV_EXCLUDE_MODE}='{}' (expected append|replace); treating as append",
                        raw.trim()
                    );
                    ExcludeMode::Append
                })
            })
            .unwrap_or_default();

        let user_patterns = lookup(ENV_EXCLUDE_DIRS)
            .map(|raw| split_patterns(&raw))
            .unwrap_or_default();

        let metadata = lookup(ENV_USE_CARGO_METADATA)
            .map(|raw| {
                MetadataMode::parse(&raw).unwrap_or_else(|| {
                    tracing::warn!(
                        "Unknown {ENV_USE_CARGO_METADATA}='{}' (expected auto|true|false); treating as auto",
                        raw.trim()
                    );
                    MetadataMode::Auto
                })
            })
            .unwrap_or_default();

        let metadata_timeout = lookup(ENV_METADATA_TIMEOUT)
            .map(|raw| parse_timeout(&raw))
            .unwrap_or(Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS));

        let max_matrix_entries = lookup(ENV_MAX_MATRIX_ENTRIES)
            .map(|raw| parse_max_entries(&raw))
            .unwrap_or(DEFAULT_MAX_MATRIX_ENTRIES);

        Self {
            exclusion: ExclusionPolicy::new(exclude_mode, user_patterns),
            metadata,
            metadata_timeout,
            max_matrix_entries,
        }
    }
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.replace('\\', "/"))
        .collect()
}

/// Parses a signed decimal integer. Values outside `i64` saturate instead of
/// being rejected.
fn parse_integer(raw: &str) -> Option<i64> {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let saturated = if raw.starts_with('-') { i64::MIN } else { i64::MAX };
    Some(raw.parse::<i64>().unwrap_or(saturated))
}

fn parse_timeout(raw: &str) -> Duration {
    let trimmed = raw.trim();
    match parse_integer(trimmed) {
        Some(secs) => Duration::from_secs(secs.max(1).unsigned_abs()),
        None => {
            tracing::warn!(
                "Invalid {ENV_METADATA_TIMEOUT}='{trimmed}', defaulting to {DEFAULT_METADATA_TIMEOUT_SECS}"
            );
            Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS)
        }
    }
}

fn parse_max_entries(raw: &str) -> usize {
    let trimmed = raw.trim();
    match parse_integer(trimmed) {
        Some(value) if value >= 1 => usize::try_from(value).unwrap_or(usize::MAX),
        _ => {
            tracing::warn!(
                "Invalid {ENV_MAX_MATRIX_ENTRIES}='{trimmed}', defaulting to {DEFAULT_MAX_MATRIX_ENTRIES}"
            );
            DEFAULT_MAX_MATRIX_ENTRIES
        }
    }
}
