use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use crate::config::MetadataMode;
use crate::locator::resolve_identity;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Authoritative workspace layout reported by an external query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceMetadata {
    pub workspace_root: PathBuf,
    /// Canonical manifest paths of every workspace member.
    pub member_manifests: BTreeSet<PathBuf>,
}

/// Reasons an authoritative query produced no usable answer. None of these
/// abort a run; the caller falls back to pattern parsing.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("cargo metadata timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("cargo metadata exited with {status}{}", format_stderr(.stderr))]
    Failed { status: ExitStatus, stderr: String },
    #[error("cargo metadata output was not valid JSON: {0}")]
    InvalidJson(String),
    #[error("cargo metadata output has an unexpected shape: {0}")]
    Shape(&'static str),
    #[error("io error while waiting for cargo metadata: {0}")]
    Io(#[from] io::Error),
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Source of authoritative membership for a single workspace manifest.
pub trait MetadataSource {
    fn query(&self, manifest: &Path) -> Result<WorkspaceMetadata, MetadataError>;
}

impl<T: MetadataSource + ?Sized> MetadataSource for &T {
    fn query(&self, manifest: &Path) -> Result<WorkspaceMetadata, MetadataError> {
        (**self).query(manifest)
    }
}

/// Runs `cargo metadata --no-deps` as a subprocess with a deadline.
#[derive(Clone, Debug)]
pub struct CargoMetadataCommand {
    program: PathBuf,
    leading_args: Vec<OsString>,
    timeout: Duration,
}

impl CargoMetadataCommand {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout,
        }
    }

    /// Arguments placed before the `metadata` subcommand, e.g. a toolchain
    /// selector or a wrapper script.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Resolves `cargo` on `PATH` according to `mode`. Returns `None` when
    /// queries are disabled or cargo cannot be found.
    pub fn from_mode(mode: MetadataMode, timeout: Duration) -> Option<Self> {
        if !mode.wants_query() {
            return None;
        }
        match which::which("cargo") {
            Ok(program) => Some(Self::new(program, timeout)),
            Err(err) => {
                if mode == MetadataMode::Required {
                    tracing::warn!(
                        %err,
                        "CI_USE_CARGO_METADATA=true but cargo not found; falling back to manifest parsing"
                    );
                } else {
                    tracing::debug!(%err, "cargo not found; using manifest parsing");
                }
                None
            }
        }
    }

    fn run(&self, manifest: &Path) -> Result<String, MetadataError> {
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(["metadata", "--format-version", "1", "--no-deps", "--manifest-path"])
            .arg(manifest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MetadataError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // A timeout too large to represent as an instant never expires.
        let deadline = Instant::now().checked_add(self.timeout);
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MetadataError::TimedOut(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        if !status.success() {
            return Err(MetadataError::Failed { status, stderr });
        }
        Ok(stdout)
    }
}

impl MetadataSource for CargoMetadataCommand {
    fn query(&self, manifest: &Path) -> Result<WorkspaceMetadata, MetadataError> {
        let stdout = self.run(manifest)?;
        parse_metadata(&stdout)
    }
}

fn drain<R>(stream: Option<R>) -> Option<JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Validates a `cargo metadata` document and extracts member manifests.
///
/// The top level must carry `packages` (array), `workspace_members` (array)
/// and `workspace_root` (string). Malformed package records and non-string
/// ids are ignored rather than rejected.
pub fn parse_metadata(stdout: &str) -> Result<WorkspaceMetadata, MetadataError> {
    let data: Value =
        serde_json::from_str(stdout).map_err(|err| MetadataError::InvalidJson(err.to_string()))?;
    let object = data
        .as_object()
        .ok_or(MetadataError::Shape("document is not an object"))?;
    let packages = object
        .get("packages")
        .and_then(Value::as_array)
        .ok_or(MetadataError::Shape("`packages` is not an array"))?;
    let workspace_members = object
        .get("workspace_members")
        .and_then(Value::as_array)
        .ok_or(MetadataError::Shape("`workspace_members` is not an array"))?;
    let workspace_root = object
        .get("workspace_root")
        .and_then(Value::as_str)
        .ok_or(MetadataError::Shape("`workspace_root` is not a string"))?;

    let member_ids: HashSet<&str> = workspace_members.iter().filter_map(Value::as_str).collect();

    let member_manifests = packages
        .iter()
        .filter_map(Value::as_object)
        .filter(|package| {
            package
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| member_ids.contains(id))
        })
        .filter_map(|package| package.get("manifest_path").and_then(Value::as_str))
        .map(|path| resolve_identity(Path::new(path)))
        .collect();

    Ok(WorkspaceMetadata {
        workspace_root: resolve_identity(Path::new(workspace_root)),
        member_manifests,
    })
}
