use std::collections::HashSet;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::{UnitscanError, UnsafeReason};

/// Marker used for the repository root directory.
pub const ROOT_DIR: &str = ".";

/// One CI job: a directory to build and whether it is a workspace root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub dir: String,
    pub is_workspace: bool,
}

/// The document emitted as the `matrix` output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    pub include: Vec<MatrixEntry>,
}

impl Matrix {
    pub fn has_units(&self) -> bool {
        !self.include.is_empty()
    }

    pub fn len(&self) -> usize {
        self.include.len()
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    /// Renders the two `key=value` lines consumed by GitHub Actions.
    pub fn render(&self) -> Result<String, UnitscanError> {
        let json = serde_json::to_string(self)?;
        Ok(format!("has_rust={}\nmatrix={json}\n", self.has_units()))
    }
}

/// Accumulates matrix entries, rejecting unsafe paths and dropping
/// duplicates. The first classification recorded for a directory wins.
#[derive(Debug, Default)]
pub struct MatrixBuilder {
    include: Vec<MatrixEntry>,
    seen: HashSet<String>,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `relative_dir` (relative to the repository root).
    pub fn add_path(
        &mut self,
        relative_dir: &Path,
        is_workspace: bool,
    ) -> Result<(), UnitscanError> {
        let dir = matrix_dir(relative_dir)?;
        self.add(&dir, is_workspace)
    }

    /// Validates and records `directory`. Returns `Ok(())` without changes when
    /// the directory is already present.
    pub fn add(&mut self, directory: &str, is_workspace: bool) -> Result<(), UnitscanError> {
        validate(directory)?;
        if self.seen.contains(directory) {
            return Ok(());
        }
        self.seen.insert(directory.to_string());
        self.include.push(MatrixEntry {
            dir: directory.to_string(),
            is_workspace,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.include.len()
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    /// Finalizes the matrix, failing when it holds more than `max_entries`.
    pub fn finish(self, max_entries: usize) -> Result<Matrix, UnitscanError> {
        if self.include.len() > max_entries {
            return Err(UnitscanError::MatrixTooLarge {
                found: self.include.len(),
                limit: max_entries,
            });
        }
        Ok(Matrix {
            include: self.include,
        })
    }
}

/// Converts a repository-relative directory into its matrix form: `.` for the
/// root, `/`-joined components otherwise.
pub fn matrix_dir(relative_dir: &Path) -> Result<String, UnitscanError> {
    let mut parts: Vec<&str> = Vec::new();
    for component in relative_dir.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| UnitscanError::NonUtf8Directory(relative_dir.to_path_buf()))?;
                parts.push(part);
            }
            Component::ParentDir => parts.push(".."),
            Component::RootDir | Component::Prefix(_) => {
                return Ok(relative_dir.to_string_lossy().into_owned());
            }
        }
    }
    if parts.is_empty() {
        Ok(ROOT_DIR.to_string())
    } else {
        Ok(parts.join("/"))
    }
}

/// Rejects directories that are unsafe to interpolate into CI job contexts.
pub fn validate(directory: &str) -> Result<(), UnitscanError> {
    if directory == ROOT_DIR {
        return Ok(());
    }
    let unsafe_dir = |reason| UnitscanError::UnsafeMatrixDirectory {
        directory: directory.to_string(),
        reason,
    };

    let normalized = directory.replace('\\', "/");
    if normalized.starts_with('/')
        || normalized.starts_with("../")
        || is_windows_absolute(&normalized)
    {
        return Err(unsafe_dir(UnsafeReason::NotRelative));
    }
    if normalized.contains("/../") || normalized.ends_with("/..") {
        return Err(unsafe_dir(UnsafeReason::ParentTraversal));
    }
    if normalized
        .split('/')
        .any(|segment| matches!(segment, "" | "." | ".."))
    {
        return Err(unsafe_dir(UnsafeReason::InvalidSegment));
    }
    if directory.chars().any(|ch| (ch as u32) < 32 || ch as u32 == 127) {
        return Err(unsafe_dir(UnsafeReason::ControlCharacter));
    }
    Ok(())
}

fn is_windows_absolute(normalized: &str) -> bool {
    let bytes = normalized.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
