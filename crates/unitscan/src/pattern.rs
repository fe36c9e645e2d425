//! Glob matching for `[workspace] members` / `exclude` patterns.
//!
//! Candidates are directories relative to the workspace root, `/`-separated,
//! with the empty string standing for the root itself. Matching is total:
//! malformed patterns simply do not match.

use glob::{MatchOptions, Pattern};

const GLOB_META: [char; 3] = ['*', '?', '['];

const SEGMENT_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Returns the characters of `pattern` before its first glob metacharacter.
/// A backslash escapes the following character.
pub fn literal_prefix(pattern: &str) -> String {
    let mut prefix = String::new();
    let mut escape = false;
    for ch in pattern.chars() {
        if escape {
            prefix.push(ch);
            escape = false;
            continue;
        }
        if ch == '\\' {
            escape = true;
            continue;
        }
        if GLOB_META.contains(&ch) {
            break;
        }
        prefix.push(ch);
    }
    prefix
}

/// True when `relative_dir` matches at least one of `patterns`.
pub fn matches_any<S: AsRef<str>>(relative_dir: &str, patterns: &[S]) -> bool {
    let candidate = relative_dir.replace('\\', "/");
    patterns
        .iter()
        .any(|pattern| matches_one(&candidate, pattern.as_ref()))
}

fn matches_one(candidate: &str, pattern: &str) -> bool {
    let normalized = pattern.replace('\\', "/");
    let mut pattern = normalized.trim();
    if pattern.is_empty() {
        return false;
    }
    if pattern == "." || pattern == "./" {
        return is_root(candidate);
    }
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }

    let prefix = literal_prefix(pattern);
    let anchor = prefix.trim_start_matches('/').trim_end_matches('/');
    if !prefix.trim_start_matches('/').is_empty()
        && candidate != anchor
        && !candidate.starts_with(&format!("{anchor}/"))
    {
        return false;
    }

    path_matches(candidate, pattern)
}

fn is_root(candidate: &str) -> bool {
    matches!(candidate, "" | "." | "./")
}

/// Right-anchored, segment-wise match: every pattern segment must match the
/// corresponding trailing segment of the candidate.
fn path_matches(candidate: &str, pattern: &str) -> bool {
    if pattern.starts_with('/') {
        return false;
    }
    let pattern_segments = segments(pattern);
    let candidate_segments = segments(candidate);
    if pattern_segments.is_empty() || pattern_segments.len() > candidate_segments.len() {
        return false;
    }
    candidate_segments
        .iter()
        .rev()
        .zip(pattern_segments.iter().rev())
        .all(|(part, glob)| segment_matches(part, glob))
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

fn segment_matches(part: &str, glob: &str) -> bool {
    match Pattern::new(glob) {
        Ok(pattern) => pattern.matches_with(part, SEGMENT_OPTIONS),
        Err(_) => false,
    }
}
