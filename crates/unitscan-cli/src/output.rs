use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

pub const ENV_GITHUB_OUTPUT: &str = "GITHUB_OUTPUT";

/// Where the `has_rust` / `matrix` lines are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputSink {
    Stdout,
    /// Appended to, as GitHub Actions expects for `$GITHUB_OUTPUT`.
    File(PathBuf),
}

impl OutputSink {
    /// An explicit path wins; otherwise `GITHUB_OUTPUT` when set and
    /// non-empty; otherwise stdout.
    pub fn resolve(explicit: Option<PathBuf>, github_output: Option<String>) -> Self {
        if let Some(path) = explicit {
            return OutputSink::File(path);
        }
        match github_output.filter(|value| !value.trim().is_empty()) {
            Some(path) => OutputSink::File(PathBuf::from(path)),
            None => {
                tracing::info!("{ENV_GITHUB_OUTPUT} is not set; printing matrix to stdout");
                OutputSink::Stdout
            }
        }
    }

    pub fn write(&self, rendered: &str) -> io::Result<()> {
        match self {
            OutputSink::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                stdout.flush()
            }
            OutputSink::File(path) => {
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                file.write_all(rendered.as_bytes())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn explicit_path_wins_over_environment() {
        let sink = OutputSink::resolve(Some(PathBuf::from("out.txt")), Some("gh.txt".into()));
        assert_eq!(sink, OutputSink::File(PathBuf::from("out.txt")));
    }

    #[test]
    fn blank_github_output_means_stdout() {
        assert_eq!(OutputSink::resolve(None, Some("  ".into())), OutputSink::Stdout);
        assert_eq!(OutputSink::resolve(None, None), OutputSink::Stdout);
    }

    #[test]
    fn file_sink_appends() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("github_output");
        fs::write(&path, "previous=1\n").unwrap();

        let sink = OutputSink::File(path.clone());
        sink.write("has_rust=false\n").unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "previous=1\nhas_rust=false\n");
    }
}
