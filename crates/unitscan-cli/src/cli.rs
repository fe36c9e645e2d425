use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use unitscan::{CargoMetadataCommand, DetectionConfig, MetadataSource, detect};

use crate::error::CliError;
use crate::output::{ENV_GITHUB_OUTPUT, OutputSink};
use crate::telemetry::init_tracing;

const NAME: &str = "unitscan";

pub fn run() -> ExitCode {
    match run_cli(std::env::args_os()) {
        Ok(code) => code,
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

/// Parses arguments, reads `CI_*` configuration from the environment, scans
/// the repository and writes the matrix. Nothing is written to the sink when
/// detection fails.
pub fn run_cli<I, S>(args: I) -> Result<ExitCode, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let matches = build_cli().try_get_matches_from(args)?;
    let verbose = matches.get_flag("verbose");
    init_tracing(verbose);

    let root = match matches.get_one::<PathBuf>("root") {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let config = DetectionConfig::from_env();
    if verbose {
        log_config(&root, &config);
    }

    let cargo = CargoMetadataCommand::from_mode(config.metadata, config.metadata_timeout);
    let metadata = cargo.as_ref().map(|command| command as &dyn MetadataSource);
    let matrix = detect(&root, &config, metadata)?;
    tracing::debug!(entries = matrix.len(), "matrix built");

    let sink = output_sink(&matches);
    sink.write(&matrix.render()?)?;
    Ok(ExitCode::SUCCESS)
}

fn build_cli() -> Command {
    Command::new(NAME)
        .about("Detect Cargo workspaces and packages and emit a GitHub Actions build matrix")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Repository root to scan. Defaults to the current directory."),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Append output lines to PATH instead of $GITHUB_OUTPUT or stdout."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log the resolved configuration and membership decisions."),
        )
}

fn output_sink(matches: &ArgMatches) -> OutputSink {
    OutputSink::resolve(
        matches.get_one::<PathBuf>("output").cloned(),
        std::env::var(ENV_GITHUB_OUTPUT).ok(),
    )
}

fn log_config(root: &std::path::Path, config: &DetectionConfig) {
    let patterns: Vec<&str> = config
        .exclusion
        .patterns()
        .iter()
        .map(String::as_str)
        .collect();
    tracing::info!(
        root = %root.display(),
        exclude_mode = ?config.exclusion.mode(),
        exclude = %patterns.join(","),
        metadata = ?config.metadata,
        metadata_timeout_secs = config.metadata_timeout.as_secs(),
        max_matrix_entries = config.max_matrix_entries,
        "resolved detection configuration"
    );
}
