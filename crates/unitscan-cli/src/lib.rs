mod cli;
mod error;
mod output;
mod telemetry;

pub use cli::{run, run_cli};
pub use error::CliError;
