fn main() -> std::process::ExitCode {
    unitscan_cli::run()
}
