use std::process::ExitCode;

fn main() -> ExitCode {
    hitter_cli::run()
}
