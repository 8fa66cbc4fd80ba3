use std::process::ExitCode;

fn main() -> ExitCode {
    velocita_cli::run()
}
