use std::process::ExitCode;

fn main() -> ExitCode {
    tsm_cli::run()
}
