use std::process::ExitCode;

fn main() -> ExitCode {
    itemdesk_cli::run()
}
