use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = capsmith::run() {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
