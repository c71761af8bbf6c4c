use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match castled::run_agent() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: "castled::process", %error, "agent terminated");
            // Telemetry may not be installed when bootstrap itself failed.
            let _ = writeln!(io::stderr(), "castled: {error}");
            ExitCode::FAILURE
        }
    }
}
