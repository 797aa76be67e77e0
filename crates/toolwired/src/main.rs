use std::process::ExitCode;

fn main() -> ExitCode {
    match toolwired::run_server() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: "toolwired::process", %error, "server exited with error");
            // Telemetry may not be installed when configuration itself failed.
            if error.is_startup() {
                eprintln!("toolwired: {error}");
            }
            ExitCode::FAILURE
        }
    }
}
