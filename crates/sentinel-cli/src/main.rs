#![allow(clippy::print_stderr)]

use std::process::ExitCode;

fn main() -> ExitCode {
    match sentinel_cli::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
