//! Command-line entry point for the kilnd development server.

use std::io::{self, Write};
use std::process::ExitCode;

use kiln_config::Options;

fn main() -> ExitCode {
    let options = match Options::load_from_iter(std::env::args_os()) {
        Ok(options) => options,
        Err(error) => error.exit(),
    };
    match kilnd::run_server(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr(), "kilnd: {error}");
            ExitCode::FAILURE
        }
    }
}
