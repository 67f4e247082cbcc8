#![deny(unsafe_code)]

//! Compile-protocol driver for the built-in passes: invoked by a build
//! system as `loupe-unit <pkg>.cfg`, or `loupe-unit -V=full` for the
//! staleness-tracking version line.

use std::process::ExitCode;

use loupe::driver::unit;
use loupe::model::manifest::ManifestLoader;
use loupe::{logging, passes};

fn main() -> ExitCode {
    logging::init_from_env();
    let loader = ManifestLoader::new();
    let mut out = std::io::stdout();
    let mut err_out = std::io::stderr();
    let args = std::env::args().skip(1).collect();
    match unit::run(&loader, passes::all(), args, &mut out, &mut err_out) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("loupe-unit: {err}");
            ExitCode::FAILURE
        }
    }
}
