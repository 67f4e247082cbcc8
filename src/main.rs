#![deny(unsafe_code)]

//! The `loupe` multichecker binary: runs the built-in passes over
//! manifest-described packages.

use std::process::ExitCode;

use loupe::driver::multi;
use loupe::model::manifest::ManifestLoader;
use loupe::{logging, passes};

fn main() -> ExitCode {
    logging::init_from_env();
    run_with_args(std::env::args().skip(1).collect())
}

fn run_with_args(args: Vec<String>) -> ExitCode {
    let loader = ManifestLoader::new();
    let mut out = std::io::stdout();
    let mut err_out = std::io::stderr();
    match multi::run(&loader, passes::all(), args, &mut out, &mut err_out) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("loupe: {err}");
            ExitCode::FAILURE
        }
    }
}
