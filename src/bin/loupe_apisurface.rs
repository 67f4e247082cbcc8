#![deny(unsafe_code)]

//! Standalone single-analysis driver for the `apisurface` pass.

use std::process::ExitCode;

use loupe::driver::single;
use loupe::model::manifest::ManifestLoader;
use loupe::passes::apisurface;
use loupe::logging;

fn main() -> ExitCode {
    logging::init_from_env();
    let loader = ManifestLoader::new();
    let mut out = std::io::stdout();
    let mut err_out = std::io::stderr();
    let args = std::env::args().skip(1).collect();
    match single::run(
        &loader,
        apisurface::analysis(),
        args,
        &mut out,
        &mut err_out,
    ) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("apisurface: {err}");
            ExitCode::FAILURE
        }
    }
}
