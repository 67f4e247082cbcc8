//! The single-analysis driver: the standalone tool conventionally shipped
//! beside one analysis. Analysis flags are unprefixed; a flag whose name
//! collides with a driver flag is a configuration error.

use std::io::Write;
use std::sync::Arc;

use crate::analysis::Analysis;
use crate::driver::{parse_args, run_checker, CliError};
use crate::error::{Error, Result};
use crate::loader::PackageLoader;

const DRIVER_FLAGS: &[&str] = &["json", "c", "debug", "trace"];

pub fn run(
    loader: &dyn PackageLoader,
    analysis: Arc<Analysis>,
    args: Vec<String>,
    out: &mut dyn Write,
    err_out: &mut dyn Write,
) -> Result<i32> {
    for flag in analysis.flags().iter() {
        if DRIVER_FLAGS.contains(&flag.name) {
            return Err(Error::config(format!(
                "analysis {} flag -{} conflicts with a driver flag",
                analysis.name(),
                flag.name
            )));
        }
    }

    let parsed = parse_args(args)?;
    for (name, value) in &parsed.analysis_flags {
        let Some(flag) = analysis.flags().get(name) else {
            return Err(CliError::new(format!("flag provided but not defined: -{name}")).into());
        };
        flag.set(value);
    }

    run_checker(
        loader,
        vec![analysis],
        &parsed.options,
        &parsed.patterns,
        out,
        err_out,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{no_output, FlagSet};

    struct NeverLoads;

    impl PackageLoader for NeverLoads {
        fn load(
            &self,
            _patterns: &[String],
            _mode: crate::loader::LoadMode,
        ) -> Result<crate::loader::LoadedGraph> {
            Err(Error::loader("not reached"))
        }
    }

    #[test]
    fn driver_flag_collisions_are_config_errors() {
        let analysis = Analysis::builder("a", "test")
            .flags(FlagSet::new().define("json", "false", "collides"))
            .run(|_| Ok(no_output()));
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = run(&NeverLoads, analysis, vec![], &mut out, &mut err);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("conflicts with a driver flag"));
    }

    #[test]
    fn unprefixed_flags_reach_the_analysis() {
        let analysis = Analysis::builder("a", "test")
            .flags(FlagSet::new().define("limit", "10", "limit"))
            .run(|_| Ok(no_output()));
        let mut out = Vec::new();
        let mut err = Vec::new();
        // The loader fails, but flag application happens first.
        let _ = run(
            &NeverLoads,
            analysis.clone(),
            vec!["-limit=7".into(), "pkg".into()],
            &mut out,
            &mut err,
        );
        assert_eq!(analysis.flags().get("limit").unwrap().value(), "7");
    }
}
