//! The multi-analysis driver: `driver [flags] <package-pattern>...` over a
//! fixed set of analyses.
//!
//! Every analysis flag appears on the command line as
//! `-<analysis>.<flag>`, and each analysis gets a synthesized
//! `-<analysis>.enable`; if any enable flag is set, only the enabled
//! analyses run (a disabled analysis may still execute when another
//! enabled one requires it).

use std::io::Write;
use std::sync::Arc;

use crate::analysis::Analysis;
use crate::driver::{parse_args, run_checker, CliError};
use crate::error::Result;
use crate::loader::PackageLoader;

pub fn run(
    loader: &dyn PackageLoader,
    analyses: Vec<Arc<Analysis>>,
    args: Vec<String>,
    out: &mut dyn Write,
    err_out: &mut dyn Write,
) -> Result<i32> {
    let parsed = parse_args(args)?;

    let mut enabled: Vec<&'static str> = Vec::new();
    for (name, value) in &parsed.analysis_flags {
        let Some((analysis_name, flag_name)) = name.split_once('.') else {
            return Err(CliError::new(format!("flag provided but not defined: -{name}")).into());
        };
        let Some(analysis) = analyses.iter().find(|a| a.name() == analysis_name) else {
            return Err(CliError::new(format!(
                "flag -{name} names unknown analysis {analysis_name:?}"
            ))
            .into());
        };
        if flag_name == "enable" {
            if value == "true" {
                enabled.push(analysis.name());
            }
            continue;
        }
        let Some(flag) = analysis.flags().get(flag_name) else {
            return Err(CliError::new(format!(
                "analysis {analysis_name:?} has no flag {flag_name:?}"
            ))
            .into());
        };
        flag.set(value);
    }

    let selected: Vec<Arc<Analysis>> = if enabled.is_empty() {
        analyses
    } else {
        analyses
            .into_iter()
            .filter(|a| enabled.contains(&a.name()))
            .collect()
    };

    run_checker(
        loader,
        selected,
        &parsed.options,
        &parsed.patterns,
        out,
        err_out,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::no_output;
    use crate::loader::{LoadMode, LoadedGraph};
    use crate::model::Session;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OnePackage;

    impl PackageLoader for OnePackage {
        fn load(&self, patterns: &[String], _mode: LoadMode) -> Result<LoadedGraph> {
            let mut session = Session::new();
            let pkg = session.add_package(patterns[0].as_str(), patterns[0].as_str(), "p", false);
            Ok(LoadedGraph {
                session,
                files: crate::diagnostics::FileCache::default(),
                initial: vec![pkg],
            })
        }
    }

    #[test]
    fn enable_flags_select_a_subset() {
        let a_runs = Arc::new(AtomicUsize::new(0));
        let b_runs = Arc::new(AtomicUsize::new(0));
        let a_counter = Arc::clone(&a_runs);
        let b_counter = Arc::clone(&b_runs);
        let a = Analysis::builder("a", "test").run(move |_| {
            a_counter.fetch_add(1, Ordering::SeqCst);
            Ok(no_output())
        });
        let b = Analysis::builder("b", "test").run(move |_| {
            b_counter.fetch_add(1, Ordering::SeqCst);
            Ok(no_output())
        });

        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = run(
            &OnePackage,
            vec![a, b],
            vec!["-a.enable".into(), "pkg".into()],
            &mut out,
            &mut err,
        )
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(a_runs.load(Ordering::SeqCst), 1);
        assert_eq!(b_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn prefixed_flags_reach_their_analysis() {
        let a = Analysis::builder("a", "test")
            .flags(crate::analysis::FlagSet::new().define("limit", "10", "limit"))
            .run(|unit| {
                assert_eq!(unit.analysis().flags().get("limit").unwrap().value(), "3");
                Ok(no_output())
            });
        let mut out = Vec::new();
        let mut err = Vec::new();
        run(
            &OnePackage,
            vec![a],
            vec!["-a.limit=3".into(), "pkg".into()],
            &mut out,
            &mut err,
        )
        .unwrap();
    }

    #[test]
    fn unknown_flags_are_cli_errors() {
        let a = Analysis::builder("a", "test").run(|_| Ok(no_output()));
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = run(
            &OnePackage,
            vec![a.clone()],
            vec!["-b.enable".into(), "pkg".into()],
            &mut out,
            &mut err,
        );
        assert!(result.is_err());

        let result = run(
            &OnePackage,
            vec![a],
            vec!["-a.bogus=1".into(), "pkg".into()],
            &mut out,
            &mut err,
        );
        assert!(result.is_err());
    }
}
