//! Driver plumbing shared by the multi-analysis, single-analysis, and
//! compile-protocol entry points: flag scanning, debug letters, and the
//! load → validate → build → execute → report sequence.

pub mod multi;
pub mod single;
pub mod unit;

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::analysis::{validate, Analysis};
use crate::diagnostics::reporter::{self, ReportOptions};
use crate::error::Result;
use crate::exec::{self, CancelToken, ExecContext, ExecOptions};
use crate::graph;
use crate::loader::{LoadMode, PackageLoader};

/// Command-line usage error.
#[derive(Debug, Clone)]
pub struct CliError {
    message: String,
}

impl CliError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for CliError {}

/// The single-letter debug switches: any subset of `lpstv`.
///
///   l  log facts as they are created
///   p  disable parallel execution of analyses
///   s  round-trip inherited facts through the codec
///   t  show timing info
///   v  verbose engine logging
#[derive(Clone, Copy, Debug, Default)]
pub struct DebugFlags {
    pub log_facts: bool,
    pub sequential: bool,
    pub sanity: bool,
    pub timing: bool,
    pub verbose: bool,
}

impl DebugFlags {
    pub fn parse(letters: &str) -> std::result::Result<Self, CliError> {
        let mut flags = Self::default();
        for letter in letters.chars() {
            match letter {
                'l' => flags.log_facts = true,
                'p' => flags.sequential = true,
                's' => flags.sanity = true,
                't' => flags.timing = true,
                'v' => flags.verbose = true,
                other => {
                    return Err(CliError::new(format!(
                        "unknown debug letter {other:?} (want a subset of \"lpstv\")"
                    )))
                }
            }
        }
        Ok(flags)
    }
}

/// Options common to all drivers.
#[derive(Clone, Debug, Default)]
pub struct DriverOptions {
    pub json: bool,
    pub context_lines: Option<usize>,
    pub debug: DebugFlags,
    pub trace: Option<PathBuf>,
}

impl DriverOptions {
    fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            sequential: self.debug.sequential,
            timing: self.debug.timing || self.trace.is_some(),
            sanity: self.debug.sanity,
            log_facts: self.debug.log_facts,
        }
    }

    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            json: self.json,
            context_lines: self.context_lines,
        }
    }
}

/// A parsed command line: driver options, analysis-scoped flag
/// assignments (name still carrying any `<analysis>.` prefix), and the
/// package patterns.
#[derive(Debug, Default)]
pub struct ParsedArgs {
    pub options: DriverOptions,
    pub analysis_flags: Vec<(String, String)>,
    pub patterns: Vec<String>,
}

/// Scan `args`. Driver flags are `-json`, `-c=N`, `-debug=<letters>`, and
/// `-trace=PATH`; everything else starting with a dash is recorded as an
/// analysis-scoped flag (`-name` alone meaning `true`); the rest are
/// patterns. A literal `--` ends flag scanning.
pub fn parse_args(args: Vec<String>) -> std::result::Result<ParsedArgs, CliError> {
    let mut parsed = ParsedArgs::default();
    let mut no_more_flags = false;
    for arg in args {
        if no_more_flags || !arg.starts_with('-') {
            parsed.patterns.push(arg);
            continue;
        }
        if arg == "--" {
            no_more_flags = true;
            continue;
        }
        let stripped = arg.trim_start_matches('-');
        let (name, value) = match stripped.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (stripped, None),
        };
        match name {
            "json" => match value.as_deref() {
                None | Some("true") => parsed.options.json = true,
                Some("false") => parsed.options.json = false,
                Some(other) => {
                    return Err(CliError::new(format!(
                        "invalid boolean value {other:?} for -json"
                    )))
                }
            },
            "c" => {
                let value = value
                    .ok_or_else(|| CliError::new("flag -c requires a value (-c=N)"))?;
                let lines = value.parse().map_err(|_| {
                    CliError::new(format!("invalid context line count {value:?}"))
                })?;
                parsed.options.context_lines = Some(lines);
            }
            "debug" => {
                let value = value
                    .ok_or_else(|| CliError::new("flag -debug requires a value"))?;
                parsed.options.debug = DebugFlags::parse(&value)?;
            }
            "trace" => {
                let value = value
                    .ok_or_else(|| CliError::new("flag -trace requires a path"))?;
                parsed.options.trace = Some(PathBuf::from(value));
            }
            _ => {
                parsed
                    .analysis_flags
                    .push((name.to_string(), value.unwrap_or_else(|| "true".into())));
            }
        }
    }
    Ok(parsed)
}

/// When a debug letter wants output, make sure a subscriber exists; the
/// user's own `LOUPE_LOG` setup wins if already installed.
fn ensure_debug_subscriber(debug: &DebugFlags) {
    if debug.verbose || debug.log_facts {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[derive(Serialize)]
struct TraceRecord<'a> {
    action: &'a str,
    millis: u128,
}

/// The core of the multi- and single-analysis drivers: load the patterns,
/// execute the graph, and report. Diagnostics are not exit-code-bearing;
/// the returned code is zero unless an error escapes as `Err`.
pub fn run_checker(
    loader: &dyn PackageLoader,
    analyses: Vec<Arc<Analysis>>,
    options: &DriverOptions,
    patterns: &[String],
    out: &mut dyn Write,
    err_out: &mut dyn Write,
) -> Result<i32> {
    validate::validate(&analyses)?;
    ensure_debug_subscriber(&options.debug);

    // When no active analysis uses facts, dependency packages never run
    // analyses, so their syntax need not be loaded.
    let mode = if validate::uses_facts(&analyses) {
        LoadMode::AllSyntax
    } else {
        LoadMode::Syntax
    };
    tracing::debug!(target: "loupe::driver", "loading {patterns:?} ({mode:?})");
    let loaded = loader.load(patterns, mode)?;

    let roots = graph::build(&loaded.session, &analyses, &loaded.initial);
    let ctx = Arc::new(ExecContext {
        session: Arc::new(loaded.session),
        files: Arc::new(loaded.files),
        opts: options.exec_options(),
        cancel: CancelToken::new(),
    });
    exec::exec_all(&ctx, &roots);

    if let Some(path) = &options.trace {
        write_trace(path, &ctx, &roots)?;
    }

    reporter::report(
        &ctx.session,
        &ctx.files,
        &roots,
        options.report_options(),
        out,
        err_out,
    )?;
    if options.debug.timing {
        reporter::report_timing(&ctx.session, &roots, err_out)?;
    }
    Ok(0)
}

fn write_trace(
    path: &std::path::Path,
    ctx: &ExecContext,
    roots: &[Arc<graph::Action>],
) -> Result<()> {
    let mut lines = String::new();
    for action in graph::postorder(roots) {
        let Some(duration) = action.result().and_then(|r| r.duration) else {
            continue;
        };
        let label = action.label(&ctx.session);
        let record = TraceRecord {
            action: &label,
            millis: duration.as_millis(),
        };
        match serde_json::to_string(&record) {
            Ok(line) => {
                lines.push_str(&line);
                lines.push('\n');
            }
            Err(err) => {
                return Err(crate::error::Error::internal(format!(
                    "trace serialization failed: {err}"
                )))
            }
        }
    }
    fs::write(path, lines)?;
    Ok(())
}
