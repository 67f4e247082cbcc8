//! Parallel, at-most-once execution of the action graph.
//!
//! Every action carries a one-shot latch: the first caller runs the body,
//! concurrent callers block until the stored result appears. An action
//! first executes all of its dependencies (in parallel unless the `p`
//! debug letter disables it), then checks their outcomes, plumbs their
//! artifacts and facts into its own state, and finally invokes the
//! analysis callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::analysis::{Analysis, SharedOutput, Unit};
use crate::diagnostics::{Diagnostic, FileCache};
use crate::facts::{transport, FactSnapshot, FactStore};
use crate::graph::Action;
use crate::model::{PkgId, Session};

/// Driver-wide cancellation signal. Cancelled runs start no new actions;
/// in-flight actions complete naturally.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Execution switches, mostly mapped from the `-debug` letters.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecOptions {
    /// Disable parallel execution (`p`).
    pub sequential: bool,
    /// Record per-action wall-clock durations (`t`).
    pub timing: bool,
    /// Round-trip inherited facts through the codec (`s`).
    pub sanity: bool,
    /// Log facts as they are set (`l`).
    pub log_facts: bool,
}

/// Shared, read-only context for one execution.
pub struct ExecContext {
    pub session: Arc<Session>,
    pub files: Arc<FileCache>,
    pub opts: ExecOptions,
    pub cancel: CancelToken,
}

/// Why an action produced no artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionError {
    /// One or more dependency actions failed; labels are sorted.
    FailedPrerequisites { labels: Vec<String> },
    /// The package is ill-typed and the analysis does not accept errors.
    SkippedDueToErrors,
    /// The run callback returned an error.
    Run { message: String },
    /// The run callback produced an artifact of the wrong type.
    WrongOutputType {
        analysis: &'static str,
        pkg: String,
        declared: &'static str,
    },
    /// The driver was cancelled before this action could run.
    Cancelled,
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionError::FailedPrerequisites { labels } => {
                write!(f, "failed prerequisites: {}", labels.join(", "))
            }
            ActionError::SkippedDueToErrors => {
                write!(f, "analysis skipped due to errors in package")
            }
            ActionError::Run { message } => f.write_str(message),
            ActionError::WrongOutputType {
                analysis,
                pkg,
                declared,
            } => write!(
                f,
                "internal error: on package {pkg}, analysis {analysis} produced an output \
                 that is not its declared type {declared}"
            ),
            ActionError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for ActionError {}

/// The stored outcome of one action.
pub struct ActionResult {
    pub output: Option<SharedOutput>,
    pub error: Option<ActionError>,
    pub findings: Vec<Diagnostic>,
    pub facts: FactSnapshot,
    pub duration: Option<Duration>,
}

/// Execute `actions` and everything they depend on. Returns when every
/// reachable action has a stored result.
pub fn exec_all(ctx: &Arc<ExecContext>, actions: &[Arc<Action>]) {
    if ctx.opts.sequential || actions.len() <= 1 {
        for action in actions {
            exec(ctx, action);
        }
        return;
    }

    let mut handles = Vec::with_capacity(actions.len());
    for action in actions {
        let worker_ctx = Arc::clone(ctx);
        let worker_action = Arc::clone(action);
        let builder = thread::Builder::new().name(format!(
            "loupe-{}",
            action.analysis.name()
        ));
        match builder.spawn(move || exec(&worker_ctx, &worker_action)) {
            Ok(handle) => handles.push(handle),
            // Spawning can fail under resource exhaustion; fall back to
            // running inline rather than losing the action.
            Err(_) => exec(ctx, action),
        }
    }
    for handle in handles {
        if let Err(payload) = handle.join() {
            std::panic::resume_unwind(payload);
        }
    }
}

fn exec(ctx: &Arc<ExecContext>, action: &Arc<Action>) {
    let _ = action.result.get_or_init(|| exec_once(ctx, action));
}

fn exec_once(ctx: &Arc<ExecContext>, action: &Arc<Action>) -> ActionResult {
    let session = &*ctx.session;

    if ctx.cancel.is_cancelled() {
        return failed(ActionError::Cancelled);
    }

    exec_all(ctx, &action.deps);

    if ctx.cancel.is_cancelled() {
        return failed(ActionError::Cancelled);
    }

    // Duration is recorded from here so dependency wait is excluded.
    let start = ctx.opts.timing.then(Instant::now);
    let finish = |mut result: ActionResult| {
        result.duration = start.map(|t0| t0.elapsed());
        result
    };

    let mut failed_deps: Vec<String> = action
        .deps
        .iter()
        .filter(|dep| dep.result().is_some_and(|r| r.error.is_some()))
        .map(|dep| dep.label(session))
        .collect();
    if !failed_deps.is_empty() {
        failed_deps.sort();
        return finish(failed(ActionError::FailedPrerequisites {
            labels: failed_deps,
        }));
    }

    // Plumb dependency outputs and inherited facts into this action.
    let mut inputs: HashMap<&'static str, SharedOutput> = HashMap::new();
    let store = FactStore::new(action.analysis.fact_types().len());
    for dep in &action.deps {
        let Some(result) = dep.result() else { continue };
        if dep.pkg == action.pkg {
            // Same package, different analysis (horizontal edge): the
            // in-memory artifact becomes an input.
            if let Some(output) = &result.output {
                inputs.insert(dep.analysis.name(), Arc::clone(output));
            }
        } else {
            // Same analysis, different package (vertical edge): facts
            // produced for the dependency become visible here.
            inherit_facts(ctx, action, dep, &result.facts, &store);
        }
    }

    tracing::debug!(
        target: "loupe::exec",
        "running {}",
        action.label(session)
    );

    let outcome = run_action_body(
        &action.analysis,
        session,
        action.pkg,
        &ctx.files,
        &inputs,
        &store,
        ctx.cancel.clone(),
        ctx.opts.log_facts,
    );

    finish(ActionResult {
        output: outcome.output,
        error: outcome.error,
        findings: outcome.findings,
        facts: store.snapshot(),
        duration: None,
    })
}

fn failed(error: ActionError) -> ActionResult {
    ActionResult {
        output: None,
        error: Some(error),
        findings: Vec::new(),
        facts: FactSnapshot::default(),
        duration: None,
    }
}

/// Copy the facts of a vertical dependency into `store`, discarding facts
/// on objects that are not visible through the dependency's export
/// surface. With the `s` debug letter, every inherited fact is round-
/// tripped through the codec to prove it survives an address-space
/// crossing.
fn inherit_facts(
    ctx: &ExecContext,
    action: &Action,
    dep: &Action,
    facts: &FactSnapshot,
    store: &FactStore,
) {
    let session = &*ctx.session;
    for (slot, fact_type) in action.analysis.fact_types().iter().enumerate() {
        for (&obj, value) in &facts.objects[slot] {
            if !transport::exported_from(session, obj, dep.pkg) {
                continue;
            }
            let value = if ctx.opts.sanity {
                match transport::roundtrip(fact_type, value) {
                    Ok(value) => value,
                    Err(err) => panic!(
                        "internal error: {err} while inheriting into {}",
                        action.label(session)
                    ),
                }
            } else {
                Arc::clone(value)
            };
            let _ = store.set_object(slot, obj, value);
        }
        for (&pkg, value) in &facts.packages[slot] {
            let value = if ctx.opts.sanity {
                match transport::roundtrip(fact_type, value) {
                    Ok(value) => value,
                    Err(err) => panic!(
                        "internal error: {err} while inheriting into {}",
                        action.label(session)
                    ),
                }
            } else {
                Arc::clone(value)
            };
            let _ = store.set_package(slot, pkg, value);
        }
    }
}

pub(crate) struct RunOutcome {
    pub output: Option<SharedOutput>,
    pub error: Option<ActionError>,
    pub findings: Vec<Diagnostic>,
}

/// Steps 5–7 of action execution: the ill-typed gate, the callback, the
/// output postcondition, and store sealing. Shared with the
/// compile-protocol driver, which schedules actions itself.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_action_body(
    analysis: &Arc<Analysis>,
    session: &Session,
    pkg: PkgId,
    files: &FileCache,
    inputs: &HashMap<&'static str, SharedOutput>,
    store: &FactStore,
    cancel: CancelToken,
    log_facts: bool,
) -> RunOutcome {
    if session.pkg(pkg).ill_typed && !analysis.run_despite_errors() {
        store.seal();
        return RunOutcome {
            output: None,
            error: Some(ActionError::SkippedDueToErrors),
            findings: Vec::new(),
        };
    }

    let unit = Unit::new(
        analysis, session, pkg, files, inputs, store, cancel, log_facts,
    );
    let run_result = analysis.run(&unit);
    let findings = unit.take_findings();

    // Deactivate the fact setters so post-run use is detected.
    store.seal();

    match run_result {
        Ok(output) => {
            if analysis.output_spec().matches(&*output) {
                RunOutcome {
                    output: Some(Arc::from(output)),
                    error: None,
                    findings,
                }
            } else {
                RunOutcome {
                    output: None,
                    error: Some(ActionError::WrongOutputType {
                        analysis: analysis.name(),
                        pkg: session.pkg(pkg).path.clone(),
                        declared: analysis.output_spec().type_name(),
                    }),
                    findings,
                }
            }
        }
        Err(message) => RunOutcome {
            output: None,
            error: Some(ActionError::Run { message }),
            findings,
        },
    }
}
