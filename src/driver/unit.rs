//! The compile-protocol driver: one package per invocation, orchestrated
//! by a build system.
//!
//! Invoked either as `driver -V=full` (print a content-addressed version
//! line for staleness tracking) or as `driver <file>.cfg`, where the
//! config document fully resolves the package: its sources, its imports'
//! export data, and its imports' fact files. The driver loads the unit,
//! seeds per-analysis fact stores from the inherited fact files, executes
//! the analysis DAG in parallel with the same at-most-once discipline as
//! the multi-package driver, prints findings, and writes the accumulated
//! fact set to the configured output path.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::sync::{Arc, OnceLock};
use std::thread;

use sha2::{Digest, Sha256};

use crate::analysis::{validate, Analysis, SharedOutput};
use crate::diagnostics::{position_string, Diagnostic, FileCache};
use crate::error::{Error, Result};
use crate::exec::{run_action_body, ActionError, CancelToken};
use crate::facts::codec::{self, DecodedFact, FactRecord, FactRegistry};
use crate::facts::{transport, FactStore};
use crate::loader::{UnitConfig, UnitLoader};
use crate::model::{PkgId, Session};

pub fn run(
    loader: &dyn UnitLoader,
    analyses: Vec<Arc<Analysis>>,
    args: Vec<String>,
    out: &mut dyn Write,
    err_out: &mut dyn Write,
) -> Result<i32> {
    let Some(first) = args.first() else {
        return Err(
            crate::driver::CliError::new("invalid command (want -V=full or a .cfg file)").into(),
        );
    };

    if first == "-V=full" {
        writeln!(out, "{}", version_line()?)?;
        return Ok(0);
    }

    if !first.ends_with(".cfg") {
        return Err(crate::driver::CliError::new(format!(
            "expected a *.cfg argument (got {first:?})"
        ))
        .into());
    }

    let data = fs::read_to_string(first)
        .map_err(|err| Error::loader(format!("reading {first}: {err}")))?;
    let cfg: UnitConfig = serde_json::from_str(&data)
        .map_err(|err| Error::loader(format!("parsing {first}: {err}")))?;

    let registry = validate::validate(&analyses)?;

    // In facts-only mode, analyses are run only for their facts, so any
    // analysis that neither produces facts nor feeds a fact producer can
    // be skipped outright.
    let analyses: Vec<Arc<Analysis>> = analyses
        .into_iter()
        .filter(|a| !cfg.facts_only || validate::uses_facts(std::slice::from_ref(a)))
        .collect();

    let unit = match loader.load_unit(&cfg) {
        Ok(unit) => unit,
        Err(err) => {
            if cfg.succeed_on_typecheck_failure {
                return Ok(0);
            }
            return Err(err);
        }
    };
    if unit.session.pkg(unit.pkg).ill_typed && cfg.succeed_on_typecheck_failure {
        return Ok(0);
    }

    let inherited = read_inherited_facts(&cfg, &unit.session, unit.pkg, &registry)?;

    let run = Arc::new(UnitRun::new(
        unit.session,
        unit.files,
        unit.pkg,
        &analyses,
        &inherited,
    ));
    run.exec_all(&analyses.iter().map(|a| a.name()).collect::<Vec<_>>());

    run.print(out, err_out)?;

    let bytes = run.encode_facts()?;
    let output = cfg.resolve(&cfg.output);
    fs::write(&output, bytes)
        .map_err(|err| Error::loader(format!("writing {}: {err}", output.display())))?;

    Ok(0)
}

/// `<path> version devel buildID=<hex>`, where the hex digest is the
/// SHA-256 of the executable. Build systems use it to detect staleness.
fn version_line() -> Result<String> {
    let exe = std::env::current_exe()?;
    let bytes = fs::read(&exe)?;
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(format!("{} version devel buildID={hex}", exe.display()))
}

fn read_inherited_facts(
    cfg: &UnitConfig,
    session: &Session,
    pkg: PkgId,
    registry: &FactRegistry,
) -> Result<Vec<DecodedFact>> {
    let mut blobs: HashMap<String, Vec<u8>> = HashMap::new();
    for &imp in &session.pkg(pkg).imports {
        let path = &session.pkg(imp).path;
        let Some(file) = cfg.package_facts.get(path) else {
            continue;
        };
        let file = cfg.resolve(file);
        let blob = fs::read(&file).map_err(|err| {
            Error::transport(format!(
                "reading fact file {} for {path}: {err}",
                file.display()
            ))
        })?;
        blobs.insert(path.clone(), blob);
    }
    transport::read_facts(session, pkg, &blobs, registry)
}

struct UnitOutcome {
    output: Option<SharedOutput>,
    error: Option<ActionError>,
    findings: Vec<Diagnostic>,
}

struct UnitAction {
    analysis: Arc<Analysis>,
    store: FactStore,
    cell: OnceLock<UnitOutcome>,
}

/// The horizontal DAG of one compile-protocol invocation. Vertical fact
/// flow happened in earlier invocations and arrives through fact files.
struct UnitRun {
    session: Session,
    files: FileCache,
    pkg: PkgId,
    actions: HashMap<&'static str, Arc<UnitAction>>,
    order: Vec<&'static str>,
    cancel: CancelToken,
}

impl UnitRun {
    fn new(
        session: Session,
        files: FileCache,
        pkg: PkgId,
        analyses: &[Arc<Analysis>],
        inherited: &[DecodedFact],
    ) -> Self {
        let closure = validate::require_closure(analyses);
        let mut actions = HashMap::new();
        let mut order: Vec<&'static str> = Vec::new();
        for analysis in closure {
            let store = FactStore::new(analysis.fact_types().len());
            for fact in inherited {
                let slot = analysis
                    .fact_types()
                    .iter()
                    .position(|ft| ft.name() == fact.type_name);
                let Some(slot) = slot else { continue };
                match (fact.obj, fact.pkg) {
                    (Some(obj), _) => {
                        let _ = store.set_object(slot, obj, Arc::clone(&fact.value));
                    }
                    (None, Some(fact_pkg)) => {
                        let _ = store.set_package(slot, fact_pkg, Arc::clone(&fact.value));
                    }
                    (None, None) => {}
                }
            }
            order.push(analysis.name());
            actions.insert(
                analysis.name(),
                Arc::new(UnitAction {
                    analysis,
                    store,
                    cell: OnceLock::new(),
                }),
            );
        }
        order.sort_unstable();
        Self {
            session,
            files,
            pkg,
            actions,
            order,
            cancel: CancelToken::new(),
        }
    }

    fn exec_all(self: &Arc<Self>, names: &[&'static str]) {
        if names.len() <= 1 {
            for name in names {
                self.exec(name);
            }
            return;
        }
        let mut handles = Vec::with_capacity(names.len());
        for &name in names {
            let run = Arc::clone(self);
            match thread::Builder::new()
                .name(format!("loupe-unit-{name}"))
                .spawn(move || run.exec(name))
            {
                Ok(handle) => handles.push(handle),
                Err(_) => self.exec(name),
            }
        }
        for handle in handles {
            if let Err(payload) = handle.join() {
                std::panic::resume_unwind(payload);
            }
        }
    }

    fn exec(self: &Arc<Self>, name: &'static str) {
        let action = Arc::clone(&self.actions[name]);
        let _ = action.cell.get_or_init(|| self.exec_once(&action));
    }

    fn exec_once(self: &Arc<Self>, action: &UnitAction) -> UnitOutcome {
        let requires: Vec<&'static str> = action
            .analysis
            .requires()
            .iter()
            .map(|req| req.name())
            .collect();
        self.exec_all(&requires);

        let pkg_id = self.session.pkg(self.pkg).id.clone();
        let mut failed: Vec<String> = requires
            .iter()
            .filter(|name| {
                self.actions[**name]
                    .cell
                    .get()
                    .is_some_and(|outcome| outcome.error.is_some())
            })
            .map(|name| format!("{name}@{pkg_id}"))
            .collect();
        if !failed.is_empty() {
            failed.sort();
            return UnitOutcome {
                output: None,
                error: Some(ActionError::FailedPrerequisites { labels: failed }),
                findings: Vec::new(),
            };
        }

        let mut inputs: HashMap<&'static str, SharedOutput> = HashMap::new();
        for name in requires {
            if let Some(output) = self.actions[name]
                .cell
                .get()
                .and_then(|outcome| outcome.output.clone())
            {
                inputs.insert(name, output);
            }
        }

        let outcome = run_action_body(
            &action.analysis,
            &self.session,
            self.pkg,
            &self.files,
            &inputs,
            &action.store,
            self.cancel.clone(),
            false,
        );
        UnitOutcome {
            output: outcome.output,
            error: outcome.error,
            findings: outcome.findings,
        }
    }

    fn print(&self, out: &mut dyn Write, err_out: &mut dyn Write) -> Result<()> {
        for name in &self.order {
            let action = &self.actions[name];
            let Some(outcome) = action.cell.get() else {
                continue;
            };
            if let Some(error) = &outcome.error {
                writeln!(err_out, "{name}: {error}")?;
                continue;
            }
            for finding in &outcome.findings {
                let class = match &finding.category {
                    Some(category) => format!("{name}.{category}"),
                    None => (*name).to_string(),
                };
                writeln!(
                    out,
                    "{}: [{class}] {}",
                    position_string(&self.files, finding.span),
                    finding.message
                )?;
            }
        }
        Ok(())
    }

    /// Gather all facts, inherited ones included, into one sorted blob.
    fn encode_facts(&self) -> Result<Vec<u8>> {
        let mut records: Vec<FactRecord> = Vec::new();
        for name in &self.order {
            let action = &self.actions[name];
            if action.cell.get().is_none() {
                continue;
            }
            let snapshot = action.store.snapshot();
            records.extend(codec::encode_snapshot(
                &self.session,
                &snapshot,
                action.analysis.fact_types(),
            )?);
        }
        transport::merge_and_encode(Vec::new(), records)
    }
}
