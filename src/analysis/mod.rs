//! Analysis descriptors and the per-run [`Unit`] handle.
//!
//! An [`Analysis`] is the static declaration of one pass: its name, the
//! analyses it requires, the in-memory artifact type it produces, the fact
//! types it may attach to objects and packages, and a run callback. The
//! descriptor never changes after construction; the executor owns all
//! mutable state.
//!
//! Artifacts and facts are dynamically typed at the storage layer
//! (`dyn Any`) but every access goes through a typed handle: the artifact
//! type is pinned by [`OutputSpec`], fact types by [`FactType`], and the
//! `Unit` accessors downcast against the declared set. Using an undeclared
//! type is a contract violation and panics, naming the offender.

pub mod validate;

use std::any::{self, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::diagnostics::{Diagnostic, FileCache, Span};
use crate::exec::CancelToken;
use crate::facts::FactStore;
use crate::model::{ObjId, PkgId, Session};

/// An in-memory artifact value, as produced by a run callback.
pub type Output = Box<dyn Any + Send + Sync>;

/// A stored artifact, shared with every dependent action.
pub type SharedOutput = Arc<dyn Any + Send + Sync>;

/// The artifact produced when an analysis has nothing to share.
#[must_use]
pub fn no_output() -> Output {
    Box::new(())
}

/// Compile-time identity of an analysis's artifact type.
#[derive(Clone, Copy, Debug)]
pub struct OutputSpec {
    type_id: TypeId,
    type_name: &'static str,
}

impl OutputSpec {
    #[must_use]
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: any::type_name::<T>(),
        }
    }

    /// The spec for analyses that produce no artifact.
    #[must_use]
    pub fn none() -> Self {
        Self::of::<()>()
    }

    #[must_use]
    pub fn matches(&self, value: &(dyn Any + Send + Sync)) -> bool {
        value.type_id() == self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Bound on fact value types: any serializable, debuggable value.
pub trait FactValue:
    Any + Send + Sync + fmt::Debug + Serialize + DeserializeOwned
{
}

impl<T> FactValue for T where T: Any + Send + Sync + fmt::Debug + Serialize + DeserializeOwned {}

type ErasedFact = Arc<dyn Any + Send + Sync>;
type EncodeFn = fn(&(dyn Any + Send + Sync)) -> Result<serde_json::Value, String>;
type DecodeFn = fn(serde_json::Value) -> Result<ErasedFact, String>;
type DebugFn = fn(&(dyn Any + Send + Sync)) -> String;

/// A declared fact type: a globally-agreed name bound to a concrete Rust
/// type, with monomorphized encode/decode hooks for the wire format.
#[derive(Clone)]
pub struct FactType {
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
    debug: DebugFn,
}

impl FactType {
    /// Declare `T` under `name`. The name is the wire identifier and must
    /// be agreed between producer and consumer processes.
    #[must_use]
    pub fn of<T: FactValue>(name: &'static str) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>(),
            type_name: any::type_name::<T>(),
            encode: encode_fact::<T>,
            decode: decode_fact::<T>,
            debug: debug_fact::<T>,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn encode(&self, value: &(dyn Any + Send + Sync)) -> Result<serde_json::Value, String> {
        (self.encode)(value)
    }

    pub fn decode(&self, value: serde_json::Value) -> Result<ErasedFact, String> {
        (self.decode)(value)
    }

    #[must_use]
    pub fn debug(&self, value: &(dyn Any + Send + Sync)) -> String {
        (self.debug)(value)
    }
}

impl fmt::Debug for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactType")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .finish()
    }
}

impl PartialEq for FactType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.type_id == other.type_id
    }
}

impl Eq for FactType {}

fn encode_fact<T: FactValue>(
    value: &(dyn Any + Send + Sync),
) -> Result<serde_json::Value, String> {
    let value = value
        .downcast_ref::<T>()
        .ok_or_else(|| format!("fact value is not a {}", any::type_name::<T>()))?;
    serde_json::to_value(value).map_err(|err| err.to_string())
}

fn decode_fact<T: FactValue>(value: serde_json::Value) -> Result<ErasedFact, String> {
    let value: T = serde_json::from_value(value).map_err(|err| err.to_string())?;
    Ok(Arc::new(value))
}

fn debug_fact<T: FactValue>(value: &(dyn Any + Send + Sync)) -> String {
    match value.downcast_ref::<T>() {
        Some(value) => format!("{value:?}"),
        None => "<fact of unexpected type>".to_string(),
    }
}

/// One command-line flag owned by an analysis. Values are set once during
/// argument parsing and read by the run callback.
#[derive(Debug)]
pub struct Flag {
    pub name: &'static str,
    pub usage: &'static str,
    default: &'static str,
    value: RwLock<Option<String>>,
}

impl Flag {
    /// The parsed value, or the default when the flag was never set.
    #[must_use]
    pub fn value(&self) -> String {
        self.value
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .unwrap_or_else(|| self.default.to_string())
    }

    pub fn set(&self, value: impl Into<String>) {
        if let Ok(mut guard) = self.value.write() {
            *guard = Some(value.into());
        }
    }
}

/// The declared flag set of one analysis.
#[derive(Debug, Default)]
pub struct FlagSet {
    entries: Vec<Flag>,
}

impl FlagSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn define(mut self, name: &'static str, default: &'static str, usage: &'static str) -> Self {
        self.entries.push(Flag {
            name,
            usage,
            default,
            value: RwLock::new(None),
        });
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Flag> {
        self.entries.iter().find(|flag| flag.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.entries.iter()
    }
}

type RunFn = Box<dyn Fn(&Unit<'_>) -> Result<Output, String> + Send + Sync>;

/// The immutable descriptor of one analysis.
pub struct Analysis {
    name: &'static str,
    doc: &'static str,
    requires: Vec<Arc<Analysis>>,
    output: OutputSpec,
    fact_types: Vec<FactType>,
    flags: FlagSet,
    run_despite_errors: bool,
    run: RunFn,
    fact_slots: OnceCell<HashMap<TypeId, usize>>,
}

impl Analysis {
    #[must_use]
    pub fn builder(name: &'static str, doc: &'static str) -> AnalysisBuilder {
        AnalysisBuilder {
            name,
            doc,
            requires: Vec::new(),
            output: OutputSpec::none(),
            fact_types: Vec::new(),
            flags: FlagSet::new(),
            run_despite_errors: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn doc(&self) -> &'static str {
        self.doc
    }

    #[must_use]
    pub fn requires(&self) -> &[Arc<Analysis>] {
        &self.requires
    }

    #[must_use]
    pub fn output_spec(&self) -> &OutputSpec {
        &self.output
    }

    #[must_use]
    pub fn fact_types(&self) -> &[FactType] {
        &self.fact_types
    }

    #[must_use]
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    #[must_use]
    pub fn run_despite_errors(&self) -> bool {
        self.run_despite_errors
    }

    pub(crate) fn run(&self, unit: &Unit<'_>) -> Result<Output, String> {
        (self.run)(unit)
    }

    /// The fixed index of fact type `t` in this analysis's declaration,
    /// or `None` when `t` is undeclared.
    #[must_use]
    pub fn fact_slot(&self, t: TypeId) -> Option<usize> {
        let slots = self.fact_slots.get_or_init(|| {
            self.fact_types
                .iter()
                .enumerate()
                .map(|(index, ft)| (ft.type_id(), index))
                .collect()
        });
        slots.get(&t).copied()
    }

    /// Slot lookup that panics, for accessors whose misuse is a bug in the
    /// calling analysis.
    fn fact_slot_or_panic(&self, t: TypeId, type_name: &str) -> usize {
        match self.fact_slot(t) {
            Some(slot) => slot,
            None => panic!(
                "internal error: type {type_name} is not a fact type of analysis {} (declared: {:?})",
                self.name,
                self.fact_types
                    .iter()
                    .map(FactType::name)
                    .collect::<Vec<_>>()
            ),
        }
    }
}

impl fmt::Debug for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analysis")
            .field("name", &self.name)
            .field("requires", &self.requires.iter().map(|a| a.name).collect::<Vec<_>>())
            .field("fact_types", &self.fact_types)
            .finish()
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Builder for [`Analysis`]. Finish with [`AnalysisBuilder::run`], which
/// supplies the callback and yields the shared descriptor.
pub struct AnalysisBuilder {
    name: &'static str,
    doc: &'static str,
    requires: Vec<Arc<Analysis>>,
    output: OutputSpec,
    fact_types: Vec<FactType>,
    flags: FlagSet,
    run_despite_errors: bool,
}

impl AnalysisBuilder {
    #[must_use]
    pub fn requires(mut self, requires: &[Arc<Analysis>]) -> Self {
        self.requires.extend(requires.iter().cloned());
        self
    }

    #[must_use]
    pub fn output(mut self, output: OutputSpec) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn fact_types(mut self, fact_types: Vec<FactType>) -> Self {
        self.fact_types = fact_types;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: FlagSet) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn run_despite_errors(mut self) -> Self {
        self.run_despite_errors = true;
        self
    }

    pub fn run(
        self,
        run: impl Fn(&Unit<'_>) -> Result<Output, String> + Send + Sync + 'static,
    ) -> Arc<Analysis> {
        Arc::new(Analysis {
            name: self.name,
            doc: self.doc,
            requires: self.requires,
            output: self.output,
            fact_types: self.fact_types,
            flags: self.flags,
            run_despite_errors: self.run_despite_errors,
            run: Box::new(run),
            fact_slots: OnceCell::new(),
        })
    }
}

/// The handle passed to a run callback: the package under analysis, its
/// sources, the outputs of required analyses, fact accessors scoped to
/// this action, and the finding sink. Valid only for the duration of the
/// one run it was built for.
pub struct Unit<'a> {
    analysis: &'a Analysis,
    session: &'a Session,
    pkg: PkgId,
    files: &'a FileCache,
    inputs: &'a HashMap<&'static str, SharedOutput>,
    store: &'a FactStore,
    findings: Mutex<Vec<Diagnostic>>,
    cancel: CancelToken,
    log_facts: bool,
}

impl<'a> Unit<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        analysis: &'a Analysis,
        session: &'a Session,
        pkg: PkgId,
        files: &'a FileCache,
        inputs: &'a HashMap<&'static str, SharedOutput>,
        store: &'a FactStore,
        cancel: CancelToken,
        log_facts: bool,
    ) -> Self {
        Self {
            analysis,
            session,
            pkg,
            files,
            inputs,
            store,
            findings: Mutex::new(Vec::new()),
            cancel,
            log_facts,
        }
    }

    #[must_use]
    pub fn analysis(&self) -> &Analysis {
        self.analysis
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        self.session
    }

    #[must_use]
    pub fn pkg(&self) -> PkgId {
        self.pkg
    }

    #[must_use]
    pub fn files(&self) -> &FileCache {
        self.files
    }

    /// The artifact produced by required analysis `dep` on this package.
    ///
    /// Returns `None` when `dep` is not among the declared requirements or
    /// its artifact has a different type than `T`.
    #[must_use]
    pub fn input<T: Any + Send + Sync>(&self, dep: &Analysis) -> Option<Arc<T>> {
        let value = self.inputs.get(dep.name())?;
        Arc::clone(value).downcast::<T>().ok()
    }

    /// Record a finding.
    pub fn report(&self, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::new(span, message));
    }

    /// Record a finding with a category refining the analysis name.
    pub fn report_in(&self, category: &str, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::with_category(span, category, message));
    }

    fn push(&self, diagnostic: Diagnostic) {
        if let Ok(mut findings) = self.findings.lock() {
            findings.push(diagnostic);
        }
    }

    pub(crate) fn take_findings(&self) -> Vec<Diagnostic> {
        self.findings
            .lock()
            .map(|mut findings| std::mem::take(&mut *findings))
            .unwrap_or_default()
    }

    /// True once the driver has been cancelled; long runs should poll this
    /// at reasonable yield points and return early.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The stored `T` fact for `obj`, if any. `T` must be declared in this
    /// analysis's fact-type set.
    #[must_use]
    pub fn object_fact<T: FactValue>(&self, obj: ObjId) -> Option<Arc<T>> {
        let slot = self
            .analysis
            .fact_slot_or_panic(TypeId::of::<T>(), any::type_name::<T>());
        let value = self.store.get_object(slot, obj)?;
        value.downcast::<T>().ok()
    }

    /// Attach a `T` fact to `obj`, replacing any existing one. `obj` must
    /// belong to the package under analysis, `T` must be declared, and the
    /// run must still be in progress; violations panic.
    pub fn set_object_fact<T: FactValue>(&self, obj: ObjId, value: T) {
        let slot = self
            .analysis
            .fact_slot_or_panic(TypeId::of::<T>(), any::type_name::<T>());
        if self.session.obj(obj).pkg != Some(self.pkg) {
            panic!(
                "internal error: in analysis {} of package {}: set_object_fact({}, {}): \
                 can't set facts on objects belonging to another package",
                self.analysis.name,
                self.session.pkg(self.pkg).path,
                self.session.describe_object(obj),
                any::type_name::<T>(),
            );
        }
        if self.log_facts {
            tracing::info!(
                target: "loupe::facts",
                "fact {value:?} on {}",
                self.session.describe_object(obj)
            );
        }
        if self.store.set_object(slot, obj, Arc::new(value)).is_err() {
            panic!(
                "{}@{}: set_object_fact({}) called after run",
                self.analysis.name,
                self.session.pkg(self.pkg).path,
                any::type_name::<T>(),
            );
        }
    }

    /// The stored `T` fact for package `pkg`, if any.
    #[must_use]
    pub fn package_fact<T: FactValue>(&self, pkg: PkgId) -> Option<Arc<T>> {
        let slot = self
            .analysis
            .fact_slot_or_panic(TypeId::of::<T>(), any::type_name::<T>());
        let value = self.store.get_package(slot, pkg)?;
        value.downcast::<T>().ok()
    }

    /// Attach a `T` fact to the package under analysis.
    pub fn set_package_fact<T: FactValue>(&self, value: T) {
        let slot = self
            .analysis
            .fact_slot_or_panic(TypeId::of::<T>(), any::type_name::<T>());
        if self.log_facts {
            tracing::info!(
                target: "loupe::facts",
                "fact {value:?} on {}",
                self.session.pkg(self.pkg).path
            );
        }
        if self
            .store
            .set_package(slot, self.pkg, Arc::new(value))
            .is_err()
        {
            panic!(
                "{}@{}: set_package_fact({}) called after run",
                self.analysis.name,
                self.session.pkg(self.pkg).path,
                any::type_name::<T>(),
            );
        }
    }
}
