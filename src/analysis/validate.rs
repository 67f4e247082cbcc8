//! One-shot validation of an analysis set, run before anything executes.
//!
//! Checks that names are unique and addressable, that the `requires`
//! closure is acyclic, and that declared fact types are well-formed, and
//! builds the driver's fact registry from the closure.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analysis::Analysis;
use crate::error::{Error, Result};
use crate::facts::codec::FactRegistry;

/// Validate `analyses` and every analysis reachable through `requires`.
/// Returns the fact registry covering the closure.
pub fn validate(analyses: &[Arc<Analysis>]) -> Result<FactRegistry> {
    let closure = require_closure(analyses);

    let mut by_name: HashMap<&str, &Arc<Analysis>> = HashMap::new();
    for analysis in &closure {
        if analysis.name().is_empty() {
            return Err(Error::config("analysis has an empty name"));
        }
        if analysis.name().contains('.') {
            // Dots would collide with the <analysis>.<flag> addressing
            // scheme on the command line.
            return Err(Error::config(format!(
                "analysis name {:?} contains '.'",
                analysis.name()
            )));
        }
        if let Some(existing) = by_name.insert(analysis.name(), analysis) {
            if !Arc::ptr_eq(existing, analysis) {
                return Err(Error::config(format!(
                    "duplicate analysis name {:?}",
                    analysis.name()
                )));
            }
        }
    }

    check_acyclic(analyses)?;

    let mut registry = FactRegistry::new();
    for analysis in &closure {
        let mut seen = HashMap::new();
        for fact_type in analysis.fact_types() {
            if let Some(previous) = seen.insert(fact_type.type_id(), fact_type.name()) {
                return Err(Error::config(format!(
                    "analysis {} declares fact type {} twice (as {:?} and {:?})",
                    analysis.name(),
                    fact_type.type_name(),
                    previous,
                    fact_type.name()
                )));
            }
            registry.register(fact_type)?;
        }
    }

    Ok(registry)
}

/// Every analysis reachable from `analyses` through `requires`, each once.
#[must_use]
pub fn require_closure(analyses: &[Arc<Analysis>]) -> Vec<Arc<Analysis>> {
    let mut seen: HashMap<*const Analysis, ()> = HashMap::new();
    let mut queue: Vec<Arc<Analysis>> = analyses.to_vec();
    let mut closure = Vec::new();
    while let Some(analysis) = queue.pop() {
        if seen.insert(Arc::as_ptr(&analysis), ()).is_none() {
            queue.extend(analysis.requires().iter().cloned());
            closure.push(analysis);
        }
    }
    closure
}

/// Whether any analysis in the closure declares fact types. When none
/// does, dependency packages never need loading beyond their export data.
#[must_use]
pub fn uses_facts(analyses: &[Arc<Analysis>]) -> bool {
    require_closure(analyses)
        .iter()
        .any(|analysis| !analysis.fact_types().is_empty())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn check_acyclic(analyses: &[Arc<Analysis>]) -> Result<()> {
    let mut marks: HashMap<*const Analysis, Mark> = HashMap::new();
    let mut stack: Vec<&'static str> = Vec::new();
    for analysis in analyses {
        visit(analysis, &mut marks, &mut stack)?;
    }
    Ok(())
}

fn visit(
    analysis: &Arc<Analysis>,
    marks: &mut HashMap<*const Analysis, Mark>,
    stack: &mut Vec<&'static str>,
) -> Result<()> {
    match marks.get(&Arc::as_ptr(analysis)) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let mut cycle: Vec<&str> = stack.clone();
            cycle.push(analysis.name());
            return Err(Error::config(format!(
                "cycle in analysis requirements: {}",
                cycle.join(" -> ")
            )));
        }
        None => {}
    }
    marks.insert(Arc::as_ptr(analysis), Mark::Visiting);
    stack.push(analysis.name());
    for req in analysis.requires() {
        visit(req, marks, stack)?;
    }
    stack.pop();
    marks.insert(Arc::as_ptr(analysis), Mark::Done);
    Ok(())
}
