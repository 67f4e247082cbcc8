//! Construction of the (analysis × package) action graph.
//!
//! Nodes are memoized by (analysis name, package), so the graph is shared
//! wherever requirements or imports converge. Horizontal edges connect an
//! analysis to its requirements on the same package; vertical edges
//! connect a fact-declaring analysis to itself on each direct import.
//! Because requirements are validated acyclic and the loader's import
//! graph is acyclic, the action graph is acyclic by construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::analysis::Analysis;
use crate::exec::ActionResult;
use crate::model::{PkgId, Session};

/// One unit of work: the application of one analysis to one package.
/// Created lazily during graph construction, executed at most once,
/// retained until reporting completes.
pub struct Action {
    pub analysis: Arc<Analysis>,
    pub pkg: PkgId,
    pub deps: Vec<Arc<Action>>,
    is_root: AtomicBool,
    pub(crate) result: OnceLock<ActionResult>,
}

impl Action {
    /// Whether this action's findings are user-visible.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.is_root.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_root(&self) {
        self.is_root.store(true, Ordering::Relaxed);
    }

    /// The stored outcome; present once the action has executed.
    #[must_use]
    pub fn result(&self) -> Option<&ActionResult> {
        self.result.get()
    }

    /// `analysis@package-id`, the label used in prerequisite errors and
    /// timing output.
    #[must_use]
    pub fn label(&self, session: &Session) -> String {
        format!("{}@{}", self.analysis.name(), session.pkg(self.pkg).id)
    }
}

/// Build the graph for `analyses` over `initial`, returning the root
/// actions in (analysis, package) request order.
pub fn build(
    session: &Session,
    analyses: &[Arc<Analysis>],
    initial: &[PkgId],
) -> Vec<Arc<Action>> {
    let mut actions: HashMap<(&'static str, PkgId), Arc<Action>> = HashMap::new();
    let mut roots = Vec::new();
    for analysis in analyses {
        for &pkg in initial {
            let root = mk_action(session, &mut actions, analysis, pkg);
            root.mark_root();
            roots.push(root);
        }
    }
    roots
}

fn mk_action(
    session: &Session,
    actions: &mut HashMap<(&'static str, PkgId), Arc<Action>>,
    analysis: &Arc<Analysis>,
    pkg: PkgId,
) -> Arc<Action> {
    if let Some(action) = actions.get(&(analysis.name(), pkg)) {
        return Arc::clone(action);
    }

    let mut deps = Vec::new();
    for req in analysis.requires() {
        deps.push(mk_action(session, actions, req, pkg));
    }

    // An analysis that declares facts must run on the package's
    // dependencies too, in import-path order for determinism.
    if !analysis.fact_types().is_empty() {
        let mut imports = session.pkg(pkg).imports.clone();
        imports.sort_by(|&a, &b| session.pkg(a).path.cmp(&session.pkg(b).path));
        for imp in imports {
            deps.push(mk_action(session, actions, analysis, imp));
        }
    }

    let action = Arc::new(Action {
        analysis: Arc::clone(analysis),
        pkg,
        deps,
        is_root: AtomicBool::new(false),
        result: OnceLock::new(),
    });
    actions.insert((analysis.name(), pkg), Arc::clone(&action));
    action
}

/// Every action reachable from `roots`, dependencies before dependents,
/// each action once.
#[must_use]
pub fn postorder(roots: &[Arc<Action>]) -> Vec<Arc<Action>> {
    let mut seen: HashMap<*const Action, ()> = HashMap::new();
    let mut out = Vec::new();
    for root in roots {
        visit(root, &mut seen, &mut out);
    }
    out
}

fn visit(
    action: &Arc<Action>,
    seen: &mut HashMap<*const Action, ()>,
    out: &mut Vec<Arc<Action>>,
) {
    if seen.insert(Arc::as_ptr(action), ()).is_some() {
        return;
    }
    for dep in &action.deps {
        visit(dep, seen, out);
    }
    out.push(Arc::clone(action));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{no_output, FactType};
    use serde::{Deserialize, Serialize};

    fn session_with_imports() -> (Session, PkgId, PkgId, PkgId) {
        let mut session = Session::new();
        // top imports zeta and alpha; order of add is deliberately
        // non-alphabetical to exercise the deterministic sort.
        let zeta = session.add_package("zeta", "zeta", "zeta", false);
        let alpha = session.add_package("alpha", "alpha", "alpha", false);
        let top = session.add_package("top", "top", "top", false);
        session.add_import(top, zeta);
        session.add_import(top, alpha);
        (session, top, alpha, zeta)
    }

    #[test]
    fn horizontal_edges_follow_requires() {
        let (session, top, _, _) = session_with_imports();
        let base = Analysis::builder("base", "test").run(|_| Ok(no_output()));
        let derived = Analysis::builder("derived", "test")
            .requires(&[base])
            .run(|_| Ok(no_output()));

        let roots = build(&session, &[derived], &[top]);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].deps.len(), 1);
        assert_eq!(roots[0].deps[0].analysis.name(), "base");
        assert_eq!(roots[0].deps[0].pkg, top);
        assert!(roots[0].is_root());
        assert!(!roots[0].deps[0].is_root());
    }

    #[test]
    fn vertical_edges_exist_only_for_fact_declaring_analyses() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Mark(bool);

        let (session, top, alpha, zeta) = session_with_imports();

        let plain = Analysis::builder("plain", "test").run(|_| Ok(no_output()));
        let roots = build(&session, &[plain], &[top]);
        assert!(roots[0].deps.is_empty());

        let facty = Analysis::builder("facty", "test")
            .fact_types(vec![FactType::of::<Mark>("facty.Mark")])
            .run(|_| Ok(no_output()));
        let roots = build(&session, &[facty], &[top]);
        let dep_pkgs: Vec<PkgId> = roots[0].deps.iter().map(|d| d.pkg).collect();
        // Sorted by import path: alpha before zeta.
        assert_eq!(dep_pkgs, vec![alpha, zeta]);
    }

    #[test]
    fn nodes_are_memoized_across_the_graph() {
        let (session, top, _, _) = session_with_imports();
        let base = Analysis::builder("base", "test").run(|_| Ok(no_output()));
        let left = Analysis::builder("left", "test")
            .requires(&[base.clone()])
            .run(|_| Ok(no_output()));
        let right = Analysis::builder("right", "test")
            .requires(&[base])
            .run(|_| Ok(no_output()));

        let roots = build(&session, &[left, right], &[top]);
        assert!(Arc::ptr_eq(&roots[0].deps[0], &roots[1].deps[0]));

        let all = postorder(&roots);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].analysis.name(), "base");
    }
}
