//! Shared helpers for driver integration tests: programmatic session
//! construction (standing in for the external loader) and execution
//! shorthands.

#![allow(dead_code)]

use std::sync::Arc;

use loupe::analysis::Analysis;
use loupe::diagnostics::FileCache;
use loupe::exec::{self, CancelToken, ExecContext, ExecOptions};
use loupe::graph::{self, Action};
use loupe::model::{ObjId, ObjectData, ObjectKind, PkgId, Session, TypeData};

/// Add a package with no imports.
pub fn pkg(session: &mut Session, path: &str) -> PkgId {
    session.add_package(path, path, last_segment(path), false)
}

/// Add a package importing `imports`, in the given order.
pub fn pkg_with_imports(session: &mut Session, path: &str, imports: &[PkgId]) -> PkgId {
    let id = pkg(session, path);
    for &imp in imports {
        session.add_import(id, imp);
    }
    id
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Add a package-scope function and bind it.
pub fn bind_func(session: &mut Session, target: PkgId, name: &str, exported: bool) -> ObjId {
    let empty = session.add_type(TypeData::Tuple { vars: vec![] });
    let sig = session.add_type(TypeData::Signature {
        recv: None,
        params: empty,
        results: empty,
    });
    let obj = session.add_object(ObjectData {
        name: name.into(),
        pkg: Some(target),
        ty: sig,
        kind: ObjectKind::Func,
        exported,
        span: None,
    });
    session.bind(target, obj);
    obj
}

/// Add an unbound (local) variable owned by `target`.
pub fn local_var(session: &mut Session, target: PkgId, name: &str) -> ObjId {
    let int = session.intern_basic("int");
    session.add_object(ObjectData {
        name: name.into(),
        pkg: Some(target),
        ty: int,
        kind: ObjectKind::Var { is_field: false },
        exported: false,
        span: None,
    })
}

/// Build the graph for `analyses` over `initial` and execute it.
pub fn execute(
    session: Session,
    files: FileCache,
    analyses: &[Arc<Analysis>],
    initial: &[PkgId],
    opts: ExecOptions,
) -> (Arc<ExecContext>, Vec<Arc<Action>>) {
    let roots = graph::build(&session, analyses, initial);
    let ctx = Arc::new(ExecContext {
        session: Arc::new(session),
        files: Arc::new(files),
        opts,
        cancel: CancelToken::new(),
    });
    exec::exec_all(&ctx, &roots);
    (ctx, roots)
}
