//! An analysis that indexes package-scope declarations by kind. It is
//! only a building block for other passes, which consume the index as an
//! in-memory artifact instead of re-walking the scope.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::analysis::{Analysis, OutputSpec};
use crate::model::{ObjId, ObjectKind};

/// Package-scope objects grouped by kind, in declaration order.
#[derive(Debug, Default, Clone)]
pub struct Inventory {
    pub funcs: Vec<ObjId>,
    pub types: Vec<ObjId>,
    pub vars: Vec<ObjId>,
    pub consts: Vec<ObjId>,
}

impl Inventory {
    #[must_use]
    pub fn len(&self) -> usize {
        self.funcs.len() + self.types.len() + self.vars.len() + self.consts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static ANALYSIS: Lazy<Arc<Analysis>> = Lazy::new(|| {
    Analysis::builder("inventory", "index package-scope declarations for later passes")
        .output(OutputSpec::of::<Inventory>())
        .run_despite_errors()
        .run(|unit| {
            let session = unit.session();
            let mut inventory = Inventory::default();
            for &obj in &session.pkg(unit.pkg()).scope {
                match session.obj(obj).kind {
                    ObjectKind::Func => inventory.funcs.push(obj),
                    ObjectKind::TypeName => inventory.types.push(obj),
                    ObjectKind::Var { .. } => inventory.vars.push(obj),
                    ObjectKind::Const => inventory.consts.push(obj),
                    ObjectKind::Label | ObjectKind::PkgName => {}
                }
            }
            Ok(Box::new(inventory))
        })
});

#[must_use]
pub fn analysis() -> Arc<Analysis> {
    Arc::clone(&ANALYSIS)
}
