//! Per-action fact storage.
//!
//! Each action owns one [`FactStore`] for the duration of its run. The
//! store holds both facts inherited from dependency packages and facts the
//! run sets on its own package, indexed by the analysis's fixed fact-type
//! slot. A single mutex guards the store; contention is low because only
//! the owning run mutates it.

pub mod codec;
pub mod transport;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::model::{ObjId, PkgId};

/// A stored fact value, type-erased behind its declared slot.
pub type FactVal = Arc<dyn Any + Send + Sync>;

/// The store was sealed when a write arrived; callers turn this into a
/// contract-violation panic naming the offender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSealed;

#[derive(Default)]
struct Inner {
    objects: Vec<HashMap<ObjId, FactVal>>,
    packages: Vec<HashMap<PkgId, FactVal>>,
    sealed: bool,
}

/// Concurrent per-action fact map, one object map and one package map per
/// declared fact type.
pub struct FactStore {
    inner: Mutex<Inner>,
}

impl FactStore {
    /// A store with `slots` fact-type slots (one per declared fact type).
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                objects: (0..slots).map(|_| HashMap::new()).collect(),
                packages: (0..slots).map(|_| HashMap::new()).collect(),
                sealed: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn get_object(&self, slot: usize, obj: ObjId) -> Option<FactVal> {
        self.lock().objects[slot].get(&obj).cloned()
    }

    /// Insert or replace; fails once the store is sealed.
    pub fn set_object(&self, slot: usize, obj: ObjId, value: FactVal) -> Result<(), StoreSealed> {
        let mut inner = self.lock();
        if inner.sealed {
            return Err(StoreSealed);
        }
        inner.objects[slot].insert(obj, value);
        Ok(())
    }

    #[must_use]
    pub fn get_package(&self, slot: usize, pkg: PkgId) -> Option<FactVal> {
        self.lock().packages[slot].get(&pkg).cloned()
    }

    pub fn set_package(&self, slot: usize, pkg: PkgId, value: FactVal) -> Result<(), StoreSealed> {
        let mut inner = self.lock();
        if inner.sealed {
            return Err(StoreSealed);
        }
        inner.packages[slot].insert(pkg, value);
        Ok(())
    }

    /// Make the store read-only. Sets after this point report
    /// [`StoreSealed`]; an analysis that retains its unit past its run is
    /// a bug and is diagnosed at the accessor layer.
    pub fn seal(&self) {
        self.lock().sealed = true;
    }

    /// Copy out the current maps (values are shared, not cloned). Used to
    /// freeze an action's facts into its result.
    #[must_use]
    pub fn snapshot(&self) -> FactSnapshot {
        let inner = self.lock();
        FactSnapshot {
            objects: inner.objects.clone(),
            packages: inner.packages.clone(),
        }
    }
}

/// The frozen facts of a completed action, indexed like the analysis's
/// fact-type declaration.
#[derive(Clone, Default)]
pub struct FactSnapshot {
    pub objects: Vec<HashMap<ObjId, FactVal>>,
    pub packages: Vec<HashMap<PkgId, FactVal>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(raw: u32) -> ObjId {
        // Ids are opaque outside the session; fabricate them through a
        // session to stay honest.
        let mut session = crate::model::Session::new();
        let pkg = session.add_package("t", "t", "t", false);
        let int = session.intern_basic("int");
        let mut last = None;
        for i in 0..=raw {
            last = Some(session.add_object(crate::model::ObjectData {
                name: format!("o{i}"),
                pkg: Some(pkg),
                ty: int,
                kind: crate::model::ObjectKind::Const,
                exported: false,
                span: None,
            }));
        }
        last.unwrap()
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = FactStore::new(2);
        let o = obj(0);
        store.set_object(1, o, Arc::new(7u32)).unwrap();
        let value = store.get_object(1, o).unwrap();
        assert_eq!(*value.downcast::<u32>().ok().unwrap(), 7);
        assert!(store.get_object(0, o).is_none());
    }

    #[test]
    fn replace_clobbers_existing_entry() {
        let store = FactStore::new(1);
        let o = obj(0);
        store.set_object(0, o, Arc::new(1u32)).unwrap();
        store.set_object(0, o, Arc::new(2u32)).unwrap();
        let value = store.get_object(0, o).unwrap();
        assert_eq!(*value.downcast::<u32>().ok().unwrap(), 2);
    }

    #[test]
    fn sealed_store_rejects_writes_but_serves_reads() {
        let store = FactStore::new(1);
        let o = obj(0);
        store.set_object(0, o, Arc::new(1u32)).unwrap();
        store.seal();
        assert_eq!(
            store.set_object(0, obj(1), Arc::new(2u32)),
            Err(StoreSealed)
        );
        assert!(store.get_object(0, o).is_some());
    }

    #[test]
    fn snapshot_preserves_slot_layout() {
        let store = FactStore::new(3);
        let o = obj(0);
        store.set_object(2, o, Arc::new("x".to_string())).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.objects.len(), 3);
        assert!(snapshot.objects[0].is_empty());
        assert!(snapshot.objects[2].contains_key(&o));
    }
}
