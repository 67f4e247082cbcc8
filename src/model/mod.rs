//! The program model the engine analyzes: packages, named entities, and
//! structural types, owned by an arena [`Session`].
//!
//! Entities are addressed by plain index newtypes. Id equality is entity
//! identity *within one session*; a reloaded session assigns fresh ids and
//! identity is re-established through object paths (see
//! [`crate::objectpath`]). The loader builds the session; during execution
//! it is shared read-only.

pub mod manifest;

use std::collections::HashMap;

use crate::diagnostics::{FileId, Span};

/// Identity of a package within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PkgId(u32);

impl PkgId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a named entity within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(u32);

impl ObjId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a type within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// Placeholder used by loaders between declaring a named type and
    /// resolving its structure. Never observed after loading completes.
    pub const UNRESOLVED: Self = TypeId(u32::MAX);

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of entity an object is. Method-ness of a `Func` is carried by
/// its signature's receiver, not by the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Func,
    Var { is_field: bool },
    TypeName,
    Const,
    Label,
    PkgName,
}

/// A named program entity: type, function, method, variable, field,
/// constant. Owned by at most one package; universe entities have none.
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub name: String,
    pub pkg: Option<PkgId>,
    pub ty: TypeId,
    pub kind: ObjectKind,
    pub exported: bool,
    pub span: Option<Span>,
}

/// Structural types. `Named` wraps an underlying structure and carries the
/// type's declared methods; every other variant is anonymous structure.
#[derive(Debug, Clone)]
pub enum TypeData {
    Basic { name: String },
    Named {
        obj: ObjId,
        underlying: TypeId,
        methods: Vec<ObjId>,
    },
    Pointer { elem: TypeId },
    Slice { elem: TypeId },
    Array { len: u64, elem: TypeId },
    Chan { elem: TypeId },
    Map { key: TypeId, value: TypeId },
    Struct { fields: Vec<ObjId> },
    Tuple { vars: Vec<ObjId> },
    Signature {
        recv: Option<ObjId>,
        params: TypeId,
        results: TypeId,
    },
    Interface { methods: Vec<ObjId> },
}

/// One package as supplied by the loader.
#[derive(Debug, Clone)]
pub struct PackageData {
    /// Loader-assigned identifier. Usually equals `path`; variants of the
    /// same package (a library and its test build) share a path but get
    /// distinct ids.
    pub id: String,
    /// Import path.
    pub path: String,
    pub name: String,
    /// Package-scope objects in declaration order.
    pub scope: Vec<ObjId>,
    pub imports: Vec<PkgId>,
    pub files: Vec<FileId>,
    pub ill_typed: bool,
    lookup: HashMap<String, ObjId>,
}

impl PackageData {
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ObjId> {
        self.lookup.get(name).copied()
    }
}

/// Arena holding every package, object, and type of one load.
#[derive(Debug, Default)]
pub struct Session {
    packages: Vec<PackageData>,
    objects: Vec<ObjectData>,
    types: Vec<TypeData>,
    basic_cache: HashMap<String, TypeId>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_package(
        &mut self,
        id: impl Into<String>,
        path: impl Into<String>,
        name: impl Into<String>,
        ill_typed: bool,
    ) -> PkgId {
        let pkg = PkgId(self.packages.len() as u32);
        self.packages.push(PackageData {
            id: id.into(),
            path: path.into(),
            name: name.into(),
            scope: Vec::new(),
            imports: Vec::new(),
            files: Vec::new(),
            ill_typed,
            lookup: HashMap::new(),
        });
        pkg
    }

    pub fn add_import(&mut self, pkg: PkgId, dep: PkgId) {
        self.packages[pkg.index()].imports.push(dep);
    }

    pub fn add_package_file(&mut self, pkg: PkgId, file: FileId) {
        self.packages[pkg.index()].files.push(file);
    }

    pub fn add_object(&mut self, data: ObjectData) -> ObjId {
        let obj = ObjId(self.objects.len() as u32);
        self.objects.push(data);
        obj
    }

    /// Enter an object into its package's scope. Scope order is bind order.
    pub fn bind(&mut self, pkg: PkgId, obj: ObjId) {
        let name = self.objects[obj.index()].name.clone();
        let data = &mut self.packages[pkg.index()];
        data.scope.push(obj);
        data.lookup.insert(name, obj);
    }

    pub fn add_type(&mut self, data: TypeData) -> TypeId {
        let ty = TypeId(self.types.len() as u32);
        self.types.push(data);
        ty
    }

    /// Intern a basic type by name.
    pub fn intern_basic(&mut self, name: &str) -> TypeId {
        if let Some(&ty) = self.basic_cache.get(name) {
            return ty;
        }
        let ty = self.add_type(TypeData::Basic {
            name: name.to_string(),
        });
        self.basic_cache.insert(name.to_string(), ty);
        ty
    }

    pub fn set_object_type(&mut self, obj: ObjId, ty: TypeId) {
        self.objects[obj.index()].ty = ty;
    }

    pub fn set_underlying(&mut self, named: TypeId, ty: TypeId) {
        if let TypeData::Named { underlying, .. } = &mut self.types[named.index()] {
            *underlying = ty;
        }
    }

    pub fn add_method(&mut self, named: TypeId, method: ObjId) {
        if let TypeData::Named { methods, .. } = &mut self.types[named.index()] {
            methods.push(method);
        }
    }

    pub fn add_interface_method(&mut self, interface: TypeId, method: ObjId) {
        if let TypeData::Interface { methods } = &mut self.types[interface.index()] {
            methods.push(method);
        }
    }

    #[must_use]
    pub fn pkg(&self, pkg: PkgId) -> &PackageData {
        &self.packages[pkg.index()]
    }

    #[must_use]
    pub fn obj(&self, obj: ObjId) -> &ObjectData {
        &self.objects[obj.index()]
    }

    #[must_use]
    pub fn ty(&self, ty: TypeId) -> &TypeData {
        &self.types[ty.index()]
    }

    #[must_use]
    pub fn lookup(&self, pkg: PkgId, name: &str) -> Option<ObjId> {
        self.pkg(pkg).lookup(name)
    }

    pub fn package_ids(&self) -> impl Iterator<Item = PkgId> {
        (0..self.packages.len() as u32).map(PkgId)
    }

    #[must_use]
    pub fn package_by_path(&self, path: &str) -> Option<PkgId> {
        self.package_ids().find(|&p| self.pkg(p).path == path)
    }

    /// The receiver of a function's signature, if it has one.
    #[must_use]
    pub fn recv_of(&self, obj: ObjId) -> Option<ObjId> {
        let data = self.obj(obj);
        if data.kind != ObjectKind::Func {
            return None;
        }
        match self.ty(data.ty) {
            TypeData::Signature { recv, .. } => *recv,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_method(&self, obj: ObjId) -> bool {
        self.recv_of(obj).is_some()
    }

    /// `pkgname.Name` label for contract-violation and log messages.
    #[must_use]
    pub fn describe_object(&self, obj: ObjId) -> String {
        let data = self.obj(obj);
        match data.pkg {
            Some(pkg) => format!("{}.{}", self.pkg(pkg).name, data.name),
            None => data.name.clone(),
        }
    }
}
