//! JSON package manifests: the loadable package description used by the
//! demo drivers and tests.
//!
//! A manifest describes one package the way compiled export data would:
//! its import list, its package-scope declarations with structural type
//! expressions, and (optionally) its source text for diagnostics. The
//! same format serves as the "compiled file" consumed by the
//! compile-protocol driver, so a package can be described once, analyzed,
//! and later reloaded as a dependency.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diagnostics::{FileCache, FileId, Span};
use crate::error::{Error, Result};
use crate::loader::{LoadMode, LoadedGraph, LoadedUnit, PackageLoader, UnitConfig, UnitLoader};
use crate::model::{ObjId, ObjectData, ObjectKind, PkgId, Session, TypeData, TypeId};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    /// Import path.
    path: String,
    /// Package name; defaults to the last path segment.
    #[serde(default)]
    name: Option<String>,
    /// Package identifier; defaults to the import path.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    ill_typed: bool,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    sources: Vec<ManifestSource>,
    #[serde(default)]
    decls: Vec<ManifestDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestSource {
    name: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDecl {
    name: String,
    kind: DeclKind,
    /// Defaults to "first character is uppercase".
    #[serde(default)]
    exported: Option<bool>,
    #[serde(rename = "type")]
    ty: TypeExpr,
    /// Declared methods; type declarations only.
    #[serde(default)]
    methods: Vec<MethodDecl>,
    /// (source index, start offset, end offset)
    #[serde(default)]
    span: Option<(usize, usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DeclKind {
    Func,
    Var,
    Const,
    Type,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodDecl {
    name: String,
    #[serde(default)]
    exported: Option<bool>,
    #[serde(default)]
    params: Vec<ParamDecl>,
    #[serde(default)]
    results: Vec<ParamDecl>,
    #[serde(default)]
    span: Option<(usize, usize, usize)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamDecl {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    ty: TypeExpr,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDecl {
    name: String,
    #[serde(default)]
    exported: Option<bool>,
    #[serde(rename = "type")]
    ty: TypeExpr,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TypeExpr {
    Basic(String),
    Named {
        #[serde(default)]
        pkg: String,
        name: String,
    },
    Pointer {
        elem: Box<TypeExpr>,
    },
    Slice {
        elem: Box<TypeExpr>,
    },
    Array {
        len: u64,
        elem: Box<TypeExpr>,
    },
    Chan {
        elem: Box<TypeExpr>,
    },
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    Struct {
        #[serde(default)]
        fields: Vec<FieldDecl>,
    },
    Interface {
        #[serde(default)]
        methods: Vec<MethodDecl>,
    },
    Func {
        #[serde(default)]
        params: Vec<ParamDecl>,
        #[serde(default)]
        results: Vec<ParamDecl>,
    },
}

fn default_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Loads packages from manifest files found under a set of search roots.
pub struct ManifestLoader {
    roots: Vec<PathBuf>,
}

impl ManifestLoader {
    /// A loader searching the current directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
        }
    }

    #[must_use]
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn manifest_for_import(&self, path: &str) -> Result<PathBuf> {
        for root in &self.roots {
            let candidate = root.join(format!("{path}.json"));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(Error::loader(format!(
            "can't find a manifest for package {path:?} under {:?}",
            self.roots
        )))
    }
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageLoader for ManifestLoader {
    fn load(&self, patterns: &[String], mode: LoadMode) -> Result<LoadedGraph> {
        let mut build = Build::new(Resolver::Roots(self), mode);
        let mut initial = Vec::new();
        for pattern in patterns {
            let file = if pattern.ends_with(".json") {
                PathBuf::from(pattern)
            } else {
                self.manifest_for_import(pattern)?
            };
            let manifest = read_manifest(&file)?;
            let pkg = build.package(manifest, true)?;
            initial.push(pkg);
        }
        if initial.is_empty() {
            return Err(Error::loader("no packages matched the given patterns"));
        }
        Ok(LoadedGraph {
            session: build.session,
            files: build.files,
            initial,
        })
    }
}

impl UnitLoader for ManifestLoader {
    fn load_unit(&self, cfg: &UnitConfig) -> Result<LoadedUnit> {
        let Some(first) = cfg.source_files.first() else {
            return Err(Error::loader(format!(
                "package has no files: {}",
                cfg.import_path
            )));
        };
        let manifest = read_manifest(&cfg.resolve(first))?;
        if manifest.path != cfg.import_path {
            return Err(Error::loader(format!(
                "config names import path {:?} but {} describes {:?}",
                cfg.import_path,
                first.display(),
                manifest.path
            )));
        }
        let mut build = Build::new(Resolver::Unit(cfg), LoadMode::Syntax);
        let pkg = build.package(manifest, true)?;
        Ok(LoadedUnit {
            session: build.session,
            files: build.files,
            pkg,
        })
    }
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    let data = fs::read_to_string(path)
        .map_err(|err| Error::loader(format!("reading {}: {err}", path.display())))?;
    serde_json::from_str(&data)
        .map_err(|err| Error::loader(format!("parsing {}: {err}", path.display())))
}

enum Resolver<'a> {
    /// Resolve imports by probing the loader's search roots.
    Roots(&'a ManifestLoader),
    /// Resolve imports through the compile-protocol maps.
    Unit(&'a UnitConfig),
}

impl Resolver<'_> {
    fn manifest_for_import(&self, path: &str) -> Result<PathBuf> {
        match self {
            Resolver::Roots(loader) => loader.manifest_for_import(path),
            Resolver::Unit(cfg) => {
                let resolved = cfg
                    .import_map
                    .get(path)
                    .map_or(path, String::as_str);
                let file = cfg.package_file.get(resolved).ok_or_else(|| {
                    Error::loader(format!("no package file for {resolved:?}"))
                })?;
                Ok(cfg.resolve(file))
            }
        }
    }
}

struct Build<'a> {
    resolver: Resolver<'a>,
    mode: LoadMode,
    session: Session,
    files: FileCache,
    done: HashMap<String, PkgId>,
    loading: Vec<String>,
}

impl<'a> Build<'a> {
    fn new(resolver: Resolver<'a>, mode: LoadMode) -> Self {
        Self {
            resolver,
            mode,
            session: Session::new(),
            files: FileCache::default(),
            done: HashMap::new(),
            loading: Vec::new(),
        }
    }

    fn import(&mut self, path: &str) -> Result<PkgId> {
        if let Some(&pkg) = self.done.get(path) {
            return Ok(pkg);
        }
        if self.loading.iter().any(|p| p == path) {
            return Err(Error::loader(format!(
                "import cycle: {} -> {path}",
                self.loading.join(" -> ")
            )));
        }
        let file = self.resolver.manifest_for_import(path)?;
        let manifest = read_manifest(&file)?;
        if manifest.path != path {
            return Err(Error::loader(format!(
                "manifest {} describes {:?}, expected {path:?}",
                file.display(),
                manifest.path
            )));
        }
        let with_sources = self.mode == LoadMode::AllSyntax;
        self.package(manifest, with_sources)
    }

    fn package(&mut self, manifest: Manifest, with_sources: bool) -> Result<PkgId> {
        if let Some(&pkg) = self.done.get(&manifest.path) {
            return Ok(pkg);
        }
        self.loading.push(manifest.path.clone());

        // Dependencies first, so named references resolve.
        let mut imports = Vec::new();
        for import in &manifest.imports {
            imports.push(self.import(import)?);
        }

        let name = manifest.name.clone().unwrap_or_else(|| {
            manifest
                .path
                .rsplit('/')
                .next()
                .unwrap_or(&manifest.path)
                .to_string()
        });
        let id = manifest.id.clone().unwrap_or_else(|| manifest.path.clone());
        let pkg = self
            .session
            .add_package(id, manifest.path.clone(), name, manifest.ill_typed);
        for import in imports {
            self.session.add_import(pkg, import);
        }

        let mut file_ids: Vec<FileId> = Vec::new();
        if with_sources {
            for source in &manifest.sources {
                let file = self.files.add_file(&source.name, &source.text);
                self.session.add_package_file(pkg, file);
                file_ids.push(file);
            }
        }

        let mut seen_names: HashSet<&str> = HashSet::new();
        for decl in &manifest.decls {
            if !seen_names.insert(&decl.name) {
                return Err(Error::loader(format!(
                    "package {}: duplicate declaration {:?}",
                    manifest.path, decl.name
                )));
            }
        }

        // Named types are declared in two phases so that declarations can
        // reference each other and themselves.
        let mut named: HashMap<&str, TypeId> = HashMap::new();
        for decl in &manifest.decls {
            if decl.kind != DeclKind::Type {
                continue;
            }
            let obj = self.session.add_object(ObjectData {
                name: decl.name.clone(),
                pkg: Some(pkg),
                ty: TypeId::UNRESOLVED,
                kind: ObjectKind::TypeName,
                exported: decl.exported.unwrap_or_else(|| default_exported(&decl.name)),
                span: self.span(&file_ids, decl.span, &manifest.path)?,
            });
            let ty = self.session.add_type(TypeData::Named {
                obj,
                underlying: TypeId::UNRESOLVED,
                methods: Vec::new(),
            });
            self.session.set_object_type(obj, ty);
            self.session.bind(pkg, obj);
            named.insert(&decl.name, ty);
        }

        for decl in &manifest.decls {
            match decl.kind {
                DeclKind::Type => {
                    let ty = named[decl.name.as_str()];
                    let underlying = self.resolve(pkg, &decl.ty, &manifest.path)?;
                    self.session.set_underlying(ty, underlying);
                    for method in &decl.methods {
                        let m = self.method(pkg, ty, method, &file_ids, &manifest.path)?;
                        self.session.add_method(ty, m);
                    }
                }
                DeclKind::Func => {
                    let TypeExpr::Func { params, results } = &decl.ty else {
                        return Err(Error::loader(format!(
                            "package {}: func {:?} must have a func type",
                            manifest.path, decl.name
                        )));
                    };
                    let sig = self.signature(pkg, None, params, results, &manifest.path)?;
                    let obj = self.session.add_object(ObjectData {
                        name: decl.name.clone(),
                        pkg: Some(pkg),
                        ty: sig,
                        kind: ObjectKind::Func,
                        exported: decl
                            .exported
                            .unwrap_or_else(|| default_exported(&decl.name)),
                        span: self.span(&file_ids, decl.span, &manifest.path)?,
                    });
                    self.session.bind(pkg, obj);
                }
                DeclKind::Var | DeclKind::Const => {
                    let ty = self.resolve(pkg, &decl.ty, &manifest.path)?;
                    let kind = if decl.kind == DeclKind::Var {
                        ObjectKind::Var { is_field: false }
                    } else {
                        ObjectKind::Const
                    };
                    let obj = self.session.add_object(ObjectData {
                        name: decl.name.clone(),
                        pkg: Some(pkg),
                        ty,
                        kind,
                        exported: decl
                            .exported
                            .unwrap_or_else(|| default_exported(&decl.name)),
                        span: self.span(&file_ids, decl.span, &manifest.path)?,
                    });
                    self.session.bind(pkg, obj);
                }
            }
        }

        self.loading.pop();
        self.done.insert(manifest.path.clone(), pkg);
        Ok(pkg)
    }

    fn span(
        &self,
        file_ids: &[FileId],
        span: Option<(usize, usize, usize)>,
        pkg_path: &str,
    ) -> Result<Option<Span>> {
        let Some((source, start, end)) = span else {
            return Ok(None);
        };
        if file_ids.is_empty() {
            // Sources were not loaded in this mode; positions are moot.
            return Ok(None);
        }
        let Some(&file) = file_ids.get(source) else {
            return Err(Error::loader(format!(
                "package {pkg_path}: span references source {source}, but only {} sources exist",
                file_ids.len()
            )));
        };
        Ok(Some(Span::new(file, start, end)))
    }

    fn resolve(&mut self, pkg: PkgId, expr: &TypeExpr, pkg_path: &str) -> Result<TypeId> {
        match expr {
            TypeExpr::Basic(name) => Ok(self.session.intern_basic(name)),
            TypeExpr::Named { pkg: from, name } => {
                let target = if from.is_empty() {
                    pkg
                } else {
                    self.session.package_by_path(from).ok_or_else(|| {
                        Error::loader(format!(
                            "package {pkg_path}: named type {from}.{name} references a \
                             package that is not imported"
                        ))
                    })?
                };
                let obj = self.session.lookup(target, name).ok_or_else(|| {
                    Error::loader(format!(
                        "package {pkg_path}: unknown named type {}.{name}",
                        if from.is_empty() { pkg_path } else { from }
                    ))
                })?;
                let data = self.session.obj(obj);
                if data.kind != ObjectKind::TypeName {
                    return Err(Error::loader(format!(
                        "package {pkg_path}: {name} is not a type name"
                    )));
                }
                Ok(data.ty)
            }
            TypeExpr::Pointer { elem } => {
                let elem = self.resolve(pkg, elem, pkg_path)?;
                Ok(self.session.add_type(TypeData::Pointer { elem }))
            }
            TypeExpr::Slice { elem } => {
                let elem = self.resolve(pkg, elem, pkg_path)?;
                Ok(self.session.add_type(TypeData::Slice { elem }))
            }
            TypeExpr::Array { len, elem } => {
                let elem = self.resolve(pkg, elem, pkg_path)?;
                Ok(self.session.add_type(TypeData::Array { len: *len, elem }))
            }
            TypeExpr::Chan { elem } => {
                let elem = self.resolve(pkg, elem, pkg_path)?;
                Ok(self.session.add_type(TypeData::Chan { elem }))
            }
            TypeExpr::Map { key, value } => {
                let key = self.resolve(pkg, key, pkg_path)?;
                let value = self.resolve(pkg, value, pkg_path)?;
                Ok(self.session.add_type(TypeData::Map { key, value }))
            }
            TypeExpr::Struct { fields } => {
                let mut field_objs = Vec::new();
                for field in fields {
                    let ty = self.resolve(pkg, &field.ty, pkg_path)?;
                    field_objs.push(self.session.add_object(ObjectData {
                        name: field.name.clone(),
                        pkg: Some(pkg),
                        ty,
                        kind: ObjectKind::Var { is_field: true },
                        exported: field
                            .exported
                            .unwrap_or_else(|| default_exported(&field.name)),
                        span: None,
                    }));
                }
                Ok(self.session.add_type(TypeData::Struct {
                    fields: field_objs,
                }))
            }
            TypeExpr::Interface { methods } => {
                let ifc = self.session.add_type(TypeData::Interface {
                    methods: Vec::new(),
                });
                for method in methods {
                    let m = self.method(pkg, ifc, method, &[], pkg_path)?;
                    self.session.add_interface_method(ifc, m);
                }
                Ok(ifc)
            }
            TypeExpr::Func { params, results } => {
                self.signature(pkg, None, params, results, pkg_path)
            }
        }
    }

    fn tuple(&mut self, pkg: PkgId, params: &[ParamDecl], pkg_path: &str) -> Result<TypeId> {
        let mut vars = Vec::new();
        for param in params {
            let ty = self.resolve(pkg, &param.ty, pkg_path)?;
            vars.push(self.session.add_object(ObjectData {
                name: param.name.clone(),
                pkg: Some(pkg),
                ty,
                kind: ObjectKind::Var { is_field: false },
                exported: false,
                span: None,
            }));
        }
        Ok(self.session.add_type(TypeData::Tuple { vars }))
    }

    fn signature(
        &mut self,
        pkg: PkgId,
        recv: Option<ObjId>,
        params: &[ParamDecl],
        results: &[ParamDecl],
        pkg_path: &str,
    ) -> Result<TypeId> {
        let params = self.tuple(pkg, params, pkg_path)?;
        let results = self.tuple(pkg, results, pkg_path)?;
        Ok(self.session.add_type(TypeData::Signature {
            recv,
            params,
            results,
        }))
    }

    fn method(
        &mut self,
        pkg: PkgId,
        recv_ty: TypeId,
        decl: &MethodDecl,
        file_ids: &[FileId],
        pkg_path: &str,
    ) -> Result<ObjId> {
        let recv = self.session.add_object(ObjectData {
            name: String::new(),
            pkg: Some(pkg),
            ty: recv_ty,
            kind: ObjectKind::Var { is_field: false },
            exported: false,
            span: None,
        });
        let sig = self.signature(pkg, Some(recv), &decl.params, &decl.results, pkg_path)?;
        Ok(self.session.add_object(ObjectData {
            name: decl.name.clone(),
            pkg: Some(pkg),
            ty: sig,
            kind: ObjectKind::Func,
            exported: decl.exported.unwrap_or_else(|| default_exported(&decl.name)),
            span: self.span(file_ids, decl.span, pkg_path)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objectpath;

    fn write_manifest(dir: &Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    const UTIL: &str = r#"{
        "path": "demo/util",
        "imports": [],
        "sources": [{"name": "util.src", "text": "package util\nfunc Grow() {}\n"}],
        "decls": [
            {"name": "Grow", "kind": "func", "type": {"func": {}}, "span": [0, 13, 27]},
            {"name": "Buf", "kind": "type",
             "type": {"struct": {"fields": [{"name": "len", "type": {"basic": "int"}}]}},
             "methods": [{"name": "Len", "results": [{"type": {"basic": "int"}}]}]}
        ]
    }"#;

    const APP: &str = r#"{
        "path": "demo/app",
        "imports": ["demo/util"],
        "sources": [{"name": "app.src", "text": "package app\nfunc main() {}\n"}],
        "decls": [
            {"name": "main", "kind": "func", "type": {"func": {}}, "span": [0, 12, 26]},
            {"name": "buf", "kind": "var", "type": {"named": {"pkg": "demo/util", "name": "Buf"}}}
        ]
    }"#;

    #[test]
    fn loads_a_two_package_graph() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "demo/util.json", UTIL);
        write_manifest(dir.path(), "demo/app.json", APP);

        let loader = ManifestLoader::with_roots(vec![dir.path().to_path_buf()]);
        let loaded = loader
            .load(&["demo/app".to_string()], LoadMode::AllSyntax)
            .unwrap();
        assert_eq!(loaded.initial.len(), 1);

        let session = &loaded.session;
        let app = loaded.initial[0];
        assert_eq!(session.pkg(app).path, "demo/app");
        assert_eq!(session.pkg(app).imports.len(), 1);

        let util = session.pkg(app).imports[0];
        assert_eq!(session.pkg(util).path, "demo/util");

        // The named reference resolved across packages.
        let buf_var = session.lookup(app, "buf").unwrap();
        let buf_type = session.lookup(util, "Buf").unwrap();
        assert_eq!(session.obj(buf_var).ty, session.obj(buf_type).ty);
    }

    #[test]
    fn methods_and_fields_get_object_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "demo/util.json", UTIL);

        let loader = ManifestLoader::with_roots(vec![dir.path().to_path_buf()]);
        let loaded = loader
            .load(&["demo/util".to_string()], LoadMode::Syntax)
            .unwrap();
        let session = &loaded.session;
        let util = loaded.initial[0];

        let buf = session.lookup(util, "Buf").unwrap();
        let TypeData::Named { methods, underlying, .. } = session.ty(session.obj(buf).ty) else {
            panic!("Buf should be a named type");
        };
        let len_method = methods[0];
        assert_eq!(
            objectpath::encode(session, len_method).unwrap().as_str(),
            "Buf.Len"
        );

        let TypeData::Struct { fields } = session.ty(*underlying) else {
            panic!("Buf should have a struct underlying");
        };
        assert_eq!(
            objectpath::encode(session, fields[0]).unwrap().as_str(),
            "Buf.!underlying.len"
        );
    }

    #[test]
    fn spans_resolve_against_loaded_sources() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "demo/util.json", UTIL);

        let loader = ManifestLoader::with_roots(vec![dir.path().to_path_buf()]);
        let loaded = loader
            .load(&["demo/util".to_string()], LoadMode::AllSyntax)
            .unwrap();
        let session = &loaded.session;
        let util = loaded.initial[0];
        let grow = session.lookup(util, "Grow").unwrap();
        let span = session.obj(grow).span.unwrap();
        assert_eq!(
            crate::diagnostics::position_string(&loaded.files, span),
            "util.src:2:1"
        );
    }

    #[test]
    fn import_cycles_are_loader_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "a.json",
            r#"{"path": "a", "imports": ["b"]}"#,
        );
        write_manifest(
            dir.path(),
            "b.json",
            r#"{"path": "b", "imports": ["a"]}"#,
        );
        let loader = ManifestLoader::with_roots(vec![dir.path().to_path_buf()]);
        let err = loader
            .load(&["a".to_string()], LoadMode::Syntax)
            .unwrap_err();
        assert!(err.to_string().contains("import cycle"));
    }

    #[test]
    fn unknown_named_references_are_loader_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "p.json",
            r#"{"path": "p", "decls": [
                {"name": "x", "kind": "var", "type": {"named": {"name": "Missing"}}}
            ]}"#,
        );
        let loader = ManifestLoader::with_roots(vec![dir.path().to_path_buf()]);
        let err = loader
            .load(&["p".to_string()], LoadMode::Syntax)
            .unwrap_err();
        assert!(err.to_string().contains("unknown named type"));
    }

    #[test]
    fn unit_loader_resolves_imports_through_the_config_maps() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "util.json", UTIL);
        write_manifest(dir.path(), "app.json", APP);

        let cfg = UnitConfig {
            import_path: "demo/app".into(),
            dir: Some(dir.path().to_path_buf()),
            source_files: vec![PathBuf::from("app.json")],
            import_map: HashMap::new(),
            package_file: HashMap::from([("demo/util".to_string(), PathBuf::from("util.json"))]),
            output: PathBuf::from("unused"),
            ..UnitConfig::default()
        };
        let loader = ManifestLoader::new();
        let unit = loader.load_unit(&cfg).unwrap();
        assert_eq!(unit.session.pkg(unit.pkg).path, "demo/app");
        assert_eq!(unit.session.pkg(unit.pkg).imports.len(), 1);
    }
}
