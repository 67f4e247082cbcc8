//! Stable, deterministic naming for objects within their package.
//!
//! Object ids are canonical within one session, but an id has meaning only
//! inside that session. A path instead names the object by a sequence of
//! destructuring operations applied to the package scope, so the identity
//! of a logical object can be sent between processes and re-bound against
//! a reloaded package.
//!
//! Given `type Foo interface { Method() (string, func(int) struct{ X int }) }`,
//! the field `X` encodes as `Foo.Method.!results.1.!results.0.X`.

use std::fmt;

use crate::model::{ObjId, ObjectKind, PkgId, Session, TypeData, TypeId};

/// An opaque object name: identifiers, decimal tuple indexes, and the five
/// reserved destructuring tokens, joined by `.`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(String);

impl Path {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Path(raw.to_string())
    }
}

const OP_KEY: &str = "!key";
const OP_VALUE: &str = "!value";
const OP_PARAMS: &str = "!params";
const OP_RESULTS: &str = "!results";
const OP_UNDERLYING: &str = "!underlying";

/// Why an object has no path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// Universe entities (no owning package) have no path.
    Universal { name: String },
    /// A variable that is not a struct field.
    VarNotField { name: String },
    /// A function that is not a method.
    FuncNotMethod { name: String },
    /// Package names, labels, and block-scoped constants and types.
    NotPackageLevel { name: String },
    /// Not reachable by any destructuring walk from the package scope.
    NotFound { name: String },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Universal { name } => {
                write!(f, "universal objects have no path: {name}")
            }
            EncodeError::VarNotField { name } => write!(f, "var is not a field: {name}"),
            EncodeError::FuncNotMethod { name } => write!(f, "func is not a method: {name}"),
            EncodeError::NotPackageLevel { name } => {
                write!(f, "not a package-level object, nor a field or method: {name}")
            }
            EncodeError::NotFound { name } => write!(f, "can't find path for {name}"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Where and why replaying a path failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    EmptyPath,
    /// A token that is not an identifier, index, or reserved word.
    InvalidElement { element: String },
    /// The leading identifier is not in the package scope.
    MissingScopeEntry { pkg: String, name: String },
    /// The walk ended mid-type with path elements left over, or ran out of
    /// elements where the type required one.
    Truncated { context: &'static str },
    /// The element cannot apply to the type at this point of the walk.
    UnexpectedElement {
        context: &'static str,
        element: String,
    },
    NoSuchField { name: String },
    NoSuchMethod { name: String },
    IndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EmptyPath => write!(f, "empty path"),
            DecodeError::InvalidElement { element } => {
                write!(f, "invalid path: {element:?} is not an identifier")
            }
            DecodeError::MissingScopeEntry { pkg, name } => {
                write!(f, "{pkg}.{name} not defined")
            }
            DecodeError::Truncated { context } => write!(f, "in {context}: bad path"),
            DecodeError::UnexpectedElement { context, element } => {
                write!(f, "in {context}: unexpected path element {element:?}")
            }
            DecodeError::NoSuchField { name } => write!(f, "no field {name:?}"),
            DecodeError::NoSuchMethod { name } => write!(f, "no method {name:?}"),
            DecodeError::IndexOutOfRange { index, len } => {
                write!(f, "in tuple: index {index} out of range [0, {len})")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Elem {
    Name(String),
    Index(usize),
    Key,
    Value,
    Params,
    Results,
    Underlying,
}

impl fmt::Display for Elem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Elem::Name(name) => f.write_str(name),
            Elem::Index(index) => write!(f, "{index}"),
            Elem::Key => f.write_str(OP_KEY),
            Elem::Value => f.write_str(OP_VALUE),
            Elem::Params => f.write_str(OP_PARAMS),
            Elem::Results => f.write_str(OP_RESULTS),
            Elem::Underlying => f.write_str(OP_UNDERLYING),
        }
    }
}

/// Encode the path identifying `obj` within its package.
///
/// Fails for entities that are not reachable by destructuring the package
/// scope: universe entities, package names, locals, labels, non-field
/// variables and non-method functions below package scope.
pub fn encode(session: &Session, obj: ObjId) -> Result<Path, EncodeError> {
    let elems = path_of(session, obj)?;
    let mut out = String::new();
    for (i, elem) in elems.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&elem.to_string());
    }
    Ok(Path(out))
}

fn path_of(session: &Session, obj: ObjId) -> Result<Vec<Elem>, EncodeError> {
    let data = session.obj(obj);
    let Some(pkg) = data.pkg else {
        return Err(EncodeError::Universal {
            name: data.name.clone(),
        });
    };

    if session.lookup(pkg, &data.name) == Some(obj) {
        return Ok(vec![Elem::Name(data.name.clone())]);
    }

    // Not a package-level object, so it must be a struct field, a concrete
    // method, or an interface method. Quickly reject everything else.
    match data.kind {
        ObjectKind::Var { is_field } => {
            if !is_field {
                return Err(EncodeError::VarNotField {
                    name: session.describe_object(obj),
                });
            }
        }
        ObjectKind::Func => {
            if session.recv_of(obj).is_none() {
                return Err(EncodeError::FuncNotMethod {
                    name: session.describe_object(obj),
                });
            }
        }
        _ => {
            return Err(EncodeError::NotPackageLevel {
                name: session.describe_object(obj),
            });
        }
    }

    // First inspect package-scope named types and their declared methods,
    // in scope order; then everything else.
    let scope = &session.pkg(pkg).scope;
    let mut nontypes = Vec::new();
    for &scope_obj in scope {
        let scope_data = session.obj(scope_obj);
        let TypeData::Named {
            methods,
            underlying,
            ..
        } = session.ty(scope_data.ty)
        else {
            nontypes.push(scope_obj);
            continue;
        };

        let path = vec![Elem::Name(scope_data.name.clone())];

        for &m in methods {
            let mut path2 = path.clone();
            path2.push(Elem::Name(session.obj(m).name.clone()));
            if m == obj {
                return Ok(path2);
            }
            if let Some(found) = find(session, obj, path2, session.obj(m).ty) {
                return Ok(found);
            }
        }

        let mut under_path = path;
        under_path.push(Elem::Underlying);
        if let Some(found) = find(session, obj, under_path, *underlying) {
            return Ok(found);
        }
    }

    for scope_obj in nontypes {
        let scope_data = session.obj(scope_obj);
        let path = vec![Elem::Name(scope_data.name.clone())];
        if let Some(found) = find(session, obj, path, scope_data.ty) {
            return Ok(found);
        }
    }

    Err(EncodeError::NotFound {
        name: session.describe_object(obj),
    })
}

/// Search for `obj` within type `ty`, returning the extended path on a hit.
/// Named types are opaque here; their members are only reachable through
/// the scope walk above.
fn find(session: &Session, obj: ObjId, path: Vec<Elem>, ty: TypeId) -> Option<Vec<Elem>> {
    match session.ty(ty) {
        TypeData::Basic { .. } | TypeData::Named { .. } => None,
        TypeData::Pointer { elem }
        | TypeData::Slice { elem }
        | TypeData::Array { elem, .. }
        | TypeData::Chan { elem } => find(session, obj, path, *elem),
        TypeData::Map { key, value } => {
            let mut key_path = path.clone();
            key_path.push(Elem::Key);
            if let Some(found) = find(session, obj, key_path, *key) {
                return Some(found);
            }
            let mut value_path = path;
            value_path.push(Elem::Value);
            find(session, obj, value_path, *value)
        }
        TypeData::Signature {
            params, results, ..
        } => {
            let mut params_path = path.clone();
            params_path.push(Elem::Params);
            if let Some(found) = find(session, obj, params_path, *params) {
                return Some(found);
            }
            let mut results_path = path;
            results_path.push(Elem::Results);
            find(session, obj, results_path, *results)
        }
        TypeData::Struct { fields } => {
            for &field in fields {
                let mut field_path = path.clone();
                field_path.push(Elem::Name(session.obj(field).name.clone()));
                if field == obj {
                    return Some(field_path);
                }
                if let Some(found) = find(session, obj, field_path, session.obj(field).ty) {
                    return Some(found);
                }
            }
            None
        }
        TypeData::Tuple { vars } => {
            for (index, &var) in vars.iter().enumerate() {
                let mut elem_path = path.clone();
                elem_path.push(Elem::Index(index));
                if let Some(found) = find(session, obj, elem_path, session.obj(var).ty) {
                    return Some(found);
                }
            }
            None
        }
        TypeData::Interface { methods } => {
            for &m in methods {
                let mut method_path = path.clone();
                method_path.push(Elem::Name(session.obj(m).name.clone()));
                if m == obj {
                    return Some(method_path);
                }
                if let Some(found) = find(session, obj, method_path, session.obj(m).ty) {
                    return Some(found);
                }
            }
            None
        }
    }
}

/// Resolve the object denoted by `path` within `pkg`.
pub fn decode(session: &Session, pkg: PkgId, path: &Path) -> Result<ObjId, DecodeError> {
    let elems = parse(path)?;
    let Some((first, rest)) = elems.split_first() else {
        return Err(DecodeError::EmptyPath);
    };
    let Elem::Name(name) = first else {
        return Err(DecodeError::UnexpectedElement {
            context: "scope",
            element: first.to_string(),
        });
    };
    let Some(obj) = session.lookup(pkg, name) else {
        return Err(DecodeError::MissingScopeEntry {
            pkg: session.pkg(pkg).path.clone(),
            name: name.clone(),
        });
    };
    if rest.is_empty() {
        return Ok(obj);
    }
    walk(session, rest, session.obj(obj).ty)
}

fn walk(session: &Session, elems: &[Elem], ty: TypeId) -> Result<ObjId, DecodeError> {
    match session.ty(ty) {
        TypeData::Pointer { elem }
        | TypeData::Slice { elem }
        | TypeData::Array { elem, .. }
        | TypeData::Chan { elem } => walk(session, elems, *elem),
        TypeData::Basic { .. } => Err(DecodeError::Truncated { context: "basic" }),
        TypeData::Map { key, value } => {
            let (head, rest) = split(elems, "map")?;
            match head {
                Elem::Key => walk(session, rest, *key),
                Elem::Value => walk(session, rest, *value),
                other => Err(DecodeError::UnexpectedElement {
                    context: "map",
                    element: other.to_string(),
                }),
            }
        }
        TypeData::Named {
            underlying,
            methods,
            ..
        } => {
            let (head, rest) = split(elems, "named")?;
            match head {
                Elem::Underlying => walk(session, rest, *underlying),
                Elem::Name(name) => {
                    for &m in methods {
                        if session.obj(m).name == *name {
                            if rest.is_empty() {
                                return Ok(m);
                            }
                            return walk(session, rest, session.obj(m).ty);
                        }
                    }
                    Err(DecodeError::NoSuchMethod { name: name.clone() })
                }
                other => Err(DecodeError::UnexpectedElement {
                    context: "named",
                    element: other.to_string(),
                }),
            }
        }
        TypeData::Struct { fields } => {
            let (head, rest) = split(elems, "struct")?;
            let Elem::Name(name) = head else {
                return Err(DecodeError::UnexpectedElement {
                    context: "struct",
                    element: head.to_string(),
                });
            };
            for &field in fields {
                if session.obj(field).name == *name {
                    if rest.is_empty() {
                        return Ok(field);
                    }
                    return walk(session, rest, session.obj(field).ty);
                }
            }
            Err(DecodeError::NoSuchField { name: name.clone() })
        }
        TypeData::Tuple { vars } => {
            let (head, rest) = split(elems, "tuple")?;
            let Elem::Index(index) = head else {
                return Err(DecodeError::UnexpectedElement {
                    context: "tuple",
                    element: head.to_string(),
                });
            };
            if *index >= vars.len() {
                return Err(DecodeError::IndexOutOfRange {
                    index: *index,
                    len: vars.len(),
                });
            }
            walk(session, rest, session.obj(vars[*index]).ty)
        }
        TypeData::Interface { methods } => {
            let (head, rest) = split(elems, "interface")?;
            let Elem::Name(name) = head else {
                return Err(DecodeError::UnexpectedElement {
                    context: "interface",
                    element: head.to_string(),
                });
            };
            for &m in methods {
                if session.obj(m).name == *name {
                    if rest.is_empty() {
                        return Ok(m);
                    }
                    return walk(session, rest, session.obj(m).ty);
                }
            }
            Err(DecodeError::NoSuchMethod { name: name.clone() })
        }
        TypeData::Signature {
            params, results, ..
        } => {
            let (head, rest) = split(elems, "signature")?;
            match head {
                Elem::Params => walk(session, rest, *params),
                Elem::Results => walk(session, rest, *results),
                other => Err(DecodeError::UnexpectedElement {
                    context: "signature",
                    element: other.to_string(),
                }),
            }
        }
    }
}

fn split<'a>(
    elems: &'a [Elem],
    context: &'static str,
) -> Result<(&'a Elem, &'a [Elem]), DecodeError> {
    elems
        .split_first()
        .ok_or(DecodeError::Truncated { context })
}

/// Break a dotted path into elements: reserved word, decimal integer, or
/// identifier.
fn parse(path: &Path) -> Result<Vec<Elem>, DecodeError> {
    let mut elems = Vec::new();
    for word in path.0.split('.') {
        if let Ok(index) = word.parse::<usize>() {
            elems.push(Elem::Index(index));
            continue;
        }
        match word {
            OP_KEY => elems.push(Elem::Key),
            OP_VALUE => elems.push(Elem::Value),
            OP_PARAMS => elems.push(Elem::Params),
            OP_RESULTS => elems.push(Elem::Results),
            OP_UNDERLYING => elems.push(Elem::Underlying),
            _ => {
                if !valid_ident(word) {
                    return Err(DecodeError::InvalidElement {
                        element: word.to_string(),
                    });
                }
                elems.push(Elem::Name(word.to_string()));
            }
        }
    }
    Ok(elems)
}

fn valid_ident(name: &str) -> bool {
    !name.is_empty()
        && name.chars().enumerate().all(|(i, c)| {
            c == '_' || c.is_alphabetic() || (i > 0 && c.is_numeric())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectData;

    fn var(session: &mut Session, pkg: PkgId, name: &str, ty: TypeId, is_field: bool) -> ObjId {
        session.add_object(ObjectData {
            name: name.into(),
            pkg: Some(pkg),
            ty,
            kind: ObjectKind::Var { is_field },
            exported: name.chars().next().is_some_and(char::is_uppercase),
            span: None,
        })
    }

    /// One package:
    ///
    /// type Foo interface { Method() (string, func(int) struct{ X int }) }
    fn interface_fixture() -> (Session, PkgId, ObjId, ObjId) {
        let mut session = Session::new();
        let pkg = session.add_package("p", "p", "p", false);
        let int = session.intern_basic("int");
        let string = session.intern_basic("string");

        let x = var(&mut session, pkg, "X", int, true);
        let inner_struct = session.add_type(TypeData::Struct { fields: vec![x] });

        let fn_param = var(&mut session, pkg, "", int, false);
        let fn_params = session.add_type(TypeData::Tuple {
            vars: vec![fn_param],
        });
        let fn_result = var(&mut session, pkg, "", inner_struct, false);
        let fn_results = session.add_type(TypeData::Tuple {
            vars: vec![fn_result],
        });
        let fn_ty = session.add_type(TypeData::Signature {
            recv: None,
            params: fn_params,
            results: fn_results,
        });

        let res0 = var(&mut session, pkg, "", string, false);
        let res1 = var(&mut session, pkg, "", fn_ty, false);
        let empty = session.add_type(TypeData::Tuple { vars: vec![] });
        let results = session.add_type(TypeData::Tuple {
            vars: vec![res0, res1],
        });

        let foo_name = session.add_object(ObjectData {
            name: "Foo".into(),
            pkg: Some(pkg),
            ty: TypeId::UNRESOLVED,
            kind: ObjectKind::TypeName,
            exported: true,
            span: None,
        });
        let foo = session.add_type(TypeData::Named {
            obj: foo_name,
            underlying: TypeId::UNRESOLVED,
            methods: vec![],
        });
        session.set_object_type(foo_name, foo);

        let recv = var(&mut session, pkg, "", foo, false);
        let method_sig = session.add_type(TypeData::Signature {
            recv: Some(recv),
            params: empty,
            results,
        });
        let method = session.add_object(ObjectData {
            name: "Method".into(),
            pkg: Some(pkg),
            ty: method_sig,
            kind: ObjectKind::Func,
            exported: true,
            span: None,
        });
        let iface = session.add_type(TypeData::Interface {
            methods: vec![method],
        });
        session.set_underlying(foo, iface);
        session.bind(pkg, foo_name);

        (session, pkg, x, method)
    }

    #[test]
    fn encodes_nested_struct_field_through_interface() {
        let (session, _, x, _) = interface_fixture();
        let path = encode(&session, x).unwrap();
        assert_eq!(
            path.as_str(),
            "Foo.!underlying.Method.!results.1.!results.0.X"
        );
    }

    #[test]
    fn encodes_interface_method() {
        let (session, _, _, method) = interface_fixture();
        let path = encode(&session, method).unwrap();
        assert_eq!(path.as_str(), "Foo.!underlying.Method");
    }

    #[test]
    fn decode_inverts_encode() {
        let (session, pkg, x, method) = interface_fixture();
        for obj in [x, method] {
            let path = encode(&session, obj).unwrap();
            assert_eq!(decode(&session, pkg, &path), Ok(obj), "path {path}");
        }
    }

    #[test]
    fn package_scope_objects_use_their_name() {
        let (session, pkg, _, _) = interface_fixture();
        let foo = session.lookup(pkg, "Foo").unwrap();
        let path = encode(&session, foo).unwrap();
        assert_eq!(path.as_str(), "Foo");
        assert_eq!(decode(&session, pkg, &path), Ok(foo));
    }

    #[test]
    fn locals_and_universals_are_rejected() {
        let mut session = Session::new();
        let pkg = session.add_package("p", "p", "p", false);
        let int = session.intern_basic("int");

        let local = var(&mut session, pkg, "local", int, false);
        assert_eq!(
            encode(&session, local),
            Err(EncodeError::VarNotField {
                name: "p.local".into()
            })
        );

        let universal = session.add_object(ObjectData {
            name: "len".into(),
            pkg: None,
            ty: int,
            kind: ObjectKind::Func,
            exported: false,
            span: None,
        });
        assert_eq!(
            encode(&session, universal),
            Err(EncodeError::Universal { name: "len".into() })
        );
    }

    #[test]
    fn decode_reports_structured_failures() {
        let (session, pkg, _, _) = interface_fixture();
        assert_eq!(
            decode(&session, pkg, &Path::from("Bar")),
            Err(DecodeError::MissingScopeEntry {
                pkg: "p".into(),
                name: "Bar".into()
            })
        );
        assert_eq!(
            decode(&session, pkg, &Path::from("Foo.!underlying.Nope")),
            Err(DecodeError::NoSuchMethod {
                name: "Nope".into()
            })
        );
        assert_eq!(
            decode(
                &session,
                pkg,
                &Path::from("Foo.!underlying.Method.!results.7")
            ),
            Err(DecodeError::IndexOutOfRange { index: 7, len: 2 })
        );
        assert!(matches!(
            decode(&session, pkg, &Path::from("Foo.!underlying.Method.!key")),
            Err(DecodeError::UnexpectedElement {
                context: "signature",
                ..
            })
        ));
    }

    #[test]
    fn parse_rejects_bad_identifiers() {
        let (session, pkg, _, _) = interface_fixture();
        assert_eq!(
            decode(&session, pkg, &Path::from("Foo..X")),
            Err(DecodeError::InvalidElement { element: "".into() })
        );
        assert_eq!(
            decode(&session, pkg, &Path::from("Foo.!bogus")),
            Err(DecodeError::InvalidElement {
                element: "!bogus".into()
            })
        );
    }

    #[test]
    fn map_keys_come_before_values() {
        let mut session = Session::new();
        let pkg = session.add_package("p", "p", "p", false);
        let int_ty = session.intern_basic("int");
        let k = var(&mut session, pkg, "K", int_ty, true);
        let key_struct = session.add_type(TypeData::Struct { fields: vec![k] });
        let int_ty = session.intern_basic("int");
        let v = var(&mut session, pkg, "K", int_ty, true);
        let value_struct = session.add_type(TypeData::Struct { fields: vec![v] });
        let map = session.add_type(TypeData::Map {
            key: key_struct,
            value: value_struct,
        });
        let m = var(&mut session, pkg, "M", map, false);
        session.bind(pkg, m);

        assert_eq!(encode(&session, k).unwrap().as_str(), "M.!key.K");
        assert_eq!(encode(&session, v).unwrap().as_str(), "M.!value.K");
        assert_eq!(decode(&session, pkg, &Path::from("M.!key.K")), Ok(k));
        assert_eq!(decode(&session, pkg, &Path::from("M.!value.K")), Ok(v));
    }
}
