use criterion::{criterion_group, criterion_main, Criterion};

use loupe::model::{ObjId, ObjectData, ObjectKind, Session, TypeData};
use loupe::objectpath;

/// A package with `n` named struct types, each carrying a handful of
/// fields, with the interesting object buried in the last one.
fn build_session(n: usize) -> (Session, ObjId) {
    let mut session = Session::new();
    let pkg = session.add_package("bench", "bench", "bench", false);
    let int = session.intern_basic("int");
    let mut last_field = None;
    for i in 0..n {
        let mut fields = Vec::new();
        for j in 0..8 {
            let field = session.add_object(ObjectData {
                name: format!("f{j}"),
                pkg: Some(pkg),
                ty: int,
                kind: ObjectKind::Var { is_field: true },
                exported: false,
                span: None,
            });
            fields.push(field);
        }
        last_field = fields.last().copied();
        let strukt = session.add_type(TypeData::Struct { fields });
        let obj = session.add_object(ObjectData {
            name: format!("T{i}"),
            pkg: Some(pkg),
            ty: loupe::model::TypeId::UNRESOLVED,
            kind: ObjectKind::TypeName,
            exported: true,
            span: None,
        });
        let named = session.add_type(TypeData::Named {
            obj,
            underlying: loupe::model::TypeId::UNRESOLVED,
            methods: Vec::new(),
        });
        session.set_object_type(obj, named);
        session.set_underlying(named, strukt);
        session.bind(pkg, obj);
    }
    (session, last_field.expect("at least one type"))
}

fn bench_encode(c: &mut Criterion) {
    let (session, target) = build_session(64);
    c.bench_function("encode_deep_field", |b| {
        b.iter(|| objectpath::encode(&session, std::hint::black_box(target)).unwrap());
    });

    let path = objectpath::encode(&session, target).unwrap();
    let pkg = session.package_by_path("bench").unwrap();
    c.bench_function("decode_deep_field", |b| {
        b.iter(|| objectpath::decode(&session, pkg, std::hint::black_box(&path)).unwrap());
    });
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
