//! Cross-package fact transport: the export-visibility predicate, the
//! fact-file writer, and the reader that re-binds facts against a
//! consumer's session.

use std::collections::HashMap;
use std::io::Write;

use crate::analysis::FactType;
use crate::error::{Error, Result};
use crate::facts::codec::{self, DecodedFact, FactRecord, FactRegistry};
use crate::facts::FactSnapshot;
use crate::model::{ObjId, ObjectKind, PkgId, Session};

/// Whether `obj` may be visible to a package importing `pkg`.
///
/// This includes not just the exported members of `pkg` but also
/// unexported constants, types, fields, and methods that find their way
/// into the API. It over-approximates the walk of the export type graph:
/// type names and constants always pass, methods and fields pass
/// regardless of export. Objects owned by other packages never pass.
#[must_use]
pub fn exported_from(session: &Session, obj: ObjId, pkg: PkgId) -> bool {
    let data = session.obj(obj);
    match data.kind {
        ObjectKind::Func => {
            (data.exported && data.pkg == Some(pkg)) || session.is_method(obj)
        }
        ObjectKind::Var { is_field } => {
            (data.exported && data.pkg == Some(pkg)) || is_field
        }
        ObjectKind::TypeName | ObjectKind::Const => true,
        ObjectKind::Label | ObjectKind::PkgName => false,
    }
}

/// Serialize the facts of one action to `out`: encode each surviving
/// record (unencodable objects are dropped), sort, and emit.
pub fn write_facts(
    session: &Session,
    snapshot: &FactSnapshot,
    fact_types: &[FactType],
    out: &mut dyn Write,
) -> Result<()> {
    let records = codec::encode_snapshot(session, snapshot, fact_types)?;
    let bytes = codec::to_bytes(&records)?;
    out.write_all(&bytes)?;
    Ok(())
}

/// Decode the fact blobs of every direct import of `pkg`.
///
/// `blobs` maps import path to serialized fact data; imports without an
/// entry contribute nothing. Each record is re-bound against this
/// session's handle for the imported package.
pub fn read_facts(
    session: &Session,
    pkg: PkgId,
    blobs: &HashMap<String, Vec<u8>>,
    registry: &FactRegistry,
) -> Result<Vec<DecodedFact>> {
    let mut decoded = Vec::new();
    for &imp in &session.pkg(pkg).imports {
        let path = &session.pkg(imp).path;
        let Some(blob) = blobs.get(path) else {
            continue;
        };
        let records = codec::from_bytes(blob, path)?;
        decoded.extend(codec::decode_records(session, imp, records, registry)?);
    }
    Ok(decoded)
}

/// Merge inherited records with an action's own encoded facts, own facts
/// clobbering inherited entries with the same key, and serialize the
/// result. This keeps a package's fact file self-contained: facts about
/// transitive dependencies ride along.
pub fn merge_and_encode(
    inherited: Vec<FactRecord>,
    own: Vec<FactRecord>,
) -> Result<Vec<u8>> {
    let mut merged: HashMap<(String, String, String), FactRecord> = HashMap::new();
    for record in inherited.into_iter().chain(own) {
        let key = (
            record.object.clone(),
            record.pkg_path.clone(),
            record.fact.type_name.clone(),
        );
        merged.insert(key, record);
    }
    let mut records: Vec<FactRecord> = merged.into_values().collect();
    codec::sort_records(&mut records);
    codec::to_bytes(&records)
}

/// Round-trip one fact value through the codec, as a sanity check that it
/// survives an address-space crossing. Returns the re-decoded value.
pub fn roundtrip(fact_type: &FactType, value: &crate::facts::FactVal) -> Result<crate::facts::FactVal> {
    let wire = fact_type
        .encode(&**value)
        .map_err(|err| Error::internal(format!(
            "encoding of {} fact failed: {err}",
            fact_type.name()
        )))?;
    fact_type.decode(wire).map_err(|err| {
        Error::internal(format!(
            "re-decoding of {} fact failed: {err}",
            fact_type.name()
        ))
    })
}
