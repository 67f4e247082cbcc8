//! Wire format for facts.
//!
//! A fact file is a JSON list of records, each keying a fact value either
//! by the object path of its entity or by a package path (exactly one is
//! set). Values carry their registered fact-type name so the consumer can
//! dispatch decoding without sharing memory layout with the producer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analysis::FactType;
use crate::error::{Error, Result};
use crate::facts::{FactSnapshot, FactVal};
use crate::model::{PkgId, Session};
use crate::objectpath;

/// Per-driver registry of declared fact types, keyed by wire name.
/// Built once during validation; read-only afterwards.
#[derive(Debug, Default)]
pub struct FactRegistry {
    by_name: HashMap<&'static str, FactType>,
}

impl FactRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declared fact type. Re-registering the same (name, type)
    /// pair is idempotent; reusing a name for a different type is a
    /// configuration error.
    pub fn register(&mut self, fact_type: &FactType) -> Result<()> {
        if fact_type.name().is_empty() {
            return Err(Error::config(format!(
                "fact type {} has an empty name",
                fact_type.type_name()
            )));
        }
        match self.by_name.get(fact_type.name()) {
            None => {
                self.by_name.insert(fact_type.name(), fact_type.clone());
                Ok(())
            }
            Some(existing) if existing == fact_type => Ok(()),
            Some(existing) => Err(Error::config(format!(
                "fact type name {:?} registered for both {} and {}",
                fact_type.name(),
                existing.type_name(),
                fact_type.type_name()
            ))),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FactType> {
        self.by_name.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// One serialized fact. Exactly one of `object`/`pkg_path` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FactRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pkg_path: String,
    pub fact: WireFact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireFact {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: serde_json::Value,
}

/// Encode the facts of one completed action for transport.
///
/// Facts on objects without an encodable path are silently discarded;
/// that is the visibility filter: entities unreachable from the package
/// scope cannot matter to an importer. The output is sorted by
/// (object, package path, fact-type name) so byte output is deterministic
/// for a given store.
pub fn encode_snapshot(
    session: &Session,
    snapshot: &FactSnapshot,
    fact_types: &[FactType],
) -> Result<Vec<FactRecord>> {
    let mut records = Vec::new();
    for (slot, fact_type) in fact_types.iter().enumerate() {
        for (&obj, value) in &snapshot.objects[slot] {
            let Ok(path) = objectpath::encode(session, obj) else {
                continue;
            };
            records.push(FactRecord {
                object: path.as_str().to_string(),
                pkg_path: String::new(),
                fact: encode_value(fact_type, value)?,
            });
        }
        for (&pkg, value) in &snapshot.packages[slot] {
            records.push(FactRecord {
                object: String::new(),
                pkg_path: session.pkg(pkg).path.clone(),
                fact: encode_value(fact_type, value)?,
            });
        }
    }
    sort_records(&mut records);
    Ok(records)
}

fn encode_value(fact_type: &FactType, value: &FactVal) -> Result<WireFact> {
    let encoded = fact_type.encode(&**value).map_err(|err| {
        Error::internal(format!(
            "encoding of {} fact failed: {err}",
            fact_type.name()
        ))
    })?;
    Ok(WireFact {
        type_name: fact_type.name().to_string(),
        value: encoded,
    })
}

pub fn sort_records(records: &mut [FactRecord]) {
    records.sort_by(|a, b| {
        (&a.object, &a.pkg_path, &a.fact.type_name)
            .cmp(&(&b.object, &b.pkg_path, &b.fact.type_name))
    });
}

/// Serialize sorted records to bytes.
pub fn to_bytes(records: &[FactRecord]) -> Result<Vec<u8>> {
    serde_json::to_vec(records)
        .map_err(|err| Error::internal(format!("fact serialization failed: {err}")))
}

/// Parse a fact blob. Structural problems are transport errors; type-level
/// resolution happens in [`decode_records`].
pub fn from_bytes(data: &[u8], origin: &str) -> Result<Vec<FactRecord>> {
    serde_json::from_slice(data)
        .map_err(|err| Error::transport(format!("malformed fact file for {origin}: {err}")))
}

/// A decoded fact, re-bound to in-session identities.
#[derive(Debug)]
pub struct DecodedFact {
    pub obj: Option<crate::model::ObjId>,
    pub pkg: Option<PkgId>,
    pub type_name: String,
    pub value: FactVal,
}

/// Re-bind records read from `origin`'s fact file against this session.
///
/// Records whose object path no longer resolves are dropped, expected
/// when visibility narrows or an entity is renamed. Records naming a fact
/// type that is not registered here are fatal: producer and consumer
/// disagree about the analysis set.
pub fn decode_records(
    session: &Session,
    origin: PkgId,
    records: Vec<FactRecord>,
    registry: &FactRegistry,
) -> Result<Vec<DecodedFact>> {
    let mut decoded = Vec::new();
    for record in records {
        let Some(fact_type) = registry.get(&record.fact.type_name) else {
            return Err(Error::transport(format!(
                "fact file for {} names unregistered fact type {:?}",
                session.pkg(origin).path,
                record.fact.type_name
            )));
        };
        let value = fact_type.decode(record.fact.value).map_err(|err| {
            Error::transport(format!(
                "fact file for {}: decoding {} fact failed: {err}",
                session.pkg(origin).path,
                fact_type.name()
            ))
        })?;
        if record.pkg_path.is_empty() {
            let path = objectpath::Path::from(record.object.as_str());
            let Ok(obj) = objectpath::decode(session, origin, &path) else {
                continue;
            };
            decoded.push(DecodedFact {
                obj: Some(obj),
                pkg: None,
                type_name: record.fact.type_name,
                value,
            });
        } else {
            let Some(pkg) = session.package_by_path(&record.pkg_path) else {
                continue;
            };
            decoded.push(DecodedFact {
                obj: None,
                pkg: Some(pkg),
                type_name: record.fact.type_name,
                value,
            });
        }
    }
    Ok(decoded)
}
