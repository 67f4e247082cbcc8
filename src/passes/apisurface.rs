//! An analysis that measures a package's exported surface, records it as
//! a package fact for importers, and reports packages that export less
//! than a configurable minimum.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::analysis::{no_output, Analysis, FactType, FlagSet};
use crate::diagnostics::{FileId, Span};
use crate::passes::inventory::{self, Inventory};

/// How many declarations a package exports. Attached to each analyzed
/// package and visible to its importers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSurface {
    pub exported: usize,
}

static ANALYSIS: Lazy<Arc<Analysis>> = Lazy::new(|| {
    Analysis::builder(
        "apisurface",
        "record each package's exported declaration count",
    )
    .requires(&[inventory::analysis()])
    .fact_types(vec![FactType::of::<ApiSurface>("apisurface.ApiSurface")])
    .flags(FlagSet::new().define(
        "min",
        "1",
        "report packages exporting fewer than this many declarations",
    ))
    .run(|unit| {
        let session = unit.session();
        let pkg = unit.pkg();
        let inventory = unit
            .input::<Inventory>(&inventory::analysis())
            .ok_or_else(|| "inventory input missing".to_string())?;

        let exported = session
            .pkg(pkg)
            .scope
            .iter()
            .filter(|&&obj| session.obj(obj).exported)
            .count();
        unit.set_package_fact(ApiSurface { exported });

        for &imp in &session.pkg(pkg).imports {
            if let Some(surface) = unit.package_fact::<ApiSurface>(imp) {
                tracing::debug!(
                    target: "loupe::passes",
                    "{} imports {} ({} exported declarations)",
                    session.pkg(pkg).path,
                    session.pkg(imp).path,
                    surface.exported
                );
            }
        }

        let min: usize = unit
            .analysis()
            .flags()
            .get("min")
            .map(|flag| flag.value())
            .unwrap_or_default()
            .parse()
            .map_err(|_| "invalid -min value".to_string())?;
        if exported < min && !inventory.is_empty() {
            let span = first_span(session, pkg);
            unit.report(
                span,
                format!(
                    "package {} exports {exported} of {} declarations (want at least {min})",
                    session.pkg(pkg).path,
                    inventory.len()
                ),
            );
        }
        Ok(no_output())
    })
});

fn first_span(session: &crate::model::Session, pkg: crate::model::PkgId) -> Span {
    session
        .pkg(pkg)
        .scope
        .first()
        .and_then(|&obj| session.obj(obj).span)
        .unwrap_or_else(|| {
            let file = session
                .pkg(pkg)
                .files
                .first()
                .copied()
                .unwrap_or(FileId::UNKNOWN);
            Span::empty(file, 0)
        })
}

#[must_use]
pub fn analysis() -> Arc<Analysis> {
    Arc::clone(&ANALYSIS)
}
