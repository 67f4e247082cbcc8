//! Built-in demonstration passes wired into the shipped driver binaries.
//! They double as end-to-end fixtures for the driver machinery: one
//! artifact-producing building block and one fact-producing pass on top.

pub mod apisurface;
pub mod inventory;

use std::sync::Arc;

use crate::analysis::Analysis;

/// The passes registered in the `loupe` multichecker binary.
#[must_use]
pub fn all() -> Vec<Arc<Analysis>> {
    vec![inventory::analysis(), apisurface::analysis()]
}
