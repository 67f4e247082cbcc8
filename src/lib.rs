#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Pluggable static-analysis driver.
//!
//! Analyses declare what they require, what in-memory artifact they
//! produce, and what serializable facts they attach to program entities;
//! the engine turns those declarations into an (analysis × package) DAG,
//! executes it in parallel with at-most-once memoization, plumbs
//! artifacts between analyses of the same package, and carries facts
//! across package boundaries by serializing them against a stable
//! object-path naming scheme.

pub mod analysis;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod exec;
pub mod facts;
pub mod graph;
pub mod loader;
pub mod logging;
pub mod model;
pub mod objectpath;
pub mod passes;

pub use analysis::{Analysis, FactType, FlagSet, OutputSpec, Unit};
pub use error::{Error, Result};
