//! # acmorph-templates
//!
//! This is an internal crate used by `acmorph`. It fills raw template histograms from simulated
//! samples, inverts the sample→monomial system into a basis of templates, and evaluates that basis
//! at arbitrary coupling points.
#![warn(clippy::perf, clippy::style)]

/// Template bases and the builder which fills and inverts them.
pub mod basis;
/// A cache of bases keyed by configuration.
pub mod cache;
/// Evaluation of a basis at a coupling point.
pub mod evaluate;
/// Per-event selections applied while filling templates.
pub mod selection;

#[cfg(test)]
pub(crate) mod testing;

pub use basis::{fill_sample, BasisFingerprint, BasisKey, BuildContext, TemplateBasis};
pub use cache::BasisCache;
pub use evaluate::{evaluate, evaluate_unnormalized, MorphedTemplate};
pub use selection::{All, And, CategorySelection, FlavorSelection, MassWindow, Selection};
