//! # acmorph-categorization
//!
//! This is an internal crate used by `acmorph`. It turns matrix-element probabilities into
//! coupling-weighted probabilities per production sub-process and feeds them, with the event
//! kinematics, to a category decision.
#![warn(clippy::perf, clippy::style)]

/// Categorization specs, the per-event context and the factory which builds them.
pub mod categorization;
/// Coupling-weighted probabilities of each production sub-process.
pub mod probabilities;
/// The matrix-element probability contract.
pub mod provider;

pub use categorization::{
    combine_labels, nicename, CategorizationContext, CategorizationFactory, CategorizationSpec,
    CategoryInputs, CategoryPredicate, InputVariables, MultiCategorization, SingleCategorization,
    NO_JET_SENTINEL,
};
pub use probabilities::{EffectiveProbability, ProbabilityAggregator, ProbabilityTerm, SubProcess};
pub use provider::{MatrixElementProvider, StoredProbabilities};
