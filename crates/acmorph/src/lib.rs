//! `acmorph` builds the signal model of an anomalous-coupling measurement in the
//! $`H\to ZZ\to 4\ell`$ channel. It turns simulated samples, each generated at one point in the
//! space of Higgs boson couplings, into templates which can be evaluated at *any* point in that
//! space, and it assigns every event to one of the mutually exclusive categories of the analysis.
//!
//! # Table of Contents
//! - [Key Features](#key-features)
//! - [Template Morphing](#template-morphing)
//! - [Categorization](#categorization)
//! - [Fit Inputs](#fit-inputs)
//! - [Logging](#logging)
//!
//! # Key Features
//! * A small coupling algebra: [`monomials`](crate::couplings::monomials) with a documented
//!   order, coupling points and the sample→monomial linear system.
//! * A [`TemplateBasis`] per (production, category, analysis, systematic), built once, validated
//!   against its own samples, cached in memory by a [`BasisCache`] and on disk as a `bincode`
//!   artifact.
//! * Evaluation of a basis at an arbitrary [`CouplingPoint`] in $`O(\text{monomials})`$.
//! * Per-event categorization at any [`Hypothesis`] and [`SystematicVariant`], with combined
//!   decisions across hypotheses.
//! * Errors which carry the configuration tuple that produced them.
//!
//! # Template Morphing
//! Distributions of a production mode are a polynomial in the couplings: each vertex contributes
//! an amplitude linear in the couplings, so a decay-only mode is quadratic and a mode with the
//! couplings in production and decay is quartic. With one sample per monomial, the matrix of
//! monomials evaluated at each sample point can be inverted to give one template per monomial.
//! A template at any point is then the sum of the basis templates weighted by the monomials at
//! that point.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use acmorph::prelude::*;
//!
//! fn load(sample: &Sample) -> AcmorphResult<Arc<dyn EventSource>> {
//!     // read the events of the sample from wherever they are stored
//!     # unimplemented!()
//! }
//!
//! fn main() -> AcmorphResult<()> {
//!     let config = AnalysisConfig::from_json_file("~/analysis/fa3.json")?;
//!     let registry = SampleRegistry::preloaded();
//!     for sample in required_samples(ProductionMode::GGH, Analysis::Fa3, &Provenance::default())? {
//!         registry.register(&sample, load(&sample)?)?;
//!     }
//!     let context = BuildContext::new(&registry, &config)
//!         .with_selection(Box::new(FlavorSelection::new(Channel::TwoETwoMu)));
//!     let cache = BasisCache::new();
//!     let basis = cache.get_or_build(
//!         BasisKey::new(
//!             ProductionMode::GGH,
//!             Category::Untagged,
//!             Analysis::Fa3,
//!             SystematicVariant::Nominal,
//!         ),
//!         &context,
//!     )?;
//!     let target: Hypothesis = "fa3dec0.5".parse()?;
//!     let morphed = evaluate(&basis, &target.coupling_point(ProductionMode::GGH)?, 10.0)?;
//!     println!("{}", morphed.integral());
//!     Ok(())
//! }
//! ```
//!
//! # Categorization
//! Categories are decided by an external predicate from the event kinematics and from
//! matrix-element probabilities of each production sub-process. Those probabilities depend on the
//! hypothesis: they are sums of matrix-element terms weighted by monomials of the hypothesis'
//! couplings, normalized by cross-section ratios so that the predicate sees them on the scale it
//! was tuned on. A [`CategorizationFactory`] builds one [`CategorizationSpec`] per hypothesis and
//! systematic variant, and combines several of them into one decision with a fixed precedence.
//! [`with_category_field`] attaches the labels of a spec to a source so that templates can be
//! filled per category.
//!
//! # Fit Inputs
//! The [`YieldAssembler`] morphs a basis to a target point, rescales it to the expected yield,
//! floors negative bins and writes one artifact per (process, category, channel, analysis,
//! systematic). Backgrounds are scaled to fixed per-channel rates.
//!
//! # Logging
//! Everything is logged through [`tracing`](https://docs.rs/tracing). No subscriber is installed;
//! install one in the binary to see basis builds, artifact writes and negative-yield warnings.
#![warn(clippy::perf, clippy::style, missing_docs)]

/// Fit inputs assembled from morphed templates and background shapes.
pub mod datacard;
/// Categorization labels attached to event sources.
pub mod labels;

/// Monomials, coupling points and the sample→monomial linear system.
pub mod couplings {
    pub use acmorph_core::couplings::*;
}
/// Event records, sources and samples.
pub mod data {
    pub use acmorph_core::data::*;
    pub use acmorph_core::samples::*;
}
/// Template bases, their evaluation and the selections used to fill them.
pub mod templates {
    pub use acmorph_templates::*;
}
/// Probability aggregation and categorization.
pub mod categorization {
    pub use acmorph_categorization::*;
}
/// Utility functions, enums, and traits
pub mod utils {
    pub use acmorph_core::utils::*;
}

/// The commonly used types, traits and functions.
pub mod prelude {
    pub use crate::datacard::{DatacardEntry, DatacardKey, Process, YieldAssembler};
    pub use crate::labels::with_category_field;
    pub use acmorph_categorization::{
        CategorizationContext, CategorizationFactory, CategorizationSpec, CategoryInputs,
        CategoryPredicate, MatrixElementProvider, StoredProbabilities, SubProcess,
    };
    pub use acmorph_core::{
        monomials, required_samples, AcmorphError, AcmorphResult, Analysis, AnalysisConfig,
        Category, Channel, ConfigTuple, Coupling, CouplingPoint, CrossSectionTable, Dataset,
        Event, EventData, EventSchema, EventSource, Histogram3D, Hypothesis, Monomial,
        ProductionMode, Provenance, Sample, SampleRegistry, SystematicVariant, TemplateBinning,
    };
    pub use acmorph_templates::{
        evaluate, evaluate_unnormalized, BasisCache, BasisFingerprint, BasisKey, BuildContext,
        CategorySelection, FlavorSelection, MassWindow, MorphedTemplate, Selection, TemplateBasis,
    };
}

pub use acmorph_categorization::{
    CategorizationContext, CategorizationFactory, CategorizationSpec, CategoryInputs,
    CategoryPredicate, MatrixElementProvider, StoredProbabilities,
};
pub use acmorph_core::{
    AcmorphError, AcmorphResult, Analysis, AnalysisConfig, Category, Channel, ConfigTuple,
    Coupling, CouplingPoint, CrossSectionTable, Dataset, EventSource, Histogram3D, Hypothesis,
    ProductionMode, SampleRegistry, SystematicVariant,
};
pub use acmorph_templates::{
    evaluate, evaluate_unnormalized, BasisCache, BasisFingerprint, BasisKey, BuildContext,
    MorphedTemplate, TemplateBasis,
};
pub use datacard::{DatacardEntry, DatacardKey, Process, YieldAssembler};
pub use labels::with_category_field;
pub use serde::{Deserialize, Serialize};
pub use typetag;
