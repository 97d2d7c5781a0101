//! # acmorph-core
//!
//! This is an internal crate used by `acmorph`. It holds the pieces shared by the template
//! morphing engine and the categorization engine: the coupling algebra, hypotheses and their
//! coupling points, cross-section tables, three-dimensional histograms, event records and the
//! sample registry.
#![warn(clippy::perf, clippy::style)]
#![allow(clippy::excessive_precision)]

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration shared by every stage of an analysis.
pub mod config;
/// Monomials, coupling points and the sample→monomial linear system.
pub mod couplings;
/// Named per-event records and the sources which produce them.
pub mod data;
/// Three-dimensional template histograms.
pub mod histograms;
/// Coupling hypotheses, coupling constants and the analyses built from them.
pub mod hypotheses;
/// Samples and the process-wide cache of their event sources.
pub mod samples;
/// Detector systematic variants and the variable names they imply.
pub mod systematics;
/// Utility functions, enums, and traits
pub mod utils;
/// Cross-section quadratic forms and the ratios derived from them.
pub mod xsec;

pub use crate::config::AnalysisConfig;
pub use crate::couplings::{
    build_matrix, evaluate_all, invert, monomials, snap_entries, CouplingPoint, Monomial,
};
pub use crate::data::{Dataset, Event, EventData, EventSchema, EventSource};
pub use crate::histograms::{Axis, FlowPolicy, Histogram3D, TemplateBinning};
pub use crate::hypotheses::{Analysis, Coupling, Hypothesis, MixKind};
pub use crate::samples::{
    required_samples, PreloadedSources, Provenance, Sample, SampleId, SampleRegistry,
    SourceOpener,
};
pub use crate::systematics::SystematicVariant;
pub use crate::utils::enums::{Category, Channel, ProductionMode, Sign};
pub use crate::xsec::{CrossSectionComponent, CrossSectionTable, QuadraticForm};

/// Result alias used throughout the workspace.
pub type AcmorphResult<T> = Result<T, AcmorphError>;

/// The configuration tuple which identifies a unit of work.
///
/// Every fatal error which escapes a basis build, a template evaluation, a categorization pass or
/// a datacard assembly is wrapped with the tuple that produced it, since failures are debugged by
/// re-deriving that exact tuple's inputs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigTuple {
    /// The production mode, if one is involved
    pub production: Option<ProductionMode>,
    /// The detector category, if one is involved
    pub category: Option<Category>,
    /// The coupling analysis, if one is involved
    pub analysis: Option<Analysis>,
    /// The name of the hypothesis, if one is involved
    pub hypothesis: Option<String>,
    /// The systematic variant, if one is involved
    pub systematic: Option<SystematicVariant>,
}

impl ConfigTuple {
    /// Start a tuple from a production mode.
    pub fn production(production: ProductionMode) -> Self {
        Self {
            production: Some(production),
            ..Default::default()
        }
    }
    /// Set the detector category.
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
    /// Set the coupling analysis.
    pub fn with_analysis(mut self, analysis: Analysis) -> Self {
        self.analysis = Some(analysis);
        self
    }
    /// Set the hypothesis name.
    pub fn with_hypothesis<T: Display>(mut self, hypothesis: T) -> Self {
        self.hypothesis = Some(hypothesis.to_string());
        self
    }
    /// Set the systematic variant.
    pub fn with_systematic(mut self, systematic: SystematicVariant) -> Self {
        self.systematic = Some(systematic);
        self
    }
}

impl Display for ConfigTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn field<T: Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string())
        }
        write!(
            f,
            "production={}, category={}, analysis={}, hypothesis={}, systematic={}",
            field(&self.production),
            field(&self.category),
            field(&self.analysis),
            field(&self.hypothesis),
            field(&self.systematic),
        )
    }
}

/// The error type used by all `acmorph` internal methods
#[derive(Error, Debug)]
pub enum AcmorphError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`bincode::error::EncodeError`].
    #[error("Encoder error: {0}")]
    EncodeError(#[from] bincode::error::EncodeError),
    /// An alias for [`bincode::error::DecodeError`].
    #[error("Decoder error: {0}")]
    DecodeError(#[from] bincode::error::DecodeError),
    /// An alias for [`serde_json::Error`].
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// An alias for [`shellexpand::LookupError`].
    #[error("Failed to expand path: {0}")]
    LookupError(#[from] shellexpand::LookupError<std::env::VarError>),
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
    /// An error which occurs when two entries are registered under the same name.
    #[error("An entry by the name \"{name}\" is already registered!")]
    RegistrationError {
        /// Name of the entry which is already registered
        name: String,
    },
    /// The sample→monomial matrix is singular or too ill-conditioned to invert.
    #[error("Degenerate morphing basis: {reason}")]
    DegenerateBasisError {
        /// What made the basis degenerate
        reason: String,
    },
    /// A sample required by a basis has no event source or no events.
    #[error("Missing sample \"{sample}\": {reason}")]
    MissingSampleError {
        /// Identity of the sample
        sample: String,
        /// Why it is unusable
        reason: String,
    },
    /// A systematic variant name which is not recognized.
    #[error("Unknown systematic variant \"{name}\"!")]
    UnknownSystematicVariantError {
        /// The name which failed to resolve
        name: String,
    },
    /// A combined categorization whose members disagree outside of the precedence rules.
    #[error("Combined categorization disagreement: {labels}")]
    CategorizationDisagreementError {
        /// The labels returned by the members, in order
        labels: String,
    },
    /// A freshly built basis failed its self-consistency check.
    #[error("Basis validation failed: {reason}")]
    BasisValidationError {
        /// Description of the failed check
        reason: String,
    },
    /// An event record lacks a required field.
    #[error("Event {event} has no field named \"{field}\"!")]
    MissingFieldError {
        /// Name of the missing field
        field: String,
        /// Index of the event in its source
        event: usize,
    },
    /// A coupling point lacks a required coupling.
    #[error("No coupling named \"{name}\" in coupling point!")]
    MissingCouplingError {
        /// Name of the missing coupling
        name: String,
    },
    /// Two histograms or axes with incompatible binning were combined.
    #[error("Binning mismatch: {reason}")]
    BinningMismatchError {
        /// Description of the mismatch
        reason: String,
    },
    /// An axis which cannot hold any entry: no bins, or an empty or non-finite range.
    #[error("Invalid binning: {reason}")]
    InvalidBinningError {
        /// Description of the offending axis
        reason: String,
    },
    /// A cross section used as a denominator is zero, negative or not finite.
    #[error("Non-positive cross section: {reason}")]
    NonPositiveCrossSectionError {
        /// Description of the offending cross section
        reason: String,
    },
    /// A combination of production, analysis and hypothesis which cannot be built.
    #[error("Unsupported configuration: {reason}")]
    UnsupportedConfigurationError {
        /// Description of the unsupported combination
        reason: String,
    },
    /// An error annotated with the configuration tuple which produced it.
    #[error("{source} [{tuple}]")]
    Configured {
        /// The configuration tuple
        tuple: ConfigTuple,
        /// The underlying error
        source: Box<AcmorphError>,
    },
    /// A custom fallback error for errors too complex or too infrequent to warrant their own error
    /// category.
    #[error("{0}")]
    Custom(String),
}

impl AcmorphError {
    /// Attach a configuration tuple to this error. Errors which already carry a tuple keep the
    /// innermost one, which is the most specific.
    pub fn in_configuration(self, tuple: ConfigTuple) -> Self {
        match self {
            AcmorphError::Configured { .. } => self,
            other => AcmorphError::Configured {
                tuple,
                source: Box::new(other),
            },
        }
    }
    /// The error underneath any configuration annotation.
    pub fn root(&self) -> &AcmorphError {
        match self {
            AcmorphError::Configured { source, .. } => source.root(),
            other => other,
        }
    }
    /// The configuration tuple attached to this error, if any.
    pub fn tuple(&self) -> Option<&ConfigTuple> {
        match self {
            AcmorphError::Configured { tuple, .. } => Some(tuple),
            _ => None,
        }
    }
}

impl Clone for AcmorphError {
    // This is a little hack because error types are rarely cloneable, but I need to store them in a
    // cloneable box for cached results
    fn clone(&self) -> Self {
        let err_string = self.to_string();
        AcmorphError::Custom(err_string)
    }
}

/// Attach a [`ConfigTuple`] to the error branch of an [`AcmorphResult`].
pub trait AcmorphResultExt<T> {
    /// See [`AcmorphError::in_configuration`].
    fn in_configuration(self, tuple: &ConfigTuple) -> AcmorphResult<T>;
}

impl<T> AcmorphResultExt<T> for AcmorphResult<T> {
    fn in_configuration(self, tuple: &ConfigTuple) -> AcmorphResult<T> {
        self.map_err(|err| err.in_configuration(tuple.clone()))
    }
}
