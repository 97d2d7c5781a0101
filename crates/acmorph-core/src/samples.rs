use std::{fmt::Display, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    couplings::CouplingPoint,
    data::{Event, EventSource},
    hypotheses::{Analysis, Hypothesis},
    systematics::SystematicVariant,
    utils::enums::ProductionMode,
    AcmorphError, AcmorphResult,
};

/// Where a sample's events come from: a data-taking period and the systematic variant the
/// events were produced with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// The data-taking period, e.g. `2016`
    pub period: String,
    /// The systematic variant
    pub systematic: SystematicVariant,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            period: "2016".to_string(),
            systematic: SystematicVariant::Nominal,
        }
    }
}

impl Provenance {
    /// Create a provenance tag.
    pub fn new<S: Into<String>>(period: S, systematic: SystematicVariant) -> Self {
        Self {
            period: period.into(),
            systematic,
        }
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.period, self.systematic.appendname())
    }
}

/// The identity of a [`Sample`], used as a cache key and an artifact name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId(String);

impl SampleId {
    /// The identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A simulated sample: one production mode generated at one hypothesis.
///
/// Samples are immutable keys. The events themselves are owned by the [`SampleRegistry`], which
/// opens them lazily on first use.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The production mode
    pub production: ProductionMode,
    /// The generated hypothesis
    pub hypothesis: Hypothesis,
    /// The period and systematic variant
    pub provenance: Provenance,
    /// Factor applied to every event weight
    pub normalization: f64,
    /// The event field holding the per-event weight
    pub weight_field: String,
}

impl Sample {
    /// A sample with unit normalization whose events carry their weight in `MC_weight`.
    pub fn new(production: ProductionMode, hypothesis: Hypothesis, provenance: Provenance) -> Self {
        Self {
            production,
            hypothesis,
            provenance,
            normalization: 1.0,
            weight_field: "MC_weight".to_string(),
        }
    }
    /// Set the factor applied to every event weight, e.g. the expected yield per fb$`^{-1}`$
    /// divided by the sum of generated weights.
    pub fn with_normalization(mut self, normalization: f64) -> Self {
        self.normalization = normalization;
        self
    }
    /// Read the per-event weight from `weight_field`.
    pub fn with_weight_field<S: Into<String>>(mut self, weight_field: S) -> Self {
        self.weight_field = weight_field.into();
        self
    }
    /// The identity of this sample. The normalization is not part of it.
    pub fn id(&self) -> SampleId {
        SampleId(format!(
            "{}_{}_{}",
            self.production, self.hypothesis, self.provenance
        ))
    }
    /// The coupling point the sample was generated at.
    pub fn coupling_point(&self) -> AcmorphResult<CouplingPoint> {
        self.hypothesis.coupling_point(self.production)
    }
    /// The weight of one event of this sample.
    pub fn weight(&self, event: &Event<'_>) -> AcmorphResult<f64> {
        Ok(event.require_scalar(&self.weight_field)? * self.normalization)
    }
}

impl Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// The ordered samples a basis for `analysis` in `production` is built from, one per basis
/// hypothesis.
pub fn required_samples(
    production: ProductionMode,
    analysis: Analysis,
    provenance: &Provenance,
) -> AcmorphResult<Vec<Sample>> {
    Ok(analysis
        .basis_hypotheses(production)?
        .into_iter()
        .map(|hypothesis| Sample::new(production, hypothesis, provenance.clone()))
        .collect())
}

/// Resolves a [`Sample`] to its event source.
///
/// This is the seam where storage formats live. An opener reports a sample without valid files
/// as [`AcmorphError::MissingSampleError`].
pub trait SourceOpener: Send + Sync {
    /// Open the events of `sample`.
    fn open(&self, sample: &Sample) -> AcmorphResult<Arc<dyn EventSource>>;
}

/// A [`SourceOpener`] over sources which are already in memory.
#[derive(Default)]
pub struct PreloadedSources {
    sources: IndexMap<SampleId, Arc<dyn EventSource>>,
}

impl PreloadedSources {
    /// Create an empty set of sources.
    pub fn new() -> Self {
        Self::default()
    }
    /// Add the source of `sample`, replacing any previous one.
    pub fn insert(&mut self, sample: &Sample, source: Arc<dyn EventSource>) {
        self.sources.insert(sample.id(), source);
    }
    /// Builder form of [`PreloadedSources::insert`].
    pub fn with(mut self, sample: &Sample, source: Arc<dyn EventSource>) -> Self {
        self.insert(sample, source);
        self
    }
}

impl SourceOpener for PreloadedSources {
    fn open(&self, sample: &Sample) -> AcmorphResult<Arc<dyn EventSource>> {
        self.sources
            .get(&sample.id())
            .cloned()
            .ok_or_else(|| AcmorphError::MissingSampleError {
                sample: sample.id().to_string(),
                reason: "no event source is available".to_string(),
            })
    }
}

/// The process-wide cache of event sources, keyed by [`SampleId`].
///
/// Each entry keeps the [`Sample`] it was registered or opened with next to its source, so the
/// normalization and weight field of that sample are the ones used for its events, whatever
/// sample value later asks for the same identity. A source is opened on first access and kept for
/// the lifetime of the registry. Entries are only removed by [`SampleRegistry::invalidate`] or
/// [`SampleRegistry::clear`].
pub struct SampleRegistry {
    opener: Box<dyn SourceOpener>,
    sources: RwLock<IndexMap<SampleId, (Sample, Arc<dyn EventSource>)>>,
}

impl SampleRegistry {
    /// Create an empty registry which opens sources with `opener`.
    pub fn new<O: SourceOpener + 'static>(opener: O) -> Self {
        Self {
            opener: Box::new(opener),
            sources: RwLock::new(IndexMap::new()),
        }
    }
    /// Create a registry which can only serve explicitly registered sources.
    pub fn preloaded() -> Self {
        Self::new(PreloadedSources::new())
    }
    /// Put a source in the cache directly, together with the normalization and weight field of
    /// `sample`.
    ///
    /// # Errors
    ///
    /// Returns [`AcmorphError::RegistrationError`] if the sample already has a cached source.
    pub fn register(&self, sample: &Sample, source: Arc<dyn EventSource>) -> AcmorphResult<()> {
        let id = sample.id();
        let mut sources = self.sources.write();
        if sources.contains_key(&id) {
            return Err(AcmorphError::RegistrationError {
                name: id.to_string(),
            });
        }
        sources.insert(id, (sample.clone(), source));
        Ok(())
    }
    /// The event source of `sample`, opened on first access.
    ///
    /// # Errors
    ///
    /// See [`SampleRegistry::resolve`].
    pub fn source(&self, sample: &Sample) -> AcmorphResult<Arc<dyn EventSource>> {
        Ok(self.resolve(sample)?.1)
    }
    /// The sample registered under the identity of `sample` and its event source, opened on
    /// first access. A source which had to be opened is stored with `sample` itself.
    ///
    /// # Errors
    ///
    /// Returns [`AcmorphError::MissingSampleError`] if the source cannot be opened or holds no
    /// events. Empty sources are never cached.
    pub fn resolve(&self, sample: &Sample) -> AcmorphResult<(Sample, Arc<dyn EventSource>)> {
        let id = sample.id();
        if let Some(entry) = self.sources.read().get(&id) {
            return Ok(entry.clone());
        }
        let source = self.opener.open(sample)?;
        if source.is_empty() {
            return Err(AcmorphError::MissingSampleError {
                sample: id.to_string(),
                reason: "the event source holds no events".to_string(),
            });
        }
        tracing::debug!(sample = %id, events = source.len(), "opened event source");
        Ok(self
            .sources
            .write()
            .entry(id)
            .or_insert((sample.clone(), source))
            .clone())
    }
    /// Drop the cached source of an identity whose files are no longer valid. Returns whether
    /// anything was cached.
    pub fn invalidate(&self, id: &SampleId) -> bool {
        self.sources.write().shift_remove(id).is_some()
    }
    /// Drop every cached source.
    pub fn clear(&self) {
        let mut sources = self.sources.write();
        tracing::info!(sources = sources.len(), "clearing sample registry");
        sources.clear();
    }
    /// Whether a source for `sample` is cached.
    pub fn contains(&self, sample: &Sample) -> bool {
        self.sources.read().contains_key(&sample.id())
    }
    /// The number of cached sources.
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }
    /// Whether no sources are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
