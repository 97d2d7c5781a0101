use std::{fmt::Display, path::Path};

use acmorph_core::{
    build_matrix, evaluate_all, invert, monomials, required_samples,
    utils::{read_artifact, write_artifact},
    AcmorphError, AcmorphResult, AcmorphResultExt, Analysis, AnalysisConfig, Category,
    ConfigTuple, CouplingPoint, EventSource, Histogram3D, Monomial, ProductionMode, Provenance,
    Sample, SampleRegistry, SystematicVariant, TemplateBinning,
};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::selection::{And, CategorySelection, MassWindow, Selection};

/// The configuration a [`TemplateBasis`] is built for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasisKey {
    /// The production mode
    pub production: ProductionMode,
    /// The detector category
    pub category: Category,
    /// The coupling analysis
    pub analysis: Analysis,
    /// The systematic variant
    pub systematic: SystematicVariant,
}

impl BasisKey {
    /// Create a key.
    pub fn new(
        production: ProductionMode,
        category: Category,
        analysis: Analysis,
        systematic: SystematicVariant,
    ) -> Self {
        Self {
            production,
            category,
            analysis,
            systematic,
        }
    }
    /// The configuration tuple attached to errors.
    pub fn tuple(&self) -> ConfigTuple {
        ConfigTuple::production(self.production)
            .with_category(self.category)
            .with_analysis(self.analysis)
            .with_systematic(self.systematic)
    }
    /// The file name of the artifact of this key filled as described by `fingerprint`.
    pub fn artifact_name(&self, fingerprint: &BasisFingerprint) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}.bin",
            self.production,
            self.category,
            self.analysis,
            self.systematic,
            fingerprint.period,
            fingerprint.digest()
        )
    }
}

impl Display for BasisKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.production, self.category, self.analysis, self.systematic
        )
    }
}

/// How the raw histograms of a basis were filled, besides its key: the period of the samples,
/// the event selection and the binning.
///
/// Bases with the same key and different fingerprints hold different templates, so artifacts and
/// cached bases are identified by both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasisFingerprint {
    /// The data-taking period of the samples
    pub period: String,
    /// The event selection as JSON
    pub selection: String,
    /// The template binning as JSON
    pub binning: String,
}

impl BasisFingerprint {
    /// The fingerprint of filling samples of `period` with `selection` into `binning`.
    pub fn new(
        period: &str,
        selection: &dyn Selection,
        binning: &TemplateBinning,
    ) -> AcmorphResult<Self> {
        Ok(Self {
            period: period.to_string(),
            selection: serde_json::to_string(selection)?,
            binning: serde_json::to_string(binning)?,
        })
    }
    /// The leading 16 hex digits of the SHA-256 of the selection and the binning.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.selection.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.binning.as_bytes());
        hasher
            .finalize()
            .iter()
            .take(8)
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

/// Everything a basis build reads besides its key.
pub struct BuildContext<'a> {
    registry: &'a SampleRegistry,
    config: &'a AnalysisConfig,
    selection: Box<dyn Selection>,
    category_field: Option<String>,
    period: String,
}

impl<'a> BuildContext<'a> {
    /// A context selecting events in the configured mass window, for the 2016 period.
    pub fn new(registry: &'a SampleRegistry, config: &'a AnalysisConfig) -> Self {
        Self {
            registry,
            config,
            selection: Box::new(MassWindow::new(config.mass_window.0, config.mass_window.1)),
            category_field: None,
            period: "2016".to_string(),
        }
    }
    /// Require events to also pass `selection` (flavor, category membership, ...).
    pub fn with_selection(mut self, selection: Box<dyn Selection>) -> Self {
        self.selection = Box::new(And::new(self.selection, selection));
        self
    }
    /// Select the category of the key being built from the labels stored in `field` by a
    /// categorization pass. Without it the category of a key only names the basis.
    pub fn with_category_field<S: Into<String>>(mut self, field: S) -> Self {
        self.category_field = Some(field.into());
        self
    }
    /// Set the data-taking period of the samples.
    pub fn with_period<S: Into<String>>(mut self, period: S) -> Self {
        self.period = period.into();
        self
    }
    /// The data-taking period of the samples.
    pub fn period(&self) -> &str {
        &self.period
    }
    /// The sample registry.
    pub fn registry(&self) -> &SampleRegistry {
        self.registry
    }
    /// The analysis configuration.
    pub fn config(&self) -> &AnalysisConfig {
        self.config
    }
    /// The event selection shared by every key.
    pub fn selection(&self) -> &dyn Selection {
        self.selection.as_ref()
    }
    /// The event selection used to fill the basis of `key`.
    pub fn selection_for(&self, key: &BasisKey) -> Box<dyn Selection> {
        match &self.category_field {
            Some(field) => Box::new(And::new(
                self.selection.clone(),
                Box::new(CategorySelection::new(field.clone(), key.category)),
            )),
            None => self.selection.clone(),
        }
    }
    /// The fingerprint of the basis of `key` built in this context.
    pub fn fingerprint(&self, key: &BasisKey) -> AcmorphResult<BasisFingerprint> {
        BasisFingerprint::new(
            &self.period,
            self.selection_for(key).as_ref(),
            &self.config.binning,
        )
    }
}

/// A monomial basis of templates.
///
/// Template `k` is $`\sum_i (M^{-1})_{ki} h_i`$, where $`h_i`$ is the raw histogram of sample `i`
/// and $`M_{ik}`$ is monomial `k` evaluated at the coupling point of sample `i`. A template at any
/// coupling point $`g`$ is then $`\sum_k m_k(g)\,T_k`$.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateBasis {
    key: BasisKey,
    fingerprint: BasisFingerprint,
    labels: Vec<String>,
    points: Vec<CouplingPoint>,
    monomials: Vec<Monomial>,
    matrix: DMatrix<f64>,
    inverse: DMatrix<f64>,
    raw: Vec<Histogram3D>,
    templates: Vec<Histogram3D>,
}

impl TemplateBasis {
    /// Build the basis for `key`.
    ///
    /// If an artifact directory is configured and already holds this basis, filled the same way
    /// (see [`BasisFingerprint`]), it is loaded instead of being rebuilt. An artifact with the
    /// right name but another key or fingerprint is an error. Otherwise the required samples are filled, the sample→monomial matrix is
    /// inverted, the basis is validated and, if an artifact directory is configured, written.
    ///
    /// # Errors
    ///
    /// Every error is annotated with the key's configuration tuple. The most important are
    /// [`AcmorphError::MissingSampleError`] (a required sample has no events),
    /// [`AcmorphError::DegenerateBasisError`] (the samples do not determine the monomial
    /// coefficients) and [`AcmorphError::BasisValidationError`].
    pub fn build(key: BasisKey, context: &BuildContext<'_>) -> AcmorphResult<Self> {
        let tuple = key.tuple();
        Self::build_inner(key, context).in_configuration(&tuple)
    }

    fn build_inner(key: BasisKey, context: &BuildContext<'_>) -> AcmorphResult<Self> {
        context.config.validate()?;
        let selection = context.selection_for(&key);
        let fingerprint =
            BasisFingerprint::new(&context.period, selection.as_ref(), &context.config.binning)?;
        let artifact = context
            .config
            .artifact_path()?
            .map(|dir| dir.join(key.artifact_name(&fingerprint)));
        if let Some(path) = artifact.as_deref() {
            if path.exists() {
                let basis = Self::load(path)?;
                if basis.key != key || basis.fingerprint != fingerprint {
                    return Err(AcmorphError::Custom(format!(
                        "artifact {} holds the basis for {} filled with {} in period {}, \
                         not {} in period {}",
                        path.display(),
                        basis.key,
                        basis.fingerprint.selection,
                        basis.fingerprint.period,
                        fingerprint.selection,
                        fingerprint.period
                    )));
                }
                tracing::info!(basis = %key, path = %path.display(), "loaded basis artifact");
                return Ok(basis);
            }
        }
        let provenance = Provenance::new(context.period.clone(), key.systematic);
        let samples = required_samples(key.production, key.analysis, &provenance)?;
        let names = key.analysis.coupling_names();
        let monomials = monomials(&names, key.production.degree());
        let points = samples
            .iter()
            .map(|sample| sample.coupling_point())
            .collect::<AcmorphResult<Vec<_>>>()?;
        // check the matrix before filling so a degenerate basis fails without reading events
        build_matrix(&points, &monomials, context.config.singular_tolerance)?;
        let raw = samples
            .iter()
            .map(|sample| {
                let tuple = key.tuple().with_hypothesis(&sample.hypothesis);
                let (sample, source) = context.registry.resolve(sample).in_configuration(&tuple)?;
                fill_sample(
                    &sample,
                    source.as_ref(),
                    selection.as_ref(),
                    &context.config.binning,
                )
                .in_configuration(&tuple)
            })
            .collect::<AcmorphResult<Vec<_>>>()?;
        let labels = samples.iter().map(|s| s.hypothesis.to_string()).collect();
        let mut basis = Self::from_raw(key, labels, points, monomials, raw, context.config)?;
        basis.fingerprint = fingerprint;
        tracing::info!(
            basis = %key,
            selection = %selection,
            samples = basis.labels.len(),
            monomials = basis.monomials.len(),
            "built template basis"
        );
        if let Some(path) = artifact.as_deref() {
            basis.save(path)?;
            tracing::info!(basis = %key, path = %path.display(), "wrote basis artifact");
        }
        Ok(basis)
    }

    /// Assemble and validate a basis from already filled raw histograms, one per coupling point.
    ///
    /// `labels` name the samples in error messages. The number of points must equal the number of
    /// monomials. The basis gets an empty [`BasisFingerprint`], since how the histograms were
    /// filled is unknown.
    pub fn from_raw(
        key: BasisKey,
        labels: Vec<String>,
        points: Vec<CouplingPoint>,
        monomials: Vec<Monomial>,
        raw: Vec<Histogram3D>,
        config: &AnalysisConfig,
    ) -> AcmorphResult<Self> {
        if labels.len() != points.len() || raw.len() != points.len() {
            return Err(AcmorphError::Custom(format!(
                "{} labels and {} histograms given for {} coupling points",
                labels.len(),
                raw.len(),
                points.len()
            )));
        }
        let matrix = build_matrix(&points, &monomials, config.singular_tolerance)?;
        let mut inverse = invert(&matrix, config.singular_tolerance)?;
        let snapped = acmorph_core::snap_entries(&mut inverse, config.snap_tolerance);
        tracing::debug!(basis = %key, snapped, "snapped inverse matrix entries");
        let templates = (0..monomials.len())
            .map(|k| {
                let terms: Vec<(f64, &Histogram3D)> = inverse
                    .row(k)
                    .iter()
                    .copied()
                    .zip(raw.iter())
                    .collect();
                Histogram3D::linear_combination(&terms)
            })
            .collect::<AcmorphResult<Vec<_>>>()?;
        let basis = Self {
            key,
            fingerprint: BasisFingerprint::default(),
            labels,
            points,
            monomials,
            matrix,
            inverse,
            raw,
            templates,
        };
        basis.validate(config.validation_tolerance)?;
        Ok(basis)
    }

    // A sample whose matrix row has a single nonzero entry activates a single monomial. Its
    // template must come back from the basis, and when that entry is 1 (the reference sample)
    // the inverse row of the monomial must be exactly the identity row of the sample.
    fn validate(&self, tolerance: f64) -> AcmorphResult<()> {
        let scale = self
            .raw
            .iter()
            .fold(0.0_f64, |acc, h| acc.max(h.max_abs()))
            .max(f64::MIN_POSITIVE);
        let mut reference_found = false;
        for (i, row) in self.matrix.row_iter().enumerate() {
            let nonzero: Vec<(usize, f64)> = row
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, x)| *x != 0.0)
                .collect();
            let &[(k, value)] = nonzero.as_slice() else {
                continue;
            };
            if value == 1.0 {
                if k == 0 {
                    reference_found = true;
                }
                let identity = self
                    .inverse
                    .row(k)
                    .iter()
                    .enumerate()
                    .all(|(j, x)| *x == if j == i { 1.0 } else { 0.0 });
                if !identity {
                    return Err(AcmorphError::BasisValidationError {
                        reason: format!(
                            "the inverse row of monomial {} is not the identity row of sample {}",
                            self.monomials[k], self.labels[i]
                        ),
                    });
                }
            }
            let reconstructed = &self.templates[k] * value;
            let difference = reconstructed.max_abs_difference(&self.raw[i])?;
            if difference > tolerance * scale {
                return Err(AcmorphError::BasisValidationError {
                    reason: format!(
                        "sample {} is reproduced with a relative deviation of {:e}",
                        self.labels[i],
                        difference / scale
                    ),
                });
            }
        }
        if !reference_found {
            return Err(AcmorphError::BasisValidationError {
                reason: format!(
                    "no sample isolates the reference monomial {}",
                    self.monomials
                        .first()
                        .map(|m| m.to_string())
                        .unwrap_or_default()
                ),
            });
        }
        Ok(())
    }

    /// The key the basis was built for.
    pub fn key(&self) -> BasisKey {
        self.key
    }
    /// How the raw histograms were filled.
    pub fn fingerprint(&self) -> &BasisFingerprint {
        &self.fingerprint
    }
    /// The names of the samples, in matrix row order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
    /// The coupling points of the samples, in matrix row order.
    pub fn points(&self) -> &[CouplingPoint] {
        &self.points
    }
    /// The monomials, in template order.
    pub fn monomials(&self) -> &[Monomial] {
        &self.monomials
    }
    /// The sample→monomial matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
    /// The inverse of [`TemplateBasis::matrix`], after snapping.
    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.inverse
    }
    /// The raw sample histograms, in matrix row order.
    pub fn raw_templates(&self) -> &[Histogram3D] {
        &self.raw
    }
    /// The basis templates, one per monomial.
    pub fn templates(&self) -> &[Histogram3D] {
        &self.templates
    }
    /// The binning shared by every template.
    pub fn binning(&self) -> &TemplateBinning {
        self.templates[0].binning()
    }
    /// The coefficient of each basis template at `point`.
    pub fn coefficients(&self, point: &CouplingPoint) -> AcmorphResult<Vec<f64>> {
        evaluate_all(&self.monomials, point)
    }
    /// Write the basis to `path`.
    pub fn save(&self, path: &Path) -> AcmorphResult<()> {
        write_artifact(path, self)
    }
    /// Read a basis written by [`TemplateBasis::save`].
    pub fn load(path: &Path) -> AcmorphResult<Self> {
        read_artifact(path)
    }
}

/// Fill the raw histogram of one sample.
pub fn fill_sample(
    sample: &Sample,
    source: &dyn EventSource,
    selection: &dyn Selection,
    binning: &TemplateBinning,
) -> AcmorphResult<Histogram3D> {
    let mut histogram = Histogram3D::new(binning.clone());
    let [x, y, z] = binning.variables();
    let mut selected = 0usize;
    let mut dropped = 0usize;
    source.for_each_event(&mut |event| {
        if !selection.accepts(event)? {
            return Ok(());
        }
        let values = [
            event.require_scalar(x)?,
            event.require_scalar(y)?,
            event.require_scalar(z)?,
        ];
        if histogram.fill(values, sample.weight(event)?) {
            selected += 1;
        } else {
            dropped += 1;
        }
        Ok(())
    })?;
    tracing::debug!(
        sample = %sample.id(),
        events = source.len(),
        selected,
        dropped,
        integral = histogram.integral(),
        "filled sample histogram"
    );
    Ok(histogram)
}
