use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{histograms::TemplateBinning, AcmorphError, AcmorphResult};

fn expand_path(path: &str) -> AcmorphResult<PathBuf> {
    Ok(PathBuf::from(&*shellexpand::full(path)?))
}

/// Settings shared by every stage of an analysis.
///
/// Every field has a default, so a JSON document only needs to list what it overrides:
///
/// ```
/// use acmorph_core::AnalysisConfig;
///
/// let config = AnalysisConfig::from_json_str(r#"{"luminosity": 41.5}"#).unwrap();
/// assert_eq!(config.luminosity, 41.5);
/// assert_eq!(config.mass_window, (105.0, 140.0));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Integrated luminosity in fb$`^{-1}`$
    pub luminosity: f64,
    /// Four-lepton mass window in GeV, lower edge inclusive
    pub mass_window: (f64, f64),
    /// Passed to the category predicate
    pub use_qg_tagging: bool,
    /// Smallest acceptable reciprocal condition number of a sample→monomial matrix
    pub singular_tolerance: f64,
    /// Inverse matrix entries this close to 0 (relative to their row) or to 1 are snapped
    pub snap_tolerance: f64,
    /// Largest relative deviation allowed when a basis reproduces its own samples
    pub validation_tolerance: f64,
    /// Value which negative bins are raised to before a template is handed to the fit
    pub floor: f64,
    /// Directory of basis and datacard artifacts, `~` and `$VAR` are expanded
    pub artifact_dir: Option<String>,
    /// Binning of every template
    pub binning: TemplateBinning,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            luminosity: 35.8671,
            mass_window: (105.0, 140.0),
            use_qg_tagging: false,
            singular_tolerance: 1e-12,
            snap_tolerance: 1e-10,
            validation_tolerance: 1e-6,
            floor: 1e-10,
            artifact_dir: None,
            binning: TemplateBinning::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> AcmorphResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
    /// Parse a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> AcmorphResult<Self> {
        let path = expand_path(&path.as_ref().to_string_lossy())?;
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
    /// Serialize the configuration to pretty-printed JSON.
    pub fn to_json_string(&self) -> AcmorphResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
    /// The expanded artifact directory, if one is configured.
    pub fn artifact_path(&self) -> AcmorphResult<Option<PathBuf>> {
        self.artifact_dir
            .as_deref()
            .map(expand_path)
            .transpose()
    }
    /// Set the integrated luminosity in fb$`^{-1}`$.
    pub fn with_luminosity(mut self, luminosity: f64) -> Self {
        self.luminosity = luminosity;
        self
    }
    /// Set the four-lepton mass window in GeV.
    pub fn with_mass_window(mut self, low: f64, high: f64) -> Self {
        self.mass_window = (low, high);
        self
    }
    /// Pass quark/gluon tagging to the category predicate.
    pub fn with_qg_tagging(mut self, use_qg_tagging: bool) -> Self {
        self.use_qg_tagging = use_qg_tagging;
        self
    }
    /// Set the smallest acceptable reciprocal condition number.
    pub fn with_singular_tolerance(mut self, tolerance: f64) -> Self {
        self.singular_tolerance = tolerance;
        self
    }
    /// Set the tolerance for snapping inverse matrix entries to 0 or 1.
    pub fn with_snap_tolerance(mut self, tolerance: f64) -> Self {
        self.snap_tolerance = tolerance;
        self
    }
    /// Set the relative deviation allowed when a basis reproduces its samples.
    pub fn with_validation_tolerance(mut self, tolerance: f64) -> Self {
        self.validation_tolerance = tolerance;
        self
    }
    /// Set the value negative bins are raised to.
    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }
    /// Store basis and datacard artifacts in `artifact_dir`.
    pub fn with_artifact_dir<S: Into<String>>(mut self, artifact_dir: S) -> Self {
        self.artifact_dir = Some(artifact_dir.into());
        self
    }
    /// Set the template binning.
    pub fn with_binning(mut self, binning: TemplateBinning) -> Self {
        self.binning = binning;
        self
    }

    /// Check the settings: a positive luminosity, a non-empty mass window, non-negative
    /// tolerances and a binning every axis of which can hold entries.
    pub fn validate(&self) -> AcmorphResult<()> {
        if !(self.luminosity > 0.0) {
            return Err(AcmorphError::Custom(format!(
                "luminosity must be positive, got {}",
                self.luminosity
            )));
        }
        if !(self.mass_window.0 < self.mass_window.1) {
            return Err(AcmorphError::Custom(format!(
                "empty mass window ({}, {})",
                self.mass_window.0, self.mass_window.1
            )));
        }
        for (name, value) in [
            ("singular_tolerance", self.singular_tolerance),
            ("snap_tolerance", self.snap_tolerance),
            ("validation_tolerance", self.validation_tolerance),
            ("floor", self.floor),
        ] {
            if !(value >= 0.0) {
                return Err(AcmorphError::Custom(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        self.binning.validate()
    }
}
