use std::{fmt::Display, path::PathBuf};

use acmorph_core::{
    utils::{read_artifact, write_artifact},
    AcmorphError, AcmorphResult, AcmorphResultExt, Analysis, AnalysisConfig, Category, Channel,
    ConfigTuple, CouplingPoint, CrossSectionTable, Histogram3D, ProductionMode,
    SystematicVariant,
};
use acmorph_templates::{evaluate, evaluate_unnormalized, TemplateBasis};
use serde::{Deserialize, Serialize};

/// A process entering the fit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Process {
    /// Higgs boson signal in one production mode
    Signal(ProductionMode),
    /// Gluon-induced $`ZZ`$ continuum
    GgZZ,
    /// Quark-induced $`ZZ`$ continuum
    QqZZ,
    /// Reducible background from misidentified leptons
    ZX,
}

impl Process {
    /// Expected background yield per 10 fb$`^{-1}`$ in each channel. Signals have none.
    pub fn rate_per_10_fb(&self, channel: Channel) -> Option<f64> {
        let [four_e, four_mu, two_e_two_mu] = match self {
            Process::Signal(_) => return None,
            Process::GgZZ => [0.40, 0.77, 0.66],
            Process::QqZZ => [3.26, 7.17, 8.77],
            Process::ZX => [2.196, 3.003, 3.116],
        };
        Some(match channel {
            Channel::FourE => four_e,
            Channel::FourMu => four_mu,
            Channel::TwoETwoMu => two_e_two_mu,
        })
    }
}

impl Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Process::Signal(production) => write!(f, "{}", production),
            Process::GgZZ => write!(f, "ggZZ"),
            Process::QqZZ => write!(f, "qqZZ"),
            Process::ZX => write!(f, "ZX"),
        }
    }
}

/// The configuration tuple of one datacard entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatacardKey {
    /// The process
    pub process: Process,
    /// The detector category
    pub category: Category,
    /// The final state
    pub channel: Channel,
    /// The coupling analysis
    pub analysis: Analysis,
    /// The systematic variant
    pub systematic: SystematicVariant,
}

impl DatacardKey {
    /// Collect the key.
    pub fn new(
        process: Process,
        category: Category,
        channel: Channel,
        analysis: Analysis,
        systematic: SystematicVariant,
    ) -> Self {
        Self {
            process,
            category,
            channel,
            analysis,
            systematic,
        }
    }
    /// The tuple attached to errors about this entry.
    pub fn tuple(&self) -> ConfigTuple {
        let tuple = match self.process {
            Process::Signal(production) => ConfigTuple::production(production),
            background => ConfigTuple::default().with_hypothesis(background),
        };
        tuple
            .with_category(self.category)
            .with_analysis(self.analysis)
            .with_systematic(self.systematic)
    }
    /// The file name of the artifact holding this entry.
    pub fn artifact_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}.bin",
            self.process, self.category, self.channel, self.analysis, self.systematic
        )
    }
}

impl Display for DatacardKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.process, self.category, self.channel, self.analysis, self.systematic
        )
    }
}

/// One histogram and rate of the fit input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatacardEntry {
    key: DatacardKey,
    histogram: Histogram3D,
    floored_bins: usize,
}

impl DatacardEntry {
    /// The key.
    pub fn key(&self) -> DatacardKey {
        self.key
    }
    /// The histogram, with every bin positive.
    pub fn histogram(&self) -> &Histogram3D {
        &self.histogram
    }
    /// The expected yield, which is the integral of the histogram.
    pub fn rate(&self) -> f64 {
        self.histogram.integral()
    }
    /// The number of bins which were raised to the floor.
    pub fn floored_bins(&self) -> usize {
        self.floored_bins
    }
}

/// Assembles fit inputs from morphed signal templates and background shapes.
///
/// This is the consumer which floors negative bins: templates coming out of the morphing keep
/// their signed bins until they are written here.
#[derive(Clone, Debug)]
pub struct YieldAssembler<'a> {
    config: &'a AnalysisConfig,
    table: CrossSectionTable,
}

impl<'a> YieldAssembler<'a> {
    /// An assembler using the default cross-section table.
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self {
            config,
            table: CrossSectionTable::default(),
        }
    }
    /// Use a different cross-section table.
    pub fn with_table(mut self, table: CrossSectionTable) -> Self {
        self.table = table;
        self
    }
    /// The expected signal yield of `basis` at `target`: the luminosity times the Standard Model
    /// template integral times $`\sigma(\text{target}) / \sigma(\text{SM})`$.
    pub fn signal_yield(&self, basis: &TemplateBasis, target: &CouplingPoint) -> AcmorphResult<f64> {
        let production = basis.key().production;
        let sm = evaluate_unnormalized(basis, &CrossSectionTable::sm_point())?.integral();
        if !(sm > 0.0 && sm.is_finite()) {
            return Err(AcmorphError::NonPositiveCrossSectionError {
                reason: format!("Standard Model template of {} integrates to {}", basis.key(), sm),
            });
        }
        Ok(self.config.luminosity * sm * self.table.ratio_to_sm(production, target)?)
    }
    /// Morph `basis` to `target`, rescale it to the expected yield and floor it.
    pub fn signal(
        &self,
        basis: &TemplateBasis,
        target: &CouplingPoint,
        channel: Channel,
    ) -> AcmorphResult<DatacardEntry> {
        let basis_key = basis.key();
        let key = DatacardKey::new(
            Process::Signal(basis_key.production),
            basis_key.category,
            channel,
            basis_key.analysis,
            basis_key.systematic,
        );
        let target_yield = self.signal_yield(basis, target).in_configuration(&key.tuple())?;
        let morphed = evaluate(basis, target, target_yield)?;
        Ok(self.floor(key, morphed.histogram()))
    }
    /// Scale a background shape to its expected yield in the key's channel and floor it.
    pub fn background(&self, key: DatacardKey, shape: &Histogram3D) -> AcmorphResult<DatacardEntry> {
        self.background_inner(key, shape)
            .in_configuration(&key.tuple())
    }
    fn background_inner(&self, key: DatacardKey, shape: &Histogram3D) -> AcmorphResult<DatacardEntry> {
        let rate = key.process.rate_per_10_fb(key.channel).ok_or_else(|| {
            AcmorphError::UnsupportedConfigurationError {
                reason: format!("{} has no background rate", key.process),
            }
        })? * self.config.luminosity
            / 10.0;
        let integral = shape.integral();
        if !(integral > 0.0 && integral.is_finite()) {
            return Err(AcmorphError::Custom(format!(
                "the {} shape integrates to {} and cannot be normalized",
                key.process, integral
            )));
        }
        let mut histogram = shape.clone();
        histogram.scale(rate / integral);
        Ok(self.floor(key, &histogram))
    }
    fn floor(&self, key: DatacardKey, histogram: &Histogram3D) -> DatacardEntry {
        let (histogram, floored_bins) = histogram.floored(self.config.floor);
        if floored_bins > 0 {
            tracing::warn!(
                entry = %key,
                floored_bins,
                floor = self.config.floor,
                "floored negative bins"
            );
        }
        DatacardEntry {
            key,
            histogram,
            floored_bins,
        }
    }
    fn path(&self, key: &DatacardKey) -> AcmorphResult<PathBuf> {
        let dir = self.config.artifact_path()?.ok_or_else(|| {
            AcmorphError::Custom("no artifact directory is configured".to_string())
        })?;
        Ok(dir.join(key.artifact_name()))
    }
    /// Write one artifact per entry. An artifact which is already on disk is left alone; the
    /// return value says whether anything was written.
    pub fn write(&self, entry: &DatacardEntry) -> AcmorphResult<bool> {
        let path = self.path(&entry.key).in_configuration(&entry.key.tuple())?;
        if path.exists() {
            tracing::info!(entry = %entry.key, path = %path.display(), "datacard artifact exists, skipping");
            return Ok(false);
        }
        write_artifact(&path, entry).in_configuration(&entry.key.tuple())?;
        tracing::info!(entry = %entry.key, path = %path.display(), rate = entry.rate(), "wrote datacard artifact");
        Ok(true)
    }
    /// Read the artifact of `key`, if it was written.
    pub fn read(&self, key: DatacardKey) -> AcmorphResult<Option<DatacardEntry>> {
        let path = self.path(&key).in_configuration(&key.tuple())?;
        if !path.exists() {
            return Ok(None);
        }
        let entry: DatacardEntry = read_artifact(&path).in_configuration(&key.tuple())?;
        if entry.key != key {
            return Err(AcmorphError::Custom(format!(
                "artifact {} holds the entry for {}",
                path.display(),
                entry.key
            ))
            .in_configuration(key.tuple()));
        }
        Ok(Some(entry))
    }
}
