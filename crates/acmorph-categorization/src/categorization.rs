use std::{
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

use acmorph_core::{
    AcmorphError, AcmorphResult, AcmorphResultExt, AnalysisConfig, Category, ConfigTuple,
    CrossSectionTable, Event, EventSource, Hypothesis, ProductionMode, SystematicVariant,
};
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    probabilities::{ProbabilityAggregator, SubProcess},
    provider::MatrixElementProvider,
};

/// The value every jet-level array takes for an event without selected jets.
pub const NO_JET_SENTINEL: f64 = -999.0;

const NO_JETS: &[f64] = &[NO_JET_SENTINEL];

/// The arguments of the category decision, in the order the decision takes them.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryInputs<'a> {
    /// Leptons beyond the four of the candidate
    pub n_extra_leptons: u32,
    /// $`Z`$ candidates beyond the two of the candidate
    pub n_extra_z: u32,
    /// Selected jets
    pub n_jets: u32,
    /// Selected b-tagged jets
    pub n_btagged_jets: u32,
    /// Quark/gluon likelihood of each selected jet
    pub jet_qg_likelihoods: &'a [f64],
    /// Gluon fusion + 2 jets
    pub p_hjj: f64,
    /// Gluon fusion + 1 jet
    pub p_hj: f64,
    /// Vector boson fusion + 2 jets
    pub p_vbf: f64,
    /// Vector boson fusion + 1 jet
    pub p_vbf_1j: f64,
    /// Auxiliary vector boson fusion + 1 jet
    pub p_aux: f64,
    /// Hadronic $`WH`$
    pub p_wh: f64,
    /// Hadronic $`ZH`$
    pub p_zh: f64,
    /// Azimuthal angle of each selected jet
    pub jet_phis: &'a [f64],
    /// Four-lepton invariant mass
    pub zz_mass: f64,
    /// Four-lepton transverse momentum
    pub zz_pt: f64,
    /// Missing transverse energy
    pub pfmet: f64,
    /// Whether quark/gluon tagging takes part in the decision
    pub use_qg_tagging: bool,
}

/// The category decision: a pure function of its inputs.
pub trait CategoryPredicate: Send + Sync {
    /// Decide the category of one event.
    fn decide(&self, inputs: &CategoryInputs<'_>) -> Category;
}

impl<F> CategoryPredicate for F
where
    F: Fn(&CategoryInputs<'_>) -> Category + Send + Sync,
{
    fn decide(&self, inputs: &CategoryInputs<'_>) -> Category {
        self(inputs)
    }
}

/// The event fields a systematic variant reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputVariables {
    /// Leptons beyond the candidate
    pub n_extra_leptons: String,
    /// $`Z`$ candidates beyond the candidate
    pub n_extra_z: String,
    /// Number of selected jets
    pub n_jets: String,
    /// Number of selected b-tagged jets
    pub n_btagged_jets: String,
    /// Jet quark/gluon likelihoods
    pub jet_qg_likelihoods: String,
    /// Jet azimuthal angles
    pub jet_phis: String,
    /// Four-lepton mass
    pub zz_mass: String,
    /// Four-lepton transverse momentum
    pub zz_pt: String,
    /// Missing transverse energy
    pub pfmet: String,
    /// Gluon fusion + 1 jet probability
    pub p_hj: String,
    /// Vector boson fusion + 1 jet probability
    pub p_vbf_1j: String,
    /// Auxiliary vector boson fusion + 1 jet probability
    pub p_aux: String,
}

impl InputVariables {
    /// The names read under `systematic`.
    pub fn for_systematic(systematic: SystematicVariant) -> Self {
        Self {
            n_extra_leptons: "nExtraLep".to_string(),
            n_extra_z: "nExtraZ".to_string(),
            n_jets: systematic.njets_variable(),
            n_btagged_jets: systematic.nbtagged_variable(),
            jet_qg_likelihoods: systematic.jet_qg_likelihood_variable(),
            jet_phis: systematic.jet_phi_variable(),
            zz_mass: "ZZMass".to_string(),
            zz_pt: "ZZPt".to_string(),
            pfmet: systematic.pfmet_variable(),
            p_hj: systematic.p_hj_variable(),
            p_vbf_1j: systematic.p_vbf_1j_variable(),
            p_aux: systematic.p_aux_variable(),
        }
    }
}

fn count(event: &Event<'_>, name: &str) -> AcmorphResult<u32> {
    let value = event.require_scalar(name)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(AcmorphError::Custom(format!(
            "event {} has {} = {}, which is not a count",
            event.index(),
            name,
            value
        )));
    }
    Ok(value as u32)
}

/// Replace `+`, `-` and `.` so that a hypothesis name can appear in an identifier, and spell out
/// the production mode in production mixtures.
pub fn nicename(hypothesis: &Hypothesis, production: ProductionMode) -> String {
    hypothesis
        .to_string()
        .replace("prod", &production.to_string())
        .replace('+', "P")
        .replace('-', "M")
        .replace('.', "p")
}

/// The label of each spec computed for the current event.
///
/// A combined categorization reads its members' labels from here instead of recomputing them.
/// Use one context per pass over a source: labels are forgotten when a different event index is
/// seen.
#[derive(Clone, Debug, Default)]
pub struct CategorizationContext {
    event: Option<usize>,
    labels: IndexMap<String, Category>,
}

impl CategorizationContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }
    fn enter(&mut self, event: usize) {
        if self.event != Some(event) {
            self.event = Some(event);
            self.labels.clear();
        }
    }
    /// The label the spec called `name` returned for the current event, if it was computed. A
    /// combination is recorded under its [`MultiCategorization::identity`] rather than its name.
    pub fn last(&self, name: &str) -> Option<Category> {
        self.labels.get(name).copied()
    }
    fn record(&mut self, name: &str, label: Category) {
        self.labels.insert(name.to_string(), label);
    }
}

/// Categorization at a single hypothesis.
pub struct SingleCategorization {
    name: String,
    production: ProductionMode,
    hypothesis: Hypothesis,
    systematic: SystematicVariant,
    variables: InputVariables,
    aggregators: [ProbabilityAggregator; 4],
    use_qg_tagging: bool,
    provider: Arc<dyn MatrixElementProvider>,
    predicate: Arc<dyn CategoryPredicate>,
}

impl Debug for SingleCategorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleCategorization")
            .field("name", &self.name)
            .field("production", &self.production)
            .field("hypothesis", &self.hypothesis)
            .field("systematic", &self.systematic)
            .field("aggregators", &self.aggregators)
            .finish_non_exhaustive()
    }
}

impl SingleCategorization {
    fn new(
        production: ProductionMode,
        hypothesis: &Hypothesis,
        systematic: SystematicVariant,
        factory: &CategorizationFactory,
    ) -> AcmorphResult<Self> {
        let point = hypothesis.coupling_point(production)?;
        let label = nicename(hypothesis, production);
        // the H+2 jet probability is named after the gluon hypothesis, which is the Standard
        // Model one for every HVV hypothesis
        let gluon_label = if hypothesis.is_gluon() {
            label.clone()
        } else {
            nicename(&Hypothesis::Pure(acmorph_core::Coupling::Ghg2), production)
        };
        let aggregator = |sub_process: SubProcess| {
            let label = match sub_process {
                SubProcess::HJJ => &gluon_label,
                _ => &label,
            };
            ProbabilityAggregator::new(sub_process, &point, label, systematic, &factory.table)
        };
        let aggregators = [
            aggregator(SubProcess::HJJ)?,
            aggregator(SubProcess::VBF)?,
            aggregator(SubProcess::ZH)?,
            aggregator(SubProcess::WH)?,
        ];
        Ok(Self {
            name: format!("category_{}{}", label, systematic.appendname()),
            production,
            hypothesis: hypothesis.clone(),
            systematic,
            variables: InputVariables::for_systematic(systematic),
            aggregators,
            use_qg_tagging: factory.use_qg_tagging,
            provider: factory.provider.clone(),
            predicate: factory.predicate.clone(),
        })
    }
    /// The name of the decision this spec computes.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The production mode whose coupling point the hypothesis resolves to.
    pub fn production(&self) -> ProductionMode {
        self.production
    }
    /// The hypothesis.
    pub fn hypothesis(&self) -> &Hypothesis {
        &self.hypothesis
    }
    /// The systematic variant.
    pub fn systematic(&self) -> SystematicVariant {
        self.systematic
    }
    /// The event fields read by this spec.
    pub fn variables(&self) -> &InputVariables {
        &self.variables
    }
    /// The aggregator of one sub-process.
    pub fn aggregator(&self, sub_process: SubProcess) -> &ProbabilityAggregator {
        match sub_process {
            SubProcess::HJJ => &self.aggregators[0],
            SubProcess::VBF => &self.aggregators[1],
            SubProcess::ZH => &self.aggregators[2],
            SubProcess::WH => &self.aggregators[3],
        }
    }
    fn tuple(&self) -> ConfigTuple {
        ConfigTuple::production(self.production)
            .with_hypothesis(&self.hypothesis)
            .with_systematic(self.systematic)
    }
    /// Collect the inputs of the category decision for one event.
    ///
    /// An event without selected jets gets `[NO_JET_SENTINEL]` for both jet arrays, whether or
    /// not it stores them.
    pub fn inputs<'a>(&self, event: &Event<'a>) -> AcmorphResult<CategoryInputs<'a>> {
        let variables = &self.variables;
        let provider = self.provider.as_ref();
        let n_jets = count(event, &variables.n_jets)?;
        let (jet_qg_likelihoods, jet_phis) = if n_jets == 0 {
            (NO_JETS, NO_JETS)
        } else {
            (
                event.require_array(&variables.jet_qg_likelihoods)?,
                event.require_array(&variables.jet_phis)?,
            )
        };
        Ok(CategoryInputs {
            n_extra_leptons: count(event, &variables.n_extra_leptons)?,
            n_extra_z: count(event, &variables.n_extra_z)?,
            n_jets,
            n_btagged_jets: count(event, &variables.n_btagged_jets)?,
            jet_qg_likelihoods,
            p_hjj: self.aggregator(SubProcess::HJJ).evaluate(provider, event)?,
            p_hj: provider.probability(&variables.p_hj, event)?,
            p_vbf: self.aggregator(SubProcess::VBF).evaluate(provider, event)?,
            p_vbf_1j: provider.probability(&variables.p_vbf_1j, event)?,
            p_aux: provider.probability(&variables.p_aux, event)?,
            p_wh: self.aggregator(SubProcess::WH).evaluate(provider, event)?,
            p_zh: self.aggregator(SubProcess::ZH).evaluate(provider, event)?,
            jet_phis,
            zz_mass: event.require_scalar(&variables.zz_mass)?,
            zz_pt: event.require_scalar(&variables.zz_pt)?,
            pfmet: event.require_scalar(&variables.pfmet)?,
            use_qg_tagging: self.use_qg_tagging,
        })
    }
    /// Categorize one event, reusing the label already in `context` for this event.
    pub fn categorize(
        &self,
        event: &Event<'_>,
        context: &mut CategorizationContext,
    ) -> AcmorphResult<Category> {
        context.enter(event.index());
        if let Some(label) = context.last(&self.name) {
            return Ok(label);
        }
        let inputs = self.inputs(event).in_configuration(&self.tuple())?;
        let label = self.predicate.decide(&inputs);
        context.record(&self.name, label);
        Ok(label)
    }
}

/// Resolve the labels of several equivalent categorizations into one.
///
/// [`Category::VBF2jTagged`] wins over everything, then [`Category::VHHadrTagged`]. Otherwise
/// every label must be the same.
pub fn combine_labels(labels: &[(&str, Category)]) -> AcmorphResult<Category> {
    for precedence in [Category::VBF2jTagged, Category::VHHadrTagged] {
        if labels.iter().any(|(_, label)| *label == precedence) {
            return Ok(precedence);
        }
    }
    let (_, first) = labels.first().ok_or_else(|| {
        AcmorphError::Custom("cannot combine an empty set of categorizations".to_string())
    })?;
    if labels.iter().all(|(_, label)| label == first) {
        Ok(*first)
    } else {
        Err(AcmorphError::CategorizationDisagreementError {
            labels: labels
                .iter()
                .map(|(name, label)| format!("{}={}", name, label))
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Several single categorizations which should agree, combined into one decision.
///
/// The decision only depends on the set of members, so a combination is identified by its
/// members' names, sorted, and not by the name it was given.
#[derive(Debug)]
pub struct MultiCategorization {
    name: String,
    identity: String,
    systematic: SystematicVariant,
    singles: Vec<Arc<SingleCategorization>>,
}

impl MultiCategorization {
    /// The name of the decision this spec computes.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The sorted member names joined by `|`, which identify the combination.
    pub fn identity(&self) -> &str {
        &self.identity
    }
    /// The systematic variant every member uses.
    pub fn systematic(&self) -> SystematicVariant {
        self.systematic
    }
    /// The distinct members, sorted by name.
    pub fn singles(&self) -> &[Arc<SingleCategorization>] {
        &self.singles
    }
    /// Categorize one event with every member and combine their labels.
    pub fn categorize(
        &self,
        event: &Event<'_>,
        context: &mut CategorizationContext,
    ) -> AcmorphResult<Category> {
        context.enter(event.index());
        if let Some(label) = context.last(&self.identity) {
            return Ok(label);
        }
        let mut labels = Vec::with_capacity(self.singles.len());
        for single in &self.singles {
            labels.push((single.name(), single.categorize(event, context)?));
        }
        let label = combine_labels(&labels).in_configuration(
            &ConfigTuple::default()
                .with_hypothesis(&self.name)
                .with_systematic(self.systematic),
        )?;
        context.record(&self.identity, label);
        Ok(label)
    }
}

/// A categorization. A single one is identified by its name, a combination by its set of
/// members.
#[derive(Clone, Debug)]
pub enum CategorizationSpec {
    /// One hypothesis
    Single(Arc<SingleCategorization>),
    /// Several hypotheses combined by precedence
    Multi(Arc<MultiCategorization>),
}

impl CategorizationSpec {
    /// The name of the decision, e.g. `category_0M_JECUp`.
    pub fn name(&self) -> &str {
        match self {
            CategorizationSpec::Single(single) => single.name(),
            CategorizationSpec::Multi(multi) => multi.name(),
        }
    }
    /// The systematic variant.
    pub fn systematic(&self) -> SystematicVariant {
        match self {
            CategorizationSpec::Single(single) => single.systematic(),
            CategorizationSpec::Multi(multi) => multi.systematic(),
        }
    }
    /// Whether this spec reads shifted inputs.
    pub fn is_systematic(&self) -> bool {
        self.systematic().is_systematic()
    }
    /// Categorize one event.
    pub fn categorize(
        &self,
        event: &Event<'_>,
        context: &mut CategorizationContext,
    ) -> AcmorphResult<Category> {
        match self {
            CategorizationSpec::Single(single) => single.categorize(event, context),
            CategorizationSpec::Multi(multi) => multi.categorize(event, context),
        }
    }
    /// Categorize every event of a source, in order. The first failing event aborts the pass.
    pub fn categorize_all(&self, source: &dyn EventSource) -> AcmorphResult<Vec<Category>> {
        let mut context = CategorizationContext::new();
        let mut labels = Vec::with_capacity(source.len());
        source.for_each_event(&mut |event| {
            labels.push(self.categorize(event, &mut context)?);
            Ok(())
        })?;
        tracing::debug!(spec = %self, events = labels.len(), "categorized source");
        Ok(labels)
    }
}

impl CategorizationSpec {
    fn identity(&self) -> (bool, &str) {
        match self {
            CategorizationSpec::Single(single) => (false, single.name()),
            CategorizationSpec::Multi(multi) => (true, multi.identity()),
        }
    }
}

impl PartialEq for CategorizationSpec {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for CategorizationSpec {}

impl Hash for CategorizationSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl Display for CategorizationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

type SingleKey = (ProductionMode, Hypothesis, SystematicVariant);

/// Builds categorization specs, sharing one spec per (production, hypothesis, systematic).
pub struct CategorizationFactory {
    table: CrossSectionTable,
    use_qg_tagging: bool,
    provider: Arc<dyn MatrixElementProvider>,
    predicate: Arc<dyn CategoryPredicate>,
    singles: RwLock<IndexMap<SingleKey, Arc<SingleCategorization>>>,
}

impl CategorizationFactory {
    /// A factory which evaluates probabilities with `provider` and decides with `predicate`.
    pub fn new<P, D>(config: &AnalysisConfig, provider: P, predicate: D) -> Self
    where
        P: MatrixElementProvider + 'static,
        D: CategoryPredicate + 'static,
    {
        Self {
            table: CrossSectionTable::default(),
            use_qg_tagging: config.use_qg_tagging,
            provider: Arc::new(provider),
            predicate: Arc::new(predicate),
            singles: RwLock::new(IndexMap::new()),
        }
    }
    /// Normalize probabilities with a different cross-section table. Specs built before the
    /// change are forgotten.
    pub fn with_table(mut self, table: CrossSectionTable) -> Self {
        self.table = table;
        self.singles.write().clear();
        self
    }
    /// The spec of one hypothesis.
    pub fn single(
        &self,
        production: ProductionMode,
        hypothesis: &Hypothesis,
        systematic: SystematicVariant,
    ) -> AcmorphResult<CategorizationSpec> {
        let key = (production, hypothesis.clone(), systematic);
        if let Some(single) = self.singles.read().get(&key) {
            return Ok(CategorizationSpec::Single(single.clone()));
        }
        let single = Arc::new(
            SingleCategorization::new(production, hypothesis, systematic, self).in_configuration(
                &ConfigTuple::production(production)
                    .with_hypothesis(hypothesis)
                    .with_systematic(systematic),
            )?,
        );
        let single = self.singles.write().entry(key).or_insert(single).clone();
        Ok(CategorizationSpec::Single(single))
    }
    /// The spec of one hypothesis, parsing the hypothesis and systematic names. An unknown
    /// systematic is an error here, before any event is read.
    pub fn single_from_names(
        &self,
        production: ProductionMode,
        hypothesis: &str,
        systematic: &str,
    ) -> AcmorphResult<CategorizationSpec> {
        let tuple = ConfigTuple::production(production).with_hypothesis(hypothesis);
        let systematic: SystematicVariant = systematic.parse().in_configuration(&tuple)?;
        let hypothesis: Hypothesis = hypothesis
            .parse()
            .in_configuration(&tuple.with_systematic(systematic))?;
        self.single(production, &hypothesis, systematic)
    }
    /// Combine single specs sharing one systematic variant. The name is `category_<name>`.
    ///
    /// Members are sorted by name and repeated members are dropped, so the order and repetition
    /// of `members` do not change the result.
    pub fn multi(
        &self,
        name: &str,
        members: &[CategorizationSpec],
    ) -> AcmorphResult<CategorizationSpec> {
        let tuple = ConfigTuple::default().with_hypothesis(name);
        let mut singles = Vec::with_capacity(members.len());
        for member in members {
            match member {
                CategorizationSpec::Single(single) => singles.push(single.clone()),
                CategorizationSpec::Multi(multi) => {
                    return Err(AcmorphError::UnsupportedConfigurationError {
                        reason: format!("{} cannot be nested in another combination", multi.name()),
                    }
                    .in_configuration(tuple))
                }
            }
        }
        let systematic = match singles.first() {
            Some(first) => first.systematic(),
            None => {
                return Err(AcmorphError::UnsupportedConfigurationError {
                    reason: "a combined categorization needs at least one member".to_string(),
                }
                .in_configuration(tuple))
            }
        };
        if let Some(other) = singles.iter().find(|s| s.systematic() != systematic) {
            return Err(AcmorphError::UnsupportedConfigurationError {
                reason: format!(
                    "{} uses {} but {} uses {}",
                    other.name(),
                    other.systematic(),
                    singles[0].name(),
                    systematic
                ),
            }
            .in_configuration(tuple));
        }
        singles.sort_by(|a, b| a.name().cmp(b.name()));
        singles.dedup_by(|a, b| a.name() == b.name());
        let identity = singles
            .iter()
            .map(|single| single.name())
            .collect::<Vec<_>>()
            .join("|");
        Ok(CategorizationSpec::Multi(Arc::new(MultiCategorization {
            name: format!("category_{}", name),
            identity,
            systematic,
            singles,
        })))
    }
    /// The decay-hypothesis categorizations of one systematic variant: one per pure $`HVV`$
    /// coupling at the gluon fusion point, then their combination.
    pub fn standard(&self, systematic: SystematicVariant) -> AcmorphResult<Vec<CategorizationSpec>> {
        let mut specs = acmorph_core::Coupling::VV
            .into_iter()
            .map(|coupling| {
                self.single(ProductionMode::GGH, &Hypothesis::Pure(coupling), systematic)
            })
            .collect::<AcmorphResult<Vec<_>>>()?;
        let name = format!("0P_or_0M_or_a2_or_L1_or_L1Zg{}", systematic.appendname());
        let combined = self.multi(&name, &specs)?;
        specs.push(combined);
        Ok(specs)
    }
    /// [`CategorizationFactory::standard`] for every systematic variant.
    pub fn all_standard(&self) -> AcmorphResult<Vec<CategorizationSpec>> {
        let mut specs = Vec::new();
        for systematic in SystematicVariant::ALL {
            specs.extend(self.standard(systematic)?);
        }
        Ok(specs)
    }
    /// The number of distinct single specs built so far.
    pub fn len(&self) -> usize {
        self.singles.read().len()
    }
    /// Whether no spec was built yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::provider::StoredProbabilities;
    use acmorph_core::{Dataset, EventData, EventSchema};

    fn schema(systematic: SystematicVariant) -> Arc<EventSchema> {
        let variables = InputVariables::for_systematic(systematic);
        Arc::new(
            EventSchema::new(
                vec![
                    variables.n_extra_leptons,
                    variables.n_extra_z,
                    variables.n_jets,
                    variables.n_btagged_jets,
                    variables.zz_mass,
                    variables.zz_pt,
                    variables.pfmet,
                    variables.p_hj,
                    variables.p_vbf_1j,
                    variables.p_aux,
                ],
                vec![variables.jet_qg_likelihoods, variables.jet_phis],
            )
            .unwrap(),
        )
    }

    fn event(n_jets: usize, zz_mass: f64) -> EventData {
        EventData::new(
            vec![0.0, 0.0, n_jets as f64, 0.0, zz_mass, 30.0, 20.0, 0.1, 0.2, 0.3],
            vec![vec![0.5; n_jets], vec![1.0; n_jets]],
        )
    }

    fn flat(_: &str, _: &Event<'_>) -> AcmorphResult<f64> {
        Ok(1.0)
    }

    fn by_jets(inputs: &CategoryInputs<'_>) -> Category {
        match inputs.n_jets {
            0 | 1 => Category::Untagged,
            _ => Category::VBF2jTagged,
        }
    }

    #[test]
    fn test_names() {
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, by_jets);
        let spec = factory
            .single_from_names(ProductionMode::GGH, "0-", "JECUp")
            .unwrap();
        assert_eq!(spec.name(), "category_0M_JECUp");
        assert!(spec.is_systematic());
        let spec = factory
            .single_from_names(ProductionMode::VBF, "fa3proddec-0.5", "Nominal")
            .unwrap();
        assert_eq!(spec.name(), "category_fa3VBFdecM0p5");
        assert!(!spec.is_systematic());
        let specs = factory.standard(SystematicVariant::BTagSFDn).unwrap();
        assert_eq!(specs.len(), 6);
        assert_eq!(specs[0].name(), "category_0P_bTagSFDn");
        assert_eq!(
            specs[5].name(),
            "category_0P_or_0M_or_a2_or_L1_or_L1Zg_bTagSFDn"
        );
        let all = factory.all_standard().unwrap();
        let unique: HashSet<&CategorizationSpec> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_specs_are_shared() {
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, by_jets);
        let a = factory
            .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::Nominal)
            .unwrap();
        let b = factory
            .single_from_names(ProductionMode::GGH, "0+", "")
            .unwrap();
        assert_eq!(a, b);
        match (&a, &b) {
            (CategorizationSpec::Single(a), CategorizationSpec::Single(b)) => {
                assert!(Arc::ptr_eq(a, b))
            }
            _ => panic!("expected single specs"),
        }
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn test_unknown_systematic_fails_at_construction() {
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, by_jets);
        let err = factory
            .single_from_names(ProductionMode::GGH, "0+", "JECSideways")
            .unwrap_err();
        assert!(matches!(
            err.root(),
            AcmorphError::UnknownSystematicVariantError { .. }
        ));
        assert_eq!(
            err.tuple().and_then(|t| t.hypothesis.as_deref()),
            Some("0+")
        );
        assert!(factory.is_empty());
    }

    #[test]
    fn test_variable_names_follow_systematic() {
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, by_jets);
        let spec = factory
            .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::JECDn)
            .unwrap();
        let CategorizationSpec::Single(single) = spec else {
            panic!("expected a single spec")
        };
        let variables = single.variables();
        assert_eq!(variables.n_jets, "nCleanedJetsPt30_jecDn");
        assert_eq!(variables.jet_phis, "jetPhi_jecDn");
        assert_eq!(variables.p_aux, "pAux_JVBF_SIG_ghv1_1_JHUGen_JECDn");
        assert_eq!(
            single.aggregator(SubProcess::VBF).name(),
            "category_p_JJVBF_SIG_0P_JHUGen_JECDn"
        );
        assert_eq!(
            single.aggregator(SubProcess::HJJ).name(),
            "category_p_JJQCD_SIG_Hff0P_JHUGen_JECDn"
        );
    }

    #[test]
    fn test_categorization_is_deterministic() {
        let mut rng = fastrand::Rng::with_seed(7);
        let events: Vec<EventData> = (0..50)
            .map(|_| event(rng.usize(0..4), 110.0 + 30.0 * rng.f64()))
            .collect();
        let source = Dataset::new(schema(SystematicVariant::Nominal), events).unwrap();
        let threshold = |inputs: &CategoryInputs<'_>| {
            if inputs.p_vbf * inputs.zz_mass > 125.0 && inputs.n_jets >= 2 {
                Category::VBF2jTagged
            } else {
                Category::Untagged
            }
        };
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, threshold);
        let spec = factory
            .single(
                ProductionMode::GGH,
                &"fa3dec0.5".parse().unwrap(),
                SystematicVariant::Nominal,
            )
            .unwrap();
        let first = spec.categorize_all(&source).unwrap();
        let second = spec.categorize_all(&source).unwrap();
        assert_eq!(first, second);
        let mut context = CategorizationContext::new();
        for (event, label) in source.iter().zip(&first) {
            assert_eq!(&spec.categorize(&event, &mut context).unwrap(), label);
        }
    }

    #[test]
    fn test_zero_jets_use_sentinel() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let record = {
            let seen = seen.clone();
            move |inputs: &CategoryInputs<'_>| {
                seen.lock()
                    .push((inputs.jet_qg_likelihoods.to_vec(), inputs.jet_phis.to_vec()));
                Category::Untagged
            }
        };
        // the zero-jet event carries no jet arrays at all
        let schema = Arc::new(
            EventSchema::new(
                vec![
                    "nExtraLep",
                    "nExtraZ",
                    "nCleanedJetsPt30",
                    "nCleanedJetsPt30BTagged_bTagSF",
                    "ZZMass",
                    "ZZPt",
                    "PFMET",
                    "p_JQCD_SIG_ghg2_1_JHUGen_JECNominal",
                    "p_JVBF_SIG_ghv1_1_JHUGen_JECNominal",
                    "pAux_JVBF_SIG_ghv1_1_JHUGen_JECNominal",
                ],
                Vec::<String>::new(),
            )
            .unwrap(),
        );
        let source = Dataset::new(
            schema,
            vec![EventData::new(
                vec![0.0, 0.0, 0.0, 0.0, 125.0, 30.0, 20.0, 0.1, 0.2, 0.3],
                vec![],
            )],
        )
        .unwrap();
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, record);
        let spec = factory
            .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::Nominal)
            .unwrap();
        assert_eq!(spec.categorize_all(&source).unwrap(), vec![Category::Untagged]);
        assert_eq!(
            seen.lock()[0],
            (vec![NO_JET_SENTINEL], vec![NO_JET_SENTINEL])
        );
    }

    #[test]
    fn test_missing_field_is_fatal() {
        let schema = Arc::new(EventSchema::new(vec!["nCleanedJetsPt30"], Vec::<String>::new()).unwrap());
        let source = Dataset::new(schema, vec![EventData::new(vec![2.0], vec![])]).unwrap();
        let factory = CategorizationFactory::new(
            &AnalysisConfig::default(),
            StoredProbabilities,
            by_jets,
        );
        let spec = factory
            .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::Nominal)
            .unwrap();
        let err = spec.categorize_all(&source).unwrap_err();
        assert!(matches!(err.root(), AcmorphError::MissingFieldError { .. }));
        assert_eq!(
            err.tuple().and_then(|t| t.production),
            Some(ProductionMode::GGH)
        );
    }

    #[test]
    fn test_vbf_tag_takes_precedence() {
        // the predicate only sees probabilities, so key the stub on the VBF probability, which
        // differs between the hypotheses through their coefficients and multipliers
        let factory = CategorizationFactory::new(
            &AnalysisConfig::default(),
            flat,
            |inputs: &CategoryInputs<'_>| {
                if (inputs.p_vbf - 1.0).abs() < 1e-9 {
                    Category::VBF2jTagged
                } else {
                    Category::Untagged
                }
            },
        );
        let sm = factory
            .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::Nominal)
            .unwrap();
        let mixes: Vec<CategorizationSpec> = ["fa3dec0.5", "fa2dec0.5"]
            .into_iter()
            .map(|h| {
                factory
                    .single(
                        ProductionMode::GGH,
                        &h.parse().unwrap(),
                        SystematicVariant::Nominal,
                    )
                    .unwrap()
            })
            .collect();
        let source = Dataset::new(
            schema(SystematicVariant::Nominal),
            vec![event(2, 125.0)],
        )
        .unwrap();
        let mut context = CategorizationContext::new();
        let event = source.event(0).unwrap();
        assert_eq!(
            sm.categorize(&event, &mut context).unwrap(),
            Category::VBF2jTagged
        );
        for mix in &mixes {
            assert_eq!(
                mix.categorize(&event, &mut context).unwrap(),
                Category::Untagged
            );
        }
        let combined = factory
            .multi("sm_or_mixes", &[sm, mixes[0].clone(), mixes[1].clone()])
            .unwrap();
        assert_eq!(combined.name(), "category_sm_or_mixes");
        assert_eq!(
            combined.categorize(&event, &mut context).unwrap(),
            Category::VBF2jTagged
        );
    }

    #[test]
    fn test_members_are_not_recomputed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let predicate = {
            let calls = calls.clone();
            move |_: &CategoryInputs<'_>| {
                calls.fetch_add(1, Ordering::Relaxed);
                Category::Untagged
            }
        };
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, predicate);
        let specs = factory.standard(SystematicVariant::Nominal).unwrap();
        let source = Dataset::new(
            schema(SystematicVariant::Nominal),
            vec![event(1, 125.0), event(3, 125.0)],
        )
        .unwrap();
        let mut context = CategorizationContext::new();
        for event in source.iter() {
            for spec in &specs {
                assert_eq!(spec.categorize(&event, &mut context).unwrap(), Category::Untagged);
            }
        }
        assert_eq!(calls.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_combine_labels() {
        use Category::*;
        assert_eq!(
            combine_labels(&[("a", Untagged), ("b", VHHadrTagged), ("c", VBF2jTagged)]).unwrap(),
            VBF2jTagged
        );
        assert_eq!(
            combine_labels(&[("a", Untagged), ("b", VHHadrTagged), ("c", VHLeptTagged)]).unwrap(),
            VHHadrTagged
        );
        assert_eq!(
            combine_labels(&[("a", VHLeptTagged), ("b", VHLeptTagged)]).unwrap(),
            VHLeptTagged
        );
        let err = combine_labels(&[("a", Untagged), ("b", VBF1jTagged)]).unwrap_err();
        match err {
            AcmorphError::CategorizationDisagreementError { labels } => {
                assert_eq!(labels, "a=Untagged, b=VBF1jTagged")
            }
            other => panic!("unexpected error {}", other),
        }
        assert!(combine_labels(&[]).is_err());
    }

    #[test]
    fn test_disagreement_is_an_error() {
        let factory = CategorizationFactory::new(
            &AnalysisConfig::default(),
            flat,
            |inputs: &CategoryInputs<'_>| {
                if (inputs.p_vbf - 1.0).abs() < 1e-9 {
                    Category::VBF1jTagged
                } else {
                    Category::Untagged
                }
            },
        );
        let members = [
            factory
                .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::Nominal)
                .unwrap(),
            factory
                .single(
                    ProductionMode::GGH,
                    &"fa3dec0.5".parse().unwrap(),
                    SystematicVariant::Nominal,
                )
                .unwrap(),
        ];
        let combined = factory.multi("disagree", &members).unwrap();
        let source = Dataset::new(
            schema(SystematicVariant::Nominal),
            vec![event(2, 125.0)],
        )
        .unwrap();
        let err = combined.categorize_all(&source).unwrap_err();
        assert!(matches!(
            err.root(),
            AcmorphError::CategorizationDisagreementError { .. }
        ));
        assert_eq!(
            err.tuple().and_then(|t| t.hypothesis.as_deref()),
            Some("category_disagree")
        );
    }

    #[test]
    fn test_mixed_systematics_cannot_combine() {
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, by_jets);
        let members = [
            factory
                .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::Nominal)
                .unwrap(),
            factory
                .single(ProductionMode::GGH, &Hypothesis::sm(), SystematicVariant::JECUp)
                .unwrap(),
        ];
        assert!(factory.multi("mixed", &members).is_err());
    }

    #[test]
    fn test_combinations_are_identified_by_members() {
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, by_jets);
        let [a, b, c] = ["0+", "0-", "a2"].map(|hypothesis| {
            factory
                .single_from_names(ProductionMode::GGH, hypothesis, "Nominal")
                .unwrap()
        });
        let first = factory.multi("first", &[a.clone(), b.clone()]).unwrap();
        let renamed = factory.multi("second", &[b.clone(), a.clone(), b.clone()]).unwrap();
        assert_eq!(first, renamed);
        let unique: HashSet<&CategorizationSpec> = [&first, &renamed].into_iter().collect();
        assert_eq!(unique.len(), 1);
        let other = factory.multi("first", &[a.clone(), c.clone()]).unwrap();
        assert_eq!(other.name(), first.name());
        assert_ne!(first, other);
        assert_ne!(first, a);
        let CategorizationSpec::Multi(repeated) = factory.multi("x", &[a.clone(), b, a]).unwrap()
        else {
            panic!("expected a combination")
        };
        let names: Vec<&str> = repeated.singles().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["category_0M", "category_0P"]);
        assert_eq!(repeated.identity(), "category_0M|category_0P");
    }

    #[test]
    fn test_same_name_different_members_do_not_share_labels() {
        let factory = CategorizationFactory::new(&AnalysisConfig::default(), flat, by_jets);
        let single = |hypothesis: &str| {
            factory
                .single_from_names(ProductionMode::GGH, hypothesis, "Nominal")
                .unwrap()
        };
        let agreeing = factory
            .multi("combined", &[single("0+"), single("0-")])
            .unwrap();
        let one = factory.multi("combined", &[single("a2")]).unwrap();
        let source = Dataset::new(schema(SystematicVariant::Nominal), vec![event(3, 125.0)])
            .unwrap();
        let event = source.event(0).unwrap();
        let mut context = CategorizationContext::new();
        assert_eq!(
            agreeing.categorize(&event, &mut context).unwrap(),
            Category::VBF2jTagged
        );
        assert_eq!(
            one.categorize(&event, &mut context).unwrap(),
            Category::VBF2jTagged
        );
        assert_eq!(context.last("category_a2"), Some(Category::VBF2jTagged));
        assert_eq!(
            context.last("category_0M|category_0P"),
            Some(Category::VBF2jTagged)
        );
    }
}
