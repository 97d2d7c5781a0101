use std::fmt::Display;

use acmorph_core::{
    AcmorphResult, Coupling, CouplingPoint, CrossSectionComponent, CrossSectionTable, Event,
    Monomial, SystematicVariant,
};

use crate::provider::MatrixElementProvider;

/// The production sub-processes whose probabilities enter the category decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubProcess {
    /// Gluon fusion with two jets
    HJJ,
    /// Vector boson fusion
    VBF,
    /// Associated production with a hadronic $`Z`$
    ZH,
    /// Associated production with a hadronic $`W`$
    WH,
}

impl SubProcess {
    /// Every sub-process, in the order the category decision takes them.
    pub const ALL: [SubProcess; 4] = [
        SubProcess::HJJ,
        SubProcess::VBF,
        SubProcess::ZH,
        SubProcess::WH,
    ];

    /// The prefix of every matrix-element term of this sub-process.
    pub fn prefix(&self) -> &'static str {
        match self {
            SubProcess::HJJ => "p_JJQCD_SIG",
            SubProcess::VBF => "p_JJVBF_SIG",
            SubProcess::ZH => "p_HadZH_SIG",
            SubProcess::WH => "p_HadWH_SIG",
        }
    }

    /// The couplings which enter the production vertex, reference coupling first.
    pub fn couplings(&self) -> &'static [Coupling] {
        match self {
            SubProcess::HJJ => &[Coupling::Ghg2, Coupling::Ghg4],
            SubProcess::VBF | SubProcess::ZH => &Coupling::VV,
            SubProcess::WH => &[
                Coupling::G1,
                Coupling::G2,
                Coupling::G4,
                Coupling::G1Prime2,
            ],
        }
    }

    /// The name the matrix element gives `coupling` at this vertex.
    pub fn vertex_name(&self, coupling: Coupling) -> Option<String> {
        if !self.couplings().contains(&coupling) {
            return None;
        }
        let boson = match self {
            SubProcess::HJJ => return Some(coupling.name().to_string()),
            SubProcess::VBF => "ghv",
            SubProcess::ZH => "ghz",
            SubProcess::WH => "ghw",
        };
        match coupling {
            Coupling::GhZGs1Prime2 => Some(coupling.name().to_string()),
            other => Some(other.name().replacen('g', boson, 1)),
        }
    }

    /// The cross section whose ratio normalizes this sub-process.
    pub fn component(&self) -> CrossSectionComponent {
        match self {
            SubProcess::HJJ => CrossSectionComponent::HJJ,
            SubProcess::VBF => CrossSectionComponent::VBF,
            SubProcess::ZH => CrossSectionComponent::ZH,
            SubProcess::WH => CrossSectionComponent::WH,
        }
    }

    /// The matrix-element terms of this sub-process for one jet configuration: one square term
    /// per coupling, then the interference of the reference coupling with each of the others.
    pub fn terms(&self, systematic: SystematicVariant) -> Vec<(String, Monomial)> {
        let jec = systematic.jec_term_suffix();
        let couplings = self.couplings();
        let reference = couplings[0];
        let vertex = |c: Coupling| self.vertex_name(c).unwrap_or_default();
        let squares = couplings.iter().map(|c| {
            (
                format!("{}_{}_1_JHUGen_{}", self.prefix(), vertex(*c), jec),
                Monomial::new([(c.name(), 2)]),
            )
        });
        let interference = couplings[1..].iter().map(|c| {
            (
                format!(
                    "{}_{}_1_{}_1_JHUGen_{}",
                    self.prefix(),
                    vertex(reference),
                    vertex(*c),
                    jec
                ),
                Monomial::new([(reference.name(), 1), (c.name(), 1)]),
            )
        });
        squares.chain(interference).collect()
    }
}

impl Display for SubProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubProcess::HJJ => write!(f, "HJJ"),
            SubProcess::VBF => write!(f, "VBF"),
            SubProcess::ZH => write!(f, "ZH"),
            SubProcess::WH => write!(f, "WH"),
        }
    }
}

/// One matrix-element term with its coefficient at the hypothesis.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityTerm {
    /// The name passed to the [`MatrixElementProvider`]
    pub name: String,
    /// The monomial of the couplings which weights this term
    pub monomial: Monomial,
    /// The monomial evaluated at the hypothesis
    pub coefficient: f64,
}

/// The coupling-weighted probability of one sub-process.
#[derive(Clone, Debug, PartialEq)]
pub enum EffectiveProbability {
    /// The sub-process cannot happen at this hypothesis and is exactly zero.
    Zero,
    /// $`m \sum_t c_t\,p_t(\text{event})`$
    Weighted {
        /// Terms with a nonzero coefficient
        terms: Vec<ProbabilityTerm>,
        /// Cross-section ratio which puts the sum on the Standard Model scale
        multiplier: f64,
    },
}

impl EffectiveProbability {
    /// Evaluate the probability for one event. [`EffectiveProbability::Zero`] never calls the
    /// provider.
    pub fn evaluate(
        &self,
        provider: &dyn MatrixElementProvider,
        event: &Event<'_>,
    ) -> AcmorphResult<f64> {
        match self {
            EffectiveProbability::Zero => Ok(0.0),
            EffectiveProbability::Weighted { terms, multiplier } => {
                let sum = terms.iter().try_fold(0.0, |acc, term| {
                    Ok::<f64, acmorph_core::AcmorphError>(acc + term.coefficient * provider.probability(&term.name, event)?)
                })?;
                Ok(sum * multiplier)
            }
        }
    }
    /// The weighted terms, empty for [`EffectiveProbability::Zero`].
    pub fn terms(&self) -> &[ProbabilityTerm] {
        match self {
            EffectiveProbability::Zero => &[],
            EffectiveProbability::Weighted { terms, .. } => terms,
        }
    }
}

/// The effective probability of one sub-process at one hypothesis and systematic variant.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityAggregator {
    sub_process: SubProcess,
    name: String,
    probability: EffectiveProbability,
}

impl ProbabilityAggregator {
    /// Resolve the terms of `sub_process` at `point`.
    ///
    /// `label` is the path-safe name of the hypothesis the point belongs to and only names the
    /// aggregator. Terms whose coefficient vanishes are dropped. $`WH`$ production cannot
    /// proceed through a photon, so any nonzero `ghzgs1prime2` makes it identically zero.
    pub fn new(
        sub_process: SubProcess,
        point: &CouplingPoint,
        label: &str,
        systematic: SystematicVariant,
        table: &CrossSectionTable,
    ) -> AcmorphResult<Self> {
        let name = format!(
            "category_{}_{}_JHUGen_{}",
            sub_process.prefix(),
            label,
            systematic.jec_term_suffix()
        );
        if sub_process == SubProcess::WH && point.get(Coupling::GhZGs1Prime2.name())? != 0.0 {
            tracing::debug!(name = %name, "no WH probability with a Z-photon coupling");
            return Ok(Self {
                sub_process,
                name,
                probability: EffectiveProbability::Zero,
            });
        }
        let mut terms = Vec::new();
        for (term, monomial) in sub_process.terms(systematic) {
            let coefficient = monomial.evaluate(point)?;
            if coefficient != 0.0 {
                terms.push(ProbabilityTerm {
                    name: term,
                    monomial,
                    coefficient,
                });
            }
        }
        let multiplier = table.categorization_multiplier(sub_process.component(), point)?;
        tracing::debug!(name = %name, terms = terms.len(), multiplier, "resolved probability");
        Ok(Self {
            sub_process,
            name,
            probability: EffectiveProbability::Weighted { terms, multiplier },
        })
    }
    /// The sub-process.
    pub fn sub_process(&self) -> SubProcess {
        self.sub_process
    }
    /// A name which identifies the computation, unique per sub-process, hypothesis and jet
    /// configuration.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The resolved probability.
    pub fn probability(&self) -> &EffectiveProbability {
        &self.probability
    }
    /// Evaluate the probability for one event.
    pub fn evaluate(
        &self,
        provider: &dyn MatrixElementProvider,
        event: &Event<'_>,
    ) -> AcmorphResult<f64> {
        self.probability.evaluate(provider, event)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use approx::assert_relative_eq;

    use super::*;
    use acmorph_core::{AcmorphError, EventData, EventSchema, Hypothesis, ProductionMode};

    fn point(hypothesis: &str) -> CouplingPoint {
        hypothesis
            .parse::<Hypothesis>()
            .unwrap()
            .coupling_point(ProductionMode::GGH)
            .unwrap()
    }

    #[test]
    fn test_term_names() {
        let names: Vec<String> = SubProcess::VBF
            .terms(SystematicVariant::JECUp)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names.len(), 9);
        assert_eq!(names[0], "p_JJVBF_SIG_ghv1_1_JHUGen_JECUp");
        assert_eq!(names[3], "p_JJVBF_SIG_ghv1prime2_1_JHUGen_JECUp");
        assert_eq!(names[4], "p_JJVBF_SIG_ghzgs1prime2_1_JHUGen_JECUp");
        assert_eq!(names[6], "p_JJVBF_SIG_ghv1_1_ghv4_1_JHUGen_JECUp");
        assert_eq!(names[8], "p_JJVBF_SIG_ghv1_1_ghzgs1prime2_1_JHUGen_JECUp");
        let hjj: Vec<String> = SubProcess::HJJ
            .terms(SystematicVariant::JESDn)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            hjj,
            vec![
                "p_JJQCD_SIG_ghg2_1_JHUGen_JECNominal",
                "p_JJQCD_SIG_ghg4_1_JHUGen_JECNominal",
                "p_JJQCD_SIG_ghg2_1_ghg4_1_JHUGen_JECNominal",
            ]
        );
        let wh = SubProcess::WH.terms(SystematicVariant::Nominal);
        assert_eq!(wh.len(), 7);
        assert!(wh.iter().all(|(name, _)| name.starts_with("p_HadWH_SIG_ghw")));
        assert_eq!(
            SubProcess::ZH.vertex_name(Coupling::G1Prime2).as_deref(),
            Some("ghz1prime2")
        );
    }

    #[test]
    fn test_standard_model_weights() {
        let table = CrossSectionTable::default();
        let sm = point("0+");
        let vbf = ProbabilityAggregator::new(
            SubProcess::VBF,
            &sm,
            "0P",
            SystematicVariant::Nominal,
            &table,
        )
        .unwrap();
        assert_eq!(vbf.name(), "category_p_JJVBF_SIG_0P_JHUGen_JECNominal");
        match vbf.probability() {
            EffectiveProbability::Weighted { terms, multiplier } => {
                assert_eq!(terms.len(), 1);
                assert_eq!(terms[0].name, "p_JJVBF_SIG_ghv1_1_JHUGen_JECNominal");
                assert_relative_eq!(*multiplier, 1.0, epsilon = 1e-12);
            }
            EffectiveProbability::Zero => panic!("VBF is allowed at the Standard Model"),
        }
        let hjj = ProbabilityAggregator::new(
            SubProcess::HJJ,
            &sm,
            "Hff0P",
            SystematicVariant::Nominal,
            &table,
        )
        .unwrap();
        assert_eq!(hjj.probability().terms().len(), 1);
    }

    #[test]
    fn test_mixture_keeps_interference() {
        let table = CrossSectionTable::default();
        let mix = point("fa3dec0.5");
        let zh = ProbabilityAggregator::new(
            SubProcess::ZH,
            &mix,
            "fa3dec0p5",
            SystematicVariant::Nominal,
            &table,
        )
        .unwrap();
        let names: Vec<&str> = zh
            .probability()
            .terms()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "p_HadZH_SIG_ghz1_1_JHUGen_JECNominal",
                "p_HadZH_SIG_ghz4_1_JHUGen_JECNominal",
                "p_HadZH_SIG_ghz1_1_ghz4_1_JHUGen_JECNominal",
            ]
        );
        let g4 = mix.get("g4").unwrap();
        assert_relative_eq!(zh.probability().terms()[1].coefficient, g4 * g4);
        assert_relative_eq!(zh.probability().terms()[2].coefficient, g4);
    }

    #[test]
    fn test_weighted_sum() {
        let table = CrossSectionTable::default();
        let mix = point("fa3dec0.5");
        let vbf = ProbabilityAggregator::new(
            SubProcess::VBF,
            &mix,
            "fa3dec0p5",
            SystematicVariant::Nominal,
            &table,
        )
        .unwrap();
        let schema = EventSchema::new(Vec::<String>::new(), Vec::<String>::new()).unwrap();
        let data = EventData::new(vec![], vec![]);
        let event = Event::new(&data, &schema, 0);
        let provider = |_: &str, _: &Event<'_>| Ok::<_, AcmorphError>(2.0);
        let (terms, multiplier) = match vbf.probability() {
            EffectiveProbability::Weighted { terms, multiplier } => (terms, *multiplier),
            EffectiveProbability::Zero => panic!("VBF is allowed for fa3"),
        };
        let expected: f64 = terms.iter().map(|t| 2.0 * t.coefficient).sum::<f64>() * multiplier;
        assert_relative_eq!(vbf.evaluate(&provider, &event).unwrap(), expected);
    }

    #[test]
    fn test_wh_with_photon_coupling_is_zero() {
        let table = CrossSectionTable::default();
        let calls = AtomicUsize::new(0);
        let provider = |_: &str, _: &Event<'_>| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok::<_, AcmorphError>(1.0)
        };
        let wh = ProbabilityAggregator::new(
            SubProcess::WH,
            &point("L1Zg"),
            "L1Zg",
            SystematicVariant::Nominal,
            &table,
        )
        .unwrap();
        assert_eq!(wh.probability(), &EffectiveProbability::Zero);
        let schema = EventSchema::new(Vec::<String>::new(), Vec::<String>::new()).unwrap();
        let data = EventData::new(vec![], vec![]);
        let event = Event::new(&data, &schema, 0);
        assert_eq!(wh.evaluate(&provider, &event).unwrap(), 0.0);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
}
