use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    hypotheses::{
        Coupling, G1PRIME2_HZZ, G1PRIME2_VBF, G1PRIME2_WH, G1PRIME2_ZH, G2_HZZ, G2_VBF, G2_WH,
        G2_ZH, G4_HZZ, G4_VBF, G4_WH, G4_ZH, GHG4_HJJ, GHZGS1PRIME2_HZZ, GHZGS1PRIME2_VBF,
        GHZGS1PRIME2_ZH,
    },
    utils::enums::ProductionMode,
    AcmorphError, AcmorphResult, CouplingPoint, Monomial,
};

/// Standard Model $`H\to ZZ\to 2\ell 2\ell'`$ branching ratio, including the $`\tau`$ final
/// states.
pub const SM_BR_4L: f64 = 5.897e-05 * 3.0;

/// Correction for the change in the generated associated-production cross sections between the
/// two generator versions used for the samples.
const ZH_CROSS_SECTION_CORRECTION: f64 = 158.49737883504775;

/// A cross section which is a quadratic form in the couplings,
/// $`\sigma(g) = \sum_{k} c_k\, m_k(g)`$ over degree-two monomials $`m_k`$.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadraticForm {
    terms: Vec<(Monomial, f64)>,
}

impl QuadraticForm {
    /// Build a form from the pure cross sections $`\sigma_i`$ (at $`g_i = 1`$) and the raw cross
    /// sections of each pairwise mixture, which were generated at
    /// $`(g_i, g_j) = (\text{constants}_i, \text{constants}_j)`$.
    ///
    /// The pure parts are subtracted from each raw mixture and the remainder is divided by
    /// $`g_i g_j`$, leaving the interference coefficient.
    fn from_generated(
        couplings: &[Coupling],
        pure: &[f64],
        constants: &[f64],
        mixtures: &[((usize, usize), f64)],
    ) -> Self {
        let mut terms: Vec<(Monomial, f64)> = couplings
            .iter()
            .zip(pure)
            .map(|(c, sigma)| (Monomial::new([(c.name(), 2)]), *sigma))
            .collect();
        for ((i, j), raw) in mixtures {
            let (gi, gj) = (constants[*i], constants[*j]);
            let interference =
                (raw - gi * gi * pure[*i] - gj * gj * pure[*j]) / (gi * gj);
            terms.push((
                Monomial::new([(couplings[*i].name(), 1), (couplings[*j].name(), 1)]),
                interference,
            ));
        }
        Self { terms }
    }

    /// Zero every interference term which involves `coupling`.
    fn without_interference(mut self, coupling: Coupling) -> Self {
        for (monomial, coefficient) in self.terms.iter_mut() {
            if monomial.degree() == 2
                && monomial.exponent(coupling.name()) == 1
            {
                *coefficient = 0.0;
            }
        }
        self
    }

    /// The terms of the form.
    pub fn terms(&self) -> &[(Monomial, f64)] {
        &self.terms
    }

    /// The coefficient of the pure term of `coupling`.
    pub fn pure(&self, coupling: Coupling) -> f64 {
        self.terms
            .iter()
            .find(|(m, _)| m.exponent(coupling.name()) == 2)
            .map(|(_, c)| *c)
            .unwrap_or(0.0)
    }

    /// Evaluate the form at a coupling point.
    pub fn evaluate(&self, point: &CouplingPoint) -> AcmorphResult<f64> {
        self.terms.iter().try_fold(0.0, |acc, (monomial, coefficient)| {
            if *coefficient == 0.0 {
                Ok(acc)
            } else {
                Ok(acc + coefficient * monomial.evaluate(point)?)
            }
        })
    }
}

/// The vertices whose cross sections are tabulated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossSectionComponent {
    /// $`H\to ZZ\to 2e2\mu`$ decay
    Decay,
    /// Vector boson fusion production
    VBF,
    /// $`ZH`$ production
    ZH,
    /// $`WH`$ production
    WH,
    /// Gluon fusion with two jets
    HJJ,
}

impl CrossSectionComponent {
    /// The components whose product is the total cross section of `production`.
    pub fn for_production(production: ProductionMode) -> Vec<CrossSectionComponent> {
        match production {
            ProductionMode::GGH | ProductionMode::TTH => vec![CrossSectionComponent::Decay],
            ProductionMode::VBF => vec![CrossSectionComponent::Decay, CrossSectionComponent::VBF],
            ProductionMode::ZH => vec![CrossSectionComponent::Decay, CrossSectionComponent::ZH],
            ProductionMode::WH => vec![CrossSectionComponent::Decay, CrossSectionComponent::WH],
            ProductionMode::HJJ => vec![CrossSectionComponent::Decay, CrossSectionComponent::HJJ],
        }
    }
}

impl Display for CrossSectionComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrossSectionComponent::Decay => write!(f, "decay"),
            CrossSectionComponent::VBF => write!(f, "VBF"),
            CrossSectionComponent::ZH => write!(f, "ZH"),
            CrossSectionComponent::WH => write!(f, "WH"),
            CrossSectionComponent::HJJ => write!(f, "HJJ"),
        }
    }
}

/// Generator-level cross sections of every vertex as quadratic forms in the couplings.
///
/// The absolute scale of each form is arbitrary; only ratios are physical. Interference between
/// the CP-even couplings and `g4` vanishes without cuts and is set to exactly zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossSectionTable {
    decay: QuadraticForm,
    vbf: QuadraticForm,
    zh: QuadraticForm,
    wh: QuadraticForm,
    hjj: QuadraticForm,
}

// pair order of the raw mixture cross sections
const PAIRS: [(usize, usize); 10] = [
    (0, 1),
    (0, 2),
    (0, 3),
    (0, 4),
    (1, 2),
    (1, 3),
    (1, 4),
    (2, 3),
    (2, 4),
    (3, 4),
];

fn with_pairs(values: [f64; 10]) -> Vec<((usize, usize), f64)> {
    PAIRS.into_iter().zip(values).collect()
}

impl Default for CrossSectionTable {
    fn default() -> Self {
        let vv = Coupling::VV;
        let decay = QuadraticForm::from_generated(
            &vv,
            &[
                7.1517173,
                2.5849908,
                1.0954288,
                0.48754258e-07,
                0.12338393e-06,
            ],
            &[1.0, G2_HZZ, G4_HZZ, G1PRIME2_HZZ, GHZGS1PRIME2_HZZ],
            &with_pairs([
                26.073377, 14.278034, 0.23727827, 13.145473, 14.3016, 2.33083, 2.33096, 14.3016,
                14.3019, 16.472524,
            ]),
        )
        .without_interference(Coupling::G4);
        let vbf = QuadraticForm::from_generated(
            &vv,
            &[
                968.674284006,
                13102.7106117,
                10909.5390002,
                2.083097999e-4,
                0.49845301e-04,
            ],
            &[1.0, G2_VBF, G4_VBF, G1PRIME2_VBF, GHZGS1PRIME2_VBF],
            &with_pairs([
                2207.72848655,
                1937.20646111,
                2861.21349769,
                1410.5494,
                1936.8416,
                2507.0486,
                2433.0553,
                1939.6777,
                1865.6689,
                916.21310,
            ]),
        )
        .without_interference(Coupling::G4);
        let r = ZH_CROSS_SECTION_CORRECTION;
        let zh = QuadraticForm::from_generated(
            &vv,
            &[9022.36 * r, 713123.0 * r, 434763.7 * r, 33652.46e-6 * r, 3.4592597],
            &[1.0, G2_ZH, G4_ZH, G1PRIME2_ZH, GHZGS1PRIME2_ZH],
            &with_pairs([
                4258.966 * r,
                18040.66 * r,
                6852.307 * r,
                3479412.2,
                2.87412e6,
                4.48796e6,
                4.48622e6,
                2.87379e6,
                2.8737e6,
                1.43739e6,
            ]),
        )
        .without_interference(Coupling::G4);
        let r = 3.0 * ZH_CROSS_SECTION_CORRECTION;
        // no Zγ vertex in WH: the pure and interference terms of ghzgs1prime2 vanish, so its
        // generation constant only needs to be nonzero
        let wh = QuadraticForm::from_generated(
            &vv,
            &[30998.54 * r, 3106339.0 * r, 2028656.0 * r, 11234.91e-5 * r, 0.0],
            &[1.0, G2_WH, G4_WH, G1PRIME2_WH, 1.0],
            &with_pairs([
                16486.68 * r,
                62001.57 * r,
                25302.37 * r,
                0.0,
                2.96308e7,
                4.47663e7,
                0.0,
                2.96285e7,
                0.0,
                0.0,
            ]),
        )
        .without_interference(Coupling::G4)
        .without_interference(Coupling::GhZGs1Prime2);
        let hjj = QuadraticForm::from_generated(
            &[Coupling::Ghg2, Coupling::Ghg4],
            &[14583.61, 14397.13],
            &[1.0, GHG4_HJJ],
            &[((0, 1), 29169.2)],
        )
        .without_interference(Coupling::Ghg4);
        Self {
            decay,
            vbf,
            zh,
            wh,
            hjj,
        }
    }
}

impl CrossSectionTable {
    /// The quadratic form of one vertex.
    pub fn form(&self, component: CrossSectionComponent) -> &QuadraticForm {
        match component {
            CrossSectionComponent::Decay => &self.decay,
            CrossSectionComponent::VBF => &self.vbf,
            CrossSectionComponent::ZH => &self.zh,
            CrossSectionComponent::WH => &self.wh,
            CrossSectionComponent::HJJ => &self.hjj,
        }
    }

    /// Total cross section of `production` at `point`, the product of its vertices' forms.
    pub fn xsec(&self, production: ProductionMode, point: &CouplingPoint) -> AcmorphResult<f64> {
        CrossSectionComponent::for_production(production)
            .into_iter()
            .try_fold(1.0, |acc, component| {
                Ok(acc * self.form(component).evaluate(point)?)
            })
    }

    /// The Standard Model coupling point: `g1 = ghg2 = 1`, everything else off.
    pub fn sm_point() -> CouplingPoint {
        CouplingPoint::new(Coupling::ALL.into_iter().map(|c| {
            (
                c.name(),
                if matches!(c, Coupling::G1 | Coupling::Ghg2) {
                    1.0
                } else {
                    0.0
                },
            )
        }))
    }

    /// $`\sigma(\text{point}) / \sigma(\text{SM})`$ for `production`.
    pub fn ratio_to_sm(&self, production: ProductionMode, point: &CouplingPoint) -> AcmorphResult<f64> {
        let sm = self.xsec(production, &Self::sm_point())?;
        positive(sm, || format!("Standard Model {} cross section", production))?;
        Ok(self.xsec(production, point)? / sm)
    }

    /// Rescale `sm_yield`, the yield of `production` at the Standard Model, to `point`.
    pub fn yield_scale(
        &self,
        production: ProductionMode,
        point: &CouplingPoint,
        sm_yield: f64,
    ) -> AcmorphResult<f64> {
        Ok(sm_yield * self.ratio_to_sm(production, point)?)
    }

    /// Expected yield of `production` in the $`4\ell`$ final state at `point`, for an integrated
    /// luminosity in fb$`^{-1}`$, before detector efficiency.
    pub fn expected_yield(
        &self,
        production: ProductionMode,
        point: &CouplingPoint,
        luminosity: f64,
    ) -> AcmorphResult<f64> {
        Ok(production.sm_cross_section()
            * SM_BR_4L
            * luminosity
            * self.ratio_to_sm(production, point)?)
    }

    /// The signed fraction of the cross section of `component` which comes from `coupling`,
    /// $`f_i = \mathrm{sign}(g_i)\,\sigma_i g_i^2 / \sum_j \sigma_j g_j^2`$.
    pub fn fai(
        &self,
        component: CrossSectionComponent,
        point: &CouplingPoint,
        coupling: Coupling,
    ) -> AcmorphResult<f64> {
        let form = self.form(component);
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (monomial, sigma) in form.terms().iter().filter(|(m, _)| {
            m.factors().iter().any(|(_, exponent)| *exponent == 2)
        }) {
            let value = sigma * monomial.evaluate(point)?;
            denominator += value;
            if monomial.exponent(coupling.name()) == 2 {
                numerator = value;
            }
        }
        positive(denominator, || format!("{} cross section at {}", component, point))?;
        Ok(point.get(coupling.name())?.signum() * numerator / denominator)
    }

    /// The factor which puts a per-event probability for `component` on the scale the category
    /// predicate was tuned with.
    ///
    /// For the $`H+2`$ jet vertex this is $`\sigma(\text{SM}) / \sigma(g)`$. For the vector boson
    /// production vertices it is
    /// $`[\sigma_P(\text{SM}) / \sigma_P(g)] / [\sigma_{ggH}(\text{SM}) / \sigma_{ggH}(g)]`$, which
    /// removes the decay part so that only the production vertex is normalized.
    pub fn categorization_multiplier(
        &self,
        component: CrossSectionComponent,
        point: &CouplingPoint,
    ) -> AcmorphResult<f64> {
        let sm_point = Self::sm_point();
        let production = match component {
            CrossSectionComponent::HJJ => {
                let at_point = self.hjj.evaluate(point)?;
                positive(at_point, || format!("HJJ cross section at {}", point))?;
                return Ok(self.hjj.evaluate(&sm_point)? / at_point);
            }
            CrossSectionComponent::VBF => ProductionMode::VBF,
            CrossSectionComponent::ZH => ProductionMode::ZH,
            CrossSectionComponent::WH => ProductionMode::WH,
            CrossSectionComponent::Decay => return Ok(1.0),
        };
        let at_point = self.xsec(production, point)?;
        positive(at_point, || format!("{} cross section at {}", production, point))?;
        let ggh_at_point = self.xsec(ProductionMode::GGH, point)?;
        positive(ggh_at_point, || format!("ggH cross section at {}", point))?;
        let production_ratio = self.xsec(production, &sm_point)? / at_point;
        let ggh_ratio = self.xsec(ProductionMode::GGH, &sm_point)? / ggh_at_point;
        Ok(production_ratio / ggh_ratio)
    }
}

fn positive<F: FnOnce() -> String>(value: f64, what: F) -> AcmorphResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(AcmorphError::NonPositiveCrossSectionError {
            reason: format!("{} is {}", what(), value),
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::hypotheses::Hypothesis;

    #[test]
    fn test_sm_ratio_is_one() {
        let table = CrossSectionTable::default();
        for production in ProductionMode::ALL {
            let ratio = table
                .ratio_to_sm(production, &CrossSectionTable::sm_point())
                .unwrap();
            assert_relative_eq!(ratio, 1.0);
        }
    }

    #[test]
    fn test_decay_constants_equalize_cross_sections() {
        let table = CrossSectionTable::default();
        let sm = table
            .xsec(ProductionMode::GGH, &CrossSectionTable::sm_point())
            .unwrap();
        let pseudoscalar = Hypothesis::Pure(Coupling::G4)
            .coupling_point(ProductionMode::GGH)
            .unwrap();
        let ps = table.xsec(ProductionMode::GGH, &pseudoscalar).unwrap();
        assert_relative_eq!(ps / sm, 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_decay_mixture_is_half_and_half() {
        let table = CrossSectionTable::default();
        let mix: Hypothesis = "fa3dec0.5".parse().unwrap();
        let point = mix.coupling_point(ProductionMode::GGH).unwrap();
        let fa3 = table
            .fai(CrossSectionComponent::Decay, &point, Coupling::G4)
            .unwrap();
        assert_relative_eq!(fa3, 0.5, epsilon = 1e-2);
        let negative: Hypothesis = "fa3proddec-0.5".parse().unwrap();
        let point = negative.coupling_point(ProductionMode::VBF).unwrap();
        assert!(
            table
                .fai(CrossSectionComponent::Decay, &point, Coupling::G4)
                .unwrap()
                < 0.0
        );
    }

    #[test]
    fn test_pseudoscalar_interference_vanishes() {
        let table = CrossSectionTable::default();
        let plus: Hypothesis = "fa3dec0.5".parse().unwrap();
        let minus = Hypothesis::mix(
            crate::hypotheses::MixKind::Decay,
            [
                (Coupling::G1, crate::Sign::Positive),
                (Coupling::G4, crate::Sign::Negative),
            ],
        )
        .unwrap();
        let a = table
            .xsec(ProductionMode::GGH, &plus.coupling_point(ProductionMode::GGH).unwrap())
            .unwrap();
        let b = table
            .xsec(ProductionMode::GGH, &minus.coupling_point(ProductionMode::GGH).unwrap())
            .unwrap();
        assert_relative_eq!(a, b);
    }

    #[test]
    fn test_categorization_multiplier() {
        let table = CrossSectionTable::default();
        let sm = CrossSectionTable::sm_point();
        for component in [
            CrossSectionComponent::VBF,
            CrossSectionComponent::ZH,
            CrossSectionComponent::WH,
            CrossSectionComponent::HJJ,
        ] {
            assert_relative_eq!(table.categorization_multiplier(component, &sm).unwrap(), 1.0);
        }
        let point = Hypothesis::Pure(Coupling::G4)
            .coupling_point(ProductionMode::VBF)
            .unwrap();
        let multiplier = table
            .categorization_multiplier(CrossSectionComponent::VBF, &point)
            .unwrap();
        let vbf = table.form(CrossSectionComponent::VBF);
        let expected = vbf.evaluate(&sm).unwrap() / vbf.evaluate(&point).unwrap();
        assert_relative_eq!(multiplier, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_wh_without_zgamma() {
        let table = CrossSectionTable::default();
        let point = Hypothesis::Pure(Coupling::GhZGs1Prime2)
            .coupling_point(ProductionMode::WH)
            .unwrap();
        assert_eq!(table.form(CrossSectionComponent::WH).evaluate(&point).unwrap(), 0.0);
        assert!(matches!(
            table.categorization_multiplier(CrossSectionComponent::WH, &point),
            Err(AcmorphError::NonPositiveCrossSectionError { .. })
        ));
    }

    #[test]
    fn test_expected_yield() {
        let table = CrossSectionTable::default();
        let sm = CrossSectionTable::sm_point();
        let expected = table
            .expected_yield(ProductionMode::GGH, &sm, 35.8671)
            .unwrap();
        assert_relative_eq!(expected, 44140.0 * 5.897e-05 * 3.0 * 35.8671);
    }

    #[test]
    fn test_yield_scale() {
        let table = CrossSectionTable::default();
        let sm = CrossSectionTable::sm_point();
        assert_relative_eq!(table.yield_scale(ProductionMode::VBF, &sm, 12.5).unwrap(), 12.5);
        let pseudoscalar = Hypothesis::Pure(Coupling::G4)
            .coupling_point(ProductionMode::GGH)
            .unwrap();
        assert_relative_eq!(
            table.yield_scale(ProductionMode::GGH, &pseudoscalar, 12.5).unwrap(),
            12.5,
            max_relative = 1e-2
        );
    }
}
