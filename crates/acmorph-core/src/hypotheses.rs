use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    utils::{
        enums::{ProductionMode, Sign},
        fraction_label,
    },
    AcmorphError, AcmorphResult, CouplingPoint,
};

/// $`g_2`$ for which the $`H\to ZZ\to 4\ell`$ cross section equals the Standard Model one.
pub const G2_HZZ: f64 = 1.65684;
/// $`g_4`$ for which the $`H\to ZZ\to 4\ell`$ cross section equals the Standard Model one.
pub const G4_HZZ: f64 = 2.55052;
/// $`g_1^{\prime 2}`$ for which the $`H\to ZZ\to 4\ell`$ cross section equals the Standard Model one.
pub const G1PRIME2_HZZ: f64 = -12100.42;
/// $`g_1^{Z\gamma\prime 2}`$ used to generate the $`H\to ZZ\to 4\ell`$ samples.
pub const GHZGS1PRIME2_HZZ: f64 = -7613.351302119843;

/// $`g_2`$ for which the vector boson fusion cross section equals the Standard Model one.
pub const G2_VBF: f64 = 0.27196538;
/// $`g_4`$ for which the vector boson fusion cross section equals the Standard Model one.
pub const G4_VBF: f64 = 0.297979018705;
/// $`g_1^{\prime 2}`$ for which the vector boson fusion cross section equals the Standard Model one.
pub const G1PRIME2_VBF: f64 = -2158.21307286;
/// $`g_1^{Z\gamma\prime 2}`$ used to generate the vector boson fusion samples.
pub const GHZGS1PRIME2_VBF: f64 = -4091.051456694223;

/// $`g_2`$ for which the $`ZH`$ cross section equals the Standard Model one.
pub const G2_ZH: f64 = 0.112481;
/// $`g_4`$ for which the $`ZH`$ cross section equals the Standard Model one.
pub const G4_ZH: f64 = 0.144057;
/// $`g_1^{\prime 2}`$ for which the $`ZH`$ cross section equals the Standard Model one.
pub const G1PRIME2_ZH: f64 = -517.788;
/// $`g_1^{Z\gamma\prime 2}`$ used to generate the $`ZH`$ samples.
pub const GHZGS1PRIME2_ZH: f64 = -642.9534550379002;

/// $`g_2`$ for which the $`WH`$ cross section equals the Standard Model one.
pub const G2_WH: f64 = 0.0998956;
/// $`g_4`$ for which the $`WH`$ cross section equals the Standard Model one.
pub const G4_WH: f64 = 0.1236136;
/// $`g_1^{\prime 2}`$ for which the $`WH`$ cross section equals the Standard Model one.
pub const G1PRIME2_WH: f64 = -525.274;
/// $`g_1^{Z\gamma\prime 2}`$ used to generate the $`WH`$ samples.
pub const GHZGS1PRIME2_WH: f64 = -1000.0;

/// $`g_4^{gg}`$ for which the $`H+2`$ jet cross section equals the CP-even one.
pub const GHG4_HJJ: f64 = 1.0062;

/// Couplings of the Higgs boson which the analysis is sensitive to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Coupling {
    /// The Standard Model $`HVV`$ coupling
    G1,
    /// CP-even higher-order $`HVV`$ coupling
    G2,
    /// CP-odd $`HVV`$ coupling
    G4,
    /// $`q^2`$-dependent $`HVV`$ coupling
    G1Prime2,
    /// $`q^2`$-dependent $`HZ\gamma`$ coupling
    GhZGs1Prime2,
    /// The Standard Model effective $`Hgg`$ coupling
    Ghg2,
    /// CP-odd effective $`Hgg`$ coupling
    Ghg4,
}

impl Coupling {
    /// Every coupling, in the order coupling points list them.
    pub const ALL: [Coupling; 7] = [
        Coupling::G1,
        Coupling::G2,
        Coupling::G4,
        Coupling::G1Prime2,
        Coupling::GhZGs1Prime2,
        Coupling::Ghg2,
        Coupling::Ghg4,
    ];
    /// The $`HVV`$ couplings, in the order coupling points list them.
    pub const VV: [Coupling; 5] = [
        Coupling::G1,
        Coupling::G2,
        Coupling::G4,
        Coupling::G1Prime2,
        Coupling::GhZGs1Prime2,
    ];

    /// The name used in coupling points and monomials.
    pub fn name(&self) -> &'static str {
        match self {
            Coupling::G1 => "g1",
            Coupling::G2 => "g2",
            Coupling::G4 => "g4",
            Coupling::G1Prime2 => "g1prime2",
            Coupling::GhZGs1Prime2 => "ghzgs1prime2",
            Coupling::Ghg2 => "ghg2",
            Coupling::Ghg4 => "ghg4",
        }
    }

    /// Whether this is one of the two Standard Model couplings which mixtures are measured against.
    pub fn is_reference(&self) -> bool {
        matches!(self, Coupling::G1 | Coupling::Ghg2)
    }

    /// Whether this is an effective gluon coupling.
    pub fn is_gluon(&self) -> bool {
        matches!(self, Coupling::Ghg2 | Coupling::Ghg4)
    }

    /// The name of the sample generated with only this coupling turned on.
    pub fn pure_label(&self) -> &'static str {
        match self {
            Coupling::G1 => "0+",
            Coupling::G2 => "a2",
            Coupling::G4 => "0-",
            Coupling::G1Prime2 => "L1",
            Coupling::GhZGs1Prime2 => "L1Zg",
            Coupling::Ghg2 => "Hff0+",
            Coupling::Ghg4 => "Hff0-",
        }
    }

    /// The label used in `f<label>` fraction names. Reference couplings have none.
    pub fn fraction_label(&self) -> Option<&'static str> {
        match self {
            Coupling::G2 => Some("a2"),
            Coupling::G4 => Some("a3"),
            Coupling::G1Prime2 => Some("L1"),
            Coupling::GhZGs1Prime2 => Some("L1Zg"),
            Coupling::Ghg4 => Some("CP"),
            Coupling::G1 | Coupling::Ghg2 => None,
        }
    }

    fn from_fraction_label(label: &str) -> Option<Coupling> {
        [
            Coupling::G2,
            Coupling::G4,
            Coupling::G1Prime2,
            Coupling::GhZGs1Prime2,
            Coupling::Ghg4,
        ]
        .into_iter()
        .find(|c| c.fraction_label() == Some(label))
    }

    /// The value of this coupling which gives the same $`H\to ZZ`$ cross section as the reference
    /// coupling at 1.
    pub fn decay_constant(&self) -> Option<f64> {
        match self {
            Coupling::G1 => Some(1.0),
            Coupling::G2 => Some(G2_HZZ),
            Coupling::G4 => Some(G4_HZZ),
            Coupling::G1Prime2 => Some(G1PRIME2_HZZ),
            Coupling::GhZGs1Prime2 => Some(GHZGS1PRIME2_HZZ),
            Coupling::Ghg2 | Coupling::Ghg4 => None,
        }
    }

    /// The value of this coupling which gives the same production cross section as the reference
    /// coupling at 1, for productions where the coupling enters the production vertex.
    pub fn production_constant(&self, production: ProductionMode) -> Option<f64> {
        use Coupling::*;
        use ProductionMode::*;
        match (self, production) {
            (G1, VBF | ZH | WH) | (Ghg2, HJJ) => Some(1.0),
            (G2, VBF) => Some(G2_VBF),
            (G4, VBF) => Some(G4_VBF),
            (G1Prime2, VBF) => Some(G1PRIME2_VBF),
            (GhZGs1Prime2, VBF) => Some(GHZGS1PRIME2_VBF),
            (G2, ZH) => Some(G2_ZH),
            (G4, ZH) => Some(G4_ZH),
            (G1Prime2, ZH) => Some(G1PRIME2_ZH),
            (GhZGs1Prime2, ZH) => Some(GHZGS1PRIME2_ZH),
            (G2, WH) => Some(G2_WH),
            (G4, WH) => Some(G4_WH),
            (G1Prime2, WH) => Some(G1PRIME2_WH),
            (GhZGs1Prime2, WH) => Some(GHZGS1PRIME2_WH),
            (Ghg4, HJJ) => Some(GHG4_HJJ),
            _ => None,
        }
    }
}

impl Display for Coupling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Coupling {
    type Err = AcmorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coupling::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AcmorphError::ParseError {
                name: s.to_string(),
                object: "Coupling".to_string(),
            })
    }
}

/// Which coupling constants a mixture was generated with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MixKind {
    /// Equal contributions to the decay cross section
    Decay,
    /// Equal contributions to the production cross section
    Production,
    /// Geometric mean of the production and decay constants
    ProductionDecay,
}

impl Display for MixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixKind::Decay => write!(f, "dec"),
            MixKind::Production => write!(f, "prod"),
            MixKind::ProductionDecay => write!(f, "proddec"),
        }
    }
}

/// A named point in coupling space corresponding to one simulated sample.
///
/// A pure hypothesis turns on exactly one coupling. A mixture turns on several couplings at the
/// values which give each of them an equal share of the (production, decay, or combined) cross
/// section, with a sign per coupling. The reference coupling (`g1` or `ghg2`) takes part in a
/// mixture only when it is listed among the members.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hypothesis {
    /// One coupling on, all others off
    Pure(Coupling),
    /// An equal-fraction mixture of several couplings
    Mix {
        /// Which constants the fractions refer to
        kind: MixKind,
        /// The participating couplings with their signs, in [`Coupling::ALL`] order
        members: Vec<(Coupling, Sign)>,
    },
}

impl Hypothesis {
    /// The Standard Model hypothesis, `0+`.
    pub fn sm() -> Self {
        Hypothesis::Pure(Coupling::G1)
    }

    /// Construct a mixture, checking that it is well formed.
    pub fn mix<I>(kind: MixKind, members: I) -> AcmorphResult<Self>
    where
        I: IntoIterator<Item = (Coupling, Sign)>,
    {
        let mut members: Vec<(Coupling, Sign)> = members.into_iter().collect();
        members.sort_by_key(|(coupling, _)| *coupling);
        let describe = || {
            members
                .iter()
                .map(|(c, s)| format!("{}{}", s, c))
                .collect::<Vec<_>>()
                .join(" ")
        };
        if members.len() < 2 {
            return Err(AcmorphError::UnsupportedConfigurationError {
                reason: format!("a mixture needs at least two couplings, got [{}]", describe()),
            });
        }
        if members.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(AcmorphError::UnsupportedConfigurationError {
                reason: format!("repeated coupling in mixture [{}]", describe()),
            });
        }
        let gluon = members[0].0.is_gluon();
        if members.iter().any(|(c, _)| c.is_gluon() != gluon) {
            return Err(AcmorphError::UnsupportedConfigurationError {
                reason: format!(
                    "cannot mix gluon and vector boson couplings [{}]",
                    describe()
                ),
            });
        }
        if members
            .iter()
            .any(|(c, s)| c.is_reference() && *s == Sign::Negative)
        {
            return Err(AcmorphError::UnsupportedConfigurationError {
                reason: format!("the reference coupling must be positive [{}]", describe()),
            });
        }
        Ok(Hypothesis::Mix { kind, members })
    }

    /// The couplings this hypothesis turns on.
    pub fn couplings(&self) -> Vec<Coupling> {
        match self {
            Hypothesis::Pure(c) => vec![*c],
            Hypothesis::Mix { members, .. } => members.iter().map(|(c, _)| *c).collect(),
        }
    }

    /// Whether exactly one coupling is on.
    pub fn is_pure(&self) -> bool {
        matches!(self, Hypothesis::Pure(_))
    }

    /// Whether this hypothesis involves the effective gluon couplings.
    pub fn is_gluon(&self) -> bool {
        self.couplings().iter().any(|c| c.is_gluon())
    }

    /// Resolve the hypothesis into the coupling point a sample of `production` was generated at.
    ///
    /// The point lists every coupling in [`Coupling::ALL`] order. `ghg2` is 1 unless the
    /// hypothesis is about the gluon couplings, so that the $`H+2`$ jet probability of every
    /// $`HVV`$ hypothesis is the Standard Model one.
    pub fn coupling_point(&self, production: ProductionMode) -> AcmorphResult<CouplingPoint> {
        let mut values: Vec<(Coupling, f64)> = Coupling::ALL
            .into_iter()
            .map(|c| (c, if c == Coupling::Ghg2 { 1.0 } else { 0.0 }))
            .collect();
        let mut set = |coupling: Coupling, value: f64| {
            if let Some(entry) = values.iter_mut().find(|(c, _)| *c == coupling) {
                entry.1 = value;
            }
        };
        if self.is_gluon() {
            set(Coupling::G1, 1.0);
            set(Coupling::Ghg2, 0.0);
        }
        match self {
            Hypothesis::Pure(coupling) => {
                let value = if coupling.is_reference()
                    || coupling.is_gluon()
                    || production.has_vv_production()
                {
                    1.0
                } else {
                    coupling.decay_constant().unwrap_or(1.0)
                };
                set(*coupling, value);
            }
            Hypothesis::Mix { kind, members } => {
                for (coupling, sign) in members {
                    let value = self.mixture_constant(*coupling, *kind, production)?;
                    set(*coupling, sign.value() * value);
                }
            }
        }
        Ok(CouplingPoint::new(
            values.into_iter().map(|(c, value)| (c.name(), value)),
        ))
    }

    fn mixture_constant(
        &self,
        coupling: Coupling,
        kind: MixKind,
        production: ProductionMode,
    ) -> AcmorphResult<f64> {
        if coupling.is_reference() {
            return Ok(1.0);
        }
        let unsupported = || AcmorphError::UnsupportedConfigurationError {
            reason: format!(
                "{} has no {} constant for coupling {} in {} production",
                self, kind, coupling, production
            ),
        };
        let decay = coupling.decay_constant();
        let prod = coupling.production_constant(production);
        match kind {
            MixKind::Decay => decay.ok_or_else(unsupported),
            MixKind::Production => prod.ok_or_else(unsupported),
            MixKind::ProductionDecay => match (prod, decay) {
                (Some(p), Some(d)) => Ok(d.signum() * (p * d).abs().sqrt()),
                _ => Err(unsupported()),
            },
        }
    }
}

impl Display for Hypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hypothesis::Pure(coupling) => write!(f, "{}", coupling.pure_label()),
            Hypothesis::Mix { kind, members } => {
                let fraction = fraction_label(members.len());
                for (coupling, sign) in members {
                    if let Some(label) = coupling.fraction_label() {
                        let sign = match sign {
                            Sign::Positive => "",
                            Sign::Negative => "-",
                        };
                        write!(f, "f{}{}{}{}", label, kind, sign, fraction)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Hypothesis {
    type Err = AcmorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_error = || AcmorphError::ParseError {
            name: s.to_string(),
            object: "Hypothesis".to_string(),
        };
        if let Some(coupling) = Coupling::ALL.into_iter().find(|c| c.pure_label() == s) {
            return Ok(Hypothesis::Pure(coupling));
        }
        let mut rest = s;
        let mut segments: Vec<(Coupling, MixKind, Sign, f64)> = Vec::new();
        while !rest.is_empty() {
            rest = rest.strip_prefix('f').ok_or_else(parse_error)?;
            // longest labels first so that "L1Zg" is not read as "L1"
            let (coupling, after) = ["L1Zg", "L1", "a2", "a3", "CP"]
                .into_iter()
                .find_map(|label| {
                    rest.strip_prefix(label)
                        .and_then(|after| Coupling::from_fraction_label(label).map(|c| (c, after)))
                })
                .ok_or_else(parse_error)?;
            let (kind, after) = [
                ("proddec", MixKind::ProductionDecay),
                ("prod", MixKind::Production),
                ("dec", MixKind::Decay),
            ]
            .into_iter()
            .find_map(|(tag, kind)| after.strip_prefix(tag).map(|after| (kind, after)))
            .ok_or_else(parse_error)?;
            let (sign, after) = match after.strip_prefix('-') {
                Some(after) => (Sign::Negative, after),
                None => (Sign::Positive, after),
            };
            let end = after
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(after.len());
            let fraction: f64 = after[..end].parse().map_err(|_| parse_error())?;
            segments.push((coupling, kind, sign, fraction));
            rest = &after[end..];
        }
        let (_, kind, _, fraction) = *segments.first().ok_or_else(parse_error)?;
        if segments
            .iter()
            .any(|(_, k, _, f)| *k != kind || (*f - fraction).abs() > 1e-9)
        {
            return Err(parse_error());
        }
        let mut members: Vec<(Coupling, Sign)> =
            segments.iter().map(|(c, _, s, _)| (*c, *s)).collect();
        let n = segments.len() as f64;
        if (n * fraction - 1.0).abs() > 0.05 {
            if ((n + 1.0) * fraction - 1.0).abs() > 0.05 {
                return Err(parse_error());
            }
            let reference = if members[0].0.is_gluon() {
                Coupling::Ghg2
            } else {
                Coupling::G1
            };
            members.push((reference, Sign::Positive));
        }
        let hypothesis = Hypothesis::mix(kind, members).map_err(|_| parse_error())?;
        if hypothesis.to_string() != s {
            return Err(parse_error());
        }
        Ok(hypothesis)
    }
}

/// A coupling analysis: the set of couplings which are morphed together.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Analysis {
    /// $`f_{a3}`$: `g1` and `g4`
    Fa3,
    /// $`f_{a2}`$: `g1` and `g2`
    Fa2,
    /// $`f_{\Lambda 1}`$: `g1` and `g1prime2`
    FL1,
    /// $`f_{\Lambda 1}^{Z\gamma}`$: `g1` and `ghzgs1prime2`
    FL1Zg,
    /// All four anomalous couplings together with `g1`
    Fa3Fa2FL1FL1Zg,
}

impl Analysis {
    /// All analyses.
    pub const ALL: [Analysis; 5] = [
        Analysis::Fa3,
        Analysis::Fa2,
        Analysis::FL1,
        Analysis::FL1Zg,
        Analysis::Fa3Fa2FL1FL1Zg,
    ];

    /// The couplings of this analysis, reference first.
    pub fn couplings(&self) -> Vec<Coupling> {
        match self {
            Analysis::Fa3 => vec![Coupling::G1, Coupling::G4],
            Analysis::Fa2 => vec![Coupling::G1, Coupling::G2],
            Analysis::FL1 => vec![Coupling::G1, Coupling::G1Prime2],
            Analysis::FL1Zg => vec![Coupling::G1, Coupling::GhZGs1Prime2],
            Analysis::Fa3Fa2FL1FL1Zg => Coupling::VV.to_vec(),
        }
    }

    /// The coupling names of this analysis, reference first.
    pub fn coupling_names(&self) -> Vec<&'static str> {
        self.couplings().iter().map(|c| c.name()).collect()
    }

    /// Whether more than one anomalous coupling is morphed.
    pub fn is_multidimensional(&self) -> bool {
        matches!(self, Analysis::Fa3Fa2FL1FL1Zg)
    }

    /// The ordered hypotheses whose samples determine a morphing basis for `production`.
    ///
    /// A one-dimensional quadratic basis uses the reference, the pure anomalous sample and the
    /// 50/50 decay mixture. A quartic basis adds the production mixture and the negative
    /// production-decay mixture. The four-dimensional quadratic basis uses the five pure samples
    /// and the ten pairwise decay mixtures.
    pub fn basis_hypotheses(&self, production: ProductionMode) -> AcmorphResult<Vec<Hypothesis>> {
        if production == ProductionMode::HJJ {
            return Err(AcmorphError::UnsupportedConfigurationError {
                reason: format!("{} is not morphed in the {} couplings", production, self),
            });
        }
        let couplings = self.couplings();
        if self.is_multidimensional() {
            if production.degree() != 2 {
                return Err(AcmorphError::UnsupportedConfigurationError {
                    reason: format!(
                        "the {} analysis needs a degree {} basis for {}, which is not supported",
                        self,
                        production.degree(),
                        production
                    ),
                });
            }
            let mut hypotheses: Vec<Hypothesis> =
                couplings.iter().map(|c| Hypothesis::Pure(*c)).collect();
            for (i, a) in couplings.iter().enumerate() {
                for b in couplings.iter().skip(i + 1) {
                    hypotheses.push(Hypothesis::mix(
                        MixKind::Decay,
                        [(*a, Sign::Positive), (*b, Sign::Positive)],
                    )?);
                }
            }
            return Ok(hypotheses);
        }
        let anomalous = couplings[1];
        let mut hypotheses = vec![
            Hypothesis::sm(),
            Hypothesis::Pure(anomalous),
            Hypothesis::mix(
                MixKind::Decay,
                [(Coupling::G1, Sign::Positive), (anomalous, Sign::Positive)],
            )?,
        ];
        if production.degree() == 4 {
            hypotheses.push(Hypothesis::mix(
                MixKind::Production,
                [(Coupling::G1, Sign::Positive), (anomalous, Sign::Positive)],
            )?);
            hypotheses.push(Hypothesis::mix(
                MixKind::ProductionDecay,
                [(Coupling::G1, Sign::Positive), (anomalous, Sign::Negative)],
            )?);
        }
        Ok(hypotheses)
    }
}

impl Display for Analysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Analysis::Fa3 => write!(f, "fa3"),
            Analysis::Fa2 => write!(f, "fa2"),
            Analysis::FL1 => write!(f, "fL1"),
            Analysis::FL1Zg => write!(f, "fL1Zg"),
            Analysis::Fa3Fa2FL1FL1Zg => write!(f, "fa3fa2fL1fL1Zg"),
        }
    }
}

impl FromStr for Analysis {
    type Err = AcmorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Analysis::ALL
            .into_iter()
            .find(|a| a.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| AcmorphError::ParseError {
                name: s.to_string(),
                object: "Analysis".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_hypothesis_names() {
        assert_eq!(Hypothesis::sm().to_string(), "0+");
        assert_eq!(Hypothesis::Pure(Coupling::G4).to_string(), "0-");
        let mix = Hypothesis::mix(
            MixKind::ProductionDecay,
            [(Coupling::G4, Sign::Negative), (Coupling::G1, Sign::Positive)],
        )
        .unwrap();
        assert_eq!(mix.to_string(), "fa3proddec-0.5");
        let pair = Hypothesis::mix(
            MixKind::Decay,
            [(Coupling::G2, Sign::Positive), (Coupling::G4, Sign::Positive)],
        )
        .unwrap();
        assert_eq!(pair.to_string(), "fa2dec0.5fa3dec0.5");
    }

    #[test]
    fn test_hypothesis_parsing() {
        for name in [
            "0+",
            "0-",
            "a2",
            "L1",
            "L1Zg",
            "fa3dec0.5",
            "fa3prod0.5",
            "fa3proddec-0.5",
            "fL1Zgdec0.5",
            "fa2dec0.5fL1dec0.5",
            "fa2dec0.33fa3dec0.33",
        ] {
            let hypothesis: Hypothesis = name.parse().unwrap();
            assert_eq!(hypothesis.to_string(), name);
        }
        let with_reference: Hypothesis = "fa2dec0.33fa3dec0.33".parse().unwrap();
        assert!(with_reference.couplings().contains(&Coupling::G1));
        let without_reference: Hypothesis = "fa2dec0.5fa3dec0.5".parse().unwrap();
        assert!(!without_reference.couplings().contains(&Coupling::G1));
        assert!("fa3dec0.5fa2prod0.5".parse::<Hypothesis>().is_err());
        assert!("fa4dec0.5".parse::<Hypothesis>().is_err());
        assert!("0x".parse::<Hypothesis>().is_err());
    }

    #[test]
    fn test_pure_points_are_orthogonal() {
        for production in [ProductionMode::GGH, ProductionMode::VBF] {
            let points: Vec<CouplingPoint> = Coupling::VV
                .into_iter()
                .map(|c| Hypothesis::Pure(c).coupling_point(production).unwrap())
                .collect();
            for (i, a) in Coupling::VV.iter().enumerate() {
                for (j, b) in Coupling::VV.iter().enumerate() {
                    let value = points[i].get(b.name()).unwrap();
                    if i == j {
                        assert!(value != 0.0, "{} should be on in {}", b, a);
                    } else {
                        assert_eq!(value, 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_pure_values_depend_on_production() {
        let ggh = Hypothesis::Pure(Coupling::G4)
            .coupling_point(ProductionMode::GGH)
            .unwrap();
        assert_relative_eq!(ggh.get("g4").unwrap(), G4_HZZ);
        let vbf = Hypothesis::Pure(Coupling::G4)
            .coupling_point(ProductionMode::VBF)
            .unwrap();
        assert_relative_eq!(vbf.get("g4").unwrap(), 1.0);
        assert_relative_eq!(vbf.get("ghg2").unwrap(), 1.0);
    }

    #[test]
    fn test_mixture_points() {
        let dec: Hypothesis = "fa3dec0.5".parse().unwrap();
        let point = dec.coupling_point(ProductionMode::VBF).unwrap();
        assert_relative_eq!(point.get("g1").unwrap(), 1.0);
        assert_relative_eq!(point.get("g4").unwrap(), G4_HZZ);
        let prod: Hypothesis = "fa3prod0.5".parse().unwrap();
        let point = prod.coupling_point(ProductionMode::ZH).unwrap();
        assert_relative_eq!(point.get("g4").unwrap(), G4_ZH);
        let proddec: Hypothesis = "fL1proddec-0.5".parse().unwrap();
        let point = proddec.coupling_point(ProductionMode::VBF).unwrap();
        assert_relative_eq!(
            point.get("g1prime2").unwrap(),
            (G1PRIME2_VBF * G1PRIME2_HZZ).sqrt(),
            epsilon = 1e-9
        );
        let pair: Hypothesis = "fa2dec0.5fa3dec0.5".parse().unwrap();
        let point = pair.coupling_point(ProductionMode::GGH).unwrap();
        assert_eq!(point.get("g1").unwrap(), 0.0);
        assert_relative_eq!(point.get("g2").unwrap(), G2_HZZ);
    }

    #[test]
    fn test_production_mixture_needs_production_couplings() {
        let prod: Hypothesis = "fa3prod0.5".parse().unwrap();
        assert!(matches!(
            prod.coupling_point(ProductionMode::GGH),
            Err(AcmorphError::UnsupportedConfigurationError { .. })
        ));
    }

    #[test]
    fn test_gluon_hypotheses() {
        let point = Hypothesis::Pure(Coupling::Ghg4)
            .coupling_point(ProductionMode::HJJ)
            .unwrap();
        assert_eq!(point.get("ghg2").unwrap(), 0.0);
        assert_eq!(point.get("ghg4").unwrap(), 1.0);
        assert_eq!(point.get("g1").unwrap(), 1.0);
        let mix: Hypothesis = "fCPprod0.5".parse().unwrap();
        let point = mix.coupling_point(ProductionMode::HJJ).unwrap();
        assert_eq!(point.get("ghg2").unwrap(), 1.0);
        assert_relative_eq!(point.get("ghg4").unwrap(), GHG4_HJJ);
    }

    #[test]
    fn test_basis_hypotheses() {
        let ggh = Analysis::Fa3.basis_hypotheses(ProductionMode::GGH).unwrap();
        let names: Vec<String> = ggh.iter().map(|h| h.to_string()).collect();
        assert_eq!(names, vec!["0+", "0-", "fa3dec0.5"]);
        let vbf = Analysis::FL1.basis_hypotheses(ProductionMode::VBF).unwrap();
        let names: Vec<String> = vbf.iter().map(|h| h.to_string()).collect();
        assert_eq!(
            names,
            vec!["0+", "L1", "fL1dec0.5", "fL1prod0.5", "fL1proddec-0.5"]
        );
        let four = Analysis::Fa3Fa2FL1FL1Zg
            .basis_hypotheses(ProductionMode::GGH)
            .unwrap();
        assert_eq!(four.len(), 15);
        assert!(matches!(
            Analysis::Fa3Fa2FL1FL1Zg.basis_hypotheses(ProductionMode::VBF),
            Err(AcmorphError::UnsupportedConfigurationError { .. })
        ));
    }
}
