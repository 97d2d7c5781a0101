use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{AcmorphError, AcmorphResult};

/// Higgs boson production modes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductionMode {
    /// Gluon fusion, morphed in the decay couplings only.
    GGH,
    /// Vector boson fusion.
    VBF,
    /// Associated production with a $`Z`$ boson.
    ZH,
    /// Associated production with a $`W`$ boson.
    WH,
    /// Gluon fusion with two associated jets, sensitive to the effective gluon couplings.
    HJJ,
    /// Associated production with a top quark pair, morphed in the decay couplings only.
    TTH,
}

impl ProductionMode {
    /// All production modes, in canonical order.
    pub const ALL: [ProductionMode; 6] = [
        ProductionMode::GGH,
        ProductionMode::VBF,
        ProductionMode::ZH,
        ProductionMode::WH,
        ProductionMode::HJJ,
        ProductionMode::TTH,
    ];

    /// Whether the anomalous $`HVV`$ couplings enter the production vertex as well as the decay.
    pub fn has_vv_production(&self) -> bool {
        matches!(
            self,
            ProductionMode::VBF | ProductionMode::ZH | ProductionMode::WH
        )
    }

    /// The total degree of the polynomial in the couplings which describes this mode's
    /// distributions.
    ///
    /// Each vertex contributes an amplitude linear in the couplings, so a mode with the couplings
    /// in both production and decay is quartic while a decay-only mode is quadratic.
    pub fn degree(&self) -> u32 {
        if self.has_vv_production() {
            4
        } else {
            2
        }
    }

    /// Standard Model cross section at $`m_H = 125`$ GeV and $`\sqrt{s} = 13`$ TeV, in fb.
    pub fn sm_cross_section(&self) -> f64 {
        match self {
            ProductionMode::GGH | ProductionMode::HJJ => 44.14 * 1000.0,
            ProductionMode::VBF => 3.782 * 1000.0,
            ProductionMode::ZH => 0.8839 * 1000.0,
            ProductionMode::WH => 1.373 * 1000.0,
            ProductionMode::TTH => 0.5071 * 1000.0,
        }
    }
}

impl Display for ProductionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductionMode::GGH => write!(f, "ggH"),
            ProductionMode::VBF => write!(f, "VBF"),
            ProductionMode::ZH => write!(f, "ZH"),
            ProductionMode::WH => write!(f, "WH"),
            ProductionMode::HJJ => write!(f, "HJJ"),
            ProductionMode::TTH => write!(f, "ttH"),
        }
    }
}

impl FromStr for ProductionMode {
    type Err = AcmorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ggh" => Ok(Self::GGH),
            "vbf" | "qqh" => Ok(Self::VBF),
            "zh" => Ok(Self::ZH),
            "wh" => Ok(Self::WH),
            "hjj" => Ok(Self::HJJ),
            "tth" => Ok(Self::TTH),
            _ => Err(AcmorphError::ParseError {
                name: s.to_string(),
                object: "ProductionMode".to_string(),
            }),
        }
    }
}

/// Four-lepton final states.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Four electrons
    FourE,
    /// Four muons
    FourMu,
    /// Two electrons and two muons
    TwoETwoMu,
}

impl Channel {
    /// All channels, in canonical order.
    pub const ALL: [Channel; 3] = [Channel::FourE, Channel::FourMu, Channel::TwoETwoMu];

    /// The product of the four lepton PDG ids as stored in the `Z1Flav*Z2Flav` event field.
    pub fn zz_flav(&self) -> i64 {
        match self {
            Channel::FourE => 11 * 11 * 11 * 11,
            Channel::FourMu => 13 * 13 * 13 * 13,
            Channel::TwoETwoMu => 11 * 11 * 13 * 13,
        }
    }

    /// Recover the channel from a lepton-flavor product. The sign (lepton charges) is ignored.
    pub fn from_zz_flav(zz_flav: i64) -> AcmorphResult<Self> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.zz_flav() == zz_flav.abs())
            .ok_or_else(|| AcmorphError::ParseError {
                name: zz_flav.to_string(),
                object: "Channel".to_string(),
            })
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::FourE => write!(f, "4e"),
            Channel::FourMu => write!(f, "4mu"),
            Channel::TwoETwoMu => write!(f, "2e2mu"),
        }
    }
}

impl FromStr for Channel {
    type Err = AcmorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "4e" => Ok(Self::FourE),
            "4mu" | "4m" => Ok(Self::FourMu),
            "2e2mu" | "2mu2e" => Ok(Self::TwoETwoMu),
            _ => Err(AcmorphError::ParseError {
                name: s.to_string(),
                object: "Channel".to_string(),
            }),
        }
    }
}

/// Mutually exclusive event categories.
///
/// The integer ids are the ones returned by the category-decision predicate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// No tag fired
    Untagged,
    /// Vector boson fusion with one jet
    VBF1jTagged,
    /// Vector boson fusion with two jets
    VBF2jTagged,
    /// Associated production with a leptonic vector boson decay
    VHLeptTagged,
    /// Associated production with a hadronic vector boson decay
    VHHadrTagged,
    /// Associated production with a top quark pair
    TTHTagged,
    /// Associated production with an invisible vector boson decay
    VHMETTagged,
    /// Sentinel for events which were never categorized
    NotCategorized,
}

impl Category {
    /// Every real category, excluding the sentinel.
    pub const ALL: [Category; 7] = [
        Category::Untagged,
        Category::VBF1jTagged,
        Category::VBF2jTagged,
        Category::VHLeptTagged,
        Category::VHHadrTagged,
        Category::TTHTagged,
        Category::VHMETTagged,
    ];

    /// The integer id used by the category-decision predicate.
    pub fn id(&self) -> i32 {
        match self {
            Category::Untagged => 0,
            Category::VBF1jTagged => 1,
            Category::VBF2jTagged => 2,
            Category::VHLeptTagged => 3,
            Category::VHHadrTagged => 4,
            Category::TTHTagged => 5,
            Category::VHMETTagged => 6,
            Category::NotCategorized => -1,
        }
    }

    /// Convert an id returned by the category-decision predicate into a [`Category`].
    pub fn from_id(id: i32) -> AcmorphResult<Self> {
        Category::ALL
            .into_iter()
            .chain(std::iter::once(Category::NotCategorized))
            .find(|category| category.id() == id)
            .ok_or_else(|| AcmorphError::ParseError {
                name: id.to_string(),
                object: "Category".to_string(),
            })
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Untagged => write!(f, "Untagged"),
            Category::VBF1jTagged => write!(f, "VBF1jTagged"),
            Category::VBF2jTagged => write!(f, "VBF2jTagged"),
            Category::VHLeptTagged => write!(f, "VHLeptTagged"),
            Category::VHHadrTagged => write!(f, "VHHadrTagged"),
            Category::TTHTagged => write!(f, "ttHTagged"),
            Category::VHMETTagged => write!(f, "VHMETTagged"),
            Category::NotCategorized => write!(f, "NotCategorized"),
        }
    }
}

impl FromStr for Category {
    type Err = AcmorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "untagged" => Ok(Self::Untagged),
            "vbf1jtagged" => Ok(Self::VBF1jTagged),
            "vbf2jtagged" | "vbftagged" => Ok(Self::VBF2jTagged),
            "vhlepttagged" => Ok(Self::VHLeptTagged),
            "vhhadrtagged" => Ok(Self::VHHadrTagged),
            "tthtagged" => Ok(Self::TTHTagged),
            "vhmettagged" => Ok(Self::VHMETTagged),
            "notcategorized" => Ok(Self::NotCategorized),
            _ => Err(AcmorphError::ParseError {
                name: s.to_string(),
                object: "Category".to_string(),
            }),
        }
    }
}

/// A simple enum describing a binary sign.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    /// A positive indicator.
    Positive,
    /// A negative indicator.
    Negative,
}

impl Sign {
    /// `1.0` or `-1.0`.
    pub fn value(&self) -> f64 {
        match self {
            Sign::Positive => 1.0,
            Sign::Negative => -1.0,
        }
    }
}

impl Display for Sign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sign::Positive => write!(f, "+"),
            Sign::Negative => write!(f, "-"),
        }
    }
}

impl FromStr for Sign {
    type Err = AcmorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "+" | "plus" | "pos" | "positive" => Ok(Self::Positive),
            "-" | "minus" | "neg" | "negative" => Ok(Self::Negative),
            _ => Err(AcmorphError::ParseError {
                name: s.to_string(),
                object: "Sign".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_degree() {
        assert_eq!(ProductionMode::GGH.degree(), 2);
        assert_eq!(ProductionMode::TTH.degree(), 2);
        assert_eq!(ProductionMode::VBF.degree(), 4);
        assert_eq!(ProductionMode::ZH.degree(), 4);
        assert_eq!(ProductionMode::WH.degree(), 4);
    }

    #[test]
    fn test_production_round_trip_names() {
        for production in ProductionMode::ALL {
            let parsed: ProductionMode = production.to_string().parse().unwrap();
            assert_eq!(parsed, production);
        }
        assert!("bbH".parse::<ProductionMode>().is_err());
    }

    #[test]
    fn test_channel_flavor_products() {
        assert_eq!(Channel::FourE.zz_flav(), 14641);
        assert_eq!(Channel::FourMu.zz_flav(), 28561);
        assert_eq!(Channel::TwoETwoMu.zz_flav(), 20449);
        assert_eq!(Channel::from_zz_flav(-20449).unwrap(), Channel::TwoETwoMu);
        assert!(Channel::from_zz_flav(121).is_err());
    }

    #[test]
    fn test_category_ids() {
        for category in Category::ALL {
            assert_eq!(Category::from_id(category.id()).unwrap(), category);
        }
        assert_eq!(Category::from_id(-1).unwrap(), Category::NotCategorized);
        assert!(Category::from_id(42).is_err());
        assert_eq!(Category::VBF2jTagged.id(), 2);
        assert_eq!(Category::VHHadrTagged.id(), 4);
    }

    #[test]
    fn test_sign_display() {
        assert_eq!(Sign::Positive.to_string(), "+");
        assert_eq!(Sign::Negative.value(), -1.0);
        assert_eq!("minus".parse::<Sign>().unwrap(), Sign::Negative);
    }
}
