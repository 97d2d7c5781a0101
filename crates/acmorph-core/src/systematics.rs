use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::AcmorphError;

/// A detector systematic variation.
///
/// A variant never changes any decision logic. It only selects which shifted input variables are
/// read and which matrix-element terms are requested.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SystematicVariant {
    /// No variation
    #[default]
    Nominal,
    /// Jet energy correction shifted up
    JECUp,
    /// Jet energy correction shifted down
    JECDn,
    /// Jet energy scale shifted up
    JESUp,
    /// Jet energy scale shifted down
    JESDn,
    /// Jet energy resolution shifted up
    JERUp,
    /// Jet energy resolution shifted down
    JERDn,
    /// b-tagging scale factor shifted up
    BTagSFUp,
    /// b-tagging scale factor shifted down
    BTagSFDn,
}

impl SystematicVariant {
    /// Every variant, nominal first.
    pub const ALL: [SystematicVariant; 9] = [
        SystematicVariant::Nominal,
        SystematicVariant::JECUp,
        SystematicVariant::JECDn,
        SystematicVariant::JESUp,
        SystematicVariant::JESDn,
        SystematicVariant::JERUp,
        SystematicVariant::JERDn,
        SystematicVariant::BTagSFUp,
        SystematicVariant::BTagSFDn,
    ];

    /// Canonical name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            SystematicVariant::Nominal => "Nominal",
            SystematicVariant::JECUp => "JECUp",
            SystematicVariant::JECDn => "JECDn",
            SystematicVariant::JESUp => "JESUp",
            SystematicVariant::JESDn => "JESDn",
            SystematicVariant::JERUp => "JERUp",
            SystematicVariant::JERDn => "JERDn",
            SystematicVariant::BTagSFUp => "bTagSFUp",
            SystematicVariant::BTagSFDn => "bTagSFDn",
        }
    }

    /// Whether this is anything other than [`SystematicVariant::Nominal`].
    pub fn is_systematic(&self) -> bool {
        !matches!(self, SystematicVariant::Nominal)
    }

    /// Whether this variant shifts the jets themselves (and so every jet-level input).
    pub fn shifts_jets(&self) -> bool {
        !matches!(
            self,
            SystematicVariant::Nominal | SystematicVariant::BTagSFUp | SystematicVariant::BTagSFDn
        )
    }

    /// The suffix appended to names derived from this variant: empty for nominal, `_<name>`
    /// otherwise.
    pub fn appendname(&self) -> String {
        if self.is_systematic() {
            format!("_{}", self.name())
        } else {
            String::new()
        }
    }

    /// The suffix of jet-level input variables, e.g. `_jecUp`.
    pub fn jet_suffix(&self) -> String {
        if self.shifts_jets() {
            self.appendname().replace("JEC", "jec")
        } else {
            String::new()
        }
    }

    /// The tag of matrix-element terms computed with shifted jets. Only the jet energy
    /// correction has dedicated terms; every other variant uses the nominal ones.
    pub fn jec_term_suffix(&self) -> &'static str {
        match self {
            SystematicVariant::JECUp => "JECUp",
            SystematicVariant::JECDn => "JECDn",
            _ => "JECNominal",
        }
    }

    /// Number of selected jets.
    pub fn njets_variable(&self) -> String {
        format!("nCleanedJetsPt30{}", self.jet_suffix())
    }

    /// Number of selected b-tagged jets.
    pub fn nbtagged_variable(&self) -> String {
        match self {
            SystematicVariant::BTagSFUp => "nCleanedJetsPt30BTagged_bTagSFUp".to_string(),
            SystematicVariant::BTagSFDn => "nCleanedJetsPt30BTagged_bTagSFDn".to_string(),
            _ => format!("nCleanedJetsPt30BTagged_bTagSF{}", self.jet_suffix()),
        }
    }

    /// Azimuthal angles of the selected jets.
    pub fn jet_phi_variable(&self) -> String {
        format!("jetPhi{}", self.jet_suffix())
    }

    /// Quark/gluon likelihoods of the selected jets.
    pub fn jet_qg_likelihood_variable(&self) -> String {
        format!("jetQGLikelihood{}", self.jet_suffix())
    }

    /// Missing transverse energy.
    pub fn pfmet_variable(&self) -> String {
        format!("PFMET{}", self.jet_suffix())
    }

    /// Gluon fusion + 1 jet probability, read from the event.
    pub fn p_hj_variable(&self) -> String {
        format!("p_JQCD_SIG_ghg2_1_JHUGen_{}", self.jec_term_suffix())
    }

    /// VBF + 1 jet probability, read from the event.
    pub fn p_vbf_1j_variable(&self) -> String {
        format!("p_JVBF_SIG_ghv1_1_JHUGen_{}", self.jec_term_suffix())
    }

    /// Auxiliary VBF + 1 jet probability, read from the event.
    pub fn p_aux_variable(&self) -> String {
        format!("pAux_JVBF_SIG_ghv1_1_JHUGen_{}", self.jec_term_suffix())
    }
}

impl Display for SystematicVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SystematicVariant {
    type Err = AcmorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        let trimmed = lowered.strip_prefix('_').unwrap_or(&lowered);
        match trimmed {
            "" | "nominal" => Ok(SystematicVariant::Nominal),
            "jecup" => Ok(SystematicVariant::JECUp),
            "jecdn" | "jecdown" => Ok(SystematicVariant::JECDn),
            "jesup" => Ok(SystematicVariant::JESUp),
            "jesdn" | "jesdown" => Ok(SystematicVariant::JESDn),
            "jerup" => Ok(SystematicVariant::JERUp),
            "jerdn" | "jerdown" => Ok(SystematicVariant::JERDn),
            "btagsfup" => Ok(SystematicVariant::BTagSFUp),
            "btagsfdn" | "btagsfdown" => Ok(SystematicVariant::BTagSFDn),
            _ => Err(AcmorphError::UnknownSystematicVariantError {
                name: s.to_string(),
            }),
        }
    }
}
