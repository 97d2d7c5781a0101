use acmorph_core::{AcmorphResult, Event};

/// A source of matrix-element probabilities.
///
/// `term` names one coupling combination computed with one jet configuration, e.g.
/// `p_JJVBF_SIG_ghv1_1_ghv4_1_JHUGen_JECNominal`. The provider is called once per term and event
/// and must be a pure function of its arguments.
pub trait MatrixElementProvider: Send + Sync {
    /// The probability of `event` under `term`.
    fn probability(&self, term: &str, event: &Event<'_>) -> AcmorphResult<f64>;
}

impl<F> MatrixElementProvider for F
where
    F: Fn(&str, &Event<'_>) -> AcmorphResult<f64> + Send + Sync,
{
    fn probability(&self, term: &str, event: &Event<'_>) -> AcmorphResult<f64> {
        self(term, event)
    }
}

/// Probabilities which were computed ahead of time and stored on each event under the term name.
#[derive(Copy, Clone, Debug, Default)]
pub struct StoredProbabilities;

impl MatrixElementProvider for StoredProbabilities {
    fn probability(&self, term: &str, event: &Event<'_>) -> AcmorphResult<f64> {
        event.require_scalar(term)
    }
}
