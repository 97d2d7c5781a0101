use acmorph_core::{AcmorphError, AcmorphResult, AcmorphResultExt, CouplingPoint, Histogram3D};

use crate::basis::TemplateBasis;

/// A template evaluated at one coupling point.
///
/// The histogram is the signed linear combination of the basis templates. Bins may be negative
/// where the interference terms dominate; nothing here floors them.
#[derive(Clone, Debug, PartialEq)]
pub struct MorphedTemplate {
    histogram: Histogram3D,
    point: CouplingPoint,
    normalization: f64,
}

impl MorphedTemplate {
    /// The evaluated histogram.
    pub fn histogram(&self) -> &Histogram3D {
        &self.histogram
    }
    /// Consume the template, returning its histogram.
    pub fn into_histogram(self) -> Histogram3D {
        self.histogram
    }
    /// The coupling point the template was evaluated at.
    pub fn point(&self) -> &CouplingPoint {
        &self.point
    }
    /// The factor applied to the combination of basis templates.
    pub fn normalization(&self) -> f64 {
        self.normalization
    }
    /// The integral of the histogram.
    pub fn integral(&self) -> f64 {
        self.histogram.integral()
    }
}

/// Combine the basis templates at `target`, $`\sum_k m_k(\text{target})\,T_k`$, with no rescaling.
pub fn evaluate_unnormalized(
    basis: &TemplateBasis,
    target: &CouplingPoint,
) -> AcmorphResult<Histogram3D> {
    let coefficients = basis.coefficients(target)?;
    let terms: Vec<(f64, &Histogram3D)> = coefficients
        .into_iter()
        .zip(basis.templates().iter())
        .collect();
    Histogram3D::linear_combination(&terms)
}

/// Evaluate the basis at `target` and rescale the result so that its integral is `target_yield`.
///
/// A negative integral cannot be rescaled to a physical yield; the unscaled combination is
/// returned with a warning so that consumers which need the signed result (interference checks)
/// still get it.
///
/// # Errors
///
/// Fails if the combination has a zero or non-finite integral, or if `target_yield` is not
/// finite. Errors carry the basis' configuration tuple.
pub fn evaluate(
    basis: &TemplateBasis,
    target: &CouplingPoint,
    target_yield: f64,
) -> AcmorphResult<MorphedTemplate> {
    evaluate_inner(basis, target, target_yield).in_configuration(&basis.key().tuple())
}

fn evaluate_inner(
    basis: &TemplateBasis,
    target: &CouplingPoint,
    target_yield: f64,
) -> AcmorphResult<MorphedTemplate> {
    let mut histogram = evaluate_unnormalized(basis, target)?;
    let integral = histogram.integral();
    if !target_yield.is_finite() {
        return Err(AcmorphError::Custom(format!(
            "cannot rescale the template at {} to a yield of {}",
            target, target_yield
        )));
    }
    if !integral.is_finite() || integral == 0.0 {
        return Err(AcmorphError::Custom(format!(
            "the template at {} has an integral of {} and cannot be rescaled",
            target, integral
        )));
    }
    let negative_bins = histogram.negative_bins();
    if negative_bins > 0 {
        tracing::debug!(
            basis = %basis.key(),
            point = %target,
            negative_bins,
            "negative bins in morphed template"
        );
    }
    let normalization = if integral < 0.0 {
        tracing::warn!(
            basis = %basis.key(),
            point = %target,
            integral,
            "morphed template has a negative integral, returning it unscaled"
        );
        1.0
    } else {
        target_yield / integral
    };
    histogram.scale(normalization);
    Ok(MorphedTemplate {
        histogram,
        point: target.clone(),
        normalization,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::basis::BasisKey;
    use acmorph_core::{
        monomials, Analysis, AnalysisConfig, Axis, Category, FlowPolicy, ProductionMode,
        SystematicVariant, TemplateBinning,
    };

    fn basis(first: Vec<f64>, second: Vec<f64>) -> TemplateBasis {
        let binning = TemplateBinning::new(
            [
                Axis::new("x", first.len(), (0.0, 1.0)),
                Axis::new("y", 1, (0.0, 1.0)),
                Axis::new("z", 1, (0.0, 1.0)),
            ],
            FlowPolicy::Fold,
        );
        TemplateBasis::from_raw(
            BasisKey::new(
                ProductionMode::GGH,
                Category::Untagged,
                Analysis::Fa3,
                SystematicVariant::Nominal,
            ),
            vec!["g1".to_string(), "g2".to_string()],
            vec![
                CouplingPoint::new([("g1", 1.0), ("g2", 0.0)]),
                CouplingPoint::new([("g1", 0.0), ("g2", 1.0)]),
            ],
            monomials(&["g1", "g2"], 1),
            vec![
                Histogram3D::from_contents(binning.clone(), first).unwrap(),
                Histogram3D::from_contents(binning, second).unwrap(),
            ],
            &AnalysisConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_end_to_end_two_couplings() {
        let basis = basis(vec![10.0], vec![20.0]);
        let target = CouplingPoint::new([("g1", 2.0), ("g2", 3.0)]);
        let unnormalized = evaluate_unnormalized(&basis, &target).unwrap();
        assert_relative_eq!(unnormalized.contents()[0], 80.0);
        let morphed = evaluate(&basis, &target, 160.0).unwrap();
        assert_relative_eq!(morphed.normalization(), 2.0);
        assert_relative_eq!(morphed.integral(), 160.0);
        assert_eq!(morphed.point(), &target);
    }

    #[test]
    fn test_polynomial_not_linear_in_couplings() {
        let binning = TemplateBinning::new(
            [
                Axis::new("x", 1, (0.0, 1.0)),
                Axis::new("y", 1, (0.0, 1.0)),
                Axis::new("z", 1, (0.0, 1.0)),
            ],
            FlowPolicy::Fold,
        );
        let a = CouplingPoint::new([("g1", 1.0), ("g2", 0.0)]);
        let b = CouplingPoint::new([("g1", 0.0), ("g2", 1.0)]);
        let sum = CouplingPoint::new([("g1", 1.0), ("g2", 1.0)]);
        let basis = TemplateBasis::from_raw(
            BasisKey::new(
                ProductionMode::GGH,
                Category::Untagged,
                Analysis::Fa3,
                SystematicVariant::Nominal,
            ),
            vec!["a".to_string(), "b".to_string(), "a+b".to_string()],
            vec![a.clone(), b.clone(), sum.clone()],
            monomials(&["g1", "g2"], 2),
            [10.0, 20.0, 36.0]
                .into_iter()
                .map(|c| Histogram3D::from_contents(binning.clone(), vec![c]).unwrap())
                .collect(),
            &AnalysisConfig::default(),
        )
        .unwrap();
        let separate = evaluate_unnormalized(&basis, &a).unwrap()
            + evaluate_unnormalized(&basis, &b).unwrap();
        let together = evaluate_unnormalized(&basis, &sum).unwrap();
        assert_relative_eq!(separate.contents()[0], 30.0, epsilon = 1e-12);
        assert_relative_eq!(together.contents()[0], 36.0, epsilon = 1e-12);
        // the interference template carries the difference
        assert_relative_eq!(basis.templates()[1].contents()[0], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_bins_are_kept() {
        let basis = basis(vec![10.0, 1.0], vec![1.0, 10.0]);
        let target = CouplingPoint::new([("g1", 1.0), ("g2", -0.5)]);
        let morphed = evaluate(&basis, &target, 5.5).unwrap();
        assert_relative_eq!(morphed.histogram().contents()[0], 9.5);
        assert_relative_eq!(morphed.histogram().contents()[1], -4.0);
        assert_relative_eq!(morphed.normalization(), 1.0);
    }

    #[test]
    fn test_negative_integral_is_returned_unscaled() {
        let basis = basis(vec![10.0], vec![20.0]);
        let target = CouplingPoint::new([("g1", 1.0), ("g2", -1.0)]);
        let morphed = evaluate(&basis, &target, 5.0).unwrap();
        assert_relative_eq!(morphed.normalization(), 1.0);
        assert_relative_eq!(morphed.integral(), -10.0);
    }

    #[test]
    fn test_zero_integral_is_an_error() {
        let basis = basis(vec![10.0], vec![20.0]);
        let target = CouplingPoint::new([("g1", 2.0), ("g2", -1.0)]);
        let err = evaluate(&basis, &target, 5.0).unwrap_err();
        assert!(err.tuple().is_some());
        assert!(evaluate(&basis, &CouplingPoint::new([("g1", 1.0)]), 1.0).is_err());
    }
}
