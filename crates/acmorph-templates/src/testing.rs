use std::sync::Arc;

use acmorph_core::{
    required_samples, Analysis, AnalysisConfig, Axis, Dataset, EventData, EventSchema,
    EventSource, FlowPolicy, ProductionMode, Provenance, SampleRegistry, TemplateBinning,
};

pub(crate) fn config() -> AnalysisConfig {
    AnalysisConfig::default().with_binning(TemplateBinning::new(
        [
            Axis::new("D_bkg", 4, (0.0, 1.0)),
            Axis::new("D_0minus_decay", 5, (0.0, 1.0)),
            Axis::new("D_CP_decay", 4, (-1.0, 1.0)),
        ],
        FlowPolicy::Fold,
    ))
}

// each sample gets its own shape so that the raw histograms are linearly independent
pub(crate) fn dataset(rng: &mut fastrand::Rng, shape: usize, n: usize) -> Arc<dyn EventSource> {
    let schema = EventSchema::new(
        vec![
            "ZZMass",
            "MC_weight",
            "D_bkg",
            "D_0minus_decay",
            "D_CP_decay",
        ],
        Vec::<String>::new(),
    )
    .unwrap();
    let power = 1.0 + shape as f64;
    let events = (0..n)
        .map(|_| {
            EventData::new(
                vec![
                    110.0 + 25.0 * rng.f64(),
                    0.5 + rng.f64(),
                    rng.f64(),
                    rng.f64().powf(power),
                    (2.0 * rng.f64() - 1.0) * rng.f64().powf(1.0 / power),
                ],
                vec![],
            )
        })
        .collect();
    Arc::new(Dataset::new(Arc::new(schema), events).unwrap())
}

pub(crate) fn registry(production: ProductionMode, analysis: Analysis, n: usize) -> SampleRegistry {
    normalized_registry(production, analysis, n, &[])
}

// sample i is registered with normalization normalizations[i], or 1 past the end
pub(crate) fn normalized_registry(
    production: ProductionMode,
    analysis: Analysis,
    n: usize,
    normalizations: &[f64],
) -> SampleRegistry {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let registry = SampleRegistry::preloaded();
    let samples = required_samples(production, analysis, &Provenance::default()).unwrap();
    for (shape, sample) in samples.into_iter().enumerate() {
        let normalization = normalizations.get(shape).copied().unwrap_or(1.0);
        registry
            .register(
                &sample.with_normalization(normalization),
                dataset(&mut rng, shape, n),
            )
            .unwrap();
    }
    registry
}
