use std::{sync::Arc, time::Duration};

use acmorph::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn dataset(rng: &mut fastrand::Rng, shape: usize, n: usize) -> Arc<dyn EventSource> {
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
                    105.0 + 35.0 * rng.f64(),
                    rng.f64(),
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

fn registry(production: ProductionMode, n: usize) -> SampleRegistry {
    let mut rng = fastrand::Rng::with_seed(0);
    let registry = SampleRegistry::preloaded();
    for (shape, sample) in required_samples(production, Analysis::Fa3, &Provenance::default())
        .unwrap()
        .iter()
        .enumerate()
    {
        registry
            .register(sample, dataset(&mut rng, shape, n))
            .unwrap();
    }
    registry
}

fn basis_build_benchmark(c: &mut Criterion) {
    let config = AnalysisConfig::default();
    let mut group = c.benchmark_group("Basis Build");
    for production in [ProductionMode::GGH, ProductionMode::VBF] {
        let registry = registry(production, 100_000);
        let context = BuildContext::new(&registry, &config);
        let key = BasisKey::new(
            production,
            Category::Untagged,
            Analysis::Fa3,
            SystematicVariant::Nominal,
        );
        group.bench_with_input(
            BenchmarkId::from_parameter(production),
            &key,
            |b, key| b.iter(|| black_box(TemplateBasis::build(*key, &context).unwrap())),
        );
    }
    group.finish();
}

fn evaluate_benchmark(c: &mut Criterion) {
    let config = AnalysisConfig::default();
    let mut group = c.benchmark_group("Morphed Evaluation");
    for production in [ProductionMode::GGH, ProductionMode::VBF] {
        let registry = registry(production, 10_000);
        let context = BuildContext::new(&registry, &config);
        let basis = TemplateBasis::build(
            BasisKey::new(
                production,
                Category::Untagged,
                Analysis::Fa3,
                SystematicVariant::Nominal,
            ),
            &context,
        )
        .unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(production),
            &basis,
            |b, basis| {
                let mut rng = fastrand::Rng::with_seed(1);
                b.iter_batched(
                    || {
                        CouplingPoint::new([
                            ("g1", 1.0),
                            ("g4", 4.0 * rng.f64() - 2.0),
                        ])
                    },
                    |target| black_box(evaluate_unnormalized(basis, &target).unwrap()),
                    BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = basis_build_benchmark, evaluate_benchmark
}
criterion_main!(benches);
