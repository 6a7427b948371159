use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dml_core::FoldPartition;
use dml_inference::{IivmOptions, Model, ModelKind, SimulationConfig, cross_fit, simulate};
use dml_learners::LearnerKind;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::hint::black_box;

fn bench_crossfit(c: &mut Criterion) {
    let mut group = c.benchmark_group("crossfit");
    group.sample_size(20);

    for (kind, learner) in [
        (ModelKind::Plr, LearnerKind::Ols),
        (ModelKind::Plr, LearnerKind::Lasso),
        (ModelKind::Irm, LearnerKind::Lasso),
        (ModelKind::Iivm, LearnerKind::Ols),
    ] {
        let cfg =
            SimulationConfig { model: kind, n_obs: 1000, n_features: 20, ..Default::default() };
        let data = simulate(&cfg).unwrap();
        let model = Model::from_learner_kind(kind, learner, &data, IivmOptions::default());
        let partition =
            FoldPartition::random(data.n_obs(), 3, &mut StdRng::seed_from_u64(0)).unwrap();

        for parallel in [false, true] {
            let id = format!("{kind}_{learner:?}_{}", if parallel { "par" } else { "seq" });
            group.bench_with_input(BenchmarkId::from_parameter(id), &parallel, |b, &parallel| {
                b.iter(|| {
                    let mut rng = StdRng::seed_from_u64(1);
                    black_box(cross_fit(&data, &model, &partition, &mut rng, parallel)).unwrap()
                })
            });
        }
    }
    group.finish();
}

fn bench_forest_irm(c: &mut Criterion) {
    let kind = ModelKind::Irm;
    let cfg = SimulationConfig { model: kind, n_obs: 500, n_features: 10, ..Default::default() };
    let data = simulate(&cfg).unwrap();
    let model = Model::from_learner_kind(kind, LearnerKind::Forest, &data, IivmOptions::default());
    let partition = FoldPartition::random(data.n_obs(), 3, &mut StdRng::seed_from_u64(0)).unwrap();

    let mut group = c.benchmark_group("crossfit_forest");
    group.sample_size(10);
    group.bench_function("irm_forest_500", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(1);
            black_box(cross_fit(&data, &model, &partition, &mut rng, false)).unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_crossfit, bench_forest_irm);
criterion_main!(benches);
