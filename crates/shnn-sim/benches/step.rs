use std::time::Duration;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use shnn_sim::{DeliverTo, FixedProbability, NeuronKind, SimConfig, Snn, StatefulNeuronUpdate, SynapseKind, TickRng};

#[derive(Default, Clone, Copy)]
struct Lif {
    v: f32,
}

struct LifKind {
    leak: f32,
    threshold: f32,
}

impl NeuronKind for LifKind {
    type State = Lif;
}

impl StatefulNeuronUpdate for LifKind {
    fn update(&self, state: &mut Lif, dt: f32, _rng: &mut TickRng) -> bool {
        state.v *= 1.0 - self.leak * dt;
        if state.v >= self.threshold {
            state.v = 0.0;
            true
        } else {
            false
        }
    }
}

#[derive(Default, Clone, Copy)]
struct Weight {
    w: f32,
}

struct Static;
impl SynapseKind for Static {
    type State = Weight;
}
impl DeliverTo<Lif> for Static {
    fn deliver(&self, syn: &Weight, dst: &mut Lif) {
        dst.v += syn.w;
    }
}

fn build(n: usize) -> Snn {
    let mut snn = Snn::new(SimConfig {
        dt: 1e-4,
        max_delay: Duration::from_millis(2),
        seed: 1337,
    })
    .unwrap();
    let a = snn.add_population_stateful(
        LifKind {
            leak: 0.1,
            threshold: 1.0,
        },
        n,
    );
    let b = snn.add_population_stateful(
        LifKind {
            leak: 0.1,
            threshold: 1.0,
        },
        n,
    );
    snn.connect_to::<Static, Lif>(
        a,
        b,
        Static,
        FixedProbability::new(0.1),
        Duration::from_millis(1),
    )
    .unwrap();
    snn
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("snn_sim_step");
    for &n in &[1_000usize, 5_000, 20_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("fixed_probability", n), &n, |bencher, &n| {
            bencher.iter_batched(
                || build(n),
                |mut snn| {
                    for _ in 0..50 {
                        snn.step();
                    }
                    snn
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
