#[path = "../util/mod.rs"]
mod util;

use criterion::{
    Bencher, BenchmarkId, Criterion, SamplingMode, criterion_group, criterion_main,
    measurement::WallTime,
};
use palettize::{
    Histogram, PaletteSize,
    quantize::{KmeansRefinement, Octree, Quantizer, Wu},
};
use std::time::Duration;
use util::benchmark_histograms;

fn bench(
    c: &mut Criterion,
    group: &str,
    mut f: impl FnMut(&mut Bencher<'_, WallTime>, &(PaletteSize, &Histogram)),
) {
    let mut group = c.benchmark_group(group);
    group
        .sample_size(30)
        .noise_threshold(0.05)
        .sampling_mode(SamplingMode::Flat)
        .warm_up_time(Duration::from_millis(500));

    for k in [PaletteSize::MAX, PaletteSize::from_u8_clamped(16)] {
        for (name, histogram) in benchmark_histograms() {
            group.bench_with_input(BenchmarkId::new(k.to_string(), name), &(k, histogram), &mut f);
        }
    }
}

fn quantizer(c: &mut Criterion, name: &str, quantizer: impl Quantizer) {
    bench(c, name, |b, &(k, histogram)| b.iter(|| quantizer.quantize(histogram, k, 0)));
}

fn wu(c: &mut Criterion) {
    quantizer(c, "wu", Wu);
}

fn octree(c: &mut Criterion) {
    quantizer(c, "octree", Octree);
}

fn wu_kmeans(c: &mut Criterion) {
    quantizer(c, "wu_kmeans", KmeansRefinement::new(Wu, 8));
}

fn sample(c: &mut Criterion) {
    bench(c, "sample", |b, &(_, histogram)| b.iter(|| histogram.sample(4096, 0)));
}

criterion_group!(benches, wu, octree, wu_kmeans, sample);
criterion_main!(benches);
