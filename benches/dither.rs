#[path = "../util/mod.rs"]
mod util;

use criterion::{BenchmarkId, Criterion, SamplingMode, criterion_group, criterion_main};
use palettize::{
    PaletteSize, Registry,
    color_map::{ColorMap, DistanceMetric},
    dither::dither_image,
    quantize::{Quantizer as _, Wu},
};
use std::time::Duration;
use util::{benchmark_histograms, benchmark_images};

const DITHERERS: [&str; 8] = [
    "none",
    "floyd-steinberg",
    "ostromoukhov",
    "bayer-8",
    "blue-noise",
    "riemersma-hilbert",
    "yliluoma-2",
    "n-closest",
];

fn dither(c: &mut Criterion) {
    let registry = Registry::new();
    let mut group = c.benchmark_group("dither");
    group
        .sample_size(10)
        .noise_threshold(0.05)
        .sampling_mode(SamplingMode::Flat)
        .warm_up_time(Duration::from_millis(500));

    let k = PaletteSize::from_u8_clamped(16);
    for ((name, image), (_, histogram)) in benchmark_images().iter().zip(benchmark_histograms()) {
        let palette = Wu.quantize(histogram, k, 0);
        let color_map = ColorMap::new(palette, DistanceMetric::EuclideanRgb).unwrap();
        for ditherer_name in DITHERERS {
            let ditherer = registry.ditherer(ditherer_name).unwrap();
            for parallel in [false, true] {
                let id = BenchmarkId::new(format!("{ditherer_name}/parallel={parallel}"), name);
                group.bench_function(id, |b| {
                    b.iter(|| dither_image(&ditherer, image.as_ref(), &color_map, parallel));
                });
            }
        }
    }
}

criterion_group!(benches, dither);
criterion_main!(benches);
