use crate::{
    dither::{
        Adaptive, Barycentric, BlueNoise, Curve, Dbs, Ditherer, Dizzy, ErrorDiffusion,
        GradientAware, InterleavedGradientNoise, Knoll, NClosest, NConvex, NamedKernel,
        NoDithering, Noise, NoiseKind, Ordered, Ostromoukhov, Riemersma, StructureAware,
        ThresholdMatrix, Tin, VoidAndCluster, Yliluoma1, Yliluoma2, Yliluoma3,
    },
    quantize::{
        AcoOptimizer, AcoQuantizer, AcoRefinement, Adu, BinarySplitting, BisectingKmeans,
        BitReduction, ColorQuantizationNetwork, FuzzyCMeans, GaussianMixture, IncrementalKmeans,
        Kmeans, KmeansRefinement, MedianCut, NeuQuant, Octree, PcaQuantizer, Popularity,
        Quantizer, Uniform, VarianceCut, Wu,
    },
};
use alloc::{boxed::Box, vec::Vec};
use core::fmt;

/// A boxed quantizer as returned by [`Registry::quantizer`].
type BoxedQuantizer = Box<dyn Quantizer + Send + Sync>;

/// A boxed ditherer as returned by [`Registry::ditherer`].
type BoxedDitherer = Box<dyn Ditherer + Send + Sync>;

type QuantizerFactory = Box<dyn Fn() -> BoxedQuantizer + Send + Sync>;

/// Ditherer factories receive the registry seed for their noise tiles and traversal orders.
type DithererFactory = Box<dyn Fn(u64) -> BoxedDitherer + Send + Sync>;

/// A lookup table from names to quantizer and ditherer factories.
///
/// [`Registry::new`] holds every quantizer and ditherer of this crate under a kebab-case name.
/// Each lookup builds a fresh instance. Additional factories can be added with
/// [`register_quantizer`](Self::register_quantizer) and
/// [`register_ditherer`](Self::register_ditherer), replacing any entry with the same name.
///
/// # Examples
///
/// ```
/// use palettize::Registry;
///
/// let registry = Registry::new().seed(42);
/// assert!(registry.quantizer("wu").is_some());
/// assert!(registry.ditherer("floyd-steinberg").is_some());
/// assert!(registry.ditherer("unknown").is_none());
/// ```
pub struct Registry {
    /// The seed passed to ditherer factories.
    seed: u64,
    /// Quantizer factories in registration order.
    quantizers: Vec<(&'static str, QuantizerFactory)>,
    /// Ditherer factories in registration order.
    ditherers: Vec<(&'static str, DithererFactory)>,
}

impl Registry {
    /// Create a [`Registry`] with no entries.
    #[must_use]
    pub const fn empty() -> Self {
        Self { seed: 0, quantizers: Vec::new(), ditherers: Vec::new() }
    }

    /// Create a [`Registry`] with every quantizer and ditherer of this crate and a seed of `0`.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtin_quantizers();
        registry.register_builtin_ditherers();
        registry
    }

    /// Sets the seed passed to ditherer factories.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Returns the seed passed to ditherer factories.
    #[inline]
    pub const fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Add a quantizer factory under `name`, replacing any previous quantizer with that name.
    pub fn register_quantizer<Q, F>(&mut self, name: &'static str, factory: F)
    where
        Q: Quantizer + Send + Sync + 'static,
        F: Fn() -> Q + Send + Sync + 'static,
    {
        let factory: QuantizerFactory = Box::new(move || Box::new(factory()));
        insert(&mut self.quantizers, name, factory);
    }

    /// Add a ditherer factory under `name`, replacing any previous ditherer with that name.
    ///
    /// The factory receives the registry seed.
    pub fn register_ditherer<D, F>(&mut self, name: &'static str, factory: F)
    where
        D: Ditherer + Send + Sync + 'static,
        F: Fn(u64) -> D + Send + Sync + 'static,
    {
        let factory: DithererFactory = Box::new(move |seed| Box::new(factory(seed)));
        insert(&mut self.ditherers, name, factory);
    }

    /// Build the quantizer registered under `name`.
    #[must_use]
    pub fn quantizer(&self, name: &str) -> Option<BoxedQuantizer> {
        self.quantizers.iter().find(|&&(n, _)| n == name).map(|(_, factory)| factory())
    }

    /// Build the ditherer registered under `name` with the registry seed.
    #[must_use]
    pub fn ditherer(&self, name: &str) -> Option<BoxedDitherer> {
        let seed = self.seed;
        self.ditherers.iter().find(|&&(n, _)| n == name).map(|(_, factory)| factory(seed))
    }

    /// Returns the names of the registered quantizers in registration order.
    pub fn quantizer_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.quantizers.iter().map(|&(name, _)| name)
    }

    /// Returns the names of the registered ditherers in registration order.
    pub fn ditherer_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ditherers.iter().map(|&(name, _)| name)
    }

    fn register_builtin_quantizers(&mut self) {
        self.register_quantizer("uniform", || Uniform);
        self.register_quantizer("popularity", Popularity::new);
        self.register_quantizer("octree", || Octree);
        self.register_quantizer("median-cut", || MedianCut);
        self.register_quantizer("variance-cut", || VarianceCut);
        self.register_quantizer("wu", || Wu);
        self.register_quantizer("binary-splitting", || BinarySplitting);
        self.register_quantizer("kmeans", Kmeans::new);
        self.register_quantizer("bisecting-kmeans", BisectingKmeans::new);
        self.register_quantizer("incremental-kmeans", IncrementalKmeans::new);
        self.register_quantizer("fuzzy-c-means", FuzzyCMeans::new);
        self.register_quantizer("gaussian-mixture", GaussianMixture::new);
        self.register_quantizer("neuquant", NeuQuant::new);
        self.register_quantizer("color-quantization-network", ColorQuantizationNetwork::new);
        self.register_quantizer("adu", Adu::new);
        self.register_quantizer("pca", || PcaQuantizer);
        self.register_quantizer("aco", AcoQuantizer::new);
        self.register_quantizer("wu-kmeans", || KmeansRefinement::new(Wu, 8));
        self.register_quantizer("wu-aco", || AcoRefinement::new(Wu, AcoOptimizer::new()));
        self.register_quantizer("wu-5-bit", || BitReduction::new(Wu, 5));
        self.register_quantizer("octree-kmeans", || KmeansRefinement::new(Octree, 8));
    }

    fn register_builtin_ditherers(&mut self) {
        self.register_ditherer("none", |_| NoDithering);
        for kernel in NamedKernel::ALL {
            self.register_ditherer(kernel.name(), move |_| ErrorDiffusion::named(kernel));
        }
        self.register_ditherer("ostromoukhov", |_| Ostromoukhov::new());

        for (name, size) in [("bayer-2", 2), ("bayer-4", 4), ("bayer-8", 8), ("bayer-16", 16)] {
            if let Ok(ordered) = Ordered::bayer(size) {
                self.register_ditherer(name, move |_| ordered.clone());
            }
        }
        self.register_ditherer("halftone", |_| Ordered::new(ThresholdMatrix::halftone()));
        self.register_ditherer("cluster-dot", |_| Ordered::new(ThresholdMatrix::cluster_dot()));
        self.register_ditherer("diagonal", |_| Ordered::new(ThresholdMatrix::diagonal()));

        for kind in NoiseKind::ALL {
            self.register_ditherer(kind.name(), move |seed| Noise::new(kind, seed));
        }
        self.register_ditherer("blue-noise", BlueNoise::new);
        self.register_ditherer("void-and-cluster", VoidAndCluster::new);
        self.register_ditherer("interleaved-gradient-noise", |_| InterleavedGradientNoise);

        self.register_ditherer("yliluoma-1", |_| Yliluoma1::new());
        self.register_ditherer("yliluoma-2", |_| Yliluoma2::new());
        self.register_ditherer("yliluoma-3", |_| Yliluoma3::new());
        self.register_ditherer("knoll", |_| Knoll::new());

        self.register_ditherer("riemersma-hilbert", |_| Riemersma::new(Curve::Hilbert));
        self.register_ditherer("riemersma-peano", |_| Riemersma::new(Curve::Peano));
        self.register_ditherer("riemersma-linear", |_| Riemersma::new(Curve::Linear));
        self.register_ditherer("riemersma-serpentine", |_| Riemersma::new(Curve::Serpentine));

        self.register_ditherer("structure-aware", |_| StructureAware::new());
        self.register_ditherer("gradient-aware", |_| GradientAware::new());
        self.register_ditherer("adaptive", |_| Adaptive::new());
        self.register_ditherer("dbs", |_| Dbs::new());
        self.register_ditherer("dizzy", Dizzy::new);

        self.register_ditherer("n-closest", |_| NClosest::new());
        self.register_ditherer("barycentric", |_| Barycentric);
        self.register_ditherer("tin", |_| Tin);
        self.register_ditherer("n-convex", |_| NConvex::new());
    }
}

/// Replace the entry named `name` or append a new one.
fn insert<T>(entries: &mut Vec<(&'static str, T)>, name: &'static str, value: T) {
    if let Some(entry) = entries.iter_mut().find(|(n, _)| *n == name) {
        entry.1 = value;
    } else {
        entries.push((name, value));
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("seed", &self.seed)
            .field("quantizers", &self.quantizer_names().collect::<Vec<_>>())
            .field("ditherers", &self.ditherer_names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Histogram, PaletteSize,
        color_map::{ColorMap, DistanceMetric},
        dither::dither_image,
        tests::*,
    };
    use alloc::collections::BTreeSet;

    #[test]
    fn names_are_unique() {
        let registry = Registry::new();
        let quantizers = registry.quantizer_names().collect::<Vec<_>>();
        let ditherers = registry.ditherer_names().collect::<Vec<_>>();
        assert_eq!(quantizers.len(), quantizers.iter().collect::<BTreeSet<_>>().len());
        assert_eq!(ditherers.len(), ditherers.iter().collect::<BTreeSet<_>>().len());
        assert!(quantizers.len() >= 17);
        assert!(ditherers.len() >= 45);
    }

    #[test]
    fn every_name_builds() {
        let registry = Registry::new();
        for name in registry.quantizer_names() {
            assert!(registry.quantizer(name).is_some(), "{name}");
        }
        for name in registry.ditherer_names() {
            assert!(registry.ditherer(name).is_some(), "{name}");
        }
        assert!(registry.quantizer("floyd-steinberg").is_none());
        assert!(registry.ditherer("wu").is_none());
    }

    #[test]
    fn every_quantizer_respects_the_size() {
        let registry = Registry::new();
        let image = colorful_image(24, 24);
        let histogram = Histogram::from_image(image.as_ref());
        let size = PaletteSize::from_u8_clamped(8);
        for name in registry.quantizer_names() {
            let quantizer = registry.quantizer(name).unwrap();
            let palette = quantizer.quantize(&histogram, size, 1);
            assert!(!palette.is_empty(), "{name}");
            assert!(palette.len() <= 8, "{name}: {}", palette.len());
        }
    }

    #[test]
    fn sequential_flags() {
        let registry = Registry::new();
        let sequential = |name| registry.ditherer(name).unwrap().requires_sequential_processing();
        for name in ["floyd-steinberg", "ostromoukhov", "riemersma-peano", "dbs", "dizzy"] {
            assert!(sequential(name), "{name}");
        }
        for name in ["none", "bayer-8", "white-noise", "yliluoma-2", "knoll", "n-convex"] {
            assert!(!sequential(name), "{name}");
        }
    }

    #[test]
    fn seed_reaches_ditherers() {
        let color_map = ColorMap::new(black_white(), DistanceMetric::EuclideanRgb).unwrap();
        let image = gradient_image(32, 8);
        let run = |seed| {
            let ditherer = Registry::new().seed(seed).ditherer("white-noise").unwrap();
            dither_image(&ditherer, image.as_ref(), &color_map, false)
        };
        assert_eq!(run(5), run(5));
        assert_ne!(run(5), run(6));
    }

    #[test]
    fn registration_replaces() {
        let mut registry = Registry::empty();
        registry.register_ditherer("custom", |_| NoDithering);
        registry.register_ditherer("custom", |_| Dbs::new());
        registry.register_quantizer("custom", || Wu);
        assert_eq!(registry.ditherer_names().collect::<Vec<_>>(), ["custom"]);
        assert!(registry.ditherer("custom").unwrap().requires_sequential_processing());
        assert_eq!(registry.quantizer_names().count(), 1);
    }
}
