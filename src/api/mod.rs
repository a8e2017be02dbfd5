mod pipeline;
mod registry;

pub use pipeline::{DEFAULT_MAX_HISTOGRAM_SIZE, Pipeline, ReduceColorsError, reduce_colors};
pub use registry::Registry;
