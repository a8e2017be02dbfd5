use clap::{Parser, Subcommand};
use image::RgbImage;
use palette::Srgb;
use palettize::{ImageBuf, Pipeline, PaletteSize, Registry};
use std::{error::Error, path::PathBuf, time::Instant};
use tracing_subscriber::EnvFilter;

#[derive(Subcommand)]
enum Command {
    /// Reduce an image to an indexed palette and write the result as an RGB image.
    Reduce {
        input: PathBuf,

        output: PathBuf,

        #[arg(short, long, default_value_t = PaletteSize::MAX, value_parser = parse_palette_size)]
        k: PaletteSize,

        #[arg(short, long, default_value = "wu")]
        quantizer: String,

        #[arg(short, long, default_value = "floyd-steinberg")]
        ditherer: String,

        #[arg(long)]
        high_quality: bool,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[arg(long)]
        parallel: bool,
    },
    /// List the available quantizer and ditherer names.
    List,
}

#[derive(Parser)]
pub struct Options {
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn parse_palette_size(s: &str) -> Result<PaletteSize, String> {
    let value: u16 = s.parse().map_err(|e| format!("{e}"))?;
    value.try_into().map_err(|e| format!("{e}"))
}

fn main() -> Result<(), Box<dyn Error>> {
    let Options { verbose, command } = Options::parse();

    let filter = if verbose {
        EnvFilter::new("palettize=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match command {
        Command::List => {
            let registry = Registry::new();
            println!("quantizers:");
            for name in registry.quantizer_names() {
                println!("  {name}");
            }
            println!("ditherers:");
            for name in registry.ditherer_names() {
                println!("  {name}");
            }
        }
        Command::Reduce { input, output, k, quantizer, ditherer, high_quality, seed, parallel } => {
            let registry = Registry::new().seed(seed);
            let quantizer = registry
                .quantizer(&quantizer)
                .ok_or_else(|| format!("unknown quantizer: {quantizer}"))?;
            let ditherer = registry
                .ditherer(&ditherer)
                .ok_or_else(|| format!("unknown ditherer: {ditherer}"))?;

            let time = Instant::now();
            let image = ImageBuf::<Srgb<u8>>::try_from(image::open(input)?.into_rgb8())?;
            tracing::info!(elapsed_ms = time.elapsed().as_millis(), "read image");

            let time = Instant::now();
            let indexed = Pipeline::new()
                .palette_size(k)
                .quantizer(quantizer)
                .ditherer(ditherer)
                .high_quality(high_quality)
                .seed(seed)
                .parallel(parallel)
                .reduce(image.as_ref())?;
            tracing::info!(
                elapsed_ms = time.elapsed().as_millis(),
                colors = indexed.palette().len(),
                bit_depth = indexed.bit_depth().bits(),
                "reduced colors",
            );

            let time = Instant::now();
            RgbImage::from(indexed.to_image()).save(output)?;
            tracing::info!(elapsed_ms = time.elapsed().as_millis(), "wrote image");
        }
    }

    Ok(())
}
