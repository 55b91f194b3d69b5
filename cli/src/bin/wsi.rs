use clap::{Args, Parser, Subcommand};
use cli::PipelineConfig;
use color_eyre::eyre::{Result, eyre};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};
use wsi_grid::{
    Dataset, ExtractConfig, FailurePolicy, GridDataset, PatchExtractor, PatchFormat,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample one patch per coordinate from the slides
    Extract(ExtractArgs),
    /// Write the crops of one training sample as images, named by label
    Preview {
        /// Configuration file with a `dataset` section
        #[arg(short, long)]
        config: PathBuf,
        /// Sample index
        #[arg(short, long, default_value = "0")]
        index: usize,
        /// Directory receiving `<cell>_label<0|1>.png`
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the JSON schema of the configuration file
    Schema,
}

#[derive(Args)]
struct ExtractArgs {
    /// Directory holding the slide files
    #[arg(required_unless_present = "config")]
    slide_dir: Option<PathBuf>,
    /// Coordinate list, one `slide_id,x_center,y_center` per line
    #[arg(required_unless_present = "config")]
    coords_path: Option<PathBuf>,
    /// Output directory for patches and list.txt
    #[arg(required_unless_present = "config")]
    output_dir: Option<PathBuf>,
    /// Read the `extract` section of this file instead of the arguments
    #[arg(short, long, conflicts_with_all = ["slide_dir", "coords_path", "output_dir"])]
    config: Option<PathBuf>,
    /// Patch side in pixels at the sampled level
    #[arg(long, default_value = "768")]
    patch_size: u32,
    /// Pyramid level to sample
    #[arg(long, default_value = "0")]
    level: u32,
    #[arg(long, default_value = "5")]
    num_workers: usize,
    /// Slide file extension
    #[arg(long, default_value = "tif")]
    extension: String,
    /// Patch file format: png, jpeg or tiff
    #[arg(long, default_value = "png")]
    format: PatchFormat,
    /// What to do when one item fails: abort or skip
    #[arg(long, default_value = "abort")]
    on_error: FailurePolicy,
}

impl ExtractArgs {
    fn into_config(self) -> Result<ExtractConfig> {
        if let Some(path) = self.config {
            let config = PipelineConfig::from_file(&path)?;
            return Ok(config.extract_section()?.clone());
        }
        let (Some(slide_dir), Some(coords_path), Some(output_dir)) =
            (self.slide_dir, self.coords_path, self.output_dir)
        else {
            return Err(eyre!("slide_dir, coords_path and output_dir are required without --config"));
        };

        let mut config = ExtractConfig::new(slide_dir, coords_path, output_dir);
        config.patch_size = self.patch_size;
        config.level = self.level;
        config.num_workers = self.num_workers;
        config.slide_extension = self.extension;
        config.patch_format = self.format;
        config.on_error = self.on_error;
        Ok(config)
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract(args) => extract(args.into_config()?)?,
        Commands::Preview {
            config,
            index,
            output,
        } => preview(&config, index, &output)?,
        Commands::Schema => println!("{}", PipelineConfig::schema()?),
    }

    Ok(())
}

fn extract(config: ExtractConfig) -> Result<()> {
    info!(
        "Extracting from {:?} listed in {:?} into {:?}",
        config.slide_dir, config.coords_path, config.output_dir
    );
    let report = PatchExtractor::from_config(config).run()?;

    if !report.failed.is_empty() {
        warn!("Failed items: {:?}", report.failed);
    }
    info!("✅ {} of {} patches extracted", report.completed, report.total);
    Ok(())
}

fn preview(config_path: &Path, index: usize, output: &Path) -> Result<()> {
    let config = PipelineConfig::from_file(config_path)?;
    let dataset_config = config.dataset_section()?.clone();
    let normalized = dataset_config.normalize;

    let dataset = GridDataset::new(dataset_config)?;
    let sample = dataset.get(index)?;
    info!(
        "Sample {} of {}: transform {:?}, {} positive cells",
        index,
        dataset.size(),
        sample.transform,
        sample.labels.iter().filter(|&&label| label == 1.0).count()
    );

    std::fs::create_dir_all(output)?;
    for (cell, label) in sample.labels.iter().enumerate() {
        let path = output.join(format!("{}_label{}.png", cell, *label as u8));
        sample.crop_image(cell, normalized).save(&path)?;
    }

    info!("📄 Wrote {} crops to {:?}", sample.len(), output);
    Ok(())
}
