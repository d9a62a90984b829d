//! DBN feature extraction binary.
//!
//! Loads a checkpoint and an image batch, writes the top-layer features (and
//! optionally a stochastic reconstruction with its MSE) as JSON array records.

use clap::Parser;
use dbn::checkpoint::ArrayRecord;
use dbn::data::image::load_image_batch;
use dbn::{preprocess, DbnResult, StackedModel};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "dbn-features",
    about = "Extract features from a pretrained DBN checkpoint"
)]
struct Args {
    /// Checkpoint archive written by dbn-pretrain
    #[arg(long, default_value = "data/checkpoints/dbn.json")]
    checkpoint: PathBuf,

    /// Image batch file (same record format as dbn-pretrain)
    #[arg(long)]
    data: PathBuf,

    /// Output JSON file
    #[arg(long, default_value = "data/output/features.json")]
    output: PathBuf,

    /// Also reconstruct the batch through the full stack
    #[arg(long, default_value_t = false)]
    reconstruct: bool,

    /// Seed for the stochastic down pass
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct FeatureOutput {
    features: ArrayRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    reconstruction: Option<ArrayRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reconstruction_mse: Option<f32>,
}

fn run(args: &Args) -> DbnResult<()> {
    let mut model = StackedModel::load(&args.checkpoint, args.seed)?;
    log::info!(
        "Loaded checkpoint {}: layers {:?}, image shape {:?}",
        args.checkpoint.display(),
        model.layer_sizes(),
        model.image_shape()
    );

    let images = load_image_batch(&args.data)?;
    let features = model.extract_features(&images)?;
    log::info!("Extracted features with shape {:?}", features.dim());

    let mut output = FeatureOutput {
        features: ArrayRecord::from_array(&features),
        reconstruction: None,
        reconstruction_mse: None,
    };

    if args.reconstruct {
        let (data, _) = preprocess(&images)?;
        let reconstruction = model.reconstruct(&data)?;
        let mse = dbn::utils::mean_squared_error(&data, &reconstruction);
        log::info!("Reconstruction MSE={mse:.6}");
        output.reconstruction = Some(ArrayRecord::from_array(&reconstruction));
        output.reconstruction_mse = Some(mse);
    }

    if let Some(parent) = args.output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.output, serde_json::to_string(&output)?)?;
    log::info!("Features written: {}", args.output.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
