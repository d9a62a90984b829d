//! DBN greedy pretraining binary.
//!
//! Loads an image batch (or synthesizes one), pretrains a stack of RBMs layer
//! by layer, appends per-layer per-epoch metrics to a JSONL file, and writes a
//! checkpoint archive.
//!
//! ## Usage
//!
//! ```bash
//! dbn-pretrain \
//!   --data data/images.json \
//!   --layer-sizes 784,256,64 \
//!   --epochs 20 --batch-size 64 --cd-steps 1 \
//!   --output data/checkpoints/dbn.json
//! ```

use clap::Parser;
use dbn::data::image::load_image_batch;
use dbn::{Config, DbnError, DbnResult, StackedModel};
use ndarray::{ArrayD, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "dbn-pretrain",
    about = "Greedy layer-wise pretraining of a stack of RBMs"
)]
struct Args {
    /// Image batch file: {"dtype": "float32", "shape": [n, h, w(, c)], "data": [...]}
    #[arg(long, conflicts_with = "synthetic")]
    data: Option<PathBuf>,

    /// Train on N random grayscale images instead of a data file
    #[arg(long)]
    synthetic: Option<usize>,

    /// Side length of synthetic square images
    #[arg(long, default_value_t = 8)]
    synthetic_side: usize,

    /// Layer sizes, bottom (visible) first
    #[arg(long, value_delimiter = ',', default_value = "64,32,16")]
    layer_sizes: Vec<usize>,

    /// TOML training config; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Epochs per layer
    #[arg(long)]
    epochs: Option<usize>,

    /// Mini-batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Gibbs steps per CD update
    #[arg(long)]
    cd_steps: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f32>,

    #[arg(long)]
    momentum: Option<f32>,

    #[arg(long)]
    weight_decay: Option<f32>,

    /// Random seed for initialization, sampling, and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Output metrics file (JSONL)
    #[arg(long, default_value = "data/output/dbn-metrics.jsonl")]
    metrics_file: PathBuf,

    /// Checkpoint archive to write
    #[arg(long, default_value = "data/checkpoints/dbn.json")]
    output: PathBuf,
}

impl Args {
    fn resolve_config(&self) -> DbnResult<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(cd_steps) = self.cd_steps {
            config.cd_steps = cd_steps;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.hyperparams.learning_rate = learning_rate;
        }
        if let Some(momentum) = self.momentum {
            config.hyperparams.momentum = momentum;
        }
        if let Some(weight_decay) = self.weight_decay {
            config.hyperparams.weight_decay = weight_decay;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }

    fn load_images(&self, config: &Config) -> DbnResult<ArrayD<f32>> {
        match (&self.data, self.synthetic) {
            (Some(path), _) => load_image_batch(path),
            (None, Some(n)) => {
                let mut rng = dbn::random_source(config.seed);
                let side = self.synthetic_side;
                Ok(ArrayD::random_using(
                    IxDyn(&[n, side, side]),
                    Uniform::new(0.0f32, 1.0),
                    &mut rng,
                ))
            }
            (None, None) => Err(DbnError::InvalidConfig(
                "provide --data <file> or --synthetic <n>".to_string(),
            )),
        }
    }
}

fn run(args: &Args) -> DbnResult<()> {
    let config = args.resolve_config()?;
    let images = args.load_images(&config)?;
    log::info!("Loaded image batch with shape {:?}", images.shape());

    let mut model =
        StackedModel::with_hyperparams(args.layer_sizes.clone(), config.hyperparams, config.seed)?;
    log::info!("Stack: {:?}", model.layer_sizes());
    log::info!(
        "Epochs/layer: {}, batch size: {}, CD-{}",
        config.epochs,
        config.batch_size,
        config.cd_steps
    );
    log::info!("Hyperparams: {:?}", config.hyperparams);

    let start = Instant::now();
    let report = model.pretrain(&images, config.epochs, config.batch_size, config.cd_steps)?;
    log::info!("Pretraining finished in {:.1}s", start.elapsed().as_secs_f32());

    for (layer, final_error) in report.final_errors().iter().enumerate() {
        match final_error {
            Some(error) => log::info!("  layer {layer}: final reconstruction_error={error:.6}"),
            None => log::warn!("  layer {layer}: no complete minibatch, nothing trained"),
        }
    }

    if let Some(parent) = args.metrics_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut metrics_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.metrics_file)?;
    for record in report.records() {
        writeln!(metrics_file, "{}", serde_json::to_string(&record)?)?;
    }

    model.save(&args.output)?;
    log::info!("Checkpoint saved: {}", args.output.display());
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
