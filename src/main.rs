use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use dmfusion::{logging, DeviceType, FusionTrainer, TrainingConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "dmfusion")]
#[command(about = "Train decision-map image fusion networks", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a fusion network
    Train(TrainArgs),

    /// Validate configuration file
    Config {
        /// Configuration file to validate
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show system information
    Info,
}

#[derive(Args)]
struct TrainArgs {
    /// Configuration file (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset root containing train/ and validate/
    #[arg(long, env = "DMFUSION_DATA_PATH")]
    data_path: Option<PathBuf>,

    /// Directory receiving run logs and weights
    #[arg(long)]
    save_path: Option<PathBuf>,

    /// Maximum number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Initial learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Number of training samples per modality
    #[arg(long)]
    set_size: Option<usize>,

    /// Epochs without improvement before stopping
    #[arg(long)]
    patience: Option<usize>,

    /// Compute device: auto, cpu, cuda[:N], metal[:N]
    #[arg(long)]
    device: Option<DeviceType>,

    /// Seed for data shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,
}

impl TrainArgs {
    fn into_config(self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration file {}", path.display()))?,
            None => TrainingConfig::default(),
        };

        if let Some(data_path) = self.data_path {
            config.data_path = data_path;
        }
        if let Some(save_path) = self.save_path {
            config.save_path = save_path;
        }
        if let Some(epochs) = self.epochs {
            config.hyperparams.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.hyperparams.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            config.hyperparams.lr = lr;
        }
        if let Some(set_size) = self.set_size {
            config.hyperparams.set_size = set_size;
        }
        if let Some(patience) = self.patience {
            config.hyperparams.patience = patience;
        }
        if let Some(device) = self.device {
            config.runtime.device = device;
        }
        if let Some(seed) = self.seed {
            config.data.seed = Some(seed);
        }
        if self.quiet {
            config.runtime.quiet = true;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.json)?;

    match cli.command {
        Commands::Train(args) => train(args)?,
        Commands::Config { file } => validate_config(file)?,
        Commands::Info => show_system_info(),
    }

    Ok(())
}

fn train(args: TrainArgs) -> Result<()> {
    let config = args.into_config()?;
    info!("Data path: {}", config.data_path.display());

    let trainer = FusionTrainer::new(config).context("Failed to initialize trainer")?;
    let result = trainer.run().context("Training failed")?;

    info!(
        "Finished {} epochs{}, best val_loss {:.4}",
        result.epochs_run(),
        if result.early_stopped { " (early stopped)" } else { "" },
        result.best_val_loss
    );
    if let Some(run_dir) = &result.run_dir {
        info!("Outputs saved to: {}", run_dir.display());
    }

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    info!("Validating configuration file: {}", config_path.display());

    let config = TrainingConfig::from_file(&config_path)
        .context("Failed to load configuration file")?;
    config.validate().context("Configuration is invalid")?;

    let hp = &config.hyperparams;
    info!("Configuration is valid");
    info!("Configuration summary:");
    info!("  - Data: {} ({:?}, resize {:?})", config.data_path.display(), config.data.color, config.data.resize);
    info!("  - Samples: {} train / {} validation", hp.set_size, config.validation_size());
    info!("  - Epochs: {}, batch size: {}, patience: {}", hp.epochs, hp.batch_size, hp.patience);
    info!("  - Learning rate: {} (x{} every {} epochs)", hp.lr, hp.gamma, hp.scheduler_step);
    info!(
        "  - Mixed precision: {} ({:?})",
        config.mixed_precision.enabled, config.mixed_precision.precision
    );
    info!("  - Device: {:?}", config.runtime.device);

    Ok(())
}

fn show_system_info() {
    println!("DMFusion - decision-map fusion training");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Hardware support:");

    #[cfg(feature = "cuda")]
    println!("  ✅ NVIDIA CUDA GPU acceleration");
    #[cfg(not(feature = "cuda"))]
    println!("  ❌ CUDA support (not compiled)");

    #[cfg(feature = "metal")]
    println!("  ✅ Apple Metal GPU acceleration");
    #[cfg(not(feature = "metal"))]
    println!("  ❌ Metal support (not compiled)");

    #[cfg(feature = "accelerate")]
    println!("  ✅ Apple Accelerate framework");
    #[cfg(not(feature = "accelerate"))]
    println!("  ❌ Accelerate support (not compiled)");

    println!("  ✅ CPU training");
    println!();
    println!("Usage:");
    println!("  dmfusion train --data-path ./data --epochs 200");
    println!("  dmfusion train -c config.yaml");
    println!("  dmfusion config -f config.yaml   # Validate configuration");
    println!("  dmfusion info                    # Show this information");
}
