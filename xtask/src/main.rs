use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod tasks;

#[derive(Parser)]
#[command(
    name = "cloud-unet",
    about = "U-Net cloud segmentation toolkit for satellite imagery",
    author,
    version
)]
struct Cli {
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Train(tasks::train::TrainArgs),
    Infer(tasks::infer::InferArgs),
    Preprocess(tasks::preprocess::PreprocessArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match &cli.command {
        Commands::Train(args) => tasks::train::run(args),
        Commands::Infer(args) => tasks::infer::run(args),
        Commands::Preprocess(args) => tasks::preprocess::run(args),
    }
}
