use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "facecheck", about = "Face registration and check-in console")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face from a photo file or the webcam
    Register {
        /// Display name for the new record
        #[arg(short, long)]
        name: String,
        /// Photo file; captures from the webcam when omitted
        #[arg(short, long)]
        photo: Option<PathBuf>,
    },
    /// Check in with a photo file or the webcam
    Checkin {
        /// Photo file; captures from the webcam when omitted
        #[arg(short, long)]
        photo: Option<PathBuf>,
    },
    /// List registered users
    List,
    /// Remove a registered user by record id
    Remove {
        /// Record id (as shown by `list`)
        id: String,
    },
    /// Watch the webcam live and label detected faces
    Watch,
    /// List available capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = CliConfig::from_env();

    match cli.command {
        Commands::Register { name, photo } => {
            tokio::task::spawn_blocking(move || commands::register(&config, &name, photo.as_deref()))
                .await?
        }
        Commands::Checkin { photo } => {
            tokio::task::spawn_blocking(move || commands::checkin(&config, photo.as_deref())).await?
        }
        Commands::List => commands::list(&config),
        Commands::Remove { id } => commands::remove(&config, &id),
        Commands::Watch => {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flag.store(true, Ordering::Relaxed);
                }
            });
            tokio::task::spawn_blocking(move || commands::watch(&config, stop)).await?
        }
        Commands::Devices => commands::devices(),
    }
}
