//! Shipfile remote resolver CLI

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use shipfile_remote::Remote;

#[derive(Parser)]
#[command(name = "shipfile-remote")]
#[command(about = "Resolve remote chart and state references into the local cache", long_about = None)]
#[command(version)]
struct Cli {
    /// Cache home directory (defaults to the platform user cache directory)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Cache namespace under the cache home
    #[arg(long, global = true)]
    cache_dir: Option<String>,

    /// Disable remote fetching entirely
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a reference, passing local paths through untouched
    Locate {
        /// Local path or remote source reference
        reference: String,
    },
    /// Fetch a remote reference into the cache
    Fetch {
        /// Remote source reference
        reference: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let remote = Remote::new(cli.home, !cli.offline)?;

    let resolved = match cli.command {
        Commands::Locate { reference } => remote.locate(&reference, cli.cache_dir.as_deref())?,
        Commands::Fetch { reference } => remote.fetch(&reference, cli.cache_dir.as_deref())?,
    };

    println!("{}", resolved.display());

    Ok(())
}
