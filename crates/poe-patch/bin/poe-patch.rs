//! poe-patch binary entry point.
//!
//! A thin wrapper around the poe-patch library that:
//! 1. Parses command-line arguments
//! 2. Initializes logging
//! 3. Runs the master server handshake
//! 4. Prints the version or downloads the requested files
//! 5. Releases the master connection

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use poe_patch::config::{DEFAULT_MASTER_HOST, DEFAULT_MASTER_PORT};
use poe_patch::{PatchConfig, PatchDownloader, PatchSession};
use std::path::PathBuf;
use std::time::Duration;

/// Query the Path of Exile patch server and download content files.
#[derive(Debug, Parser)]
#[command(name = "poe-patch", version)]
struct Cli {
    /// Master patch server host
    #[arg(long, env = "POE_PATCH_MASTER_HOST", default_value = DEFAULT_MASTER_HOST)]
    host: String,

    /// Master patch server port
    #[arg(long, env = "POE_PATCH_MASTER_PORT", default_value_t = DEFAULT_MASTER_PORT)]
    port: u16,

    /// Connect timeout in seconds
    #[arg(long, env = "POE_PATCH_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "POE_PATCH_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the current game version and download base URLs
    Version,

    /// Download content files by their content-relative path
    Download {
        /// Paths relative to the content root, e.g. Data/Mods.dat64
        #[arg(required = true)]
        paths: Vec<String>,

        /// Write files beneath this directory, keeping their content paths
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Write the single requested file to exactly this path
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    fn config(&self) -> PatchConfig {
        PatchConfig {
            master_host: self.host.clone(),
            master_port: self.port,
            connect_timeout: self.connect_timeout.map(Duration::from_secs),
            request_timeout: self.request_timeout.map(Duration::from_secs),
            ..PatchConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    config.validate()?;

    if let Command::Download {
        paths,
        file: Some(_),
        ..
    } = &cli.command
        && paths.len() > 1
    {
        bail!("--file accepts exactly one content path, got {}", paths.len());
    }

    let mut session = PatchSession::connect(&config).await?;
    tracing::info!(
        "Connected to {}, patch version {}",
        session.master_address(),
        session.version()
    );

    let outcome = run(&cli.command, &session, &config).await;
    let released = session.release();

    outcome?;
    released?;
    Ok(())
}

async fn run(command: &Command, session: &PatchSession, config: &PatchConfig) -> Result<()> {
    match command {
        Command::Version => {
            println!("version:       {}", session.version());
            println!("patch url:     {}", session.patch_url());
            println!("patch cdn url: {}", session.patch_cdn_url());
        }
        Command::Download { paths, dir, file } => {
            let downloader = PatchDownloader::from_session(session, config)?;
            for path in paths {
                let written = downloader
                    .fetch_to_file(path, dir.as_deref(), file.as_deref())
                    .await?;
                tracing::info!("Downloaded {path} to {}", written.display());
            }
        }
    }
    Ok(())
}
