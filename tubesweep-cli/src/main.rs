//! Tubesweep command-line interface.
//!
//! One invocation performs one run: acquire the run lock, load the
//! configuration, authorize against the YouTube Data API, download each
//! configured playlist's videos, and prune the downloaded entries from the
//! remote playlists. Designed to run unattended from cron once the initial
//! interactive authorization has been completed.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use tubesweep_core::auth::ClientSecrets;
use tubesweep_core::config::DEFAULT_CONFIG_FILE;
use tubesweep_core::lock::DEFAULT_LOCK_FILE;
use tubesweep_core::{
    Authenticator, Coordinator, LockState, Result, RunConfig, RunLock, RustyYtdlDownloader,
    YouTubeApi,
};

/// Download configured YouTube playlists and prune the downloaded entries.
#[derive(Debug, Parser)]
#[command(name = "tubesweep", version, about)]
struct Args {
    /// Path to the playlist configuration file.
    #[arg(long, env = "TUBESWEEP_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Path to the OAuth client secret file.
    #[arg(long, env = "TUBESWEEP_CLIENT_SECRET", default_value = "client_secret.json")]
    client_secret: PathBuf,

    /// Path to the persisted OAuth token. Defaults to the user config dir.
    #[arg(long, env = "TUBESWEEP_TOKEN")]
    token: Option<PathBuf>,

    /// Path to the run lock file.
    #[arg(long, env = "TUBESWEEP_LOCK_FILE", default_value = DEFAULT_LOCK_FILE)]
    lock_file: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tubesweep_cli=info,tubesweep_core=info")),
        )
        .init();

    match run(args).await {
        Ok(success) => {
            if !success {
                process::exit(1);
            }
        }
        Err(e) => {
            error!("Run failed: {e}");
            process::exit(1);
        }
    }
}

/// Execute one run. Returns whether the run completed without failures.
async fn run(args: Args) -> Result<bool> {
    // The lock comes first: a contended lock must cost zero network calls.
    let lock = match RunLock::acquire(&args.lock_file)? {
        LockState::Acquired(lock) => lock,
        LockState::Contended => {
            info!("Another run is in progress; exiting");
            return Ok(true);
        }
    };

    let config = RunConfig::load(&args.config)?;

    let secrets = ClientSecrets::load(&args.client_secret)?;
    let token_path = args
        .token
        .unwrap_or_else(Authenticator::default_token_path);
    let auth = Authenticator::new(secrets, token_path);

    let service = YouTubeApi::new(auth)?;
    let downloader = RustyYtdlDownloader::new();
    let coordinator = Coordinator::new(service, downloader);

    let report = coordinator.run(&config).await?;
    info!("{}", report.summary());

    lock.release()?;
    Ok(report.is_success())
}
