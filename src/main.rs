use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use spotify_auth_bootstrap::{
    backoff::{Backoff, Exponential, Fixed, Jittered},
    client,
    config::ProjectPaths,
    scopes,
    token::{FileTokenStore, TokenStore},
    BootstrapError, DEFAULT_DELAY, DEFAULT_RETRIES,
};
use std::{num::NonZeroU32, path::PathBuf, process::ExitCode, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[clap(version, about = "Spotify OAuth bootstrap for the recommender")]
struct Cli {
    /// Enable debug logging
    #[clap(short, long, global = true)]
    verbose: bool,
    /// Defaults to `.env` in the project root
    #[clap(long, global = true)]
    env_file: Option<PathBuf>,
    /// Defaults to `.cache` in the project root
    #[clap(long, global = true)]
    token_cache: Option<PathBuf>,
    #[clap(subcommand)]
    app: App,
}

#[derive(Subcommand, Debug)]
enum App {
    /// Authorize (reusing the cached token when possible) and check who is logged in
    Login {
        #[clap(short = 'r', long, default_value_t = DEFAULT_RETRIES)]
        retries: NonZeroU32,
        /// Seconds between attempts
        #[clap(short = 'd', long, default_value_t = DEFAULT_DELAY.as_secs())]
        delay: u64,
        #[clap(long, value_enum, default_value_t = BackoffKind::Fixed)]
        backoff: BackoffKind,
        /// Upper bound in seconds for exponential backoff
        #[clap(long, default_value_t = 60)]
        max_delay: u64,
    },
    /// Show what is in the token cache
    Status,
    /// Remove the cached token so the next login asks again
    Logout,
    /// List the scopes requested at authorization time
    Scopes,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackoffKind {
    Fixed,
    Exponential,
    Jittered,
}

impl BackoffKind {
    fn build(self, delay: Duration, max: Duration) -> Box<dyn Backoff> {
        match self {
            BackoffKind::Fixed => Box::new(Fixed(delay)),
            BackoffKind::Exponential => Box::new(Exponential::new(delay, max)),
            BackoffKind::Jittered => Box::new(Jittered::new(Exponential::new(delay, max))),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            let code = err
                .downcast_ref::<BootstrapError>()
                .map_or(1, BootstrapError::exit_code);
            ExitCode::from(code)
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` picks debug over info.
fn log_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

async fn run(cli: Cli) -> Result<()> {
    let mut paths = ProjectPaths::default();
    if let Some(env_file) = cli.env_file {
        paths.env_file = env_file;
    }
    if let Some(token_cache) = cli.token_cache {
        paths.token_cache = token_cache;
    }

    match cli.app {
        App::Login {
            retries,
            delay,
            backoff,
            max_delay,
        } => {
            let backoff = backoff.build(Duration::from_secs(delay), Duration::from_secs(max_delay));
            let session = client::connect(&paths, retries, backoff).await?;
            println!("Logged in as {}", session.display_name());
        }
        App::Status => status(&FileTokenStore::new(paths.token_cache))?,
        App::Logout => {
            let store = FileTokenStore::new(paths.token_cache);
            store.clear()?;
            info!("Removed token cache at {}", store.path().display());
        }
        App::Scopes => {
            for scope in scopes::SCOPES {
                println!("{scope}");
            }
        }
    }
    Ok(())
}

fn status(store: &FileTokenStore) -> Result<()> {
    let Some(token) = store.load()? else {
        println!("No cached token at {}", store.path().display());
        return Ok(());
    };

    let state = if token.is_expired() { "expired" } else { "valid" };
    println!("Cached token at {} ({state})", store.path().display());
    if let Some(expires_at) = token.expires_at {
        println!("  expires at: {expires_at}");
    }
    println!(
        "  refreshable: {}",
        if token.refresh_token.is_some() { "yes" } else { "no" }
    );
    let mut granted = token.scopes.iter().map(String::as_str).collect::<Vec<_>>();
    granted.sort_unstable();
    println!("  scopes: {}", granted.join(" "));
    Ok(())
}
