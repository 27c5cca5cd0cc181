use crate::{backoff::Backoff, config::ConfigError};
use std::num::NonZeroU32;
use thiserror::Error;
use tracing::{error, info, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How a single attempt went wrong. Only authorization failures are worth another try.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("authorization failed: {0}")]
    Authorization(#[source] BoxError),
    #[error("{0}")]
    Unexpected(#[source] BoxError),
}

impl AttemptError {
    pub fn authorization(err: impl Into<BoxError>) -> Self {
        Self::Authorization(err.into())
    }

    pub fn unexpected(err: impl Into<BoxError>) -> Self {
        Self::Unexpected(err.into())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed after {attempts} attempts, please verify credentials and redirect URI")]
    AuthorizationExhausted {
        attempts: u32,
        #[source]
        source: BoxError,
    },
    #[error("unexpected authentication error")]
    Unexpected(#[source] BoxError),
}

impl BootstrapError {
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// A client whose identity check has already gone through.
#[derive(Debug)]
pub struct Session<C> {
    client: C,
    display_name: Option<String>,
}

impl<C> Session<C> {
    pub fn new(client: C, display_name: Option<String>) -> Self {
        Self {
            client,
            display_name,
        }
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Unknown User")
    }

    pub fn into_client(self) -> C {
        self.client
    }
}

/// One full authorization round: build the client, make sure it can talk to the API.
// Futures are awaited on the caller's task and are not required to be `Send`.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Client;

    async fn connect(&self) -> Result<Session<Self::Client>, AttemptError>;
}

#[derive(derive_new::new)]
pub struct Bootstrapper<C, B> {
    connector: C,
    backoff: B,
    attempts: NonZeroU32,
}

impl<C: Connector, B: Backoff> Bootstrapper<C, B> {
    pub async fn run(&self) -> Result<Session<C::Client>, BootstrapError> {
        let attempts = self.attempts.get();
        let mut attempt = 1;
        loop {
            match self.connector.connect().await {
                Ok(session) => {
                    info!(
                        attempt,
                        "Spotify authentication successful. Logged in as: {}",
                        session.display_name()
                    );
                    return Ok(session);
                }
                Err(AttemptError::Authorization(source)) => {
                    warn!("Spotify OAuth error on attempt {attempt}: {source}");
                    if attempt >= attempts {
                        error!("Failed after {attempts} attempts. Please verify credentials and redirect URI.");
                        return Err(BootstrapError::AuthorizationExhausted { attempts, source });
                    }
                    let delay = self.backoff.delay(attempt);
                    info!("Retrying in {:.1} seconds...", delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Unexpected(source)) => {
                    error!(attempt, "Unexpected authentication error: {source}");
                    return Err(BootstrapError::Unexpected(source));
                }
            }
        }
    }
}
