pub mod backoff;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod scopes;
pub mod token;

pub use bootstrap::{BootstrapError, Session};
pub use client::{get_spotify_client, DEFAULT_DELAY, DEFAULT_RETRIES};
