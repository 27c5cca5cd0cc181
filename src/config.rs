use std::{
    fmt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

pub const CLIENT_ID_VAR: &str = "SPOTIPY_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "SPOTIPY_CLIENT_SECRET";
pub const REDIRECT_URI_VAR: &str = "SPOTIPY_REDIRECT_URI";

pub const REQUIRED_VARS: [&str; 3] = [CLIENT_ID_VAR, CLIENT_SECRET_VAR, REDIRECT_URI_VAR];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing .env file at {}", .0.display())]
    MissingEnvFile(PathBuf),
    #[error("failed to load {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<&'static str>),
}

/// Where variables come from. The process environment in production, a map in tests.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed locations relative to the project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub env_file: PathBuf,
    pub token_cache: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            env_file: root.join(".env"),
            token_cache: root.join(".cache"),
        }
    }
}

impl Default for ProjectPaths {
    fn default() -> Self {
        Self::new(env!("CARGO_MANIFEST_DIR"))
    }
}

/// Loads `path` into the process environment. Variables that are already set win.
pub fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::MissingEnvFile(path.to_path_buf()));
    }
    info!("Looking for .env at: {}", path.display());
    dotenvy::from_path(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Environment variables loaded.");
    Ok(())
}

#[derive(Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Settings {
    /// Every required variable must be set and non-empty. The error lists all of the
    /// missing ones, not just the first.
    pub fn from_source(source: &impl EnvSource) -> Result<Self, ConfigError> {
        let lookup = |key: &str| source.var(key).filter(|value| !value.is_empty());

        match REQUIRED_VARS.map(lookup) {
            [Some(client_id), Some(client_secret), Some(redirect_uri)] => {
                debug!("Loaded ID: {client_id}");
                Ok(Self {
                    client_id,
                    client_secret,
                    redirect_uri,
                })
            }
            values => {
                let missing = REQUIRED_VARS
                    .into_iter()
                    .zip(values)
                    .filter_map(|(key, value)| value.is_none().then_some(key))
                    .collect();
                Err(ConfigError::MissingVars(missing))
            }
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}
