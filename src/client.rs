use crate::{
    backoff::{Backoff, Fixed},
    bootstrap::{AttemptError, BootstrapError, Bootstrapper, Connector, Session},
    config::{self, ProjectPaths, Settings},
    scopes,
    token::{FileTokenStore, TokenStore},
};
use reqwest::StatusCode;
use rspotify::{
    http::HttpError, prelude::*, AuthCodeSpotify, ClientError, Config, Credentials, OAuth, Token,
};
use std::{num::NonZeroU32, time::Duration};
use tracing::{debug, info, warn};

pub const DEFAULT_RETRIES: NonZeroU32 = match NonZeroU32::new(3) {
    Some(retries) => retries,
    None => unreachable!(),
};
pub const DEFAULT_DELAY: Duration = Duration::from_secs(3);

/// Authenticate against Spotify with the project's `.env` and token cache.
///
/// Returns the client only after `current_user` has answered, so the token is good at
/// the moment of return. Refreshing later on is left to rspotify.
pub async fn get_spotify_client(
    retries: NonZeroU32,
    delay: Duration,
) -> Result<AuthCodeSpotify, BootstrapError> {
    let session = connect(&ProjectPaths::default(), retries, Fixed(delay)).await?;
    Ok(session.into_client())
}

/// Like [`get_spotify_client`] with explicit paths and backoff, keeping the session around.
pub async fn connect(
    paths: &ProjectPaths,
    retries: NonZeroU32,
    backoff: impl Backoff,
) -> Result<Session<AuthCodeSpotify>, BootstrapError> {
    config::load_env_file(&paths.env_file)?;
    let settings = Settings::from_env()?;

    let store = FileTokenStore::new(paths.token_cache.clone());
    Bootstrapper::new(SpotifyConnector::new(settings, store), backoff, retries)
        .run()
        .await
}

/// Builds an `AuthCodeSpotify` per attempt, seeded from `store`.
#[derive(derive_new::new, Debug)]
pub struct SpotifyConnector<S> {
    settings: Settings,
    store: S,
}

impl<S: TokenStore> SpotifyConnector<S> {
    fn build(&self) -> AuthCodeSpotify {
        let creds = Credentials::new(&self.settings.client_id, &self.settings.client_secret);
        let oauth = OAuth {
            redirect_uri: self.settings.redirect_uri.clone(),
            scopes: scopes::scope_set(),
            ..Default::default()
        };
        // Persistence goes through `store`, not rspotify's own cache file.
        let config = Config {
            token_refreshing: true,
            token_cached: false,
            ..Default::default()
        };
        AuthCodeSpotify::with_config(creds, oauth, config)
    }

    fn cached_token(&self) -> Option<Token> {
        match self.store.load() {
            Ok(token) => token,
            Err(err) => {
                warn!("Ignoring unreadable token cache: {err}");
                None
            }
        }
    }

    /// Puts a usable token into `spotify`: the cached one, a refreshed one, or a fresh
    /// one from the authorization code flow.
    async fn authorize(&self, spotify: &AuthCodeSpotify) -> Result<(), AttemptError> {
        if let Some(token) = self.cached_token() {
            let expired = token.is_expired();
            set_token(spotify, Some(token)).await?;
            if !expired {
                debug!("Using cached token");
                return Ok(());
            }
            match spotify.refetch_token().await.map_err(exchange_error)? {
                Some(refreshed) => {
                    info!("Refreshed expired token from token cache");
                    return set_token(spotify, Some(refreshed)).await;
                }
                None => info!("Unable to refresh expired token, reauthorizing"),
            }
        }

        let url = spotify.get_authorize_url(false).map_err(exchange_error)?;
        let code = spotify.get_code_from_user(&url).map_err(exchange_error)?;
        spotify.request_token(&code).await.map_err(exchange_error)
    }

    /// Failures of the `current_user` check. A rejected token is dropped from the store so
    /// the next attempt goes through the code flow instead of offering it again.
    fn identity_failure(&self, err: ClientError) -> AttemptError {
        if !rejected_token(&err) {
            return AttemptError::unexpected(err);
        }
        if let Err(clear_err) = self.store.clear() {
            return AttemptError::unexpected(clear_err);
        }
        warn!("Spotify rejected the token, cleared the token cache");
        AttemptError::authorization(err)
    }

    async fn persist(&self, spotify: &AuthCodeSpotify) -> Result<(), AttemptError> {
        let token = spotify
            .token
            .lock()
            .await
            .map_err(|_| AttemptError::unexpected("token lock unavailable"))?
            .clone();
        if let Some(token) = token {
            self.store.save(&token).map_err(AttemptError::unexpected)?;
        }
        Ok(())
    }
}

impl<S: TokenStore> Connector for SpotifyConnector<S> {
    type Client = AuthCodeSpotify;

    async fn connect(&self) -> Result<Session<AuthCodeSpotify>, AttemptError> {
        let spotify = self.build();
        self.authorize(&spotify).await?;

        let user = spotify
            .current_user()
            .await
            .map_err(|err| self.identity_failure(err))?;
        info!("Active Spotify scopes: {}", scopes::display());

        self.persist(&spotify).await?;
        Ok(Session::new(spotify, user.display_name))
    }
}

async fn set_token(spotify: &AuthCodeSpotify, token: Option<Token>) -> Result<(), AttemptError> {
    let mut guard = spotify
        .token
        .lock()
        .await
        .map_err(|_| AttemptError::unexpected("token lock unavailable"))?;
    *guard = token;
    Ok(())
}

/// Failures while obtaining a token. Anything that reached the accounts service or the
/// code prompt is an authorization problem.
fn exchange_error(err: ClientError) -> AttemptError {
    match err {
        ClientError::Http(_) | ClientError::Cli(_) => AttemptError::authorization(err),
        other => AttemptError::unexpected(other),
    }
}

fn rejected_token(err: &ClientError) -> bool {
    let ClientError::Http(http) = err else {
        return false;
    };
    match http.as_ref() {
        HttpError::StatusCode(response) => is_auth_status(response.status()),
        _ => false,
    }
}

fn is_auth_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bootstrap::BootstrapError,
        config::{ConfigError, REQUIRED_VARS},
        token::TokenStoreError,
    };
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct MemoryStore {
        token: RefCell<Option<Token>>,
        fail_load: bool,
        loads: Cell<u32>,
        clears: Cell<u32>,
    }

    impl TokenStore for MemoryStore {
        fn load(&self) -> Result<Option<Token>, TokenStoreError> {
            self.loads.set(self.loads.get() + 1);
            if self.fail_load {
                return Err(TokenStoreError::Io {
                    path: ".cache".into(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            Ok(self.token.borrow().clone())
        }

        fn save(&self, token: &Token) -> Result<(), TokenStoreError> {
            *self.token.borrow_mut() = Some(token.clone());
            Ok(())
        }

        fn clear(&self) -> Result<(), TokenStoreError> {
            self.clears.set(self.clears.get() + 1);
            self.token.borrow_mut().take();
            Ok(())
        }
    }

    fn settings() -> Settings {
        Settings {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8888/callback".to_string(),
        }
    }

    fn live_token() -> Token {
        Token {
            access_token: "cached".to_string(),
            expires_in: chrono::Duration::hours(1),
            expires_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        }
    }

    fn status_error(status: u16) -> ClientError {
        let response = http::Response::builder()
            .status(status)
            .body("")
            .unwrap();
        ClientError::Http(Box::new(HttpError::StatusCode(response.into())))
    }

    #[test]
    fn built_client_requests_every_scope() {
        let connector = SpotifyConnector::new(settings(), MemoryStore::default());
        let spotify = connector.build();

        assert_eq!(spotify.oauth.scopes, scopes::scope_set());
        assert_eq!(spotify.oauth.redirect_uri, "http://localhost:8888/callback");
        assert!(spotify.config.token_refreshing);
        assert!(!spotify.config.token_cached);
    }

    #[tokio::test]
    async fn unexpired_cached_token_skips_the_flow() {
        let store = MemoryStore::default();
        store.save(&live_token()).unwrap();
        let connector = SpotifyConnector::new(settings(), store);
        let spotify = connector.build();

        connector.authorize(&spotify).await.unwrap();

        let token = spotify.token.lock().await.unwrap().clone().unwrap();
        assert_eq!(token.access_token, "cached");
    }

    #[tokio::test]
    async fn persist_writes_the_current_token() {
        let connector = SpotifyConnector::new(settings(), MemoryStore::default());
        let spotify = connector.build();
        set_token(&spotify, Some(live_token())).await.unwrap();

        connector.persist(&spotify).await.unwrap();

        let saved = connector.store.load().unwrap().unwrap();
        assert_eq!(saved.access_token, "cached");
    }

    #[test]
    fn unreadable_cache_is_treated_as_absent() {
        let store = MemoryStore {
            fail_load: true,
            ..Default::default()
        };
        let connector = SpotifyConnector::new(settings(), store);

        assert!(connector.cached_token().is_none());
    }

    #[test]
    fn cli_failure_during_exchange_is_retryable() {
        let err = exchange_error(ClientError::Cli("unable to parse response code".into()));
        assert!(matches!(err, AttemptError::Authorization(_)));
    }

    #[test]
    fn parse_failure_during_exchange_is_unexpected() {
        let json = serde_json::from_str::<Token>("{").unwrap_err();
        let err = exchange_error(ClientError::ParseJson(json));
        assert!(matches!(err, AttemptError::Unexpected(_)));
    }

    #[test]
    fn non_http_identity_failure_is_unexpected() {
        let connector = SpotifyConnector::new(settings(), MemoryStore::default());
        let err = connector.identity_failure(ClientError::Cli("no terminal".into()));
        assert!(matches!(err, AttemptError::Unexpected(_)));
        assert_eq!(connector.store.clears.get(), 0);
    }

    #[tokio::test]
    async fn rejected_token_is_not_reused_by_the_next_attempt() {
        let store = MemoryStore::default();
        store.save(&live_token()).unwrap();
        let connector = SpotifyConnector::new(settings(), store);

        let spotify = connector.build();
        connector.authorize(&spotify).await.unwrap();
        let err = connector.identity_failure(status_error(401));

        assert!(matches!(err, AttemptError::Authorization(_)));
        assert_eq!(connector.store.clears.get(), 1);
        assert_eq!(connector.store.loads.get(), 1);
        // The next attempt finds nothing cached and has to ask the user again.
        assert!(connector.cached_token().is_none());
        assert_eq!(connector.store.loads.get(), 2);
    }

    #[test]
    fn server_error_on_identity_check_keeps_the_cache() {
        let store = MemoryStore::default();
        store.save(&live_token()).unwrap();
        let connector = SpotifyConnector::new(settings(), store);

        let err = connector.identity_failure(status_error(500));

        assert!(matches!(err, AttemptError::Unexpected(_)));
        assert_eq!(connector.store.clears.get(), 0);
        assert!(connector.cached_token().is_some());
    }

    #[tokio::test]
    async fn missing_variables_fail_before_any_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path());
        let blank = REQUIRED_VARS
            .iter()
            .map(|key| format!("{key}=\n"))
            .collect::<String>();
        std::fs::write(&paths.env_file, blank).unwrap();

        let err = connect(&paths, DEFAULT_RETRIES, Fixed(Duration::ZERO))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::Config(ConfigError::MissingVars(_))
        ));
        assert!(!paths.token_cache.exists());
    }

    #[tokio::test]
    async fn missing_env_file_fails_through_connect() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path());

        let err = connect(&paths, DEFAULT_RETRIES, Fixed(Duration::ZERO))
            .await
            .unwrap_err();

        match err {
            BootstrapError::Config(ConfigError::MissingEnvFile(path)) => {
                assert_eq!(path, paths.env_file)
            }
            other => panic!("expected MissingEnvFile, got {other:?}"),
        }
        assert!(!paths.token_cache.exists());
    }

    #[test]
    fn auth_statuses() {
        assert!(is_auth_status(StatusCode::UNAUTHORIZED));
        assert!(is_auth_status(StatusCode::FORBIDDEN));
        assert!(is_auth_status(StatusCode::BAD_REQUEST));
        assert!(!is_auth_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_auth_status(StatusCode::TOO_MANY_REQUESTS));
    }
}
