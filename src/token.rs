use rspotify::Token;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token cache {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token cache {} is not a valid token: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence for the OAuth token between runs.
pub trait TokenStore {
    /// `Ok(None)` when nothing has been cached yet.
    fn load(&self) -> Result<Option<Token>, TokenStoreError>;
    fn save(&self, token: &Token) -> Result<(), TokenStoreError>;
    /// Removing an absent token is not an error.
    fn clear(&self) -> Result<(), TokenStoreError>;
}

#[derive(derive_new::new, Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> TokenStoreError {
        TokenStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<Token>, TokenStoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let token = serde_json::from_str(&raw).map_err(|source| TokenStoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(token))
    }

    fn save(&self, token: &Token) -> Result<(), TokenStoreError> {
        let raw = serde_json::to_string(token).map_err(|source| TokenStoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, raw).map_err(|err| self.io_error(err))
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileTokenStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join(".cache"));
        (dir, store)
    }

    #[test]
    fn absent_cache_loads_as_none() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn saved_token_is_loaded_back() {
        let (_dir, store) = store();
        let token = Token {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            ..Default::default()
        };

        store.save(&token).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn corrupt_cache_is_a_json_error() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "not a token").unwrap();

        assert!(matches!(store.load(), Err(TokenStoreError::Json { .. })));
    }

    #[test]
    fn clear_removes_and_tolerates_absence() {
        let (_dir, store) = store();
        store.save(&Token::default()).unwrap();

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }
}
