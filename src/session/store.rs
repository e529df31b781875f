use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DispatchError;

/// The access/refresh token pair. Both are opaque strings minted by the
/// auth API; exactly one pair is active per device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Durable storage for the token pair. The secure device keystore is an
/// external collaborator; implementations here only need get/set/delete.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<TokenPair>, DispatchError>;
    async fn save(&self, pair: &TokenPair) -> Result<(), DispatchError>;
    async fn clear(&self) -> Result<(), DispatchError>;
}

/// File-backed store used by the headless agent.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, DispatchError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let pair = serde_json::from_slice(&bytes).map_err(|err| {
                    DispatchError::Internal(format!("corrupt token file: {err}"))
                })?;
                Ok(Some(pair))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DispatchError::Internal(format!(
                "failed to read token file: {err}"
            ))),
        }
    }

    async fn save(&self, pair: &TokenPair) -> Result<(), DispatchError> {
        let bytes = serde_json::to_vec(pair)
            .map_err(|err| DispatchError::Internal(format!("token encode failed: {err}")))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|err| DispatchError::Internal(format!("failed to write token file: {err}")))
    }

    async fn clear(&self) -> Result<(), DispatchError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(DispatchError::Internal(format!(
                "failed to remove token file: {err}"
            ))),
        }
    }
}

/// In-memory store for tests and short-lived sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, DispatchError> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, pair: &TokenPair) -> Result<(), DispatchError> {
        *self.inner.write().await = Some(pair.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), DispatchError> {
        *self.inner.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TokenPair {
        TokenPair {
            access: "acc".to_string(),
            refresh: "ref".to_string(),
        }
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&pair()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(pair()));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));

        assert_eq!(store.load().await.unwrap(), None);

        store.save(&pair()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(pair()));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        // clearing twice is fine
        store.clear().await.unwrap();
    }
}
