//! Bearer credential lifecycle
//!
//! `Unauthenticated -> Authenticating -> Authenticated -> (Expired -> Authenticating) | Revoked`
//!
//! A persisted credential is adopted without a network round trip, so the
//! session may report itself authenticated while holding an expired token.
//! Expiry is only discovered when the store rejects a call; see
//! [`crate::remote::AuthorizedStore`].

use async_trait::async_trait;
use binder_sheets_client::AccessToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// Consent flow in progress
    Authenticating,
    Authenticated,
    /// The held credential was rejected; it has been discarded
    Expired,
    /// Revocation in flight; always followed by `Unauthenticated`
    Revoked,
}

/// A bearer credential and when it was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: AccessToken,
    pub obtained_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: AccessToken) -> Self {
        Self {
            access_token,
            obtained_at: Utc::now(),
        }
    }
}

/// External consent flow that yields bearer credentials
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    /// Obtain a fresh credential
    async fn acquire_credential(&self) -> Result<Credential>;

    /// Revoke a credential with the issuer
    async fn revoke(&self, credential: &Credential) -> Result<()>;
}

/// Local persistence for the credential between runs
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Credential persisted as a JSON file
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::Credential(format!("{}: {}", self.path.display(), e))),
        };

        match serde_json::from_str(&raw) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring unreadable credential file: {}", e);
                Ok(None)
            }
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Credential(format!("{}: {}", parent.display(), e)))?;
        }
        let raw = serde_json::to_string_pretty(credential)?;
        std::fs::write(&self.path, raw)
            .map_err(|e| SyncError::Credential(format!("{}: {}", self.path.display(), e)))
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Credential(format!("{}: {}", self.path.display(), e))),
        }
    }
}

/// Credential kept in memory only
#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: StdMutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: StdMutex::new(Some(credential)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.credential.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.slot().clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

struct Inner {
    state: SessionState,
    credential: Option<Credential>,
}

/// Owns the bearer credential for one signed-in user
pub struct Session {
    consent: Arc<dyn ConsentFlow>,
    persisted: Arc<dyn CredentialStore>,
    inner: Mutex<Inner>,
}

impl Session {
    pub fn new(consent: Arc<dyn ConsentFlow>, persisted: Arc<dyn CredentialStore>) -> Self {
        Self {
            consent,
            persisted,
            inner: Mutex::new(Inner {
                state: SessionState::Unauthenticated,
                credential: None,
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// True iff a credential is held, whether or not the remote still accepts it
    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.credential.is_some()
    }

    /// Adopt a persisted credential, or run the consent flow if there is none
    pub async fn acquire(&self) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        if let Some(credential) = &inner.credential {
            return Ok(credential.clone());
        }

        match self.load_persisted().await {
            Ok(Some(credential)) => {
                debug!("adopting persisted credential");
                inner.credential = Some(credential.clone());
                inner.state = SessionState::Authenticated;
                return Ok(credential);
            }
            Ok(None) => {}
            Err(e) => warn!("credential store unreadable, running consent flow: {}", e),
        }

        self.consent_locked(&mut inner).await
    }

    /// Current bearer token, acquiring one if none is held
    pub async fn token(&self) -> Result<AccessToken> {
        Ok(self.acquire().await?.access_token)
    }

    /// Discard a rejected token and obtain a fresh one through the consent flow.
    ///
    /// If another caller already replaced `rejected`, the newer token is
    /// returned without a second consent round.
    pub async fn reacquire(&self, rejected: &AccessToken) -> Result<AccessToken> {
        let mut inner = self.inner.lock().await;
        if let Some(current) = &inner.credential {
            if &current.access_token != rejected {
                return Ok(current.access_token.clone());
            }
        }

        warn!("credential rejected by store, re-authenticating");
        inner.state = SessionState::Expired;
        inner.credential = None;
        self.clear_persisted().await;

        Ok(self.consent_locked(&mut inner).await?.access_token)
    }

    /// Give up on a credential the remote keeps rejecting.
    ///
    /// Drops it from memory and from the credential store so the next run
    /// goes through the consent flow instead of adopting it again. A newer
    /// credential obtained by another caller is left alone.
    pub async fn expire(&self, rejected: &AccessToken) {
        let mut inner = self.inner.lock().await;
        if let Some(current) = &inner.credential {
            if &current.access_token != rejected {
                return;
            }
        }

        warn!("credential rejected after re-authentication, session expired");
        inner.credential = None;
        inner.state = SessionState::Expired;
        self.clear_persisted().await;
    }

    /// Best-effort remote revocation; always ends `Unauthenticated` with no credential
    pub async fn revoke(&self) {
        let mut inner = self.inner.lock().await;
        let held = match inner.credential.take() {
            Some(credential) => Some(credential),
            None => self.load_persisted().await.unwrap_or_else(|e| {
                warn!("credential store unreadable during sign-out: {}", e);
                None
            }),
        };
        inner.state = SessionState::Revoked;

        if let Some(credential) = held {
            if let Err(e) = self.consent.revoke(&credential).await {
                warn!("credential revocation failed, clearing locally anyway: {}", e);
            }
        }
        self.clear_persisted().await;

        inner.state = SessionState::Unauthenticated;
        info!("signed out");
    }

    async fn load_persisted(&self) -> Result<Option<Credential>> {
        let store = self.persisted.clone();
        blocking(move || store.load()).await
    }

    async fn clear_persisted(&self) {
        let store = self.persisted.clone();
        if let Err(e) = blocking(move || store.clear()).await {
            warn!("failed to clear persisted credential: {}", e);
        }
    }

    async fn consent_locked(&self, inner: &mut Inner) -> Result<Credential> {
        inner.state = SessionState::Authenticating;
        match self.consent.acquire_credential().await {
            Ok(credential) => {
                let store = self.persisted.clone();
                let saved = credential.clone();
                if let Err(e) = blocking(move || store.save(&saved)).await {
                    warn!("failed to persist credential: {}", e);
                }
                inner.credential = Some(credential.clone());
                inner.state = SessionState::Authenticated;
                Ok(credential)
            }
            Err(e) => {
                inner.state = SessionState::Unauthenticated;
                Err(e)
            }
        }
    }
}

/// Run credential store I/O off the async worker threads
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Credential(format!("credential store task failed: {}", e)))?
}
