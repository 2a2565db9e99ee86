//! Credential persistence across sessions

use async_trait::async_trait;
use binder_sheets_client::AccessToken;
use binder_sync::{ConsentFlow, Credential, CredentialStore, FileCredentialStore, Session, SessionState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct CountingConsent {
    acquired: AtomicUsize,
    revoked: AtomicUsize,
}

#[async_trait]
impl ConsentFlow for CountingConsent {
    async fn acquire_credential(&self) -> binder_sync::Result<Credential> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::new(AccessToken::new("ya29.issued")))
    }

    async fn revoke(&self, _credential: &Credential) -> binder_sync::Result<()> {
        self.revoked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_second_run_adopts_persisted_credential() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".binder").join("credential.json");

    let first_consent = Arc::new(CountingConsent::default());
    let first = Session::new(first_consent.clone(), Arc::new(FileCredentialStore::new(&path)));
    first.acquire().await.unwrap();
    assert_eq!(first_consent.acquired.load(Ordering::SeqCst), 1);
    assert!(path.exists());

    let second_consent = Arc::new(CountingConsent::default());
    let second = Session::new(second_consent.clone(), Arc::new(FileCredentialStore::new(&path)));
    let token = second.token().await.unwrap();

    assert_eq!(token.secret(), "ya29.issued");
    assert_eq!(second.state().await, SessionState::Authenticated);
    assert_eq!(second_consent.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sign_out_in_new_run_revokes_and_removes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credential.json");
    let store = FileCredentialStore::new(&path);
    store.save(&Credential::new(AccessToken::new("ya29.saved"))).unwrap();

    let consent = Arc::new(CountingConsent::default());
    let session = Session::new(consent.clone(), Arc::new(FileCredentialStore::new(&path)));
    session.revoke().await;

    assert_eq!(consent.revoked.load(Ordering::SeqCst), 1);
    assert!(!path.exists());
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn test_credential_file_is_json_with_timestamp() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credential.json");
    let store = FileCredentialStore::new(&path);
    store.save(&Credential::new(AccessToken::new("ya29.saved"))).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["access_token"], "ya29.saved");
    assert!(raw["obtained_at"].is_string());
}
