//! Google OAuth and userinfo adapters
//!
//! The interactive consent screen is not part of this crate. A bearer token
//! obtained elsewhere is supplied through configuration, and these adapters
//! only use it: to learn who it belongs to and to revoke it on sign-out.

use async_trait::async_trait;
use binder_sheets_client::AccessToken;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::identity::{ExternalIdentity, IdentityProvider};
use crate::session::{ConsentFlow, Credential};

pub const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const DEFAULT_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

fn http_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Consent flow backed by a preconfigured bearer token
pub struct StaticTokenConsent {
    token: Option<String>,
    revoke_url: String,
    http: Client,
}

impl StaticTokenConsent {
    pub fn new(token: Option<String>, revoke_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            token: token.filter(|t| !t.is_empty()),
            revoke_url: revoke_url.into(),
            http: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl ConsentFlow for StaticTokenConsent {
    async fn acquire_credential(&self) -> Result<Credential> {
        match &self.token {
            Some(token) => Ok(Credential::new(AccessToken::new(token.clone()))),
            None => Err(SyncError::Authorization(
                "no access token configured; set ACCESS_TOKEN".into(),
            )),
        }
    }

    async fn revoke(&self, credential: &Credential) -> Result<()> {
        debug!(url = %self.revoke_url, "revoking credential");
        let response = self
            .http
            .post(&self.revoke_url)
            .query(&[("token", credential.access_token.secret())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::Authorization(format!("revocation failed ({}): {}", status, body)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Identity lookup against the Google userinfo endpoint
pub struct GoogleUserInfo {
    url: String,
    http: Client,
}

impl GoogleUserInfo {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            http: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleUserInfo {
    async fn current_identity(&self, token: &AccessToken) -> Result<ExternalIdentity> {
        debug!(url = %self.url, "fetching userinfo");
        let response = self.http.get(&self.url).bearer_auth(token.secret()).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Authorization("userinfo rejected the credential".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Network(format!("userinfo returned {}: {}", status, body)));
        }

        let info: UserInfo = response.json().await?;
        let email = info
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| SyncError::Authorization("identity has no email address".into()))?;
        let display_name = info.name.unwrap_or_else(|| email.clone());

        Ok(ExternalIdentity { email, display_name })
    }
}
