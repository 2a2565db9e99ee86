//! Application state: the composition root tying session, identity,
//! reconciliation and the local caches together
//!
//! Local state only changes after the remote write it reflects has been
//! confirmed. A failed toggle leaves every cache exactly as it was.

use binder_sheets_client::TabularStore;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::LocalCaches;
use crate::catalog::{CatalogItem, CatalogReader};
use crate::error::{ConsistencyWarning, Result, SyncError};
use crate::identity::{ExternalIdentity, IdentityProvider, IdentityResolver, User};
use crate::ownership::{OwnershipEngine, OwnershipEngineConfig, OwnershipRecord, Toggle};
use crate::remote::AuthorizedStore;
use crate::session::Session;
use crate::stats::{missing_items, CollectionStats, ItemDemand};

pub struct Binder {
    session: Arc<Session>,
    identity: IdentityResolver,
    engine: OwnershipEngine,
    catalog_reader: CatalogReader,
    catalog: Vec<CatalogItem>,
    users: Vec<User>,
    current_user: Option<User>,
    caches: LocalCaches,
    warnings: Vec<ConsistencyWarning>,
}

impl Binder {
    pub fn new(store: Arc<dyn TabularStore>, session: Arc<Session>, config: OwnershipEngineConfig) -> Self {
        let store = AuthorizedStore::new(store, session.clone());
        Self {
            session,
            identity: IdentityResolver::new(store.clone()),
            engine: OwnershipEngine::new(store.clone(), config),
            catalog_reader: CatalogReader::new(store),
            catalog: Vec::new(),
            users: Vec::new(),
            current_user: None,
            caches: LocalCaches::new(),
            warnings: Vec::new(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Acquire a credential, resolve the user behind it and load all state
    pub async fn sign_in(&mut self, provider: &dyn IdentityProvider) -> Result<User> {
        let identity = self.current_identity(provider).await?;
        let resolved = self.identity.resolve_current_user(&identity).await?;
        self.warnings.extend(resolved.warnings);

        let user = resolved.value;
        info!(user_id = %user.id, "signed in");
        self.caches.reset(Some(user.id.clone()));
        self.current_user = Some(user.clone());
        self.reload().await?;
        Ok(user)
    }

    async fn current_identity(&self, provider: &dyn IdentityProvider) -> Result<ExternalIdentity> {
        let token = self.session.token().await?;
        match provider.current_identity(&token).await {
            Err(SyncError::Authorization(reason)) => {
                warn!("identity provider refused credential ({}), re-authenticating", reason);
                let fresh = self.session.reacquire(&token).await?;
                match provider.current_identity(&fresh).await {
                    Err(SyncError::Authorization(reason)) => {
                        error!("identity provider refused credential again: {}", reason);
                        self.session.expire(&fresh).await;
                        Err(SyncError::SessionExpired(reason))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Re-read catalog, users and ownership, replacing local state wholesale.
    ///
    /// Both caches come from a single read of the ownership table.
    pub async fn reload(&mut self) -> Result<()> {
        let catalog = self.catalog_reader.list_items().await?;
        let users = self.identity.list_users().await?;
        let all = self.engine.all_slice().await?;

        let per_user = match &self.current_user {
            Some(user) => all.value.iter().filter(|r| r.user_id == user.id).cloned().collect(),
            None => Vec::new(),
        };
        self.catalog = catalog;
        self.users = users;
        self.caches.replace(per_user, all.value);
        self.warnings.extend(all.warnings);
        Ok(())
    }

    /// Mark an item as missing from (or back in) the current user's collection
    pub async fn toggle_not_owned(&mut self, item_id: &str, not_owned: bool) -> Result<OwnershipRecord> {
        let user_id = self.require_user()?.id.clone();
        let toggle = self.engine.set_not_owned(item_id, &user_id, not_owned).await?;
        Ok(self.confirm(toggle))
    }

    /// Offer an item for trade, or withdraw the offer
    pub async fn toggle_tradeable(&mut self, item_id: &str, tradeable: bool) -> Result<OwnershipRecord> {
        let user_id = self.require_user()?.id.clone();
        let toggle = self.engine.set_tradeable(item_id, &user_id, tradeable).await?;
        Ok(self.confirm(toggle))
    }

    fn confirm(&mut self, toggle: Toggle) -> OwnershipRecord {
        self.caches.apply(&toggle.record);
        self.warnings.extend(toggle.warnings);
        toggle.record
    }

    /// Revoke the credential and drop all per-user state
    pub async fn sign_out(&mut self) {
        self.session.revoke().await;
        self.current_user = None;
        self.caches.reset(None);
    }

    fn require_user(&self) -> Result<&User> {
        self.current_user.as_ref().ok_or(SyncError::NotSignedIn)
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    pub fn catalog(&self) -> &[CatalogItem] {
        &self.catalog
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn caches(&self) -> &LocalCaches {
        &self.caches
    }

    /// Current user's status for an item; the implicit default when unrecorded
    pub fn status(&self, item_id: &str) -> Result<OwnershipRecord> {
        let user = self.require_user()?;
        Ok(self.caches.per_user().status(item_id, &user.id))
    }

    /// Look an item up by id, then by exact collector number, then by name
    pub fn find_item(&self, query: &str) -> Option<&CatalogItem> {
        self.catalog
            .iter()
            .find(|item| item.id == query)
            .or_else(|| self.catalog.iter().find(|item| item.number == query))
            .or_else(|| self.catalog.iter().find(|item| item.matches(query)))
    }

    pub fn stats(&self) -> Result<CollectionStats> {
        let user = self.require_user()?;
        let slice: Vec<OwnershipRecord> = self.caches.per_user().records().cloned().collect();
        Ok(CollectionStats::for_user(&self.catalog, &slice, &user.id))
    }

    pub fn missing(&self) -> Result<Vec<&CatalogItem>> {
        let user = self.require_user()?;
        let slice: Vec<OwnershipRecord> = self.caches.per_user().records().cloned().collect();
        Ok(missing_items(&self.catalog, &slice, &user.id))
    }

    pub fn demand(&self, item_id: &str) -> ItemDemand {
        let slice: Vec<OwnershipRecord> = self.caches.all_users().for_item(item_id).cloned().collect();
        ItemDemand::for_item(&slice, item_id)
    }

    /// Drain the consistency warnings collected since the last call
    pub fn take_warnings(&mut self) -> Vec<ConsistencyWarning> {
        std::mem::take(&mut self.warnings)
    }
}
