//! Store access bound to a session, with a single re-authentication retry

use binder_sheets_client::{AccessToken, Range, Row, StoreError, Table, TabularStore};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::{Result, SyncError};
use crate::session::Session;

/// A [`TabularStore`] paired with the [`Session`] whose credential it presents.
///
/// A call rejected as unauthorized clears the credential, re-acquires one and
/// is retried exactly once. A second rejection is fatal
/// ([`SyncError::SessionExpired`]). Transport errors are never retried.
#[derive(Clone)]
pub struct AuthorizedStore {
    store: Arc<dyn TabularStore>,
    session: Arc<Session>,
}

impl AuthorizedStore {
    pub fn new(store: Arc<dyn TabularStore>, session: Arc<Session>) -> Self {
        Self { store, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn read_range(&self, range: &Range) -> Result<Vec<Row>> {
        let store = &self.store;
        self.call("read", |token| async move { store.read_range(&token, range).await })
            .await
    }

    pub async fn append_row(&self, table: Table, row: Row) -> Result<()> {
        let store = &self.store;
        self.call("append", |token| {
            let row = row.clone();
            async move { store.append_row(&token, table, row).await }
        })
        .await
    }

    pub async fn update_range(&self, range: &Range, rows: Vec<Row>) -> Result<()> {
        let store = &self.store;
        self.call("update", |token| {
            let rows = rows.clone();
            async move { store.update_range(&token, range, rows).await }
        })
        .await
    }

    pub async fn clear_range(&self, range: &Range) -> Result<()> {
        let store = &self.store;
        self.call("clear", |token| async move { store.clear_range(&token, range).await })
            .await
    }

    async fn call<T, F, Fut>(&self, op: &'static str, attempt: F) -> Result<T>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let token = self.session.token().await?;
        match attempt(token.clone()).await {
            Err(e) if e.is_unauthorized() => {
                warn!(op, "store rejected credential: {}", e);
                let fresh = self.session.reacquire(&token).await?;
                match attempt(fresh.clone()).await {
                    Err(e) if e.is_unauthorized() => {
                        error!(op, "credential rejected again after re-authentication");
                        self.session.expire(&fresh).await;
                        Err(SyncError::SessionExpired(e.to_string()))
                    }
                    other => other.map_err(SyncError::from),
                }
            }
            other => other.map_err(SyncError::from),
        }
    }
}
