//! Binding an authenticated identity to a durable user row
//!
//! Users are keyed by email. Resolution is find-or-create and is not
//! idempotent under concurrent callers: two first sign-ins racing for the same
//! email can both miss the lookup and both append, leaving two rows with one
//! email and different ids. Later resolutions report that as
//! [`ConsistencyWarning::DuplicateUser`] and use the first row.

use async_trait::async_trait;
use binder_sheets_client::{AccessToken, Range, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::{ConsistencyWarning, Result};
use crate::remote::AuthorizedStore;

const NAME_COLUMN: usize = 1;

/// A durable user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

impl User {
    /// Parse a `[id, displayName, email]` row. Rows without an id are skipped.
    pub fn from_row(row: &Row) -> Option<Self> {
        let id = row.first().filter(|id| !id.is_empty())?;
        Some(Self {
            id: id.clone(),
            display_name: row.get(1).cloned().unwrap_or_default(),
            email: row.get(2).cloned().unwrap_or_default(),
        })
    }

    pub fn to_row(&self) -> Row {
        vec![self.id.clone(), self.display_name.clone(), self.email.clone()]
    }
}

/// A verified identity from the external provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub email: String,
    pub display_name: String,
}

/// Source of the identity behind a bearer credential
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_identity(&self, token: &AccessToken) -> Result<ExternalIdentity>;
}

/// A value together with any consistency warnings raised while producing it
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Finds or creates the user row for an identity
#[derive(Clone)]
pub struct IdentityResolver {
    store: AuthorizedStore,
}

impl IdentityResolver {
    pub fn new(store: AuthorizedStore) -> Self {
        Self { store }
    }

    /// All users, in sheet order
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = self.store.read_range(&Range::data(Table::Users)).await?;
        Ok(rows.iter().filter_map(User::from_row).collect())
    }

    /// Find-or-create the user for `identity`, renaming it if the provider's
    /// display name changed.
    pub async fn resolve_current_user(&self, identity: &ExternalIdentity) -> Result<Resolved<User>> {
        let rows = self.store.read_range(&Range::data(Table::Users)).await?;
        let warnings = duplicate_users(&rows);
        for warning in &warnings {
            warn!("{}", warning);
        }

        let existing = rows.iter().enumerate().find_map(|(index, row)| {
            User::from_row(row)
                .filter(|user| user.email == identity.email)
                .map(|user| (index, user))
        });

        let user = match existing {
            Some((_, user)) if user.display_name == identity.display_name => user,
            Some((index, user)) => {
                let row_number = Table::FIRST_DATA_ROW + index as u32;
                self.store
                    .update_range(
                        &Range::cell(Table::Users, NAME_COLUMN, row_number),
                        vec![vec![identity.display_name.clone()]],
                    )
                    .await?;
                info!(user_id = %user.id, "updated display name");
                User {
                    display_name: identity.display_name.clone(),
                    ..user
                }
            }
            None => {
                let user = User {
                    id: format!("user{}", rows.len() + 1),
                    display_name: identity.display_name.clone(),
                    email: identity.email.clone(),
                };
                self.store.append_row(Table::Users, user.to_row()).await?;
                info!(user_id = %user.id, "registered new user");
                user
            }
        };

        Ok(Resolved { value: user, warnings })
    }
}

fn duplicate_users(rows: &[Row]) -> Vec<ConsistencyWarning> {
    let mut by_email: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for user in rows.iter().filter_map(User::from_row) {
        by_email.entry(user.email).or_default().push(user.id);
    }
    by_email
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(email, user_ids)| ConsistencyWarning::DuplicateUser { email, user_ids })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Credential, MemoryCredentialStore, Session};
    use crate::session::tests::CountingConsent;
    use binder_sheets_client::{InMemoryStore, StoreCall};
    use std::sync::Arc;

    fn resolver(memory: &InMemoryStore) -> IdentityResolver {
        let session = Session::new(
            Arc::new(CountingConsent::new()),
            Arc::new(MemoryCredentialStore::with_credential(Credential::new(AccessToken::new("t")))),
        );
        IdentityResolver::new(AuthorizedStore::new(Arc::new(memory.clone()), Arc::new(session)))
    }

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn identity(email: &str, name: &str) -> ExternalIdentity {
        ExternalIdentity {
            email: email.into(),
            display_name: name.into(),
        }
    }

    #[tokio::test]
    async fn test_new_email_appends_user_with_next_id() {
        let memory = InMemoryStore::new();
        memory
            .seed(
                Table::Users,
                vec![row(&["user1", "Ash", "ash@example.com"]), row(&["user2", "Misty", "misty@example.com"])],
            )
            .await;

        let resolved = resolver(&memory)
            .resolve_current_user(&identity("brock@example.com", "Brock"))
            .await
            .unwrap();

        assert_eq!(resolved.value.id, "user3");
        assert!(resolved.warnings.is_empty());
        let rows = memory.rows(Table::Users).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], row(&["user3", "Brock", "brock@example.com"]));
    }

    #[tokio::test]
    async fn test_matching_user_is_returned_without_write() {
        let memory = InMemoryStore::new();
        memory.seed(Table::Users, vec![row(&["user1", "Ash", "ash@example.com"])]).await;

        let resolved = resolver(&memory)
            .resolve_current_user(&identity("ash@example.com", "Ash"))
            .await
            .unwrap();

        assert_eq!(resolved.value.id, "user1");
        assert_eq!(memory.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_changed_name_updates_single_cell() {
        let memory = InMemoryStore::new();
        memory
            .seed(
                Table::Users,
                vec![row(&["user1", "Ash", "ash@example.com"]), row(&["user2", "Misty", "misty@example.com"])],
            )
            .await;

        let resolved = resolver(&memory)
            .resolve_current_user(&identity("misty@example.com", "Kasumi"))
            .await
            .unwrap();

        assert_eq!(resolved.value.display_name, "Kasumi");
        assert_eq!(resolved.value.id, "user2");
        assert!(memory
            .calls()
            .await
            .contains(&StoreCall::Update(Range::cell(Table::Users, 1, 3))));
        assert_eq!(memory.rows(Table::Users).await[1], row(&["user2", "Kasumi", "misty@example.com"]));
    }

    #[tokio::test]
    async fn test_duplicate_emails_warn_and_first_row_wins() {
        let memory = InMemoryStore::new();
        memory
            .seed(
                Table::Users,
                vec![row(&["user1", "Ash", "ash@example.com"]), row(&["user2", "Ash", "ash@example.com"])],
            )
            .await;

        let resolved = resolver(&memory)
            .resolve_current_user(&identity("ash@example.com", "Ash"))
            .await
            .unwrap();

        assert_eq!(resolved.value.id, "user1");
        assert_eq!(
            resolved.warnings,
            vec![ConsistencyWarning::DuplicateUser {
                email: "ash@example.com".into(),
                user_ids: vec!["user1".into(), "user2".into()],
            }]
        );
    }

    #[tokio::test]
    async fn test_list_users_skips_blank_rows() {
        let memory = InMemoryStore::new();
        memory
            .seed(Table::Users, vec![row(&["user1", "Ash", "ash@example.com"]), row(&[]), row(&["user3", "Brock"])])
            .await;

        let users = resolver(&memory).list_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].email, "");
    }
}
