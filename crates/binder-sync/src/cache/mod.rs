//! Local caches of reconciled ownership state
//!
//! Two views over the same remote table: the signed-in user's records and
//! every user's records. Both are updated together from confirmed writes so
//! they never disagree with each other, though either may lag the remote
//! table until the next full reload.

mod ownership;

pub use ownership::{LocalCaches, OwnershipCache};
