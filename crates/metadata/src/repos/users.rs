//! User repository.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;

/// Repository for user accounts.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user. Fails with `AlreadyExists` if the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> MetadataResult<UserRow>;

    /// Get a user by username.
    async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>>;

    /// Replace a user's password hash.
    async fn update_password_hash(&self, user_id: i64, password_hash: &str)
    -> MetadataResult<()>;
}
