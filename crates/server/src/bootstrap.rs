//! Admin account initialization.

use anyhow::{Result, bail};
use custody_core::config::AdminConfig;
use custody_core::password::is_valid_hash;
use custody_metadata::MetadataStore;

/// Ensure the configured admin account exists with the configured password hash.
///
/// If the hash changes between restarts, the stored hash is replaced so the
/// old password stops working.
pub async fn ensure_admin_user(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    if config.username.is_empty() {
        bail!("invalid admin username: must not be empty");
    }
    if !is_valid_hash(&config.password_hash) {
        bail!("invalid admin password_hash: expected an argon2 PHC string");
    }

    match metadata.get_user_by_username(&config.username).await? {
        Some(existing) if existing.password_hash == config.password_hash => {
            tracing::debug!(username = %config.username, "Admin user already exists");
        }
        Some(existing) => {
            metadata
                .update_password_hash(existing.id, &config.password_hash)
                .await?;
            tracing::info!(user_id = existing.id, "Admin password rotated");
        }
        None => {
            let user = metadata
                .create_user(&config.username, &config.password_hash)
                .await?;
            tracing::info!(user_id = user.id, "Admin user created");
        }
    }

    Ok(())
}
