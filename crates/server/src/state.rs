//! Application state shared across handlers.

use crate::coordinator::Coordinator;
use custody_core::config::AppConfig;
use custody_metadata::MetadataStore;
use custody_storage::ObjectStore;
use custody_token::TokenMaker;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend holding evidence content.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Issues and verifies bearer tokens.
    pub tokens: Arc<dyn TokenMaker>,
    /// Cross-store evidence lifecycle.
    pub coordinator: Coordinator,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The coordinator is built over the same stores the handlers see.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        tokens: Arc<dyn TokenMaker>,
    ) -> Self {
        let coordinator = Coordinator::new(metadata.clone(), storage.clone());
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            tokens,
            coordinator,
        }
    }
}
