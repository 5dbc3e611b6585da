pub mod chat;
pub mod conversations;
pub mod doctor;
pub mod onboard;
pub mod tools;

use lokal_config::{AppConfig, StoreBackend};
use lokal_core::error::StoreError;
use lokal_core::store::ConversationStore;
use lokal_store::{InMemoryStore, SqliteStore};
use std::sync::Arc;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// Open the configured conversation store.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn ConversationStore>, StoreError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Sqlite => {
            if let Some(parent) = config.store.path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
            }
            let path = config.store.path.to_string_lossy();
            Ok(Arc::new(SqliteStore::new(&path).await?))
        }
    }
}
