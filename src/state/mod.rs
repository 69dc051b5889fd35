//! Persistence for agents, conversations, visits, transactions and profiles.

pub mod database;
pub mod schema;
pub mod store;
pub mod supabase;

pub use database::Database;
pub use store::{save_transcript, SaveOutcome, SqliteStore, Store, StoreResult};
pub use supabase::SupabaseStore;

use crate::config::{OportunaConfig, StoreBackend};
use crate::error::StoreError;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Open the backend selected by the configuration.
pub fn open_store(config: &OportunaConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config.store_backend {
        StoreBackend::Sqlite => {
            let path = config.resolved_db_path();
            info!("Using SQLite store at {}", path);
            Ok(Arc::new(SqliteStore::open(Path::new(&path))?))
        }
        StoreBackend::Supabase => {
            info!("Using Supabase store at {}", config.supabase_url);
            Ok(Arc::new(SupabaseStore::new(
                &config.supabase_url,
                &config.supabase_key,
            )))
        }
    }
}
