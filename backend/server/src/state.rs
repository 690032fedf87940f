use std::sync::Arc;

use axum_extra::extract::cookie::Key;
use store::{MemoryStore, RedisStore, Store};
use tracing::info;

use super::config::{Config, StoreBackend};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub cookie_key: Key,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store = open_store(&config).await?;

        Ok(Self::with_store(config, store))
    }

    /// `config.secret_key` must be at least `MIN_SECRET_LEN` bytes.
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Arc<Self> {
        let cookie_key = Key::derive_from(config.secret_key.as_bytes());

        Arc::new(Self {
            config,
            store,
            cookie_key,
        })
    }
}

pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
        StoreBackend::Memory => {
            info!("Using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    Ok(store)
}
