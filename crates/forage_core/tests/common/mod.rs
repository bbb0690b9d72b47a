//! Shared helpers for forage integration tests.

#![allow(dead_code)]

use forage_core::{ContextRegistry, Forage, ForageConfig};
use forage_engine::MemoryEngine;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; `RUST_LOG=debug` shows connection churn.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One engine and one registry, the way a single process sees them.
pub struct Harness {
    pub engine: MemoryEngine,
    pub registry: Arc<ContextRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_engine(MemoryEngine::new())
    }

    pub fn with_engine(engine: MemoryEngine) -> Self {
        init_tracing();
        Self {
            engine,
            registry: Arc::new(ContextRegistry::new()),
        }
    }

    /// Creates an instance on database `name`, store `store`.
    pub fn forage(&self, name: &str, store: &str) -> Forage {
        self.forage_with(ForageConfig::new(name).with_store_name(store))
    }

    pub fn forage_with(&self, config: ForageConfig) -> Forage {
        Forage::async_storage(
            Arc::new(self.engine.clone()),
            Arc::clone(&self.registry),
            config,
        )
    }
}
