//! # Forage Core
//!
//! Asynchronous key-value storage over a versioned object-store engine.
//!
//! Several [`Forage`] instances may point at the same database name with
//! different store names. They share one engine connection, kept in a
//! [`DbContext`] inside an explicit [`ContextRegistry`]. Adding a store
//! needs a version change, which invalidates every other open connection,
//! so connection changes are coordinated here:
//!
//! - **Registry**: one shared context per database name
//! - **Readiness queue**: disruptive changes (upgrade, reconnect, drop) push
//!   a gate; operations wait for every gate pushed before them
//! - **Connection manager**: opens, upgrades and reopens the shared
//!   connection and retries a failed transaction once after reconnecting
//! - **Driver**: [`AsyncStorage`] runs get/set/remove/clear/length/key/keys/
//!   iterate/drop against the instance's store
//!
//! Callers never see connection churn unless the retry budget is exhausted,
//! in which case the engine error is returned unmodified.
//!
//! ## Example
//!
//! ```rust
//! use forage_core::{ContextRegistry, Forage, ForageConfig};
//! use forage_engine::MemoryEngine;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = Arc::new(MemoryEngine::new());
//! let registry = Arc::new(ContextRegistry::new());
//!
//! let users = Forage::async_storage(
//!     engine.clone(),
//!     registry.clone(),
//!     ForageConfig::new("app").with_store_name("users"),
//! );
//! let cache = Forage::async_storage(
//!     engine.clone(),
//!     registry.clone(),
//!     ForageConfig::new("app").with_store_name("cache"),
//! );
//!
//! users.set_item("k", "alice").await.unwrap();
//! cache.set_item("k", 42).await.unwrap();
//! assert_eq!(users.length().await.unwrap(), 1);
//! assert_eq!(cache.keys().await.unwrap(), vec!["k".to_string()]);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod async_storage;
mod callback;
mod config;
mod connection;
mod driver;
mod error;
mod forage;
mod readiness;
mod registry;

pub use async_storage::{AsyncStorage, ASYNC_STORAGE};
pub use callback::{execute_callback, Callback};
pub use config::{
    DropOptions, ForageConfig, DEFAULT_NAME, DEFAULT_SIZE, DEFAULT_STORE_NAME,
    DEFAULT_TRANSACTION_RETRIES, DEFAULT_VERSION,
};
pub use connection::{ConnectionManager, DETECT_BLOB_SUPPORT_STORE};
pub use driver::Driver;
pub use error::{ForageError, ForageResult};
pub use forage::Forage;
pub use readiness::ReadyFuture;
pub use registry::{ContextRegistry, DbContext};

pub use forage_codec::{Blob, Value};
