//! # Forage Engine
//!
//! Versioned object-store engine abstraction for forage.
//!
//! An engine hosts named databases. Each database has an integer version
//! and a set of object stores holding key/value records. The set of stores
//! can only change during a version change, and a version change first asks
//! every other open connection to that database to close. Connections that
//! were open before a version change become stale: their transactions fail
//! with `InvalidState` once they close, and they never see stores created
//! after they opened (`NotFound`).
//!
//! ## Design Principles
//!
//! - Errors carry an [`EngineErrorKind`]; callers decide recovery on kind
//! - Transactions are scoped to one store and apply their writes on commit
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - In-process engine for tests and ephemeral storage
//!
//! ## Example
//!
//! ```rust
//! use forage_engine::{Connection, Engine, MemoryEngine, OpenRequest, TransactionMode, VersionChange};
//! use forage_codec::Value;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = MemoryEngine::new();
//! let conn = engine
//!     .open(OpenRequest::new("app").on_upgrade(Box::new(|change: &mut dyn VersionChange| {
//!         change.create_object_store("items")
//!     })))
//!     .await
//!     .unwrap();
//!
//! let mut tx = conn.transaction("items", TransactionMode::ReadWrite).unwrap();
//! tx.put("greeting", Value::from("hello")).await.unwrap();
//! tx.commit().await.unwrap();
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;

pub use backend::{
    Connection, Cursor, CursorKind, Engine, OpenRequest, Record, Transaction, TransactionMode,
    UpgradeFn, VersionChange, VersionChangeHandler,
};
pub use error::{EngineError, EngineErrorKind, EngineResult};
pub use memory::{MemoryConnection, MemoryEngine, MemoryEngineBuilder};
