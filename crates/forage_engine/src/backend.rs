//! Engine trait definitions.

use crate::error::EngineResult;
use async_trait::async_trait;
use forage_codec::Value;
use std::fmt;
use std::sync::Arc;

/// Schema callback run inside a version change.
///
/// Runs while the engine holds its internal state and must not call back
/// into the engine.
pub type UpgradeFn = Box<dyn FnOnce(&mut dyn VersionChange) -> EngineResult<()> + Send>;

/// Callback run on an open connection when another request needs to change
/// or delete its database.
///
/// Runs while the engine holds its internal state and must not call back
/// into the engine. Closing the connection is the expected reaction.
pub type VersionChangeHandler = Box<dyn Fn(&dyn Connection) + Send + Sync>;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// What a cursor yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    /// Keys only.
    Keys,
    /// Keys and values.
    Values,
}

/// One record visited by a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The record key.
    pub key: String,
    /// The record value, `None` for key cursors.
    pub value: Option<Value>,
}

/// A request to open a database connection.
pub struct OpenRequest {
    /// Database name.
    pub name: String,
    /// Target version; `None` opens at the current version.
    pub version: Option<u32>,
    on_upgrade: Option<UpgradeFn>,
}

impl OpenRequest {
    /// Creates a request for the current version of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            on_upgrade: None,
        }
    }

    /// Sets the target version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the schema callback run if the open causes a version change.
    #[must_use]
    pub fn on_upgrade(mut self, upgrade: UpgradeFn) -> Self {
        self.on_upgrade = Some(upgrade);
        self
    }

    /// Takes the schema callback out of the request.
    pub fn take_upgrade(&mut self) -> Option<UpgradeFn> {
        self.on_upgrade.take()
    }
}

impl fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRequest")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("on_upgrade", &self.on_upgrade.is_some())
            .finish()
    }
}

/// Schema operations available during a version change.
pub trait VersionChange {
    /// Version before the change (0 for a new database).
    fn old_version(&self) -> u32;

    /// Version after the change.
    fn new_version(&self) -> u32;

    /// Names of the object stores as seen by the change so far.
    fn object_store_names(&self) -> Vec<String>;

    /// Returns true if the store exists.
    fn contains_store(&self, name: &str) -> bool {
        self.object_store_names().iter().any(|s| s == name)
    }

    /// Creates an object store.
    ///
    /// # Errors
    ///
    /// Returns a `Constraint` error if the store already exists.
    fn create_object_store(&mut self, name: &str) -> EngineResult<()>;

    /// Deletes an object store and its data.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the store does not exist.
    fn delete_object_store(&mut self, name: &str) -> EngineResult<()>;
}

/// A versioned object-store engine.
///
/// An engine hosts named databases. Each database has an integer version
/// and a set of object stores; changing the set of stores is only possible
/// during a version change, which requires every other open connection to
/// that database to go away.
///
/// # Invariants
///
/// - Versions only increase; opening at a lower version fails
/// - A version change notifies every other open connection first
/// - Deleting a database that does not exist succeeds
#[async_trait]
pub trait Engine: Send + Sync {
    /// Opens a connection, running a version change if the requested
    /// version is above the current one.
    ///
    /// # Errors
    ///
    /// Returns `Version` on a downgrade request, or the error returned by
    /// the upgrade callback (the version change is then rolled back).
    async fn open(&self, request: OpenRequest) -> EngineResult<Arc<dyn Connection>>;

    /// Deletes a database and all its stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to delete the database.
    async fn delete_database(&self, name: &str) -> EngineResult<()>;
}

/// An open connection to one database at one version.
pub trait Connection: Send + Sync + fmt::Debug {
    /// Database name.
    fn name(&self) -> &str;

    /// Version the connection was opened at.
    fn version(&self) -> u32;

    /// Object stores visible to this connection.
    fn object_store_names(&self) -> Vec<String>;

    /// Returns true if the store is visible to this connection.
    fn contains_store(&self, store: &str) -> bool {
        self.object_store_names().iter().any(|s| s == store)
    }

    /// Starts a transaction on one store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the connection is closed and `NotFound`
    /// if the store does not exist.
    fn transaction(&self, store: &str, mode: TransactionMode)
        -> EngineResult<Box<dyn Transaction>>;

    /// Closes the connection. Idempotent.
    fn close(&self);

    /// Returns true once the connection is closed.
    fn is_closed(&self) -> bool;

    /// Installs the version-change handler, replacing any previous one.
    fn on_version_change(&self, handler: VersionChangeHandler);
}

/// A transaction scoped to a single object store.
///
/// Writes become durable, all at once, when [`Transaction::commit`]
/// succeeds.
#[async_trait]
pub trait Transaction: Send {
    /// Access mode.
    fn mode(&self) -> TransactionMode;

    /// Name of the store the transaction is scoped to.
    fn store_name(&self) -> &str;

    /// Reads one value.
    async fn get(&mut self, key: &str) -> EngineResult<Option<Value>>;

    /// Writes one value.
    async fn put(&mut self, key: &str, value: Value) -> EngineResult<()>;

    /// Removes one key. Removing a missing key succeeds.
    async fn delete(&mut self, key: &str) -> EngineResult<()>;

    /// Removes every key in the store.
    async fn clear(&mut self) -> EngineResult<()>;

    /// Counts the records in the store.
    async fn count(&mut self) -> EngineResult<u64>;

    /// Opens a cursor positioned before the first key.
    async fn open_cursor(&mut self, kind: CursorKind) -> EngineResult<Box<dyn Cursor>>;

    /// Completes the transaction.
    ///
    /// # Errors
    ///
    /// Returns `QuotaExceeded` if the writes do not fit, or `Aborted` if
    /// the database went away. Nothing is applied on error.
    async fn commit(&mut self) -> EngineResult<()>;
}

/// A forward cursor over a store in ascending key order.
#[async_trait]
pub trait Cursor: Send {
    /// Moves forward `count` records and returns the record reached, or
    /// `None` past the end.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `count` is zero.
    async fn advance(&mut self, count: u32) -> EngineResult<Option<Record>>;

    /// Moves to the next record.
    async fn next(&mut self) -> EngineResult<Option<Record>> {
        self.advance(1).await
    }
}
