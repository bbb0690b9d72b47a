//! Driver capability interface.

use crate::config::{DropOptions, ForageConfig};
use crate::error::ForageResult;
use async_trait::async_trait;
use forage_codec::Value;
use std::ops::ControlFlow;

/// A storage backend behind a [`crate::Forage`] instance.
///
/// Each driver value serves exactly one instance. `init_storage` is called
/// once, before any other operation.
///
/// # Invariants
///
/// - Every operation observes writes completed earlier by the same instance
/// - Missing keys read as `None`
/// - Iteration visits keys in ascending order
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name of the driver.
    fn name(&self) -> &str;

    /// Returns true if the driver can run in this environment.
    fn supported(&self) -> bool;

    /// Connects the instance to its database and store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or upgraded.
    async fn init_storage(&self, config: &ForageConfig) -> ForageResult<()>;

    /// Resolves once initialisation has finished and no connection change
    /// is pending on the database.
    async fn ready(&self) -> ForageResult<()>;

    /// Reads a value.
    async fn get_item(&self, key: &str) -> ForageResult<Option<Value>>;

    /// Writes a value and returns it.
    async fn set_item(&self, key: &str, value: Value) -> ForageResult<Value>;

    /// Removes a key.
    async fn remove_item(&self, key: &str) -> ForageResult<()>;

    /// Removes every key in the store.
    async fn clear(&self) -> ForageResult<()>;

    /// Counts the keys in the store.
    async fn length(&self) -> ForageResult<u64>;

    /// Returns the key at `index` in ascending order.
    async fn key(&self, index: usize) -> ForageResult<Option<String>>;

    /// Returns every key in ascending order.
    async fn keys(&self) -> ForageResult<Vec<String>>;

    /// Visits every record in ascending key order, passing the value, the
    /// key and a 1-based sequence number, until `iteratee` breaks.
    async fn iterate(
        &self,
        iteratee: &mut (dyn for<'k> FnMut(Value, &'k str, u32) -> ControlFlow<()> + Send),
    ) -> ForageResult<()>;

    /// Drops a store or a whole database. `options.name` is always set.
    async fn drop_instance(&self, options: DropOptions) -> ForageResult<()>;
}
