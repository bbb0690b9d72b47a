//! Connection registry.
//!
//! Every instance pointing at the same database name shares one
//! [`DbContext`]: the live connection handle, the list of sharing instances
//! and the readiness chain. The registry is an explicit value handed to
//! each driver, so independent registries never see each other's state.

use crate::readiness::{Deferred, ReadyFuture};
use forage_engine::Connection;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Process-wide map from database name to its shared context.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: Mutex<HashMap<String, Arc<DbContext>>>,
}

impl ContextRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context for `name`, creating an empty one on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<DbContext> {
        let mut contexts = self.contexts.lock();
        Arc::clone(
            contexts
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(DbContext::new(name))),
        )
    }

    /// Returns the context for `name` if one exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<DbContext>> {
        self.contexts.lock().get(name).cloned()
    }

    /// Returns the number of known databases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Returns true if no database has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}

/// Shared state of one database.
///
/// Contexts live as long as their registry. The connection handle inside
/// may be cleared and re-established any number of times.
pub struct DbContext {
    name: String,
    pub(crate) state: Mutex<ContextState>,
}

#[derive(Default)]
pub(crate) struct ContextState {
    pub(crate) forages: Vec<Weak<InstanceState>>,
    pub(crate) db: Option<Arc<dyn Connection>>,
    pub(crate) db_ready: Option<ReadyFuture>,
    pub(crate) deferred: Vec<Deferred>,
    pub(crate) blob_support: Option<bool>,
}

impl DbContext {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::default(),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shared connection handle, if any.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.state.lock().db.clone()
    }

    /// Returns the number of live instances sharing this database.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.state
            .lock()
            .forages
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Appends an instance. Each instance registers exactly once, when it
    /// initialises.
    pub(crate) fn register_instance(&self, instance: &Arc<InstanceState>) {
        let mut state = self.state.lock();
        state.forages.retain(|w| w.strong_count() > 0);
        state.forages.push(Arc::downgrade(instance));
    }

    /// Snapshot of the live sharing instances, in registration order.
    pub(crate) fn sharing_instances(&self) -> Vec<Arc<InstanceState>> {
        self.state
            .lock()
            .forages
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Replaces the shared handle. The cached blob-support probe is tied to
    /// the handle and is forgotten when the handle changes.
    pub(crate) fn set_connection(&self, db: Option<Arc<dyn Connection>>) {
        let mut state = self.state.lock();
        let same = match (&state.db, &db) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            state.blob_support = None;
        }
        state.db = db;
    }

    /// Stores `db` as the shared handle and in every sharing instance.
    pub(crate) fn fan_out(&self, db: Option<Arc<dyn Connection>>) {
        self.set_connection(db.clone());
        for forage in self.sharing_instances() {
            forage.set_connection(db.clone());
        }
    }

    pub(crate) fn blob_support(&self) -> Option<bool> {
        self.state.lock().blob_support
    }

    pub(crate) fn set_blob_support(&self, supported: bool) {
        self.state.lock().blob_support = Some(supported);
    }
}

impl fmt::Debug for DbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DbContext")
            .field("name", &self.name)
            .field("db", &state.db)
            .field("forages", &state.forages.len())
            .field("pending", &state.deferred.len())
            .finish()
    }
}

/// Per-instance view of its database.
#[derive(Debug, Clone, Default)]
pub(crate) struct DbInfo {
    pub(crate) name: String,
    pub(crate) store_name: String,
    pub(crate) version: u32,
    pub(crate) db: Option<Arc<dyn Connection>>,
}

impl DbInfo {
    pub(crate) fn new(name: impl Into<String>, store_name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            store_name: store_name.into(),
            version,
            db: None,
        }
    }
}

/// State of one driver instance, shared with its database context so that
/// connection changes can be fanned out to it.
#[derive(Default)]
pub(crate) struct InstanceState {
    pub(crate) db_info: Mutex<DbInfo>,
    pub(crate) init: Mutex<Option<ReadyFuture>>,
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceState")
            .field("db_info", &*self.db_info.lock())
            .field("initialised", &self.init.lock().is_some())
            .finish()
    }
}

impl InstanceState {
    pub(crate) fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.db_info.lock().db.clone()
    }

    pub(crate) fn set_connection(&self, db: Option<Arc<dyn Connection>>) {
        self.db_info.lock().db = db;
    }

    /// Closes and forgets this instance's handle.
    pub(crate) fn close_connection(&self) {
        let db = self.db_info.lock().db.take();
        if let Some(db) = db {
            db.close();
        }
    }

    pub(crate) fn init_future(&self) -> Option<ReadyFuture> {
        self.init.lock().clone()
    }
}
