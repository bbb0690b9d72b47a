//! In-memory engine.

use crate::backend::{
    Connection, Cursor, CursorKind, Engine, OpenRequest, Record, Transaction, TransactionMode,
    VersionChange, VersionChangeHandler,
};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use forage_codec::{from_bytes, to_bytes, Value};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

type StoreData = BTreeMap<String, Vec<u8>>;

/// An in-memory versioned object-store engine.
///
/// This engine keeps every database in process memory and is suitable for:
/// - Unit and integration tests
/// - Ephemeral storage that doesn't need persistence
///
/// Values are stored in their encoded byte form, so what comes back is an
/// independent copy of what was written. Every I/O point yields to the
/// async scheduler, letting concurrent callers interleave the way they
/// would on an event loop.
///
/// # Example
///
/// ```rust
/// use forage_engine::{Connection, Engine, MemoryEngine, OpenRequest};
///
/// # tokio_test_block(async {
/// let engine = MemoryEngine::new();
/// let conn = engine.open(OpenRequest::new("app")).await.unwrap();
/// assert_eq!(conn.version(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future<Output = ()>>(f: F) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<EngineState>,
    blob_unsupported: bool,
    quota: Option<usize>,
}

#[derive(Default)]
struct EngineState {
    databases: HashMap<String, DatabaseState>,
    next_id: u64,
}

impl EngineState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct DatabaseState {
    generation: u64,
    version: u32,
    stores: BTreeMap<String, StoreData>,
    connections: Vec<Weak<MemoryConnection>>,
}

impl DatabaseState {
    fn open_connections(&self) -> Vec<Arc<MemoryConnection>> {
        self.connections
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|c| !c.is_closed())
            .collect()
    }

    fn size(&self) -> usize {
        self.stores.values().map(store_size).sum()
    }

    /// Asks every open connection to go away before a version change or
    /// delete. Connections that ignore the request are closed.
    fn notify_version_change(&mut self, name: &str) {
        let open = self.open_connections();
        for conn in &open {
            conn.fire_version_change();
        }

        let blocked: Vec<_> = open.iter().filter(|c| !c.is_closed()).collect();
        if !blocked.is_empty() {
            warn!(
                database = name,
                connections = blocked.len(),
                "version change blocked by open connections, closing them"
            );
            for conn in blocked {
                conn.close();
            }
        }

        self.connections
            .retain(|w| w.upgrade().is_some_and(|c| !c.is_closed()));
    }
}

fn store_size(store: &StoreData) -> usize {
    store.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl MemoryEngine {
    /// Creates an empty engine with native blob support and no quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for a customised engine.
    #[must_use]
    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder::default()
    }

    /// Closes every open connection to `name` without notifying them,
    /// as a browser does when it tears down storage underneath a page.
    ///
    /// Returns the number of connections closed.
    pub fn force_close(&self, name: &str) -> usize {
        let mut state = self.shared.state.lock();
        let Some(db) = state.databases.get_mut(name) else {
            return 0;
        };
        let open = db.open_connections();
        for conn in &open {
            conn.close();
        }
        db.connections.clear();
        open.len()
    }

    /// Returns the current version of a database.
    #[must_use]
    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.shared
            .state
            .lock()
            .databases
            .get(name)
            .map(|db| db.version)
    }

    /// Returns the object stores of a database.
    #[must_use]
    pub fn object_store_names(&self, name: &str) -> Vec<String> {
        self.shared
            .state
            .lock()
            .databases
            .get(name)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the names of all databases.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.shared.state.lock().databases.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of open connections to a database.
    #[must_use]
    pub fn open_connection_count(&self, name: &str) -> usize {
        self.shared
            .state
            .lock()
            .databases
            .get(name)
            .map(|db| db.open_connections().len())
            .unwrap_or(0)
    }

    /// Returns the bytes used by a database.
    #[must_use]
    pub fn database_size(&self, name: &str) -> usize {
        self.shared
            .state
            .lock()
            .databases
            .get(name)
            .map(DatabaseState::size)
            .unwrap_or(0)
    }
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("databases", &self.database_names())
            .field("blob_support", &!self.shared.blob_unsupported)
            .field("quota", &self.shared.quota)
            .finish()
    }
}

/// Builder for [`MemoryEngine`].
#[derive(Debug, Default)]
pub struct MemoryEngineBuilder {
    blob_unsupported: bool,
    quota: Option<usize>,
}

impl MemoryEngineBuilder {
    /// Sets whether blobs can be stored natively.
    #[must_use]
    pub fn blob_support(mut self, supported: bool) -> Self {
        self.blob_unsupported = !supported;
        self
    }

    /// Caps the bytes a single database may use.
    #[must_use]
    pub fn quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> MemoryEngine {
        MemoryEngine {
            shared: Arc::new(Shared {
                state: Mutex::default(),
                blob_unsupported: self.blob_unsupported,
                quota: self.quota,
            }),
        }
    }
}

enum SchemaOp {
    Create(String),
    Delete(String),
}

struct MemoryVersionChange {
    old_version: u32,
    new_version: u32,
    names: Vec<String>,
    ops: Vec<SchemaOp>,
}

impl VersionChange for MemoryVersionChange {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn new_version(&self) -> u32 {
        self.new_version
    }

    fn object_store_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn create_object_store(&mut self, name: &str) -> EngineResult<()> {
        if self.contains_store(name) {
            return Err(EngineError::constraint(format!(
                "object store '{name}' already exists"
            )));
        }
        self.names.push(name.to_string());
        self.ops.push(SchemaOp::Create(name.to_string()));
        Ok(())
    }

    fn delete_object_store(&mut self, name: &str) -> EngineResult<()> {
        let Some(pos) = self.names.iter().position(|s| s == name) else {
            return Err(EngineError::not_found(format!(
                "object store '{name}' does not exist"
            )));
        };
        self.names.remove(pos);
        self.ops.push(SchemaOp::Delete(name.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn open(&self, mut request: OpenRequest) -> EngineResult<Arc<dyn Connection>> {
        tokio::task::yield_now().await;

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let name = request.name.clone();
        let current = state.databases.get(&name).map_or(0, |db| db.version);

        let target = match request.version {
            Some(0) => return Err(EngineError::invalid_argument("version must be positive")),
            Some(v) if v < current => {
                return Err(EngineError::version(format!(
                    "requested version ({v}) is less than the existing version ({current})"
                )))
            }
            Some(v) => v,
            None => current.max(1),
        };

        if target > current {
            let mut change = MemoryVersionChange {
                old_version: current,
                new_version: target,
                names: Vec::new(),
                ops: Vec::new(),
            };
            if let Some(db) = state.databases.get_mut(&name) {
                db.notify_version_change(&name);
                change.names = db.stores.keys().cloned().collect();
            }

            if let Some(upgrade) = request.take_upgrade() {
                if let Err(err) = upgrade(&mut change) {
                    debug!(database = %name, error = %err, "version change aborted");
                    return Err(err);
                }
            }

            let generation = state.next_id();
            let db = state
                .databases
                .entry(name.clone())
                .or_insert_with(|| DatabaseState {
                    generation,
                    version: 0,
                    stores: BTreeMap::new(),
                    connections: Vec::new(),
                });
            for op in change.ops {
                match op {
                    SchemaOp::Create(store) => {
                        db.stores.insert(store, StoreData::new());
                    }
                    SchemaOp::Delete(store) => {
                        db.stores.remove(&store);
                    }
                }
            }
            db.version = target;
            debug!(database = %name, from = current, to = target, "database upgraded");
        }

        let id = state.next_id();
        let db = state
            .databases
            .get_mut(&name)
            .ok_or_else(|| EngineError::aborted(format!("database '{name}' vanished")))?;
        let conn = Arc::new(MemoryConnection {
            id,
            name: name.clone(),
            version: db.version,
            generation: db.generation,
            stores: db.stores.keys().cloned().collect(),
            closed: AtomicBool::new(false),
            on_version_change: Mutex::new(None),
            shared: Arc::clone(&self.shared),
        });
        db.connections.push(Arc::downgrade(&conn));
        Ok(conn)
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        tokio::task::yield_now().await;

        let mut state = self.shared.state.lock();
        if let Some(mut db) = state.databases.remove(name) {
            db.notify_version_change(name);
            debug!(database = name, "database deleted");
        }
        Ok(())
    }
}

/// A connection to a [`MemoryEngine`] database.
pub struct MemoryConnection {
    id: u64,
    name: String,
    version: u32,
    generation: u64,
    stores: Vec<String>,
    closed: AtomicBool,
    on_version_change: Mutex<Option<VersionChangeHandler>>,
    shared: Arc<Shared>,
}

impl MemoryConnection {
    fn fire_version_change(&self) {
        let handler = self.on_version_change.lock();
        if let Some(handler) = handler.as_ref() {
            handler(self);
        }
    }
}

impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("stores", &self.stores)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn object_store_names(&self) -> Vec<String> {
        self.stores.clone()
    }

    fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
    ) -> EngineResult<Box<dyn Transaction>> {
        if self.is_closed() {
            return Err(EngineError::invalid_state(
                "the database connection is closing",
            ));
        }
        if !self.stores.iter().any(|s| s == store) {
            return Err(EngineError::not_found(format!(
                "object store '{store}' was not found"
            )));
        }
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            database: self.name.clone(),
            generation: self.generation,
            store: store.to_string(),
            mode,
            ops: Vec::new(),
            finished: false,
        }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn on_version_change(&self, handler: VersionChangeHandler) {
        *self.on_version_change.lock() = Some(handler);
    }
}

enum WriteOp {
    Put(String, Vec<u8>),
    Delete(String),
    Clear,
}

fn apply_ops(store: &mut StoreData, ops: &[WriteOp]) {
    for op in ops {
        match op {
            WriteOp::Put(key, bytes) => {
                store.insert(key.clone(), bytes.clone());
            }
            WriteOp::Delete(key) => {
                store.remove(key);
            }
            WriteOp::Clear => store.clear(),
        }
    }
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    database: String,
    generation: u64,
    store: String,
    mode: TransactionMode,
    ops: Vec<WriteOp>,
    finished: bool,
}

impl MemoryTransaction {
    fn check_active(&self) -> EngineResult<()> {
        if self.finished {
            return Err(EngineError::invalid_state("the transaction has finished"));
        }
        Ok(())
    }

    fn check_writable(&self) -> EngineResult<()> {
        self.check_active()?;
        if self.mode == TransactionMode::ReadOnly {
            return Err(EngineError::read_only("the transaction is read-only"));
        }
        Ok(())
    }

    /// Runs `f` against the store as this transaction sees it: committed
    /// data with the transaction's own pending writes applied.
    fn with_view<R>(&self, f: impl FnOnce(&StoreData) -> R) -> EngineResult<R> {
        let state = self.shared.state.lock();
        let store = lookup_store(&state, &self.database, self.generation, &self.store)?;
        if self.ops.is_empty() {
            return Ok(f(store));
        }
        let mut view = store.clone();
        apply_ops(&mut view, &self.ops);
        Ok(f(&view))
    }
}

fn lookup_store<'a>(
    state: &'a EngineState,
    database: &str,
    generation: u64,
    store: &str,
) -> EngineResult<&'a StoreData> {
    let db = state
        .databases
        .get(database)
        .filter(|db| db.generation == generation)
        .ok_or_else(|| EngineError::aborted(format!("database '{database}' was deleted")))?;
    db.stores
        .get(store)
        .ok_or_else(|| EngineError::aborted(format!("object store '{store}' was deleted")))
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn store_name(&self) -> &str {
        &self.store
    }

    async fn get(&mut self, key: &str) -> EngineResult<Option<Value>> {
        tokio::task::yield_now().await;
        self.check_active()?;
        let bytes = self.with_view(|store| store.get(key).cloned())?;
        bytes.map(|b| from_bytes(&b).map_err(EngineError::from)).transpose()
    }

    async fn put(&mut self, key: &str, value: Value) -> EngineResult<()> {
        self.check_writable()?;
        if self.shared.blob_unsupported && value.contains_blob() {
            return Err(EngineError::data_clone("blobs cannot be stored by this engine"));
        }
        let bytes = to_bytes(&value)?;
        self.ops.push(WriteOp::Put(key.to_string(), bytes));
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> EngineResult<()> {
        self.check_writable()?;
        self.ops.push(WriteOp::Delete(key.to_string()));
        Ok(())
    }

    async fn clear(&mut self) -> EngineResult<()> {
        self.check_writable()?;
        self.ops.push(WriteOp::Clear);
        Ok(())
    }

    async fn count(&mut self) -> EngineResult<u64> {
        tokio::task::yield_now().await;
        self.check_active()?;
        self.with_view(|store| store.len() as u64)
    }

    async fn open_cursor(&mut self, kind: CursorKind) -> EngineResult<Box<dyn Cursor>> {
        tokio::task::yield_now().await;
        self.check_active()?;
        let snapshot = self.with_view(Clone::clone)?;
        Ok(Box::new(MemoryCursor {
            records: snapshot,
            kind,
            position: None,
        }))
    }

    async fn commit(&mut self) -> EngineResult<()> {
        tokio::task::yield_now().await;
        self.check_active()?;
        self.finished = true;
        if self.ops.is_empty() {
            return Ok(());
        }

        let mut state = self.shared.state.lock();
        let db = state
            .databases
            .get_mut(&self.database)
            .filter(|db| db.generation == self.generation)
            .ok_or_else(|| {
                EngineError::aborted(format!("database '{}' was deleted", self.database))
            })?;

        let before = db.size();
        let store = db.stores.get_mut(&self.store).ok_or_else(|| {
            EngineError::aborted(format!("object store '{}' was deleted", self.store))
        })?;
        let mut updated = store.clone();
        apply_ops(&mut updated, &self.ops);

        if let Some(quota) = self.shared.quota {
            let after = before - store_size(store) + store_size(&updated);
            if after > quota {
                return Err(EngineError::quota_exceeded(format!(
                    "database '{}' would use {after} bytes, quota is {quota}",
                    self.database
                )));
            }
        }

        *store = updated;
        Ok(())
    }
}

/// Cursor over a snapshot of the store taken when it was opened.
struct MemoryCursor {
    records: StoreData,
    kind: CursorKind,
    position: Option<String>,
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn advance(&mut self, count: u32) -> EngineResult<Option<Record>> {
        tokio::task::yield_now().await;
        if count == 0 {
            return Err(EngineError::invalid_argument("advance count must be positive"));
        }

        let lower = match &self.position {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        let next = self
            .records
            .range::<String, _>((lower, Bound::Unbounded))
            .nth(count as usize - 1)
            .map(|(k, v)| (k.clone(), v.clone()));

        let Some((key, bytes)) = next else {
            self.position = self.records.keys().next_back().cloned();
            return Ok(None);
        };
        self.position = Some(key.clone());
        let value = match self.kind {
            CursorKind::Keys => None,
            CursorKind::Values => Some(from_bytes(&bytes)?),
        };
        Ok(Some(Record { key, value }))
    }
}
