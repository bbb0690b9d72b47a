//! Key-value driver over a versioned object-store engine.
//!
//! Instances with the same database name share one connection through the
//! registry. Every operation waits for pending connection changes, starts a
//! transaction through the connection manager (which reconnects once on a
//! stale handle) and reports success only after the transaction commits.

use crate::config::{DropOptions, ForageConfig, DEFAULT_VERSION};
use crate::connection::{
    is_upgrade_needed, next_version, ConnectionManager, DETECT_BLOB_SUPPORT_STORE,
};
use crate::driver::Driver;
use crate::error::{ForageError, ForageResult};
use crate::registry::{ContextRegistry, DbContext, DbInfo, InstanceState};
use async_trait::async_trait;
use forage_codec::{encode_blob, unwrap_encoded, Blob, Value};
use forage_engine::{
    Connection, CursorKind, Engine, EngineErrorKind, OpenRequest, TransactionMode, VersionChange,
};
use futures::future::{join_all, FutureExt};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::debug;

/// Name of the object-store driver.
pub const ASYNC_STORAGE: &str = "asyncStorage";

/// Object-store driver for one forage instance.
#[derive(Debug)]
pub struct AsyncStorage {
    manager: ConnectionManager,
    state: Arc<InstanceState>,
}

impl AsyncStorage {
    /// Creates a driver over `engine`, sharing connections with every other
    /// driver created with the same `registry`.
    pub fn new(engine: Arc<dyn Engine>, registry: Arc<ContextRegistry>) -> Self {
        Self {
            manager: ConnectionManager::new(engine, registry),
            state: Arc::new(InstanceState::default()),
        }
    }

    fn context(&self) -> Arc<DbContext> {
        let name = self.state.db_info.lock().name.clone();
        self.manager.registry().get_or_create(&name)
    }

    async fn read(&self) -> ForageResult<Box<dyn forage_engine::Transaction>> {
        self.manager
            .create_transaction(&self.state.db_info, TransactionMode::ReadOnly)
            .await
    }

    async fn write(&self) -> ForageResult<Box<dyn forage_engine::Transaction>> {
        self.manager
            .create_transaction(&self.state.db_info, TransactionMode::ReadWrite)
            .await
    }

    /// Returns whether the engine stores blobs natively, probing once per
    /// connection.
    async fn check_blob_support(&self) -> bool {
        let ctx = self.context();
        if let Some(supported) = ctx.blob_support() {
            return supported;
        }
        let Some(db) = self.state.connection() else {
            return false;
        };
        let supported = probe_blob_support(db.as_ref()).await;
        debug!(database = ctx.name(), supported, "blob support probed");
        ctx.set_blob_support(supported);
        supported
    }

    async fn prepare_value(&self, value: &Value) -> Value {
        if let Value::Blob(blob) = value {
            if !self.check_blob_support().await {
                return encode_blob(blob);
            }
        }
        value.clone()
    }

    async fn drop_database(&self, name: &str, db: Arc<dyn Connection>) -> ForageResult<()> {
        let ctx = self.manager.registry().get_or_create(name);
        ctx.defer_readiness();

        db.close();
        for forage in ctx.sharing_instances() {
            forage.close_connection();
        }

        match self.manager.engine().delete_database(name).await {
            Ok(()) => {
                ctx.fan_out(None);
                debug!(database = name, "database dropped");
                ctx.advance_readiness();
                Ok(())
            }
            Err(err) => {
                let err = ForageError::from(err);
                ctx.reject_readiness(err.clone());
                Err(err)
            }
        }
    }

    async fn drop_store(
        &self,
        name: &str,
        store_name: String,
        db: Arc<dyn Connection>,
    ) -> ForageResult<()> {
        if !db.contains_store(&store_name) {
            return Ok(());
        }

        let new_version = next_version(name, db.version())?;
        let ctx = self.manager.registry().get_or_create(name);
        ctx.defer_readiness();

        db.close();
        for forage in ctx.sharing_instances() {
            let mut info = forage.db_info.lock();
            if let Some(db) = info.db.take() {
                db.close();
            }
            info.version = new_version;
        }

        let dropped = store_name.clone();
        let request = OpenRequest::new(name)
            .with_version(new_version)
            .on_upgrade(Box::new(move |change: &mut dyn VersionChange| {
                match change.delete_object_store(&dropped) {
                    Err(err) if err.kind() == EngineErrorKind::NotFound => Ok(()),
                    other => other,
                }
            }));

        match self.manager.engine().open(request).await {
            Ok(db) => {
                db.close();
                ctx.fan_out(Some(db));
                debug!(database = name, store = %store_name, "store dropped");
                ctx.advance_readiness();
                Ok(())
            }
            Err(err) => {
                let err = ForageError::from(err);
                ctx.reject_readiness(err.clone());
                Err(err)
            }
        }
    }
}

async fn probe_blob_support(db: &dyn Connection) -> bool {
    let Ok(mut tx) = db.transaction(DETECT_BLOB_SUPPORT_STORE, TransactionMode::ReadWrite) else {
        return false;
    };
    let blob = Value::Blob(Blob::new(Vec::new(), ""));
    if tx.put("key", blob).await.is_err() {
        return false;
    }
    tx.commit().await.is_ok()
}

fn decode(value: Value) -> ForageResult<Value> {
    Ok(unwrap_encoded(value)?)
}

#[async_trait]
impl Driver for AsyncStorage {
    fn name(&self) -> &str {
        ASYNC_STORAGE
    }

    fn supported(&self) -> bool {
        true
    }

    async fn init_storage(&self, config: &ForageConfig) -> ForageResult<()> {
        let ctx = self.manager.registry().get_or_create(&config.name);
        *self.state.db_info.lock() =
            DbInfo::new(config.name.clone(), config.store_name.clone(), config.version);
        ctx.register_instance(&self.state);

        // Wait for sibling instances that are still initialising, then work
        // on a snapshot of the instances registered so far.
        let forages = ctx.sharing_instances();
        let pending: Vec<_> = forages
            .iter()
            .filter(|f| !Arc::ptr_eq(*f, &self.state))
            .filter_map(|f| f.init_future())
            .collect();

        let manager = self.manager.clone();
        let state = Arc::clone(&self.state);
        let init = async move {
            join_all(pending).await;

            state.db_info.lock().db = ctx.connection();
            let db = manager.get_connection(&state.db_info, false).await?;
            let upgrade = {
                let mut info = state.db_info.lock();
                info.db = Some(Arc::clone(&db));
                is_upgrade_needed(&mut info, Some(DEFAULT_VERSION))?
            };
            let db = if upgrade {
                manager.get_connection(&state.db_info, true).await?
            } else {
                db
            };

            let version = {
                let mut info = state.db_info.lock();
                info.db = Some(Arc::clone(&db));
                info.version
            };
            ctx.set_connection(Some(Arc::clone(&db)));
            for forage in forages.iter().filter(|f| !Arc::ptr_eq(*f, &state)) {
                let mut info = forage.db_info.lock();
                info.db = Some(Arc::clone(&db));
                info.version = version;
            }
            debug!(database = ctx.name(), version, "storage initialised");
            Ok::<(), ForageError>(())
        }
        .boxed()
        .shared();

        *self.state.init.lock() = Some(init.clone());
        init.await
    }

    async fn ready(&self) -> ForageResult<()> {
        let init = self
            .state
            .init_future()
            .ok_or(ForageError::NotInitialized)?;
        init.await?;
        let readiness = self.context().readiness();
        if let Some(readiness) = readiness {
            readiness.await?;
        }
        Ok(())
    }

    async fn get_item(&self, key: &str) -> ForageResult<Option<Value>> {
        self.ready().await?;
        let mut tx = self.read().await?;
        match tx.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => decode(value).map(Some),
        }
    }

    async fn set_item(&self, key: &str, value: Value) -> ForageResult<Value> {
        self.ready().await?;
        let stored = self.prepare_value(&value).await;
        let mut tx = self.write().await?;
        tx.put(key, stored).await?;
        tx.commit().await?;
        Ok(value)
    }

    async fn remove_item(&self, key: &str) -> ForageResult<()> {
        self.ready().await?;
        let mut tx = self.write().await?;
        tx.delete(key).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> ForageResult<()> {
        self.ready().await?;
        let mut tx = self.write().await?;
        tx.clear().await?;
        tx.commit().await?;
        Ok(())
    }

    async fn length(&self) -> ForageResult<u64> {
        self.ready().await?;
        let mut tx = self.read().await?;
        Ok(tx.count().await?)
    }

    async fn key(&self, index: usize) -> ForageResult<Option<String>> {
        let Ok(steps) = u32::try_from(index.saturating_add(1)) else {
            return Ok(None);
        };
        self.ready().await?;
        let mut tx = self.read().await?;
        let mut cursor = tx.open_cursor(CursorKind::Keys).await?;
        Ok(cursor.advance(steps).await?.map(|record| record.key))
    }

    async fn keys(&self) -> ForageResult<Vec<String>> {
        self.ready().await?;
        let mut tx = self.read().await?;
        let mut cursor = tx.open_cursor(CursorKind::Keys).await?;
        let mut keys = Vec::new();
        while let Some(record) = cursor.next().await? {
            keys.push(record.key);
        }
        Ok(keys)
    }

    async fn iterate(
        &self,
        iteratee: &mut (dyn for<'k> FnMut(Value, &'k str, u32) -> ControlFlow<()> + Send),
    ) -> ForageResult<()> {
        self.ready().await?;
        let mut tx = self.read().await?;
        let mut cursor = tx.open_cursor(CursorKind::Values).await?;
        let mut sequence = 1;
        while let Some(record) = cursor.next().await? {
            let value = decode(record.value.unwrap_or_default())?;
            if iteratee(value, &record.key, sequence).is_break() {
                break;
            }
            sequence += 1;
        }
        Ok(())
    }

    async fn drop_instance(&self, options: DropOptions) -> ForageResult<()> {
        let name = match options.name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(ForageError::invalid_arguments("database name is required")),
        };

        let (current_name, current_db) = {
            let info = self.state.db_info.lock();
            (info.name.clone(), info.db.clone())
        };
        let db = match current_db {
            Some(db) if current_name == name => db,
            _ => {
                let target = parking_lot::Mutex::new(DbInfo::new(
                    name.clone(),
                    options.store_name.clone().unwrap_or_default(),
                    0,
                ));
                let db = self.manager.get_connection(&target, false).await?;
                self.manager
                    .registry()
                    .get_or_create(&name)
                    .fan_out(Some(Arc::clone(&db)));
                db
            }
        };

        match options.store_name {
            None => self.drop_database(&name, db).await,
            Some(store_name) => self.drop_store(&name, store_name, db).await,
        }
    }
}
