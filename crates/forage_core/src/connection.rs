//! Connection manager.
//!
//! Obtains a live, correctly versioned connection for an instance's
//! database, opening, upgrading or reopening it as needed, and creates
//! transactions with a bounded reconnect-and-retry policy.

use crate::config::DEFAULT_TRANSACTION_RETRIES;
use crate::error::{ForageError, ForageResult};
use crate::registry::{ContextRegistry, DbInfo};
use forage_engine::{
    Connection, Engine, EngineError, EngineErrorKind, OpenRequest, Transaction, TransactionMode,
    UpgradeFn, VersionChange,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Store created next to the data store, used to probe blob support.
pub const DETECT_BLOB_SUPPORT_STORE: &str = "local-forage-detect-blob-support";

/// Opens, upgrades and recovers shared connections.
#[derive(Clone)]
pub struct ConnectionManager {
    engine: Arc<dyn Engine>,
    registry: Arc<ContextRegistry>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager over `engine`, sharing contexts through `registry`.
    pub fn new(engine: Arc<dyn Engine>, registry: Arc<ContextRegistry>) -> Self {
        Self { engine, registry }
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Returns a connection for `info`.
    ///
    /// An existing handle is reused unless an upgrade is needed. For an
    /// upgrade the existing handle is closed behind a readiness gate and the
    /// database is reopened at `info.version`, creating the instance's
    /// store. The gate is settled with the outcome.
    pub(crate) async fn get_connection(
        &self,
        info: &Mutex<DbInfo>,
        upgrade_needed: bool,
    ) -> ForageResult<Arc<dyn Connection>> {
        let DbInfo {
            name,
            store_name,
            version,
            db,
        } = info.lock().clone();
        let ctx = self.registry.get_or_create(&name);

        let mut deferred = false;
        if let Some(db) = db {
            if !upgrade_needed {
                return Ok(db);
            }
            ctx.defer_readiness();
            deferred = true;
            db.close();
        }

        let mut request = OpenRequest::new(name.clone());
        if upgrade_needed {
            request = request
                .with_version(version)
                .on_upgrade(create_stores(name.clone(), store_name));
        }

        match self.engine.open(request).await {
            Ok(db) => {
                db.on_version_change(Box::new(|conn: &dyn Connection| conn.close()));
                debug!(
                    database = %name,
                    version = db.version(),
                    upgraded = upgrade_needed,
                    "connection opened"
                );
                if deferred {
                    ctx.advance_readiness();
                }
                Ok(db)
            }
            Err(err) => {
                let err = ForageError::from(err);
                if deferred {
                    ctx.reject_readiness(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Replaces a broken connection with a fresh one for every instance
    /// sharing the database.
    ///
    /// # Errors
    ///
    /// Returns the open or upgrade error; the readiness gate is rejected
    /// with the same error.
    pub(crate) async fn try_reconnect(&self, info: &Mutex<DbInfo>) -> ForageResult<()> {
        let name = info.lock().name.clone();
        let ctx = self.registry.get_or_create(&name);
        ctx.defer_readiness();

        for forage in ctx.sharing_instances() {
            forage.close_connection();
        }
        let stale = info.lock().db.take();
        if let Some(db) = stale {
            db.close();
        }

        match self.reopen(info).await {
            Ok(db) => {
                info.lock().db = Some(Arc::clone(&db));
                ctx.fan_out(Some(db));
                debug!(database = %name, "reconnected");
                ctx.advance_readiness();
                Ok(())
            }
            Err(err) => {
                ctx.reject_readiness(err.clone());
                Err(err)
            }
        }
    }

    async fn reopen(&self, info: &Mutex<DbInfo>) -> ForageResult<Arc<dyn Connection>> {
        let db = self.get_connection(info, false).await?;
        let upgrade = {
            let mut info = info.lock();
            info.db = Some(Arc::clone(&db));
            is_upgrade_needed(&mut info, None)?
        };
        if upgrade {
            return self.get_connection(info, true).await;
        }
        Ok(db)
    }

    /// Starts a transaction on the instance's store, reconnecting once
    /// when the handle is missing, closed or does not know the store.
    ///
    /// # Errors
    ///
    /// Returns the last transaction error once retries are exhausted, or
    /// any error raised while reconnecting.
    pub(crate) async fn create_transaction(
        &self,
        info: &Mutex<DbInfo>,
        mode: TransactionMode,
    ) -> ForageResult<Box<dyn Transaction>> {
        let mut retries = DEFAULT_TRANSACTION_RETRIES;
        loop {
            let (db, store_name) = {
                let info = info.lock();
                (info.db.clone(), info.store_name.clone())
            };
            let err = match &db {
                Some(db) => match db.transaction(&store_name, mode) {
                    Ok(tx) => return Ok(tx),
                    Err(err) => err,
                },
                None => EngineError::invalid_state("no open connection"),
            };

            if retries == 0 || !err.is_invalidation() {
                return Err(err.into());
            }
            retries -= 1;
            warn!(
                store = %store_name,
                error = %err,
                "transaction failed on a stale connection, reconnecting"
            );

            let upgrade = {
                let mut info = info.lock();
                match info.db.clone() {
                    None => true,
                    Some(db)
                        if err.kind() == EngineErrorKind::NotFound
                            && !db.contains_store(&info.store_name)
                            && info.version <= db.version() =>
                    {
                        info.version = next_version(&info.name, db.version())?;
                        true
                    }
                    Some(_) => false,
                }
            };
            if upgrade {
                let db = self.get_connection(info, true).await?;
                info.lock().db = Some(db);
            }
            self.try_reconnect(info).await?;
        }
    }
}

/// Decides whether `info` needs a version change and adjusts its target
/// version.
///
/// A missing handle always needs one. A missing store bumps the version
/// past the handle's. A request below the handle's version is raised to it,
/// warning unless the request was `default_version`.
///
/// # Errors
///
/// Returns `Version` if the bumped version would not fit in a `u32`.
pub(crate) fn is_upgrade_needed(
    info: &mut DbInfo,
    default_version: Option<u32>,
) -> ForageResult<bool> {
    let Some(db) = info.db.as_ref() else {
        return Ok(true);
    };

    let current = db.version();
    let is_new_store = !db.contains_store(&info.store_name);
    let is_upgrade = info.version > current;

    if info.version < current {
        if Some(info.version) != default_version {
            warn!(
                database = %info.name,
                from = current,
                to = info.version,
                "database can't be downgraded"
            );
        }
        info.version = current;
    }

    if is_new_store && info.version <= current {
        info.version = next_version(&info.name, current)?;
    }

    Ok(is_upgrade || is_new_store)
}

/// Version one above `current`.
pub(crate) fn next_version(name: &str, current: u32) -> ForageResult<u32> {
    current.checked_add(1).ok_or_else(|| {
        EngineError::version(format!("database {name} is already at the highest version")).into()
    })
}

fn create_stores(name: String, store_name: String) -> UpgradeFn {
    Box::new(move |change: &mut dyn VersionChange| {
        let created = change.create_object_store(&store_name).and_then(|()| {
            if change.old_version() <= 1 && !change.contains_store(DETECT_BLOB_SUPPORT_STORE) {
                change.create_object_store(DETECT_BLOB_SUPPORT_STORE)
            } else {
                Ok(())
            }
        });
        match created {
            Err(err) if err.kind() == EngineErrorKind::Constraint => {
                warn!(
                    database = %name,
                    from = change.old_version(),
                    to = change.new_version(),
                    store = %store_name,
                    "database upgraded but the store already exists"
                );
                Ok(())
            }
            other => other,
        }
    })
}
