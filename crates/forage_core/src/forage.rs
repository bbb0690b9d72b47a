//! Forage instance front-end.

use crate::async_storage::AsyncStorage;
use crate::config::{DropOptions, ForageConfig};
use crate::driver::Driver;
use crate::error::{ForageError, ForageResult};
use crate::readiness::ReadyFuture;
use crate::registry::ContextRegistry;
use forage_codec::Value;
use forage_engine::Engine;
use futures::future::FutureExt;
use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::Arc;

/// An asynchronous key-value store.
///
/// A `Forage` owns a configuration and a driver. The driver is initialised
/// lazily by the first operation (or an explicit [`Forage::ready`]); after
/// that the configuration is locked.
///
/// # Example
///
/// ```rust
/// use forage_core::{ContextRegistry, Forage, ForageConfig};
/// use forage_engine::MemoryEngine;
/// use std::sync::Arc;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let engine = Arc::new(MemoryEngine::new());
/// let registry = Arc::new(ContextRegistry::new());
/// let forage = Forage::async_storage(engine, registry, ForageConfig::new("app"));
///
/// forage.set_item("greeting", "hello").await.unwrap();
/// let value = forage.get_item("greeting").await.unwrap();
/// assert_eq!(value.as_ref().and_then(|v| v.as_str()), Some("hello"));
/// # });
/// ```
pub struct Forage {
    config: Mutex<ForageConfig>,
    driver: Arc<dyn Driver>,
    ready: Mutex<Option<ReadyFuture>>,
}

impl std::fmt::Debug for Forage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forage")
            .field("config", &*self.config.lock())
            .field("driver", &self.driver.name())
            .field("initialised", &self.ready.lock().is_some())
            .finish()
    }
}

impl Forage {
    /// Creates an instance backed by `driver`.
    pub fn new(driver: Arc<dyn Driver>, config: ForageConfig) -> Self {
        Self {
            config: Mutex::new(config),
            driver,
            ready: Mutex::new(None),
        }
    }

    /// Creates an instance backed by the object-store driver.
    pub fn async_storage(
        engine: Arc<dyn Engine>,
        registry: Arc<ContextRegistry>,
        config: ForageConfig,
    ) -> Self {
        Self::new(Arc::new(AsyncStorage::new(engine, registry)), config)
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> ForageConfig {
        self.config.lock().clone()
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLocked` once the instance has been used, or
    /// `InvalidConfig` if the configuration is rejected.
    pub fn configure(&self, config: ForageConfig) -> ForageResult<()> {
        if self.ready.lock().is_some() {
            return Err(ForageError::ConfigLocked);
        }
        *self.config.lock() = config.validate()?;
        Ok(())
    }

    /// Name of the driver in use.
    #[must_use]
    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// Initialises the driver once and waits until no connection change is
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns `NoAvailableDriver` if the driver is unsupported, or the
    /// initialisation error. Failed initialisation is not retried.
    pub async fn ready(&self) -> ForageResult<()> {
        let init = {
            let mut ready = self.ready.lock();
            ready
                .get_or_insert_with(|| {
                    let driver = Arc::clone(&self.driver);
                    let config = self.config();
                    async move {
                        if !driver.supported() {
                            return Err(ForageError::NoAvailableDriver);
                        }
                        let config = config.validate()?;
                        driver.init_storage(&config).await
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };
        init.await?;
        self.driver.ready().await
    }

    /// Reads a value. Missing keys and stored nulls read as `None`.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the read fails after one reconnect.
    pub async fn get_item(&self, key: &str) -> ForageResult<Option<Value>> {
        self.ready().await?;
        self.driver.get_item(key).await
    }

    /// Writes a value and returns it.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the write does not commit, for example
    /// `QuotaExceeded`.
    pub async fn set_item(&self, key: &str, value: impl Into<Value>) -> ForageResult<Value> {
        let value = value.into();
        self.ready().await?;
        self.driver.set_item(key, value).await
    }

    /// Removes a key.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the delete does not commit.
    pub async fn remove_item(&self, key: &str) -> ForageResult<()> {
        self.ready().await?;
        self.driver.remove_item(key).await
    }

    /// Removes every key in this instance's store.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the clear does not commit.
    pub async fn clear(&self) -> ForageResult<()> {
        self.ready().await?;
        self.driver.clear().await
    }

    /// Counts the keys in this instance's store.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the count fails.
    pub async fn length(&self) -> ForageResult<u64> {
        self.ready().await?;
        self.driver.length().await
    }

    /// Returns the key at `index` in ascending order.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the cursor fails.
    pub async fn key(&self, index: usize) -> ForageResult<Option<String>> {
        self.ready().await?;
        self.driver.key(index).await
    }

    /// Returns every key in ascending order.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the cursor fails.
    pub async fn keys(&self) -> ForageResult<Vec<String>> {
        self.ready().await?;
        self.driver.keys().await
    }

    /// Calls `iteratee` with each value, key and 1-based sequence number in
    /// ascending key order. The first `Some` stops iteration and is returned.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the cursor fails.
    pub async fn iterate<T, F>(&self, mut iteratee: F) -> ForageResult<Option<T>>
    where
        T: Send,
        F: FnMut(Value, &str, u32) -> Option<T> + Send,
    {
        self.ready().await?;
        let mut result = None;
        self.driver
            .iterate(&mut |value, key, sequence| match iteratee(value, key, sequence) {
                Some(found) => {
                    result = Some(found);
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            })
            .await?;
        Ok(result)
    }

    /// Drops a store or a database.
    ///
    /// Without a name the instance's own database is targeted, with the
    /// given store or the instance's store. With a name and no store the
    /// whole database is dropped. Dropping something that does not exist
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` for an empty name, or the engine error.
    pub async fn drop_instance(&self, options: DropOptions) -> ForageResult<()> {
        let options = options.resolve(&self.config().validate()?)?;
        self.ready().await?;
        self.driver.drop_instance(options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forage_engine::MemoryEngine;

    fn forage(config: ForageConfig) -> Forage {
        Forage::async_storage(
            Arc::new(MemoryEngine::new()),
            Arc::new(ContextRegistry::new()),
            config,
        )
    }

    #[test]
    fn driver_name_is_async_storage() {
        assert_eq!(forage(ForageConfig::default()).driver_name(), "asyncStorage");
    }

    #[tokio::test]
    async fn configure_before_use() {
        let forage = forage(ForageConfig::default());
        forage
            .configure(ForageConfig::new("app").with_store_name("a b"))
            .unwrap();
        assert_eq!(forage.config().store_name, "a_b");

        forage.ready().await.unwrap();
        assert_eq!(
            forage.configure(ForageConfig::new("other")),
            Err(ForageError::ConfigLocked)
        );
    }

    #[tokio::test]
    async fn invalid_config_fails_ready() {
        let forage = forage(ForageConfig::new("app").with_version(0));
        assert!(matches!(
            forage.ready().await,
            Err(ForageError::InvalidConfig { .. })
        ));
        assert!(forage.get_item("k").await.is_err());
    }

    #[tokio::test]
    async fn iterate_without_match_returns_none() {
        let forage = forage(ForageConfig::new("app"));
        forage.set_item("a", 1).await.unwrap();
        let found: Option<()> = forage.iterate(|_, _, _| None).await.unwrap();
        assert_eq!(found, None);
    }
}
