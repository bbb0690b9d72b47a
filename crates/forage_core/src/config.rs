//! Instance configuration.

use crate::error::{ForageError, ForageResult};

/// Database name used when none is configured.
pub const DEFAULT_NAME: &str = "localforage";

/// Store name used when none is configured.
pub const DEFAULT_STORE_NAME: &str = "keyvaluepairs";

/// Schema version used when none is configured.
pub const DEFAULT_VERSION: u32 = 1;

/// Advisory size in bytes.
pub const DEFAULT_SIZE: u64 = 4_980_736;

/// How many times a failed transaction is retried after reconnecting.
pub const DEFAULT_TRANSACTION_RETRIES: u32 = 1;

/// Configuration for a forage instance.
///
/// Instances with the same `name` share one database connection; each
/// instance reads and writes its own `store_name` inside that database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForageConfig {
    /// Database name.
    pub name: String,

    /// Object store name.
    pub store_name: String,

    /// Requested schema version. Never downgrades an existing database.
    pub version: u32,

    /// Advisory size in bytes; ignored by engines without size hints.
    pub size: u64,

    /// Free-form description.
    pub description: String,
}

impl Default for ForageConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            version: DEFAULT_VERSION,
            size: DEFAULT_SIZE,
            description: String::new(),
        }
    }
}

impl ForageConfig {
    /// Creates a configuration for the named database with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the object store name.
    #[must_use]
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the advisory size.
    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Checks the configuration and returns it with the store name
    /// sanitised: every character other than ASCII letters, digits and `_`
    /// becomes `_`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the name or store name is empty or the
    /// version is zero.
    pub fn validate(mut self) -> ForageResult<Self> {
        if self.name.is_empty() {
            return Err(ForageError::invalid_config("name must not be empty"));
        }
        if self.store_name.is_empty() {
            return Err(ForageError::invalid_config("store name must not be empty"));
        }
        if self.version == 0 {
            return Err(ForageError::invalid_config("version must be positive"));
        }
        self.store_name = sanitize_store_name(&self.store_name);
        Ok(self)
    }
}

fn sanitize_store_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Target of [`crate::Forage::drop_instance`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropOptions {
    /// Database to drop from. Defaults to the instance's database.
    pub name: Option<String>,

    /// Store to drop. With an explicit `name` and no store, the whole
    /// database is dropped.
    pub store_name: Option<String>,
}

impl DropOptions {
    /// Targets the instance's own database and store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets a whole database.
    #[must_use]
    pub fn database(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            store_name: None,
        }
    }

    /// Targets one store of a database.
    #[must_use]
    pub fn store(name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            store_name: Some(store_name.into()),
        }
    }

    /// Fills in the instance's own name and store when no name is given.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` if the resolved name is empty.
    pub fn resolve(self, current: &ForageConfig) -> ForageResult<Self> {
        let resolved = match self.name {
            Some(name) => Self {
                name: Some(name),
                store_name: self.store_name,
            },
            None => Self {
                name: Some(current.name.clone()),
                store_name: Some(
                    self.store_name
                        .unwrap_or_else(|| current.store_name.clone()),
                ),
            },
        };
        match resolved.name.as_deref() {
            Some(name) if !name.is_empty() => Ok(resolved),
            _ => Err(ForageError::invalid_arguments("database name is required")),
        }
    }
}
