use crate::object_store::{FsObjectStore, MemoryObjectStore, ObjectStore, SqliteObjectStore};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Complete blobauth configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlobAuthConfig {
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub installation_store: InstallationStoreConfig,
    #[serde(default)]
    pub state_store: StateStoreConfig,
}

/// Which backend holds the containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Filesystem,
    Sqlite,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    /// Base directory (filesystem) or database file (sqlite)
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Gzip payloads (filesystem only)
    #[serde(default)]
    pub compress: bool,
}

fn default_backend() -> Backend {
    Backend::Filesystem
}

fn default_path() -> PathBuf {
    PathBuf::from("/var/lib/blobauth")
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_path(),
            compress: false,
        }
    }
}

impl ObjectStoreConfig {
    /// Opens the configured backend scoped to `container`.
    pub fn open(&self, container: &str) -> Result<Arc<dyn ObjectStore>> {
        let store: Arc<dyn ObjectStore> = match self.backend {
            Backend::Memory => Arc::new(MemoryObjectStore::new()),
            Backend::Filesystem => Arc::new(
                FsObjectStore::new(&self.path, container)
                    .with_context(|| format!("Invalid container name '{}'", container))?
                    .with_compression(self.compress),
            ),
            Backend::Sqlite => Arc::new(
                SqliteObjectStore::open(&self.path, container).with_context(|| {
                    format!("Failed to open SQLite object store at {}", self.path.display())
                })?,
            ),
        };
        Ok(store)
    }
}

/// Installation store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationStoreConfig {
    #[serde(default = "default_installation_container")]
    pub container: String,
    /// Prefix of every key; usually the OAuth client id
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_historical_data_enabled")]
    pub historical_data_enabled: bool,
}

fn default_installation_container() -> String {
    "oauth-installations".to_string()
}

fn default_historical_data_enabled() -> bool {
    true
}

impl Default for InstallationStoreConfig {
    fn default() -> Self {
        Self {
            container: default_installation_container(),
            client_id: String::new(),
            historical_data_enabled: default_historical_data_enabled(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StateStoreConfig {
    #[serde(default = "default_state_container")]
    pub container: String,
    /// How long an issued state stays valid
    #[serde(default = "default_expiration_seconds")]
    pub expiration_seconds: u64,
    /// How often expired states are purged
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_state_container() -> String {
    "oauth-states".to_string()
}

fn default_expiration_seconds() -> u64 {
    600
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            container: default_state_container(),
            expiration_seconds: default_expiration_seconds(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl BlobAuthConfig {
    /// Rejects settings the stores cannot run with.
    ///
    /// The state sweep deletes objects from its container, so it must not
    /// share one with installations.
    pub fn validate(&self) -> Result<()> {
        if self.installation_store.container == self.state_store.container {
            bail!(
                "installation_store and state_store must use different containers (both are '{}')",
                self.state_store.container
            );
        }
        Ok(())
    }

    /// Applies `BLOBAUTH_*` environment overrides. Unparsable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("BLOBAUTH_CLIENT_ID") {
            self.installation_store.client_id = v;
        }
        if let Some(v) = var("BLOBAUTH_HISTORICAL_DATA_ENABLED") {
            if let Ok(b) = v.parse::<bool>() {
                self.installation_store.historical_data_enabled = b;
            }
        }
        if let Some(v) = var("BLOBAUTH_STATE_EXPIRATION_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.state_store.expiration_seconds = n;
            }
        }
        if let Some(v) = var("BLOBAUTH_OBJECT_STORE_PATH") {
            self.object_store.path = PathBuf::from(v);
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BlobAuthConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path))?;
    let config: BlobAuthConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}
