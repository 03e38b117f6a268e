//! OAuth installation persistence.
//!
//! An [`Installation`] is everything the OAuth exchange returned for one
//! workspace install: bot credentials, the installing user's credentials and
//! incoming-webhook details. Bot credentials are also saved on their own as a
//! [`Bot`] so they can be looked up without knowing a user.
//!
//! # Usage
//!
//! ```no_run
//! use blobauth::installation::{BlobInstallationStore, Installation, InstallationStore};
//! use blobauth::object_store::FsObjectStore;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let objects = Arc::new(FsObjectStore::new("/var/lib/blobauth", "oauth-installations")?);
//! let store = BlobInstallationStore::new(objects, "my-app");
//!
//! let installation = Installation {
//!     team_id: Some("T111".to_string()),
//!     user_id: Some("U111".to_string()),
//!     bot_token: Some("xoxb-111".to_string()),
//!     installed_at: 1_700_000_000.0,
//!     ..Default::default()
//! };
//! store.save(&installation)?;
//!
//! let found = store.find_installation(None, Some("T111"), Some("U111"), false);
//! assert!(found.is_some());
//! # Ok(())
//! # }
//! ```

use crate::object_store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod keys;
mod store;


pub use keys::{RecordKey, RecordKind, TenantKey, Version};
pub use store::BlobInstallationStore;

/// Credentials and metadata from one completed OAuth installation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub app_id: Option<String>,
    pub enterprise_id: Option<String>,
    pub enterprise_name: Option<String>,
    pub enterprise_url: Option<String>,
    pub team_id: Option<String>,
    pub team_name: Option<String>,

    pub bot_token: Option<String>,
    pub bot_id: Option<String>,
    pub bot_user_id: Option<String>,
    #[serde(default)]
    pub bot_scopes: Vec<String>,
    pub bot_refresh_token: Option<String>,
    /// Epoch seconds
    pub bot_token_expires_at: Option<i64>,

    pub user_id: Option<String>,
    pub user_token: Option<String>,
    #[serde(default)]
    pub user_scopes: Vec<String>,
    pub user_refresh_token: Option<String>,
    /// Epoch seconds
    pub user_token_expires_at: Option<i64>,

    pub incoming_webhook_url: Option<String>,
    pub incoming_webhook_channel: Option<String>,
    pub incoming_webhook_channel_id: Option<String>,
    pub incoming_webhook_configuration_url: Option<String>,

    #[serde(default)]
    pub is_enterprise_install: bool,
    pub token_type: Option<String>,

    /// Epoch seconds; doubles as the history version of saved records.
    pub installed_at: f64,
}

impl Installation {
    /// Bot-only view of this installation.
    pub fn to_bot(&self) -> Bot {
        Bot {
            app_id: self.app_id.clone(),
            enterprise_id: self.enterprise_id.clone(),
            enterprise_name: self.enterprise_name.clone(),
            team_id: self.team_id.clone(),
            team_name: self.team_name.clone(),
            bot_token: self.bot_token.clone(),
            bot_id: self.bot_id.clone(),
            bot_user_id: self.bot_user_id.clone(),
            bot_scopes: self.bot_scopes.clone(),
            bot_refresh_token: self.bot_refresh_token.clone(),
            bot_token_expires_at: self.bot_token_expires_at,
            is_enterprise_install: self.is_enterprise_install,
            installed_at: self.installed_at,
        }
    }

    /// Replaces every bot credential field with the ones from `latest`.
    pub(crate) fn adopt_bot_credentials(&mut self, latest: &Installation) {
        self.bot_id = latest.bot_id.clone();
        self.bot_user_id = latest.bot_user_id.clone();
        self.bot_token = latest.bot_token.clone();
        self.bot_scopes = latest.bot_scopes.clone();
        self.bot_refresh_token = latest.bot_refresh_token.clone();
        self.bot_token_expires_at = latest.bot_token_expires_at;
    }
}

/// Bot credentials of an installation, stored separately from user data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub app_id: Option<String>,
    pub enterprise_id: Option<String>,
    pub enterprise_name: Option<String>,
    pub team_id: Option<String>,
    pub team_name: Option<String>,
    pub bot_token: Option<String>,
    pub bot_id: Option<String>,
    pub bot_user_id: Option<String>,
    #[serde(default)]
    pub bot_scopes: Vec<String>,
    pub bot_refresh_token: Option<String>,
    pub bot_token_expires_at: Option<i64>,
    #[serde(default)]
    pub is_enterprise_install: bool,
    pub installed_at: f64,
}

/// Errors raised by installation store writes and deletes.
///
/// Lookups never fail; they log and return `None` instead.
#[derive(Debug, thiserror::Error)]
pub enum InstallationStoreError {
    #[error("failed to serialize {kind} record: {source}")]
    Serialization {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// `installed_at` cannot name a history version (negative, NaN or infinite).
    #[error("invalid installed_at {installed_at} on {kind} record")]
    InvalidTimestamp { kind: &'static str, installed_at: f64 },

    /// The object store rejected a write, list or delete.
    #[error("{message}: {source}")]
    Configuration {
        message: String,
        #[source]
        source: StoreError,
    },
}

pub type Result<T> = std::result::Result<T, InstallationStoreError>;

/// Persistence of installations and their bot credentials.
pub trait InstallationStore: Send + Sync {
    /// Saves the installation and its bot record.
    fn save(&self, installation: &Installation) -> Result<()>;

    /// Saves a bot record on its own.
    fn save_bot(&self, bot: &Bot) -> Result<()>;

    /// Latest bot record of a tenant.
    fn find_bot(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        is_enterprise_install: bool,
    ) -> Option<Bot>;

    /// Latest installation of a tenant, or of one user within it.
    fn find_installation(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        user_id: Option<&str>,
        is_enterprise_install: bool,
    ) -> Option<Installation>;

    /// Removes every bot record of a tenant, history included.
    fn delete_bot(&self, enterprise_id: Option<&str>, team_id: Option<&str>) -> Result<()>;

    /// Removes installation records of a user, or of the whole tenant when
    /// `user_id` is `None`.
    fn delete_installation(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<()>;
}

/// Async form of [`InstallationStore`].
///
/// Every [`InstallationStore`] gets this for free; the calls run inline with
/// no suspension point, so semantics are identical to the blocking form.
#[async_trait]
pub trait AsyncInstallationStore: Send + Sync {
    async fn save(&self, installation: &Installation) -> Result<()>;

    async fn save_bot(&self, bot: &Bot) -> Result<()>;

    async fn find_bot(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        is_enterprise_install: bool,
    ) -> Option<Bot>;

    async fn find_installation(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        user_id: Option<&str>,
        is_enterprise_install: bool,
    ) -> Option<Installation>;

    async fn delete_bot(&self, enterprise_id: Option<&str>, team_id: Option<&str>) -> Result<()>;

    async fn delete_installation(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<()>;
}

#[async_trait]
impl<T: InstallationStore> AsyncInstallationStore for T {
    async fn save(&self, installation: &Installation) -> Result<()> {
        InstallationStore::save(self, installation)
    }

    async fn save_bot(&self, bot: &Bot) -> Result<()> {
        InstallationStore::save_bot(self, bot)
    }

    async fn find_bot(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        is_enterprise_install: bool,
    ) -> Option<Bot> {
        InstallationStore::find_bot(self, enterprise_id, team_id, is_enterprise_install)
    }

    async fn find_installation(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        user_id: Option<&str>,
        is_enterprise_install: bool,
    ) -> Option<Installation> {
        InstallationStore::find_installation(self, enterprise_id, team_id, user_id, is_enterprise_install)
    }

    async fn delete_bot(&self, enterprise_id: Option<&str>, team_id: Option<&str>) -> Result<()> {
        InstallationStore::delete_bot(self, enterprise_id, team_id)
    }

    async fn delete_installation(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<()> {
        InstallationStore::delete_installation(self, enterprise_id, team_id, user_id)
    }
}
