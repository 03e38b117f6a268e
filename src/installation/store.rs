//! Installation store on top of an [`ObjectStore`].

use super::keys::{RecordKey, RecordKind, TenantKey, Version, NONE};
use super::{Bot, Installation, InstallationStore, InstallationStoreError, Result};
use crate::object_store::{ObjectStore, StoreError};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Span};

/// Installation store writing JSON records into a blob container.
///
/// Saves write a `-latest` record per scope and, with historical data
/// enabled (the default), an immutable copy named after `installed_at`.
/// Writes are independent uploads: a failure part-way through leaves some
/// keys updated, and saving again repairs them.
pub struct BlobInstallationStore {
    objects: Arc<dyn ObjectStore>,
    client_id: String,
    historical_data_enabled: bool,
    span: Span,
}

impl BlobInstallationStore {
    /// Creates a store keeping records under `client_id/` in `objects`.
    pub fn new(objects: Arc<dyn ObjectStore>, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let span = info_span!("installation_store", client_id = %client_id);
        Self {
            objects,
            client_id,
            historical_data_enabled: true,
            span,
        }
    }

    /// Keep (`true`) or skip (`false`) versioned history records.
    pub fn with_historical_data(mut self, enabled: bool) -> Self {
        self.historical_data_enabled = enabled;
        self
    }

    /// Span every log event of this store is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn historical_data_enabled(&self) -> bool {
        self.historical_data_enabled
    }

    fn upload_all(&self, tenant: &TenantKey, records: &[RecordKey], entity: &[u8], what: &str) -> Result<()> {
        for record in records {
            let key = tenant.object_key(&self.client_id, record);
            self.objects
                .upload(&key, entity)
                .map_err(|source| InstallationStoreError::Configuration {
                    message: format!(
                        "Failed to save {} data for enterprise: {}, team: {}",
                        what,
                        tenant.enterprise(),
                        tenant.team()
                    ),
                    source,
                })?;
            debug!(parent: &self.span, key = %key, "Uploaded record");
        }
        Ok(())
    }

    /// Downloads and decodes one record. Every failure is logged and mapped to `None`.
    fn read_record<T: DeserializeOwned>(&self, tenant: &TenantKey, record: &RecordKey) -> Option<T> {
        let key = tenant.object_key(&self.client_id, record);

        let bytes = match self.objects.download(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!(
                    parent: &self.span,
                    key = %key,
                    enterprise = tenant.enterprise(),
                    team = tenant.team(),
                    "Record not found"
                );
                return None;
            }
            Err(e) => {
                warn!(
                    parent: &self.span,
                    key = %key,
                    enterprise = tenant.enterprise(),
                    team = tenant.team(),
                    error = %e,
                    "Failed to download record"
                );
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    parent: &self.span,
                    key = %key,
                    enterprise = tenant.enterprise(),
                    team = tenant.team(),
                    error = %e,
                    "Malformed record"
                );
                None
            }
        }
    }

    /// Lists and parses the tenant's records whose names start with `name_prefix`.
    ///
    /// The listing is fully drained before returning so callers can delete freely.
    fn list_records(&self, tenant: &TenantKey, name_prefix: &str) -> Result<Vec<(String, RecordKey)>> {
        let to_config_error = |source: StoreError| InstallationStoreError::Configuration {
            message: format!(
                "Failed to list records for enterprise: {}, team: {}",
                tenant.enterprise(),
                tenant.team()
            ),
            source,
        };

        let prefix = tenant.prefix(&self.client_id, name_prefix);
        let mut records = Vec::new();
        for key in self.objects.list(&prefix).map_err(to_config_error)? {
            let key = key.map_err(to_config_error)?;
            match tenant.parse_object_key(&self.client_id, &key) {
                Some(record) => records.push((key, record)),
                None => debug!(parent: &self.span, key = %key, "Skipping object with unknown key layout"),
            }
        }
        Ok(records)
    }

    fn delete_object(&self, tenant: &TenantKey, key: &str, what: &str) -> Result<()> {
        info!(parent: &self.span, key = %key, "Going to delete {}", what);
        self.objects
            .delete(key)
            .map_err(|source| InstallationStoreError::Configuration {
                message: format!(
                    "Failed to delete {} data for enterprise: {}, team: {}",
                    what,
                    tenant.enterprise(),
                    tenant.team()
                ),
                source,
            })
    }
}

impl InstallationStore for BlobInstallationStore {
    fn save(&self, installation: &Installation) -> Result<()> {
        check_installed_at("installation", installation.installed_at)?;
        self.save_bot(&installation.to_bot())?;

        let tenant = TenantKey::new(
            installation.enterprise_id.as_deref(),
            installation.team_id.as_deref(),
            installation.is_enterprise_install,
        );
        let user = installation
            .user_id
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(NONE);

        let entity = serde_json::to_vec(installation).map_err(|source| {
            InstallationStoreError::Serialization {
                kind: "installation",
                source,
            }
        })?;

        let records = if self.historical_data_enabled {
            let version = Version::installed_at(installation.installed_at);
            vec![
                RecordKey::installer(None, Version::Latest),
                RecordKey::installer(None, version.clone()),
                RecordKey::installer(Some(user), Version::Latest),
                RecordKey::installer(Some(user), version),
            ]
        } else {
            vec![
                RecordKey::installer(None, Version::Latest),
                RecordKey::installer(Some(user), Version::Latest),
            ]
        };

        self.upload_all(&tenant, &records, &entity, "installation")?;

        info!(
            parent: &self.span,
            tenant = %tenant,
            user = user,
            installed_at = installation.installed_at,
            historical = self.historical_data_enabled,
            "Saved installation"
        );
        Ok(())
    }

    fn save_bot(&self, bot: &Bot) -> Result<()> {
        check_installed_at("bot", bot.installed_at)?;
        let tenant = TenantKey::new(
            bot.enterprise_id.as_deref(),
            bot.team_id.as_deref(),
            bot.is_enterprise_install,
        );

        let entity = serde_json::to_vec(bot)
            .map_err(|source| InstallationStoreError::Serialization { kind: "bot", source })?;

        let mut records = vec![RecordKey::bot(Version::Latest)];
        if self.historical_data_enabled {
            records.push(RecordKey::bot(Version::installed_at(bot.installed_at)));
        }

        self.upload_all(&tenant, &records, &entity, "bot installation")?;

        debug!(parent: &self.span, tenant = %tenant, "Saved bot");
        Ok(())
    }

    fn find_bot(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        is_enterprise_install: bool,
    ) -> Option<Bot> {
        let tenant = TenantKey::new(enterprise_id, team_id, is_enterprise_install);
        self.read_record(&tenant, &RecordKey::bot(Version::Latest))
    }

    fn find_installation(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        user_id: Option<&str>,
        is_enterprise_install: bool,
    ) -> Option<Installation> {
        let tenant = TenantKey::new(enterprise_id, team_id, is_enterprise_install);
        let user_id = user_id.filter(|u| !u.is_empty());

        let mut installation: Installation =
            self.read_record(&tenant, &RecordKey::installer(user_id, Version::Latest))?;

        if user_id.is_some() {
            // The per-user record keeps whatever bot token was current when that
            // user installed; the tenant-level record always has the newest one.
            // Assumes every installation carries bot scopes.
            let latest: Option<Installation> =
                self.read_record(&tenant, &RecordKey::installer(None, Version::Latest));
            if let Some(latest) = latest {
                if installation.bot_token != latest.bot_token {
                    debug!(parent: &self.span, tenant = %tenant, "Refreshing bot credentials from tenant record");
                    installation.adopt_bot_credentials(&latest);
                }
            }
        }

        Some(installation)
    }

    fn delete_bot(&self, enterprise_id: Option<&str>, team_id: Option<&str>) -> Result<()> {
        let tenant = TenantKey::new(enterprise_id, team_id, false);

        for (key, record) in self.list_records(&tenant, "bot-")? {
            if record.kind == RecordKind::Bot {
                self.delete_object(&tenant, &key, "bot installation")?;
            }
        }
        Ok(())
    }

    fn delete_installation(
        &self,
        enterprise_id: Option<&str>,
        team_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<()> {
        let tenant = TenantKey::new(enterprise_id, team_id, false);
        let user_id = user_id.filter(|u| !u.is_empty());

        let name_prefix = format!("installer-{}", user_id.unwrap_or(""));
        let mut deleted: HashSet<String> = HashSet::new();

        for (key, record) in self.list_records(&tenant, &name_prefix)? {
            if deleted.contains(&key) {
                continue;
            }
            // `installer-U1` also prefixes `installer-U10-...`.
            if user_id.is_some() && record.user.as_deref() != user_id {
                continue;
            }

            self.delete_object(&tenant, &key, "installation")?;
            deleted.insert(key);

            if record.user.is_none() {
                continue;
            }

            // Each user-scoped history entry has a tenant-level twin with the same
            // version. The tenant-level latest record may still belong to another
            // user, so it is left for the orphan check below.
            let companion = record.tenant_scoped();
            if companion.is_tenant_latest_installer() {
                continue;
            }
            let companion_key = tenant.object_key(&self.client_id, &companion);
            if !deleted.contains(&companion_key) {
                self.delete_object(&tenant, &companion_key, "installation")?;
                deleted.insert(companion_key);
            }
        }

        let remaining: Vec<(String, RecordKey)> = self
            .list_records(&tenant, "installer-")?
            .into_iter()
            .filter(|(key, _)| !deleted.contains(key))
            .collect();

        // A lone tenant-level latest record has no user left behind it.
        if let [(key, record)] = remaining.as_slice() {
            if record.is_tenant_latest_installer() {
                self.delete_object(&tenant, key, "installation")?;
            }
        }

        Ok(())
    }
}

fn check_installed_at(kind: &'static str, installed_at: f64) -> Result<()> {
    if installed_at.is_finite() && installed_at.is_sign_positive() {
        Ok(())
    } else {
        Err(InstallationStoreError::InvalidTimestamp { kind, installed_at })
    }
}
