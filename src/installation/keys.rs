//! Object key layout for installation and bot records.
//!
//! ```text
//! {client_id}/{enterprise|none}-{team|none}/installer-latest
//! {client_id}/{enterprise|none}-{team|none}/installer-{version}
//! {client_id}/{enterprise|none}-{team|none}/installer-{user}-latest
//! {client_id}/{enterprise|none}-{team|none}/installer-{user}-{version}
//! {client_id}/{enterprise|none}-{team|none}/bot-latest
//! {client_id}/{enterprise|none}-{team|none}/bot-{version}
//! ```
//!
//! Keys are always built from and parsed back into [`RecordKey`] so cleanup
//! code compares components instead of rewriting strings.

use std::fmt;

/// Placeholder for an absent enterprise, team or user id.
pub const NONE: &str = "none";

const INSTALLER: &str = "installer";
const BOT: &str = "bot";
const LATEST: &str = "latest";

/// The (enterprise, team) pair an installation belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantKey {
    enterprise: String,
    team: String,
}

impl TenantKey {
    /// Builds a tenant key, substituting `"none"` for missing ids.
    ///
    /// Enterprise-wide installs are stored once per enterprise, so the team id
    /// is dropped when `is_enterprise_install` is set.
    pub fn new(enterprise_id: Option<&str>, team_id: Option<&str>, is_enterprise_install: bool) -> Self {
        let team_id = if is_enterprise_install { None } else { team_id };
        Self {
            enterprise: non_empty(enterprise_id).unwrap_or(NONE).to_string(),
            team: non_empty(team_id).unwrap_or(NONE).to_string(),
        }
    }

    pub fn enterprise(&self) -> &str {
        &self.enterprise
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    /// Directory-like path of this tenant: `{client_id}/{enterprise}-{team}`.
    pub fn path(&self, client_id: &str) -> String {
        if client_id.is_empty() {
            self.to_string()
        } else {
            format!("{}/{}", client_id, self)
        }
    }

    /// Full object key of `record` for this tenant.
    pub fn object_key(&self, client_id: &str, record: &RecordKey) -> String {
        format!("{}/{}", self.path(client_id), record.name())
    }

    /// Prefix for listing record names starting with `name_prefix`.
    pub fn prefix(&self, client_id: &str, name_prefix: &str) -> String {
        format!("{}/{}", self.path(client_id), name_prefix)
    }

    /// Parses a full object key belonging to this tenant.
    ///
    /// Returns `None` for keys outside the tenant or with an unknown layout.
    pub fn parse_object_key(&self, client_id: &str, key: &str) -> Option<RecordKey> {
        let base = self.path(client_id);
        let name = key.strip_prefix(base.as_str())?.strip_prefix('/')?;
        RecordKey::parse_name(name)
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.enterprise, self.team)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Installer,
    Bot,
}

/// Which snapshot of a record a key points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Version {
    /// Overwritten on every save.
    Latest,
    /// Immutable history entry, named after `installed_at`.
    At(String),
}

impl Version {
    /// History version for an `installed_at` epoch timestamp.
    ///
    /// Whole seconds render without a fraction (`1000.0` becomes `"1000"`).
    pub fn installed_at(installed_at: f64) -> Self {
        Version::At(format!("{}", installed_at))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Latest => f.write_str(LATEST),
            Version::At(version) => f.write_str(version),
        }
    }
}

/// Record name within a tenant, e.g. `installer-U123-latest`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordKey {
    pub kind: RecordKind,
    /// User scope; `None` for tenant-level installer records and all bot records.
    pub user: Option<String>,
    pub version: Version,
}

impl RecordKey {
    pub fn installer(user: Option<&str>, version: Version) -> Self {
        Self {
            kind: RecordKind::Installer,
            user: non_empty(user).map(str::to_string),
            version,
        }
    }

    pub fn bot(version: Version) -> Self {
        Self {
            kind: RecordKind::Bot,
            user: None,
            version,
        }
    }

    /// The tenant-level record sharing this record's kind and version.
    pub fn tenant_scoped(&self) -> Self {
        Self {
            kind: self.kind,
            user: None,
            version: self.version.clone(),
        }
    }

    pub fn is_tenant_latest_installer(&self) -> bool {
        self.kind == RecordKind::Installer && self.user.is_none() && self.version == Version::Latest
    }

    /// Name of the record relative to its tenant path.
    pub fn name(&self) -> String {
        let kind = match self.kind {
            RecordKind::Installer => INSTALLER,
            RecordKind::Bot => BOT,
        };
        match &self.user {
            Some(user) => format!("{}-{}-{}", kind, user, self.version),
            None => format!("{}-{}", kind, self.version),
        }
    }

    /// Inverse of [`RecordKey::name`].
    ///
    /// User ids never contain `-`; the last `-` separates user and version.
    pub fn parse_name(name: &str) -> Option<Self> {
        if let Some(rest) = name.strip_prefix("bot-") {
            return non_empty(Some(rest)).map(|v| Self::bot(parse_version(v)));
        }

        let rest = name.strip_prefix("installer-")?;
        if rest == LATEST {
            return Some(Self::installer(None, Version::Latest));
        }

        match rest.rsplit_once('-') {
            Some((user, version)) if !user.is_empty() && !version.is_empty() => {
                Some(Self::installer(Some(user), parse_version(version)))
            }
            Some(_) => None,
            None if rest.is_empty() => None,
            None => Some(Self::installer(None, parse_version(rest))),
        }
    }
}

fn parse_version(s: &str) -> Version {
    if s == LATEST {
        Version::Latest
    } else {
        Version::At(s.to_string())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_path_with_client_id() {
        let tenant = TenantKey::new(Some("ent1"), Some("team1"), false);
        assert_eq!(tenant.path("app1"), "app1/ent1-team1");
    }

    #[test]
    fn test_tenant_path_without_client_id() {
        let tenant = TenantKey::new(None, Some("T1"), false);
        assert_eq!(tenant.path(""), "none-T1");
    }

    #[test]
    fn test_missing_ids_become_none() {
        let tenant = TenantKey::new(None, None, false);
        assert_eq!(tenant.to_string(), "none-none");

        let tenant = TenantKey::new(Some(""), Some(""), false);
        assert_eq!(tenant.to_string(), "none-none");
    }

    #[test]
    fn test_enterprise_install_drops_team() {
        let tenant = TenantKey::new(Some("E1"), Some("T1"), true);
        assert_eq!(tenant.enterprise(), "E1");
        assert_eq!(tenant.team(), NONE);
    }

    #[test]
    fn test_record_names() {
        let v = Version::installed_at(1000.0);
        assert_eq!(RecordKey::installer(None, Version::Latest).name(), "installer-latest");
        assert_eq!(RecordKey::installer(None, v.clone()).name(), "installer-1000");
        assert_eq!(
            RecordKey::installer(Some("u1"), Version::Latest).name(),
            "installer-u1-latest"
        );
        assert_eq!(RecordKey::installer(Some("u1"), v.clone()).name(), "installer-u1-1000");
        assert_eq!(RecordKey::bot(Version::Latest).name(), "bot-latest");
        assert_eq!(RecordKey::bot(v).name(), "bot-1000");
    }

    #[test]
    fn test_fractional_version() {
        assert_eq!(
            Version::installed_at(1700000000.25),
            Version::At("1700000000.25".to_string())
        );
    }

    #[test]
    fn test_parse_name_inverts_name() {
        let records = [
            RecordKey::installer(None, Version::Latest),
            RecordKey::installer(None, Version::installed_at(1000.5)),
            RecordKey::installer(Some("U123"), Version::Latest),
            RecordKey::installer(Some("U123"), Version::installed_at(1000.5)),
            RecordKey::bot(Version::Latest),
            RecordKey::bot(Version::installed_at(42.0)),
        ];

        for record in records {
            assert_eq!(RecordKey::parse_name(&record.name()), Some(record));
        }
    }

    #[test]
    fn test_parse_name_rejects_unknown_layouts() {
        assert_eq!(RecordKey::parse_name("installer-"), None);
        assert_eq!(RecordKey::parse_name("installer--latest"), None);
        assert_eq!(RecordKey::parse_name("bot-"), None);
        assert_eq!(RecordKey::parse_name("webhook-latest"), None);
    }

    #[test]
    fn test_parse_object_key_checks_tenant() {
        let tenant = TenantKey::new(Some("E1"), Some("T1"), false);

        assert_eq!(
            tenant.parse_object_key("app", "app/E1-T1/installer-u1-latest"),
            Some(RecordKey::installer(Some("u1"), Version::Latest))
        );
        assert_eq!(tenant.parse_object_key("app", "app/E1-T2/installer-latest"), None);
        assert_eq!(tenant.parse_object_key("app", "other/E1-T1/installer-latest"), None);
    }

    #[test]
    fn test_tenant_scoped_companion() {
        let record = RecordKey::installer(Some("u1"), Version::installed_at(1000.0));
        let companion = record.tenant_scoped();

        assert_eq!(companion.name(), "installer-1000");
        assert!(!companion.is_tenant_latest_installer());
        assert!(RecordKey::installer(Some("u1"), Version::Latest)
            .tenant_scoped()
            .is_tenant_latest_installer());
    }
}
