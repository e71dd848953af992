use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{value::ValueType, ArrayType, ColumnType, ValueTypeErr},
    DbErr, QueryResult, TryFromU64, TryGetError, TryGetable, Value,
};
use secstr::SecUtf8;
use serde::{Deserialize, Serialize};

/// Applied when a configuration carries no filter of its own: regular user
/// objects only, no computer accounts, no accounts flagged as disabled.
pub const DEFAULT_USER_SEARCH_FILTER: &str =
    "(&(objectClass=user)(objectCategory=person)(!(userAccountControl:1.2.840.113556.1.4.803:=2)))";

pub const DEFAULT_SYNC_INTERVAL_SECONDS: i64 = 3600;

/// Uuid stored as its string form, so that it round-trips unchanged through
/// any of the supported database backends.
#[derive(PartialEq, Hash, Eq, PartialOrd, Ord, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "&str")]
pub struct Uuid(String);

impl Uuid {
    pub fn random() -> Self {
        Uuid(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl<'a> std::convert::TryFrom<&'a str> for Uuid {
    type Error = anyhow::Error;
    fn try_from(s: &'a str) -> anyhow::Result<Self> {
        Ok(Uuid(uuid::Uuid::parse_str(s)?.to_string()))
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryGetable for Uuid {
    fn try_get_by<I: sea_orm::ColIdx>(
        res: &QueryResult,
        index: I,
    ) -> std::result::Result<Self, TryGetError> {
        Ok(Uuid(String::try_get_by(res, index)?))
    }
}

impl TryFromU64 for Uuid {
    fn try_from_u64(_n: u64) -> std::result::Result<Self, DbErr> {
        Err(DbErr::ConvertFromU64("Uuid cannot be constructed from u64"))
    }
}

impl ValueType for Uuid {
    fn try_from(v: Value) -> std::result::Result<Self, ValueTypeErr> {
        <Self as std::convert::TryFrom<_>>::try_from(
            <std::string::String as sea_orm::sea_query::ValueType>::try_from(v)?.as_str(),
        )
        .map_err(|_| ValueTypeErr {})
    }

    fn type_name() -> String {
        "Uuid".to_owned()
    }

    fn array_type() -> ArrayType {
        ArrayType::String
    }

    fn column_type() -> ColumnType {
        ColumnType::String(Some(36))
    }
}

impl From<Uuid> for Value {
    fn from(uuid: Uuid) -> Self {
        uuid.into_string().into()
    }
}

impl From<&Uuid> for Value {
    fn from(uuid: &Uuid) -> Self {
        uuid.as_str().into()
    }
}

#[cfg(test)]
#[macro_export]
macro_rules! uuid {
    ($s:literal) => {
        <$crate::domain::types::Uuid as std::convert::TryFrom<_>>::try_from($s).unwrap()
    };
}

/// One tenant's connection to its directory server. Owned by tenant
/// administration; this engine reads it and writes `last_sync_at`.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub base_dn: String,
    pub bind_dn: String,
    pub bind_secret: SecUtf8,
    pub user_search_base: Option<String>,
    pub user_search_filter: Option<String>,
    pub sync_interval_seconds: Option<i64>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub sync_enabled: bool,
}

impl SyncConfig {
    pub fn search_base(&self) -> &str {
        self.user_search_base
            .as_deref()
            .filter(|base| !base.is_empty())
            .unwrap_or(&self.base_dn)
    }

    pub fn search_filter(&self) -> &str {
        self.user_search_filter
            .as_deref()
            .filter(|filter| !filter.is_empty())
            .unwrap_or(DEFAULT_USER_SEARCH_FILTER)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let interval = chrono::Duration::seconds(
            self.sync_interval_seconds
                .unwrap_or(DEFAULT_SYNC_INTERVAL_SECONDS),
        );
        match self.last_sync_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= interval,
        }
    }
}

/// A user as found in the directory, after normalization. Lives only for
/// the duration of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryIdentity {
    pub account_name: String,
    pub email: String,
    pub display_name: String,
}

/// A user row from the local store, as seen by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub has_directory_provenance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateUserRequest {
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub directory_provenance: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUserRequest {
    pub user_id: Uuid,
    pub display_name: Option<String>,
    pub is_active: Option<bool>,
}

/// Outcome of one configuration's pass, immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunResult {
    pub config_id: Uuid,
    pub success: bool,
    pub users_found: usize,
    pub users_created: usize,
    pub users_updated: usize,
    pub users_deactivated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncBatchOutcome {
    pub total_configs: usize,
    pub results: Vec<SyncRunResult>,
}
