pub mod normalizer;
pub mod session;

use async_trait::async_trait;

use crate::domain::{
    error::DirectoryError,
    types::{DirectoryIdentity, SyncConfig, DEFAULT_USER_SEARCH_FILTER},
};

use self::{
    normalizer::{normalize_entries, USER_ATTRIBUTES},
    session::{LdapSession, SearchRequest, SessionParams},
};

/// Page size for scheduled sync sweeps.
const SYNC_PAGE_SIZE: i32 = 100;
/// Page size and server-side size limit for interactive sampling.
const SAMPLE_SIZE_LIMIT: i32 = 5;

/// Result of one directory sweep: the identities that survived
/// normalization, plus whether the server truncated the search.
#[derive(Debug, Default)]
pub struct DirectorySweep {
    pub identities: Vec<DirectoryIdentity>,
    pub truncated: bool,
}

/// One user sweep under one base DN. The base DN rides along for email
/// synthesis even when the search runs under a narrower base.
#[derive(Debug, Clone)]
pub struct UserSearch {
    pub base_dn: String,
    pub search_base: String,
    pub filter: String,
    pub page_size: i32,
    pub size_limit: Option<i32>,
}

impl UserSearch {
    /// The full sweep a scheduled sync runs, unbounded.
    pub fn scheduled(config: &SyncConfig) -> Self {
        Self {
            base_dn: config.base_dn.clone(),
            search_base: config.search_base().to_owned(),
            filter: config.search_filter().to_owned(),
            page_size: SYNC_PAGE_SIZE,
            size_limit: None,
        }
    }

    /// A deliberately tiny sweep used to sample a handful of users when
    /// an administrator tests connection parameters.
    pub fn sample(base_dn: &str) -> Self {
        Self {
            base_dn: base_dn.to_owned(),
            search_base: base_dn.to_owned(),
            filter: DEFAULT_USER_SEARCH_FILTER.to_owned(),
            page_size: SAMPLE_SIZE_LIMIT,
            size_limit: Some(SAMPLE_SIZE_LIMIT),
        }
    }
}

/// Seam between the sync flows and the wire protocol.
#[async_trait]
pub trait DirectorySearcher: Send + Sync {
    /// Opens one session with the given credentials and returns every
    /// user entry matching the sweep, normalized.
    async fn search_users(
        &self,
        params: SessionParams,
        search: UserSearch,
    ) -> Result<DirectorySweep, DirectoryError>;
}

/// The wire implementation. Each call owns exactly one session.
#[derive(Debug, Clone, Default)]
pub struct LdapDirectorySearcher;

#[async_trait]
impl DirectorySearcher for LdapDirectorySearcher {
    async fn search_users(
        &self,
        params: SessionParams,
        search: UserSearch,
    ) -> Result<DirectorySweep, DirectoryError> {
        let outcome = LdapSession::new(params)
            .run(SearchRequest {
                base: search.search_base.clone(),
                filter: search.filter.clone(),
                attributes: USER_ATTRIBUTES.iter().map(|attr| attr.to_string()).collect(),
                page_size: search.page_size,
                size_limit: search.size_limit,
            })
            .await?;
        Ok(DirectorySweep {
            identities: normalize_entries(&outcome.entries, &search.base_dn),
            truncated: outcome.truncated,
        })
    }
}

#[cfg(test)]
mockall::mock! {
    pub TestDirectorySearcher {}

    #[async_trait]
    impl DirectorySearcher for TestDirectorySearcher {
        async fn search_users(
            &self,
            params: SessionParams,
            search: UserSearch,
        ) -> Result<DirectorySweep, DirectoryError>;
    }
}
