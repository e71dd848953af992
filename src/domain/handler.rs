use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    error::Result,
    types::{CreateUserRequest, LocalUser, SyncConfig, UpdateUserRequest, Uuid},
};

/// Store operations reconciliation needs. Everything is scoped by tenant;
/// no call reads or writes across tenants.
#[async_trait]
pub trait UserStoreHandler {
    /// Active users created by a sync pass (directory provenance) whose
    /// email is not in `excluding_emails`. Input to the deactivation pass.
    async fn list_active_provisioned_users(
        &self,
        tenant_id: Uuid,
        excluding_emails: &HashSet<String>,
    ) -> Result<Vec<LocalUser>>;
    async fn find_user_by_email(&self, tenant_id: Uuid, email: &str)
        -> Result<Option<LocalUser>>;
    async fn create_user(&self, request: CreateUserRequest) -> Result<()>;
    async fn update_user(&self, request: UpdateUserRequest) -> Result<()>;
}

#[async_trait]
pub trait SyncConfigHandler {
    /// All configurations with both `is_active` and `sync_enabled` set.
    async fn list_enabled_sync_configs(&self) -> Result<Vec<SyncConfig>>;
    async fn set_last_sync_at(&self, config_id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

#[cfg(test)]
mockall::mock! {
    pub TestStoreHandler{}
    impl Clone for TestStoreHandler {
        fn clone(&self) -> Self;
    }
    #[async_trait]
    impl UserStoreHandler for TestStoreHandler {
        async fn list_active_provisioned_users(
            &self,
            tenant_id: Uuid,
            excluding_emails: &HashSet<String>,
        ) -> Result<Vec<LocalUser>>;
        async fn find_user_by_email(
            &self,
            tenant_id: Uuid,
            email: &str,
        ) -> Result<Option<LocalUser>>;
        async fn create_user(&self, request: CreateUserRequest) -> Result<()>;
        async fn update_user(&self, request: UpdateUserRequest) -> Result<()>;
    }
    #[async_trait]
    impl SyncConfigHandler for TestStoreHandler {
        async fn list_enabled_sync_configs(&self) -> Result<Vec<SyncConfig>>;
        async fn set_last_sync_at(&self, config_id: Uuid, at: DateTime<Utc>) -> Result<()>;
    }
}
