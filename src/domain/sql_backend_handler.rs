use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{debug, instrument};

use crate::domain::{
    error::{DomainError, Result},
    handler::{SyncConfigHandler, UserStoreHandler},
    model::{self, SyncConfigColumn, UserColumn},
    sql_tables::DbConnection,
    types::{CreateUserRequest, LocalUser, SyncConfig, UpdateUserRequest, Uuid},
};

#[derive(Debug, Clone)]
pub struct SqlBackendHandler {
    sql_pool: DbConnection,
}

impl SqlBackendHandler {
    pub fn new(sql_pool: DbConnection) -> Self {
        SqlBackendHandler { sql_pool }
    }
}

#[async_trait]
impl UserStoreHandler for SqlBackendHandler {
    #[instrument(skip_all, level = "debug", err)]
    async fn list_active_provisioned_users(
        &self,
        tenant_id: Uuid,
        excluding_emails: &HashSet<String>,
    ) -> Result<Vec<LocalUser>> {
        debug!(%tenant_id, excluded = excluding_emails.len());
        let mut query = model::Users::find()
            .filter(UserColumn::TenantId.eq(&tenant_id))
            .filter(UserColumn::IsActive.eq(true))
            .filter(UserColumn::PasswordHash.eq(""));
        if !excluding_emails.is_empty() {
            query = query.filter(UserColumn::Email.is_not_in(excluding_emails.iter().cloned()));
        }
        Ok(query
            .order_by_asc(UserColumn::Email)
            .all(&self.sql_pool)
            .await?
            .into_iter()
            .map(LocalUser::from)
            .collect())
    }

    #[instrument(skip_all, level = "debug", err)]
    async fn find_user_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<LocalUser>> {
        debug!(%tenant_id, email);
        Ok(model::Users::find()
            .filter(UserColumn::TenantId.eq(&tenant_id))
            .filter(UserColumn::Email.eq(email))
            .one(&self.sql_pool)
            .await?
            .map(LocalUser::from))
    }

    #[instrument(skip_all, level = "debug", err)]
    async fn create_user(&self, request: CreateUserRequest) -> Result<()> {
        debug!(tenant_id = %request.tenant_id, email = %request.email);
        if !request.directory_provenance {
            return Err(DomainError::InternalError(
                "account creation without directory provenance requires a credential flow"
                    .to_owned(),
            ));
        }
        // The empty hash is what marks the row as directory-provisioned.
        let new_user = model::users::ActiveModel {
            id: ActiveValue::Set(Uuid::random()),
            tenant_id: ActiveValue::Set(request.tenant_id),
            email: ActiveValue::Set(request.email),
            display_name: ActiveValue::Set(request.display_name),
            password_hash: ActiveValue::Set(String::new()),
            is_active: ActiveValue::Set(request.is_active),
            created_at: ActiveValue::Set(Utc::now()),
        };
        new_user.insert(&self.sql_pool).await?;
        Ok(())
    }

    #[instrument(skip_all, level = "debug", err)]
    async fn update_user(&self, request: UpdateUserRequest) -> Result<()> {
        debug!(user_id = %request.user_id);
        let user = model::Users::find_by_id(request.user_id.clone())
            .one(&self.sql_pool)
            .await?
            .ok_or_else(|| DomainError::EntityNotFound(request.user_id.to_string()))?;
        let mut user: model::users::ActiveModel = user.into();
        if let Some(display_name) = request.display_name {
            user.display_name = ActiveValue::Set(display_name);
        }
        if let Some(is_active) = request.is_active {
            user.is_active = ActiveValue::Set(is_active);
        }
        user.update(&self.sql_pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncConfigHandler for SqlBackendHandler {
    #[instrument(skip_all, level = "debug", err)]
    async fn list_enabled_sync_configs(&self) -> Result<Vec<SyncConfig>> {
        Ok(model::SyncConfigs::find()
            .filter(SyncConfigColumn::IsActive.eq(true))
            .filter(SyncConfigColumn::SyncEnabled.eq(true))
            .order_by_asc(SyncConfigColumn::Id)
            .all(&self.sql_pool)
            .await?
            .into_iter()
            .map(SyncConfig::from)
            .collect())
    }

    #[instrument(skip_all, level = "debug", err)]
    async fn set_last_sync_at(&self, config_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        debug!(%config_id, %at);
        let config = model::SyncConfigs::find_by_id(config_id.clone())
            .one(&self.sql_pool)
            .await?
            .ok_or_else(|| DomainError::EntityNotFound(config_id.to_string()))?;
        let mut config: model::sync_configs::ActiveModel = config.into();
        config.last_sync_at = ActiveValue::Set(Some(at));
        config.update(&self.sql_pool).await?;
        Ok(())
    }
}
