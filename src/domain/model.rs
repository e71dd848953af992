use secstr::SecUtf8;

use crate::domain::types::{LocalUser, SyncConfig};

pub mod users {
    use sea_orm::entity::prelude::*;

    use crate::domain::types::Uuid;

    /// Local user rows. An empty `password_hash` marks an account created by
    /// directory provisioning; locally registered accounts always carry a
    /// hash.
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Uuid,
        pub email: String,
        pub display_name: String,
        pub password_hash: String,
        pub is_active: bool,
        pub created_at: ChronoDateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod sync_configs {
    use sea_orm::entity::prelude::*;

    use crate::domain::types::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "sync_configs")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub tenant_id: Uuid,
        pub host: String,
        pub port: i32,
        pub use_tls: bool,
        pub base_dn: String,
        pub bind_dn: String,
        pub bind_secret: String,
        pub user_search_base: Option<String>,
        pub user_search_filter: Option<String>,
        pub sync_interval_seconds: Option<i64>,
        pub last_sync_at: Option<ChronoDateTimeUtc>,
        pub is_active: bool,
        pub sync_enabled: bool,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub use sync_configs::Entity as SyncConfigs;
pub use users::Entity as Users;

pub type UserColumn = users::Column;
pub type SyncConfigColumn = sync_configs::Column;

impl From<users::Model> for LocalUser {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            display_name: user.display_name,
            is_active: user.is_active,
            has_directory_provenance: user.password_hash.is_empty(),
        }
    }
}

impl From<sync_configs::Model> for SyncConfig {
    fn from(config: sync_configs::Model) -> Self {
        Self {
            id: config.id,
            tenant_id: config.tenant_id,
            host: config.host,
            port: config.port as u16,
            use_tls: config.use_tls,
            base_dn: config.base_dn,
            bind_dn: config.bind_dn,
            bind_secret: SecUtf8::from(config.bind_secret),
            user_search_base: config.user_search_base,
            user_search_filter: config.user_search_filter,
            sync_interval_seconds: config.sync_interval_seconds,
            last_sync_at: config.last_sync_at,
            is_active: config.is_active,
            sync_enabled: config.sync_enabled,
        }
    }
}
