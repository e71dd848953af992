use anyhow::Context;
use sea_orm::{
    sea_query::{ColumnDef, Index, Table},
    ConnectionTrait, Iden, Statement,
};

pub type DbConnection = sea_orm::DatabaseConnection;

#[derive(Iden, Clone, Copy)]
pub enum Users {
    Table,
    Id,
    TenantId,
    Email,
    DisplayName,
    PasswordHash,
    IsActive,
    CreatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum SyncConfigs {
    Table,
    Id,
    TenantId,
    Host,
    Port,
    UseTls,
    BaseDn,
    BindDn,
    BindSecret,
    UserSearchBase,
    UserSearchFilter,
    SyncIntervalSeconds,
    LastSyncAt,
    IsActive,
    SyncEnabled,
}

pub async fn init_table(pool: &DbConnection) -> anyhow::Result<()> {
    let builder = pool.get_database_backend();
    // SQLite needs this pragma to be turned on. Other DBs might not understand
    // it, so ignore the error.
    let _ = pool
        .execute(Statement::from_string(
            builder,
            "PRAGMA foreign_keys = ON".to_owned(),
        ))
        .await;

    pool.execute(
        builder.build(
            Table::create()
                .table(Users::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Users::Id)
                        .string_len(36)
                        .not_null()
                        .primary_key(),
                )
                .col(ColumnDef::new(Users::TenantId).string_len(36).not_null())
                .col(ColumnDef::new(Users::Email).string_len(255).not_null())
                .col(
                    ColumnDef::new(Users::DisplayName)
                        .string_len(255)
                        .not_null(),
                )
                .col(
                    ColumnDef::new(Users::PasswordHash)
                        .string_len(255)
                        .not_null(),
                )
                .col(ColumnDef::new(Users::IsActive).boolean().not_null())
                .col(ColumnDef::new(Users::CreatedAt).date_time().not_null()),
        ),
    )
    .await
    .context("while creating the users table")?;

    pool.execute(
        builder.build(
            Index::create()
                .if_not_exists()
                .name("unique-tenant-email")
                .table(Users::Table)
                .col(Users::TenantId)
                .col(Users::Email)
                .unique(),
        ),
    )
    .await
    .context("while enforcing email unicity per tenant")?;

    pool.execute(
        builder.build(
            Table::create()
                .table(SyncConfigs::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(SyncConfigs::Id)
                        .string_len(36)
                        .not_null()
                        .primary_key(),
                )
                .col(
                    ColumnDef::new(SyncConfigs::TenantId)
                        .string_len(36)
                        .not_null(),
                )
                .col(ColumnDef::new(SyncConfigs::Host).string_len(255).not_null())
                .col(ColumnDef::new(SyncConfigs::Port).integer().not_null())
                .col(ColumnDef::new(SyncConfigs::UseTls).boolean().not_null())
                .col(
                    ColumnDef::new(SyncConfigs::BaseDn)
                        .string_len(255)
                        .not_null(),
                )
                .col(
                    ColumnDef::new(SyncConfigs::BindDn)
                        .string_len(255)
                        .not_null(),
                )
                .col(
                    ColumnDef::new(SyncConfigs::BindSecret)
                        .string_len(255)
                        .not_null(),
                )
                .col(ColumnDef::new(SyncConfigs::UserSearchBase).string_len(255))
                .col(ColumnDef::new(SyncConfigs::UserSearchFilter).string_len(1024))
                .col(ColumnDef::new(SyncConfigs::SyncIntervalSeconds).big_integer())
                .col(ColumnDef::new(SyncConfigs::LastSyncAt).date_time())
                .col(ColumnDef::new(SyncConfigs::IsActive).boolean().not_null())
                .col(ColumnDef::new(SyncConfigs::SyncEnabled).boolean().not_null()),
        ),
    )
    .await
    .context("while creating the sync_configs table")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, DbBackend, FromQueryResult};

    pub async fn get_in_memory_db() -> DbConnection {
        let mut sql_opt = sea_orm::ConnectOptions::new("sqlite::memory:".to_owned());
        sql_opt.max_connections(1).sqlx_logging(false);
        Database::connect(sql_opt).await.unwrap()
    }

    fn raw_statement(sql: &str) -> Statement {
        Statement::from_string(DbBackend::Sqlite, sql.to_owned())
    }

    #[tokio::test]
    async fn test_init_table() {
        let sql_pool = get_in_memory_db().await;
        init_table(&sql_pool).await.unwrap();
        sql_pool
            .execute(raw_statement(
                r#"INSERT INTO users
      (id, tenant_id, email, display_name, password_hash, is_active, created_at)
      VALUES ("3fa85f64-5717-4562-b3fc-2c963f66afa6", "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
              "böb@bob.bob", "Bob Bobbersön", "", true, "1970-01-01 00:00:00")"#,
            ))
            .await
            .unwrap();
        #[derive(FromQueryResult, PartialEq, Eq, Debug)]
        struct ShortUserDetails {
            display_name: String,
            is_active: bool,
        }
        let result = ShortUserDetails::find_by_statement(raw_statement(
            r#"SELECT display_name, is_active FROM users
               WHERE id = "3fa85f64-5717-4562-b3fc-2c963f66afa6""#,
        ))
        .one(&sql_pool)
        .await
        .unwrap()
        .unwrap();
        assert_eq!(
            result,
            ShortUserDetails {
                display_name: "Bob Bobbersön".to_owned(),
                is_active: true
            }
        );
    }

    #[tokio::test]
    async fn test_already_init_table() {
        let sql_pool = get_in_memory_db().await;
        init_table(&sql_pool).await.unwrap();
        init_table(&sql_pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_email_unique_per_tenant() {
        let sql_pool = get_in_memory_db().await;
        init_table(&sql_pool).await.unwrap();
        sql_pool
            .execute(raw_statement(
                r#"INSERT INTO users
      (id, tenant_id, email, display_name, password_hash, is_active, created_at)
      VALUES ("3fa85f64-5717-4562-b3fc-2c963f66afa6", "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
              "dup@acme.com", "One", "", true, "1970-01-01 00:00:00")"#,
            ))
            .await
            .unwrap();
        // Same email, same tenant: rejected.
        assert!(sql_pool
            .execute(raw_statement(
                r#"INSERT INTO users
      (id, tenant_id, email, display_name, password_hash, is_active, created_at)
      VALUES ("a5e1b9ef-31ae-45f9-8b37-55b61e13f5a5", "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
              "dup@acme.com", "Two", "", true, "1970-01-01 00:00:00")"#,
            ))
            .await
            .is_err());
        // Same email, other tenant: allowed.
        sql_pool
            .execute(raw_statement(
                r#"INSERT INTO users
      (id, tenant_id, email, display_name, password_hash, is_active, created_at)
      VALUES ("b6a0cc1d-0a52-44a5-b02f-31f5e08cf573", "9e107d9d-372b-4e6e-8e36-6ad63f9ac2e4",
              "dup@acme.com", "Three", "", true, "1970-01-01 00:00:00")"#,
            ))
            .await
            .unwrap();
    }
}
