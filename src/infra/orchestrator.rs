use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::{
    domain::{
        error::Result,
        handler::{SyncConfigHandler, UserStoreHandler},
        reconciler::{ReconciliationOutcome, Reconciler},
        types::{SyncBatchOutcome, SyncConfig, SyncRunResult},
    },
    infra::ldap::{
        session::{SessionParams, SCHEDULED_WATCHDOG},
        DirectorySearcher, UserSearch,
    },
};

/// Runs the sync pass of every due configuration, one at a time. A
/// failing configuration is recorded and never stops the rest of the
/// batch.
pub struct SyncOrchestrator<Store, Searcher> {
    store: Store,
    searcher: Searcher,
}

impl<Store, Searcher> SyncOrchestrator<Store, Searcher>
where
    Store: UserStoreHandler + SyncConfigHandler,
    Searcher: DirectorySearcher,
{
    pub fn new(store: Store, searcher: Searcher) -> Self {
        Self { store, searcher }
    }

    /// One batch over all enabled configurations. Configurations whose
    /// interval has not elapsed are skipped without opening a session
    /// and contribute no result.
    #[instrument(skip_all, level = "debug", err)]
    pub async fn run_due_configurations(&self) -> Result<SyncBatchOutcome> {
        let configs = self.store.list_enabled_sync_configs().await?;
        let total_configs = configs.len();
        let now = Utc::now();
        let mut results = Vec::new();
        for config in configs {
            if !config.is_due(now) {
                debug!(config_id = %config.id, "Sync interval has not elapsed, skipping");
                continue;
            }
            results.push(self.sync_one(config).await);
        }
        info!(
            total = total_configs,
            ran = results.len(),
            "Sync batch settled"
        );
        Ok(SyncBatchOutcome {
            total_configs,
            results,
        })
    }

    #[instrument(skip_all, level = "info", fields(config_id = %config.id, tenant_id = %config.tenant_id))]
    async fn sync_one(&self, config: SyncConfig) -> SyncRunResult {
        let started_at = Utc::now();
        match self.sync_directory(&config, started_at).await {
            Ok((users_found, counts)) => {
                info!(
                    users_found,
                    created = counts.users_created,
                    updated = counts.users_updated,
                    deactivated = counts.users_deactivated,
                    "Sync pass settled"
                );
                SyncRunResult {
                    config_id: config.id,
                    success: true,
                    users_found,
                    users_created: counts.users_created,
                    users_updated: counts.users_updated,
                    users_deactivated: counts.users_deactivated,
                    error: None,
                }
            }
            Err(error) => {
                // last_sync_at is left untouched so the configuration
                // stays due and retries on the next trigger.
                warn!(%error, "Sync pass failed");
                SyncRunResult {
                    config_id: config.id,
                    success: false,
                    users_found: 0,
                    users_created: 0,
                    users_updated: 0,
                    users_deactivated: 0,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    async fn sync_directory(
        &self,
        config: &SyncConfig,
        started_at: DateTime<Utc>,
    ) -> Result<(usize, ReconciliationOutcome)> {
        let sweep = self
            .searcher
            .search_users(
                SessionParams::from_config(config, SCHEDULED_WATCHDOG),
                UserSearch::scheduled(config),
            )
            .await?;
        if sweep.truncated {
            warn!(
                found = sweep.identities.len(),
                "The server truncated the search at its size limit"
            );
        }
        let counts = Reconciler::new(&self.store, config.tenant_id.clone())
            .apply(&sweep.identities)
            .await?;
        self.store
            .set_last_sync_at(config.id.clone(), started_at)
            .await?;
        Ok((sweep.identities.len(), counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            error::{ConnectionCause, DirectoryError},
            handler::MockTestStoreHandler,
            types::{DirectoryIdentity, Uuid},
        },
        infra::ldap::{DirectorySweep, MockTestDirectorySearcher},
        uuid,
    };
    use pretty_assertions::assert_eq;
    use secstr::SecUtf8;

    fn config(id: Uuid, host: &str, last_sync_at: Option<DateTime<Utc>>) -> SyncConfig {
        SyncConfig {
            id,
            tenant_id: uuid!("6ba7b810-9dad-11d1-80b4-00c04fd430c8"),
            host: host.to_owned(),
            port: 389,
            use_tls: false,
            base_dn: "DC=acme,DC=com".to_owned(),
            bind_dn: "sync@acme.com".to_owned(),
            bind_secret: SecUtf8::from("hunter2"),
            user_search_base: None,
            user_search_filter: None,
            sync_interval_seconds: None,
            last_sync_at,
            is_active: true,
            sync_enabled: true,
        }
    }

    fn identity(email: &str) -> DirectoryIdentity {
        DirectoryIdentity {
            account_name: email.split('@').next().unwrap().to_owned(),
            email: email.to_owned(),
            display_name: email.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_non_due_configurations_are_skipped() {
        let due_id = uuid!("550e8400-e29b-41d4-a716-446655440000");
        let fresh_id = uuid!("550e8400-e29b-41d4-a716-446655440001");
        let due = config(due_id.clone(), "due.acme.com", None);
        // Synced a minute ago with the default hour-long interval.
        let fresh = config(
            fresh_id,
            "fresh.acme.com",
            Some(Utc::now() - chrono::Duration::seconds(60)),
        );
        let mut store = MockTestStoreHandler::new();
        store
            .expect_list_enabled_sync_configs()
            .returning(move || Ok(vec![due.clone(), fresh.clone()]));
        let mut searcher = MockTestDirectorySearcher::new();
        searcher
            .expect_search_users()
            .withf(|params, _| {
                params.host == "due.acme.com" && params.watchdog == SCHEDULED_WATCHDOG
            })
            .times(1)
            .returning(|_, _| Ok(DirectorySweep::default()));
        store
            .expect_list_active_provisioned_users()
            .returning(|_, _| Ok(Vec::new()));
        store
            .expect_set_last_sync_at()
            .withf(move |id, _| *id == uuid!("550e8400-e29b-41d4-a716-446655440000"))
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = SyncOrchestrator::new(store, searcher)
            .run_due_configurations()
            .await
            .unwrap();
        assert_eq!(outcome.total_configs, 2);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].config_id, due_id);
        assert!(outcome.results[0].success);
    }

    #[tokio::test]
    async fn test_one_failing_configuration_does_not_stop_the_batch() {
        let broken_id = uuid!("550e8400-e29b-41d4-a716-446655440002");
        let healthy_id = uuid!("550e8400-e29b-41d4-a716-446655440003");
        let broken = config(broken_id.clone(), "broken.acme.com", None);
        let healthy = config(healthy_id.clone(), "healthy.acme.com", None);
        let mut store = MockTestStoreHandler::new();
        store
            .expect_list_enabled_sync_configs()
            .returning(move || Ok(vec![broken.clone(), healthy.clone()]));
        let mut searcher = MockTestDirectorySearcher::new();
        searcher
            .expect_search_users()
            .times(2)
            .returning(|params, _| {
                if params.host == "broken.acme.com" {
                    Err(DirectoryError::Connection {
                        cause: ConnectionCause::RefusedOrTimedOut,
                        detail: "connection refused".to_owned(),
                    })
                } else {
                    Ok(DirectorySweep::default())
                }
            });
        store
            .expect_list_active_provisioned_users()
            .returning(|_, _| Ok(Vec::new()));
        // Only the healthy configuration gets its timestamp advanced.
        store
            .expect_set_last_sync_at()
            .withf(move |id, _| *id == uuid!("550e8400-e29b-41d4-a716-446655440003"))
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = SyncOrchestrator::new(store, searcher)
            .run_due_configurations()
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
        let broken_result = &outcome.results[0];
        assert_eq!(broken_result.config_id, broken_id);
        assert!(!broken_result.success);
        assert!(broken_result.error.as_deref().unwrap().contains("Connection error"));
        let healthy_result = &outcome.results[1];
        assert_eq!(healthy_result.config_id, healthy_id);
        assert!(healthy_result.success);
        assert_eq!(healthy_result.error, None);
    }

    #[tokio::test]
    async fn test_truncated_sweep_settles_as_success() {
        let id = uuid!("550e8400-e29b-41d4-a716-446655440004");
        let cfg = config(id.clone(), "dc01.acme.com", None);
        let mut store = MockTestStoreHandler::new();
        store
            .expect_list_enabled_sync_configs()
            .returning(move || Ok(vec![cfg.clone()]));
        let mut searcher = MockTestDirectorySearcher::new();
        searcher.expect_search_users().returning(|_, _| {
            Ok(DirectorySweep {
                identities: vec![
                    identity("a@acme.com"),
                    identity("b@acme.com"),
                    identity("c@acme.com"),
                ],
                truncated: true,
            })
        });
        store
            .expect_list_active_provisioned_users()
            .returning(|_, _| Ok(Vec::new()));
        store
            .expect_find_user_by_email()
            .returning(|_, _| Ok(None));
        store.expect_create_user().times(3).returning(|_| Ok(()));
        store
            .expect_set_last_sync_at()
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = SyncOrchestrator::new(store, searcher)
            .run_due_configurations()
            .await
            .unwrap();
        let result = &outcome.results[0];
        assert!(result.success);
        assert_eq!(result.users_found, 3);
        assert_eq!(result.users_created, 3);
    }
}
