use std::collections::HashSet;

use tracing::{info, instrument, warn};

use crate::domain::{
    error::Result,
    handler::UserStoreHandler,
    types::{CreateUserRequest, DirectoryIdentity, UpdateUserRequest, Uuid},
};

/// Mutation counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    pub users_created: usize,
    pub users_updated: usize,
    pub users_deactivated: usize,
}

/// Applies one directory snapshot to the local store of a single tenant.
/// Deactivation runs to completion before any provisioning, so an identity
/// present in the snapshot can never be deactivated by the same pass.
pub struct Reconciler<'a, Store> {
    store: &'a Store,
    tenant_id: Uuid,
}

impl<'a, Store: UserStoreHandler> Reconciler<'a, Store> {
    pub fn new(store: &'a Store, tenant_id: Uuid) -> Self {
        Self { store, tenant_id }
    }

    #[instrument(skip_all, level = "debug", err, fields(tenant_id = %self.tenant_id))]
    pub async fn apply(&self, identities: &[DirectoryIdentity]) -> Result<ReconciliationOutcome> {
        let found_emails: HashSet<String> =
            identities.iter().map(|user| user.email.clone()).collect();
        let mut outcome = ReconciliationOutcome::default();

        // Only rows this engine provisioned are candidates; accounts with a
        // local credential are left alone even when absent from the
        // directory. A store failure here aborts the pass: provisioning
        // after a failed deactivation query could resurrect accounts that
        // should have been disabled.
        let stale_users = self
            .store
            .list_active_provisioned_users(self.tenant_id.clone(), &found_emails)
            .await?;
        for user in stale_users {
            self.store
                .update_user(UpdateUserRequest {
                    user_id: user.id,
                    display_name: None,
                    is_active: Some(false),
                })
                .await?;
            info!(email = %user.email, "Deactivated user absent from the directory");
            outcome.users_deactivated += 1;
        }

        for identity in identities {
            if let Err(error) = self.provision(identity, &mut outcome).await {
                warn!(email = %identity.email, %error, "Skipping user after provisioning error");
            }
        }

        Ok(outcome)
    }

    async fn provision(
        &self,
        identity: &DirectoryIdentity,
        outcome: &mut ReconciliationOutcome,
    ) -> Result<()> {
        match self
            .store
            .find_user_by_email(self.tenant_id.clone(), &identity.email)
            .await?
        {
            Some(user) => {
                // A directory-confirmed identity always comes back active,
                // even after a manual deactivation.
                self.store
                    .update_user(UpdateUserRequest {
                        user_id: user.id,
                        display_name: Some(identity.display_name.clone()),
                        is_active: Some(true),
                    })
                    .await?;
                outcome.users_updated += 1;
            }
            None => {
                self.store
                    .create_user(CreateUserRequest {
                        tenant_id: self.tenant_id.clone(),
                        email: identity.email.clone(),
                        display_name: identity.display_name.clone(),
                        directory_provenance: true,
                        is_active: true,
                    })
                    .await?;
                info!(email = %identity.email, "Provisioned new user from the directory");
                outcome.users_created += 1;
            }
        }
        Ok(())
    }
}
