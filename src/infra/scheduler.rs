use crate::{
    domain::handler::{SyncConfigHandler, UserStoreHandler},
    infra::{ldap::DirectorySearcher, orchestrator::SyncOrchestrator},
};
use actix::prelude::*;
use chrono::prelude::*;
use cron::Schedule;
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{error, info, instrument};

// Define actor
pub struct Scheduler<Store, Searcher> {
    schedule: Schedule,
    orchestrator: Arc<SyncOrchestrator<Store, Searcher>>,
}

// Provide Actor implementation for our actor
impl<Store, Searcher> Actor for Scheduler<Store, Searcher>
where
    Store: UserStoreHandler + SyncConfigHandler + Send + Sync + 'static,
    Searcher: DirectorySearcher + 'static,
{
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        info!("Sync scheduler started");

        ctx.run_later(self.duration_until_next(), move |this, ctx| {
            this.schedule_task(ctx)
        });
    }
}

impl<Store, Searcher> Scheduler<Store, Searcher>
where
    Store: UserStoreHandler + SyncConfigHandler + Send + Sync + 'static,
    Searcher: DirectorySearcher + 'static,
{
    /// The cron expression is validated when the configuration loads.
    pub fn new(
        cron_expression: &str,
        orchestrator: Arc<SyncOrchestrator<Store, Searcher>>,
    ) -> Self {
        let schedule = Schedule::from_str(cron_expression).unwrap();
        Self {
            schedule,
            orchestrator,
        }
    }

    #[instrument(skip(self, ctx))]
    fn schedule_task(&self, ctx: &mut Context<Self>) {
        info!("Checking for due sync configurations");

        let future = actix::fut::wrap_future::<_, Self>(Self::run_batch(self.orchestrator.clone()));
        ctx.spawn(future);

        ctx.run_later(self.duration_until_next(), move |this, ctx| {
            this.schedule_task(ctx)
        });
    }

    async fn run_batch(orchestrator: Arc<SyncOrchestrator<Store, Searcher>>) {
        match orchestrator.run_due_configurations().await {
            Ok(outcome) => {
                if !outcome.results.is_empty() {
                    info!(
                        "Sync batch finished: {} of {} configurations were due",
                        outcome.results.len(),
                        outcome.total_configs
                    );
                }
            }
            Err(e) => error!("Sync batch error: {}", e),
        };
    }

    fn duration_until_next(&self) -> Duration {
        let now = Utc::now();
        let next = self.schedule.upcoming(Utc).next().unwrap();
        let duration_until = next.signed_duration_since(now);
        duration_until.to_std().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_until_next_is_within_the_minute() {
        let schedule = Schedule::from_str("0 * * * * * *").unwrap();
        let now = Utc::now();
        let next = schedule.upcoming(Utc).next().unwrap();
        let delta = next.signed_duration_since(now);
        assert!(delta.num_seconds() <= 60);
        assert!(delta.num_milliseconds() > 0);
    }
}
