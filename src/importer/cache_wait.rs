//! Waits for the backend's per-user repository cache before listing

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::models::{CurrentUser, RemoteRepository};
use crate::api::{RepositoryService, UserService};

use super::error::{ImportError, ImportResult};

pub struct CacheWarmWaiter<'a> {
    users: &'a dyn UserService,
    repositories: &'a dyn RepositoryService,
    interval: Duration,
}

impl<'a> CacheWarmWaiter<'a> {
    pub fn new(
        users: &'a dyn UserService,
        repositories: &'a dyn RepositoryService,
        interval: Duration,
    ) -> Self {
        Self {
            users,
            repositories,
            interval,
        }
    }

    /// Poll the current user until its cache is ready, then return the list
    /// to use: `current` unchanged when it has entries, otherwise one fresh
    /// fetch.
    ///
    /// Polling has no upper bound; failed user reads are logged and retried
    /// on the next tick.
    pub async fn wait(
        &self,
        user: &CurrentUser,
        current: Vec<RemoteRepository>,
        cancel: &CancellationToken,
    ) -> ImportResult<Vec<RemoteRepository>> {
        if !user.cache_ready {
            self.poll_until_ready(cancel).await?;
        }

        if !current.is_empty() {
            return Ok(current);
        }

        debug!("Repository list empty after cache warm-up, fetching");
        let repositories = self.repositories.list_repositories().await?;
        Ok(repositories)
    }

    async fn poll_until_ready(&self, cancel: &CancellationToken) -> ImportResult<()> {
        info!(interval = ?self.interval, "Waiting for repository cache");
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ImportError::Cancelled),
                _ = ticker.tick() => {}
            }

            match self.users.refresh_current_user().await {
                Ok(user) if user.cache_ready => {
                    info!("Repository cache ready");
                    return Ok(());
                }
                Ok(_) => debug!("Repository cache not ready yet"),
                Err(e) => warn!(error = %e, "Failed to refresh current user"),
            }
        }
    }
}
