//! Top-level coordination of the repository import page

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::analytics::AnalyticsSink;
use crate::api::models::{ImportState, SecretChannel};
use crate::api::{ImportBackend, ImportService};
use crate::settings::Settings;

use super::cache_wait::CacheWarmWaiter;
use super::error::{ImportError, ImportResult};
use super::poller::{JobPoller, PollHandle};
use super::record::{PanelSnapshot, RepositoryCollection, RepositoryKey, RepositoryRecord, RevealMode};
use super::secrets::{reconcile_secrets, SecretOutcome};

/// Overall state of the import view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Waiting for the user check and the repository cache
    Loading,
    /// The user must sign in or link a source-control account
    NeedsAuthorization,
    Ready,
}

/// Result of saving the integration settings of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Terminal state of the rename job, when a rename was needed
    pub rename: Option<ImportState>,
    pub secrets: Vec<SecretOutcome>,
}

impl SaveReport {
    pub fn secrets_failed(&self) -> bool {
        self.secrets.iter().any(|s| !s.succeeded())
    }
}

/// Clears the refresh flag however the refresh ends
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the repository records and turns user actions into backend calls
pub struct ImportOrchestrator<B> {
    backend: Arc<B>,
    analytics: Arc<dyn AnalyticsSink>,
    settings: Settings,
    records: RepositoryCollection,
    poller: JobPoller,
    status: Mutex<PageStatus>,
    refreshing: AtomicBool,
    shutdown: CancellationToken,
    /// Token of the latest poll started for each repository
    polls: Mutex<HashMap<RepositoryKey, CancellationToken>>,
}

impl<B: ImportBackend + 'static> ImportOrchestrator<B> {
    pub fn new(backend: Arc<B>, analytics: Arc<dyn AnalyticsSink>, settings: Settings) -> Self {
        let records = RepositoryCollection::new();
        let imports: Arc<dyn ImportService> = backend.clone();
        let poller = JobPoller::new(
            imports,
            records.clone(),
            settings.job_poll_interval(),
            settings.max_poll_errors,
        );

        Self {
            backend,
            analytics,
            settings,
            records,
            poller,
            status: Mutex::new(PageStatus::Loading),
            refreshing: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            polls: Mutex::new(HashMap::new()),
        }
    }

    pub fn status(&self) -> PageStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: PageStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Copy of all records, in listing order
    pub fn records(&self) -> Vec<RepositoryRecord> {
        self.records.snapshot()
    }

    pub fn record(&self, key: &RepositoryKey) -> Option<RepositoryRecord> {
        self.records.get(key)
    }

    /// Check authorization, wait for the repository cache and load the list.
    ///
    /// Stops with `AuthorizationRequired` (and `NeedsAuthorization` status)
    /// before any polling or listing when the user is not signed in or not
    /// linked to the source-control provider.
    pub async fn initialize(&self) -> ImportResult<()> {
        self.set_status(PageStatus::Loading);

        let user = self.backend.current_user().await?;
        if !user.authenticated || !user.linked_to_provider {
            info!("User not authorized for repository import");
            self.set_status(PageStatus::NeedsAuthorization);
            return Err(ImportError::AuthorizationRequired);
        }

        let initial = self.backend.list_repositories().await?;
        let waiter = CacheWarmWaiter::new(
            &*self.backend,
            &*self.backend,
            self.settings.cache_poll_interval(),
        );
        let cancel = self.shutdown.child_token();
        let repositories = waiter.wait(&user, initial, &cancel).await?;

        self.records.merge(&repositories);
        self.set_status(PageStatus::Ready);
        info!(count = self.records.len(), "Repositories loaded");
        Ok(())
    }

    /// Re-sync the repository list from the source-control provider.
    ///
    /// Only one refresh runs at a time; a second call while one is pending
    /// fails with `RefreshInProgress`.
    pub async fn refresh_repositories(&self) -> ImportResult<()> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            return Err(ImportError::RefreshInProgress);
        }
        let _guard = RefreshGuard(&self.refreshing);

        info!("Refreshing repositories");
        let repositories = self.backend.force_refresh().await.map_err(|e| {
            error!(error = %e, "Failed to refresh repositories");
            ImportError::Backend(e)
        })?;

        self.records.merge(&repositories);
        info!(count = self.records.len(), "Repositories refreshed");
        Ok(())
    }

    /// Flip `is_enabled`; an enabled repository is imported, a disabled one
    /// has its role deleted. `is_enabled` is restored if the request fails.
    pub async fn toggle_repository(&self, key: &RepositoryKey) -> ImportResult<Option<PollHandle>> {
        let was_enabled = self
            .records
            .update(key, |r| {
                let previous = r.is_enabled;
                r.is_enabled = !previous;
                previous
            })
            .ok_or_else(|| ImportError::unknown(key))?;

        let result = if was_enabled {
            self.remove_import(key).await.map(|_| None)
        } else {
            self.import_repository(key).await.map(Some)
        };

        if result.is_err() {
            self.records.update(key, |r| r.is_enabled = was_enabled);
        }
        result
    }

    /// Delete the role of `key`; returns how many records were cleared
    async fn remove_import(&self, key: &RepositoryKey) -> ImportResult<usize> {
        info!(owner = %key.owner, repo = %key.repo_name, "Removing imported role");

        let deleted = self
            .backend
            .delete_role(&key.owner, &key.repo_name)
            .await
            .map_err(|e| self.record_failure(key, e))?;

        if self.stop_poll(key) {
            info!(owner = %key.owner, repo = %key.repo_name, "Stopped import poll for removed role");
        }
        let cleared = self.records.clear_deleted(&deleted.deleted_roles);
        self.records.update(key, |r| r.last_error = None);
        info!(cleared, "Cleared imports for deleted roles");
        Ok(cleared)
    }

    /// Submit an import under the proposed role name and start polling it.
    ///
    /// The record is marked `PENDING` before the request; its previous state
    /// is restored if the request fails.
    pub async fn import_repository(&self, key: &RepositoryKey) -> ImportResult<PollHandle> {
        let (proposed, previous_state) = self
            .records
            .update(key, |r| {
                if !r.is_enabled {
                    return None;
                }
                let previous = r.import_state.replace(ImportState::Pending);
                Some((r.proposed_role_name.clone(), previous))
            })
            .ok_or_else(|| ImportError::unknown(key))?
            .ok_or_else(|| ImportError::not_enabled(key))?;

        info!(owner = %key.owner, repo = %key.repo_name, role = %proposed, "Submitting import");

        let job = match self
            .backend
            .submit_import(&key.owner, &key.repo_name, Some(&proposed))
            .await
        {
            Ok(job) => job,
            Err(e) => {
                self.records.update(key, |r| r.import_state = previous_state);
                return Err(self.record_failure(key, e));
            }
        };

        self.records.update(key, |r| r.last_error = None);
        Ok(self.poller.spawn(job, self.poll_token(key)))
    }

    /// Hide the panel, commit a pending rename and only then sync secrets.
    ///
    /// Without a rename the configured settings delay elapses instead, so
    /// both paths reach the secret sync after a comparable pause.
    ///
    /// The panel snapshot is dropped when the save ends, successfully or not.
    pub async fn save_settings(&self, key: &RepositoryKey) -> ImportResult<SaveReport> {
        let result = self.commit_settings(key).await;
        self.records.update(key, |r| r.snapshot = None);
        result
    }

    async fn commit_settings(&self, key: &RepositoryKey) -> ImportResult<SaveReport> {
        let needs_rename = self
            .records
            .update(key, |r| {
                r.show_integration_panel = false;
                r.has_pending_rename()
            })
            .ok_or_else(|| ImportError::unknown(key))?;

        let rename = if needs_rename {
            Some(self.commit_rename(key).await?)
        } else {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(ImportError::Cancelled),
                _ = tokio::time::sleep(self.settings.settings_delay()) => {}
            }
            None
        };

        let secrets =
            reconcile_secrets(&*self.backend, &*self.analytics, &self.records, key).await;

        Ok(SaveReport { rename, secrets })
    }

    /// Send the proposed name and wait for the resulting job to finish
    async fn commit_rename(&self, key: &RepositoryKey) -> ImportResult<ImportState> {
        let (proposed, previous_enabled, previous_state) = self
            .records
            .update(key, |r| {
                let previous = (r.is_enabled, r.import_state);
                r.is_enabled = true;
                r.import_state = Some(ImportState::Pending);
                (r.proposed_role_name.clone(), previous.0, previous.1)
            })
            .ok_or_else(|| ImportError::unknown(key))?;

        info!(owner = %key.owner, repo = %key.repo_name, role = %proposed, "Renaming role");

        let job = match self
            .backend
            .submit_import(&key.owner, &key.repo_name, Some(&proposed))
            .await
        {
            Ok(job) => job,
            Err(e) => {
                self.records.update(key, |r| {
                    r.is_enabled = previous_enabled;
                    r.import_state = previous_state;
                });
                return Err(self.record_failure(key, e));
            }
        };

        // Accepted by the server; the job now runs under this name
        self.records.update(key, |r| {
            r.committed_role_name = proposed.clone();
            r.last_error = None;
        });

        self.poller.spawn(job, self.poll_token(key)).wait().await
    }

    /// Show the integration panel and remember the values to restore on cancel
    pub fn open_integration_panel(&self, key: &RepositoryKey) -> ImportResult<()> {
        self.records
            .update(key, |r| {
                r.snapshot = Some(PanelSnapshot {
                    ci_token: r.ci_token.clone(),
                    webhook_secret: r.webhook_secret.clone(),
                });
                r.show_integration_panel = true;
            })
            .ok_or_else(|| ImportError::unknown(key))
    }

    /// Discard panel edits: restore the committed name and the snapshot secrets
    pub fn cancel_integration_panel(&self, key: &RepositoryKey) -> ImportResult<()> {
        self.records
            .update(key, |r| {
                r.proposed_role_name = r.committed_role_name.clone();
                if let Some(snapshot) = r.snapshot.take() {
                    for (slot, saved) in [
                        (&mut r.ci_token, snapshot.ci_token),
                        (&mut r.webhook_secret, snapshot.webhook_secret),
                    ] {
                        slot.secret_id = saved.secret_id;
                        slot.secret_value = saved.secret_value;
                    }
                }
                r.show_integration_panel = false;
            })
            .ok_or_else(|| ImportError::unknown(key))
    }

    pub fn set_proposed_role_name(&self, key: &RepositoryKey, name: &str) -> ImportResult<()> {
        self.records
            .update(key, |r| r.proposed_role_name = name.to_string())
            .ok_or_else(|| ImportError::unknown(key))
    }

    pub fn set_secret_value(
        &self,
        key: &RepositoryKey,
        channel: SecretChannel,
        value: &str,
    ) -> ImportResult<()> {
        self.records
            .update(key, |r| r.secret_mut(channel).secret_value = value.to_string())
            .ok_or_else(|| ImportError::unknown(key))
    }

    /// Switch a channel between masked and plaintext display
    pub fn toggle_reveal(&self, key: &RepositoryKey, channel: SecretChannel) -> ImportResult<RevealMode> {
        self.records
            .update(key, |r| {
                let slot = r.secret_mut(channel);
                slot.reveal_mode = slot.reveal_mode.toggled();
                slot.reveal_mode
            })
            .ok_or_else(|| ImportError::unknown(key))
    }

    /// Empty a channel locally; the server copy is deleted on the next save
    pub fn clear_secret(&self, key: &RepositoryKey, channel: SecretChannel) -> ImportResult<()> {
        self.set_secret_value(key, channel, "")
    }

    /// Child token for a new poll of `key`. A poll still running for the same
    /// repository is superseded and stopped.
    fn poll_token(&self, key: &RepositoryKey) -> CancellationToken {
        let token = self.shutdown.child_token();
        let mut polls = self.polls.lock().unwrap_or_else(PoisonError::into_inner);
        polls.retain(|_, t| !t.is_cancelled());
        if let Some(previous) = polls.insert(key.clone(), token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Stop the running poll of `key`, if any
    fn stop_poll(&self, key: &RepositoryKey) -> bool {
        let token = self
            .polls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every poll and wait started by this orchestrator
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn record_failure(&self, key: &RepositoryKey, e: anyhow::Error) -> ImportError {
        let message = format!("{:#}", e);
        error!(owner = %key.owner, repo = %key.repo_name, error = %message, "Request failed");
        self.records.update(key, |r| r.last_error = Some(message.clone()));
        ImportError::Backend(e)
    }
}

impl<B> Drop for ImportOrchestrator<B> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
