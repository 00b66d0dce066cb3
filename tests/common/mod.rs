//! In-memory backend used by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use role_import::api::analytics::AnalyticsSink;
use role_import::api::models::{
    CurrentUser, DeletedRole, DeletedRoles, ImportJob, ImportState, ImportTaskResult, JobId,
    RemoteRepository, RoleSummary, SecretChannel, SecretDescriptor, SecretResponse,
};
use role_import::api::{ImportService, RepositoryService, RoleService, SecretService, UserService};
use role_import::{ImportOrchestrator, Settings};

#[derive(Default)]
pub struct FakeState {
    pub user: CurrentUser,
    /// Answers to `refresh_current_user`, the last one repeats
    pub user_refreshes: VecDeque<CurrentUser>,
    /// Answers to `list_repositories`; falls back to `repositories`
    pub list_responses: VecDeque<Vec<RemoteRepository>>,
    pub repositories: Vec<RemoteRepository>,
    pub refreshed: Vec<RemoteRepository>,
    pub refresh_delay: Option<Duration>,
    pub fail_refresh: bool,
    pub deleted_roles: Vec<DeletedRole>,
    pub fail_delete_role: bool,
    /// States reported by successive `query_import` calls
    pub job_states: VecDeque<ImportState>,
    /// Report every job against this owner/repo instead of the submitted one
    pub job_target_override: Option<(String, String)>,
    pub fail_submit: bool,
    pub query_failures: u32,
    pub failing_secret_channels: Vec<SecretChannel>,
    pub next_id: i64,
    pub jobs: HashMap<JobId, (String, String, Option<String>)>,
    pub calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    pub state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(setup: impl FnOnce(&mut FakeState)) -> Arc<Self> {
        let mut state = FakeState {
            user: ready_user(),
            next_id: 1,
            ..Default::default()
        };
        setup(&mut state);
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }

    fn next_id(state: &mut FakeState) -> i64 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    fn job(state: &FakeState, id: JobId, job_state: ImportState) -> ImportJob {
        let (owner, repo, name) = state.jobs.get(&id).cloned().unwrap_or_default();
        let (owner, repo) = state
            .job_target_override
            .clone()
            .unwrap_or((owner, repo));
        let role = (job_state == ImportState::Success).then(|| RoleSummary {
            id: 100 + id,
            name: name.unwrap_or_else(|| repo.clone()),
            namespace: Some(owner.clone()),
        });

        ImportJob {
            id,
            results: vec![ImportTaskResult {
                id,
                state: job_state,
                owner,
                repo_name: repo,
                role,
            }],
        }
    }
}

#[async_trait]
impl UserService for FakeBackend {
    async fn current_user(&self) -> Result<CurrentUser> {
        Ok(self.with(|s| {
            s.calls.push("current_user".into());
            s.user.clone()
        }))
    }

    async fn refresh_current_user(&self) -> Result<CurrentUser> {
        Ok(self.with(|s| {
            s.calls.push("refresh_current_user".into());
            if s.user_refreshes.len() > 1 {
                s.user_refreshes.pop_front().unwrap()
            } else {
                s.user_refreshes.front().cloned().unwrap_or_else(|| s.user.clone())
            }
        }))
    }
}

#[async_trait]
impl RepositoryService for FakeBackend {
    async fn list_repositories(&self) -> Result<Vec<RemoteRepository>> {
        Ok(self.with(|s| {
            s.calls.push("list_repositories".into());
            s.list_responses
                .pop_front()
                .unwrap_or_else(|| s.repositories.clone())
        }))
    }

    async fn force_refresh(&self) -> Result<Vec<RemoteRepository>> {
        let delay = self.with(|s| {
            s.calls.push("force_refresh".into());
            s.refresh_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let (fail, refreshed) = self.with(|s| (s.fail_refresh, s.refreshed.clone()));
        if fail {
            bail!("refresh failed");
        }
        Ok(refreshed)
    }
}

#[async_trait]
impl RoleService for FakeBackend {
    async fn delete_role(&self, owner: &str, repo: &str) -> Result<DeletedRoles> {
        self.with(|s| {
            s.calls.push(format!("delete_role:{}/{}", owner, repo));
            if s.fail_delete_role {
                bail!("delete failed");
            }
            Ok(DeletedRoles {
                deleted_roles: s.deleted_roles.clone(),
            })
        })
    }
}

#[async_trait]
impl ImportService for FakeBackend {
    async fn submit_import(
        &self,
        owner: &str,
        repo: &str,
        alternate_name: Option<&str>,
    ) -> Result<ImportJob> {
        self.with(|s| {
            s.calls.push(format!(
                "submit_import:{}/{}:{}",
                owner,
                repo,
                alternate_name.unwrap_or("-")
            ));
            if s.fail_submit {
                bail!("submit failed");
            }
            let id = Self::next_id(s);
            s.jobs.insert(
                id,
                (owner.to_string(), repo.to_string(), alternate_name.map(str::to_string)),
            );
            Ok(Self::job(s, id, ImportState::Pending))
        })
    }

    async fn query_import(&self, job_id: JobId) -> Result<ImportJob> {
        self.with(|s| {
            if s.query_failures > 0 {
                s.query_failures -= 1;
                s.calls.push(format!("query_import_failed:{}", job_id));
                bail!("query failed");
            }
            let state = s.job_states.pop_front().unwrap_or(ImportState::Pending);
            s.calls.push(format!("query_import:{}:{}", job_id, state));
            Ok(Self::job(s, job_id, state))
        })
    }
}

#[async_trait]
impl SecretService for FakeBackend {
    async fn create_secret(
        &self,
        channel: SecretChannel,
        owner: &str,
        repo: &str,
        value: &str,
    ) -> Result<SecretResponse> {
        self.with(|s| {
            s.calls
                .push(format!("create_secret:{}:{}/{}:{}", channel, owner, repo, value));
            if s.failing_secret_channels.contains(&channel) {
                bail!("secret service unavailable");
            }
            let id = Self::next_id(s);
            Ok(SecretResponse {
                id,
                value: format!("******{}", id),
            })
        })
    }

    async fn update_secret(
        &self,
        id: i64,
        channel: SecretChannel,
        owner: &str,
        repo: &str,
        value: &str,
    ) -> Result<SecretResponse> {
        self.with(|s| {
            s.calls.push(format!(
                "update_secret:{}:{}:{}/{}:{}",
                id, channel, owner, repo, value
            ));
            if s.failing_secret_channels.contains(&channel) {
                bail!("secret service unavailable");
            }
            Ok(SecretResponse {
                id,
                value: "******".to_string(),
            })
        })
    }

    async fn delete_secret(&self, id: i64) -> Result<()> {
        self.with(|s| {
            s.calls.push(format!("delete_secret:{}", id));
            Ok(())
        })
    }
}

/// Collects analytics events
#[derive(Default)]
pub struct RecordingAnalytics {
    pub events: Mutex<Vec<(String, String)>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().unwrap().clone()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn track(&self, event: &str, category: &str) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), category.to_string()));
    }
}

pub fn ready_user() -> CurrentUser {
    CurrentUser {
        authenticated: true,
        username: Some("alice".into()),
        linked_to_provider: true,
        cache_ready: true,
    }
}

pub fn repo(owner: &str, name: &str, enabled: bool) -> RemoteRepository {
    RemoteRepository {
        owner: owner.to_string(),
        repo_name: name.to_string(),
        is_enabled: enabled,
        role: None,
        notification_secrets: Vec::new(),
    }
}

pub fn with_secret(
    mut repository: RemoteRepository,
    id: i64,
    channel: SecretChannel,
) -> RemoteRepository {
    repository.notification_secrets.push(SecretDescriptor {
        id,
        source: channel,
        secret: "******".into(),
    });
    repository
}

pub fn orchestrator(
    backend: &Arc<FakeBackend>,
    analytics: &Arc<RecordingAnalytics>,
) -> ImportOrchestrator<FakeBackend> {
    orchestrator_with(backend, analytics, Settings::default())
}

pub fn orchestrator_with(
    backend: &Arc<FakeBackend>,
    analytics: &Arc<RecordingAnalytics>,
    settings: Settings,
) -> ImportOrchestrator<FakeBackend> {
    let analytics: Arc<dyn AnalyticsSink> = analytics.clone();
    ImportOrchestrator::new(backend.clone(), analytics, settings)
}

/// Orchestrator with the repositories already loaded
pub async fn ready_orchestrator(
    repositories: Vec<RemoteRepository>,
    setup: impl FnOnce(&mut FakeState),
) -> (Arc<FakeBackend>, Arc<RecordingAnalytics>, ImportOrchestrator<FakeBackend>) {
    let backend = FakeBackend::new(|s| {
        s.repositories = repositories;
        setup(s);
    });
    let analytics = Arc::new(RecordingAnalytics::default());
    let orchestrator = orchestrator(&backend, &analytics);
    orchestrator.initialize().await.unwrap();
    (backend, analytics, orchestrator)
}
