//! Client-side interface to the import backend.
//!
//! Each backend collaborator is a trait so the orchestrator can run against
//! the HTTP implementation in production and an in-memory fake in tests.

pub mod analytics;
pub mod http;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;

use self::models::{
    CurrentUser, DeletedRoles, ImportJob, JobId, RemoteRepository, SecretChannel, SecretResponse,
};

/// User/session service
#[async_trait]
pub trait UserService: Send + Sync {
    /// Fetch the current user once
    async fn current_user(&self) -> Result<CurrentUser>;

    /// Re-read the current user; polled while the repository cache warms up
    async fn refresh_current_user(&self) -> Result<CurrentUser>;
}

/// Repository listing service
#[async_trait]
pub trait RepositoryService: Send + Sync {
    /// Read the backend's cached repository list
    async fn list_repositories(&self) -> Result<Vec<RemoteRepository>>;

    /// Re-sync the repository list from the source-control provider
    async fn force_refresh(&self) -> Result<Vec<RemoteRepository>>;
}

/// Role service
#[async_trait]
pub trait RoleService: Send + Sync {
    /// Delete the role imported from `owner/repo`
    async fn delete_role(&self, owner: &str, repo: &str) -> Result<DeletedRoles>;
}

/// Import job service
#[async_trait]
pub trait ImportService: Send + Sync {
    /// Submit an import, optionally under an alternate role name
    async fn submit_import(
        &self,
        owner: &str,
        repo: &str,
        alternate_name: Option<&str>,
    ) -> Result<ImportJob>;

    /// Query the status of a submitted import
    async fn query_import(&self, job_id: JobId) -> Result<ImportJob>;
}

/// Secret service
#[async_trait]
pub trait SecretService: Send + Sync {
    async fn create_secret(
        &self,
        channel: SecretChannel,
        owner: &str,
        repo: &str,
        value: &str,
    ) -> Result<SecretResponse>;

    async fn update_secret(
        &self,
        id: i64,
        channel: SecretChannel,
        owner: &str,
        repo: &str,
        value: &str,
    ) -> Result<SecretResponse>;

    async fn delete_secret(&self, id: i64) -> Result<()>;
}

/// Everything the orchestrator needs from the backend
pub trait ImportBackend:
    UserService + RepositoryService + RoleService + ImportService + SecretService
{
}

impl<T> ImportBackend for T where
    T: UserService + RepositoryService + RoleService + ImportService + SecretService
{
}
