//! reqwest implementation of the backend service traits

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{
    CurrentUser, DeletedRoles, ImportJob, ImportRequest, JobId, RemoteRepository, RepositoryList,
    SecretChannel, SecretRequest, SecretResponse,
};
use super::{ImportService, RepositoryService, RoleService, SecretService, UserService};

/// Talks to the backend's v1 REST API with a bearer token
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http_client: Client,
    backend_url: String,
    token: String,
}

impl HttpBackend {
    pub fn new(http_client: Client, backend_url: &str, token: &str) -> Self {
        Self {
            http_client,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.backend_url, path)
    }
}

/// Fail with status and body text unless the response is a success
async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        bail!("Failed to {} (status {}): {}", action, status, error_text);
    }
    Ok(response)
}

async fn parse_json<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
    let response = ensure_success(response, action).await?;
    response
        .json()
        .await
        .with_context(|| format!("Failed to parse response to {}", action))
}

#[async_trait]
impl UserService for HttpBackend {
    async fn current_user(&self) -> Result<CurrentUser> {
        let response = self
            .http_client
            .get(self.url("me/"))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to get current user")?;

        parse_json(response, "get current user").await
    }

    async fn refresh_current_user(&self) -> Result<CurrentUser> {
        debug!("Re-reading current user");
        self.current_user().await
    }
}

#[async_trait]
impl RepositoryService for HttpBackend {
    async fn list_repositories(&self) -> Result<Vec<RemoteRepository>> {
        let response = self
            .http_client
            .get(self.url("repos/list/"))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to list repositories")?;

        let list: RepositoryList = parse_json(response, "list repositories").await?;
        Ok(list.results)
    }

    async fn force_refresh(&self) -> Result<Vec<RemoteRepository>> {
        let response = self
            .http_client
            .get(self.url("repos/refresh/"))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to refresh repositories")?;

        parse_json(response, "refresh repositories").await
    }
}

#[async_trait]
impl RoleService for HttpBackend {
    async fn delete_role(&self, owner: &str, repo: &str) -> Result<DeletedRoles> {
        let url = format!(
            "{}?github_user={}&github_repo={}",
            self.url("removerole/"),
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        );

        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to delete role")?;

        parse_json(response, "delete role").await
    }
}

#[async_trait]
impl ImportService for HttpBackend {
    async fn submit_import(
        &self,
        owner: &str,
        repo: &str,
        alternate_name: Option<&str>,
    ) -> Result<ImportJob> {
        let payload = ImportRequest {
            github_user: owner.to_string(),
            github_repo: repo.to_string(),
            alternate_role_name: alternate_name.map(str::to_string),
        };

        let response = self
            .http_client
            .post(self.url("imports/"))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .context("Failed to submit import")?;

        parse_json(response, "submit import").await
    }

    async fn query_import(&self, job_id: JobId) -> Result<ImportJob> {
        let response = self
            .http_client
            .get(self.url(&format!("imports/{}/", job_id)))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to query import")?;

        parse_json(response, "query import").await
    }
}

#[async_trait]
impl SecretService for HttpBackend {
    async fn create_secret(
        &self,
        channel: SecretChannel,
        owner: &str,
        repo: &str,
        value: &str,
    ) -> Result<SecretResponse> {
        let payload = SecretRequest {
            source: channel,
            github_user: owner.to_string(),
            github_repo: repo.to_string(),
            secret: value.to_string(),
        };

        let response = self
            .http_client
            .post(self.url("notification_secrets/"))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .context("Failed to create secret")?;

        parse_json(response, "create secret").await
    }

    async fn update_secret(
        &self,
        id: i64,
        channel: SecretChannel,
        owner: &str,
        repo: &str,
        value: &str,
    ) -> Result<SecretResponse> {
        let payload = SecretRequest {
            source: channel,
            github_user: owner.to_string(),
            github_repo: repo.to_string(),
            secret: value.to_string(),
        };

        let response = self
            .http_client
            .put(self.url(&format!("notification_secrets/{}/", id)))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .context("Failed to update secret")?;

        parse_json(response, "update secret").await
    }

    async fn delete_secret(&self, id: i64) -> Result<()> {
        let response = self
            .http_client
            .delete(self.url(&format!("notification_secrets/{}/", id)))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to delete secret")?;

        ensure_success(response, "delete secret").await?;
        Ok(())
    }
}
