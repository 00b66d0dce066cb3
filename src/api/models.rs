//! Request/response types exchanged with the import backend
//!
//! Field names follow the backend's JSON (`github_user`, `github_repo`, ...);
//! the Rust side uses provider-neutral names.

use serde::{Deserialize, Serialize};

/// Identifier of an asynchronous import job
pub type JobId = i64;

/// Current user as reported by the session endpoint
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CurrentUser {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub username: Option<String>,
    /// Whether the user has linked a source-control account
    #[serde(default, rename = "connected_to_github")]
    pub linked_to_provider: bool,
    /// Whether the backend finished warming its per-user repository cache
    #[serde(default, rename = "cache_refreshed")]
    pub cache_ready: bool,
}

/// Import job state
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportState {
    Pending,
    Running,
    Success,
    Failed,
}

impl ImportState {
    /// No further transitions happen after a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Success | ImportState::Failed)
    }
}

impl std::fmt::Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportState::Pending => write!(f, "PENDING"),
            ImportState::Running => write!(f, "RUNNING"),
            ImportState::Success => write!(f, "SUCCESS"),
            ImportState::Failed => write!(f, "FAILED"),
        }
    }
}

/// The role created from a repository
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RoleSummary {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One of the two independent secret types tracked per repository
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretChannel {
    /// Continuous-integration notification token
    #[serde(rename = "travis")]
    CiToken,
    /// Source-control webhook secret
    #[serde(rename = "github")]
    WebhookSecret,
}

impl SecretChannel {
    pub const ALL: [SecretChannel; 2] = [SecretChannel::CiToken, SecretChannel::WebhookSecret];

    /// Wire name, also used to build analytics event names
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretChannel::CiToken => "travis",
            SecretChannel::WebhookSecret => "github",
        }
    }
}

impl std::fmt::Display for SecretChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret attached to a repository, tagged by channel
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SecretDescriptor {
    pub id: i64,
    pub source: SecretChannel,
    /// Usually masked by the server
    #[serde(default)]
    pub secret: String,
}

/// Repository as returned by the listing endpoints
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    #[serde(rename = "github_user")]
    pub owner: String,
    #[serde(rename = "github_repo")]
    pub repo_name: String,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleSummary>,
    #[serde(default)]
    pub notification_secrets: Vec<SecretDescriptor>,
}

/// Response from the repository list endpoint
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RepositoryList {
    #[serde(default)]
    pub results: Vec<RemoteRepository>,
}

/// Request body for submitting an import
#[derive(Debug, Serialize, Clone)]
pub struct ImportRequest {
    pub github_user: String,
    pub github_repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_role_name: Option<String>,
}

/// Status snapshot for one repository inside an import job
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ImportTaskResult {
    pub id: JobId,
    pub state: ImportState,
    #[serde(rename = "github_user")]
    pub owner: String,
    #[serde(rename = "github_repo")]
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleSummary>,
}

/// Response from the import submit and query endpoints
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ImportJob {
    pub id: JobId,
    #[serde(default)]
    pub results: Vec<ImportTaskResult>,
}

impl ImportJob {
    /// The status snapshot the job reports for its repository
    pub fn latest(&self) -> Option<&ImportTaskResult> {
        self.results.first()
    }
}

/// A role removed by the delete-role endpoint
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DeletedRole {
    #[serde(rename = "github_user")]
    pub owner: String,
    #[serde(rename = "github_repo")]
    pub repo_name: String,
}

/// Response from the delete-role endpoint
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DeletedRoles {
    #[serde(default)]
    pub deleted_roles: Vec<DeletedRole>,
}

/// Request body for creating or updating a secret
#[derive(Debug, Serialize, Clone)]
pub struct SecretRequest {
    pub source: SecretChannel,
    pub github_user: String,
    pub github_repo: String,
    pub secret: String,
}

/// Response from the secret create and update endpoints
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SecretResponse {
    pub id: i64,
    /// Value as stored by the server (possibly re-masked)
    #[serde(alias = "secret")]
    pub value: String,
}
