use crate::api::models::JobId;

use super::record::RepositoryKey;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The user is not signed in or has not linked a source-control account
    #[error("Authorization required: sign in and link a source-control account")]
    AuthorizationRequired,

    #[error("Unknown repository '{owner}/{repo}'")]
    UnknownRepository { owner: String, repo: String },

    #[error("Repository '{owner}/{repo}' is not enabled for import")]
    NotEnabled { owner: String, repo: String },

    #[error("A repository refresh is already in progress")]
    RefreshInProgress,

    #[error("Import job {job_id} failed")]
    JobFailed { job_id: JobId },

    #[error("Gave up polling import job {job_id} after {attempts} failed requests")]
    PollAborted { job_id: JobId, attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl ImportError {
    pub(crate) fn unknown(key: &RepositoryKey) -> Self {
        ImportError::UnknownRepository {
            owner: key.owner.clone(),
            repo: key.repo_name.clone(),
        }
    }

    pub(crate) fn not_enabled(key: &RepositoryKey) -> Self {
        ImportError::NotEnabled {
            owner: key.owner.clone(),
            repo: key.repo_name.clone(),
        }
    }
}

pub type ImportResult<T> = std::result::Result<T, ImportError>;
