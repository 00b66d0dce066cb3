//! Import lifecycle orchestration
//!
//! The [`ImportOrchestrator`] owns the repository records and sequences
//! calls to the cache-warm waiter, the job poller and the secret
//! reconciler.

mod cache_wait;
mod error;
mod naming;
mod orchestrator;
mod poller;
mod record;
mod secrets;

pub use cache_wait::CacheWarmWaiter;
pub use error::{ImportError, ImportResult};
pub use naming::{derive_role_name, ORGANIZATION_TOKEN};
pub use orchestrator::{ImportOrchestrator, PageStatus, SaveReport};
pub use poller::{JobPoller, PollHandle, PollPhase};
pub use record::{
    PanelSnapshot, RepositoryCollection, RepositoryKey, RepositoryRecord, RevealMode, SecretSlot,
};
pub use secrets::{
    is_masked_placeholder, reconcile_secrets, SecretAction, SecretOutcome, MASKED_PLACEHOLDER,
};
