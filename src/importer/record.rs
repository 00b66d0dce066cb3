//! Repository records and the shared collection they live in

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::models::{
    DeletedRole, ImportState, ImportTaskResult, RemoteRepository, SecretChannel,
};

use super::naming::derive_role_name;

/// Stable external key of a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryKey {
    pub owner: String,
    pub repo_name: String,
}

impl RepositoryKey {
    pub fn new(owner: impl Into<String>, repo_name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo_name: repo_name.into(),
        }
    }

    /// Parse `owner/repo`
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, repo) = s.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(owner, repo))
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo_name)
    }
}

/// How a secret value is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevealMode {
    #[default]
    Masked,
    Plaintext,
}

impl RevealMode {
    pub fn toggled(self) -> Self {
        match self {
            RevealMode::Masked => RevealMode::Plaintext,
            RevealMode::Plaintext => RevealMode::Masked,
        }
    }
}

/// Local state of one secret channel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecretSlot {
    pub secret_id: Option<i64>,
    pub secret_value: String,
    pub reveal_mode: RevealMode,
}

/// Name and secrets captured when the integration panel opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSnapshot {
    pub ci_token: SecretSlot,
    pub webhook_secret: SecretSlot,
}

/// Normalized view of one importable repository plus its editable fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub owner: String,
    pub repo_name: String,
    /// Editable role name
    pub proposed_role_name: String,
    /// Last role name sent to or received from the server
    pub committed_role_name: String,
    pub is_enabled: bool,
    pub import_state: Option<ImportState>,
    pub role_id: Option<i64>,
    pub role_namespace: Option<String>,
    pub ci_token: SecretSlot,
    pub webhook_secret: SecretSlot,
    pub show_integration_panel: bool,
    pub snapshot: Option<PanelSnapshot>,
    /// Message of the last failed request for this repository
    pub last_error: Option<String>,
}

impl RepositoryRecord {
    /// Shape a record from a listing entry
    pub fn from_remote(remote: &RemoteRepository) -> Self {
        let mut record = Self {
            owner: remote.owner.clone(),
            repo_name: remote.repo_name.clone(),
            proposed_role_name: String::new(),
            committed_role_name: String::new(),
            is_enabled: remote.is_enabled,
            import_state: None,
            role_id: None,
            role_namespace: None,
            ci_token: SecretSlot::default(),
            webhook_secret: SecretSlot::default(),
            show_integration_panel: false,
            snapshot: None,
            last_error: None,
        };

        for descriptor in &remote.notification_secrets {
            let slot = record.secret_mut(descriptor.source);
            slot.secret_id = Some(descriptor.id);
            slot.secret_value = descriptor.secret.clone();
        }

        match &remote.role {
            Some(role) => {
                record.proposed_role_name = role.name.clone();
                record.committed_role_name = role.name.clone();
                record.role_id = Some(role.id);
                record.role_namespace = role.namespace.clone();
            }
            None => {
                let name = derive_role_name(&remote.repo_name);
                record.committed_role_name = name.clone();
                record.proposed_role_name = name;
            }
        }

        record
    }

    pub fn key(&self) -> RepositoryKey {
        RepositoryKey::new(&self.owner, &self.repo_name)
    }

    pub fn matches(&self, owner: &str, repo_name: &str) -> bool {
        self.owner == owner && self.repo_name == repo_name
    }

    /// Analytics category, `owner/repo`
    pub fn category(&self) -> String {
        format!("{}/{}", self.owner, self.repo_name)
    }

    pub fn secret(&self, channel: SecretChannel) -> &SecretSlot {
        match channel {
            SecretChannel::CiToken => &self.ci_token,
            SecretChannel::WebhookSecret => &self.webhook_secret,
        }
    }

    pub fn secret_mut(&mut self, channel: SecretChannel) -> &mut SecretSlot {
        match channel {
            SecretChannel::CiToken => &mut self.ci_token,
            SecretChannel::WebhookSecret => &mut self.webhook_secret,
        }
    }

    pub fn has_pending_rename(&self) -> bool {
        self.proposed_role_name != self.committed_role_name
    }

    /// Copy a job status snapshot into the record
    pub fn apply_task_result(&mut self, result: &ImportTaskResult) {
        self.import_state = Some(result.state);
        if let Some(role) = &result.role {
            self.role_id = Some(role.id);
            self.role_namespace = role.namespace.clone();
        }
    }

    /// Keep local-only state from `previous` when the server list is re-read
    fn carry_local_state(&mut self, previous: &RepositoryRecord) {
        self.import_state = previous.import_state;
        self.last_error = previous.last_error.clone();
        self.ci_token.reveal_mode = previous.ci_token.reveal_mode;
        self.webhook_secret.reveal_mode = previous.webhook_secret.reveal_mode;

        // An open panel or a save in flight holds unsaved edits
        if previous.show_integration_panel || previous.snapshot.is_some() {
            self.proposed_role_name = previous.proposed_role_name.clone();
            self.committed_role_name = previous.committed_role_name.clone();
            self.ci_token = previous.ci_token.clone();
            self.webhook_secret = previous.webhook_secret.clone();
            self.show_integration_panel = previous.show_integration_panel;
            self.snapshot = previous.snapshot.clone();
        }
    }
}

/// Repository records shared between the orchestrator and its pollers.
///
/// Every access takes the lock for the duration of one synchronous update;
/// the lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct RepositoryCollection {
    inner: Arc<Mutex<Vec<RepositoryRecord>>>,
}

impl RepositoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RepositoryRecord>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Copy of every record, in listing order
    pub fn snapshot(&self) -> Vec<RepositoryRecord> {
        self.lock().clone()
    }

    pub fn get(&self, key: &RepositoryKey) -> Option<RepositoryRecord> {
        self.lock()
            .iter()
            .find(|r| r.matches(&key.owner, &key.repo_name))
            .cloned()
    }

    /// Run `f` against the record for `key`, if present
    pub fn update<R>(
        &self,
        key: &RepositoryKey,
        f: impl FnOnce(&mut RepositoryRecord) -> R,
    ) -> Option<R> {
        let mut records = self.lock();
        records
            .iter_mut()
            .find(|r| r.matches(&key.owner, &key.repo_name))
            .map(f)
    }

    /// Shape and merge a fetched list.
    ///
    /// Known records keep their job state and any unsaved panel edits;
    /// records missing from `remote` stay in the collection.
    pub fn merge(&self, remote: &[RemoteRepository]) {
        let mut records = self.lock();
        let mut merged: Vec<RepositoryRecord> = Vec::with_capacity(remote.len());

        for entry in remote {
            let mut record = RepositoryRecord::from_remote(entry);
            if let Some(previous) = records
                .iter()
                .find(|r| r.matches(&entry.owner, &entry.repo_name))
            {
                record.carry_local_state(previous);
            }
            merged.push(record);
        }

        for previous in records.drain(..) {
            if !merged
                .iter()
                .any(|r| r.matches(&previous.owner, &previous.repo_name))
            {
                merged.push(previous);
            }
        }

        *records = merged;
    }

    /// Copy a job status into the first record matching its owner and repo.
    /// Returns false when no record matches.
    pub fn apply_job_result(&self, result: &ImportTaskResult) -> bool {
        self.apply_job_result_if(result, || true)
    }

    /// Like [`apply_job_result`](Self::apply_job_result), but writes only if
    /// `is_live` still holds once the lock is taken
    pub fn apply_job_result_if(
        &self,
        result: &ImportTaskResult,
        is_live: impl FnOnce() -> bool,
    ) -> bool {
        let mut records = self.lock();
        if !is_live() {
            return false;
        }
        match records
            .iter_mut()
            .find(|r| r.matches(&result.owner, &result.repo_name))
        {
            Some(record) => {
                record.apply_task_result(result);
                true
            }
            None => false,
        }
    }

    /// Clear the import of every record whose owner and repo match a
    /// deleted role. Returns the number of records cleared.
    pub fn clear_deleted(&self, deleted: &[DeletedRole]) -> usize {
        let mut records = self.lock();
        let mut cleared = 0;
        for record in records.iter_mut() {
            if deleted
                .iter()
                .any(|d| record.matches(&d.owner, &d.repo_name))
            {
                record.import_state = None;
                record.role_id = None;
                cleared += 1;
            }
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{RoleSummary, SecretDescriptor};

    fn remote(owner: &str, repo: &str) -> RemoteRepository {
        RemoteRepository {
            owner: owner.to_string(),
            repo_name: repo.to_string(),
            is_enabled: false,
            role: None,
            notification_secrets: Vec::new(),
        }
    }

    #[test]
    fn test_shaping_without_role_derives_name() {
        let record = RepositoryRecord::from_remote(&remote("alice", "ansible-role-nginx"));

        assert_eq!(record.proposed_role_name, "nginx");
        assert_eq!(record.committed_role_name, "nginx");
        assert!(!record.has_pending_rename());
        assert_eq!(record.ci_token.reveal_mode, RevealMode::Masked);
        assert_eq!(record.webhook_secret.reveal_mode, RevealMode::Masked);
        assert_eq!(record.role_id, None);
    }

    #[test]
    fn test_shaping_with_role_copies_role_fields() {
        let mut entry = remote("alice", "ansible-role-nginx");
        entry.role = Some(RoleSummary {
            id: 11,
            name: "web".into(),
            namespace: Some("alice".into()),
        });

        let record = RepositoryRecord::from_remote(&entry);

        assert_eq!(record.proposed_role_name, "web");
        assert_eq!(record.committed_role_name, "web");
        assert_eq!(record.role_id, Some(11));
        assert_eq!(record.role_namespace.as_deref(), Some("alice"));
    }

    #[test]
    fn test_shaping_routes_secrets_by_channel() {
        let mut entry = remote("alice", "repo");
        entry.notification_secrets = vec![
            SecretDescriptor {
                id: 1,
                source: SecretChannel::WebhookSecret,
                secret: "******hook".into(),
            },
            SecretDescriptor {
                id: 2,
                source: SecretChannel::CiToken,
                secret: "******ci".into(),
            },
        ];

        let record = RepositoryRecord::from_remote(&entry);

        assert_eq!(record.webhook_secret.secret_id, Some(1));
        assert_eq!(record.webhook_secret.secret_value, "******hook");
        assert_eq!(record.ci_token.secret_id, Some(2));
    }

    #[test]
    fn test_apply_job_result_updates_first_match_only() {
        let collection = RepositoryCollection::new();
        collection.merge(&[remote("alice", "a"), remote("alice", "b")]);

        let applied = collection.apply_job_result(&ImportTaskResult {
            id: 1,
            state: ImportState::Success,
            owner: "alice".into(),
            repo_name: "b".into(),
            role: Some(RoleSummary {
                id: 9,
                name: "b".into(),
                namespace: None,
            }),
        });

        assert!(applied);
        let records = collection.snapshot();
        assert_eq!(records[0].import_state, None);
        assert_eq!(records[1].import_state, Some(ImportState::Success));
        assert_eq!(records[1].role_id, Some(9));
    }

    #[test]
    fn test_apply_job_result_for_unknown_repository_is_dropped() {
        let collection = RepositoryCollection::new();
        collection.merge(&[remote("alice", "a")]);

        let applied = collection.apply_job_result(&ImportTaskResult {
            id: 1,
            state: ImportState::Failed,
            owner: "bob".into(),
            repo_name: "a".into(),
            role: None,
        });

        assert!(!applied);
        assert_eq!(collection.snapshot()[0].import_state, None);
    }

    #[test]
    fn test_apply_job_result_skipped_once_no_longer_live() {
        let collection = RepositoryCollection::new();
        collection.merge(&[remote("alice", "a")]);

        let applied = collection.apply_job_result_if(
            &ImportTaskResult {
                id: 1,
                state: ImportState::Success,
                owner: "alice".into(),
                repo_name: "a".into(),
                role: None,
            },
            || false,
        );

        assert!(!applied);
        assert_eq!(collection.snapshot()[0].import_state, None);
    }

    #[test]
    fn test_merge_keeps_open_panel_edits_and_missing_records() {
        let collection = RepositoryCollection::new();
        collection.merge(&[remote("alice", "a"), remote("alice", "gone")]);
        collection.update(&RepositoryKey::new("alice", "a"), |r| {
            r.show_integration_panel = true;
            r.proposed_role_name = "edited".into();
            r.import_state = Some(ImportState::Pending);
        });

        collection.merge(&[remote("alice", "a")]);

        let records = collection.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].proposed_role_name, "edited");
        assert_eq!(records[0].import_state, Some(ImportState::Pending));
        assert_eq!(records[1].repo_name, "gone");
    }

    #[test]
    fn test_clear_deleted_requires_owner_and_repo_match() {
        let collection = RepositoryCollection::new();
        collection.merge(&[remote("alice", "a"), remote("bob", "a")]);
        for key in [RepositoryKey::new("alice", "a"), RepositoryKey::new("bob", "a")] {
            collection.update(&key, |r| r.import_state = Some(ImportState::Success));
        }

        let cleared = collection.clear_deleted(&[DeletedRole {
            owner: "bob".into(),
            repo_name: "a".into(),
        }]);

        assert_eq!(cleared, 1);
        let records = collection.snapshot();
        assert_eq!(records[0].import_state, Some(ImportState::Success));
        assert_eq!(records[1].import_state, None);
    }

    #[test]
    fn test_repository_key_parse() {
        assert_eq!(
            RepositoryKey::parse("alice/repo"),
            Some(RepositoryKey::new("alice", "repo"))
        );
        assert_eq!(RepositoryKey::parse("alice"), None);
        assert_eq!(RepositoryKey::parse("/repo"), None);
        assert_eq!(RepositoryKey::parse("a/b/c"), None);
    }
}
