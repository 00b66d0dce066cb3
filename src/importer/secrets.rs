//! Reconciles a repository's secret channels with the secret service

use tracing::{debug, warn};

use crate::api::analytics::AnalyticsSink;
use crate::api::models::SecretChannel;
use crate::api::SecretService;

use super::record::{RepositoryCollection, RepositoryKey, SecretSlot};

/// Displayed in place of a stored secret; never sent as secret content
pub const MASKED_PLACEHOLDER: &str = "******";

/// A value starting with the masked placeholder means "unchanged"
pub fn is_masked_placeholder(value: &str) -> bool {
    value.starts_with(MASKED_PLACEHOLDER)
}

/// What a secret channel needs on the next save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretAction {
    Unchanged,
    Create,
    Update,
    Delete,
}

impl SecretAction {
    /// Exactly one action applies to every slot
    pub fn classify(slot: &SecretSlot) -> Self {
        let has_value = !slot.secret_value.is_empty();
        let is_new_content = has_value && !is_masked_placeholder(&slot.secret_value);

        match (slot.secret_id.is_some(), has_value) {
            (true, false) => SecretAction::Delete,
            (true, true) if is_new_content => SecretAction::Update,
            (false, _) if is_new_content => SecretAction::Create,
            _ => SecretAction::Unchanged,
        }
    }

    fn event_verb(&self) -> Option<&'static str> {
        match self {
            SecretAction::Unchanged => None,
            SecretAction::Create => Some("add"),
            SecretAction::Update => Some("change"),
            SecretAction::Delete => Some("remove"),
        }
    }

    /// Analytics event name, e.g. `remove_travis`
    pub fn event_name(&self, channel: SecretChannel) -> Option<String> {
        self.event_verb()
            .map(|verb| format!("{}_{}", verb, channel.as_str()))
    }
}

/// Result of reconciling one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretOutcome {
    pub channel: SecretChannel,
    pub action: SecretAction,
    /// Set when the request for this channel failed
    pub error: Option<String>,
}

impl SecretOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Bring both secret channels of `key` in line with the local edits.
///
/// Channels are handled one after the other and independently: a failure
/// on one is recorded on the record and in its outcome, and the other
/// channel is still attempted. Returns an empty list for unknown keys.
pub async fn reconcile_secrets(
    secrets: &dyn SecretService,
    analytics: &dyn AnalyticsSink,
    records: &RepositoryCollection,
    key: &RepositoryKey,
) -> Vec<SecretOutcome> {
    let mut outcomes = Vec::with_capacity(SecretChannel::ALL.len());

    for channel in SecretChannel::ALL {
        let Some(slot) = records.update(key, |r| r.secret(channel).clone()) else {
            return outcomes;
        };

        let action = SecretAction::classify(&slot);
        let error = match reconcile_channel(secrets, records, key, channel, action, &slot).await {
            Ok(()) => {
                if let Some(event) = action.event_name(channel) {
                    analytics.track(&event, &key.to_string());
                }
                None
            }
            Err(e) => {
                warn!(
                    owner = %key.owner,
                    repo = %key.repo_name,
                    channel = %channel,
                    error = %e,
                    "Failed to sync secret"
                );
                let message = format!("{:#}", e);
                records.update(key, |r| r.last_error = Some(message.clone()));
                Some(message)
            }
        };

        outcomes.push(SecretOutcome {
            channel,
            action,
            error,
        });
    }

    outcomes
}

async fn reconcile_channel(
    secrets: &dyn SecretService,
    records: &RepositoryCollection,
    key: &RepositoryKey,
    channel: SecretChannel,
    action: SecretAction,
    slot: &SecretSlot,
) -> anyhow::Result<()> {
    match (action, slot.secret_id) {
        (SecretAction::Delete, Some(id)) => {
            secrets.delete_secret(id).await?;
            records.update(key, |r| r.secret_mut(channel).secret_id = None);
        }
        (SecretAction::Update, Some(id)) => {
            let response = secrets
                .update_secret(id, channel, &key.owner, &key.repo_name, &slot.secret_value)
                .await?;
            records.update(key, |r| r.secret_mut(channel).secret_value = response.value);
        }
        (SecretAction::Create, _) => {
            let response = secrets
                .create_secret(channel, &key.owner, &key.repo_name, &slot.secret_value)
                .await?;
            records.update(key, |r| {
                let slot = r.secret_mut(channel);
                slot.secret_id = Some(response.id);
                slot.secret_value = response.value;
            });
        }
        _ => {
            debug!(channel = %channel, "Secret unchanged");
        }
    }
    Ok(())
}
