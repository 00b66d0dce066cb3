use anyhow::{bail, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Color, Table};
use futures::future::join_all;
use tracing::info;

use role_import::api::models::{ImportState, SecretChannel};
use role_import::api::ImportBackend;
use role_import::importer::{
    ImportOrchestrator, RepositoryKey, RepositoryRecord, RevealMode, SecretAction, SecretSlot,
    MASKED_PLACEHOLDER,
};

/// Edits applied by `repos settings` before saving
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SettingsArgs {
    /// New role name
    #[arg(long)]
    pub name: Option<String>,
    /// Continuous-integration notification token
    #[arg(long, conflicts_with = "clear_ci_token")]
    pub ci_token: Option<String>,
    /// Remove the stored CI token
    #[arg(long)]
    pub clear_ci_token: bool,
    /// Webhook secret
    #[arg(long, conflicts_with = "clear_webhook_secret")]
    pub webhook_secret: Option<String>,
    /// Remove the stored webhook secret
    #[arg(long)]
    pub clear_webhook_secret: bool,
    /// Show secret values in plain text
    #[arg(long)]
    pub show_secrets: bool,
}

pub fn parse_key(s: &str) -> Result<RepositoryKey> {
    match RepositoryKey::parse(s) {
        Some(key) => Ok(key),
        None => bail!("Invalid repository '{}'. Use OWNER/REPO", s),
    }
}

fn display_secret(slot: &SecretSlot) -> String {
    if slot.secret_value.is_empty() {
        return "-".to_string();
    }
    match slot.reveal_mode {
        RevealMode::Masked => MASKED_PLACEHOLDER.to_string(),
        RevealMode::Plaintext => slot.secret_value.clone(),
    }
}

fn state_cell(state: Option<ImportState>) -> Cell {
    match state {
        Some(ImportState::Success) => Cell::new("SUCCESS").fg(Color::Green),
        Some(ImportState::Failed) => Cell::new("FAILED").fg(Color::Red),
        Some(state) => Cell::new(state.to_string()).fg(Color::Yellow),
        None => Cell::new("-"),
    }
}

pub fn print_records(records: &[RepositoryRecord]) {
    if records.is_empty() {
        println!("No repositories found");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("REPOSITORY").add_attribute(Attribute::Bold),
            Cell::new("ROLE").add_attribute(Attribute::Bold),
            Cell::new("ENABLED").add_attribute(Attribute::Bold),
            Cell::new("IMPORT").add_attribute(Attribute::Bold),
            Cell::new("CI TOKEN").add_attribute(Attribute::Bold),
            Cell::new("WEBHOOK SECRET").add_attribute(Attribute::Bold),
            Cell::new("ERROR").add_attribute(Attribute::Bold),
        ]);

    for record in records {
        let role = match &record.role_namespace {
            Some(namespace) => format!("{}.{}", namespace, record.committed_role_name),
            None => record.committed_role_name.clone(),
        };
        let error_cell = match &record.last_error {
            Some(error) => Cell::new(error).fg(Color::Red),
            None => Cell::new("-"),
        };

        table.add_row(vec![
            Cell::new(record.key().to_string()),
            Cell::new(role),
            Cell::new(if record.is_enabled { "yes" } else { "no" }),
            state_cell(record.import_state),
            Cell::new(display_secret(&record.ci_token)),
            Cell::new(display_secret(&record.webhook_secret)),
            error_cell,
        ]);
    }

    println!("{}", table);
}

pub fn list<B: ImportBackend + 'static>(orchestrator: &ImportOrchestrator<B>) {
    print_records(&orchestrator.records());
}

pub async fn refresh<B: ImportBackend + 'static>(orchestrator: &ImportOrchestrator<B>) -> Result<()> {
    orchestrator.refresh_repositories().await?;
    print_records(&orchestrator.records());
    Ok(())
}

pub async fn import<B: ImportBackend + 'static>(
    orchestrator: &ImportOrchestrator<B>,
    keys: &[RepositoryKey],
) -> Result<()> {
    let mut handles = Vec::with_capacity(keys.len());
    for key in keys {
        let handle = orchestrator.import_repository(key).await?;
        println!("Import job {} started for '{}'", handle.job_id(), key);
        handles.push(handle);
    }

    println!("Waiting for {} import job(s)...", handles.len());
    let results = join_all(handles.into_iter().map(|h| h.wait_for_success())).await;

    let records: Vec<RepositoryRecord> = keys.iter().filter_map(|k| orchestrator.record(k)).collect();
    print_records(&records);

    let mut failed = 0;
    for (key, result) in keys.iter().zip(results) {
        match result {
            Ok(()) => println!("✓ Imported '{}'", key),
            Err(e) => {
                eprintln!("✗ Import of '{}' did not succeed: {}", key, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} imports failed", failed, keys.len());
    }
    Ok(())
}

pub async fn toggle<B: ImportBackend + 'static>(
    orchestrator: &ImportOrchestrator<B>,
    key: &RepositoryKey,
) -> Result<()> {
    match orchestrator.toggle_repository(key).await? {
        Some(handle) => {
            println!("Import job {} started for '{}', waiting...", handle.job_id(), key);
            handle.wait_for_success().await?;
            println!("✓ Enabled and imported '{}'", key);
        }
        None => println!("✓ Disabled '{}'", key),
    }

    if let Some(record) = orchestrator.record(key) {
        print_records(std::slice::from_ref(&record));
    }
    Ok(())
}

pub async fn settings<B: ImportBackend + 'static>(
    orchestrator: &ImportOrchestrator<B>,
    key: &RepositoryKey,
    args: &SettingsArgs,
) -> Result<()> {
    orchestrator.open_integration_panel(key)?;

    if let Some(name) = &args.name {
        orchestrator.set_proposed_role_name(key, name)?;
    }
    for (channel, value, clear) in [
        (SecretChannel::CiToken, &args.ci_token, args.clear_ci_token),
        (SecretChannel::WebhookSecret, &args.webhook_secret, args.clear_webhook_secret),
    ] {
        if clear {
            orchestrator.clear_secret(key, channel)?;
        } else if let Some(value) = value {
            orchestrator.set_secret_value(key, channel, value)?;
        }
    }

    let report = orchestrator.save_settings(key).await?;
    if let Some(state) = report.rename {
        info!("Rename job finished with state {}", state);
    }

    for outcome in &report.secrets {
        match (&outcome.error, outcome.action) {
            (Some(error), _) => eprintln!("✗ Failed to sync {} secret: {}", outcome.channel, error),
            (None, SecretAction::Unchanged) => {}
            (None, action) => println!("✓ {:?} {} secret", action, outcome.channel),
        }
    }

    if args.show_secrets {
        for channel in SecretChannel::ALL {
            orchestrator.toggle_reveal(key, channel)?;
        }
    }
    if let Some(record) = orchestrator.record(key) {
        print_records(std::slice::from_ref(&record));
    }

    if report.secrets_failed() {
        bail!("Some secrets could not be saved for '{}'", key);
    }
    Ok(())
}
