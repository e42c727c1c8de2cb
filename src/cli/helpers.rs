//! Shared helper functions for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use taxaharvest::config::{Config, Settings};
use taxaharvest::fetch::build_fetcher;
use taxaharvest::harvest::{BatchScheduler, HarvestParts, Harvester};
use taxaharvest::identity::IdentityRotator;
use taxaharvest::merge::IncompleteLog;
use taxaharvest::repository::{run_migrations, DieselRecordStore, SqlitePool};
use taxaharvest::state::JsonStateFile;
use taxaharvest::targets::{TargetError, TargetSource};

use super::commands::TargetArgs;

/// Open the record store, creating the schema if needed.
pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<DieselRecordStore>> {
    settings.ensure_directories()?;
    let pool = SqlitePool::new(&settings.database_url());
    run_migrations(&pool)
        .await
        .with_context(|| format!("failed to prepare database {}", pool.database_url()))?;
    Ok(Arc::new(DieselRecordStore::new(pool)))
}

/// Whether the database file exists (always true for non-file URLs).
pub fn database_exists(settings: &Settings) -> bool {
    settings.database_url.is_some() || settings.database_path().exists()
}

/// Resolve the target list: command-line flags first, then config.
pub fn load_targets(settings: &Settings, args: &TargetArgs) -> anyhow::Result<Vec<String>> {
    let source = if let Some(ref dir) = args.targets_dir {
        TargetSource::Directory(dir.clone())
    } else if let Some(ref file) = args.targets_file {
        TargetSource::File(file.clone())
    } else {
        settings.targets.clone().ok_or(TargetError::NotConfigured)?
    };

    let targets = source.load()?;
    tracing::info!("Loaded {} targets from {}", targets.len(), source.describe());
    Ok(targets)
}

/// Assemble a harvester from settings and config.
pub async fn build_harvester(
    settings: &Settings,
    config: &Config,
    targets: Vec<String>,
    scheduler: BatchScheduler,
) -> anyhow::Result<Harvester> {
    let store = open_store(settings).await?;
    let fetcher = build_fetcher(config, Duration::from_secs(settings.request_timeout))?;

    Ok(Harvester::new(HarvestParts {
        targets,
        fetcher,
        store,
        required_fields: config.required_fields.clone(),
        incomplete_log: Some(IncompleteLog::new(settings.incomplete_log_path())),
        primary_state: Box::new(JsonStateFile::new(settings.state_path())),
        recovery_state: Box::new(JsonStateFile::new(settings.recovery_state_path())),
        scheduler,
    }))
}

/// New scheduler for the configured policy and identity pool.
pub fn scheduler_for(config: &Config) -> anyhow::Result<BatchScheduler> {
    let identities = IdentityRotator::new(config.user_agents.clone())?;
    Ok(BatchScheduler::new(config.harvest.clone(), identities))
}
