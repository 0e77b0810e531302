//! The top-level run: load the configuration, sync every source into the
//! workspace, then reconcile the result into the sync branch and its pull
//! request.
//!
//! Collaborators are passed in, so the same pipeline runs against real
//! `git`/`gh` in production and against fakes in tests.

use log::{info, warn};

use crate::config::{self, SyncConfig};
use crate::error::Result;
use crate::fetcher::SourceFetcher;
use crate::hosting::CodeHost;
use crate::outputs::RunOutputs;
use crate::reconcile::{Reconciler, Reconciliation, ReconcileState};
use crate::settings::RunSettings;
use crate::sync::{SyncReport, Synchronizer};

/// Everything a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub outputs: RunOutputs,
    /// `None` when no configuration was found.
    pub sync: Option<SyncReport>,
    pub reconciliation: Option<Reconciliation>,
}

impl RunReport {
    fn without_config() -> Self {
        Self {
            outputs: RunOutputs::empty(),
            sync: None,
            reconciliation: None,
        }
    }

    /// Number of warnings raised across sync and reconciliation.
    pub fn warning_count(&self) -> usize {
        self.sync.as_ref().map_or(0, |s| s.warnings.len())
            + self.reconciliation.as_ref().map_or(0, |r| r.warnings.len())
    }
}

/// Loads the configuration named by `settings` and executes it.
///
/// A missing configuration file is not an error: the run reports no changes.
pub fn run(
    settings: &RunSettings,
    fetcher: &dyn SourceFetcher,
    host: &dyn CodeHost,
) -> Result<RunReport> {
    let path = settings.config_file();
    match config::load_optional(&path)? {
        Some(config) => execute(&config, settings, fetcher, host),
        None => {
            warn!("No configuration found at {}; nothing to sync", path.display());
            Ok(RunReport::without_config())
        }
    }
}

/// Executes an already loaded configuration.
pub fn execute(
    config: &SyncConfig,
    settings: &RunSettings,
    fetcher: &dyn SourceFetcher,
    host: &dyn CodeHost,
) -> Result<RunReport> {
    info!(
        "Syncing {} source(s) into {}",
        config.sources.len(),
        settings.workspace.display()
    );
    let sync = Synchronizer::new(fetcher, &settings.workspace).run(config);
    info!(
        "Copied {} entr{} from {} source(s), {} skipped",
        sync.files_synced(),
        if sync.files_synced() == 1 { "y" } else { "ies" },
        config.sources.len() - sync.skipped.len(),
        sync.skipped.len()
    );

    let mut reconciler = Reconciler::new(host, &settings.reconcile);
    let reconciliation = reconciler.reconcile(&sync.changes, settings.dry_run)?;

    let outputs = outputs_for(&sync, &reconciliation);
    Ok(RunReport {
        outputs,
        sync: Some(sync),
        reconciliation: Some(reconciliation),
    })
}

fn outputs_for(sync: &SyncReport, reconciliation: &Reconciliation) -> RunOutputs {
    if reconciliation.state == ReconcileState::NoChanges {
        return RunOutputs::empty();
    }
    RunOutputs {
        changes_detected: true,
        files_synced: sync.files_synced(),
        pr: reconciliation.pull_request().cloned(),
    }
}
