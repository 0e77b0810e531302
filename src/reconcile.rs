//! # Branch and Pull Request Reconciliation
//!
//! The [`Reconciler`] maps a change set onto exactly one branch and one pull
//! request. Nothing is carried over between runs: whether the branch and a
//! pull request already exist is asked of the host every time.
//!
//! ```text
//!  has changes? ──no──▶ NoChanges
//!       │yes
//!  dry run? ──yes──▶ ChangesPendingBranch
//!       │no
//!  branch on remote? ──yes──▶ BranchExists ──delete (best effort)──┐
//!       │no                                                        │
//!       ▼◀─────────────────────────────────────────────────────────┘
//!  BranchCreated ──commit + push──▶ Pushed
//!       │
//!  open PR for branch? ──yes──▶ PrExists ──edit──▶ PrUpdated
//!       │no
//!       ▼
//!   PrCreated
//! ```
//!
//! Any error from branch creation, push, or pull request create/update moves
//! the machine to `Failed` and is returned to the caller. Failed branch
//! deletion, branch and PR lookups, and labelling are warnings.

use log::{debug, error, info, warn};

use crate::changes::{render_pr_body, ChangeSet};
use crate::error::Result;
use crate::hosting::{CodeHost, PullRequest};
use crate::settings::ReconcileSettings;

/// A state of the reconciliation machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileState {
    NoChanges,
    ChangesPendingBranch,
    BranchExists,
    BranchCreated,
    Pushed,
    PrExists(PullRequest),
    PrCreated(PullRequest),
    PrUpdated(PullRequest),
    Failed,
}

impl ReconcileState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReconcileState::NoChanges
                | ReconcileState::ChangesPendingBranch
                | ReconcileState::PrCreated(_)
                | ReconcileState::PrUpdated(_)
                | ReconcileState::Failed
        )
    }
}

/// What the host reported about the destination during this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationState {
    pub remote_branch_exists: bool,
    pub existing_pr: Option<PullRequest>,
    pub has_local_changes: bool,
}

/// The result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Terminal state reached.
    pub state: ReconcileState,
    pub observed: ReconciliationState,
    /// Non-fatal problems encountered on the way.
    pub warnings: Vec<String>,
}

impl Reconciliation {
    /// The pull request created or updated, if any.
    pub fn pull_request(&self) -> Option<&PullRequest> {
        match &self.state {
            ReconcileState::PrCreated(pr) | ReconcileState::PrUpdated(pr) => Some(pr),
            _ => None,
        }
    }
}

/// Drives a [`CodeHost`] through the reconciliation states.
pub struct Reconciler<'a, H: CodeHost + ?Sized> {
    host: &'a H,
    settings: &'a ReconcileSettings,
    trail: Vec<ReconcileState>,
    warnings: Vec<String>,
}

impl<'a, H: CodeHost + ?Sized> Reconciler<'a, H> {
    pub fn new(host: &'a H, settings: &'a ReconcileSettings) -> Self {
        Self {
            host,
            settings,
            trail: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Every state visited by the last call to [`Reconciler::reconcile`].
    pub fn trail(&self) -> &[ReconcileState] {
        &self.trail
    }

    /// Reconciles `changes` into the sync branch and its pull request.
    pub fn reconcile(&mut self, changes: &ChangeSet, dry_run: bool) -> Result<Reconciliation> {
        self.trail.clear();
        self.warnings.clear();

        let result = self.drive(changes, dry_run);
        if let Err(e) = &result {
            error!("Reconciliation failed: {}", e);
            self.enter(ReconcileState::Failed);
        }
        result
    }

    fn drive(&mut self, changes: &ChangeSet, dry_run: bool) -> Result<Reconciliation> {
        let settings = self.settings;
        let branch = settings.branch.as_str();
        let base = settings.base.as_deref();
        let mut observed = ReconciliationState {
            has_local_changes: self.host.has_local_changes()?,
            ..Default::default()
        };

        if !observed.has_local_changes {
            info!("No changes detected");
            return Ok(self.finish(ReconcileState::NoChanges, observed));
        }

        if dry_run {
            info!(
                "Dry run: {} file(s) would be synced on branch {}",
                changes.total(),
                branch
            );
            return Ok(self.finish(ReconcileState::ChangesPendingBranch, observed));
        }

        observed.remote_branch_exists = match self.host.branch_exists(branch) {
            Ok(exists) => exists,
            Err(e) => {
                self.warn(format!("Could not check whether branch {} exists: {}", branch, e));
                false
            }
        };

        if observed.remote_branch_exists {
            self.enter(ReconcileState::BranchExists);
            info!("Deleting existing branch {}", branch);
            if let Err(e) = self.host.delete_branch(branch) {
                self.warn(format!("Could not delete branch {}: {}", branch, e));
            }
        }

        info!("Creating branch {}", branch);
        self.host.create_branch(branch, base)?;
        self.enter(ReconcileState::BranchCreated);

        info!("Committing changes");
        self.host
            .commit_and_push(&settings.commit_message, branch, false)?;
        self.enter(ReconcileState::Pushed);

        let body = render_pr_body(changes, settings.repository.as_deref());

        observed.existing_pr = match self.host.find_open_pr(branch) {
            Ok(pr) => pr,
            Err(e) => {
                self.warn(format!("Could not look up open pull requests: {}", e));
                None
            }
        };

        let terminal = match observed.existing_pr.clone() {
            Some(pr) => {
                self.enter(ReconcileState::PrExists(pr.clone()));
                info!("Updating existing pull request #{}", pr.number);
                self.host.update_pr(&pr.number, &settings.pr_title, &body)?;
                self.attach_labels(&pr.number);
                info!("Pull request updated: {}", pr.url);
                ReconcileState::PrUpdated(pr)
            }
            None => {
                info!("Creating pull request");
                let pr = self
                    .host
                    .create_pr(&settings.pr_title, &body, branch, base)?;
                if pr.number.is_empty() {
                    self.warn(
                        "Pull request was created but its number could not be determined; \
                         labels were not added"
                            .to_string(),
                    );
                } else {
                    self.attach_labels(&pr.number);
                    info!("Pull request created: {}", pr.url);
                }
                ReconcileState::PrCreated(pr)
            }
        };

        Ok(self.finish(terminal, observed))
    }

    fn attach_labels(&mut self, number: &str) {
        if self.settings.labels.is_empty() {
            return;
        }
        if let Err(e) = self.host.add_labels(number, &self.settings.labels) {
            self.warn(format!(
                "Could not add labels to pull request #{} (labels may not exist): {}",
                number, e
            ));
        }
    }

    fn enter(&mut self, state: ReconcileState) {
        debug!("Reconcile state: {:?}", state);
        self.trail.push(state);
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn finish(&mut self, state: ReconcileState, observed: ReconciliationState) -> Reconciliation {
        self.enter(state.clone());
        Reconciliation {
            state,
            observed,
            warnings: std::mem::take(&mut self.warnings),
        }
    }
}
