//! End-to-end destructive workflow.
//!
//! Phases run strictly in order. Everything up to and including the forced
//! mount is fatal on error: the run stops and the entity stays in whatever
//! state the last completed phase left it. Restoration phases only record
//! failures. There is no rollback.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::backend::Services;
use crate::config::ReinitConfig;
use crate::error::{BackendError, ReinitError, RestorationStepFailure, Result};
use crate::model::{DatabaseRecord, ReplicaCopy};
use crate::poller::ConvergencePoller;
use crate::precheck::RunContext;
use crate::replica::{CopyOutcome, ReplicaLifecycleController};
use crate::report::{ReportStage, TopologyReport};
use crate::topology::{TopologyDiff, TopologySnapshot};

/// Steps of a recreation run, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Circular logging turned off and read back.
    DisableCircularLogging,
    /// Every captured passive copy removed.
    RemoveCopies,
    /// Entity taken offline.
    Dismount,
    /// Wipe of the data and log directories.
    DeleteFiles,
    /// Forced mount that creates fresh files.
    Mount,
    /// Captured copies re-created.
    RestoreCopies,
    /// Circular logging turned back on.
    RestoreCircularLogging,
    /// Provisioning exclusion cleared or kept.
    RestoreProvisioning,
}

impl Phase {
    /// Snake-case name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::DisableCircularLogging => "disable_circular_logging",
            Phase::RemoveCopies => "remove_copies",
            Phase::Dismount => "dismount",
            Phase::DeleteFiles => "delete_files",
            Phase::Mount => "mount",
            Phase::RestoreCopies => "restore_copies",
            Phase::RestoreCircularLogging => "restore_circular_logging",
            Phase::RestoreProvisioning => "restore_provisioning",
        }
    }
}

/// Outcome of a run that got past the destructive confirmation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Entity name.
    pub entity: String,
    /// When the phases began.
    pub started_at: DateTime<Utc>,
    /// When the last phase finished.
    pub finished_at: DateTime<Utc>,
    /// Phases that completed, in order.
    pub completed_phases: Vec<Phase>,
    /// Per-copy restoration results in preference order.
    pub copies: Vec<CopyOutcome>,
    /// Non-fatal failures, in the order they happened.
    pub failures: Vec<RestorationStepFailure>,
    /// Instructions the operator must carry out by hand.
    pub manual_actions: Vec<String>,
    /// Restored topology compared to the captured one; `None` when there
    /// were no copies or the final listing failed.
    pub topology_diff: Option<TopologyDiff>,
}

impl RunSummary {
    /// No failures and nothing left for the operator to do.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.manual_actions.is_empty()
    }

    /// Plain-text summary for the terminal.
    pub fn render(&self) -> String {
        let mut out = format!("Entity: {}\n", self.entity);
        out.push_str(&format!(
            "Phases: {}\n",
            self.completed_phases
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(" -> ")
        ));
        for copy in &self.copies {
            out.push_str(&format!(
                "Copy {} (pref {}): {:?}{}\n",
                copy.copy_name,
                copy.activation_preference,
                copy.phase,
                if copy.unconverged.is_empty() {
                    String::new()
                } else {
                    format!(" [unconverged: {}]", copy.unconverged.join(", "))
                }
            ));
        }
        if let Some(diff) = &self.topology_diff {
            if !diff.is_clean() {
                out.push_str(&format!(
                    "Topology mismatch: missing [{}], unexpected [{}]\n",
                    diff.missing.join(", "),
                    diff.unexpected.join(", ")
                ));
            }
        }
        for f in &self.failures {
            out.push_str(&format!("FAILED {} {}: {}\n", f.target, f.step, f.message));
        }
        for action in &self.manual_actions {
            out.push_str(&format!("ACTION REQUIRED: {}\n", action));
        }
        out
    }
}

/// Drives the destructive phase sequence for one entity.
pub struct RecreationOrchestrator<'a> {
    services: &'a Services,
    config: &'a ReinitConfig,
    poller: ConvergencePoller,
}

impl<'a> RecreationOrchestrator<'a> {
    /// Orchestrator over `services`.
    pub fn new(services: &'a Services, config: &'a ReinitConfig) -> Self {
        Self {
            services,
            config,
            poller: ConvergencePoller::new(config.poll),
        }
    }

    /// Asks for the destructive confirmation, then runs every phase.
    pub async fn execute(&self, ctx: &RunContext) -> Result<RunSummary> {
        let prompt = format!(
            "All data and log files of {} on {} will be deleted and {} replica cop{} re-seeded. Proceed?",
            ctx.entity.name,
            ctx.entity.host_server,
            ctx.topology.len(),
            if ctx.topology.len() == 1 { "y" } else { "ies" }
        );
        if !self.services.confirmer.confirm(&prompt) {
            info!(entity = %ctx.entity.name, "operator declined; nothing changed");
            return Err(ReinitError::Declined);
        }
        let result = self.run_phases(ctx).await;
        if let Err(e) = &result {
            error!(entity = %ctx.entity.name, error = %e, "run aborted; no rollback is attempted");
        }
        result
    }

    async fn run_phases(&self, ctx: &RunContext) -> Result<RunSummary> {
        let entity = &ctx.entity;
        let management = self.services.management.as_ref();
        let controller = ReplicaLifecycleController::new(management, self.poller, self.config);
        let mut summary = RunSummary {
            entity: entity.name.clone(),
            started_at: self.services.clock.now(),
            finished_at: self.services.clock.now(),
            completed_phases: Vec::new(),
            copies: Vec::new(),
            failures: Vec::new(),
            manual_actions: Vec::new(),
            topology_diff: None,
        };
        let dirs = wipe_targets(entity)?;
        info!(entity = %entity.name, copies = ctx.topology.len(), "starting recreation");
        self.publish(&ctx.topology, ReportStage::Before, ctx.topology.copies());

        if entity.circular_logging {
            self.set_circular_logging(&entity.name, false).await?;
        }
        self.complete(&mut summary, Phase::DisableCircularLogging);

        controller.remove_all(&ctx.topology).await?;
        self.complete(&mut summary, Phase::RemoveCopies);

        if entity.mounted {
            management
                .dismount(&entity.name)
                .await
                .map_err(|e| fatal(Phase::Dismount, e))?;
        } else {
            info!(entity = %entity.name, "already dismounted");
        }
        self.complete(&mut summary, Phase::Dismount);

        for dir in dirs {
            warn!(entity = %entity.name, host = %entity.host_server, directory = dir, "deleting files");
            self.services
                .files
                .delete_all(&entity.host_server, dir)
                .await
                .map_err(|e| fatal(Phase::DeleteFiles, e))?;
        }
        self.complete(&mut summary, Phase::DeleteFiles);

        management
            .mount(&entity.name, true)
            .await
            .map_err(|e| fatal(Phase::Mount, e))?;
        self.complete(&mut summary, Phase::Mount);

        let restoration = controller.restore_all(&ctx.topology).await;
        summary.copies = restoration.copies;
        summary.failures.extend(restoration.failures);
        if !ctx.topology.is_empty() {
            match management.get_copies(&entity.name).await {
                Ok(copies) => {
                    let after = TopologySnapshot::from_copies(entity, copies);
                    self.publish(&ctx.topology, ReportStage::After, after.copies());
                    let diff = ctx.topology.diff(after.copies());
                    if !diff.is_clean() {
                        warn!(entity = %entity.name, missing = ?diff.missing, unexpected = ?diff.unexpected, "restored topology differs");
                    }
                    summary.topology_diff = Some(diff);
                }
                Err(e) => summary.failures.push(RestorationStepFailure::new(
                    &entity.name,
                    "list_copies",
                    e.to_string(),
                )),
            }
        }
        self.complete(&mut summary, Phase::RestoreCopies);

        if entity.circular_logging {
            if let Err(e) = self.set_circular_logging(&entity.name, true).await {
                warn!(entity = %entity.name, error = %e, "could not re-enable circular logging");
                summary.failures.push(RestorationStepFailure::new(
                    &entity.name,
                    "circular_logging",
                    e.to_string(),
                ));
            }
        }
        self.complete(&mut summary, Phase::RestoreCircularLogging);

        self.restore_provisioning(ctx, &mut summary).await;
        self.complete(&mut summary, Phase::RestoreProvisioning);

        summary.finished_at = self.services.clock.now();
        info!(
            entity = %entity.name,
            failures = summary.failures.len(),
            manual_actions = summary.manual_actions.len(),
            "recreation finished"
        );
        Ok(summary)
    }

    async fn set_circular_logging(&self, name: &str, enabled: bool) -> Result<()> {
        let phase = if enabled {
            Phase::RestoreCircularLogging
        } else {
            Phase::DisableCircularLogging
        };
        let management = self.services.management.as_ref();
        management
            .set_circular_logging(name, enabled)
            .await
            .map_err(|e| fatal(phase, e))?;

        let what = format!("circular logging {} on {}", if enabled { "enabled" } else { "disabled" }, name);
        let converged = self
            .poller
            .wait_with(
                &what,
                || async move {
                    management
                        .get_entity(name)
                        .await
                        .map(|e| e.circular_logging == enabled)
                },
                self.config.circular_logging(),
            )
            .await;
        if !converged {
            return Err(ReinitError::ConvergenceTimeout { what });
        }
        Ok(())
    }

    /// Re-includes the entity in provisioning unless a lagged copy came back.
    /// Only copies that exist again after restoration count; a lagged copy
    /// that could not be re-added does not keep the entity excluded.
    async fn restore_provisioning(&self, ctx: &RunContext, summary: &mut RunSummary) {
        let entity = &ctx.entity;
        if !entity.provisioning_excluded {
            return;
        }
        let restored_lag = summary
            .copies
            .iter()
            .filter(|c| c.lag_enabled && c.is_present())
            .map(|c| c.lag_days)
            .max();
        if let Some(days) = restored_lag {
            let after = self.services.clock.now() + Duration::days(i64::from(days));
            let action = format!(
                "{} stays excluded from provisioning: lagged copies need {} days to catch up. Re-include it after {}.",
                entity.name,
                days,
                after.format("%Y-%m-%d")
            );
            warn!(entity = %entity.name, max_lag_days = days, "{}", action);
            summary.manual_actions.push(action);
            return;
        }
        match self
            .services
            .management
            .set_provisioning_excluded(&entity.name, false)
            .await
        {
            Ok(()) => info!(entity = %entity.name, "re-included in provisioning"),
            Err(e) => {
                warn!(entity = %entity.name, error = %e, "could not re-include in provisioning");
                summary.failures.push(RestorationStepFailure::new(
                    &entity.name,
                    "provisioning",
                    e.to_string(),
                ));
            }
        }
    }

    fn publish(&self, snapshot: &TopologySnapshot, stage: ReportStage, copies: &[ReplicaCopy]) {
        if snapshot.is_empty() {
            return;
        }
        let report = TopologyReport::new(snapshot.entity(), stage, self.services.clock.now(), copies);
        self.services.reports.publish(&report);
    }

    fn complete(&self, summary: &mut RunSummary, phase: Phase) {
        info!(entity = %summary.entity, phase = phase.name(), "phase complete");
        summary.completed_phases.push(phase);
    }
}

/// Directories the wipe phase empties: the data-file directory, then the
/// log directory unless it is the same path. Resolved before anything is
/// touched, so a path without a directory component fails the run cleanly.
fn wipe_targets(entity: &DatabaseRecord) -> Result<Vec<&str>> {
    let invalid = |what: &str, path: &str| ReinitError::DestructivePhase {
        phase: Phase::DeleteFiles.name().to_string(),
        message: format!("{} path {:?} of {} has no directory component", what, path, entity.name),
    };
    let data_dir = entity
        .data_directory()
        .ok_or_else(|| invalid("data file", &entity.data_file_path))?;
    let log_dir = entity.log_directory.trim();
    if log_dir.is_empty() {
        return Err(invalid("log", &entity.log_directory));
    }
    let mut dirs = vec![data_dir];
    if log_dir != data_dir {
        dirs.push(log_dir);
    }
    Ok(dirs)
}

fn fatal(phase: Phase, e: BackendError) -> ReinitError {
    ReinitError::DestructivePhase {
        phase: phase.name().to_string(),
        message: e.to_string(),
    }
}
