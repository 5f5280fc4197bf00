//! Per-copy teardown and restoration.
//!
//! Teardown is all-or-nothing: the first copy that fails to remove aborts
//! the run. Restoration walks copies in ascending activation preference and
//! drives each one through add, suspend, seed and, for lagged copies,
//! activation-only suspend. A failing or slow copy is recorded and skipped
//! so the remaining copies still come back.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::backend::EntityManagement;
use crate::config::ReinitConfig;
use crate::error::{ReinitError, RestorationStepFailure, Result};
use crate::model::{CopyStatus, ReplicaCopy};
use crate::poller::ConvergencePoller;
use crate::topology::TopologySnapshot;

/// Furthest restoration step a copy reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyPhase {
    /// Torn down and not re-added.
    Removed,
    /// Re-created with seeding postponed.
    Added,
    /// Replication paused.
    Suspended,
    /// Reseed issued.
    Seeded,
    /// Lagged copy blocked from activation; log replay continues.
    SuspendedActivationOnly,
}

impl CopyPhase {
    /// Whether this is the final phase for a copy with or without lag.
    pub fn is_restored(&self, lag_enabled: bool) -> bool {
        if lag_enabled {
            *self == CopyPhase::SuspendedActivationOnly
        } else {
            *self == CopyPhase::Seeded
        }
    }
}

/// How far one copy got through restoration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    /// Copy name.
    pub copy_name: String,
    /// Server hosting the copy.
    pub host_server: String,
    /// Failover rank.
    pub activation_preference: u32,
    /// Replay lag configured.
    pub lag_enabled: bool,
    /// Configured lag, zero when lag is disabled.
    pub lag_days: u32,
    /// Furthest step reached.
    pub phase: CopyPhase,
    /// Steps whose effect was not observed before the poll timeout.
    pub unconverged: Vec<String>,
}

impl CopyOutcome {
    fn new(copy: &ReplicaCopy, phase: CopyPhase) -> Self {
        Self {
            copy_name: copy.name.clone(),
            host_server: copy.host_server.clone(),
            activation_preference: copy.activation_preference,
            lag_enabled: copy.lag_enabled,
            lag_days: copy.effective_lag_days(),
            phase,
            unconverged: Vec::new(),
        }
    }

    /// Whether the copy went through every step.
    pub fn is_restored(&self) -> bool {
        self.phase.is_restored(self.lag_enabled)
    }

    /// Whether the copy exists again on its host, however far it got.
    pub fn is_present(&self) -> bool {
        self.phase != CopyPhase::Removed
    }
}

/// Results of restoring every captured copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationReport {
    /// Per-copy results in preference order.
    pub copies: Vec<CopyOutcome>,
    /// Non-fatal failures, in the order they happened.
    pub failures: Vec<RestorationStepFailure>,
}

/// Removes and re-creates the passive copies of one entity.
pub struct ReplicaLifecycleController<'a> {
    management: &'a dyn EntityManagement,
    poller: ConvergencePoller,
    config: &'a ReinitConfig,
}

impl<'a> ReplicaLifecycleController<'a> {
    /// Controller issuing calls through `management`.
    pub fn new(management: &'a dyn EntityManagement, poller: ConvergencePoller, config: &'a ReinitConfig) -> Self {
        Self {
            management,
            poller,
            config,
        }
    }

    /// Removes every captured copy. Stops at the first failure.
    pub async fn remove_all(&self, snapshot: &TopologySnapshot) -> Result<()> {
        for copy in snapshot.copies() {
            if let Err(e) = self.management.remove_copy(&copy.name).await {
                error!(copy = %copy.name, error = %e, "copy removal failed; topology is partially torn down");
                return Err(ReinitError::DestructivePhase {
                    phase: "remove_copies".to_string(),
                    message: format!("removing {}: {}", copy.name, e),
                });
            }
            info!(copy = %copy.name, "copy removed");
        }
        Ok(())
    }

    /// Restores every captured copy in preference order.
    pub async fn restore_all(&self, snapshot: &TopologySnapshot) -> RestorationReport {
        let mut report = RestorationReport::default();
        for copy in snapshot.copies() {
            let outcome = self
                .restore_one(snapshot.entity(), copy, &mut report.failures)
                .await;
            report.copies.push(outcome);
        }
        report
    }

    async fn restore_one(
        &self,
        entity: &str,
        copy: &ReplicaCopy,
        failures: &mut Vec<RestorationStepFailure>,
    ) -> CopyOutcome {
        let mut outcome = CopyOutcome::new(copy, CopyPhase::Removed);
        let lag = copy.lag_enabled.then_some(copy.lag_days);

        if let Err(e) = self
            .management
            .add_copy(entity, &copy.host_server, copy.activation_preference, lag, true)
            .await
        {
            warn!(copy = %copy.name, error = %e, "add failed; skipping copy");
            failures.push(RestorationStepFailure::new(&copy.name, "add", e.to_string()));
            return outcome;
        }
        outcome.phase = CopyPhase::Added;
        info!(copy = %copy.name, preference = copy.activation_preference, "copy added, seeding postponed");

        self.suspend_and_seed(entity, copy, &mut outcome, failures).await;

        // Once the copy exists a lagged one must never become activatable,
        // even if seeding did not finish.
        if copy.lag_enabled {
            match self.management.suspend_copy(&copy.name, true).await {
                Ok(()) => {
                    if outcome.phase == CopyPhase::Seeded {
                        outcome.phase = CopyPhase::SuspendedActivationOnly;
                    }
                    info!(copy = %copy.name, lag_days = copy.lag_days, "lagged copy suspended for activation");
                }
                Err(e) => {
                    warn!(copy = %copy.name, error = %e, "activation-only suspend failed");
                    failures.push(RestorationStepFailure::new(
                        &copy.name,
                        "suspend_activation_only",
                        e.to_string(),
                    ));
                }
            }
        }

        if !outcome.unconverged.is_empty() {
            failures.push(RestorationStepFailure::new(
                &copy.name,
                "converge",
                format!("not observed before timeout: {}", outcome.unconverged.join(", ")),
            ));
        }
        info!(copy = %copy.name, phase = ?outcome.phase, "copy restoration finished");
        outcome
    }

    /// Suspends and reseeds an added copy. Stops at the first rejected call;
    /// a step that does not converge is noted and the next one still runs.
    async fn suspend_and_seed(
        &self,
        entity: &str,
        copy: &ReplicaCopy,
        outcome: &mut CopyOutcome,
        failures: &mut Vec<RestorationStepFailure>,
    ) {
        if !self
            .wait_status(entity, &copy.name, "copy_added", |s| s != CopyStatus::Unknown)
            .await
        {
            outcome.unconverged.push("add".to_string());
            warn!(copy = %copy.name, "copy never left Unknown; skipping suspend and seed");
            return;
        }

        if let Err(e) = self.management.suspend_copy(&copy.name, false).await {
            warn!(copy = %copy.name, error = %e, "suspend failed; skipping seed");
            failures.push(RestorationStepFailure::new(&copy.name, "suspend", e.to_string()));
            return;
        }
        outcome.phase = CopyPhase::Suspended;
        if !self
            .wait_status(entity, &copy.name, "copy_suspended", |s| {
                s != CopyStatus::Failed && s != CopyStatus::Unknown
            })
            .await
        {
            outcome.unconverged.push("suspend".to_string());
        }

        if let Err(e) = self.management.seed_copy(&copy.name, true).await {
            warn!(copy = %copy.name, error = %e, "seed failed");
            failures.push(RestorationStepFailure::new(&copy.name, "seed", e.to_string()));
            return;
        }
        outcome.phase = CopyPhase::Seeded;
        if !self
            .wait_status(entity, &copy.name, "copy_seeded", |s| s == CopyStatus::Healthy)
            .await
        {
            outcome.unconverged.push("seed".to_string());
        }
    }

    async fn wait_status<P>(&self, entity: &str, copy_name: &str, step: &str, done: P) -> bool
    where
        P: Fn(CopyStatus) -> bool,
    {
        let settings = match step {
            "copy_added" => self.config.copy_added(),
            "copy_suspended" => self.config.copy_suspended(),
            "copy_seeded" => self.config.copy_seeded(),
            _ => self.poller.defaults(),
        };
        let management = self.management;
        let done = &done;
        let what = format!("{} of {}", step, copy_name);
        self.poller
            .wait_with(
                &what,
                || async move {
                    management.get_copies(entity).await.map(|copies| {
                        copies
                            .iter()
                            .find(|c| c.name == copy_name)
                            .map(|c| done(c.status))
                            .unwrap_or(false)
                    })
                },
                settings,
            )
            .await
    }
}
