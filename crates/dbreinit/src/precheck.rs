//! Ordered safety checks gating every destructive run.
//!
//! Seven checks run in a fixed order and stop at the first failure. Hard
//! failures abort outright. Soft failures (dismounted entity, disconnect
//! inside the safety window) ask the operator, and count as overridden
//! when confirmed. Nothing in this module mutates remote state.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::Services;
use crate::config::ReinitConfig;
use crate::error::{BackendError, ReinitError, Result};
use crate::model::DatabaseRecord;
use crate::topology::{self, TopologySnapshot};

/// Names shown in error messages; at most this many are listed.
const MAX_LISTED_IDENTITIES: usize = 10;

/// The seven checks, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckKind {
    /// The entity resolves by name.
    Existence,
    /// No identity still points at the entity.
    ResidualReferences,
    /// Disconnect statistics can be collected.
    UsageStatistics,
    /// The entity is not a recovery database.
    RecoveryFlag,
    /// The passive copies could be listed.
    TopologyCapture,
    /// Largest configured lag derived.
    LagAnalysis,
    /// Last disconnect is older than the safety window.
    SafetyWindow,
}

impl CheckKind {
    /// Snake-case name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Existence => "existence",
            CheckKind::ResidualReferences => "residual_references",
            CheckKind::UsageStatistics => "usage_statistics",
            CheckKind::RecoveryFlag => "recovery_flag",
            CheckKind::TopologyCapture => "topology_capture",
            CheckKind::LagAnalysis => "lag_analysis",
            CheckKind::SafetyWindow => "safety_window",
        }
    }
}

/// Result of one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckOutcome {
    /// Check held.
    Passed,
    /// Soft failure the operator chose to ignore.
    Overridden,
    /// Failure that aborts the run.
    FailedHard,
    /// Soft failure the operator did not override.
    FailedSoft,
}

impl CheckOutcome {
    /// Passed or overridden.
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckOutcome::Passed | CheckOutcome::Overridden)
    }
}

/// One line of the verdict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Which check.
    pub kind: CheckKind,
    /// How it ended.
    pub outcome: CheckOutcome,
    /// What the check observed.
    pub message: String,
}

/// Results of the checks that ran, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecheckVerdict {
    results: Vec<CheckResult>,
}

impl PrecheckVerdict {
    /// Results of the checks that ran, in order.
    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    /// All seven checks ran and none failed.
    pub fn passed(&self) -> bool {
        self.results.len() == CHECK_COUNT && self.results.iter().all(|r| r.outcome.is_ok())
    }

    /// The check that stopped the pipeline, if any.
    pub fn failure(&self) -> Option<&CheckResult> {
        self.results.iter().find(|r| !r.outcome.is_ok())
    }

    /// Soft failures the operator chose to ignore.
    pub fn overridden(&self) -> impl Iterator<Item = &CheckResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == CheckOutcome::Overridden)
    }

    /// Numbered, tagged listing for terminal output.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, r) in self.results.iter().enumerate() {
            let tag = match r.outcome {
                CheckOutcome::Passed => "PASS",
                CheckOutcome::Overridden => "OVERRIDDEN",
                CheckOutcome::FailedHard => "FAIL",
                CheckOutcome::FailedSoft => "DECLINED",
            };
            out.push_str(&format!("{}. [{}] {}: {}\n", i + 1, tag, r.kind.name(), r.message));
        }
        out
    }

    fn push(&mut self, kind: CheckKind, outcome: CheckOutcome, message: String) {
        match outcome {
            CheckOutcome::Passed => info!(check = kind.name(), "{}", message),
            CheckOutcome::Overridden => warn!(check = kind.name(), "overridden: {}", message),
            CheckOutcome::FailedHard | CheckOutcome::FailedSoft => {
                warn!(check = kind.name(), outcome = ?outcome, "{}", message)
            }
        }
        self.results.push(CheckResult {
            kind,
            outcome,
            message,
        });
    }
}

const CHECK_COUNT: usize = 7;

/// `max(retention, max lag)` in days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyWindow {
    /// Configured retention of the entity.
    pub retention_days: u32,
    /// Largest lag among the captured copies.
    pub max_lag_days: u32,
}

impl SafetyWindow {
    /// Window from retention and lag.
    pub fn new(retention_days: u32, max_lag_days: u32) -> Self {
        Self {
            retention_days,
            max_lag_days,
        }
    }

    /// Window length in days.
    pub fn days(&self) -> u32 {
        self.retention_days.max(self.max_lag_days)
    }

    /// Window length as a duration.
    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.days()))
    }

    /// First instant at which a disconnect at `last` no longer blocks.
    pub fn safe_after(&self, last: DateTime<Utc>) -> DateTime<Utc> {
        last + self.duration()
    }

    /// A disconnect exactly `days()` ago still blocks.
    pub fn blocks(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last <= self.duration()
    }
}

/// Everything a run needs, fixed at check time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Entity as read by the existence check.
    pub entity: DatabaseRecord,
    /// Copies to tear down and restore.
    pub topology: TopologySnapshot,
    /// Safety window the last disconnect was checked against.
    pub window: SafetyWindow,
    /// Most recent disconnect, if statistics were collected and non-empty.
    pub last_disconnect: Option<DateTime<Utc>>,
    /// False when the operator continued without statistics.
    pub statistics_available: bool,
    /// When the checks ran.
    pub checked_at: DateTime<Utc>,
}

impl RunContext {
    /// Largest lag among the captured copies.
    pub fn max_lag_days(&self) -> u32 {
        self.window.max_lag_days
    }
}

/// Verdict plus either the run context or the error that stopped the checks.
pub struct PrecheckReport {
    /// Per-check results.
    pub verdict: PrecheckVerdict,
    outcome: Result<RunContext>,
}

impl PrecheckReport {
    /// Whether every check passed or was overridden.
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Run context when the checks passed.
    pub fn context(&self) -> Option<&RunContext> {
        self.outcome.as_ref().ok()
    }

    /// The error that stopped the checks.
    pub fn error(&self) -> Option<&ReinitError> {
        self.outcome.as_ref().err()
    }

    /// The context a run needs, or the error that stopped the checks.
    pub fn into_context(self) -> Result<RunContext> {
        self.outcome
    }
}

/// Runs the checks against the configured services.
pub struct PrecheckPipeline<'a> {
    services: &'a Services,
    system_identities: Regex,
}

impl<'a> PrecheckPipeline<'a> {
    /// Fails if the system-identity pattern does not compile.
    pub fn new(services: &'a Services, config: &ReinitConfig) -> Result<Self> {
        let system_identities = Regex::new(&config.system_identity_pattern)
            .map_err(|e| ReinitError::Config(format!("system_identity_pattern: {}", e)))?;
        Ok(Self {
            services,
            system_identities,
        })
    }

    /// Runs every check on `name` until one fails. Never mutates.
    pub async fn run(&self, name: &str) -> PrecheckReport {
        info!(entity = name, "running prechecks");
        let mut verdict = PrecheckVerdict::default();
        let outcome = self.evaluate(name, &mut verdict).await;
        match &outcome {
            Ok(_) => info!(entity = name, "all prechecks passed"),
            Err(e) => warn!(entity = name, error = %e, "prechecks failed; nothing was changed"),
        }
        PrecheckReport { verdict, outcome }
    }

    async fn evaluate(&self, name: &str, verdict: &mut PrecheckVerdict) -> Result<RunContext> {
        let now = self.services.clock.now();

        let entity = self.check_existence(name, verdict).await?;
        self.check_references(&entity, verdict).await?;
        let (last_disconnect, statistics_available) = self.check_statistics(&entity, verdict).await?;
        check_recovery(&entity, verdict)?;
        let topology = self.check_topology(&entity, verdict).await?;

        let window = SafetyWindow::new(entity.retention_days, topology.max_lag_days());
        verdict.push(
            CheckKind::LagAnalysis,
            CheckOutcome::Passed,
            if topology.has_lagged_copy() {
                format!(
                    "{} lagged cop{}; max lag {} days",
                    topology.lagged_copies().count(),
                    if topology.lagged_copies().count() == 1 { "y" } else { "ies" },
                    window.max_lag_days
                )
            } else {
                "no lagged copies".to_string()
            },
        );

        self.check_safety_window(&entity, window, last_disconnect, now, verdict)?;

        Ok(RunContext {
            entity,
            topology,
            window,
            last_disconnect,
            statistics_available,
            checked_at: now,
        })
    }

    async fn check_existence(&self, name: &str, verdict: &mut PrecheckVerdict) -> Result<DatabaseRecord> {
        match self.services.management.get_entity(name).await {
            Ok(entity) => {
                verdict.push(
                    CheckKind::Existence,
                    CheckOutcome::Passed,
                    format!("{} found on {}", entity.name, entity.host_server),
                );
                Ok(entity)
            }
            Err(BackendError::NotFound(_)) => {
                verdict.push(CheckKind::Existence, CheckOutcome::FailedHard, format!("{} not found", name));
                Err(ReinitError::NotFound(name.to_string()))
            }
            Err(e) => hard(verdict, CheckKind::Existence, format!("lookup of {} failed: {}", name, e)),
        }
    }

    async fn check_references(&self, entity: &DatabaseRecord, verdict: &mut PrecheckVerdict) -> Result<()> {
        let identities = match self.services.directory.find_referencing_identities(&entity.name).await {
            Ok(ids) => ids,
            Err(e) => {
                return hard(
                    verdict,
                    CheckKind::ResidualReferences,
                    format!("directory scan failed: {}", e),
                )
            }
        };
        let blocking: Vec<&str> = identities
            .iter()
            .filter(|i| i.references(&entity.name))
            .filter(|i| !self.system_identities.is_match(&i.name))
            .map(|i| i.name.as_str())
            .collect();

        if blocking.is_empty() {
            verdict.push(
                CheckKind::ResidualReferences,
                CheckOutcome::Passed,
                "no identities reference the entity".to_string(),
            );
            return Ok(());
        }

        let mut listed = blocking
            .iter()
            .take(MAX_LISTED_IDENTITIES)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        if blocking.len() > MAX_LISTED_IDENTITIES {
            listed.push_str(&format!(", ... ({} more)", blocking.len() - MAX_LISTED_IDENTITIES));
        }
        hard(
            verdict,
            CheckKind::ResidualReferences,
            format!(
                "{} identit{} still reference {}; move them first: {}",
                blocking.len(),
                if blocking.len() == 1 { "y" } else { "ies" },
                entity.name,
                listed
            ),
        )
    }

    async fn check_statistics(
        &self,
        entity: &DatabaseRecord,
        verdict: &mut PrecheckVerdict,
    ) -> Result<(Option<DateTime<Utc>>, bool)> {
        if !entity.mounted {
            let message = format!(
                "{} is dismounted; disconnect statistics cannot be collected",
                entity.name
            );
            let prompt = format!("{}. Continue without them?", message);
            return self
                .soft(verdict, CheckKind::UsageStatistics, message, &prompt)
                .map(|()| (None, false));
        }

        match self.services.statistics.get_disconnected_stats(&entity.name).await {
            Ok(records) => {
                let last = records.iter().map(|r| r.disconnected_at).max();
                let message = match last {
                    Some(t) => format!("{} disconnect records; most recent {}", records.len(), t.to_rfc3339()),
                    None => "no disconnect records".to_string(),
                };
                verdict.push(CheckKind::UsageStatistics, CheckOutcome::Passed, message);
                Ok((last, true))
            }
            Err(e) => hard(
                verdict,
                CheckKind::UsageStatistics,
                format!("statistics collection failed: {}", e),
            ),
        }
    }

    async fn check_topology(
        &self,
        entity: &DatabaseRecord,
        verdict: &mut PrecheckVerdict,
    ) -> Result<TopologySnapshot> {
        match topology::capture(self.services.management.as_ref(), entity).await {
            Ok(snapshot) => {
                verdict.push(
                    CheckKind::TopologyCapture,
                    CheckOutcome::Passed,
                    format!("{} passive cop{} captured", snapshot.len(), if snapshot.len() == 1 { "y" } else { "ies" }),
                );
                Ok(snapshot)
            }
            Err(e) => {
                verdict.push(CheckKind::TopologyCapture, CheckOutcome::FailedHard, e.to_string());
                Err(e)
            }
        }
    }

    fn check_safety_window(
        &self,
        entity: &DatabaseRecord,
        window: SafetyWindow,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        verdict: &mut PrecheckVerdict,
    ) -> Result<()> {
        let Some(last) = last else {
            verdict.push(
                CheckKind::SafetyWindow,
                CheckOutcome::Passed,
                format!("no disconnect timestamp to compare against the {}-day window", window.days()),
            );
            return Ok(());
        };

        if !window.blocks(last, now) {
            verdict.push(
                CheckKind::SafetyWindow,
                CheckOutcome::Passed,
                format!(
                    "last disconnect {} is outside the {}-day window",
                    last.to_rfc3339(),
                    window.days()
                ),
            );
            return Ok(());
        }

        let safe_after = window.safe_after(last);
        let message = format!(
            "last disconnect {} is inside the {}-day window (retention {}, max lag {}); safe after {}",
            last.to_rfc3339(),
            window.days(),
            window.retention_days,
            window.max_lag_days,
            safe_after.to_rfc3339()
        );
        let prompt = format!(
            "Content was disconnected from {} within the last {} days; it is safe to proceed after {}. Force continuation?",
            entity.name,
            window.days(),
            safe_after.format("%Y-%m-%d %H:%M UTC")
        );
        self.soft(verdict, CheckKind::SafetyWindow, message, &prompt)
    }

    fn soft(&self, verdict: &mut PrecheckVerdict, kind: CheckKind, message: String, prompt: &str) -> Result<()> {
        if self.services.confirmer.confirm(prompt) {
            verdict.push(kind, CheckOutcome::Overridden, message);
            Ok(())
        } else {
            verdict.push(kind, CheckOutcome::FailedSoft, message.clone());
            Err(ReinitError::PreconditionDeclined {
                check: kind.name().to_string(),
                message,
            })
        }
    }
}

fn check_recovery(entity: &DatabaseRecord, verdict: &mut PrecheckVerdict) -> Result<()> {
    if entity.recovery {
        return hard(
            verdict,
            CheckKind::RecoveryFlag,
            format!("{} is a recovery database", entity.name),
        );
    }
    verdict.push(CheckKind::RecoveryFlag, CheckOutcome::Passed, "not a recovery database".to_string());
    Ok(())
}

fn hard<T>(verdict: &mut PrecheckVerdict, kind: CheckKind, message: String) -> Result<T> {
    verdict.push(kind, CheckOutcome::FailedHard, message.clone());
    Err(ReinitError::PreconditionFailed {
        check: kind.name().to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FixedClock, NullReportSink};
    use crate::model::{CopyStatus, DisconnectRecord, Identity, ReplicaCopy};
    use crate::sim::SimulatedCluster;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Answers from a script and remembers every prompt.
    struct Scripted {
        answers: Mutex<Vec<bool>>,
        prompts: Mutex<Vec<String>>,
        asked: AtomicUsize,
    }

    impl Scripted {
        fn new(answers: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().rev().copied().collect()),
                prompts: Mutex::new(Vec::new()),
                asked: AtomicUsize::new(0),
            })
        }
    }

    impl crate::backend::Confirmer for Scripted {
        fn confirm(&self, prompt: &str) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers.lock().unwrap().pop().unwrap_or(false)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn entity(name: &str) -> DatabaseRecord {
        DatabaseRecord {
            name: name.to_string(),
            mounted: true,
            recovery: false,
            retention_days: 30,
            circular_logging: false,
            provisioning_excluded: false,
            host_server: "MBX1".to_string(),
            data_file_path: format!("D:\\{}\\{}.edb", name, name),
            log_directory: format!("D:\\{}\\Logs", name),
        }
    }

    fn services(sim: Arc<SimulatedCluster>, confirmer: Arc<Scripted>) -> Services {
        Services::from_backend(sim, confirmer, Arc::new(NullReportSink), Arc::new(FixedClock(now())))
    }

    fn disconnect(days_ago: i64) -> DisconnectRecord {
        DisconnectRecord {
            display_name: "user".to_string(),
            disconnected_at: now() - Duration::days(days_ago),
        }
    }

    async fn run(sim: Arc<SimulatedCluster>, confirmer: Arc<Scripted>, name: &str) -> PrecheckReport {
        let services = services(sim, confirmer);
        let pipeline = PrecheckPipeline::new(&services, &ReinitConfig::default()).unwrap();
        pipeline.run(name).await
    }

    #[test]
    fn test_safety_window_days_is_max() {
        assert_eq!(SafetyWindow::new(14, 7).days(), 14);
        assert_eq!(SafetyWindow::new(3, 7).days(), 7);
        assert_eq!(SafetyWindow::new(0, 0).days(), 0);
    }

    #[test]
    fn test_safety_window_boundary_blocks() {
        let w = SafetyWindow::new(30, 0);
        assert!(w.blocks(now() - Duration::days(30), now()));
        assert!(!w.blocks(now() - Duration::days(30) - Duration::seconds(1), now()));
        assert_eq!(w.safe_after(now() - Duration::days(10)), now() + Duration::days(20));
    }

    #[tokio::test]
    async fn test_all_checks_pass() {
        let sim = Arc::new(SimulatedCluster::new());
        sim.insert_entity(entity("DB1"));
        sim.insert_disconnect("DB1", disconnect(40));
        let confirmer = Scripted::new(&[]);

        let report = run(sim.clone(), confirmer.clone(), "DB1").await;
        assert!(report.passed());
        assert!(report.verdict.passed());
        assert_eq!(report.verdict.results().len(), 7);
        assert_eq!(confirmer.asked.load(Ordering::SeqCst), 0);
        let ctx = report.into_context().unwrap();
        assert_eq!(ctx.window.days(), 30);
        assert!(ctx.topology.is_empty());
        assert!(sim.journal().is_empty());
    }

    #[tokio::test]
    async fn test_missing_entity_is_not_found() {
        let sim = Arc::new(SimulatedCluster::new());
        let report = run(sim, Scripted::new(&[]), "NOPE").await;
        assert!(matches!(report.error(), Some(ReinitError::NotFound(_))));
        assert_eq!(report.verdict.results().len(), 1);
        assert_eq!(report.verdict.failure().unwrap().kind, CheckKind::Existence);
    }

    #[tokio::test]
    async fn test_residual_reference_blocks() {
        let sim = Arc::new(SimulatedCluster::new());
        sim.insert_entity(entity("DB1"));
        sim.insert_identity(Identity {
            name: "alice".to_string(),
            home_entity: None,
            archive_entity: Some("DB1".to_string()),
        });

        let report = run(sim, Scripted::new(&[]), "DB1").await;
        let failure = report.verdict.failure().unwrap();
        assert_eq!(failure.kind, CheckKind::ResidualReferences);
        assert_eq!(failure.outcome, CheckOutcome::FailedHard);
        assert!(failure.message.contains("alice"));
    }

    #[tokio::test]
    async fn test_system_identities_are_ignored() {
        let sim = Arc::new(SimulatedCluster::new());
        sim.insert_entity(entity("DB1"));
        sim.insert_identity(Identity {
            name: "HealthMailbox0a1b2c".to_string(),
            home_entity: Some("DB1".to_string()),
            archive_entity: None,
        });

        let report = run(sim, Scripted::new(&[]), "DB1").await;
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_statistics_error_when_mounted_is_hard() {
        let sim = Arc::new(SimulatedCluster::new());
        sim.insert_entity(entity("DB1"));
        sim.make_statistics_unavailable();
        let confirmer = Scripted::new(&[true]);

        let report = run(sim, confirmer.clone(), "DB1").await;
        let failure = report.verdict.failure().unwrap();
        assert_eq!(failure.kind, CheckKind::UsageStatistics);
        assert_eq!(failure.outcome, CheckOutcome::FailedHard);
        assert_eq!(confirmer.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dismounted_entity_can_be_overridden() {
        let sim = Arc::new(SimulatedCluster::new());
        let mut e = entity("DB1");
        e.mounted = false;
        sim.insert_entity(e);
        let confirmer = Scripted::new(&[true]);

        let report = run(sim, confirmer.clone(), "DB1").await;
        assert!(report.passed());
        assert_eq!(report.verdict.overridden().count(), 1);
        let ctx = report.context().unwrap();
        assert!(!ctx.statistics_available);
        assert!(ctx.last_disconnect.is_none());
    }

    #[tokio::test]
    async fn test_dismounted_entity_declined() {
        let sim = Arc::new(SimulatedCluster::new());
        let mut e = entity("DB1");
        e.mounted = false;
        sim.insert_entity(e);

        let report = run(sim, Scripted::new(&[false]), "DB1").await;
        assert!(matches!(
            report.error(),
            Some(ReinitError::PreconditionDeclined { check, .. }) if check == "usage_statistics"
        ));
        assert_eq!(report.verdict.failure().unwrap().outcome, CheckOutcome::FailedSoft);
    }

    #[tokio::test]
    async fn test_recovery_database_rejected() {
        let sim = Arc::new(SimulatedCluster::new());
        let mut e = entity("RDB1");
        e.recovery = true;
        sim.insert_entity(e);

        let report = run(sim, Scripted::new(&[]), "RDB1").await;
        assert_eq!(report.verdict.failure().unwrap().kind, CheckKind::RecoveryFlag);
        assert_eq!(report.verdict.results().len(), 4);
    }

    #[tokio::test]
    async fn test_topology_failure_is_hard() {
        let sim = Arc::new(SimulatedCluster::new());
        sim.insert_entity(entity("DB1"));
        sim.fail_operation("get_copies");

        let report = run(sim, Scripted::new(&[]), "DB1").await;
        assert!(matches!(report.error(), Some(ReinitError::TopologyUnavailable(_))));
        assert_eq!(report.verdict.failure().unwrap().kind, CheckKind::TopologyCapture);
    }

    #[tokio::test]
    async fn test_lagged_copy_widens_window_and_prompts() {
        let sim = Arc::new(SimulatedCluster::new());
        let mut e = entity("DB2");
        e.retention_days = 3;
        sim.insert_entity(e);
        sim.insert_copy(
            "DB2",
            ReplicaCopy {
                name: "DB2\\MBX3".to_string(),
                host_server: "MBX3".to_string(),
                activation_preference: 2,
                lag_enabled: true,
                lag_days: 7,
                status: CopyStatus::Healthy,
                activation_suspended: false,
            },
        );
        sim.insert_disconnect("DB2", disconnect(5));
        let confirmer = Scripted::new(&[false]);

        let report = run(sim, confirmer.clone(), "DB2").await;
        let failure = report.verdict.failure().unwrap();
        assert_eq!(failure.kind, CheckKind::SafetyWindow);
        assert!(failure.message.contains("7-day window"));
        let prompts = confirmer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("2024-06-03"));
    }

    #[tokio::test]
    async fn test_safety_window_override() {
        let sim = Arc::new(SimulatedCluster::new());
        sim.insert_entity(entity("DB1"));
        sim.insert_disconnect("DB1", disconnect(2));

        let report = run(sim, Scripted::new(&[true]), "DB1").await;
        assert!(report.passed());
        let last = report.verdict.results().last().unwrap();
        assert_eq!(last.kind, CheckKind::SafetyWindow);
        assert_eq!(last.outcome, CheckOutcome::Overridden);
    }

    #[test]
    fn test_render_tags() {
        let mut v = PrecheckVerdict::default();
        v.push(CheckKind::Existence, CheckOutcome::Passed, "ok".to_string());
        v.push(CheckKind::ResidualReferences, CheckOutcome::FailedHard, "bob".to_string());
        let text = v.render();
        assert!(text.contains("1. [PASS] existence: ok"));
        assert!(text.contains("2. [FAIL] residual_references: bob"));
        assert!(!v.passed());
    }
}
