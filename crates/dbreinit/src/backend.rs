//! Capability interfaces consumed by the reinitialization core.
//!
//! The core never talks to a directory, a management endpoint or a file
//! server directly. Every read and write goes through one of these traits,
//! which lets the test-suite and the rehearsal mode substitute
//! [`crate::sim::SimulatedCluster`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BackendError;
use crate::model::{DatabaseRecord, DisconnectRecord, Identity, ReplicaCopy};
use crate::report::TopologyReport;

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Directory lookup service.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Identities whose home or archive pointer references `entity`.
    async fn find_referencing_identities(&self, entity: &str) -> BackendResult<Vec<Identity>>;
}

/// Entity management interface.
#[async_trait]
pub trait EntityManagement: Send + Sync {
    /// Returns [`BackendError::NotFound`] when the entity does not exist.
    async fn get_entity(&self, name: &str) -> BackendResult<DatabaseRecord>;
    /// All copies of the entity, including the active one.
    async fn get_copies(&self, name: &str) -> BackendResult<Vec<ReplicaCopy>>;
    /// Turns circular logging on or off. The change may be read back late.
    async fn set_circular_logging(&self, name: &str, enabled: bool) -> BackendResult<()>;
    /// Takes the entity offline.
    async fn dismount(&self, name: &str) -> BackendResult<()>;
    /// Brings the entity online. `force` creates fresh files when none exist.
    async fn mount(&self, name: &str, force: bool) -> BackendResult<()>;
    /// Removes one passive copy.
    async fn remove_copy(&self, copy_name: &str) -> BackendResult<()>;
    /// Creates a copy of `name` on `host_server`. `lag_days` enables lag;
    /// `seed_postponed` leaves the copy unseeded.
    async fn add_copy(
        &self,
        name: &str,
        host_server: &str,
        activation_preference: u32,
        lag_days: Option<u32>,
        seed_postponed: bool,
    ) -> BackendResult<()>;
    /// Suspends replication, or with `activation_only` only blocks activation
    /// while log replay continues.
    async fn suspend_copy(&self, copy_name: &str, activation_only: bool) -> BackendResult<()>;
    /// Starts a full reseed of the copy.
    async fn seed_copy(&self, copy_name: &str, delete_existing: bool) -> BackendResult<()>;
    /// Sets whether new content may be placed on the entity.
    async fn set_provisioning_excluded(&self, name: &str, excluded: bool) -> BackendResult<()>;
}

/// Remote file operations on a host server.
#[async_trait]
pub trait RemoteFileOps: Send + Sync {
    /// Deletes every file under `directory` on `host`; blocks until done.
    async fn delete_all(&self, host: &str, directory: &str) -> BackendResult<()>;
}

/// Usage statistics service.
#[async_trait]
pub trait StatisticsService: Send + Sync {
    /// Disconnect records of content formerly homed on `entity`.
    async fn get_disconnected_stats(&self, entity: &str) -> BackendResult<Vec<DisconnectRecord>>;
}

/// Operator confirmation callback.
pub trait Confirmer: Send + Sync {
    /// Returns true when the operator agrees.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Receives before/after topology tables. Fire-and-forget.
pub trait ReportSink: Send + Sync {
    /// Consumes one report. Failures stay inside the sink.
    fn publish(&self, report: &TopologyReport);
}

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the host clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Confirmer that always answers yes.
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Confirmer that always answers no.
pub struct AssumeNo;

impl Confirmer for AssumeNo {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

/// Report sink that drops everything.
pub struct NullReportSink;

impl ReportSink for NullReportSink {
    fn publish(&self, _report: &TopologyReport) {}
}

/// Handles to every external collaborator of a run.
#[derive(Clone)]
pub struct Services {
    /// Directory lookups.
    pub directory: Arc<dyn DirectoryLookup>,
    /// Entity and copy management.
    pub management: Arc<dyn EntityManagement>,
    /// Remote file deletion.
    pub files: Arc<dyn RemoteFileOps>,
    /// Disconnect statistics.
    pub statistics: Arc<dyn StatisticsService>,
    /// Operator prompts.
    pub confirmer: Arc<dyn Confirmer>,
    /// Topology report destination.
    pub reports: Arc<dyn ReportSink>,
    /// Wall-clock source for dates and timestamps.
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Uses one backend object for all four capability interfaces.
    pub fn from_backend<B>(
        backend: Arc<B>,
        confirmer: Arc<dyn Confirmer>,
        reports: Arc<dyn ReportSink>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        B: DirectoryLookup + EntityManagement + RemoteFileOps + StatisticsService + 'static,
    {
        Self {
            directory: backend.clone(),
            management: backend.clone(),
            files: backend.clone(),
            statistics: backend,
            confirmer,
            reports,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(FixedClock(t).now(), t);
    }

    #[test]
    fn test_assume_confirmers() {
        assert!(AssumeYes.confirm("proceed?"));
        assert!(!AssumeNo.confirm("proceed?"));
    }
}
