//! Captured copy topology and its comparison with the restored one.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::EntityManagement;
use crate::error::{ReinitError, Result};
use crate::model::{DatabaseRecord, ReplicaCopy};

/// Passive copies of an entity as they were before any mutation.
///
/// Immutable once captured; the only record of what must be restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    entity: String,
    copies: Vec<ReplicaCopy>,
}

impl TopologySnapshot {
    /// Builds a snapshot from already-listed copies, dropping the active
    /// copy and ordering by activation preference.
    pub fn from_copies(entity: &DatabaseRecord, copies: Vec<ReplicaCopy>) -> Self {
        let mut copies: Vec<ReplicaCopy> = copies
            .into_iter()
            .filter(|c| c.host_server != entity.host_server)
            .collect();
        copies.sort_by_key(|c| c.activation_preference);
        Self {
            entity: entity.name.clone(),
            copies,
        }
    }

    /// Entity the snapshot belongs to.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Copies in ascending activation preference.
    pub fn copies(&self) -> &[ReplicaCopy] {
        &self.copies
    }

    /// No passive copies were captured.
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    /// Number of captured copies.
    pub fn len(&self) -> usize {
        self.copies.len()
    }

    /// Copies with lag enabled.
    pub fn lagged_copies(&self) -> impl Iterator<Item = &ReplicaCopy> {
        self.copies.iter().filter(|c| c.lag_enabled)
    }

    /// Whether any copy has lag enabled.
    pub fn has_lagged_copy(&self) -> bool {
        self.lagged_copies().next().is_some()
    }

    /// Largest configured lag across lag-enabled copies, 0 if none.
    pub fn max_lag_days(&self) -> u32 {
        self.lagged_copies()
            .map(|c| c.lag_days)
            .max()
            .unwrap_or(0)
    }

    /// Copies in `after` with no configuration match in this snapshot, and
    /// captured copies missing from `after`.
    pub fn diff(&self, after: &[ReplicaCopy]) -> TopologyDiff {
        let unexpected = after
            .iter()
            .filter(|a| !self.copies.iter().any(|c| c.same_configuration(a)))
            .map(|a| a.name.clone())
            .collect();
        let missing = self
            .copies
            .iter()
            .filter(|c| !after.iter().any(|a| c.same_configuration(a)))
            .map(|c| c.name.clone())
            .collect();
        TopologyDiff { unexpected, missing }
    }
}

/// Difference between captured and restored topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDiff {
    /// Restored copies matching no captured configuration.
    pub unexpected: Vec<String>,
    /// Captured copies with no restored match.
    pub missing: Vec<String>,
}

impl TopologyDiff {
    /// Restored topology matches the captured one.
    pub fn is_clean(&self) -> bool {
        self.unexpected.is_empty() && self.missing.is_empty()
    }
}

/// Enumerates the passive copies of `entity`.
pub async fn capture(
    management: &dyn EntityManagement,
    entity: &DatabaseRecord,
) -> Result<TopologySnapshot> {
    let copies = management
        .get_copies(&entity.name)
        .await
        .map_err(|e| ReinitError::TopologyUnavailable(e.to_string()))?;
    debug!(entity = %entity.name, listed = copies.len(), "listed copies");

    let snapshot = TopologySnapshot::from_copies(entity, copies);
    info!(
        entity = %entity.name,
        copies = snapshot.len(),
        max_lag_days = snapshot.max_lag_days(),
        "captured replica topology"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CopyStatus;
    use crate::sim::SimulatedCluster;

    fn entity() -> DatabaseRecord {
        DatabaseRecord {
            name: "DB2".to_string(),
            mounted: true,
            recovery: false,
            retention_days: 14,
            circular_logging: false,
            provisioning_excluded: false,
            host_server: "MBX1".to_string(),
            data_file_path: "D:\\DB2\\DB2.edb".to_string(),
            log_directory: "D:\\DB2\\Logs".to_string(),
        }
    }

    fn copy(server: &str, pref: u32, lag: Option<u32>) -> ReplicaCopy {
        ReplicaCopy {
            name: format!("DB2\\{}", server),
            host_server: server.to_string(),
            activation_preference: pref,
            lag_enabled: lag.is_some(),
            lag_days: lag.unwrap_or(0),
            status: CopyStatus::Healthy,
            activation_suspended: false,
        }
    }

    #[test]
    fn test_from_copies_drops_active_and_sorts() {
        let snapshot = TopologySnapshot::from_copies(
            &entity(),
            vec![
                copy("MBX3", 3, Some(7)),
                copy("MBX1", 1, None),
                copy("MBX2", 2, None),
            ],
        );
        let names: Vec<&str> = snapshot.copies().iter().map(|c| c.host_server.as_str()).collect();
        assert_eq!(names, vec!["MBX2", "MBX3"]);
        assert_eq!(snapshot.entity(), "DB2");
    }

    #[test]
    fn test_max_lag_days() {
        let snapshot = TopologySnapshot::from_copies(
            &entity(),
            vec![copy("MBX2", 2, Some(3)), copy("MBX3", 3, Some(7))],
        );
        assert_eq!(snapshot.max_lag_days(), 7);
        assert!(snapshot.has_lagged_copy());
    }

    #[test]
    fn test_max_lag_zero_without_lagged_copies() {
        let mut unlagged = copy("MBX2", 2, None);
        unlagged.lag_days = 12;
        let snapshot = TopologySnapshot::from_copies(&entity(), vec![unlagged]);
        assert_eq!(snapshot.max_lag_days(), 0);
        assert!(!snapshot.has_lagged_copy());
    }

    #[test]
    fn test_diff_clean_and_dirty() {
        let snapshot = TopologySnapshot::from_copies(
            &entity(),
            vec![copy("MBX2", 2, None), copy("MBX3", 3, Some(7))],
        );
        let mut after = vec![copy("MBX2", 2, None), copy("MBX3", 3, Some(7))];
        after[1].status = CopyStatus::Suspended;
        assert!(snapshot.diff(&after).is_clean());

        after[0].activation_preference = 4;
        let diff = snapshot.diff(&after);
        assert_eq!(diff.unexpected, vec!["DB2\\MBX2".to_string()]);
        assert_eq!(diff.missing, vec!["DB2\\MBX2".to_string()]);
    }

    #[tokio::test]
    async fn test_capture_from_backend() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity());
        sim.insert_copy("DB2", copy("MBX1", 1, None));
        sim.insert_copy("DB2", copy("MBX2", 2, Some(5)));

        let snapshot = capture(&sim, &entity()).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.max_lag_days(), 5);
    }

    #[tokio::test]
    async fn test_capture_listing_failure() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity());
        sim.fail_operation("get_copies");

        let err = capture(&sim, &entity()).await.unwrap_err();
        assert!(matches!(err, ReinitError::TopologyUnavailable(_)));
    }
}
