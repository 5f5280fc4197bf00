//! In-memory cluster backend.
//!
//! `SimulatedCluster` implements every capability trait over an inventory
//! that can be built in code or loaded from JSON. It journals each mutating
//! call, can fail chosen operations, and can hold writes back for a number
//! of reads to mimic a lazily replicated directory. Tests use it to assert
//! call order and zero-mutation guarantees; the CLI uses it for rehearsals.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{
    BackendResult, DirectoryLookup, EntityManagement, RemoteFileOps, StatisticsService,
};
use crate::error::BackendError;
use crate::model::{CopyStatus, DatabaseRecord, DisconnectRecord, Identity, ReplicaCopy};

/// Serializable starting state of a simulated cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// Database entities.
    #[serde(default)]
    pub entities: Vec<DatabaseRecord>,
    /// Copies keyed by entity name.
    #[serde(default)]
    pub copies: BTreeMap<String, Vec<ReplicaCopy>>,
    /// Directory identities.
    #[serde(default)]
    pub identities: Vec<Identity>,
    /// Disconnect records keyed by entity name.
    #[serde(default)]
    pub disconnects: BTreeMap<String, Vec<DisconnectRecord>>,
    /// Reads that still observe the previous value after a write.
    #[serde(default)]
    pub stale_reads: u32,
}

/// A journaled mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation name, e.g. `remove_copy`.
    pub op: &'static str,
    /// Entity, copy or directory the call addressed.
    pub target: String,
}

#[derive(Debug, Clone)]
enum Change {
    CircularLogging(String, bool),
    ProvisioningExcluded(String, bool),
    CopyStatus(String, CopyStatus),
    ActivationSuspended(String),
}

#[derive(Debug)]
struct Pending {
    reads_left: u32,
    change: Change,
}

#[derive(Debug, Default)]
struct SimState {
    inventory: Inventory,
    pending: Vec<Pending>,
    journal: Vec<Call>,
    failures: HashSet<(String, Option<String>)>,
    stuck: HashSet<String>,
    stalled_seeds: HashSet<String>,
    unavailable_stats: bool,
    deleted: Vec<(String, String)>,
}

impl SimState {
    fn entity_mut(&mut self, name: &str) -> BackendResult<&mut DatabaseRecord> {
        self.inventory
            .entities
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))
    }

    fn copy_mut(&mut self, copy_name: &str) -> BackendResult<&mut ReplicaCopy> {
        self.inventory
            .copies
            .values_mut()
            .flat_map(|v| v.iter_mut())
            .find(|c| c.name == copy_name)
            .ok_or_else(|| BackendError::NotFound(copy_name.to_string()))
    }

    fn check_failure(&self, op: &str, target: &str) -> BackendResult<()> {
        let any = (op.to_string(), None);
        let specific = (op.to_string(), Some(target.to_string()));
        if self.failures.contains(&any) || self.failures.contains(&specific) {
            return Err(BackendError::Rejected(format!("{} {}", op, target)));
        }
        Ok(())
    }

    fn record(&mut self, op: &'static str, target: &str) {
        self.journal.push(Call {
            op,
            target: target.to_string(),
        });
    }

    fn write(&mut self, change: Change) {
        if let Change::CopyStatus(ref copy, _) | Change::ActivationSuspended(ref copy) = change {
            if self.stuck.contains(copy) {
                return;
            }
        }
        let reads_left = self.inventory.stale_reads;
        if reads_left == 0 {
            self.apply(change);
        } else {
            self.pending.push(Pending { reads_left, change });
        }
    }

    fn apply(&mut self, change: Change) {
        // Targets may have been removed meanwhile; a dropped write is fine.
        match change {
            Change::CircularLogging(name, on) => {
                if let Ok(e) = self.entity_mut(&name) {
                    e.circular_logging = on;
                }
            }
            Change::ProvisioningExcluded(name, excluded) => {
                if let Ok(e) = self.entity_mut(&name) {
                    e.provisioning_excluded = excluded;
                }
            }
            Change::CopyStatus(copy, status) => {
                if let Ok(c) = self.copy_mut(&copy) {
                    c.status = status;
                }
            }
            Change::ActivationSuspended(copy) => {
                if let Ok(c) = self.copy_mut(&copy) {
                    c.activation_suspended = true;
                }
            }
        }
    }

    /// Called after every read: ages pending writes and applies due ones.
    fn tick(&mut self) {
        let mut due = Vec::new();
        self.pending.retain_mut(|p| {
            p.reads_left -= 1;
            if p.reads_left == 0 {
                due.push(p.change.clone());
                false
            } else {
                true
            }
        });
        for change in due {
            self.apply(change);
        }
    }
}

/// In-memory implementation of every capability trait.
#[derive(Debug, Default)]
pub struct SimulatedCluster {
    state: Mutex<SimState>,
}

impl SimulatedCluster {
    /// Empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster starting from `inventory`.
    pub fn from_inventory(inventory: Inventory) -> Self {
        Self {
            state: Mutex::new(SimState {
                inventory,
                ..SimState::default()
            }),
        }
    }

    /// Loads an [`Inventory`] from a JSON file.
    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let inventory: Inventory = serde_json::from_str(&contents)?;
        Ok(Self::from_inventory(inventory))
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces an entity.
    pub fn insert_entity(&self, entity: DatabaseRecord) {
        let mut state = self.state();
        state.inventory.entities.retain(|e| e.name != entity.name);
        state.inventory.entities.push(entity);
    }

    /// Adds a copy of `entity`.
    pub fn insert_copy(&self, entity: &str, copy: ReplicaCopy) {
        let mut state = self.state();
        state
            .inventory
            .copies
            .entry(entity.to_string())
            .or_default()
            .push(copy);
    }

    /// Adds a directory identity.
    pub fn insert_identity(&self, identity: Identity) {
        self.state().inventory.identities.push(identity);
    }

    /// Adds a disconnect record for `entity`.
    pub fn insert_disconnect(&self, entity: &str, record: DisconnectRecord) {
        self.state()
            .inventory
            .disconnects
            .entry(entity.to_string())
            .or_default()
            .push(record);
    }

    /// Later writes stay invisible for `reads` reads.
    pub fn set_stale_reads(&self, reads: u32) {
        self.state().inventory.stale_reads = reads;
    }

    /// Fails every call of `op`.
    pub fn fail_operation(&self, op: &str) {
        self.state().failures.insert((op.to_string(), None));
    }

    /// Fails calls of `op` addressed to `target`.
    pub fn fail_operation_for(&self, op: &str, target: &str) {
        self.state()
            .failures
            .insert((op.to_string(), Some(target.to_string())));
    }

    /// Status writes for `copy_name` never become visible.
    pub fn stick_copy(&self, copy_name: &str) {
        self.state().stuck.insert(copy_name.to_string());
    }

    /// Seeding of `copy_name` starts but never reaches Healthy.
    pub fn stall_seeding(&self, copy_name: &str) {
        self.state().stalled_seeds.insert(copy_name.to_string());
    }

    /// Statistics calls fail from now on.
    pub fn make_statistics_unavailable(&self) {
        self.state().unavailable_stats = true;
    }

    /// Every mutating call so far, in order.
    pub fn journal(&self) -> Vec<Call> {
        self.state().journal.clone()
    }

    /// Targets of the journaled calls of `op`.
    pub fn calls(&self, op: &str) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.target.clone())
            .collect()
    }

    /// `(host, directory)` pairs wiped so far.
    pub fn deleted_directories(&self) -> Vec<(String, String)> {
        self.state().deleted.clone()
    }

    /// Current state, bypassing read staleness.
    pub fn entity(&self, name: &str) -> Option<DatabaseRecord> {
        self.state()
            .inventory
            .entities
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }

    /// Current copies, bypassing read staleness.
    pub fn copies(&self, entity: &str) -> Vec<ReplicaCopy> {
        self.state()
            .inventory
            .copies
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DirectoryLookup for SimulatedCluster {
    async fn find_referencing_identities(&self, entity: &str) -> BackendResult<Vec<Identity>> {
        let state = self.state();
        state.check_failure("find_referencing_identities", entity)?;
        Ok(state
            .inventory
            .identities
            .iter()
            .filter(|i| i.references(entity))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EntityManagement for SimulatedCluster {
    async fn get_entity(&self, name: &str) -> BackendResult<DatabaseRecord> {
        let mut state = self.state();
        state.check_failure("get_entity", name)?;
        let entity = state.entity_mut(name)?.clone();
        state.tick();
        Ok(entity)
    }

    async fn get_copies(&self, name: &str) -> BackendResult<Vec<ReplicaCopy>> {
        let mut state = self.state();
        state.check_failure("get_copies", name)?;
        state.entity_mut(name)?;
        let copies = state
            .inventory
            .copies
            .get(name)
            .cloned()
            .unwrap_or_default();
        state.tick();
        Ok(copies)
    }

    async fn set_circular_logging(&self, name: &str, enabled: bool) -> BackendResult<()> {
        let mut state = self.state();
        state.check_failure("set_circular_logging", name)?;
        let toggle = format!("{}:{}", name, if enabled { "on" } else { "off" });
        state.check_failure("set_circular_logging", &toggle)?;
        state.entity_mut(name)?;
        state.record("set_circular_logging", name);
        state.write(Change::CircularLogging(name.to_string(), enabled));
        Ok(())
    }

    async fn dismount(&self, name: &str) -> BackendResult<()> {
        let mut state = self.state();
        state.check_failure("dismount", name)?;
        state.record("dismount", name);
        state.entity_mut(name)?.mounted = false;
        Ok(())
    }

    async fn mount(&self, name: &str, force: bool) -> BackendResult<()> {
        let mut state = self.state();
        state.check_failure("mount", name)?;
        state.record("mount", name);
        let deleted = !state.deleted.is_empty();
        let entity = state.entity_mut(name)?;
        if deleted && !force {
            return Err(BackendError::Rejected(format!(
                "{} has no data file; force required",
                name
            )));
        }
        entity.mounted = true;
        Ok(())
    }

    async fn remove_copy(&self, copy_name: &str) -> BackendResult<()> {
        let mut state = self.state();
        state.check_failure("remove_copy", copy_name)?;
        state.record("remove_copy", copy_name);
        let mut found = false;
        for copies in state.inventory.copies.values_mut() {
            let before = copies.len();
            copies.retain(|c| c.name != copy_name);
            found |= copies.len() != before;
        }
        if !found {
            return Err(BackendError::NotFound(copy_name.to_string()));
        }
        state.pending.retain(|p| match &p.change {
            Change::CopyStatus(c, _) | Change::ActivationSuspended(c) => c != copy_name,
            _ => true,
        });
        Ok(())
    }

    async fn add_copy(
        &self,
        name: &str,
        host_server: &str,
        activation_preference: u32,
        lag_days: Option<u32>,
        seed_postponed: bool,
    ) -> BackendResult<()> {
        let copy_name = format!("{}\\{}", name, host_server);
        let mut state = self.state();
        state.check_failure("add_copy", &copy_name)?;
        state.entity_mut(name)?;
        state.record("add_copy", &copy_name);
        let copies = state.inventory.copies.entry(name.to_string()).or_default();
        if copies.iter().any(|c| c.host_server == host_server) {
            return Err(BackendError::Rejected(format!("{} already exists", copy_name)));
        }
        copies.push(ReplicaCopy {
            name: copy_name.clone(),
            host_server: host_server.to_string(),
            activation_preference,
            lag_enabled: lag_days.is_some(),
            lag_days: lag_days.unwrap_or(0),
            status: CopyStatus::Unknown,
            activation_suspended: false,
        });
        let settled = if seed_postponed {
            CopyStatus::Initializing
        } else {
            CopyStatus::Healthy
        };
        state.write(Change::CopyStatus(copy_name, settled));
        Ok(())
    }

    async fn suspend_copy(&self, copy_name: &str, activation_only: bool) -> BackendResult<()> {
        let mut state = self.state();
        state.check_failure("suspend_copy", copy_name)?;
        state.copy_mut(copy_name)?;
        if activation_only {
            state.record("suspend_copy_activation_only", copy_name);
            state.write(Change::ActivationSuspended(copy_name.to_string()));
        } else {
            state.record("suspend_copy", copy_name);
            state.write(Change::CopyStatus(copy_name.to_string(), CopyStatus::Suspended));
        }
        Ok(())
    }

    async fn seed_copy(&self, copy_name: &str, _delete_existing: bool) -> BackendResult<()> {
        let mut state = self.state();
        state.check_failure("seed_copy", copy_name)?;
        if state.copy_mut(copy_name)?.status == CopyStatus::Unknown {
            return Err(BackendError::Rejected(format!(
                "{} has not initialized yet",
                copy_name
            )));
        }
        state.record("seed_copy", copy_name);
        state.copy_mut(copy_name)?.status = CopyStatus::Seeding;
        if !state.stalled_seeds.contains(copy_name) {
            state.write(Change::CopyStatus(copy_name.to_string(), CopyStatus::Healthy));
        }
        Ok(())
    }

    async fn set_provisioning_excluded(&self, name: &str, excluded: bool) -> BackendResult<()> {
        let mut state = self.state();
        state.check_failure("set_provisioning_excluded", name)?;
        state.entity_mut(name)?;
        state.record("set_provisioning_excluded", name);
        state.write(Change::ProvisioningExcluded(name.to_string(), excluded));
        Ok(())
    }
}

#[async_trait]
impl RemoteFileOps for SimulatedCluster {
    async fn delete_all(&self, host: &str, directory: &str) -> BackendResult<()> {
        let mut state = self.state();
        state.check_failure("delete_all", directory)?;
        state.record("delete_all", directory);
        state.deleted.push((host.to_string(), directory.to_string()));
        Ok(())
    }
}

#[async_trait]
impl StatisticsService for SimulatedCluster {
    async fn get_disconnected_stats(&self, entity: &str) -> BackendResult<Vec<DisconnectRecord>> {
        let state = self.state();
        if state.unavailable_stats {
            return Err(BackendError::Unavailable("statistics".to_string()));
        }
        Ok(state
            .inventory
            .disconnects
            .get(entity)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> DatabaseRecord {
        DatabaseRecord {
            name: name.to_string(),
            mounted: true,
            recovery: false,
            retention_days: 14,
            circular_logging: true,
            provisioning_excluded: false,
            host_server: "MBX1".to_string(),
            data_file_path: format!("D:\\{}\\{}.edb", name, name),
            log_directory: format!("D:\\{}\\Logs", name),
        }
    }

    #[tokio::test]
    async fn test_stale_reads_delay_visibility() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity("DB1"));
        sim.set_stale_reads(2);

        sim.set_circular_logging("DB1", false).await.unwrap();
        assert!(sim.get_entity("DB1").await.unwrap().circular_logging);
        assert!(sim.get_entity("DB1").await.unwrap().circular_logging);
        assert!(!sim.get_entity("DB1").await.unwrap().circular_logging);
    }

    #[tokio::test]
    async fn test_add_copy_starts_unknown_then_initializes() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity("DB1"));
        sim.set_stale_reads(1);

        sim.add_copy("DB1", "MBX2", 2, None, true).await.unwrap();
        let first = sim.get_copies("DB1").await.unwrap();
        assert_eq!(first[0].status, CopyStatus::Unknown);
        let second = sim.get_copies("DB1").await.unwrap();
        assert_eq!(second[0].status, CopyStatus::Initializing);
        assert_eq!(second[0].name, "DB1\\MBX2");
    }

    #[tokio::test]
    async fn test_seed_requires_initialized_copy() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity("DB1"));
        sim.set_stale_reads(1);
        sim.add_copy("DB1", "MBX2", 2, None, true).await.unwrap();

        assert!(sim.seed_copy("DB1\\MBX2", true).await.is_err());
        sim.set_stale_reads(0);
        sim.get_copies("DB1").await.unwrap();
        sim.suspend_copy("DB1\\MBX2", false).await.unwrap();
        sim.seed_copy("DB1\\MBX2", true).await.unwrap();
        assert_eq!(sim.copies("DB1")[0].status, CopyStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failures_and_journal() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity("DB1"));
        sim.fail_operation_for("dismount", "DB1");

        assert!(sim.dismount("DB1").await.is_err());
        assert!(sim.journal().is_empty());
        sim.delete_all("MBX1", "D:\\DB1").await.unwrap();
        assert_eq!(sim.calls("delete_all"), vec!["D:\\DB1".to_string()]);
    }

    #[tokio::test]
    async fn test_stuck_copy_never_settles() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity("DB1"));
        sim.stick_copy("DB1\\MBX2");
        sim.add_copy("DB1", "MBX2", 2, None, true).await.unwrap();
        for _ in 0..3 {
            assert_eq!(sim.get_copies("DB1").await.unwrap()[0].status, CopyStatus::Unknown);
        }
    }

    #[tokio::test]
    async fn test_stalled_seed_stays_seeding() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity("DB1"));
        sim.stall_seeding("DB1\\MBX2");
        sim.add_copy("DB1", "MBX2", 2, None, true).await.unwrap();
        sim.seed_copy("DB1\\MBX2", true).await.unwrap();
        for _ in 0..3 {
            assert_eq!(sim.get_copies("DB1").await.unwrap()[0].status, CopyStatus::Seeding);
        }
    }

    #[tokio::test]
    async fn test_mount_after_wipe_requires_force() {
        let sim = SimulatedCluster::new();
        sim.insert_entity(entity("DB1"));
        sim.dismount("DB1").await.unwrap();
        sim.delete_all("MBX1", "D:\\DB1").await.unwrap();
        assert!(sim.mount("DB1", false).await.is_err());
        sim.mount("DB1", true).await.unwrap();
        assert!(sim.entity("DB1").unwrap().mounted);
    }

    #[test]
    fn test_inventory_from_json() {
        let json = r#"{
            "entities": [{
                "name": "DB9", "mounted": true, "recovery": false,
                "retention_days": 30, "circular_logging": false,
                "provisioning_excluded": true, "host_server": "MBX1",
                "data_file_path": "/db/db9.edb", "log_directory": "/db/logs"
            }],
            "copies": { "DB9": [{
                "name": "DB9\\MBX2", "host_server": "MBX2",
                "activation_preference": 2, "lag_enabled": true,
                "lag_days": 7, "status": "Healthy"
            }]}
        }"#;
        let inventory: Inventory = serde_json::from_str(json).unwrap();
        let sim = SimulatedCluster::from_inventory(inventory);
        assert!(sim.entity("DB9").unwrap().provisioning_excluded);
        assert!(!sim.copies("DB9")[0].activation_suspended);
    }
}
