//! Records read from the directory and management interfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Directory record of a database entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    /// Entity name.
    pub name: String,
    /// Online and serving.
    pub mounted: bool,
    /// Recovery-only entity; never a target.
    pub recovery: bool,
    /// Deleted-content retention in days.
    pub retention_days: u32,
    /// Circular logging enabled.
    pub circular_logging: bool,
    /// Excluded from automatic placement of new content.
    pub provisioning_excluded: bool,
    /// Server currently hosting the active copy.
    pub host_server: String,
    /// Data file path on the host server.
    pub data_file_path: String,
    /// Transaction log directory on the host server.
    pub log_directory: String,
}

impl DatabaseRecord {
    /// Directory containing the data file, or `None` when the path has no
    /// directory component. Accepts either path separator, since the path
    /// is interpreted on the host server, not locally.
    pub fn data_directory(&self) -> Option<&str> {
        match self.data_file_path.rfind(['\\', '/'])? {
            0 => Some(&self.data_file_path[..1]),
            idx => Some(&self.data_file_path[..idx]),
        }
    }
}

/// Replication state of a copy as reported by the management interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CopyStatus {
    /// Not yet reported; a freshly added copy starts here.
    Unknown,
    /// Created, not yet replicating.
    Initializing,
    /// Replication paused.
    Suspended,
    /// Full copy in progress.
    Seeding,
    /// Replication broken.
    Failed,
    /// Replicating normally.
    Healthy,
}

impl CopyStatus {
    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Unknown => "Unknown",
            CopyStatus::Initializing => "Initializing",
            CopyStatus::Suspended => "Suspended",
            CopyStatus::Seeding => "Seeding",
            CopyStatus::Failed => "Failed",
            CopyStatus::Healthy => "Healthy",
        }
    }
}

/// One replicated copy of a database on a host server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaCopy {
    /// Copy identity, conventionally `<database>\<server>`.
    pub name: String,
    /// Server hosting the copy.
    pub host_server: String,
    /// Failover rank; lower is preferred.
    pub activation_preference: u32,
    /// Replay lag configured.
    pub lag_enabled: bool,
    /// Configured replay lag; meaningful only when `lag_enabled`.
    pub lag_days: u32,
    /// Last reported status.
    pub status: CopyStatus,
    /// Blocked from activation while still replaying logs.
    #[serde(default)]
    pub activation_suspended: bool,
}

impl ReplicaCopy {
    /// Lag in days, or zero when lag is disabled.
    pub fn effective_lag_days(&self) -> u32 {
        if self.lag_enabled {
            self.lag_days
        } else {
            0
        }
    }

    /// Whether `other` carries the same restorable configuration.
    pub fn same_configuration(&self, other: &ReplicaCopy) -> bool {
        self.host_server == other.host_server
            && self.activation_preference == other.activation_preference
            && self.effective_lag_days() == other.effective_lag_days()
            && self.lag_enabled == other.lag_enabled
    }
}

/// Disconnect timestamp of content formerly homed on the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectRecord {
    /// Name of the disconnected content.
    pub display_name: String,
    /// When it was disconnected.
    pub disconnected_at: DateTime<Utc>,
}

/// A directory identity that may still point at the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity name, matched against the system-identity pattern.
    pub name: String,
    /// Entity holding the identity's primary content.
    #[serde(default)]
    pub home_entity: Option<String>,
    /// Entity holding the identity's archive.
    #[serde(default)]
    pub archive_entity: Option<String>,
}

impl Identity {
    /// Whether either pointer names `entity`.
    pub fn references(&self, entity: &str) -> bool {
        self.home_entity.as_deref() == Some(entity) || self.archive_entity.as_deref() == Some(entity)
    }
}
