//! Database file reinitialization: safety prechecks, replica teardown and
//! restoration, and the destructive phase sequence that empties and
//! re-mounts a replicated database while keeping its directory record.

#![warn(missing_docs)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod lease;
pub mod model;
pub mod orchestrator;
pub mod poller;
pub mod precheck;
pub mod replica;
pub mod report;
pub mod sim;
pub mod topology;

pub use backend::{
    AssumeNo, AssumeYes, Clock, Confirmer, DirectoryLookup, EntityManagement, FixedClock,
    NullReportSink, RemoteFileOps, ReportSink, Services, StatisticsService, SystemClock,
};
pub use config::{PollSettings, ReinitConfig};
pub use error::{BackendError, ReinitError, RestorationStepFailure, Result};
pub use lease::RunLease;
pub use model::{CopyStatus, DatabaseRecord, DisconnectRecord, Identity, ReplicaCopy};
pub use orchestrator::{Phase, RecreationOrchestrator, RunSummary};
pub use poller::ConvergencePoller;
pub use precheck::{
    CheckKind, CheckOutcome, CheckResult, PrecheckPipeline, PrecheckReport, PrecheckVerdict,
    RunContext, SafetyWindow,
};
pub use replica::{CopyOutcome, CopyPhase, ReplicaLifecycleController, RestorationReport};
pub use report::{CsvReportSink, LogReportSink, ReportStage, TopologyReport, TopologyRow};
pub use sim::{Inventory, SimulatedCluster};
pub use topology::{TopologyDiff, TopologySnapshot};
