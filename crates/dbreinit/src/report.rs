//! Before and after topology reports and the sinks that receive them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::ReportSink;
use crate::model::ReplicaCopy;

/// When a topology report was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStage {
    /// Captured before teardown.
    Before,
    /// Listed after restoration.
    After,
}

impl ReportStage {
    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStage::Before => "before",
            ReportStage::After => "after",
        }
    }
}

/// One copy in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyRow {
    /// Copy name.
    pub copy_name: String,
    /// Status name.
    pub status: String,
    /// Failover rank.
    pub activation_preference: u32,
    /// Zero when lag is disabled.
    pub lag_days: u32,
    /// Blocked from activation.
    pub activation_suspended: bool,
}

impl From<&ReplicaCopy> for TopologyRow {
    fn from(copy: &ReplicaCopy) -> Self {
        Self {
            copy_name: copy.name.clone(),
            status: copy.status.as_str().to_string(),
            activation_preference: copy.activation_preference,
            lag_days: copy.effective_lag_days(),
            activation_suspended: copy.activation_suspended,
        }
    }
}

/// Table of an entity's passive copies at one stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyReport {
    /// Entity name.
    pub entity: String,
    /// Before or after the run.
    pub stage: ReportStage,
    /// When the table was taken.
    pub taken_at: DateTime<Utc>,
    /// Rows in ascending activation preference.
    pub rows: Vec<TopologyRow>,
}

impl TopologyReport {
    /// Report over `copies`, sorted by preference.
    pub fn new(entity: &str, stage: ReportStage, taken_at: DateTime<Utc>, copies: &[ReplicaCopy]) -> Self {
        let mut rows: Vec<TopologyRow> = copies.iter().map(TopologyRow::from).collect();
        rows.sort_by_key(|r| r.activation_preference);
        Self {
            entity: entity.to_string(),
            stage,
            taken_at,
            rows,
        }
    }

    /// Fixed-width table for terminal output.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{:<30} {:<14} {:>10} {:>8} {:>10}\n",
            "COPY", "STATUS", "PREFERENCE", "LAG(D)", "ACT.SUSP"
        );
        out.push_str(&"-".repeat(76));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&format!(
                "{:<30} {:<14} {:>10} {:>8} {:>10}\n",
                row.copy_name, row.status, row.activation_preference, row.lag_days, row.activation_suspended
            ));
        }
        out
    }
}

/// Writes each report as `<dir>/<entity>-<stage>-<timestamp>.csv`.
pub struct CsvReportSink {
    dir: PathBuf,
}

impl CsvReportSink {
    /// Sink writing under `dir`, created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File the report is written to; the entity name is sanitized.
    pub fn path_for(&self, report: &TopologyReport) -> PathBuf {
        let entity: String = report
            .entity
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!(
            "{}-{}-{}.csv",
            entity,
            report.stage.as_str(),
            report.taken_at.format("%Y%m%dT%H%M%SZ")
        ))
    }

    fn write(&self, path: &Path, report: &TopologyReport) -> Result<(), csv::Error> {
        std::fs::create_dir_all(&self.dir)?;
        let mut writer = csv::Writer::from_path(path)?;
        for row in &report.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ReportSink for CsvReportSink {
    fn publish(&self, report: &TopologyReport) {
        let path = self.path_for(report);
        match self.write(&path, report) {
            Ok(()) => info!(path = %path.display(), stage = report.stage.as_str(), "topology report written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write topology report"),
        }
    }
}

/// Logs every row through `tracing`.
pub struct LogReportSink;

impl ReportSink for LogReportSink {
    fn publish(&self, report: &TopologyReport) {
        for row in &report.rows {
            info!(
                entity = %report.entity,
                stage = report.stage.as_str(),
                copy = %row.copy_name,
                status = %row.status,
                preference = row.activation_preference,
                lag_days = row.lag_days,
                activation_suspended = row.activation_suspended,
                "topology"
            );
        }
    }
}

/// Fans a report out to several sinks.
pub struct MultiReportSink(pub Vec<Box<dyn ReportSink>>);

impl ReportSink for MultiReportSink {
    fn publish(&self, report: &TopologyReport) {
        for sink in &self.0 {
            sink.publish(report);
        }
    }
}
