//! Command line surface: argument parsing, the console confirmer and the
//! `check` and `run` subcommands over a simulated cluster.

use crate::backend::{Confirmer, ReportSink, Services, SystemClock};
use crate::config::ReinitConfig;
use crate::lease::RunLease;
use crate::orchestrator::RecreationOrchestrator;
use crate::precheck::{PrecheckPipeline, PrecheckReport};
use crate::report::{CsvReportSink, LogReportSink, MultiReportSink, ReportStage, TopologyReport};
use crate::sim::SimulatedCluster;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Command line of the `dbreinit` binary.
#[derive(Parser)]
#[command(name = "dbreinit")]
#[command(about = "Empty and reinitialize a replicated database's files", long_about = None)]
pub struct Cli {
    /// Config file (.toml or .json)
    #[arg(short, long, env = "DBREINIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cluster inventory (JSON) backing the management interfaces
    #[arg(short, long, env = "DBREINIT_INVENTORY")]
    pub inventory: PathBuf,

    /// Directory for CSV topology reports; overrides the config file
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run the safety checks only
    Precheck {
        /// Database name
        entity: String,
    },
    /// Run the safety checks, then recreate the entity's files
    Recreate {
        /// Database name
        entity: String,
    },
}

/// Reads a yes/no answer from stdin. Only `y` and `yes` count as yes.
pub struct ConsoleConfirmer;

impl Confirmer for ConsoleConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        blocking(|| ask(prompt, &mut std::io::stdin().lock(), &mut std::io::stdout()))
    }
}

/// Runs a blocking call from async code. On a multi-thread runtime the
/// worker hands its other tasks off first; elsewhere the call runs inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn ask(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    if write!(output, "{} [y/N]: ", prompt).is_err() || output.flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    is_yes(&answer)
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

impl Cli {
    /// Loads config and inventory, then runs the chosen subcommand.
    pub async fn run(self) -> Result<()> {
        let mut config = match &self.config {
            Some(path) => ReinitConfig::from_file(path)?,
            None => ReinitConfig::default(),
        };
        if let Some(dir) = &self.report_dir {
            config.report_dir = Some(dir.clone());
        }
        config.validate()?;

        let backend = Arc::new(SimulatedCluster::from_json_file(&self.inventory)?);
        tracing::info!(inventory = %self.inventory.display(), "loaded cluster inventory");

        let mut sinks: Vec<Box<dyn ReportSink>> = vec![Box::new(LogReportSink)];
        if let Some(dir) = &config.report_dir {
            sinks.push(Box::new(CsvReportSink::new(dir.clone())));
        }
        let services = Services::from_backend(
            backend,
            Arc::new(ConsoleConfirmer),
            Arc::new(MultiReportSink(sinks)),
            Arc::new(SystemClock),
        );

        match &self.command {
            Command::Precheck { entity } => {
                let report = self.precheck(&services, &config, entity).await?;
                if let Some(e) = report.error() {
                    anyhow::bail!("prechecks failed: {}", e);
                }
                Ok(())
            }
            Command::Recreate { entity } => self.recreate(&services, &config, entity).await,
        }
    }

    async fn precheck(&self, services: &Services, config: &ReinitConfig, entity: &str) -> Result<PrecheckReport> {
        let pipeline = PrecheckPipeline::new(services, config)?;
        let report = pipeline.run(entity).await;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report.verdict)?);
        } else {
            print!("{}", report.verdict.render());
        }
        Ok(report)
    }

    async fn recreate(&self, services: &Services, config: &ReinitConfig, entity: &str) -> Result<()> {
        let _lease = RunLease::acquire(&config.lease_dir, entity)?;

        let report = self.precheck(services, config, entity).await?;
        let ctx = report.into_context()?;
        if !self.json && !ctx.topology.is_empty() {
            println!("\nCurrent passive copies:");
            let table = TopologyReport::new(
                &ctx.entity.name,
                ReportStage::Before,
                ctx.checked_at,
                ctx.topology.copies(),
            );
            print!("{}", table.render());
        }

        let summary = RecreationOrchestrator::new(services, config).execute(&ctx).await?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!();
            print!("{}", summary.render());
        }
        if !summary.is_clean() {
            tracing::warn!(entity, "finished with items needing manual attention");
        }
        Ok(())
    }
}
