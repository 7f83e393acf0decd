//! `medflow`: run the orchestration engine once over a JSON patient batch.
//!
//! Logs go to stderr; results are JSON on stdout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use medflow_core::query::AggregateKind;
use medflow_core::{
    AllocationPlan, ClinicalScorer, Department, HospitalConfig, MedFlowEngine, PatientCase,
    ResourceKind, ResourceSubtype, StateQuery,
};

#[derive(Parser)]
#[command(name = "medflow")]
#[command(about = "Emergency department resource orchestration")]
struct Cli {
    /// Hospital configuration (TOML). Defaults to the built-in ED inventory.
    #[arg(long, global = true, env = "MEDFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Pretty-print the JSON result
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a patient batch without allocating
    Triage {
        /// Patient batch (JSON array, or an object with a `patients` array)
        #[arg(long)]
        batch: PathBuf,
    },
    /// Score and allocate a patient batch
    Allocate {
        /// Patient batch (JSON array, or an object with a `patients` array)
        #[arg(long)]
        batch: PathBuf,
    },
    /// Query hospital state
    Query {
        /// bed, staff or equipment
        #[arg(long)]
        kind: Option<ResourceKind>,
        /// Resource subtype, e.g. icu_bed or ed_physician
        #[arg(long)]
        subtype: Option<ResourceSubtype>,
        /// Owning department
        #[arg(long)]
        department: Option<Department>,
        /// occupancy, least_busy_staff, free_equipment, overloaded_staff or capacity_alerts
        #[arg(long)]
        aggregate: Option<AggregateKind>,
    },
}

/// Accepted batch file shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Patients(Vec<PatientCase>),
    Wrapped { patients: Vec<PatientCase> },
}

impl BatchFile {
    fn into_patients(self) -> Vec<PatientCase> {
        match self {
            BatchFile::Patients(patients) | BatchFile::Wrapped { patients } => patients,
        }
    }
}

#[derive(Serialize)]
struct AllocationReport {
    digest: String,
    plan: AllocationPlan,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let output = run(&cli)?;
    println!("{}", output);
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn run(cli: &Cli) -> Result<String> {
    let value = match &cli.command {
        Commands::Triage { batch } => {
            let patients = load_batch(batch)?;
            let assessments = ClinicalScorer::new().score_batch(&patients);
            serde_json::to_value(assessments)?
        }
        Commands::Allocate { batch } => {
            let patients = load_batch(batch)?;
            let engine = load_engine(cli.config.as_deref())?;
            let plan = engine.run_batch(&patients).context("allocation failed")?;
            info!(
                batch_id = %plan.batch_id,
                patients = plan.outcomes.len(),
                waiting = plan.waiting_patients().len(),
                "Batch allocated"
            );
            let report = AllocationReport {
                digest: plan.digest()?,
                plan,
            };
            serde_json::to_value(report)?
        }
        Commands::Query {
            kind,
            subtype,
            department,
            aggregate,
        } => {
            let engine = load_engine(cli.config.as_deref())?;
            let query = StateQuery {
                kind: *kind,
                subtype: *subtype,
                department: *department,
                aggregate: *aggregate,
            };
            serde_json::to_value(engine.run_query(&query)?)?
        }
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok(output)
}

fn load_engine(config: Option<&Path>) -> Result<MedFlowEngine> {
    let config = match config {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            HospitalConfig::from_toml(&contents)
                .with_context(|| format!("invalid config: {}", path.display()))?
        }
        None => HospitalConfig::emergency_department(),
    };
    MedFlowEngine::from_config(&config).context("failed to build hospital state")
}

fn load_batch(path: &Path) -> Result<Vec<PatientCase>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read batch: {}", path.display()))?;
    let batch: BatchFile = serde_json::from_str(&contents)
        .with_context(|| format!("invalid patient batch: {}", path.display()))?;
    Ok(batch.into_patients())
}
