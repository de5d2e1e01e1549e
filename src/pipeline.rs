//! Phase orchestration: detection, then evidence + reporting.
//!
//! Every phase reports a status-tagged [`PhaseStatus`]. Detection that finds
//! nothing is a success with no artifact, which tells the caller to skip the
//! reporting phase.

use std::path::{Path, PathBuf};

use askama::Template;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn, Instrument};

use crate::config::SpikeConfig;
use crate::detect::{AnomalyDetector, DetectError};
use crate::evidence::{self, EvidenceLookup};
use crate::genai::CollaboratorError;
use crate::handoff::{self, HandoffError};
use crate::ingest::{self, IngestError};
use crate::report::{NarrativeSynthesizer, SynthesisPrompt};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error("report synthesis failed: {0}")]
    Synthesis(#[from] CollaboratorError),

    #[error("reporting collaborators unavailable: {0}")]
    Collaborators(CollaboratorError),

    #[error("failed to build synthesis prompt: {0}")]
    Prompt(String),

    #[error("failed to write report {path}: {source}")]
    WriteReport {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Machine-readable phase result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

impl PhaseStatus {
    pub fn error(err: &PipelineError) -> Self {
        Self {
            status: Status::Error,
            message: err.to_string(),
            anomalies_found: None,
            output_file: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Anomalies { count: usize, artifact: PathBuf },
    NoAnomalies,
}

impl DetectionOutcome {
    pub fn status(&self) -> PhaseStatus {
        match self {
            DetectionOutcome::Anomalies { count, artifact } => PhaseStatus {
                status: Status::Success,
                message: format!("Detected {} anomalies.", count),
                anomalies_found: Some(*count),
                output_file: Some(artifact.display().to_string()),
            },
            DetectionOutcome::NoAnomalies => PhaseStatus {
                status: Status::Success,
                message: "No significant anomalies found.".to_string(),
                anomalies_found: Some(0),
                output_file: None,
            },
        }
    }
}

/// Ingest the engagement table, detect spikes and write the handoff artifact.
pub fn run_detection(config: &SpikeConfig) -> Result<DetectionOutcome, PipelineError> {
    info!("Executing data ingestion and anomaly detection");
    let artifact = config.paths.anomaly_file();
    // An artifact on disk must always belong to the latest successful run.
    handoff::clear_anomalies(&artifact)?;

    let detector = AnomalyDetector::new(&config.analysis)?;

    let ingested = ingest::load_observations(&config.paths.data_file)?;
    let detection = detector.detect(ingested.observations);

    info!(
        analyzed = detection.segments_analyzed,
        skipped = detection.segments_skipped,
        anomalies = detection.records.len(),
        "Detection finished"
    );

    if detection.is_empty() {
        info!("No significant anomalies found");
        return Ok(DetectionOutcome::NoAnomalies);
    }

    handoff::write_anomalies(&artifact, &detection.records)?;
    Ok(DetectionOutcome::Anomalies {
        count: detection.records.len(),
        artifact,
    })
}

/// Research each anomaly in the artifact and synthesize the final report.
/// Returns the report path.
pub async fn run_reporting(
    config: &SpikeConfig,
    lookup: &dyn EvidenceLookup,
    synthesizer: &dyn NarrativeSynthesizer,
) -> Result<PathBuf, PipelineError> {
    info!("Executing hypothesis, evidence and reporting");
    let anomalies = handoff::read_anomalies(&config.paths.anomaly_file())?;

    let researched = evidence::gather(lookup, anomalies, config.models.lookup_concurrency).await;

    let prompt = SynthesisPrompt::new(&researched)
        .map_err(|e| PipelineError::Prompt(e.to_string()))?
        .render()
        .map_err(|e| PipelineError::Prompt(e.to_string()))?;

    let report = synthesizer.synthesize(&prompt).await?;

    let path = config.paths.report_file();
    write_report(&path, &report)?;
    info!(path = %path.display(), "Final analysis report saved");
    Ok(path)
}

fn write_report(path: &Path, report: &str) -> Result<(), PipelineError> {
    let err = |source| PipelineError::WriteReport {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(err)?;
    }
    std::fs::write(path, report).map_err(err)
}

/// Outcome of the full two-phase workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub run_id: uuid::Uuid,
    pub detection: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting: Option<PhaseStatus>,
}

/// The evidence and synthesis backends used by the reporting phase.
pub struct Collaborators {
    pub lookup: Box<dyn EvidenceLookup>,
    pub synthesizer: Box<dyn NarrativeSynthesizer>,
}

/// Detection, then reporting only when anomalies were found.
///
/// `collaborators` is only called once detection has produced an artifact, so
/// a missing model key cannot stop detection. Detection errors stop the
/// workflow; reporting errors, including failing to build the collaborators,
/// are surfaced in the summary without affecting the detection result.
pub async fn run_workflow<F>(config: &SpikeConfig, collaborators: F) -> WorkflowSummary
where
    F: FnOnce(&SpikeConfig) -> Result<Collaborators, CollaboratorError>,
{
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("workflow", %run_id);

    async move {
        let outcome = match run_detection(config) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Workflow stopped due to an error in the data analysis phase");
                return WorkflowSummary {
                    run_id,
                    detection: PhaseStatus::error(&e),
                    reporting: None,
                };
            }
        };

        let detection = outcome.status();
        if outcome == DetectionOutcome::NoAnomalies {
            info!("Workflow complete. No anomalies required further investigation");
            return WorkflowSummary {
                run_id,
                detection,
                reporting: None,
            };
        }

        let reporting = match report_with(config, collaborators).await {
            Ok(path) => PhaseStatus {
                status: Status::Success,
                message: "Final analysis report written.".to_string(),
                anomalies_found: None,
                output_file: Some(path.display().to_string()),
            },
            Err(e) => {
                warn!(error = %e, "Reporting phase failed");
                PhaseStatus::error(&e)
            }
        };

        WorkflowSummary {
            run_id,
            detection,
            reporting: Some(reporting),
        }
    }
    .instrument(span)
    .await
}

async fn report_with<F>(config: &SpikeConfig, collaborators: F) -> Result<PathBuf, PipelineError>
where
    F: FnOnce(&SpikeConfig) -> Result<Collaborators, CollaboratorError>,
{
    let Collaborators {
        lookup,
        synthesizer,
    } = collaborators(config).map_err(PipelineError::Collaborators)?;
    run_reporting(config, lookup.as_ref(), synthesizer.as_ref()).await
}
