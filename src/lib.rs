//! trackspike -- spike detection and explanation for music engagement data.
//!
//! This crate provides the detection engine (segmentation, causal rolling
//! statistics, classification), the anomaly handoff artifact, and the
//! evidence/report collaborators that explain each spike.

pub mod config;
pub mod detect;
pub mod evidence;
pub mod genai;
pub mod handoff;
pub mod ingest;
pub mod pipeline;
pub mod report;

use config::LoggingConfig;

/// Initialize tracing. `RUST_LOG` wins over the configured level.
pub fn init_tracing(cfg: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // try_init: a second call (tests, embedding) keeps the first subscriber.
    if cfg.json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
