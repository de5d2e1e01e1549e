//! TOML configuration for trackspike.
//!
//! Layered model: compiled-in defaults, an optional TOML file (located via
//! the `TRACKSPIKE_CONFIG` environment variable or `./trackspike.toml`), and
//! finally command-line overrides applied by the binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::DetectError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TRACKSPIKE_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for one trackspike run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpikeConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SpikeConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded trackspike configuration");
        Ok(config)
    }

    /// Use `$TRACKSPIKE_CONFIG`, then `./trackspike.toml`, then the
    /// compiled-in analysis defaults. A file that fails to load is skipped.
    pub fn load_or_default() -> Self {
        let mut candidates = Vec::new();
        if let Some(env_path) = std::env::var_os(CONFIG_ENV) {
            candidates.push(PathBuf::from(env_path));
        }
        candidates.push(PathBuf::from("trackspike.toml"));
        Self::load_first(&candidates)
    }

    /// First candidate that exists and parses; defaults when none does.
    pub fn load_first(candidates: &[PathBuf]) -> Self {
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping unusable trackspike config"
                ),
            }
        }
        debug!("no trackspike config found, using default window, threshold and floor");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Parameters of the detection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of preceding observations in the causal window.
    pub window_size: usize,
    /// Multiplier applied to the moving standard deviation.
    pub std_dev_threshold: f64,
    /// Minimum absolute views a point must exceed to be flagged.
    pub absolute_floor: f64,
    /// Compute segments on the rayon thread pool.
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: 2,
            std_dev_threshold: 2.0,
            absolute_floor: 1000.0,
            parallel: false,
        }
    }
}

impl AnalysisConfig {
    /// Reject parameter combinations the engine cannot evaluate.
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.window_size == 0 {
            return Err(DetectError::InvalidConfig(
                "window_size must be at least 1".to_string(),
            ));
        }
        if !self.std_dev_threshold.is_finite() || self.std_dev_threshold < 0.0 {
            return Err(DetectError::InvalidConfig(format!(
                "std_dev_threshold must be a finite non-negative number, got {}",
                self.std_dev_threshold
            )));
        }
        if !self.absolute_floor.is_finite() {
            return Err(DetectError::InvalidConfig(format!(
                "absolute_floor must be finite, got {}",
                self.absolute_floor
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Engagement CSV to analyse.
    pub data_file: PathBuf,
    /// Directory receiving the anomaly artifact and the report.
    pub output_dir: PathBuf,
    pub anomaly_file_name: String,
    pub report_file_name: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data/music_engagement_data.csv"),
            output_dir: PathBuf::from("output"),
            anomaly_file_name: "anomalies.json".to_string(),
            report_file_name: "final_analysis_report.md".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn anomaly_file(&self) -> PathBuf {
        self.output_dir.join(&self.anomaly_file_name)
    }

    pub fn report_file(&self) -> PathBuf {
        self.output_dir.join(&self.report_file_name)
    }
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// Generative model endpoints used by the explanation phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: String,
    /// Model used for search-grounded evidence lookups.
    pub search_model: String,
    /// Model used for the final narrative report.
    pub synthesis_model: String,
    pub request_timeout_secs: u64,
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// Evidence lookups allowed in flight at once.
    pub lookup_concurrency: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            search_model: "gemini-2.5-flash".to_string(),
            synthesis_model: "gemini-2.5-pro".to_string(),
            request_timeout_secs: 60,
            max_retries: 2,
            lookup_concurrency: 4,
            temperature: 0.4,
            max_output_tokens: 8192,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = SpikeConfig::default();

        assert_eq!(cfg.analysis.window_size, 2);
        assert_eq!(cfg.analysis.std_dev_threshold, 2.0);
        assert_eq!(cfg.analysis.absolute_floor, 1000.0);
        assert!(!cfg.analysis.parallel);
        assert_eq!(cfg.paths.anomaly_file(), PathBuf::from("output/anomalies.json"));
        assert_eq!(
            cfg.paths.report_file(),
            PathBuf::from("output/final_analysis_report.md")
        );
        assert_eq!(cfg.models.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.analysis.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[analysis]
window_size = 7
absolute_floor = 250.0
"#;

        let cfg: SpikeConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.analysis.window_size, 7);
        assert_eq!(cfg.analysis.absolute_floor, 250.0);

        // Everything else should be defaults.
        assert_eq!(cfg.analysis.std_dev_threshold, 2.0);
        assert_eq!(cfg.paths.output_dir, PathBuf::from("output"));
        assert_eq!(cfg.models.lookup_concurrency, 4);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: SpikeConfig = toml::from_str("").unwrap();
        let defaults = SpikeConfig::default();

        assert_eq!(cfg.analysis.window_size, defaults.analysis.window_size);
        assert_eq!(cfg.paths.data_file, defaults.paths.data_file);
        assert_eq!(cfg.models.synthesis_model, defaults.models.synthesis_model);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("trackspike.toml");
        std::fs::write(
            &path,
            r#"
[paths]
output_dir = "/tmp/spikes"
"#,
        )
        .unwrap();

        let cfg = SpikeConfig::load(&path).unwrap();
        assert_eq!(cfg.paths.output_dir, PathBuf::from("/tmp/spikes"));
        assert_eq!(cfg.paths.anomaly_file(), PathBuf::from("/tmp/spikes/anomalies.json"));
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = SpikeConfig::load(Path::new("/nonexistent/path/trackspike.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let zero_window = AnalysisConfig {
            window_size: 0,
            ..AnalysisConfig::default()
        };
        assert!(zero_window.validate().is_err());

        let negative_k = AnalysisConfig {
            std_dev_threshold: -1.0,
            ..AnalysisConfig::default()
        };
        assert!(negative_k.validate().is_err());

        let nan_floor = AnalysisConfig {
            absolute_floor: f64::NAN,
            ..AnalysisConfig::default()
        };
        assert!(nan_floor.validate().is_err());
    }

    #[test]
    fn test_load_first_skips_broken_candidates() {
        let dir = tempfile::TempDir::new().unwrap();
        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "analysis = [not toml").unwrap();
        let good = dir.path().join("trackspike.toml");
        std::fs::write(&good, "[analysis]\nwindow_size = 5\n").unwrap();

        let cfg = SpikeConfig::load_first(&[dir.path().join("absent.toml"), broken, good]);
        assert_eq!(cfg.analysis.window_size, 5);
    }

    #[test]
    fn test_load_first_without_usable_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let broken = dir.path().join("trackspike.toml");
        std::fs::write(&broken, "[analysis]\nwindow_size = \"two\"\n").unwrap();

        let cfg = SpikeConfig::load_first(&[dir.path().join("absent.toml"), broken]);
        assert_eq!(cfg.analysis.window_size, AnalysisConfig::default().window_size);
        assert_eq!(cfg.paths.data_file, PathsConfig::default().data_file);
    }
}
