// =============================================================================
// config.rs — THE KNOBS
// =============================================================================
//
// Every tunable parameter of the impact detector lives here. All values can
// be overridden via environment variables prefixed with IMPACT_DETECTOR_,
// and a .env file is honoured if one happens to be lying around.
//
// The things that are NOT knobs (neighbour count, keyword caps, the impact
// taxonomy) live next to the code that uses them as constants. Turning
// those would change what the model means, not how it runs.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the impact detector pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // ARTIFACTS
    // =========================================================================

    /// Pipeline name. Artifact blobs are named `<name>_model.json` and
    /// `<name>_vectorizer.json`.
    pub model_name: String,

    /// Directory the artifact blobs are read from and written to.
    pub artifact_dir: PathBuf,

    /// Skip the artifact cache and always train from scratch.
    pub force_retrain: bool,

    // =========================================================================
    // DATA
    // =========================================================================

    /// Records file consumed by the runner binary (JSON array or JSON lines).
    pub records_path: PathBuf,

    /// Optional file of query records the runner classifies after training.
    pub query_path: Option<PathBuf>,

    /// Below this many records, training refuses to start.
    /// Default: 10
    pub min_records: usize,

    /// Share of records held out for threshold calibration, in percent.
    /// Default: 10
    pub test_percent: usize,

    /// Seed for the train/test shuffle. Unset means a fresh random seed
    /// per detector instance.
    pub split_seed: Option<u64>,

    // =========================================================================
    // PIPELINE
    // =========================================================================

    /// Minimum time between two preprocessing progress notifications.
    /// Default: 600 seconds.
    pub progress_interval: Duration,

    /// Fuzzy similarity above which a query is an impact job no matter what
    /// the ensemble says. Default: 0.5
    pub fuzzy_threshold: f64,

    /// The one-class SVM's nu (upper bound on the outlier fraction).
    /// Default: 0.5
    pub svm_nu: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model_name: "impact_detector".to_string(),
            artifact_dir: PathBuf::from("."),
            force_retrain: false,
            records_path: PathBuf::from("records.json"),
            query_path: None,
            min_records: 10,
            test_percent: 10,
            split_seed: None,
            progress_interval: Duration::from_secs(600),
            fuzzy_threshold: 0.5,
            svm_nu: 0.5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparseable.
    pub fn from_env() -> Self {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();

        let defaults = Config::default();

        Config {
            model_name: env_or_default("IMPACT_DETECTOR_NAME", &defaults.model_name),
            artifact_dir: PathBuf::from(env_or_default("IMPACT_DETECTOR_ARTIFACT_DIR", ".")),
            force_retrain: parse_flag(&env_or_default("IMPACT_DETECTOR_FORCE_RETRAIN", "false")),

            records_path: PathBuf::from(env_or_default(
                "IMPACT_DETECTOR_RECORDS_PATH",
                "records.json",
            )),
            query_path: env::var("IMPACT_DETECTOR_QUERY_PATH").ok().map(PathBuf::from),
            min_records: env_or_default("IMPACT_DETECTOR_MIN_RECORDS", "10")
                .parse().unwrap_or(defaults.min_records),
            test_percent: env_or_default("IMPACT_DETECTOR_TEST_PERCENT", "10")
                .parse().unwrap_or(defaults.test_percent),
            split_seed: env::var("IMPACT_DETECTOR_SPLIT_SEED")
                .ok()
                .and_then(|raw| raw.parse().ok()),

            progress_interval: Duration::from_secs(
                env_or_default("IMPACT_DETECTOR_PROGRESS_SECS", "600").parse().unwrap_or(600)
            ),
            fuzzy_threshold: env_or_default("IMPACT_DETECTOR_FUZZY_THRESHOLD", "0.5")
                .parse().unwrap_or(defaults.fuzzy_threshold),
            svm_nu: env_or_default("IMPACT_DETECTOR_SVM_NU", "0.5")
                .parse().unwrap_or(defaults.svm_nu),
        }
    }

    /// File name of the serialized ensemble blob.
    pub fn model_file_name(&self) -> String {
        format!("{}_model.json", self.model_name)
    }

    /// File name of the serialized vectorizer blob.
    pub fn vectorizer_file_name(&self) -> String {
        format!("{}_vectorizer.json", self.model_name)
    }
}

/// Read an environment variable with a default fallback.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.min_records, 10);
        assert_eq!(config.test_percent, 10);
        assert_eq!(config.progress_interval, Duration::from_secs(600));
        assert_eq!(config.fuzzy_threshold, 0.5);
        assert!(config.split_seed.is_none());
    }

    #[test]
    fn test_artifact_names_follow_model_name() {
        let config = Config {
            model_name: "impact_detector".to_string(),
            ..Config::default()
        };
        assert_eq!(config.model_file_name(), "impact_detector_model.json");
        assert_eq!(config.vectorizer_file_name(), "impact_detector_vectorizer.json");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("nope"));
    }
}
