// =============================================================================
// artifact.rs — THE CACHE THAT IS ALLOWED TO BE WRONG
// =============================================================================
//
// A trained pipeline is two JSON blobs on disk:
//
//   <name>_model.json       ensemble state (KNN index, SVM, calibration)
//   <name>_vectorizer.json  frozen vocabulary + idf
//
// Both carry the format version and the run id of the training run that
// wrote them. Loading checks all of it: a missing file, a file that does not
// parse, a file from another format version, or two files from different
// runs are each their own ArtifactLoadError kind.
//
// None of those kinds ever reaches the caller of train(). The detector logs
// the kind and retrains. The cache is an optimisation, not a source of truth.
// =============================================================================

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::ensemble::OutlierEnsemble;
use crate::errors::Result;
use crate::vectorizer::TfIdfVectorizer;

/// Bumped whenever the blob layout changes. Older blobs are ignored.
pub const FORMAT_VERSION: u32 = 1;

/// A trained pipeline: fitted ensemble plus the vectorizer it was fit with.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub ensemble: OutlierEnsemble,
    pub vectorizer: TfIdfVectorizer,
}

/// Why a cached artifact could not be used.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("artifact blob {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("artifact blob {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact blob {} has format version {found}, expected {expected}", .path.display())]
    VersionMismatch { path: PathBuf, found: u32, expected: u32 },

    /// The two blobs do not belong together.
    #[error("artifact blobs do not match: {0}")]
    Mismatched(String),

    #[error("failed to read artifact blob {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArtifactLoadError {
    /// Short kind label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ArtifactLoadError::Missing(_) => "missing",
            ArtifactLoadError::Corrupt { .. } => "corrupt",
            ArtifactLoadError::VersionMismatch { .. } => "version_mismatch",
            ArtifactLoadError::Mismatched(_) => "mismatched",
            ArtifactLoadError::Io { .. } => "io",
        }
    }
}

/// Where trained pipelines are persisted.
pub trait ArtifactStore: Send + Sync {
    fn load(&self) -> std::result::Result<ModelArtifact, ArtifactLoadError>;
    fn save(&self, artifact: &ModelArtifact) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct ModelBlob<E> {
    format_version: u32,
    run_id: Uuid,
    trained_at: DateTime<Utc>,
    ensemble: E,
}

#[derive(Serialize, Deserialize)]
struct VectorizerBlob<V> {
    format_version: u32,
    run_id: Uuid,
    vectorizer: V,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

/// Artifact store backed by two pretty-printed JSON files in one directory.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    model_path: PathBuf,
    vectorizer_path: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            model_path: dir.join(format!("{name}_model.json")),
            vectorizer_path: dir.join(format!("{name}_vectorizer.json")),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            model_path: config.artifact_dir.join(config.model_file_name()),
            vectorizer_path: config.artifact_dir.join(config.vectorizer_file_name()),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn vectorizer_path(&self) -> &Path {
        &self.vectorizer_path
    }
}

impl ArtifactStore for FileArtifactStore {
    fn load(&self) -> std::result::Result<ModelArtifact, ArtifactLoadError> {
        let model: ModelBlob<OutlierEnsemble> = read_blob(&self.model_path)?;
        let vectorizer: VectorizerBlob<TfIdfVectorizer> = read_blob(&self.vectorizer_path)?;

        if model.run_id != vectorizer.run_id {
            return Err(ArtifactLoadError::Mismatched(format!(
                "model run {} vs vectorizer run {}",
                model.run_id, vectorizer.run_id
            )));
        }
        match model.ensemble.n_features() {
            Some(n) if n == vectorizer.vectorizer.n_features() => {}
            Some(n) => {
                return Err(ArtifactLoadError::Mismatched(format!(
                    "ensemble expects {n} features, vectorizer produces {}",
                    vectorizer.vectorizer.n_features()
                )))
            }
            None => return Err(ArtifactLoadError::Mismatched("ensemble was never fitted".to_string())),
        }

        debug!(
            run_id = %model.run_id,
            trained_at = %model.trained_at,
            model = %self.model_path.display(),
            "Loaded cached artifact"
        );

        Ok(ModelArtifact {
            run_id: model.run_id,
            trained_at: model.trained_at,
            ensemble: model.ensemble,
            vectorizer: vectorizer.vectorizer,
        })
    }

    fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        for path in [&self.model_path, &self.vectorizer_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let model = ModelBlob {
            format_version: FORMAT_VERSION,
            run_id: artifact.run_id,
            trained_at: artifact.trained_at,
            ensemble: &artifact.ensemble,
        };
        let vectorizer = VectorizerBlob {
            format_version: FORMAT_VERSION,
            run_id: artifact.run_id,
            vectorizer: &artifact.vectorizer,
        };

        fs::write(&self.vectorizer_path, serde_json::to_vec_pretty(&vectorizer)?)?;
        fs::write(&self.model_path, serde_json::to_vec_pretty(&model)?)?;

        debug!(
            run_id = %artifact.run_id,
            model = %self.model_path.display(),
            vectorizer = %self.vectorizer_path.display(),
            "Saved artifact"
        );
        Ok(())
    }
}

fn read_blob<T>(path: &Path) -> std::result::Result<T, ArtifactLoadError>
where
    T: for<'de> Deserialize<'de>,
{
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArtifactLoadError::Missing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ArtifactLoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let corrupt = |source| ArtifactLoadError::Corrupt {
        path: path.to_path_buf(),
        source,
    };

    let probe: VersionProbe = serde_json::from_slice(&bytes).map_err(corrupt)?;
    if probe.format_version != FORMAT_VERSION {
        return Err(ArtifactLoadError::VersionMismatch {
            path: path.to_path_buf(),
            found: probe.format_version,
            expected: FORMAT_VERSION,
        });
    }
    serde_json::from_slice(&bytes).map_err(corrupt)
}
