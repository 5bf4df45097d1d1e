//! Error types for dataset loading, validation and cluster annotation.

use std::{fmt, path::PathBuf};
use thiserror::Error;

use crate::data::ClusterId;

/// Failure to load a dataset. The previously active dataset stays in place.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dataset JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dataset is invalid ({} problem(s)): {}", .0.len(), ValidationList(.0))]
    Invalid(Vec<ValidationError>),
}

struct ValidationList<'a>(&'a [ValidationError]);

impl fmt::Display for ValidationList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().take(5).enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        if self.0.len() > 5 {
            write!(f, "; and {} more", self.0.len() - 5)?;
        }
        Ok(())
    }
}

/// A structural problem that blocks loading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("top-level value must be an object")]
    NotAnObject,
    #[error("`cells` is missing or not an array")]
    MissingCells,
    #[error("`cells` is empty")]
    EmptyCells,
    #[error("cell {index} is not an object")]
    CellNotAnObject { index: usize },
    #[error("cell {index}: `{field}` must be numeric")]
    NonNumericField { index: usize, field: &'static str },
    #[error("cell {index}: `cluster` must be a non-negative integer")]
    InvalidClusterId { index: usize },
    #[error("`clusters` is missing or not an array")]
    MissingClusters,
    #[error("cluster entry {index} is not an object with a numeric `id`")]
    ClusterNotAnObject { index: usize },
}

/// A non-blocking problem; loading proceeds with a derived default.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationWarning {
    #[error("`genes` is missing; gene list derived from expression and DE records")]
    MissingGenes,
    #[error("`metadata` is missing; dataset metadata derived from contents")]
    MissingMetadata,
    #[error("cells reference cluster {cluster} which is not listed; a cluster entry was added")]
    UnknownCluster { cluster: ClusterId },
    #[error("cluster {cluster} declares {declared} cells but {actual} are assigned")]
    CellCountMismatch {
        cluster: ClusterId,
        declared: usize,
        actual: usize,
    },
    #[error("cluster {cluster} has no usable color; a palette color was assigned")]
    MissingClusterColor { cluster: ClusterId },
    #[error("cell id `{id}` appears more than once")]
    DuplicateCellId { id: String },
    #[error("cell skipped: {cause}")]
    DroppedCell { cause: ValidationError },
}

/// Rejected cluster edit. No mutation takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("cluster {0} does not exist")]
    UnknownCluster(ClusterId),
    #[error("merge target {0} is also listed as a source")]
    TargetInSources(ClusterId),
    #[error("merge needs at least one source cluster")]
    EmptySources,
    #[error("`{0}` is not a recognised color")]
    InvalidColor(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
