//! Error types for patch loading and building.

use std::path::PathBuf;

use kiln_core::{BuildError, GraphError};
use thiserror::Error;

/// Errors that can occur while reading a patch or building a graph from it.
#[derive(Debug, Error)]
pub enum PatchError {
    /// Failed to read the patch file
    #[error("failed to read patch '{path}': {source}")]
    ReadFile {
        /// Path of the patch.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse patch: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize patch: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// No registry entry for an operator type
    #[error("operator '{operator}' has unknown type '{type_name}'")]
    UnknownOperator {
        /// Operator name in the patch.
        operator: String,
        /// Requested type.
        type_name: String,
    },

    /// A parameter value that cannot be applied
    #[error("invalid parameter '{param}' for operator '{operator}': {reason}")]
    InvalidParameter {
        /// Operator name in the patch.
        operator: String,
        /// Parameter name.
        param: String,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// The patch describes an invalid graph
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl PatchError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PatchError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(
        operator: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PatchError::InvalidParameter {
            operator: operator.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }
}

impl From<PatchError> for BuildError {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::Graph(graph) => BuildError::Graph(graph),
            other => BuildError::unit(other),
        }
    }
}
