//! Error types for graph construction, state migration, and reload.
//!
//! Structural errors are returned synchronously to whoever started the build or
//! reload. Advisory runtime conditions (dropped events, audio overload) are never
//! errors: they are counters polled through [`Diagnostics`](crate::Diagnostics).

use thiserror::Error;

use crate::operator::OutputKind;
use crate::param::ParamKind;

/// Boxed error produced by user code: unit loaders and build functions.
pub type UnitError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while constructing or addressing a [`Graph`](crate::Graph).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Computing depths revisited an operator whose depth was still unsettled.
    #[error("cyclic graph: operator '{operator}' depends on itself")]
    CyclicGraph {
        /// Operator at which the revisit was detected.
        operator: String,
    },

    /// Two operators were added under the same name.
    #[error("duplicate operator name: {0}")]
    DuplicateName(String),

    /// A designated output names no operator.
    #[error("designated output '{0}' not found")]
    OutputNotFound(String),

    /// A designated output exists but produces the wrong kind of result.
    #[error("designated output '{operator}' produces {found}, expected {expected}")]
    OutputKindMismatch {
        /// Operator designated as the sink.
        operator: String,
        /// Kind the sink requires.
        expected: OutputKind,
        /// Kind the operator declares.
        found: OutputKind,
    },

    /// An operator lists an input name that was never added.
    #[error("operator '{operator}' references unknown input '{input}'")]
    UnknownInput {
        /// Operator declaring the input.
        operator: String,
        /// Name that did not resolve.
        input: String,
    },

    /// An operator's input lives in the other timing domain.
    #[error("operator '{operator}' cannot read '{input}' across timing domains")]
    CrossDomainInput {
        /// Operator declaring the input.
        operator: String,
        /// Input in the other domain.
        input: String,
    },

    /// No operator with this name exists in the live graph.
    #[error("operator not found: {0}")]
    OperatorNotFound(String),

    /// The operator exposes no parameter with this name.
    #[error("operator '{operator}' has no parameter '{param}'")]
    ParamNotFound {
        /// Operator that was addressed.
        operator: String,
        /// Missing parameter name.
        param: String,
    },

    /// A value of the wrong shape was written to a parameter.
    #[error("parameter '{param}' expects {expected}, got {found}")]
    ParamKindMismatch {
        /// Parameter that rejected the value.
        param: String,
        /// Kind declared by the parameter.
        expected: ParamKind,
        /// Kind of the rejected value.
        found: ParamKind,
    },

    /// A NaN or infinite component was written to a parameter.
    #[error("parameter '{param}' rejects NaN and infinite values")]
    NonFiniteParam {
        /// Parameter that rejected the value.
        param: String,
    },
}

/// Errors encoding or decoding an operator's opaque state blob.
#[derive(Debug, Error)]
pub enum StateError {
    /// Serializing the state failed.
    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),

    /// The blob could not be decoded into the operator's state type.
    #[error("failed to decode state: {0}")]
    Decode(#[source] serde_json::Error),

    /// The blob decoded but does not fit the new operator.
    #[error("incompatible state: {0}")]
    Incompatible(String),
}

/// Errors raised by a unit's build function.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The graph itself was rejected.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The unit failed before producing a graph.
    #[error("build function failed: {0}")]
    Unit(#[source] UnitError),
}

impl BuildError {
    /// Wrap any error raised by user build code.
    pub fn unit(err: impl Into<UnitError>) -> Self {
        BuildError::Unit(err.into())
    }
}

/// A reload attempt was rejected. The previously live graph keeps running.
#[derive(Debug, Error)]
pub enum ReloadError {
    /// Heavy preparation (reading or compiling sources) failed.
    #[error("reload failed: could not prepare unit: {0}")]
    Prepare(#[source] UnitError),

    /// The prepared unit could not be loaded.
    #[error("reload failed: could not load unit: {0}")]
    Load(#[source] UnitError),

    /// The new unit's build function or graph validation failed.
    #[error("reload failed: {0}")]
    Build(#[source] BuildError),
}

impl From<BuildError> for ReloadError {
    fn from(err: BuildError) -> Self {
        ReloadError::Build(err)
    }
}

impl From<GraphError> for ReloadError {
    fn from(err: GraphError) -> Self {
        ReloadError::Build(BuildError::Graph(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn cyclic_graph_display_names_operator() {
        let err = GraphError::CyclicGraph {
            operator: "feedback".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cyclic graph: operator 'feedback' depends on itself"
        );
    }

    #[test]
    fn non_finite_param_display() {
        let err = GraphError::NonFiniteParam {
            param: "gain".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parameter 'gain' rejects NaN and infinite values"
        );
    }

    #[test]
    fn output_kind_mismatch_display() {
        let err = GraphError::OutputKindMismatch {
            operator: "lfo".to_string(),
            expected: OutputKind::Image,
            found: OutputKind::Value,
        };
        assert_eq!(
            err.to_string(),
            "designated output 'lfo' produces value, expected image"
        );
    }

    #[test]
    fn build_error_is_transparent_for_graph_errors() {
        let err: BuildError = GraphError::DuplicateName("a".to_string()).into();
        assert_eq!(err.to_string(), "duplicate operator name: a");
    }

    #[test]
    fn reload_error_mentions_failure_and_keeps_source() {
        let err: ReloadError = GraphError::OutputNotFound("out".to_string()).into();
        let msg = err.to_string();
        assert!(msg.starts_with("reload failed"), "got: {msg}");
        assert!(msg.contains("out"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn unit_error_wraps_strings() {
        let err = BuildError::unit("boom");
        assert_eq!(err.to_string(), "build function failed: boom");
        assert!(err.source().is_some());
    }
}
