//! Patch file format and graph construction.

use std::collections::BTreeMap;
use std::path::Path;

use kiln_core::{GraphBuilder, ParamCell, ParamKind, ParamSet, ParamValue};
use serde::{Deserialize, Serialize};

use crate::error::PatchError;
use crate::registry::{Instance, OperatorRegistry};

/// A declarative graph: operators, their wiring, and the designated sinks.
///
/// # TOML Format
///
/// ```toml
/// output = "canvas"
/// audio_output = "amp"
///
/// [[operator]]
/// name = "lfo"
/// type = "lfo"
/// [operator.params]
/// rate = 0.5
///
/// [[operator]]
/// name = "canvas"
/// type = "solid"
/// inputs = ["lfo"]
///
/// [[operator]]
/// name = "osc"
/// type = "sine"
///
/// [[operator]]
/// name = "amp"
/// type = "gain"
/// inputs = ["osc"]
/// [operator.params]
/// gain = 0.5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Designated image sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Designated audio sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_output: Option<String>,

    /// Operators in declaration order.
    #[serde(default, rename = "operator")]
    pub operators: Vec<OperatorSpec>,
}

/// One `[[operator]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSpec {
    /// Unique name; the key for state migration across reloads.
    pub name: String,

    /// Registry type.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Input operator names in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Initial parameter values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamLiteral>,
}

impl OperatorSpec {
    /// Operator `name` of registry type `type_name`.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            inputs: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// Append an input.
    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    /// Set an initial parameter value.
    pub fn with_param(mut self, name: impl Into<String>, value: ParamLiteral) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}

/// A parameter value as written in a patch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamLiteral {
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Two-element array.
    Pair([f32; 2]),
}

impl ParamLiteral {
    /// Convert to a value of `kind`. Scalars splat into vectors; a pair
    /// only fits a vector.
    pub fn to_value(self, kind: ParamKind) -> Option<ParamValue> {
        let scalar = match self {
            ParamLiteral::Bool(b) => return Some(ParamValue::Bool(b)),
            ParamLiteral::Pair(v) => {
                return (kind == ParamKind::Vec2).then_some(ParamValue::Vec2(v));
            }
            ParamLiteral::Int(i) => {
                if kind == ParamKind::Int {
                    let clamped = i.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
                    return Some(ParamValue::Int(clamped as i32));
                }
                i as f32
            }
            ParamLiteral::Float(f) => {
                let f = f as f32;
                if !f.is_finite() {
                    // Left as a float so the parameter cell rejects it.
                    return Some(ParamValue::Float(f));
                }
                f
            }
        };
        Some(ParamValue::from_f32(kind, scalar))
    }
}

impl Patch {
    /// Load a patch from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PatchError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PatchError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse a patch from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, PatchError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Convert the patch to a TOML string.
    pub fn to_toml(&self) -> Result<String, PatchError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Operator spec by name.
    pub fn get(&self, name: &str) -> Option<&OperatorSpec> {
        self.operators.iter().find(|op| op.name == name)
    }

    /// Number of operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Whether the patch has no operators.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Instantiate every operator through `registry`, apply initial parameter
    /// values, and wire the graph into `builder`.
    pub fn build(
        &self,
        registry: &OperatorRegistry,
        builder: &mut GraphBuilder,
    ) -> Result<(), PatchError> {
        for spec in &self.operators {
            let instance =
                registry
                    .create(&spec.type_name)
                    .ok_or_else(|| PatchError::UnknownOperator {
                        operator: spec.name.clone(),
                        type_name: spec.type_name.clone(),
                    })?;

            let node = match instance {
                Instance::Control(op) => {
                    apply_params(spec, op.params())?;
                    builder.add_boxed(spec.name.as_str(), op)?
                }
                Instance::Audio(op) => {
                    apply_params(spec, op.params())?;
                    builder.add_audio_boxed(spec.name.as_str(), op)?
                }
            };
            node.inputs(spec.inputs.iter().map(String::as_str));
        }

        if let Some(output) = &self.output {
            builder.output(output.as_str());
        }
        if let Some(audio_output) = &self.audio_output {
            builder.audio_output(audio_output.as_str());
        }
        tracing::debug!(
            "patch_build: {} operators, output={:?}, audio_output={:?}",
            self.operators.len(),
            self.output,
            self.audio_output
        );
        Ok(())
    }
}

fn apply_params(spec: &OperatorSpec, params: &ParamSet) -> Result<(), PatchError> {
    for (name, literal) in &spec.params {
        let cell: &ParamCell = params.find(name).ok_or_else(|| {
            PatchError::invalid_parameter(&spec.name, name, "no such parameter")
        })?;
        let kind = cell.descriptor().kind;
        let value = literal.to_value(kind).ok_or_else(|| {
            PatchError::invalid_parameter(&spec.name, name, format!("expected a {kind}"))
        })?;
        cell.store(value)
            .map_err(|e| PatchError::invalid_parameter(&spec.name, name, e.to_string()))?;
    }
    Ok(())
}
