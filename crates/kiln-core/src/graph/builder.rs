//! Graph construction.
//!
//! A unit's build function adds operators by name, wires inputs by name, and
//! designates sinks. [`GraphBuilder::finish`] then resolves every input name to
//! an index once, orders both domains, validates the designated outputs, and
//! produces the control [`Graph`] plus the executable [`AudioPlan`]. Any error
//! consumes the builder: no partially ordered graph escapes.

use std::collections::HashMap;

use crate::error::GraphError;
use crate::operator::{AudioOperator, Domain, Operator, Output, OutputKind};

use super::plan::{AudioNode, AudioPlan};
use super::schedule::schedule;
use super::{AudioMeta, ControlNode, Graph, Slot};

enum Body {
    Control(Box<dyn Operator>),
    Audio(Box<dyn AudioOperator>),
}

impl Body {
    fn domain(&self) -> Domain {
        match self {
            Body::Control(_) => Domain::Control,
            Body::Audio(_) => Domain::Audio,
        }
    }

    fn output_kind(&self) -> OutputKind {
        match self {
            Body::Control(op) => op.output_kind(),
            Body::Audio(_) => OutputKind::Audio,
        }
    }
}

struct Entry {
    name: String,
    body: Body,
    inputs: Vec<String>,
}

/// Handle for wiring the operator just added.
pub struct NodeBuilder<'a> {
    entry: &'a mut Entry,
}

impl NodeBuilder<'_> {
    /// Append an input by operator name.
    pub fn input(self, name: impl Into<String>) -> Self {
        self.entry.inputs.push(name.into());
        self
    }

    /// Append several inputs in order.
    pub fn inputs<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry.inputs.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Collects operators, wiring, and sinks for one generation.
#[derive(Default)]
pub struct GraphBuilder {
    entries: Vec<Entry>,
    names: HashMap<String, usize>,
    output: Option<String>,
    audio_output: Option<String>,
}

impl GraphBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a control operator.
    pub fn add<O: Operator + 'static>(
        &mut self,
        name: impl Into<String>,
        op: O,
    ) -> Result<NodeBuilder<'_>, GraphError> {
        self.add_boxed(name, Box::new(op))
    }

    /// Add a boxed control operator.
    pub fn add_boxed(
        &mut self,
        name: impl Into<String>,
        op: Box<dyn Operator>,
    ) -> Result<NodeBuilder<'_>, GraphError> {
        self.push(name.into(), Body::Control(op))
    }

    /// Add an audio operator.
    pub fn add_audio<O: AudioOperator + 'static>(
        &mut self,
        name: impl Into<String>,
        op: O,
    ) -> Result<NodeBuilder<'_>, GraphError> {
        self.add_audio_boxed(name, Box::new(op))
    }

    /// Add a boxed audio operator.
    pub fn add_audio_boxed(
        &mut self,
        name: impl Into<String>,
        op: Box<dyn AudioOperator>,
    ) -> Result<NodeBuilder<'_>, GraphError> {
        self.push(name.into(), Body::Audio(op))
    }

    /// Append `from` to the inputs of the already added operator `to`.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let &idx = self
            .names
            .get(to)
            .ok_or_else(|| GraphError::OperatorNotFound(to.to_string()))?;
        self.entries[idx].inputs.push(from.to_string());
        Ok(())
    }

    /// Designate the image sink.
    pub fn output(&mut self, name: impl Into<String>) {
        self.output = Some(name.into());
    }

    /// Designate the audio sink.
    pub fn audio_output(&mut self, name: impl Into<String>) {
        self.audio_output = Some(name.into());
    }

    /// Whether an operator named `name` was added.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Number of operators added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, name: String, body: Body) -> Result<NodeBuilder<'_>, GraphError> {
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateName(name));
        }
        let idx = self.entries.len();
        self.names.insert(name.clone(), idx);
        self.entries.push(Entry {
            name,
            body,
            inputs: Vec::new(),
        });
        Ok(NodeBuilder {
            entry: &mut self.entries[idx],
        })
    }

    /// Resolve, order, and validate.
    ///
    /// `block_frames` sizes the audio plan's per-operator buffers.
    pub fn finish(self, block_frames: usize) -> Result<(Graph, AudioPlan), GraphError> {
        let GraphBuilder {
            entries,
            names,
            output,
            audio_output,
        } = self;

        // Entry index -> position within its own domain, in insertion order.
        let mut local = Vec::with_capacity(entries.len());
        let (mut n_control, mut n_audio) = (0, 0);
        for entry in &entries {
            match entry.body.domain() {
                Domain::Control => {
                    local.push(n_control);
                    n_control += 1;
                }
                Domain::Audio => {
                    local.push(n_audio);
                    n_audio += 1;
                }
            }
        }

        let mut control_inputs = Vec::with_capacity(n_control);
        let mut audio_inputs = Vec::with_capacity(n_audio);
        for entry in &entries {
            let domain = entry.body.domain();
            let mut resolved = Vec::with_capacity(entry.inputs.len());
            for input in &entry.inputs {
                let &j = names.get(input).ok_or_else(|| GraphError::UnknownInput {
                    operator: entry.name.clone(),
                    input: input.clone(),
                })?;
                if entries[j].body.domain() != domain {
                    return Err(GraphError::CrossDomainInput {
                        operator: entry.name.clone(),
                        input: input.clone(),
                    });
                }
                resolved.push(local[j]);
            }
            match domain {
                Domain::Control => control_inputs.push(resolved),
                Domain::Audio => audio_inputs.push(resolved),
            }
        }

        let domain_names = |domain: Domain| -> Vec<&str> {
            entries
                .iter()
                .filter(|e| e.body.domain() == domain)
                .map(|e| e.name.as_str())
                .collect()
        };
        let cyclic = |names: &[&str], i: usize| GraphError::CyclicGraph {
            operator: names[i].to_string(),
        };
        let control = schedule(&control_inputs)
            .map_err(|i| cyclic(&domain_names(Domain::Control), i))?;
        let audio = schedule(&audio_inputs).map_err(|i| cyclic(&domain_names(Domain::Audio), i))?;

        let sink = |name: &Option<String>, expected: OutputKind| -> Result<Option<usize>, GraphError> {
            let Some(name) = name else {
                return Ok(None);
            };
            let &j = names
                .get(name)
                .ok_or_else(|| GraphError::OutputNotFound(name.clone()))?;
            let found = entries[j].body.output_kind();
            if found != expected {
                return Err(GraphError::OutputKindMismatch {
                    operator: name.clone(),
                    expected,
                    found,
                });
            }
            Ok(Some(local[j]))
        };
        let output_local = sink(&output, OutputKind::Image)?;
        let audio_output_local = sink(&audio_output, OutputKind::Audio)?;
        if output.is_none() {
            tracing::warn!("graph_build: no designated output, nothing will be presented");
        }

        // Split by domain, then move into execution order.
        let mut control_src = Vec::with_capacity(n_control);
        let mut audio_src = Vec::with_capacity(n_audio);
        for entry in entries {
            match entry.body {
                Body::Control(op) => control_src.push(Some((entry.name, op))),
                Body::Audio(op) => audio_src.push(Some((entry.name, op))),
            }
        }

        let control_pos = positions(&control.order);
        let mut nodes: Vec<ControlNode> = Vec::with_capacity(n_control);
        for &old in &control.order {
            let Some((name, op)) = control_src[old].take() else {
                continue;
            };
            nodes.push(ControlNode {
                name,
                op,
                inputs: control_inputs[old].iter().map(|&i| control_pos[i]).collect(),
                dependents: Vec::new(),
                depth: control.depth[old],
                dirty: true,
                bypassed: false,
            });
        }
        for j in 0..nodes.len() {
            for k in 0..nodes[j].inputs.len() {
                let i = nodes[j].inputs[k];
                if !nodes[i].dependents.contains(&j) {
                    nodes[i].dependents.push(j);
                }
            }
        }

        let audio_pos = positions(&audio.order);
        let mut audio_nodes = Vec::with_capacity(n_audio);
        let mut audio_meta = Vec::with_capacity(n_audio);
        for &old in &audio.order {
            let Some((name, op)) = audio_src[old].take() else {
                continue;
            };
            let inputs: Vec<usize> = audio_inputs[old].iter().map(|&i| audio_pos[i]).collect();
            audio_meta.push(AudioMeta {
                name: name.clone(),
                type_name: op.type_name(),
                inputs: inputs.clone(),
                depth: audio.depth[old],
                params: op.params().clone(),
            });
            audio_nodes.push(AudioNode { name, op, inputs });
        }

        let mut index = HashMap::with_capacity(nodes.len() + audio_nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            index.insert(node.name.clone(), Slot::Control(i));
        }
        for (i, node) in audio_nodes.iter().enumerate() {
            index.insert(node.name.clone(), Slot::Audio(i));
        }

        tracing::debug!(
            "graph_build: {} control + {} audio operators in topo order",
            nodes.len(),
            audio_nodes.len()
        );

        let outputs = vec![Output::Empty; nodes.len()];
        let graph = Graph {
            nodes,
            outputs,
            audio: audio_meta,
            index,
            output: output_local.map(|i| control_pos[i]),
            audio_output: audio_output_local.map(|i| audio_pos[i]),
            solo: None,
        };
        let plan = AudioPlan::new(
            audio_nodes,
            audio_output_local.map(|i| audio_pos[i]),
            block_frames,
        );
        Ok((graph, plan))
    }
}

/// Invert an order: `positions(order)[old] == new`.
fn positions(order: &[usize]) -> Vec<usize> {
    let mut pos = vec![0; order.len()];
    for (new, &old) in order.iter().enumerate() {
        pos[old] = new;
    }
    pos
}
