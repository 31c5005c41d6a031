//! Operator graph, scheduler, and demand-driven cooking.
//!
//! A [`Graph`] owns one generation's control operators, stored in execution
//! order, alongside a cached [`Output`] and a dirty flag per operator. Audio
//! operators live in the [`AudioPlan`] produced by the same build; the graph
//! keeps their names, wiring, and shared parameter cells so collaborators can
//! address every operator through one namespace.
//!
//! # Cooking
//!
//! [`Graph::cook`] makes one forward pass per control tick. An operator is
//! recomputed when it is dirty: explicitly marked, a parameter changed, it
//! cooks every tick, or an input recomputed earlier in the same pass. A
//! recomputed operator marks its dependents dirty before they are visited,
//! which is sound because dependents always come later in execution order.
//! Clean operators keep their cached output untouched.
//!
//! # Modules
//!
//! - `builder`: name-based construction and validation ([`GraphBuilder`])
//! - `schedule`: depth-based topological ordering
//! - `plan`: the executable audio subgraph ([`AudioPlan`])

mod builder;
mod plan;
mod schedule;

pub use builder::{GraphBuilder, NodeBuilder};
pub use plan::AudioPlan;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::GraphError;
use crate::operator::{CookContext, Domain, Operator, Output, OutputKind, TickInfo};
use crate::param::{ParamCell, ParamDescriptor, ParamSet, ParamValue};

pub(crate) struct ControlNode {
    pub name: String,
    pub op: Box<dyn Operator>,
    pub inputs: Vec<usize>,
    pub dependents: Vec<usize>,
    pub depth: usize,
    pub dirty: bool,
    pub bypassed: bool,
}

pub(crate) struct AudioMeta {
    pub name: String,
    pub type_name: &'static str,
    pub inputs: Vec<usize>,
    pub depth: usize,
    pub params: ParamSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Control(usize),
    Audio(usize),
}

/// Counts from one [`Graph::cook`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookReport {
    /// Operators recomputed this pass.
    pub cooked: usize,
    /// Operators whose cached output was still valid.
    pub skipped: usize,
}

/// A parameter as seen by external tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamInfo {
    /// Static description.
    pub descriptor: ParamDescriptor,
    /// Current value.
    pub value: ParamValue,
    /// Whether a binding drives the value.
    pub bound: bool,
}

/// An operator as seen by external tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInfo {
    /// Unique name.
    pub name: String,
    /// Operator type.
    pub type_name: &'static str,
    /// Timing domain.
    pub domain: Domain,
    /// Declared output kind.
    pub output_kind: OutputKind,
    /// Input names in declaration order.
    pub inputs: Vec<String>,
    /// Topological depth within its domain.
    pub depth: usize,
    /// Whether the operator is bypassed.
    pub bypassed: bool,
    /// Whether the operator is presented in place of the designated output.
    pub soloed: bool,
    /// Parameters with their current values.
    pub params: Vec<ParamInfo>,
}

/// One generation's operators, execution order, and cached outputs.
pub struct Graph {
    nodes: Vec<ControlNode>,
    // Kept apart from `nodes` so an operator can borrow its inputs' outputs
    // while being computed.
    outputs: Vec<Output>,
    audio: Vec<AudioMeta>,
    index: HashMap<String, Slot>,
    output: Option<usize>,
    audio_output: Option<usize>,
    solo: Option<usize>,
}

impl Graph {
    /// Start building a graph.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Run one demand-driven cooking pass.
    ///
    /// Bindings of every parameter in both domains are refreshed first, so the
    /// audio thread sees bound values published once per tick.
    pub fn cook(&mut self, tick: &TickInfo) -> CookReport {
        for meta in &self.audio {
            meta.params.refresh_all();
        }

        let mut report = CookReport::default();
        let nodes = &mut self.nodes;
        let outputs = &mut self.outputs;
        for i in 0..nodes.len() {
            let node = &mut nodes[i];
            let params = node.op.params();
            params.refresh_all();
            if params.take_changed() || node.op.cooks_every_tick() {
                node.dirty = true;
            }
            if !node.dirty {
                report.skipped += 1;
                continue;
            }

            let result = if node.bypassed {
                node.inputs
                    .first()
                    .map(|&j| outputs[j].clone())
                    .unwrap_or_default()
            } else {
                let ctx = CookContext::new(tick, outputs, &node.inputs);
                node.op.compute(&ctx)
            };
            outputs[i] = result;
            node.dirty = false;
            report.cooked += 1;

            for k in 0..nodes[i].dependents.len() {
                let d = nodes[i].dependents[k];
                nodes[d].dirty = true;
            }
        }
        report
    }

    /// Force `name` to recompute on the next cook.
    ///
    /// Audio operators have no cached output; marking one is a no-op.
    pub fn mark_dirty(&mut self, name: &str) -> Result<(), GraphError> {
        if let Slot::Control(i) = self.slot(name)? {
            self.nodes[i].dirty = true;
        }
        Ok(())
    }

    /// Mark every control operator dirty.
    pub fn mark_all_dirty(&mut self) {
        for node in &mut self.nodes {
            node.dirty = true;
        }
    }

    /// Dirty flag of a control operator. `None` for unknown or audio names.
    pub fn is_dirty(&self, name: &str) -> Option<bool> {
        match self.index.get(name)? {
            Slot::Control(i) => Some(self.nodes[*i].dirty),
            Slot::Audio(_) => None,
        }
    }

    /// Cached output of `name`, or `None` while it is dirty.
    pub fn output(&self, name: &str) -> Option<&Output> {
        match self.index.get(name)? {
            Slot::Control(i) => self.cached(*i),
            Slot::Audio(_) => None,
        }
    }

    /// Cached output of the soloed operator, else the designated output.
    ///
    /// Never cooks. Returns `None` if there is no sink or it is dirty.
    pub fn render_output(&self) -> Option<&Output> {
        self.solo.or(self.output).and_then(|i| self.cached(i))
    }

    /// Present `name` instead of the designated output, without rebuilding.
    pub fn solo(&mut self, name: &str) -> Result<(), GraphError> {
        match self.slot(name)? {
            Slot::Control(i) => {
                self.solo = Some(i);
                Ok(())
            }
            Slot::Audio(_) => Err(GraphError::OutputKindMismatch {
                operator: name.to_string(),
                expected: OutputKind::Image,
                found: OutputKind::Audio,
            }),
        }
    }

    /// Return to the designated output.
    pub fn clear_solo(&mut self) {
        self.solo = None;
    }

    /// Currently soloed operator.
    pub fn soloed(&self) -> Option<&str> {
        self.solo.map(|i| self.nodes[i].name.as_str())
    }

    /// Designated image sink.
    pub fn output_name(&self) -> Option<&str> {
        self.output.map(|i| self.nodes[i].name.as_str())
    }

    /// Designated audio sink.
    pub fn audio_output_name(&self) -> Option<&str> {
        self.audio_output.map(|i| self.audio[i].name.as_str())
    }

    /// Pass the first input through instead of computing `name`.
    pub fn set_bypassed(&mut self, name: &str, bypassed: bool) -> Result<(), GraphError> {
        match self.slot(name)? {
            Slot::Control(i) => {
                let node = &mut self.nodes[i];
                if node.bypassed != bypassed {
                    node.bypassed = bypassed;
                    node.dirty = true;
                }
                Ok(())
            }
            Slot::Audio(_) => Err(GraphError::OperatorNotFound(name.to_string())),
        }
    }

    /// Parameter cell `param` of `operator`, in either domain.
    pub fn param(&self, operator: &str, param: &str) -> Result<&Arc<ParamCell>, GraphError> {
        self.params_of(operator)?
            .find(param)
            .ok_or_else(|| GraphError::ParamNotFound {
                operator: operator.to_string(),
                param: param.to_string(),
            })
    }

    /// Assign a literal value, clearing any binding.
    pub fn set_param(
        &self,
        operator: &str,
        param: &str,
        value: ParamValue,
    ) -> Result<(), GraphError> {
        self.param(operator, param)?.store(value)
    }

    /// Drive a parameter from `source` until the next literal assignment.
    pub fn bind_param<F>(&self, operator: &str, param: &str, source: F) -> Result<(), GraphError>
    where
        F: Fn() -> ParamValue + Send + Sync + 'static,
    {
        self.param(operator, param)?.bind(source);
        Ok(())
    }

    /// Current value of a parameter, evaluating its binding.
    pub fn param_value(&self, operator: &str, param: &str) -> Result<ParamValue, GraphError> {
        Ok(self.param(operator, param)?.get())
    }

    /// Index of `param` within `operator`'s parameter set, as addressed by
    /// parameter-set events.
    pub fn param_index(&self, operator: &str, param: &str) -> Option<usize> {
        self.params_of(operator).ok()?.index_of(param)
    }

    /// Position of an audio operator in the audio execution order, for
    /// addressing [`Event`](crate::Event)s.
    pub fn audio_target(&self, name: &str) -> Option<u32> {
        match self.index.get(name)? {
            Slot::Audio(i) => Some(*i as u32),
            Slot::Control(_) => None,
        }
    }

    /// Control operator names in execution order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Audio operator names in execution order.
    pub fn audio_order(&self) -> Vec<&str> {
        self.audio.iter().map(|m| m.name.as_str()).collect()
    }

    /// Whether an operator named `name` exists in either domain.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Total operators across both domains.
    pub fn len(&self) -> usize {
        self.nodes.len() + self.audio.len()
    }

    /// Whether the graph has no operators.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Node list for visualization: control operators, then audio operators,
    /// each in execution order.
    pub fn describe(&self) -> Vec<NodeInfo> {
        let control = self.nodes.iter().enumerate().map(|(i, node)| NodeInfo {
            name: node.name.clone(),
            type_name: node.op.type_name(),
            domain: Domain::Control,
            output_kind: node.op.output_kind(),
            inputs: node
                .inputs
                .iter()
                .map(|&i| self.nodes[i].name.clone())
                .collect(),
            depth: node.depth,
            bypassed: node.bypassed,
            soloed: self.solo == Some(i),
            params: param_infos(node.op.describe_params(), node.op.params()),
        });
        let audio = self.audio.iter().map(|meta| NodeInfo {
            name: meta.name.clone(),
            type_name: meta.type_name,
            domain: Domain::Audio,
            output_kind: OutputKind::Audio,
            inputs: meta
                .inputs
                .iter()
                .map(|&i| self.audio[i].name.clone())
                .collect(),
            depth: meta.depth,
            bypassed: false,
            soloed: false,
            params: param_infos(meta.params.descriptors(), &meta.params),
        });
        control.chain(audio).collect()
    }

    pub(crate) fn operators(&self) -> impl Iterator<Item = (&str, &dyn Operator)> {
        self.nodes.iter().map(|n| (n.name.as_str(), n.op.as_ref()))
    }

    pub(crate) fn operators_mut(
        &mut self,
    ) -> impl Iterator<Item = (&str, &mut (dyn Operator + 'static))> {
        self.nodes
            .iter_mut()
            .map(|n| (n.name.as_str(), n.op.as_mut()))
    }

    fn cached(&self, i: usize) -> Option<&Output> {
        if self.nodes[i].dirty {
            None
        } else {
            self.outputs.get(i)
        }
    }

    fn slot(&self, name: &str) -> Result<Slot, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::OperatorNotFound(name.to_string()))
    }

    fn params_of(&self, name: &str) -> Result<&ParamSet, GraphError> {
        Ok(match self.slot(name)? {
            Slot::Control(i) => self.nodes[i].op.params(),
            Slot::Audio(i) => &self.audio[i].params,
        })
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("order", &self.execution_order())
            .field("audio_order", &self.audio_order())
            .field("output", &self.output_name())
            .field("audio_output", &self.audio_output_name())
            .finish()
    }
}

fn param_infos(descriptors: Vec<ParamDescriptor>, cells: &ParamSet) -> Vec<ParamInfo> {
    descriptors
        .into_iter()
        .map(|descriptor| {
            let cell = cells.find(descriptor.name);
            ParamInfo {
                value: cell.map_or(descriptor.default, |c| c.load()),
                bound: cell.is_some_and(|c| c.is_bound()),
                descriptor,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::ImageHandle;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Sums its inputs plus its `bias` parameter and logs every compute.
    struct Recorder {
        name: &'static str,
        log: Log,
        params: ParamSet,
        every_tick: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Self {
            let mut params = ParamSet::new();
            params.add(ParamDescriptor::float("bias", -100.0, 100.0, 1.0));
            Self {
                name,
                log: Arc::clone(log),
                params,
                every_tick: false,
            }
        }
    }

    impl Operator for Recorder {
        fn type_name(&self) -> &'static str {
            "recorder"
        }
        fn output_kind(&self) -> OutputKind {
            OutputKind::Value
        }
        fn params(&self) -> &ParamSet {
            &self.params
        }
        fn cooks_every_tick(&self) -> bool {
            self.every_tick
        }
        fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
            self.log.lock().unwrap().push(self.name.to_string());
            let sum: f32 = ctx.inputs().filter_map(Output::as_value).sum();
            Output::Value(sum + self.params.get(0).unwrap().load_f32())
        }
    }

    struct Canvas {
        params: ParamSet,
    }

    impl Operator for Canvas {
        fn type_name(&self) -> &'static str {
            "canvas"
        }
        fn output_kind(&self) -> OutputKind {
            OutputKind::Image
        }
        fn params(&self) -> &ParamSet {
            &self.params
        }
        fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
            Output::Image(ImageHandle(ctx.input_value(0).unwrap_or(0.0) as u64))
        }
    }

    fn chain(log: &Log) -> Graph {
        let mut b = Graph::builder();
        b.add("a", Recorder::new("a", log)).unwrap();
        b.add("b", Recorder::new("b", log)).unwrap().input("a");
        b.add("c", Recorder::new("c", log)).unwrap().input("b");
        b.add("out", Canvas { params: ParamSet::new() })
            .unwrap()
            .input("c");
        b.output("out");
        b.finish(64).unwrap().0
    }

    fn drain(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn first_cook_computes_everything_in_order() {
        let log = Log::default();
        let mut g = chain(&log);
        let report = g.cook(&TickInfo::default());
        assert_eq!(report.cooked, 4);
        assert_eq!(drain(&log), vec!["a", "b", "c"]);
        assert_eq!(g.output("c"), Some(&Output::Value(3.0)));
        assert_eq!(g.render_output(), Some(&Output::Image(ImageHandle(3))));
    }

    #[test]
    fn second_cook_is_idle() {
        let log = Log::default();
        let mut g = chain(&log);
        g.cook(&TickInfo::default());
        drain(&log);
        let report = g.cook(&TickInfo::default());
        assert_eq!(report, CookReport { cooked: 0, skipped: 4 });
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn param_change_dirties_downstream_only() {
        let log = Log::default();
        let mut g = chain(&log);
        g.cook(&TickInfo::default());
        drain(&log);

        g.set_param("b", "bias", ParamValue::Float(10.0)).unwrap();
        g.cook(&TickInfo::default());
        assert_eq!(drain(&log), vec!["b", "c"]);
        assert_eq!(g.output("c"), Some(&Output::Value(12.0)));
    }

    #[test]
    fn dirty_output_is_not_readable() {
        let log = Log::default();
        let mut g = chain(&log);
        assert_eq!(g.render_output(), None);
        g.cook(&TickInfo::default());
        g.mark_dirty("out").unwrap();
        assert_eq!(g.is_dirty("out"), Some(true));
        assert_eq!(g.render_output(), None);
    }

    #[test]
    fn every_tick_operator_recomputes() {
        let log = Log::default();
        let mut b = Graph::builder();
        let mut clock = Recorder::new("clock", &log);
        clock.every_tick = true;
        b.add("clock", clock).unwrap();
        b.add("idle", Recorder::new("idle", &log)).unwrap();
        let (mut g, _) = b.finish(64).unwrap();
        g.cook(&TickInfo::default());
        drain(&log);
        g.cook(&TickInfo::default());
        assert_eq!(drain(&log), vec!["clock"]);
    }

    #[test]
    fn bypass_passes_first_input_through() {
        let log = Log::default();
        let mut g = chain(&log);
        g.cook(&TickInfo::default());
        drain(&log);

        g.set_bypassed("b", true).unwrap();
        g.cook(&TickInfo::default());
        assert_eq!(drain(&log), vec!["c"]);
        assert_eq!(g.output("b"), Some(&Output::Value(1.0)));
        assert_eq!(g.output("c"), Some(&Output::Value(2.0)));
    }

    #[test]
    fn solo_overrides_designated_output() {
        let log = Log::default();
        let mut g = chain(&log);
        g.cook(&TickInfo::default());
        g.solo("b").unwrap();
        assert_eq!(g.soloed(), Some("b"));
        assert_eq!(g.render_output(), Some(&Output::Value(2.0)));
        g.clear_solo();
        assert_eq!(g.render_output(), Some(&Output::Image(ImageHandle(3))));
        assert!(matches!(
            g.solo("missing"),
            Err(GraphError::OperatorNotFound(_))
        ));
    }

    #[test]
    fn bound_param_dirties_when_source_moves() {
        let log = Log::default();
        let mut g = chain(&log);
        g.cook(&TickInfo::default());
        drain(&log);

        let source = Arc::new(Mutex::new(5.0f32));
        let s = Arc::clone(&source);
        g.bind_param("c", "bias", move || ParamValue::Float(*s.lock().unwrap()))
            .unwrap();
        g.cook(&TickInfo::default());
        assert_eq!(drain(&log), vec!["c"]);

        g.cook(&TickInfo::default());
        assert!(drain(&log).is_empty(), "unchanged binding must not dirty");

        *source.lock().unwrap() = 7.0;
        g.cook(&TickInfo::default());
        assert_eq!(drain(&log), vec!["c"]);
        assert_eq!(g.output("c"), Some(&Output::Value(9.0)));
    }

    #[test]
    fn describe_lists_inputs_and_params() {
        let log = Log::default();
        let g = chain(&log);
        let info = g.describe();
        assert_eq!(info.len(), 4);
        let c = info.iter().find(|n| n.name == "c").unwrap();
        assert_eq!(c.inputs, vec!["b".to_string()]);
        assert_eq!(c.depth, 2);
        assert_eq!(c.output_kind, OutputKind::Value);
        assert_eq!(c.params[0].descriptor.name, "bias");
        assert_eq!(c.params[0].value, ParamValue::Float(1.0));
    }

    #[test]
    fn unknown_param_is_reported() {
        let log = Log::default();
        let g = chain(&log);
        assert!(matches!(
            g.set_param("a", "nope", ParamValue::Float(0.0)),
            Err(GraphError::ParamNotFound { .. })
        ));
        assert!(matches!(
            g.set_param("zzz", "bias", ParamValue::Float(0.0)),
            Err(GraphError::OperatorNotFound(_))
        ));
    }
}
