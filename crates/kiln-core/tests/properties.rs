//! Property-based tests for kiln-core scheduling and the cross-thread bridge.
//!
//! Tests execution-order validity on random DAGs, event channel behavior
//! against a bounded-queue model, and parameter coercion bounds using proptest
//! for randomized input generation.

use std::collections::{HashMap, VecDeque};

use proptest::prelude::*;
use kiln_core::{
    CookContext, Event, GraphBuilder, Operator, Output, OutputKind, ParamCell, ParamDescriptor,
    ParamKind, ParamSet, ParamValue, TickInfo, event_channel,
};

/// Sums its inputs plus one, so every output equals the node's
/// longest-path count from the sources.
struct Sum {
    params: ParamSet,
}

impl Operator for Sum {
    fn type_name(&self) -> &'static str {
        "sum"
    }
    fn output_kind(&self) -> OutputKind {
        OutputKind::Value
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
        Output::Value(1.0 + ctx.inputs().filter_map(Output::as_value).sum::<f32>())
    }
}

/// A DAG over `n` nodes: node `i` may only read nodes `< i`. Returned with a
/// random insertion order so the builder never sees a pre-sorted graph.
fn dag() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    (1usize..40).prop_flat_map(|n| {
        let inputs = (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::vec(0..i, 0..4).boxed()
                }
            })
            .collect::<Vec<_>>();
        let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        (inputs, order)
    })
}

#[derive(Debug, Clone)]
enum ChannelOp {
    Push(u32),
    Pop,
}

fn channel_ops() -> impl Strategy<Value = Vec<ChannelOp>> {
    prop::collection::vec(
        prop_oneof![
            3 => any::<u32>().prop_map(ChannelOp::Push),
            2 => Just(ChannelOp::Pop),
        ],
        0..300,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every operator executes after all of its inputs, regardless of the
    /// order operators were added in.
    #[test]
    fn execution_order_respects_edges((inputs, insertion) in dag()) {
        let mut b = GraphBuilder::new();
        for &i in &insertion {
            b.add(format!("n{i}"), Sum { params: ParamSet::new() })
                .unwrap()
                .inputs(inputs[i].iter().map(|j| format!("n{j}")));
        }
        let (mut graph, _) = b.finish(64).unwrap();

        let position: HashMap<String, usize> = graph
            .execution_order()
            .into_iter()
            .enumerate()
            .map(|(p, name)| (name.to_string(), p))
            .collect();
        prop_assert_eq!(position.len(), inputs.len());
        for (i, deps) in inputs.iter().enumerate() {
            for j in deps {
                prop_assert!(
                    position[&format!("n{j}")] < position[&format!("n{i}")],
                    "n{} scheduled before its input n{}", i, j
                );
            }
        }

        let report = graph.cook(&TickInfo::default());
        prop_assert_eq!(report.cooked, inputs.len());
        for i in 0..inputs.len() {
            prop_assert_eq!(graph.is_dirty(&format!("n{i}")), Some(false));
        }
    }

    /// The ring behaves like a bounded FIFO that refuses, and counts, pushes
    /// beyond capacity.
    #[test]
    fn event_channel_matches_bounded_queue(capacity in 1usize..16, ops in channel_ops()) {
        let (mut tx, mut rx) = event_channel(capacity);
        let mut model = VecDeque::new();
        let mut dropped = 0u64;

        for op in ops {
            match op {
                ChannelOp::Push(tag) => {
                    let accepted = tx.push(Event::param_set(tag, tag, 0.0));
                    if model.len() < capacity {
                        model.push_back(tag);
                        prop_assert!(accepted);
                    } else {
                        dropped += 1;
                        prop_assert!(!accepted);
                    }
                }
                ChannelOp::Pop => {
                    let got = rx.pop().map(|e| e.target);
                    prop_assert_eq!(got, model.pop_front());
                }
            }
            prop_assert_eq!(tx.len(), model.len());
            prop_assert_eq!(tx.dropped_count(), dropped);
        }
    }

    /// Whatever is stored, a cell holds a value of its declared kind within
    /// its declared range.
    #[test]
    fn stored_values_stay_in_range(
        kind in prop_oneof![
            Just(ParamKind::Float),
            Just(ParamKind::Int),
            Just(ParamKind::Bool),
            Just(ParamKind::Vec2),
        ],
        raw in -1.0e6f32..1.0e6f32,
    ) {
        let descriptor = match kind {
            ParamKind::Float => ParamDescriptor::float("p", -1.0, 1.0, 0.0),
            ParamKind::Int => ParamDescriptor::int("p", -10, 10, 0),
            ParamKind::Bool => ParamDescriptor::toggle("p", false),
            ParamKind::Vec2 => ParamDescriptor::vec2("p", 0.0, 1.0, [0.0, 0.0]),
        };
        let cell = ParamCell::new(descriptor);
        let value = ParamValue::from_f32(kind, raw);
        cell.store(value).unwrap();

        let stored = cell.load();
        prop_assert_eq!(stored.kind(), kind);
        match stored {
            ParamValue::Float(v) => prop_assert!((-1.0..=1.0).contains(&v)),
            ParamValue::Int(v) => prop_assert!((-10..=10).contains(&v)),
            ParamValue::Bool(_) => {}
            ParamValue::Vec2([x, y]) => {
                prop_assert!((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y));
            }
        }
    }
}
