//! Executable audio subgraph.
//!
//! An [`AudioPlan`] holds the audio operators of one generation in execution
//! order, one preallocated mono buffer per operator, and each operator's
//! inputs as positions in that order. Because inputs always precede their
//! consumers, running a node only needs `split_at_mut` on the buffer list:
//! everything before it is read-only, its own buffer is the output.

use crate::event::Event;
use crate::operator::{AudioInputs, AudioOperator, BlockContext};

pub(crate) struct AudioNode {
    pub name: String,
    pub op: Box<dyn AudioOperator>,
    pub inputs: Vec<usize>,
}

/// Audio operators of one generation, ready to run on the real-time thread.
pub struct AudioPlan {
    nodes: Vec<AudioNode>,
    buffers: Vec<Vec<f32>>,
    sink: Option<usize>,
    block_frames: usize,
}

impl AudioPlan {
    pub(crate) fn new(nodes: Vec<AudioNode>, sink: Option<usize>, block_frames: usize) -> Self {
        let block_frames = block_frames.max(1);
        let buffers = nodes.iter().map(|_| vec![0.0; block_frames]).collect();
        Self {
            nodes,
            buffers,
            sink,
            block_frames,
        }
    }

    /// Number of audio operators.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the plan has no audio operators.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Largest block the plan renders in one pass.
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Operator names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Name of the audio sink, if any.
    pub fn sink_name(&self) -> Option<&str> {
        self.sink.map(|i| self.nodes[i].name.as_str())
    }

    /// Route `event` to its target. Out-of-range targets are ignored.
    pub fn dispatch(&mut self, event: &Event) {
        if let Some(node) = self.nodes.get_mut(event.target as usize) {
            node.op.handle_event(event);
        }
    }

    /// Run every operator once over `ctx.frames` samples (capped at the block
    /// size) and return the sink's buffer.
    pub fn process(&mut self, ctx: &BlockContext) -> Option<&[f32]> {
        let frames = ctx.frames.min(self.block_frames);
        let ctx = BlockContext { frames, ..*ctx };
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let (earlier, rest) = self.buffers.split_at_mut(i);
            let out = &mut rest[0][..frames];
            node.op
                .process(&ctx, AudioInputs::new(earlier, &node.inputs, frames), out);
        }
        self.sink.map(|s| &self.buffers[s][..frames])
    }

    pub(crate) fn operators(&self) -> impl Iterator<Item = (&str, &dyn AudioOperator)> {
        self.nodes.iter().map(|n| (n.name.as_str(), n.op.as_ref()))
    }

    pub(crate) fn operators_mut(
        &mut self,
    ) -> impl Iterator<Item = (&str, &mut (dyn AudioOperator + 'static))> {
        self.nodes
            .iter_mut()
            .map(|n| (n.name.as_str(), n.op.as_mut()))
    }
}

impl std::fmt::Debug for AudioPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPlan")
            .field("nodes", &self.names().collect::<Vec<_>>())
            .field("sink", &self.sink_name())
            .field("block_frames", &self.block_frames)
            .finish()
    }
}
