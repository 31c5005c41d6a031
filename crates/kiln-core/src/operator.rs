//! Operator capability interfaces.
//!
//! A control operator implements [`Operator`]; the graph calls
//! [`compute`](Operator::compute) at most once per tick, only when the operator
//! is dirty. An audio operator implements [`AudioOperator`]; the audio block
//! runner calls [`process`](AudioOperator::process) once per block.
//!
//! Both expose the same migration pair, `export_state` / `import_state`, used
//! by [`StateSnapshot`](crate::StateSnapshot) across reloads. Specialized
//! behavior keys off [`OutputKind`] rather than the concrete operator type.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::StateError;
use crate::event::{Event, EventKind};
use crate::param::{ParamDescriptor, ParamSet};
use crate::state::StateBlob;

/// Kind of result an operator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Texture or frame handle.
    Image,
    /// Single scalar.
    Value,
    /// Array of samples or values.
    Buffer,
    /// Mesh handle.
    Geometry,
    /// Audio-domain signal.
    Audio,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Value => "value",
            Self::Buffer => "buffer",
            Self::Geometry => "geometry",
            Self::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// Timing domain an operator runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Per-frame control/graphics thread.
    Control,
    /// Fixed-block real-time audio thread.
    Audio,
}

/// Opaque handle to an image owned by the rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ImageHandle(pub u64);

/// Opaque handle to geometry owned by the mesh backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GeometryHandle(pub u64);

/// A control operator's cached result.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Output {
    /// Nothing computed, or nothing to present.
    #[default]
    Empty,
    /// Image handle.
    Image(ImageHandle),
    /// Scalar.
    Value(f32),
    /// Shared sample or value buffer.
    Buffer(Arc<[f32]>),
    /// Geometry handle.
    Geometry(GeometryHandle),
}

impl Output {
    /// Kind of this result, or `None` for [`Output::Empty`].
    pub fn kind(&self) -> Option<OutputKind> {
        match self {
            Self::Empty => None,
            Self::Image(_) => Some(OutputKind::Image),
            Self::Value(_) => Some(OutputKind::Value),
            Self::Buffer(_) => Some(OutputKind::Buffer),
            Self::Geometry(_) => Some(OutputKind::Geometry),
        }
    }

    /// Scalar view: values as-is, buffers report their last element.
    pub fn as_value(&self) -> Option<f32> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Buffer(b) => b.last().copied(),
            _ => None,
        }
    }

    /// Image handle, if this is an image.
    pub fn as_image(&self) -> Option<ImageHandle> {
        match self {
            Self::Image(h) => Some(*h),
            _ => None,
        }
    }

    /// Buffer contents, if this is a buffer.
    pub fn as_buffer(&self) -> Option<&[f32]> {
        match self {
            Self::Buffer(b) => Some(b),
            _ => None,
        }
    }
}

/// Clock for one control tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickInfo {
    /// Tick counter, starting at 1 for the first cook.
    pub tick: u64,
    /// Seconds since the runtime started.
    pub time: f64,
    /// Seconds since the previous tick.
    pub dt: f64,
}

/// What a control operator sees while computing.
pub struct CookContext<'a> {
    tick: &'a TickInfo,
    outputs: &'a [Output],
    inputs: &'a [usize],
}

impl<'a> CookContext<'a> {
    pub(crate) fn new(tick: &'a TickInfo, outputs: &'a [Output], inputs: &'a [usize]) -> Self {
        Self {
            tick,
            outputs,
            inputs,
        }
    }

    /// Tick counter.
    pub fn tick(&self) -> u64 {
        self.tick.tick
    }

    /// Seconds since start.
    pub fn time(&self) -> f64 {
        self.tick.time
    }

    /// Seconds since the previous tick.
    pub fn dt(&self) -> f64 {
        self.tick.dt
    }

    /// Number of wired inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Cached output of input `i`. Inputs are always clean when read.
    pub fn input(&self, i: usize) -> Option<&'a Output> {
        self.inputs.get(i).and_then(|&idx| self.outputs.get(idx))
    }

    /// Scalar view of input `i`.
    pub fn input_value(&self, i: usize) -> Option<f32> {
        self.input(i).and_then(Output::as_value)
    }

    /// All inputs in declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = &'a Output> + '_ {
        self.inputs.iter().filter_map(|&idx| self.outputs.get(idx))
    }
}

/// A control-domain graph node.
pub trait Operator: Send {
    /// Registry or display name of the operator type.
    fn type_name(&self) -> &'static str;

    /// Kind of result [`compute`](Self::compute) returns.
    fn output_kind(&self) -> OutputKind;

    /// Parameter cells exposed to the outside world.
    fn params(&self) -> &ParamSet;

    /// Produce this tick's output from inputs and parameters.
    fn compute(&mut self, ctx: &CookContext<'_>) -> Output;

    /// Time-driven operators return `true` to recompute every tick.
    fn cooks_every_tick(&self) -> bool {
        false
    }

    /// Serialize everything that must survive a reload.
    fn export_state(&self) -> Result<StateBlob, StateError> {
        Ok(StateBlob::empty())
    }

    /// Reinstate state exported by the previous generation.
    fn import_state(&mut self, _state: &StateBlob) -> Result<(), StateError> {
        Ok(())
    }

    /// Parameter descriptors, for editors and visualization.
    fn describe_params(&self) -> Vec<ParamDescriptor> {
        self.params().descriptors()
    }
}

/// Timing for one audio block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockContext {
    /// Samples per second.
    pub sample_rate: f32,
    /// Frames in this block. Never more than the plan's block size.
    pub frames: usize,
    /// Block counter since the runner started.
    pub block: u64,
}

/// Read-only view of an audio operator's input buffers.
#[derive(Clone, Copy)]
pub struct AudioInputs<'a> {
    buffers: &'a [Vec<f32>],
    indices: &'a [usize],
    frames: usize,
}

impl<'a> AudioInputs<'a> {
    pub(crate) fn new(buffers: &'a [Vec<f32>], indices: &'a [usize], frames: usize) -> Self {
        Self {
            buffers,
            indices,
            frames,
        }
    }

    /// Number of wired inputs.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the operator has no inputs.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Samples of input `i` for this block.
    pub fn get(&self, i: usize) -> Option<&'a [f32]> {
        let buffer = self.buffers.get(*self.indices.get(i)?)?;
        buffer.get(..self.frames)
    }

    /// All inputs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &'a [f32]> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

/// An audio-domain graph node, executed on the real-time thread.
///
/// Implementations must not allocate, lock, or block inside
/// [`process`](Self::process) or [`handle_event`](Self::handle_event).
pub trait AudioOperator: Send {
    /// Registry or display name of the operator type.
    fn type_name(&self) -> &'static str;

    /// Parameter cells. Shared with the control thread.
    fn params(&self) -> &ParamSet;

    /// Render one block into `out` (mono, `ctx.frames` samples).
    fn process(&mut self, ctx: &BlockContext, inputs: AudioInputs<'_>, out: &mut [f32]);

    /// React to an event addressed to this operator.
    ///
    /// The default writes [`EventKind::ParamSet`] to the indexed parameter and
    /// forwards [`EventKind::Reset`] to [`reset`](Self::reset).
    fn handle_event(&mut self, event: &Event) {
        handle_common_event(self, event);
    }

    /// Return to the freshly constructed state.
    fn reset(&mut self) {}

    /// Serialize everything that must survive a reload.
    fn export_state(&self) -> Result<StateBlob, StateError> {
        Ok(StateBlob::empty())
    }

    /// Reinstate state exported by the previous generation.
    fn import_state(&mut self, _state: &StateBlob) -> Result<(), StateError> {
        Ok(())
    }
}

/// Parameter-set and reset handling shared by every audio operator.
///
/// Operators that override [`AudioOperator::handle_event`] for note or
/// trigger events call this for the kinds they do not handle themselves.
pub fn handle_common_event<O: AudioOperator + ?Sized>(op: &mut O, event: &Event) {
    match event.kind {
        EventKind::ParamSet => {
            if let Some(cell) = op.params().get(event.param as usize) {
                cell.store_realtime(event.value);
            }
        }
        EventKind::Reset => op.reset(),
        EventKind::NoteOn | EventKind::NoteOff | EventKind::Trigger => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_kind_matches_variant() {
        assert_eq!(Output::Empty.kind(), None);
        assert_eq!(Output::Value(1.0).kind(), Some(OutputKind::Value));
        assert_eq!(
            Output::Image(ImageHandle(3)).kind(),
            Some(OutputKind::Image)
        );
        let buf: Arc<[f32]> = Arc::from(vec![1.0, 2.0]);
        assert_eq!(Output::Buffer(buf).as_value(), Some(2.0));
    }

    #[test]
    fn cook_context_resolves_input_indices() {
        let tick = TickInfo {
            tick: 4,
            time: 1.0,
            dt: 0.25,
        };
        let outputs = vec![Output::Value(1.0), Output::Empty, Output::Value(3.0)];
        let wiring = [2, 0];
        let ctx = CookContext::new(&tick, &outputs, &wiring);
        assert_eq!(ctx.input_count(), 2);
        assert_eq!(ctx.input_value(0), Some(3.0));
        assert_eq!(ctx.input_value(1), Some(1.0));
        assert_eq!(ctx.input(2), None);
        assert_eq!(ctx.inputs().count(), 2);
    }

    #[test]
    fn audio_inputs_are_trimmed_to_block() {
        let buffers = vec![vec![1.0; 8], vec![2.0; 8]];
        let wiring = [1];
        let inputs = AudioInputs::new(&buffers, &wiring, 3);
        assert_eq!(inputs.get(0), Some(&[2.0, 2.0, 2.0][..]));
        assert_eq!(inputs.get(1), None);
    }

    #[test]
    fn output_kind_display_is_lowercase() {
        assert_eq!(OutputKind::Geometry.to_string(), "geometry");
        assert_eq!(OutputKind::Audio.to_string(), "audio");
    }
}
