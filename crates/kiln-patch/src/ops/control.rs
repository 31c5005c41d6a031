//! Reference control-domain operators.

use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::sync::Arc;

use kiln_core::{
    CookContext, ImageHandle, Operator, Output, OutputKind, ParamCell, ParamDescriptor, ParamSet,
    StateBlob, StateError,
};

/// Longest ring a [`History`] keeps.
pub const MAX_HISTORY: i32 = 4096;

/// Emits its `value` parameter.
pub struct Constant {
    params: ParamSet,
    value: Arc<ParamCell>,
}

impl Constant {
    /// Constant with value 0.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let value = params.add(ParamDescriptor::float("value", -1.0e6, 1.0e6, 0.0));
        Self { params, value }
    }
}

impl Default for Constant {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for Constant {
    fn type_name(&self) -> &'static str {
        "constant"
    }
    fn output_kind(&self) -> OutputKind {
        OutputKind::Value
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn compute(&mut self, _ctx: &CookContext<'_>) -> Output {
        Output::Value(self.value.load_f32())
    }
}

/// Sine low-frequency oscillator driven by the control clock.
///
/// The phase is the migrated state, so an edited patch picks the oscillation up
/// where the previous generation left it.
pub struct Lfo {
    params: ParamSet,
    rate: Arc<ParamCell>,
    depth: Arc<ParamCell>,
    center: Arc<ParamCell>,
    phase: f64,
}

impl Lfo {
    /// 1 Hz, unit depth, centered on 0.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let rate = params.add(ParamDescriptor::float("rate", 0.0, 100.0, 1.0));
        let depth = params.add(ParamDescriptor::float("depth", 0.0, 1.0e6, 1.0));
        let center = params.add(ParamDescriptor::float("center", -1.0e6, 1.0e6, 0.0));
        Self {
            params,
            rate,
            depth,
            center,
            phase: 0.0,
        }
    }

    /// Normalized phase in `[0, 1)`.
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for Lfo {
    fn type_name(&self) -> &'static str {
        "lfo"
    }
    fn output_kind(&self) -> OutputKind {
        OutputKind::Value
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn cooks_every_tick(&self) -> bool {
        true
    }
    fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
        self.phase = (self.phase + f64::from(self.rate.load_f32()) * ctx.dt()).rem_euclid(1.0);
        let wave = (self.phase * TAU).sin() as f32;
        Output::Value(self.center.load_f32() + self.depth.load_f32() * wave)
    }
    fn export_state(&self) -> Result<StateBlob, StateError> {
        StateBlob::encode(&self.phase)
    }
    fn import_state(&mut self, state: &StateBlob) -> Result<(), StateError> {
        let phase: f64 = state.decode()?;
        if !phase.is_finite() {
            return Err(StateError::Incompatible(format!("phase {phase}")));
        }
        self.phase = phase.rem_euclid(1.0);
        Ok(())
    }
}

/// Sum of all inputs plus `offset`.
pub struct Add {
    params: ParamSet,
    offset: Arc<ParamCell>,
}

impl Add {
    /// Adder with zero offset.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let offset = params.add(ParamDescriptor::float("offset", -1.0e6, 1.0e6, 0.0));
        Self { params, offset }
    }
}

impl Default for Add {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for Add {
    fn type_name(&self) -> &'static str {
        "add"
    }
    fn output_kind(&self) -> OutputKind {
        OutputKind::Value
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
        let sum: f32 = ctx.inputs().filter_map(Output::as_value).sum();
        Output::Value(sum + self.offset.load_f32())
    }
}

/// Product of all inputs times `scale`.
pub struct Multiply {
    params: ParamSet,
    scale: Arc<ParamCell>,
}

impl Multiply {
    /// Multiplier with unit scale.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let scale = params.add(ParamDescriptor::float("scale", -1.0e6, 1.0e6, 1.0));
        Self { params, scale }
    }
}

impl Default for Multiply {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for Multiply {
    fn type_name(&self) -> &'static str {
        "multiply"
    }
    fn output_kind(&self) -> OutputKind {
        OutputKind::Value
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
        let product: f32 = ctx.inputs().filter_map(Output::as_value).product();
        Output::Value(product * self.scale.load_f32())
    }
}

/// The last `length` values of its first input, oldest first.
///
/// Appends one sample per recompute, so it advances whenever its input
/// changes. The ring is the migrated state, stored as raw `f32` bits so NaN
/// and infinite samples survive a reload.
pub struct History {
    params: ParamSet,
    length: Arc<ParamCell>,
    ring: VecDeque<f32>,
}

impl History {
    /// History of 64 values.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let length = params.add(ParamDescriptor::int("length", 1, MAX_HISTORY, 64));
        Self {
            params,
            length,
            ring: VecDeque::new(),
        }
    }

    fn capacity(&self) -> usize {
        (self.length.load_f32() as usize).max(1)
    }

    fn trim(&mut self) {
        let capacity = self.capacity();
        while self.ring.len() > capacity {
            self.ring.pop_front();
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for History {
    fn type_name(&self) -> &'static str {
        "history"
    }
    fn output_kind(&self) -> OutputKind {
        OutputKind::Buffer
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
        self.ring.push_back(ctx.input_value(0).unwrap_or(0.0));
        self.trim();
        Output::Buffer(self.ring.iter().copied().collect())
    }
    fn export_state(&self) -> Result<StateBlob, StateError> {
        let bits: Vec<u32> = self.ring.iter().map(|v| v.to_bits()).collect();
        StateBlob::encode(&bits)
    }
    fn import_state(&mut self, state: &StateBlob) -> Result<(), StateError> {
        let bits: Vec<u32> = state.decode()?;
        self.ring = bits.into_iter().map(f32::from_bits).collect();
        self.trim();
        Ok(())
    }
}

/// A flat image layer whose intensity follows its first input.
///
/// The handle packs `layer` into the upper 32 bits and the 16-bit intensity
/// into the lower bits, for a renderer that owns the actual textures.
pub struct Solid {
    params: ParamSet,
    layer: Arc<ParamCell>,
    level: Arc<ParamCell>,
}

impl Solid {
    /// Layer 0 at full level.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let layer = params.add(ParamDescriptor::int("layer", 0, i32::from(u16::MAX), 0));
        let level = params.add(ParamDescriptor::float("level", 0.0, 1.0, 1.0));
        Self {
            params,
            layer,
            level,
        }
    }

    /// Split a handle produced by this operator into `(layer, intensity)`.
    pub fn decode(handle: ImageHandle) -> (u32, f32) {
        let layer = (handle.0 >> 32) as u32;
        let intensity = f32::from((handle.0 & 0xFFFF) as u16) / f32::from(u16::MAX);
        (layer, intensity)
    }
}

impl Default for Solid {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for Solid {
    fn type_name(&self) -> &'static str {
        "solid"
    }
    fn output_kind(&self) -> OutputKind {
        OutputKind::Image
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
        let drive = ctx.input_value(0).unwrap_or(1.0);
        let intensity = (self.level.load_f32() * drive).clamp(0.0, 1.0);
        let quantized = (intensity * f32::from(u16::MAX)).round() as u64;
        let layer = self.layer.load_f32() as u64;
        Output::Image(ImageHandle((layer << 32) | quantized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{GraphBuilder, ParamValue, StateSnapshot, TickInfo};

    fn tick(dt: f64) -> TickInfo {
        TickInfo { tick: 0, time: 0.0, dt }
    }

    #[test]
    fn lfo_follows_the_clock() {
        let mut b = GraphBuilder::new();
        b.add("lfo", Lfo::new()).unwrap();
        let (mut g, _) = b.finish(64).unwrap();
        g.set_param("lfo", "rate", ParamValue::Float(1.0)).unwrap();

        g.cook(&tick(0.25));
        let Some(Output::Value(v)) = g.output("lfo").cloned() else {
            panic!("no output");
        };
        assert!((v - 1.0).abs() < 1e-6, "quarter cycle should peak, got {v}");

        g.cook(&tick(0.5));
        let v = g.output("lfo").and_then(Output::as_value).unwrap();
        assert!((v + 1.0).abs() < 1e-6, "three quarters should trough, got {v}");
    }

    #[test]
    fn lfo_rejects_non_finite_phase() {
        let mut lfo = Lfo::new();
        let blob = StateBlob::from_bytes(b"1e999".to_vec());
        assert!(lfo.import_state(&blob).is_err());
        let blob = StateBlob::encode(&2.25f64).unwrap();
        lfo.import_state(&blob).unwrap();
        assert_eq!(lfo.phase(), 0.25);
    }

    #[test]
    fn arithmetic_over_inputs() {
        let mut b = GraphBuilder::new();
        b.add("a", Constant::new()).unwrap();
        b.add("b", Constant::new()).unwrap();
        b.add("sum", Add::new()).unwrap().inputs(["a", "b"]);
        b.add("product", Multiply::new()).unwrap().inputs(["a", "b"]);
        let (mut g, _) = b.finish(64).unwrap();
        g.set_param("a", "value", ParamValue::Float(3.0)).unwrap();
        g.set_param("b", "value", ParamValue::Float(4.0)).unwrap();
        g.set_param("sum", "offset", ParamValue::Float(0.5)).unwrap();
        g.set_param("product", "scale", ParamValue::Float(2.0)).unwrap();
        g.cook(&tick(0.0));
        assert_eq!(g.output("sum"), Some(&Output::Value(7.5)));
        assert_eq!(g.output("product"), Some(&Output::Value(24.0)));
    }

    #[test]
    fn history_keeps_the_newest_values() {
        let mut b = GraphBuilder::new();
        b.add("src", Constant::new()).unwrap();
        b.add("hist", History::new()).unwrap().input("src");
        let (mut g, _) = b.finish(64).unwrap();
        g.set_param("hist", "length", ParamValue::Int(3)).unwrap();
        for v in 1..=5 {
            g.set_param("src", "value", ParamValue::Float(v as f32)).unwrap();
            g.cook(&tick(0.0));
        }
        assert_eq!(
            g.output("hist").and_then(Output::as_buffer),
            Some(&[3.0, 4.0, 5.0][..])
        );
    }

    #[test]
    fn history_state_is_trimmed_on_import() {
        let mut hist = History::new();
        hist.length.store(ParamValue::Int(2)).unwrap();
        let bits: Vec<u32> = [1.0f32, 2.0, 3.0].iter().map(|v| v.to_bits()).collect();
        hist.import_state(&StateBlob::encode(&bits).unwrap()).unwrap();
        assert_eq!(hist.ring, VecDeque::from(vec![2.0, 3.0]));
    }

    #[test]
    fn history_with_non_finite_samples_survives_reload() {
        let graph_with = |hist: History| {
            let mut b = GraphBuilder::new();
            b.add("src", Constant::new()).unwrap();
            b.add("h", hist).unwrap().input("src");
            b.finish(64).unwrap().0
        };

        let mut old = History::new();
        old.ring = VecDeque::from(vec![1.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY]);
        let snapshot = StateSnapshot::capture(&graph_with(old), None);

        let mut g = graph_with(History::new());
        let report = snapshot.restore(&mut g, None);
        assert!(report.restored.contains(&"h".to_string()));
        assert!(report.failed.is_empty());

        g.set_param("src", "value", ParamValue::Float(2.0)).unwrap();
        g.cook(&tick(0.0));
        let ring = g.output("h").and_then(Output::as_buffer).unwrap();
        let bits: Vec<u32> = ring.iter().map(|v| v.to_bits()).collect();
        let expected: Vec<u32> = [1.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 2.0]
            .iter()
            .map(|v| v.to_bits())
            .collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn solid_packs_layer_and_intensity() {
        let mut b = GraphBuilder::new();
        b.add("level", Constant::new()).unwrap();
        b.add("canvas", Solid::new()).unwrap().input("level");
        b.output("canvas");
        let (mut g, _) = b.finish(64).unwrap();
        g.set_param("level", "value", ParamValue::Float(0.5)).unwrap();
        g.set_param("canvas", "layer", ParamValue::Int(7)).unwrap();
        g.cook(&tick(0.0));

        let handle = g.render_output().and_then(Output::as_image).unwrap();
        let (layer, intensity) = Solid::decode(handle);
        assert_eq!(layer, 7);
        assert!((intensity - 0.5).abs() < 1e-4);
    }
}
