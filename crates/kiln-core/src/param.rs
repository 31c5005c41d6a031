//! Atomic parameter cells shared between the control and audio threads.
//!
//! Every [`ParamValue`] packs into 64 bits, so a [`ParamCell`] is a single
//! `AtomicU64`: the control thread publishes with one `Release` store and the
//! audio thread reads with one `Acquire` load. A reader can observe an old value
//! or a new value, never a mix of the two.
//!
//! Bindings are evaluated on the control side only. [`ParamCell::refresh`] runs
//! once per control tick and publishes the binding's result; the audio thread
//! never calls user code and only sees the last published value.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Shape of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// 32-bit float.
    Float,
    /// 32-bit signed integer.
    Int,
    /// On/off toggle.
    Bool,
    /// Two 32-bit floats.
    Vec2,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Vec2 => "vec2",
        };
        f.write_str(name)
    }
}

/// A parameter value. Always fits in one atomic word.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Scalar float.
    Float(f32),
    /// Scalar integer.
    Int(i32),
    /// Toggle.
    Bool(bool),
    /// Short vector.
    Vec2([f32; 2]),
}

impl ParamValue {
    /// Kind of this value.
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Float(_) => ParamKind::Float,
            Self::Int(_) => ParamKind::Int,
            Self::Bool(_) => ParamKind::Bool,
            Self::Vec2(_) => ParamKind::Vec2,
        }
    }

    /// Scalar view of the value. Vectors report their first component.
    pub fn as_f32(&self) -> f32 {
        match *self {
            Self::Float(v) => v,
            Self::Int(v) => v as f32,
            Self::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Vec2([x, _]) => x,
        }
    }

    /// Build a value of `kind` from a scalar.
    ///
    /// Integers round, toggles switch at 0.5, vectors splat.
    pub fn from_f32(kind: ParamKind, value: f32) -> Self {
        match kind {
            ParamKind::Float => Self::Float(value),
            ParamKind::Int => Self::Int(value.round() as i32),
            ParamKind::Bool => Self::Bool(value >= 0.5),
            ParamKind::Vec2 => Self::Vec2([value, value]),
        }
    }

    fn to_bits(self) -> u64 {
        match self {
            Self::Float(v) => u64::from(v.to_bits()),
            Self::Int(v) => u64::from(v as u32),
            Self::Bool(v) => u64::from(v),
            Self::Vec2([x, y]) => u64::from(x.to_bits()) | (u64::from(y.to_bits()) << 32),
        }
    }

    fn from_bits(kind: ParamKind, bits: u64) -> Self {
        match kind {
            ParamKind::Float => Self::Float(f32::from_bits(bits as u32)),
            ParamKind::Int => Self::Int(bits as u32 as i32),
            ParamKind::Bool => Self::Bool(bits != 0),
            ParamKind::Vec2 => Self::Vec2([
                f32::from_bits(bits as u32),
                f32::from_bits((bits >> 32) as u32),
            ]),
        }
    }
}

/// Static description of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDescriptor {
    /// Name, unique within its operator.
    pub name: &'static str,
    /// Value shape.
    pub kind: ParamKind,
    /// Lower bound for scalar and vector components.
    pub min: f32,
    /// Upper bound for scalar and vector components.
    pub max: f32,
    /// Value at construction.
    pub default: ParamValue,
}

impl ParamDescriptor {
    /// Float parameter in `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max` or either bound is NaN.
    pub fn float(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            kind: ParamKind::Float,
            min,
            max,
            default: ParamValue::Float(default.clamp(min, max)),
        }
    }

    /// Integer parameter in `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn int(name: &'static str, min: i32, max: i32, default: i32) -> Self {
        Self {
            name,
            kind: ParamKind::Int,
            min: min as f32,
            max: max as f32,
            default: ParamValue::Int(default.clamp(min, max)),
        }
    }

    /// On/off parameter.
    pub fn toggle(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Bool,
            min: 0.0,
            max: 1.0,
            default: ParamValue::Bool(default),
        }
    }

    /// Two-component vector, each component in `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max` or either bound is NaN.
    pub fn vec2(name: &'static str, min: f32, max: f32, default: [f32; 2]) -> Self {
        Self {
            name,
            kind: ParamKind::Vec2,
            min,
            max,
            default: ParamValue::Vec2([default[0].clamp(min, max), default[1].clamp(min, max)]),
        }
    }

    /// Convert `value` to this parameter's kind and clamp it to range.
    ///
    /// Floats and integers convert into each other; scalars become toggles at
    /// 0.5. NaN and infinite components are rejected rather than clamped, as
    /// is any other kind combination.
    pub fn coerce(&self, value: ParamValue) -> Result<ParamValue, GraphError> {
        if !is_finite(value) {
            return Err(GraphError::NonFiniteParam {
                param: self.name.to_string(),
            });
        }
        let coerced = match (self.kind, value) {
            (ParamKind::Float, ParamValue::Float(v)) => ParamValue::Float(v.clamp(self.min, self.max)),
            (ParamKind::Float, ParamValue::Int(v)) => {
                ParamValue::Float((v as f32).clamp(self.min, self.max))
            }
            (ParamKind::Int, ParamValue::Int(v)) => {
                ParamValue::Int(v.clamp(self.min as i32, self.max as i32))
            }
            (ParamKind::Int, ParamValue::Float(v)) => {
                ParamValue::Int((v.round() as i32).clamp(self.min as i32, self.max as i32))
            }
            (ParamKind::Bool, ParamValue::Bool(v)) => ParamValue::Bool(v),
            (ParamKind::Bool, ParamValue::Float(v)) => ParamValue::Bool(v >= 0.5),
            (ParamKind::Bool, ParamValue::Int(v)) => ParamValue::Bool(v != 0),
            (ParamKind::Vec2, ParamValue::Vec2([x, y])) => {
                ParamValue::Vec2([x.clamp(self.min, self.max), y.clamp(self.min, self.max)])
            }
            _ => return Err(self.kind_mismatch(value)),
        };
        Ok(coerced)
    }

    fn kind_mismatch(&self, value: ParamValue) -> GraphError {
        GraphError::ParamKindMismatch {
            param: self.name.to_string(),
            expected: self.kind,
            found: value.kind(),
        }
    }
}

fn is_finite(value: ParamValue) -> bool {
    match value {
        ParamValue::Float(v) => v.is_finite(),
        ParamValue::Vec2([x, y]) => x.is_finite() && y.is_finite(),
        ParamValue::Int(_) | ParamValue::Bool(_) => true,
    }
}

/// A function-like source that drives a parameter reactively.
pub struct Binding {
    eval: Box<dyn Fn() -> ParamValue + Send + Sync>,
}

impl Binding {
    fn new<F>(eval: F) -> Self
    where
        F: Fn() -> ParamValue + Send + Sync + 'static,
    {
        Self {
            eval: Box::new(eval),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Binding")
    }
}

/// An atomically shared parameter value with an optional binding.
///
/// Written by the control thread, read by whichever thread runs the owning
/// operator. See the [module docs](self) for the threading contract.
#[derive(Debug)]
pub struct ParamCell {
    descriptor: ParamDescriptor,
    bits: AtomicU64,
    changed: AtomicBool,
    binding: ArcSwapOption<Binding>,
}

impl ParamCell {
    /// Create a cell holding the descriptor's default.
    pub fn new(descriptor: ParamDescriptor) -> Self {
        let bits = descriptor.default.to_bits();
        Self {
            descriptor,
            bits: AtomicU64::new(bits),
            changed: AtomicBool::new(false),
            binding: ArcSwapOption::empty(),
        }
    }

    /// Static description of this parameter.
    pub fn descriptor(&self) -> &ParamDescriptor {
        &self.descriptor
    }

    /// Parameter name.
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Assign a literal value. Clears any binding.
    ///
    /// The value is coerced to the parameter's kind and clamped to its range.
    pub fn store(&self, value: ParamValue) -> Result<(), GraphError> {
        let coerced = self.descriptor.coerce(value)?;
        self.binding.store(None);
        self.publish(coerced);
        Ok(())
    }

    /// Write a scalar without touching the binding.
    ///
    /// Safe on the real-time thread: no allocation, no deallocation. Used for
    /// parameter-set events. A bound cell is overwritten again at the next
    /// control-side refresh. Non-finite values are ignored.
    pub fn store_realtime(&self, value: f32) {
        if !value.is_finite() {
            return;
        }
        let value = ParamValue::from_f32(self.descriptor.kind, value);
        if let Ok(coerced) = self.descriptor.coerce(value) {
            self.publish(coerced);
        }
    }

    /// Current published value. One atomic load; real-time safe.
    #[inline]
    pub fn load(&self) -> ParamValue {
        ParamValue::from_bits(self.descriptor.kind, self.bits.load(Ordering::Acquire))
    }

    /// Current published value as a scalar. Real-time safe.
    #[inline]
    pub fn load_f32(&self) -> f32 {
        self.load().as_f32()
    }

    /// Control-side read: re-evaluates the binding first, if any.
    pub fn get(&self) -> ParamValue {
        self.refresh();
        self.load()
    }

    /// Drive this cell from `source` until the next literal [`store`](Self::store).
    pub fn bind<F>(&self, source: F)
    where
        F: Fn() -> ParamValue + Send + Sync + 'static,
    {
        self.binding.store(Some(Arc::new(Binding::new(source))));
        self.refresh();
    }

    /// Bind to a normalized `0..=1` source mapped onto `[out_min, out_max]`.
    pub fn bind_normalized<F>(&self, source: F, out_min: f32, out_max: f32)
    where
        F: Fn() -> f32 + Send + Sync + 'static,
    {
        let kind = self.descriptor.kind;
        self.bind(move || {
            let t = source();
            if !t.is_finite() {
                // Rejected by `refresh`, which keeps the last published value.
                return ParamValue::Float(t);
            }
            let t = t.clamp(0.0, 1.0);
            ParamValue::from_f32(kind, out_min + t * (out_max - out_min))
        });
    }

    /// Drop the binding, keeping the last published value.
    pub fn unbind(&self) {
        self.binding.store(None);
    }

    /// Whether a binding currently drives this cell.
    pub fn is_bound(&self) -> bool {
        self.binding.load().is_some()
    }

    /// Evaluate the binding and publish its result. Returns `true` if a
    /// binding ran. Control thread only.
    pub fn refresh(&self) -> bool {
        let Some(binding) = self.binding.load_full() else {
            return false;
        };
        let value = (binding.eval)();
        if let Ok(coerced) = self.descriptor.coerce(value) {
            self.publish(coerced);
        }
        true
    }

    /// Return and clear the changed flag.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    fn publish(&self, value: ParamValue) {
        let bits = value.to_bits();
        let previous = self.bits.swap(bits, Ordering::AcqRel);
        if previous != bits {
            self.changed.store(true, Ordering::Release);
        }
    }
}

/// An operator's ordered parameter cells.
///
/// Cells are reference counted so the graph can address an audio operator's
/// parameters after the operator itself has moved to the audio thread.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    cells: Vec<Arc<ParamCell>>,
}

impl ParamSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and return its cell for the operator to keep.
    pub fn add(&mut self, descriptor: ParamDescriptor) -> Arc<ParamCell> {
        let cell = Arc::new(ParamCell::new(descriptor));
        self.cells.push(Arc::clone(&cell));
        cell
    }

    /// Cell at `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<ParamCell>> {
        self.cells.get(index)
    }

    /// Cell named `name`.
    pub fn find(&self, name: &str) -> Option<&Arc<ParamCell>> {
        self.cells.iter().find(|c| c.name() == name)
    }

    /// Position of the cell named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.cells.iter().position(|c| c.name() == name)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the set has no parameters.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate cells in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ParamCell>> {
        self.cells.iter()
    }

    /// Descriptors in declaration order.
    pub fn descriptors(&self) -> Vec<ParamDescriptor> {
        self.cells.iter().map(|c| c.descriptor().clone()).collect()
    }

    /// Refresh every bound cell.
    pub fn refresh_all(&self) {
        for cell in &self.cells {
            cell.refresh();
        }
    }

    /// Clear every changed flag, returning whether any was set.
    pub fn take_changed(&self) -> bool {
        self.cells
            .iter()
            .fold(false, |any, cell| cell.take_changed() | any)
    }
}
