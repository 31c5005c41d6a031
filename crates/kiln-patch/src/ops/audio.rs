//! Reference audio-domain operators.
//!
//! All of them are allocation-free in `process` and `handle_event`.

use std::f32::consts::TAU;
use std::sync::Arc;

use kiln_core::{
    AudioInputs, AudioOperator, BlockContext, Event, EventKind, ParamCell, ParamDescriptor,
    ParamSet, StateBlob, StateError, handle_common_event,
};

/// Convert a MIDI note number to Hz (A4 = note 69 = 440 Hz).
#[inline]
pub fn note_to_hz(note: f32) -> f32 {
    440.0 * ((note - 69.0) / 12.0).exp2()
}

/// Sine oscillator with a note gate.
///
/// Note-on sets `frequency` from the note number, `amplitude` from the
/// velocity, and opens the gate; note-off closes it. The phase is the
/// migrated state.
pub struct Sine {
    params: ParamSet,
    frequency: Arc<ParamCell>,
    amplitude: Arc<ParamCell>,
    gate: Arc<ParamCell>,
    phase: f32,
}

impl Sine {
    /// 440 Hz at half amplitude, gate open.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let frequency = params.add(ParamDescriptor::float("frequency", 0.0, 20000.0, 440.0));
        let amplitude = params.add(ParamDescriptor::float("amplitude", 0.0, 1.0, 0.5));
        let gate = params.add(ParamDescriptor::toggle("gate", true));
        Self {
            params,
            frequency,
            amplitude,
            gate,
            phase: 0.0,
        }
    }
}

impl Default for Sine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOperator for Sine {
    fn type_name(&self) -> &'static str {
        "sine"
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn process(&mut self, ctx: &BlockContext, _inputs: AudioInputs<'_>, out: &mut [f32]) {
        let step = self.frequency.load_f32() / ctx.sample_rate;
        let amplitude = if self.gate.load_f32() >= 0.5 {
            self.amplitude.load_f32()
        } else {
            0.0
        };
        for sample in out.iter_mut() {
            *sample = amplitude * (self.phase * TAU).sin();
            self.phase = (self.phase + step).fract();
        }
    }
    fn handle_event(&mut self, event: &Event) {
        match event.kind {
            EventKind::NoteOn => {
                self.frequency.store_realtime(note_to_hz(event.value));
                self.amplitude.store_realtime(event.value2);
                self.gate.store_realtime(1.0);
            }
            EventKind::NoteOff => self.gate.store_realtime(0.0),
            _ => handle_common_event(self, event),
        }
    }
    fn reset(&mut self) {
        self.phase = 0.0;
    }
    fn export_state(&self) -> Result<StateBlob, StateError> {
        StateBlob::encode(&self.phase)
    }
    fn import_state(&mut self, state: &StateBlob) -> Result<(), StateError> {
        let phase: f32 = state.decode()?;
        self.phase = if phase.is_finite() { phase.rem_euclid(1.0) } else { 0.0 };
        Ok(())
    }
}

/// First input scaled by `gain`.
pub struct Gain {
    params: ParamSet,
    gain: Arc<ParamCell>,
}

impl Gain {
    /// Unity gain.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let gain = params.add(ParamDescriptor::float("gain", 0.0, 4.0, 1.0));
        Self { params, gain }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOperator for Gain {
    fn type_name(&self) -> &'static str {
        "gain"
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn process(&mut self, _ctx: &BlockContext, inputs: AudioInputs<'_>, out: &mut [f32]) {
        let gain = self.gain.load_f32();
        match inputs.get(0) {
            Some(input) => {
                for (o, &i) in out.iter_mut().zip(input) {
                    *o = i * gain;
                }
            }
            None => out.fill(0.0),
        }
    }
}

/// Sum of all inputs scaled by `level`.
pub struct Mix {
    params: ParamSet,
    level: Arc<ParamCell>,
}

impl Mix {
    /// Unity level.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let level = params.add(ParamDescriptor::float("level", 0.0, 4.0, 1.0));
        Self { params, level }
    }
}

impl Default for Mix {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOperator for Mix {
    fn type_name(&self) -> &'static str {
        "mix"
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn process(&mut self, _ctx: &BlockContext, inputs: AudioInputs<'_>, out: &mut [f32]) {
        out.fill(0.0);
        for input in inputs.iter() {
            for (o, &i) in out.iter_mut().zip(input) {
                *o += i;
            }
        }
        let level = self.level.load_f32();
        for o in out.iter_mut() {
            *o *= level;
        }
    }
}

/// Trigger-driven exponential envelope.
///
/// A trigger jumps the level to the trigger strength, which then falls by
/// 60 dB over `time` seconds. With an input the envelope is applied to it;
/// without one the envelope itself is the output. The current level is the
/// migrated state.
pub struct Decay {
    params: ParamSet,
    time: Arc<ParamCell>,
    level: f32,
}

impl Decay {
    /// Quarter-second decay, silent until triggered.
    pub fn new() -> Self {
        let mut params = ParamSet::new();
        let time = params.add(ParamDescriptor::float("time", 0.001, 30.0, 0.25));
        Self {
            params,
            time,
            level: 0.0,
        }
    }

    /// Current envelope level.
    pub fn level(&self) -> f32 {
        self.level
    }
}

impl Default for Decay {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOperator for Decay {
    fn type_name(&self) -> &'static str {
        "decay"
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn process(&mut self, ctx: &BlockContext, inputs: AudioInputs<'_>, out: &mut [f32]) {
        // ln(1000): 60 dB down after `time` seconds.
        let coeff = (-6.907_755 / (self.time.load_f32() * ctx.sample_rate)).exp();
        match inputs.get(0) {
            Some(input) => {
                for (o, &i) in out.iter_mut().zip(input) {
                    *o = i * self.level;
                    self.level *= coeff;
                }
            }
            None => {
                for o in out.iter_mut() {
                    *o = self.level;
                    self.level *= coeff;
                }
            }
        }
        if self.level < 1.0e-6 {
            self.level = 0.0;
        }
    }
    fn handle_event(&mut self, event: &Event) {
        match event.kind {
            EventKind::Trigger => self.level = event.value.clamp(0.0, 1.0),
            _ => handle_common_event(self, event),
        }
    }
    fn reset(&mut self) {
        self.level = 0.0;
    }
    fn export_state(&self) -> Result<StateBlob, StateError> {
        StateBlob::encode(&self.level)
    }
    fn import_state(&mut self, state: &StateBlob) -> Result<(), StateError> {
        let level: f32 = state.decode()?;
        self.level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
        Ok(())
    }
}
