//! Built-in operators available to patches.
//!
//! - `control`: [`Constant`], [`Lfo`], [`Add`], [`Multiply`], [`History`], [`Solid`]
//! - `audio`: [`Sine`], [`Gain`], [`Mix`], [`Decay`]

mod audio;
mod control;

pub use audio::{Decay, Gain, Mix, Sine, note_to_hz};
pub use control::{Add, Constant, History, Lfo, MAX_HISTORY, Multiply, Solid};
