//! Audio block runner: the real-time side of the runtime.
//!
//! The audio backend calls [`AudioBlockRunner::process`] once per callback.
//! The runner takes the engine with `try_lock`, never `lock`: the only time
//! the lock is held elsewhere is the bounded swap window of a reload, and
//! during that window the callback renders silence instead of waiting.
//!
//! Inside the lock the runner drains the event channel, runs the current
//! [`AudioPlan`] in execution order in chunks of at most one block, and
//! interleaves the sink's mono buffer into every output channel. Nothing here
//! allocates or logs.
//!
//! Load is measured as processing time over the wall-clock duration of the
//! rendered audio, smoothed as `load * 0.9 + sample * 0.1`, and published
//! through plain atomics for the control thread to poll.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::event::EventReceiver;
use crate::graph::AudioPlan;
use crate::operator::BlockContext;

const LOAD_SMOOTHING: f32 = 0.9;

/// Smoothed and peak audio load, shared between threads.
#[derive(Debug, Default)]
pub struct LoadMeter {
    load: AtomicU32,
    peak: AtomicU32,
    blocks: AtomicU64,
    overloads: AtomicU64,
    skipped: AtomicU64,
}

impl LoadMeter {
    /// Smoothed fraction of the real-time budget spent processing.
    pub fn load(&self) -> f32 {
        f32::from_bits(self.load.load(Ordering::Relaxed))
    }

    /// Highest single-callback load since creation or the last reset.
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    /// Zero the peak.
    pub fn reset_peak(&self) {
        self.peak.store(0f32.to_bits(), Ordering::Relaxed);
    }

    /// Whether the smoothed load has reached the real-time budget.
    pub fn is_overloaded(&self) -> bool {
        self.load() >= 1.0
    }

    /// Callbacks processed.
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Callbacks whose own load was at or above 1.0.
    pub fn overload_blocks(&self) -> u64 {
        self.overloads.load(Ordering::Relaxed)
    }

    /// Callbacks rendered as silence because a reload held the engine.
    pub fn skipped_blocks(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Fold one callback's load into the meter. Audio thread only.
    pub fn record(&self, sample: f32) {
        let smoothed = self.load() * LOAD_SMOOTHING + sample * (1.0 - LOAD_SMOOTHING);
        self.load.store(smoothed.to_bits(), Ordering::Relaxed);
        if sample > self.peak() {
            self.peak.store(sample.to_bits(), Ordering::Relaxed);
        }
        if sample >= 1.0 {
            self.overloads.fetch_add(1, Ordering::Relaxed);
        }
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything the audio callback touches, behind one mutex.
pub(crate) struct AudioEngine {
    pub plan: Option<AudioPlan>,
    pub events: EventReceiver,
    channels: usize,
    sample_rate: f32,
    block: u64,
}

impl AudioEngine {
    fn render(&mut self, out: &mut [f32]) {
        while let Some(event) = self.events.pop() {
            if let Some(plan) = self.plan.as_mut() {
                plan.dispatch(&event);
            }
        }

        let channels = self.channels;
        let Some(plan) = self.plan.as_mut() else {
            out.fill(0.0);
            return;
        };

        let chunk_len = plan.block_frames() * channels;
        for chunk in out.chunks_mut(chunk_len) {
            let frames = chunk.len() / channels;
            let ctx = BlockContext {
                sample_rate: self.sample_rate,
                frames,
                block: self.block,
            };
            self.block += 1;

            match plan.process(&ctx) {
                Some(mono) => {
                    let mut frames_out = chunk.chunks_exact_mut(channels);
                    for (frame, &sample) in (&mut frames_out).zip(mono) {
                        frame.fill(sample);
                    }
                    frames_out.into_remainder().fill(0.0);
                }
                None => chunk.fill(0.0),
            }
        }
    }
}

pub(crate) struct AudioShared {
    pub engine: Mutex<AudioEngine>,
    pub meter: LoadMeter,
}

impl AudioShared {
    pub fn new(events: EventReceiver, channels: usize, sample_rate: f32) -> Self {
        Self {
            engine: Mutex::new(AudioEngine {
                plan: None,
                events,
                channels: channels.max(1),
                sample_rate,
                block: 0,
            }),
            meter: LoadMeter::default(),
        }
    }
}

/// Handle for the audio backend's callback thread.
///
/// Cheap to clone. [`process`](Self::process) is the only method that should
/// run on the real-time thread.
#[derive(Clone)]
pub struct AudioBlockRunner {
    shared: Arc<AudioShared>,
    channels: usize,
    sample_rate: f32,
}

impl AudioBlockRunner {
    pub(crate) fn new(shared: Arc<AudioShared>, channels: usize, sample_rate: f32) -> Self {
        Self {
            shared,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Render interleaved audio into `out`.
    ///
    /// Never blocks: if a reload is swapping the graph, `out` is silenced and
    /// the block is counted as skipped.
    pub fn process(&self, out: &mut [f32]) {
        let start = Instant::now();
        let Some(mut engine) = self.shared.engine.try_lock() else {
            out.fill(0.0);
            self.shared.meter.record_skip();
            return;
        };
        engine.render(out);
        drop(engine);

        let frames = out.len() / self.channels;
        if frames > 0 {
            let budget = frames as f64 / f64::from(self.sample_rate);
            let load = start.elapsed().as_secs_f64() / budget;
            self.shared.meter.record(load as f32);
        }
    }

    /// Load meter for this runner.
    pub fn meter(&self) -> &LoadMeter {
        &self.shared.meter
    }

    /// Interleaved output channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample rate the runner measures load against.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}
