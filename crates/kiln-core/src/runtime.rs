//! The live slot and the reload protocol.
//!
//! A [`Runtime`] owns the single live generation: the control [`Graph`] and
//! the code unit that built it. The matching [`AudioPlan`] sits in the audio
//! engine, reachable from the real-time thread through an
//! [`AudioBlockRunner`]. Everything else holds the runtime by reference; there
//! is no ambient global graph.
//!
//! # Reload
//!
//! [`Runtime::reload`] runs on the control thread:
//!
//! 1. `prepare` the new unit (parsing, compiling) while audio keeps running.
//! 2. Lock the audio engine. This is the only point where audio pauses.
//! 3. Snapshot: export every operator's state in both domains.
//! 4. Swap: load the unit, run its build function, validate the new graph.
//! 5. Restore: import state by name, then mark every operator dirty.
//! 6. Install the new plan, discard events addressed to the old generation,
//!    and unlock.
//!
//! A failure in step 1 or 4 returns before anything live is mutated. The old
//! generation is dropped after the unlock, graph and plan before the unit
//! whose code they came from.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::audio::{AudioBlockRunner, AudioShared, LoadMeter};
use crate::error::{BuildError, GraphError, ReloadError, UnitError};
use crate::event::{DEFAULT_EVENT_CAPACITY, Event, EventSender, event_channel};
use crate::graph::{CookReport, Graph, GraphBuilder, NodeInfo};
use crate::operator::{Output, TickInfo};
use crate::param::{ParamCell, ParamValue};
use crate::state::{RestoreReport, StateSnapshot};

/// A loaded unit of user code that can build a graph.
pub trait CodeUnit: Send {
    /// Add operators, wire inputs, and designate outputs.
    fn build(&self, graph: &mut GraphBuilder) -> Result<(), BuildError>;
}

impl<F> CodeUnit for F
where
    F: Fn(&mut GraphBuilder) -> Result<(), BuildError> + Send,
{
    fn build(&self, graph: &mut GraphBuilder) -> Result<(), BuildError> {
        self(graph)
    }
}

/// Source of code units: a compiler, a plugin loader, a patch file.
pub trait UnitLoader: Send {
    /// Heavy work that can run while audio is still playing.
    fn prepare(&mut self) -> Result<(), UnitError> {
        Ok(())
    }

    /// Produce the prepared unit. Called with audio paused, keep it short.
    fn load(&mut self) -> Result<Box<dyn CodeUnit>, UnitError>;

    /// Whether the underlying sources changed since the last load.
    fn needs_reload(&mut self) -> bool {
        false
    }
}

/// Audio and channel sizing for a runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeSettings {
    /// Audio sample rate in Hz.
    pub sample_rate: f32,
    /// Largest block an audio plan renders in one pass.
    pub block_frames: usize,
    /// Interleaved output channels.
    pub channels: usize,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_frames: 256,
            channels: 2,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Outcome of a successful reload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadSummary {
    /// Generation now live.
    pub generation: u64,
    /// How state was carried over.
    pub restore: RestoreReport,
    /// How long audio was paused.
    pub pause: Duration,
}

/// Read-only runtime health, polled by the control thread.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Diagnostics {
    /// Live generation, 0 before the first build.
    pub generation: u64,
    /// Events discarded because the channel was full.
    pub dropped_events: u64,
    /// Fraction of the event channel in use.
    pub event_fill: f32,
    /// Smoothed audio load.
    pub audio_load: f32,
    /// Peak audio load.
    pub peak_load: f32,
    /// Whether smoothed audio load has reached 1.0.
    pub overloaded: bool,
    /// Callbacks over budget.
    pub overload_blocks: u64,
    /// Callbacks silenced during reload swaps.
    pub skipped_blocks: u64,
}

/// Asks a runtime to reload from another thread.
#[derive(Clone)]
pub struct ReloadHandle {
    tx: Sender<()>,
}

impl ReloadHandle {
    /// Request a reload. Requests made before the runtime polls coalesce.
    pub fn request(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::debug!("reload_request: runtime is gone");
            }
        }
    }
}

// Field order matters: the graph drops before the unit that built it.
struct Generation {
    graph: Graph,
    _unit: Box<dyn CodeUnit>,
}

/// The live-editable runtime. Owned by the control thread.
pub struct Runtime {
    settings: RuntimeSettings,
    loader: Box<dyn UnitLoader>,
    live: Option<Generation>,
    audio: Arc<AudioShared>,
    events: EventSender,
    info: Arc<ArcSwap<Vec<NodeInfo>>>,
    generation: u64,
    clock: TickInfo,
    reload_tx: Sender<()>,
    reload_rx: Receiver<()>,
}

impl Runtime {
    /// Create an empty runtime and the audio-thread handle that feeds from it.
    ///
    /// Nothing is built until the first [`reload`](Self::reload).
    pub fn new(
        settings: RuntimeSettings,
        loader: impl UnitLoader + 'static,
    ) -> (Self, AudioBlockRunner) {
        let (events, receiver) = event_channel(settings.event_capacity);
        let audio = Arc::new(AudioShared::new(
            receiver,
            settings.channels,
            settings.sample_rate,
        ));
        let runner = AudioBlockRunner::new(
            Arc::clone(&audio),
            settings.channels,
            settings.sample_rate,
        );
        let (reload_tx, reload_rx) = crossbeam_channel::bounded(1);
        let runtime = Self {
            settings,
            loader: Box::new(loader),
            live: None,
            audio,
            events,
            info: Arc::new(ArcSwap::from_pointee(Vec::new())),
            generation: 0,
            clock: TickInfo::default(),
            reload_tx,
            reload_rx,
        };
        (runtime, runner)
    }

    /// Settings this runtime was created with.
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Build a new generation and make it live, carrying state over by name.
    ///
    /// On error the previous generation keeps running untouched.
    pub fn reload(&mut self) -> Result<ReloadSummary, ReloadError> {
        self.loader.prepare().map_err(ReloadError::Prepare)?;

        let mut engine = self.audio.engine.lock();
        let paused_at = Instant::now();

        let snapshot = match &self.live {
            Some(live) => StateSnapshot::capture(&live.graph, engine.plan.as_ref()),
            None => StateSnapshot::new(),
        };

        let unit = self.loader.load().map_err(ReloadError::Load)?;
        let mut builder = GraphBuilder::new();
        unit.build(&mut builder)?;
        let (mut graph, mut plan) = builder.finish(self.settings.block_frames)?;

        let restore = snapshot.restore(&mut graph, Some(&mut plan));
        graph.mark_all_dirty();

        let old_plan = engine.plan.replace(plan);
        let stale = engine.events.clear();
        drop(engine);
        let pause = paused_at.elapsed();

        let old = self.live.replace(Generation { graph, _unit: unit });
        drop(old_plan);
        drop(old);

        self.generation += 1;
        self.publish_info();
        tracing::info!(
            generation = self.generation,
            restored = restore.restored.len(),
            fresh = restore.fresh.len(),
            discarded = restore.discarded.len(),
            failed = restore.failed.len(),
            stale_events = stale,
            pause_us = pause.as_micros() as u64,
            "reload complete"
        );

        Ok(ReloadSummary {
            generation: self.generation,
            restore,
            pause,
        })
    }

    /// Reload if the loader reports changed sources or a [`ReloadHandle`]
    /// asked for it. Returns `None` when nothing was due.
    pub fn reload_if_needed(&mut self) -> Option<Result<ReloadSummary, ReloadError>> {
        let requested = self.reload_rx.try_iter().count() > 0;
        if requested || self.loader.needs_reload() {
            let result = self.reload();
            if let Err(err) = &result {
                tracing::warn!(error = %err, "reload rejected, keeping generation {}", self.generation);
            }
            Some(result)
        } else {
            None
        }
    }

    /// Handle for requesting reloads from other threads.
    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            tx: self.reload_tx.clone(),
        }
    }

    /// Advance the control clock by `dt` seconds and cook the live graph.
    pub fn tick(&mut self, dt: f64) -> CookReport {
        self.clock.tick += 1;
        self.clock.time += dt;
        self.clock.dt = dt;
        match self.live.as_mut() {
            Some(live) => live.graph.cook(&self.clock),
            None => CookReport::default(),
        }
    }

    /// Control clock of the most recent tick.
    pub fn clock(&self) -> TickInfo {
        self.clock
    }

    /// Live graph, if one has been built.
    pub fn graph(&self) -> Option<&Graph> {
        self.live.as_ref().map(|l| &l.graph)
    }

    /// Mutable access to the live graph.
    pub fn graph_mut(&mut self) -> Option<&mut Graph> {
        self.live.as_mut().map(|l| &mut l.graph)
    }

    /// Current output for presentation. Never cooks.
    pub fn render_output(&self) -> Option<&Output> {
        self.graph()?.render_output()
    }

    /// Fresh node list of the live graph.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.graph().map(Graph::describe).unwrap_or_default()
    }

    /// Node list published at the last structural change, readable from any
    /// thread without locking.
    pub fn info_handle(&self) -> Arc<ArcSwap<Vec<NodeInfo>>> {
        Arc::clone(&self.info)
    }

    /// Parameter cell `param` of `operator`.
    pub fn param(&self, operator: &str, param: &str) -> Result<&Arc<ParamCell>, GraphError> {
        self.live_graph(operator)?.param(operator, param)
    }

    /// Assign a literal parameter value.
    pub fn set_param(
        &self,
        operator: &str,
        param: &str,
        value: ParamValue,
    ) -> Result<(), GraphError> {
        self.live_graph(operator)?.set_param(operator, param, value)
    }

    /// Bind a parameter to a source evaluated every control tick.
    pub fn bind_param<F>(&self, operator: &str, param: &str, source: F) -> Result<(), GraphError>
    where
        F: Fn() -> ParamValue + Send + Sync + 'static,
    {
        self.live_graph(operator)?.bind_param(operator, param, source)
    }

    /// Current parameter value.
    pub fn param_value(&self, operator: &str, param: &str) -> Result<ParamValue, GraphError> {
        self.live_graph(operator)?.param_value(operator, param)
    }

    /// Present `name` instead of the designated output.
    pub fn solo(&mut self, name: &str) -> Result<(), GraphError> {
        self.live_graph_mut(name)?.solo(name)?;
        self.publish_info();
        Ok(())
    }

    /// Return to the designated output.
    pub fn clear_solo(&mut self) {
        if let Some(live) = self.live.as_mut() {
            live.graph.clear_solo();
            self.publish_info();
        }
    }

    /// Bypass or restore a control operator.
    pub fn set_bypassed(&mut self, name: &str, bypassed: bool) -> Result<(), GraphError> {
        self.live_graph_mut(name)?.set_bypassed(name, bypassed)?;
        self.publish_info();
        Ok(())
    }

    /// Push a raw event. Returns `false` if it was dropped.
    pub fn send(&mut self, event: Event) -> bool {
        self.events.push(event)
    }

    /// Send a note-on to the audio operator `target`.
    pub fn note_on(&mut self, target: &str, note: f32, velocity: f32) -> Result<bool, GraphError> {
        let id = self.audio_target(target)?;
        Ok(self.send(Event::note_on(id, note, velocity)))
    }

    /// Send a note-off to the audio operator `target`.
    pub fn note_off(&mut self, target: &str, note: f32) -> Result<bool, GraphError> {
        let id = self.audio_target(target)?;
        Ok(self.send(Event::note_off(id, note)))
    }

    /// Trigger the audio operator `target`.
    pub fn trigger(&mut self, target: &str, strength: f32) -> Result<bool, GraphError> {
        let id = self.audio_target(target)?;
        Ok(self.send(Event::trigger(id, strength)))
    }

    /// Reset the audio operator `target`.
    pub fn reset(&mut self, target: &str) -> Result<bool, GraphError> {
        let id = self.audio_target(target)?;
        Ok(self.send(Event::reset(id)))
    }

    /// Set a parameter of an audio operator through the event channel, so the
    /// change lands between blocks on the audio thread.
    pub fn send_param(&mut self, target: &str, param: &str, value: f32) -> Result<bool, GraphError> {
        let id = self.audio_target(target)?;
        let index = self
            .live_graph(target)?
            .param_index(target, param)
            .ok_or_else(|| GraphError::ParamNotFound {
                operator: target.to_string(),
                param: param.to_string(),
            })?;
        Ok(self.send(Event::param_set(id, index as u32, value)))
    }

    /// Current health counters.
    pub fn diagnostics(&self) -> Diagnostics {
        let meter = self.meter();
        Diagnostics {
            generation: self.generation,
            dropped_events: self.events.dropped_count(),
            event_fill: self.events.fill_level(),
            audio_load: meter.load(),
            peak_load: meter.peak(),
            overloaded: meter.is_overloaded(),
            overload_blocks: meter.overload_blocks(),
            skipped_blocks: meter.skipped_blocks(),
        }
    }

    /// Zero the dropped-event counter.
    pub fn reset_dropped_events(&self) {
        self.events.reset_dropped_count();
    }

    /// Zero the peak load.
    pub fn reset_peak_load(&self) {
        self.meter().reset_peak();
    }

    /// Live generation number, 0 before the first build.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn meter(&self) -> &LoadMeter {
        &self.audio.meter
    }

    fn live_graph(&self, name: &str) -> Result<&Graph, GraphError> {
        self.graph()
            .ok_or_else(|| GraphError::OperatorNotFound(name.to_string()))
    }

    fn live_graph_mut(&mut self, name: &str) -> Result<&mut Graph, GraphError> {
        self.graph_mut()
            .ok_or_else(|| GraphError::OperatorNotFound(name.to_string()))
    }

    fn audio_target(&self, name: &str) -> Result<u32, GraphError> {
        self.live_graph(name)?
            .audio_target(name)
            .ok_or_else(|| GraphError::OperatorNotFound(name.to_string()))
    }

    fn publish_info(&self) {
        self.info.store(Arc::new(self.nodes()));
    }
}
