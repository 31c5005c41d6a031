//! Kiln Core - live-editable data-flow runtime
//!
//! A directed graph of stateful operators whose code can be rebuilt and
//! hot-swapped while the process keeps running. Operators are split across two
//! timing domains: a per-frame control thread that cooks only what changed,
//! and a fixed-block real-time audio thread fed without locks or allocation.
//!
//! # Core Abstractions
//!
//! ## Operators
//!
//! - [`Operator`] - Control-domain capability interface (compute, state export/import)
//! - [`AudioOperator`] - Audio-domain capability interface (process, events)
//! - [`Output`] / [`OutputKind`] - Closed set of result kinds
//!
//! ## Graph and Scheduling
//!
//! - [`GraphBuilder`] - Name-based construction, resolved once per build
//! - [`Graph`] - Depth-ordered control operators with demand-driven [`Graph::cook`]
//! - [`AudioPlan`] - Executable audio subgraph
//!
//! ## Cross-thread Bridge
//!
//! - [`ParamCell`] - Atomic parameter value with optional reactive binding
//! - [`event_channel`] - Lock-free SPSC ring with a dropped-event counter
//! - [`AudioBlockRunner`] - Real-time loop with smoothed and peak load
//!
//! ## Hot Reload
//!
//! - [`StateSnapshot`] - Name-keyed state migration
//! - [`Runtime`] - The single live slot and the snapshot/swap/restore protocol
//! - [`UnitLoader`] / [`CodeUnit`] - Where new code comes from
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_core::{Runtime, RuntimeSettings};
//!
//! let (mut runtime, runner) = Runtime::new(RuntimeSettings::default(), loader);
//! runtime.reload()?;
//!
//! // audio thread
//! runner.process(&mut interleaved);
//!
//! // control thread, once per frame
//! runtime.tick(1.0 / 60.0);
//! if let Some(frame) = runtime.render_output() {
//!     present(frame);
//! }
//! ```

pub mod audio;
pub mod error;
pub mod event;
pub mod graph;
pub mod operator;
pub mod param;
pub mod runtime;
pub mod state;

pub use audio::{AudioBlockRunner, LoadMeter};
pub use error::{BuildError, GraphError, ReloadError, StateError, UnitError};
pub use event::{DEFAULT_EVENT_CAPACITY, Event, EventKind, EventReceiver, EventSender, event_channel};
pub use graph::{AudioPlan, CookReport, Graph, GraphBuilder, NodeBuilder, NodeInfo, ParamInfo};
pub use operator::{
    AudioInputs, AudioOperator, BlockContext, CookContext, Domain, GeometryHandle, ImageHandle,
    Operator, Output, OutputKind, TickInfo, handle_common_event,
};
pub use param::{ParamCell, ParamDescriptor, ParamKind, ParamSet, ParamValue};
pub use runtime::{
    CodeUnit, Diagnostics, ReloadHandle, ReloadSummary, Runtime, RuntimeSettings, UnitLoader,
};
pub use state::{RestoreReport, StateBlob, StateSnapshot};
