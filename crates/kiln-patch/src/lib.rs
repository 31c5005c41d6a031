//! Declarative patches for kiln.
//!
//! A patch is a TOML file listing operators by registry type, their wiring,
//! initial parameter values, and the designated image and audio sinks. It is
//! the hot-reloadable unit of code: edit the file and the running
//! [`kiln_core::Runtime`] rebuilds the graph, carrying operator state over by
//! name.
//!
//! # Features
//!
//! - **Patch Format**: [`Patch`] load/save, parameter literals coerced to the
//!   declared kind
//! - **Registry**: [`OperatorRegistry`] maps type names to constructors
//! - **Reference Operators**: control (`constant`, `lfo`, `add`, `multiply`,
//!   `history`, `solid`) and audio (`sine`, `gain`, `mix`, `decay`)
//! - **Live Reload**: [`FilePatchLoader`] watches modification time
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiln_core::{Runtime, RuntimeSettings};
//! use kiln_patch::{FilePatchLoader, OperatorRegistry};
//!
//! let loader = FilePatchLoader::new("live.toml", Arc::new(OperatorRegistry::new()));
//! let (mut runtime, runner) = Runtime::new(RuntimeSettings::default(), loader);
//! runtime.reload().unwrap();
//!
//! // later, once per control tick
//! if let Some(Err(err)) = runtime.reload_if_needed() {
//!     eprintln!("{err}");
//! }
//! runtime.tick(1.0 / 60.0);
//! # drop(runner);
//! ```

mod error;
mod loader;
mod patch;
mod registry;

/// Built-in operators.
pub mod ops;

pub use error::PatchError;
pub use loader::{FilePatchLoader, PatchUnit};
pub use patch::{OperatorSpec, ParamLiteral, Patch};
pub use registry::{Factory, Instance, OperatorDescriptor, OperatorRegistry};
