//! # Node Graph Compiler (NGC)
//!
//! Compiler and runtime for visual node graphs: a directed graph of typed
//! nodes is validated, ordered and translated into a [Rhai](https://rhai.rs)
//! script, which an execution controller then plays, stops and restarts.
//!
//! NGC provides:
//! - A graph model with a JSON document format
//! - A node type registry with a built-in catalog (events, math, logic, flow, variables)
//! - Validation with per-node status and colors for the canvas
//! - Deterministic Rhai code generation
//! - A play/stop/restart controller driven by tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ngc::{EditorConfig, EditorSession, RuntimeEvent, SceneHandle};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EditorConfig::load()?;
//! let (mut session, mut events) =
//!     EditorSession::mount("graph.json", SceneHandle::new(()), config).await?;
//!
//! match session.compile().code() {
//!     Some(code) => println!("{}", code),
//!     None => eprintln!("graph has errors: {:?}", session.report().first_error()),
//! }
//!
//! session.play(true)?;
//! while let Some(event) = events.recv().await {
//!     if let RuntimeEvent::Output(text) = event {
//!         println!("{}", text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! NGC follows a multi-phase pipeline:
//!
//! 1. **Loading** - Read the document while the registry initializes
//! 2. **Dependency Analysis** - Order nodes over value and execution links
//! 3. **Validation** - Check every node, record the first error
//! 4. **Code Generation** - Emit one Rhai statement block per node
//! 5. **Execution** - Dispatch `start`, then `tick` events on the script

pub mod analysis;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod validation;

// Re-export the main compilation API
pub use compiler::{compile_graph, CompilationResult};

pub use config::{EditorConfig, RuntimeConfig};
pub use error::{ExecutionError, GraphError, LoadError, SaveError, SessionError};
pub use graph::{
    DataType, GraphConfig, GraphDescription, Link, NodeId, NodeInstance, Pin, PinDirection,
    Position, PropertyValue, ValidationStatus,
};
pub use registry::{NodeKind, NodeRegistry, NodeTypeDescriptor, PinSpec};
pub use runtime::{ControllerState, ExecutionController, ExecutionMode, RuntimeEvent, SceneHandle};
pub use session::{EditRecorder, EditorSession, GraphEdit, RenderTarget};
pub use validation::colorizer::{colorize, NodeColor, NodeColors};
pub use validation::{validate, ValidationError, ValidationIssue, ValidationReport};
