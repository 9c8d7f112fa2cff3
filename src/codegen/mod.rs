//! # Script Code Generation
//!
//! Rhai code generation for node graphs.

mod script_codegen;
pub(crate) mod node_handlers;

pub use script_codegen::*;
