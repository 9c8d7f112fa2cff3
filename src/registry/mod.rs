//! # Node Type Registry
//!
//! Catalog of known node kinds. Each [`NodeTypeDescriptor`] declares the pins
//! a node of that kind carries, its default properties and the rule that turns
//! one node into script statements.
//!
//! The registry is an owned value with an explicit, idempotent
//! [`init`](NodeRegistry::init) step. Graphs can only be loaded once
//! [`is_ready`](NodeRegistry::is_ready) reports true.

mod builtin;

use crate::graph::{DataType, GraphDescription, NodeId, NodeInstance, PropertyValue};
use std::collections::BTreeMap;
use std::fmt;

/// Turns one node into script statement(s), or refuses its inputs.
pub type EmitFn = fn(&EmitContext<'_>) -> Result<String, String>;

/// Node-specific semantic check run as the last validation step.
pub type CheckFn = fn(&NodeInstance, &GraphDescription) -> Result<(), String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Entry point fired by the runtime (start, tick)
    Event,
    /// Side-effect free value computation
    Pure,
    /// Statement guarded by an incoming execution pin
    Flow,
}

/// Declared pin on a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct PinSpec {
    pub name: &'static str,
    pub data_type: DataType,
    pub default: Option<PropertyValue>,
}

impl PinSpec {
    pub fn required(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            default: None,
        }
    }

    pub fn with_default(name: &'static str, data_type: DataType, default: PropertyValue) -> Self {
        Self {
            name,
            data_type,
            default: Some(default),
        }
    }

    /// Execution inputs default to inactive, so an unconnected flow node is inert.
    pub fn exec() -> Self {
        Self::with_default("exec", DataType::Execution, PropertyValue::Boolean(false))
    }

    pub fn output(name: &'static str, data_type: DataType) -> Self {
        Self::required(name, data_type)
    }
}

#[derive(Clone)]
pub struct NodeTypeDescriptor {
    pub name: &'static str,
    pub category: &'static str,
    pub kind: NodeKind,
    /// Canvas color for nodes of this type when they validate
    pub color: &'static str,
    pub inputs: Vec<PinSpec>,
    pub outputs: Vec<PinSpec>,
    pub properties: Vec<(&'static str, PropertyValue)>,
    pub emit: EmitFn,
    pub check: Option<CheckFn>,
}

impl NodeTypeDescriptor {
    pub fn input(&self, name: &str) -> Option<&PinSpec> {
        self.inputs.iter().find(|spec| spec.name == name)
    }
}

impl fmt::Debug for NodeTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("properties", &self.properties)
            .field("has_check", &self.check.is_some())
            .finish()
    }
}

/// What an [`EmitFn`] sees: the node and one script expression per input pin.
pub struct EmitContext<'a> {
    pub node: &'a NodeInstance,
    inputs: &'a BTreeMap<String, String>,
}

impl<'a> EmitContext<'a> {
    pub fn new(node: &'a NodeInstance, inputs: &'a BTreeMap<String, String>) -> Self {
        Self { node, inputs }
    }

    /// Resolved expression for an input pin.
    pub fn input(&self, name: &str) -> Result<&str, String> {
        self.inputs
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| format!("input '{}' was not resolved", name))
    }

    /// Script variable holding one of this node's outputs.
    pub fn output(&self, pin: &str) -> String {
        output_variable(self.node.id(), pin)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.node.property(name)
    }
}

/// Name of the script variable holding `node.pin`.
pub fn output_variable(node: NodeId, pin: &str) -> String {
    let pin: String = pin
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("n{}_{}", node.0, pin)
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    descriptors: BTreeMap<&'static str, NodeTypeDescriptor>,
    ready: bool,
}

impl NodeRegistry {
    /// Empty, uninitialized registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in catalog. Calling this again is a no-op.
    pub fn init(&mut self) {
        if self.ready {
            tracing::debug!("[NGC] Node registry already initialized");
            return;
        }

        for descriptor in builtin::descriptors() {
            self.descriptors.insert(descriptor.name, descriptor);
        }
        self.ready = true;

        tracing::info!("[NGC] Node registry initialized ({} node types)", self.descriptors.len());
    }

    /// Build and initialize a registry. Resolves once the catalog is ready.
    pub async fn initialize() -> Self {
        let mut registry = Self::new();
        registry.init();
        registry
    }

    /// Completion signal for [`init`](Self::init).
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Add a custom node type, replacing any previous one with the same name.
    pub fn register(&mut self, descriptor: NodeTypeDescriptor) {
        if self.descriptors.insert(descriptor.name, descriptor).is_some() {
            tracing::debug!("[NGC] Replaced node type registration");
        }
    }

    pub fn resolve(&self, type_name: &str) -> Option<&NodeTypeDescriptor> {
        self.descriptors.get(type_name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeTypeDescriptor> + '_ {
        self.descriptors.values()
    }
}
