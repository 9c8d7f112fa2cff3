//! # Graph Model
//!
//! In-memory representation of a node graph: nodes with typed pins, the links
//! between them, declared graph variables and graph-level configuration.
//!
//! Storage is private. Consumers such as the rendering collaborator read the
//! graph through [`GraphDescription::nodes`] and friends and change it only
//! through the mutation methods, which keep node ids unique and never create a
//! link whose endpoints are missing.

mod document;

pub use document::{
    read_document, write_document, GraphDocument, LinkRecord, NodeRecord, PinRecord,
    DOCUMENT_VERSION,
};

use crate::error::GraphError;
use crate::registry::{NodeRegistry, NodeTypeDescriptor};
use crate::validation::ValidationReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable node identity. Ordering is used for deterministic tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Data carried by a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    String,
    Boolean,
    Vector,
    Execution,
    /// Wildcard - matches with any type
    Any,
}

impl DataType {
    /// `Any` accepts and is accepted by everything; other types only match
    /// themselves. No coercion happens at runtime.
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        match (self, other) {
            (DataType::Any, _) | (_, DataType::Any) => true,
            (a, b) => a == b,
        }
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, DataType::Execution)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Number => "number",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Vector => "vector",
            DataType::Execution => "execution",
            DataType::Any => "any",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
}

/// A typed connection point (socket) on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pub name: String,
    pub data_type: DataType,
    pub direction: PinDirection,
}

impl Pin {
    pub fn input(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            direction: PinDirection::Input,
        }
    }

    pub fn output(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            direction: PinDirection::Output,
        }
    }
}

/// Literal value stored in a node property or used as a pin default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Vector([f64; 3]),
}

impl PropertyValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            PropertyValue::Boolean(_) => DataType::Boolean,
            PropertyValue::Number(_) => DataType::Number,
            PropertyValue::String(_) => DataType::String,
            PropertyValue::Vector(_) => DataType::Vector,
        }
    }
}

/// Transient per-node result of the last validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationStatus {
    #[default]
    Unvisited,
    Ok,
    Error,
}

/// Canvas position. Only the rendering collaborator cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Graph-level settings. Inert to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub align_to_grid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInstance {
    id: NodeId,
    node_type: String,
    pub position: Position,
    properties: BTreeMap<String, PropertyValue>,
    inputs: Vec<Pin>,
    outputs: Vec<Pin>,
    status: ValidationStatus,
}

impl NodeInstance {
    /// Create a bare node. Pins are added with [`with_input`](Self::with_input)
    /// and [`with_output`](Self::with_output).
    pub fn new(id: NodeId, node_type: &str) -> Self {
        Self {
            id,
            node_type: node_type.to_string(),
            position: Position::default(),
            properties: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            status: ValidationStatus::Unvisited,
        }
    }

    /// Instantiate a node with the pins and default properties its descriptor declares.
    pub fn from_descriptor(id: NodeId, descriptor: &NodeTypeDescriptor) -> Self {
        let mut node = Self::new(id, descriptor.name);
        node.inputs = descriptor
            .inputs
            .iter()
            .map(|spec| Pin::input(spec.name, spec.data_type))
            .collect();
        node.outputs = descriptor
            .outputs
            .iter()
            .map(|spec| Pin::output(spec.name, spec.data_type))
            .collect();
        node.properties = descriptor
            .properties
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        node
    }

    pub fn with_input(mut self, name: &str, data_type: DataType) -> Self {
        self.inputs.push(Pin::input(name, data_type));
        self
    }

    pub fn with_output(mut self, name: &str, data_type: DataType) -> Self {
        self.outputs.push(Pin::output(name, data_type));
        self
    }

    pub fn with_property(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn inputs(&self) -> &[Pin] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Pin] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&Pin> {
        self.inputs.iter().find(|pin| pin.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Pin> {
        self.outputs.iter().find(|pin| pin.name == name)
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }
}

/// Directed edge from an output pin to an input pin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Link {
    pub from_node: NodeId,
    pub from_pin: String,
    pub to_node: NodeId,
    pub to_pin: String,
}

impl Link {
    pub fn new(from_node: NodeId, from_pin: &str, to_node: NodeId, to_pin: &str) -> Self {
        Self {
            from_node,
            from_pin: from_pin.to_string(),
            to_node,
            to_pin: to_pin.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphDescription {
    name: String,
    config: GraphConfig,
    variables: BTreeMap<String, PropertyValue>,
    nodes: BTreeMap<NodeId, NodeInstance>,
    links: Vec<Link>,
    last_node_id: u32,
}

impl GraphDescription {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GraphConfig {
        &mut self.config
    }

    /// Read-only view of all nodes in ascending id order.
    pub fn nodes(&self) -> impl ExactSizeIterator<Item = &NodeInstance> + '_ {
        self.nodes.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeInstance> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Links feeding the inputs of `node`, in authored order.
    pub fn incoming_links(&self, node: NodeId) -> impl Iterator<Item = &Link> + '_ {
        self.links.iter().filter(move |link| link.to_node == node)
    }

    pub fn incoming_link(&self, node: NodeId, pin: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|link| link.to_node == node && link.to_pin == pin)
    }

    pub fn variables(&self) -> &BTreeMap<String, PropertyValue> {
        &self.variables
    }

    /// Declare (or redeclare) a graph variable with its initial value.
    pub fn declare_variable(&mut self, name: &str, initial: PropertyValue) -> Option<PropertyValue> {
        self.variables.insert(name.to_string(), initial)
    }

    pub fn last_node_id(&self) -> u32 {
        self.last_node_id
    }

    /// Create a node of a registered type under a freshly allocated id.
    pub fn add_node(&mut self, node_type: &str, registry: &NodeRegistry) -> Result<NodeId, GraphError> {
        let descriptor = registry
            .resolve(node_type)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))?;

        let next = self
            .last_node_id
            .checked_add(1)
            .ok_or(GraphError::IdSpaceExhausted)?;
        let id = NodeId(next);
        self.insert_node(NodeInstance::from_descriptor(id, descriptor))?;
        Ok(id)
    }

    /// Insert a fully built node, keeping ids unique.
    pub fn insert_node(&mut self, node: NodeInstance) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.last_node_id = self.last_node_id.max(node.id.0);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Remove a node together with every link touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(NodeInstance, Vec<Link>), GraphError> {
        let node = self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))?;

        let (removed, kept): (Vec<Link>, Vec<Link>) = std::mem::take(&mut self.links)
            .into_iter()
            .partition(|link| link.from_node == id || link.to_node == id);
        self.links = kept;

        Ok((node, removed))
    }

    /// Connect an output pin to an input pin.
    ///
    /// An input holds at most one link, so a link already feeding the target
    /// input is replaced and returned. Type compatibility is left to
    /// validation.
    pub fn add_link(&mut self, link: Link) -> Result<Option<Link>, GraphError> {
        self.endpoint(link.from_node, &link.from_pin, PinDirection::Output)?;
        self.endpoint(link.to_node, &link.to_pin, PinDirection::Input)?;

        let replaced = self.remove_link(link.to_node, &link.to_pin);
        self.links.push(link);
        Ok(replaced)
    }

    /// Check that `node` has a pin called `pin` facing `direction`.
    fn endpoint(&self, node: NodeId, pin: &str, direction: PinDirection) -> Result<(), GraphError> {
        let instance = self.nodes.get(&node).ok_or(GraphError::NodeNotFound(node))?;
        let found = instance
            .inputs()
            .iter()
            .chain(instance.outputs())
            .filter(|candidate| candidate.name == pin)
            .map(|candidate| candidate.direction)
            .collect::<Vec<_>>();

        if found.contains(&direction) {
            return Ok(());
        }
        match found.first() {
            Some(&other) => Err(GraphError::WrongDirection {
                node,
                pin: pin.to_string(),
                found: other,
            }),
            None => Err(GraphError::PinNotFound {
                node,
                pin: pin.to_string(),
            }),
        }
    }

    /// Disconnect whatever feeds `to_node.to_pin`.
    pub fn remove_link(&mut self, to_node: NodeId, to_pin: &str) -> Option<Link> {
        let index = self
            .links
            .iter()
            .position(|link| link.to_node == to_node && link.to_pin == to_pin)?;
        Some(self.links.remove(index))
    }

    /// Set a node property, returning the previous value.
    pub fn set_property(
        &mut self,
        id: NodeId,
        name: &str,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        Ok(node.properties.insert(name.to_string(), value))
    }

    pub fn remove_property(&mut self, id: NodeId, name: &str) -> Result<Option<PropertyValue>, GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        Ok(node.properties.remove(name))
    }

    /// Copy the per-node statuses of a validation pass onto the nodes.
    pub fn annotate(&mut self, report: &ValidationReport) {
        for node in self.nodes.values_mut() {
            node.status = report.status(node.id);
        }
    }

    pub(crate) fn push_link_unchecked(&mut self, link: Link) {
        self.links.push(link);
    }
}
