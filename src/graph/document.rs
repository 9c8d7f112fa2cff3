//! JSON document format for saving and loading node graphs.
//!
//! Loading tolerates unknown fields (ignored) and missing optional fields
//! (defaulted). `nodes` may be written either as an array of records or as an
//! object keyed by node id.

use super::{
    DataType, GraphConfig, GraphDescription, Link, NodeId, NodeInstance, Pin, Position,
    PropertyValue,
};
use crate::error::{LoadError, SaveError};
use crate::registry::NodeRegistry;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: GraphConfig,
    #[serde(default)]
    pub last_node_id: u32,
    #[serde(default)]
    pub variables: BTreeMap<String, PropertyValue>,
    #[serde(default, deserialize_with = "deserialize_nodes")]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub inputs: Vec<PinRecord>,
    #[serde(default)]
    pub outputs: Vec<PinRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub name: String,
    #[serde(rename = "type", default = "default_pin_type")]
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub from_node: NodeId,
    pub from_socket: String,
    pub to_node: NodeId,
    pub to_socket: String,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

fn default_pin_type() -> DataType {
    DataType::Any
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeList {
    List(Vec<NodeRecord>),
    Map(BTreeMap<String, NodeRecord>),
}

fn deserialize_nodes<'de, D>(deserializer: D) -> Result<Vec<NodeRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NodeList::deserialize(deserializer)? {
        NodeList::List(nodes) => nodes,
        NodeList::Map(nodes) => nodes.into_values().collect(),
    })
}

impl PinRecord {
    fn from_pin(pin: &Pin) -> Self {
        Self {
            name: pin.name.clone(),
            data_type: pin.data_type,
        }
    }
}

impl From<&Link> for LinkRecord {
    fn from(link: &Link) -> Self {
        Self {
            from_node: link.from_node,
            from_socket: link.from_pin.clone(),
            to_node: link.to_node,
            to_socket: link.to_pin.clone(),
        }
    }
}

impl From<LinkRecord> for Link {
    fn from(record: LinkRecord) -> Self {
        Self {
            from_node: record.from_node,
            from_pin: record.from_socket,
            to_node: record.to_node,
            to_pin: record.to_socket,
        }
    }
}

impl GraphDescription {
    /// Build a graph from a parsed document.
    ///
    /// Nodes whose type resolves get their pins from the descriptor and their
    /// default properties overlaid by the recorded ones; unknown types keep
    /// the recorded pins and are reported later by validation. Links whose
    /// target node does not exist are dropped.
    pub fn from_document(document: GraphDocument, registry: &NodeRegistry) -> Result<Self, LoadError> {
        if !registry.is_ready() {
            return Err(LoadError::RegistryNotReady);
        }
        if document.version > DOCUMENT_VERSION {
            return Err(LoadError::UnsupportedVersion {
                found: document.version,
                supported: DOCUMENT_VERSION,
            });
        }

        let mut graph = GraphDescription::new(&document.name);
        graph.config = document.config;
        graph.variables = document.variables;
        graph.last_node_id = document.last_node_id;

        for record in document.nodes {
            let id = record.id;
            let mut node = match registry.resolve(&record.node_type) {
                Some(descriptor) => NodeInstance::from_descriptor(id, descriptor),
                None => {
                    tracing::debug!(
                        "[NGC] Node {} has unregistered type '{}', keeping recorded pins",
                        id,
                        record.node_type
                    );
                    let mut node = NodeInstance::new(id, &record.node_type);
                    node.inputs = record
                        .inputs
                        .iter()
                        .map(|pin| Pin::input(&pin.name, pin.data_type))
                        .collect();
                    node.outputs = record
                        .outputs
                        .iter()
                        .map(|pin| Pin::output(&pin.name, pin.data_type))
                        .collect();
                    node
                }
            };
            node.position = record.position;
            node.properties.extend(record.properties);

            graph
                .insert_node(node)
                .map_err(|_| LoadError::DuplicateNode(id))?;
        }

        for record in document.links {
            if !graph.contains_node(record.to_node) {
                tracing::warn!(
                    "[NGC] Dropping link {}.{} -> {}.{}: target node does not exist",
                    record.from_node,
                    record.from_socket,
                    record.to_node,
                    record.to_socket
                );
                continue;
            }
            graph.push_link_unchecked(record.into());
        }

        tracing::info!(
            "[NGC] Loaded graph '{}' ({} nodes, {} links)",
            graph.name(),
            graph.nodes().len(),
            graph.links().len()
        );

        Ok(graph)
    }

    /// Snapshot the graph as a document. Validation status is not persisted.
    pub fn to_document(&self) -> GraphDocument {
        let pins = |pins: &[Pin]| -> Vec<PinRecord> { pins.iter().map(PinRecord::from_pin).collect() };

        GraphDocument {
            version: DOCUMENT_VERSION,
            name: self.name.clone(),
            config: self.config.clone(),
            last_node_id: self.last_node_id,
            variables: self.variables.clone(),
            nodes: self
                .nodes()
                .map(|node| NodeRecord {
                    id: node.id(),
                    node_type: node.node_type().to_string(),
                    position: node.position,
                    properties: node.properties().clone(),
                    inputs: pins(node.inputs()),
                    outputs: pins(node.outputs()),
                })
                .collect(),
            links: self.links().iter().map(LinkRecord::from).collect(),
        }
    }
}

/// Read and parse a graph document.
pub async fn read_document(path: impl AsRef<Path>) -> Result<GraphDocument, LoadError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(serde_json::from_str(&json)?)
}

/// Serialize a graph document as pretty JSON and write it out.
pub async fn write_document(path: impl AsRef<Path>, document: &GraphDocument) -> Result<(), SaveError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(document)?;

    tokio::fs::write(path, json)
        .await
        .map_err(|source| SaveError::Io {
            path: path.to_path_buf(),
            source,
        })
}
