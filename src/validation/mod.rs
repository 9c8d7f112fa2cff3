//! # Graph Validation
//!
//! Structural and type checks run before generation. Every node is visited in
//! dependency order and gets exactly one status; the first failing check on a
//! node is the one recorded, in this priority:
//!
//! 1. the node type resolves in the registry
//! 2. every input pin is resolved (one link, a same-named property, or a default)
//! 3. linked and literal inputs are type compatible with their pins
//! 4. the node is not on a dependency cycle
//! 5. the node type's own semantic check passes
//!
//! Problems are data, not errors: they end up in a [`ValidationReport`].

pub mod colorizer;

use crate::analysis::{dependency_order, DependencyOrder};
use crate::graph::{DataType, GraphDescription, Link, NodeId, NodeInstance, PropertyValue, ValidationStatus};
use crate::registry::{NodeRegistry, NodeTypeDescriptor};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a node failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("input '{pin}' is not connected and has no value")]
    UnresolvedInput { pin: String },

    #[error("link targets unknown input '{pin}'")]
    UnknownInputPin { pin: String },

    #[error("input '{pin}' has {count} incoming links")]
    MultipleLinks { pin: String, count: usize },

    #[error("input '{pin}' is linked to missing node {from_node}")]
    MissingSourceNode { pin: String, from_node: NodeId },

    #[error("input '{pin}' is linked to missing output '{output}' on node {from_node}")]
    MissingSourcePin {
        pin: String,
        from_node: NodeId,
        output: String,
    },

    #[error("input '{pin}' expects {expected}, got {found}")]
    TypeMismatch {
        pin: String,
        expected: DataType,
        found: DataType,
    },

    #[error("node is part of a dependency cycle")]
    Cycle,

    #[error("{0}")]
    Check(String),
}

/// An issue pinned to the node it was found on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("node {node}: {issue}")]
pub struct ValidationError {
    pub node: NodeId,
    pub issue: ValidationIssue,
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    dependencies: DependencyOrder,
    statuses: BTreeMap<NodeId, ValidationStatus>,
    errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// Status of `node`; nodes the pass never saw are `Unvisited`.
    pub fn status(&self, node: NodeId) -> ValidationStatus {
        self.statuses.get(&node).copied().unwrap_or_default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error in traversal order.
    pub fn first_error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn issue(&self, node: NodeId) -> Option<&ValidationIssue> {
        self.errors
            .iter()
            .find(|error| error.node == node)
            .map(|error| &error.issue)
    }

    /// Order the nodes were visited in.
    pub fn traversal_order(&self) -> &[NodeId] {
        &self.dependencies.order
    }

    pub fn dependencies(&self) -> &DependencyOrder {
        &self.dependencies
    }
}

/// Where an input pin gets its value from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputSource<'g> {
    Link(&'g Link),
    Property(&'g PropertyValue),
    Default(&'g PropertyValue),
    Unresolved,
}

/// Resolve one input pin. A link wins over a same-named property, which wins
/// over the descriptor default.
pub fn input_source<'g>(
    graph: &'g GraphDescription,
    node: &'g NodeInstance,
    descriptor: &'g NodeTypeDescriptor,
    pin: &str,
) -> InputSource<'g> {
    if let Some(link) = graph.incoming_link(node.id(), pin) {
        return InputSource::Link(link);
    }
    if let Some(value) = node.property(pin) {
        return InputSource::Property(value);
    }
    match descriptor.input(pin).and_then(|spec| spec.default.as_ref()) {
        Some(value) => InputSource::Default(value),
        None => InputSource::Unresolved,
    }
}

pub fn validate(graph: &GraphDescription, registry: &NodeRegistry) -> ValidationReport {
    let dependencies = dependency_order(graph);
    let mut statuses = BTreeMap::new();
    let mut errors = Vec::new();

    for &id in &dependencies.order {
        let Some(node) = graph.node(id) else {
            continue;
        };

        match check_node(graph, registry, &dependencies, node) {
            Ok(()) => {
                statuses.insert(id, ValidationStatus::Ok);
            }
            Err(issue) => {
                tracing::debug!("[NGC] Node {} ({}) failed validation: {}", id, node.node_type(), issue);
                statuses.insert(id, ValidationStatus::Error);
                errors.push(ValidationError { node: id, issue });
            }
        }
    }

    if let Some(first) = errors.first() {
        tracing::info!("[NGC] Validation found {} error(s), first: {}", errors.len(), first);
    }

    ValidationReport {
        dependencies,
        statuses,
        errors,
    }
}

fn check_node(
    graph: &GraphDescription,
    registry: &NodeRegistry,
    dependencies: &DependencyOrder,
    node: &NodeInstance,
) -> Result<(), ValidationIssue> {
    let descriptor = registry
        .resolve(node.node_type())
        .ok_or_else(|| ValidationIssue::UnknownNodeType(node.node_type().to_string()))?;

    check_inputs_resolved(graph, node, descriptor)?;
    check_types(graph, node)?;

    if dependencies.is_cyclic(node.id()) {
        return Err(ValidationIssue::Cycle);
    }

    if let Some(check) = descriptor.check {
        check(node, graph).map_err(ValidationIssue::Check)?;
    }

    Ok(())
}

fn check_inputs_resolved(
    graph: &GraphDescription,
    node: &NodeInstance,
    descriptor: &NodeTypeDescriptor,
) -> Result<(), ValidationIssue> {
    let incoming: Vec<&Link> = graph.incoming_links(node.id()).collect();

    if let Some(link) = incoming.iter().find(|link| node.input(&link.to_pin).is_none()) {
        return Err(ValidationIssue::UnknownInputPin {
            pin: link.to_pin.clone(),
        });
    }

    for pin in node.inputs() {
        let feeding: Vec<&&Link> = incoming.iter().filter(|link| link.to_pin == pin.name).collect();
        if feeding.len() > 1 {
            return Err(ValidationIssue::MultipleLinks {
                pin: pin.name.clone(),
                count: feeding.len(),
            });
        }

        if let Some(link) = feeding.first() {
            let source = graph
                .node(link.from_node)
                .ok_or_else(|| ValidationIssue::MissingSourceNode {
                    pin: pin.name.clone(),
                    from_node: link.from_node,
                })?;
            if source.output(&link.from_pin).is_none() {
                return Err(ValidationIssue::MissingSourcePin {
                    pin: pin.name.clone(),
                    from_node: link.from_node,
                    output: link.from_pin.clone(),
                });
            }
            continue;
        }

        if input_source(graph, node, descriptor, &pin.name) == InputSource::Unresolved {
            return Err(ValidationIssue::UnresolvedInput {
                pin: pin.name.clone(),
            });
        }
    }

    Ok(())
}

fn check_types(graph: &GraphDescription, node: &NodeInstance) -> Result<(), ValidationIssue> {
    for pin in node.inputs() {
        let found = match graph.incoming_link(node.id(), &pin.name) {
            Some(link) => graph
                .node(link.from_node)
                .and_then(|source| source.output(&link.from_pin))
                .map(|output| output.data_type),
            None => node.property(&pin.name).map(PropertyValue::data_type),
        };

        if let Some(found) = found {
            if !found.is_compatible_with(&pin.data_type) {
                return Err(ValidationIssue::TypeMismatch {
                    pin: pin.name.clone(),
                    expected: pin.data_type,
                    found,
                });
            }
        }
    }
    Ok(())
}
