//! # Script Code Generator
//!
//! Turns a validated graph into Rhai statements.

use super::node_handlers::{literal, string_literal, VARIABLES_MAP};
use crate::graph::{GraphDescription, NodeId, NodeInstance};
use crate::registry::{output_variable, EmitContext, NodeKind, NodeRegistry, NodeTypeDescriptor};
use crate::validation::{input_source, InputSource};
use std::collections::BTreeMap;
use thiserror::Error;

/// A node whose statements could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("node {node}: {message}")]
pub struct GenerationError {
    pub node: NodeId,
    pub message: String,
}

impl GenerationError {
    fn new(node: NodeId, message: impl Into<String>) -> Self {
        Self {
            node,
            message: message.into(),
        }
    }
}

/// Rhai code generator for one graph.
pub struct ScriptCodeGenerator<'a> {
    graph: &'a GraphDescription,
    registry: &'a NodeRegistry,
    order: &'a [NodeId],
}

impl<'a> ScriptCodeGenerator<'a> {
    /// `order` must list every node with producers before consumers.
    pub fn new(graph: &'a GraphDescription, registry: &'a NodeRegistry, order: &'a [NodeId]) -> Self {
        Self {
            graph,
            registry,
            order,
        }
    }

    /// Generate the complete program: header, variable prelude, node statements.
    pub fn generate_program(&self) -> Result<String, GenerationError> {
        let mut code = String::new();

        code.push_str(&format!(
            "// Auto-generated code from node graph {}\n",
            string_literal(self.graph.name())
        ));
        code.push_str("// DO NOT EDIT - Changes will be overwritten\n\n");

        code.push_str(&self.generate_prelude());

        let mut events = 0;
        for &id in self.order {
            let node = self
                .graph
                .node(id)
                .ok_or_else(|| GenerationError::new(id, "node disappeared during generation"))?;
            let descriptor = self
                .registry
                .resolve(node.node_type())
                .ok_or_else(|| GenerationError::new(id, format!("unknown node type '{}'", node.node_type())))?;

            if descriptor.kind == NodeKind::Event {
                events += 1;
            }

            let statement = self.generate_node(node, descriptor)?;
            code.push_str(&format!("// n{}: {}\n", id, node.node_type()));
            code.push_str(&statement);
            code.push('\n');
        }

        if events == 0 {
            tracing::warn!(
                "[NGC] Graph '{}' has no event nodes; the program will never do anything",
                self.graph.name()
            );
        }

        Ok(code)
    }

    /// Declared graph variables keep their value across dispatches, so each is
    /// only initialized when missing from the map.
    fn generate_prelude(&self) -> String {
        let variables = self.graph.variables();
        if variables.is_empty() {
            return String::new();
        }

        let mut prelude = String::from("// Graph variables\n");
        for (name, initial) in variables {
            let key = string_literal(name);
            prelude.push_str(&format!(
                "if !{map}.contains({key}) {{ {map}[{key}] = {}; }}\n",
                literal(initial),
                map = VARIABLES_MAP,
            ));
        }
        prelude.push('\n');
        prelude
    }

    fn generate_node(
        &self,
        node: &NodeInstance,
        descriptor: &NodeTypeDescriptor,
    ) -> Result<String, GenerationError> {
        let mut inputs = BTreeMap::new();
        for pin in node.inputs() {
            let expression = match input_source(self.graph, node, descriptor, &pin.name) {
                InputSource::Link(link) => output_variable(link.from_node, &link.from_pin),
                InputSource::Property(value) | InputSource::Default(value) => literal(value),
                InputSource::Unresolved => {
                    return Err(GenerationError::new(
                        node.id(),
                        format!("input '{}' is not connected and has no value", pin.name),
                    ))
                }
            };
            inputs.insert(pin.name.clone(), expression);
        }

        tracing::debug!("[NGC] Emitting node {} ({})", node.id(), node.node_type());
        (descriptor.emit)(&EmitContext::new(node, &inputs)).map_err(|message| GenerationError::new(node.id(), message))
    }
}
