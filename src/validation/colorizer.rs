//! Status colors for the rendering collaborator.

use super::ValidationReport;
use crate::graph::{GraphDescription, NodeId, ValidationStatus};
use crate::registry::NodeRegistry;
use std::collections::BTreeMap;

pub const ERROR_COLOR: &str = "#ff2222";
pub const UNVISITED_COLOR: &str = "#808080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeColor {
    pub status: ValidationStatus,
    pub color: &'static str,
}

pub type NodeColors = BTreeMap<NodeId, NodeColor>;

/// Project a validation pass onto per-node colors. Pure: neither the graph
/// nor the report is touched.
pub fn colorize(graph: &GraphDescription, registry: &NodeRegistry, report: &ValidationReport) -> NodeColors {
    graph
        .nodes()
        .map(|node| {
            let status = report.status(node.id());
            let color = match status {
                ValidationStatus::Error => ERROR_COLOR,
                ValidationStatus::Unvisited => UNVISITED_COLOR,
                ValidationStatus::Ok => registry
                    .resolve(node.node_type())
                    .map(|descriptor| descriptor.color)
                    .unwrap_or(UNVISITED_COLOR),
            };
            (node.id(), NodeColor { status, color })
        })
        .collect()
}
