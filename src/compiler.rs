//! # Graph Compiler
//!
//! Main entry point for compiling node graphs to Rhai scripts.

use crate::codegen::ScriptCodeGenerator;
use crate::graph::{GraphDescription, NodeId};
use crate::registry::NodeRegistry;
use crate::validation::validate;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Outcome of one compilation request. Never cached: every request builds a
/// fresh one from the current graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationResult {
    Success { code: String },
    Failure { error_node: NodeId, message: String },
}

impl CompilationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompilationResult::Success { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            CompilationResult::Success { code } => Some(code),
            CompilationResult::Failure { .. } => None,
        }
    }

    pub fn error_node(&self) -> Option<NodeId> {
        match self {
            CompilationResult::Success { .. } => None,
            CompilationResult::Failure { error_node, .. } => Some(*error_node),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CompilationResult::Success { .. } => None,
            CompilationResult::Failure { message, .. } => Some(message),
        }
    }
}

impl Serialize for CompilationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CompilationResult", 3)?;
        match self {
            CompilationResult::Success { code } => {
                state.serialize_field("success", &true)?;
                state.serialize_field("code", code)?;
            }
            CompilationResult::Failure { error_node, message } => {
                state.serialize_field("success", &false)?;
                state.serialize_field("errorNode", error_node)?;
                state.serialize_field("message", message)?;
            }
        }
        state.end()
    }
}

/// Compile a node graph to a Rhai script
///
/// The graph is validated first; the first validation error (in dependency
/// order) becomes the failure. Valid graphs are emitted in dependency order
/// with the lowest id first among independent nodes, so the output is a pure
/// function of the graph.
///
/// # Examples
///
/// ```rust
/// use ngc::{compile_graph, GraphDescription, Link, NodeRegistry, PropertyValue};
///
/// let mut registry = NodeRegistry::new();
/// registry.init();
///
/// let mut graph = GraphDescription::new("demo");
/// let five = graph.add_node("constant/number", &registry)?;
/// let add = graph.add_node("math/add", &registry)?;
/// graph.set_property(five, "value", PropertyValue::Number(5.0))?;
/// graph.add_link(Link::new(five, "out", add, "a"))?;
///
/// let result = compile_graph(&graph, &registry);
/// assert!(result.code().unwrap().contains("let n2_out = n1_out + 0.0;"));
/// # Ok::<(), ngc::GraphError>(())
/// ```
pub fn compile_graph(graph: &GraphDescription, registry: &NodeRegistry) -> CompilationResult {
    tracing::info!("[NGC] Starting graph compilation");
    tracing::info!(
        "[NGC] Graph: {} ({} nodes, {} links)",
        graph.name(),
        graph.nodes().len(),
        graph.links().len()
    );

    // Phase 1: Validate
    tracing::info!("[NGC] Phase 1: Validating graph...");
    let report = validate(graph, registry);
    if let Some(error) = report.first_error() {
        tracing::info!("[NGC] Compilation failed: {}", error);
        return CompilationResult::Failure {
            error_node: error.node,
            message: error.issue.to_string(),
        };
    }

    // Phase 2: Order
    tracing::info!("[NGC] Phase 2: Ordering nodes...");
    let order = report.traversal_order();
    tracing::info!("[NGC]   - {} nodes in execution order", order.len());

    // Phase 3: Generate code
    tracing::info!("[NGC] Phase 3: Generating script...");
    match ScriptCodeGenerator::new(graph, registry, order).generate_program() {
        Ok(code) => {
            tracing::info!("[NGC] Code generation complete ({} bytes)", code.len());
            tracing::info!("[NGC] Compilation successful!");
            CompilationResult::Success { code }
        }
        Err(error) => {
            tracing::info!("[NGC] Compilation failed: {}", error);
            CompilationResult::Failure {
                error_node: error.node,
                message: error.message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Link, PropertyValue};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.init();
        registry
    }

    fn five_plus_zero(registry: &NodeRegistry) -> GraphDescription {
        let mut graph = GraphDescription::new("five");
        let constant = graph.add_node("constant/number", registry).unwrap();
        let add = graph.add_node("math/add", registry).unwrap();
        graph
            .set_property(constant, "value", PropertyValue::Number(5.0))
            .unwrap();
        graph.add_link(Link::new(constant, "out", add, "a")).unwrap();
        graph
    }

    #[test]
    fn test_constant_into_add() {
        init_tracing();
        let registry = registry();
        let graph = five_plus_zero(&registry);

        let result = compile_graph(&graph, &registry);

        let code = result.code().unwrap();
        assert!(code.contains("let n1_out = 5.0;"));
        assert!(code.contains("let n2_out = n1_out + 0.0;"));
        assert!(code.find("n1_out = 5.0").unwrap() < code.find("n2_out =").unwrap());
    }

    #[test]
    fn test_removing_producer_fails_on_consumer() {
        init_tracing();
        let registry = registry();
        let mut graph = five_plus_zero(&registry);
        graph.remove_node(NodeId(1)).unwrap();

        let result = compile_graph(&graph, &registry);

        assert!(!result.is_success());
        assert_eq!(result.error_node(), Some(NodeId(2)));
        assert_eq!(result.message(), Some("input 'a' is not connected and has no value"));
    }

    #[test]
    fn test_linked_divisor_overrides_zero_literal() {
        init_tracing();
        let registry = registry();
        let mut graph = GraphDescription::new("divide");
        let constant = graph.add_node("constant/number", &registry).unwrap();
        let divide = graph.add_node("math/divide", &registry).unwrap();
        graph.set_property(constant, "value", PropertyValue::Number(2.0)).unwrap();
        graph.set_property(divide, "a", PropertyValue::Number(1.0)).unwrap();
        graph.set_property(divide, "b", PropertyValue::Number(0.0)).unwrap();
        graph.add_link(Link::new(constant, "out", divide, "b")).unwrap();

        let result = compile_graph(&graph, &registry);

        assert!(result.is_success(), "{:?}", result.message());
        assert!(result.code().unwrap().contains("let n2_out = 1.0 / n1_out;"));

        graph.remove_link(divide, "b");
        let result = compile_graph(&graph, &registry);
        assert_eq!(result.error_node(), Some(divide));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let registry = registry();

        let build = |reversed: bool| {
            let mut graph = GraphDescription::new("det");
            let a = graph.add_node("constant/number", &registry).unwrap();
            let b = graph.add_node("constant/number", &registry).unwrap();
            let mul = graph.add_node("math/multiply", &registry).unwrap();
            let mut links = vec![Link::new(a, "out", mul, "a"), Link::new(b, "out", mul, "b")];
            if reversed {
                links.reverse();
            }
            for link in links {
                graph.add_link(link).unwrap();
            }
            graph
        };

        let first = compile_graph(&build(false), &registry);
        let second = compile_graph(&build(false), &registry);
        let reordered = compile_graph(&build(true), &registry);

        assert!(first.is_success());
        assert_eq!(first, second);
        assert_eq!(first, reordered);
    }

    #[test]
    fn test_consumer_with_lower_id_is_emitted_after_producer() {
        let registry = registry();
        let mut graph = GraphDescription::new("order");
        let log = graph.add_node("debug/log", &registry).unwrap();
        let start = graph.add_node("event/start", &registry).unwrap();
        let text = graph.add_node("constant/string", &registry).unwrap();
        graph.add_link(Link::new(start, "exec", log, "exec")).unwrap();
        graph.add_link(Link::new(text, "out", log, "message")).unwrap();

        let result = compile_graph(&graph, &registry);
        let code = result.code().unwrap();

        let position = |needle: &str| code.find(needle).unwrap();
        assert!(position("// n2: event/start") < position("// n3: constant/string"));
        assert!(position("// n3: constant/string") < position("// n1: debug/log"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let registry = registry();
        let mut graph = GraphDescription::new("loop");
        let a = graph.add_node("math/add", &registry).unwrap();
        let b = graph.add_node("math/add", &registry).unwrap();
        graph.add_link(Link::new(a, "out", b, "a")).unwrap();
        graph.add_link(Link::new(b, "out", a, "a")).unwrap();

        let result = compile_graph(&graph, &registry);

        assert_eq!(result.error_node(), Some(a));
        assert_eq!(result.message(), Some("node is part of a dependency cycle"));
    }

    #[test]
    fn test_generated_script_parses() {
        let registry = registry();
        let mut graph = GraphDescription::new("catalog");
        graph.declare_variable("count", PropertyValue::Number(0.0));

        let tick = graph.add_node("event/tick", &registry).unwrap();
        let get = graph.add_node("variable/get", &registry).unwrap();
        let add = graph.add_node("math/add", &registry).unwrap();
        let set = graph.add_node("variable/set", &registry).unwrap();
        let compare = graph.add_node("logic/compare", &registry).unwrap();
        let branch = graph.add_node("flow/branch", &registry).unwrap();
        let log = graph.add_node("debug/log", &registry).unwrap();
        let vector = graph.add_node("vector/make", &registry).unwrap();
        let length = graph.add_node("vector/length", &registry).unwrap();
        let clamp = graph.add_node("math/clamp", &registry).unwrap();
        let scene = graph.add_node("scene/attached", &registry).unwrap();
        let not = graph.add_node("logic/not", &registry).unwrap();
        let concat = graph.add_node("string/concat", &registry).unwrap();

        for node in [get, set] {
            graph
                .set_property(node, "name", PropertyValue::String("count".into()))
                .unwrap();
        }
        graph.set_property(add, "b", PropertyValue::Number(1.0)).unwrap();
        for link in [
            Link::new(get, "value", add, "a"),
            Link::new(tick, "exec", set, "exec"),
            Link::new(add, "out", set, "value"),
            Link::new(add, "out", compare, "a"),
            Link::new(set, "exec", branch, "exec"),
            Link::new(compare, "out", branch, "condition"),
            Link::new(branch, "true", log, "exec"),
            Link::new(tick, "dt", vector, "x"),
            Link::new(vector, "out", length, "v"),
            Link::new(length, "out", clamp, "value"),
            Link::new(scene, "out", not, "value"),
            Link::new(clamp, "out", concat, "a"),
            Link::new(not, "out", concat, "b"),
            Link::new(concat, "out", log, "message"),
        ] {
            graph.add_link(link).unwrap();
        }

        let result = compile_graph(&graph, &registry);
        let code = result.code().unwrap();

        rhai::Engine::new().compile(code).unwrap();
    }

    #[test]
    fn test_result_serialization() {
        let success = CompilationResult::Success {
            code: "let x = 1.0;".to_string(),
        };
        let failure = CompilationResult::Failure {
            error_node: NodeId(7),
            message: "bad".to_string(),
        };

        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            serde_json::json!({ "success": true, "code": "let x = 1.0;" })
        );
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            serde_json::json!({ "success": false, "errorNode": 7, "message": "bad" })
        );
    }
}
