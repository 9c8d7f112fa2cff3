//! Built-in node catalog.

use super::{EmitFn, NodeKind, NodeTypeDescriptor, PinSpec};
use crate::codegen::node_handlers as emit;
use crate::graph::{DataType, GraphDescription, NodeInstance, PropertyValue};

const COMPARISON_OPERATORS: [&str; 6] = ["<", "<=", ">", ">=", "==", "!="];

fn category_color(category: &str) -> &'static str {
    match category {
        "event" => "#a83232",
        "constant" => "#3b6e3b",
        "math" => "#2f5f8f",
        "logic" => "#8f6f2f",
        "string" => "#3b8f6e",
        "vector" => "#7a3b8f",
        "variable" => "#5f5f8f",
        "flow" => "#8f3b5f",
        "scene" => "#3b7a8f",
        _ => "#6e6e6e",
    }
}

fn node(name: &'static str, kind: NodeKind, emit: EmitFn) -> NodeTypeDescriptor {
    let category = name.split('/').next().unwrap_or(name);
    NodeTypeDescriptor {
        name,
        category,
        kind,
        color: category_color(category),
        inputs: Vec::new(),
        outputs: Vec::new(),
        properties: Vec::new(),
        emit,
        check: None,
    }
}

fn number(value: f64) -> PropertyValue {
    PropertyValue::Number(value)
}

fn binary_math(name: &'static str, emit: EmitFn, b_default: f64) -> NodeTypeDescriptor {
    NodeTypeDescriptor {
        inputs: vec![
            PinSpec::required("a", DataType::Number),
            PinSpec::with_default("b", DataType::Number, number(b_default)),
        ],
        outputs: vec![PinSpec::output("out", DataType::Number)],
        ..node(name, NodeKind::Pure, emit)
    }
}

fn constant(name: &'static str, data_type: DataType, default: PropertyValue, check: super::CheckFn) -> NodeTypeDescriptor {
    NodeTypeDescriptor {
        outputs: vec![PinSpec::output("out", data_type)],
        properties: vec![("value", default)],
        check: Some(check),
        ..node(name, NodeKind::Pure, emit::emit_constant)
    }
}

pub(super) fn descriptors() -> Vec<NodeTypeDescriptor> {
    vec![
        // Events
        NodeTypeDescriptor {
            outputs: vec![PinSpec::output("exec", DataType::Execution)],
            ..node("event/start", NodeKind::Event, emit::emit_start_event)
        },
        NodeTypeDescriptor {
            outputs: vec![
                PinSpec::output("exec", DataType::Execution),
                PinSpec::output("dt", DataType::Number),
            ],
            ..node("event/tick", NodeKind::Event, emit::emit_tick_event)
        },
        // Constants
        constant("constant/number", DataType::Number, number(0.0), check_number_value),
        constant(
            "constant/string",
            DataType::String,
            PropertyValue::String(String::new()),
            check_string_value,
        ),
        constant(
            "constant/boolean",
            DataType::Boolean,
            PropertyValue::Boolean(false),
            check_boolean_value,
        ),
        constant(
            "constant/vector",
            DataType::Vector,
            PropertyValue::Vector([0.0; 3]),
            check_vector_value,
        ),
        // Math
        binary_math("math/add", emit::emit_add, 0.0),
        binary_math("math/subtract", emit::emit_subtract, 0.0),
        binary_math("math/multiply", emit::emit_multiply, 1.0),
        NodeTypeDescriptor {
            check: Some(check_divisor),
            ..binary_math("math/divide", emit::emit_divide, 1.0)
        },
        NodeTypeDescriptor {
            inputs: vec![PinSpec::required("value", DataType::Number)],
            outputs: vec![PinSpec::output("out", DataType::Number)],
            properties: vec![("min", number(0.0)), ("max", number(1.0))],
            check: Some(check_clamp_range),
            ..node("math/clamp", NodeKind::Pure, emit::emit_clamp)
        },
        // Logic
        NodeTypeDescriptor {
            inputs: vec![
                PinSpec::required("a", DataType::Number),
                PinSpec::with_default("b", DataType::Number, number(0.0)),
            ],
            outputs: vec![PinSpec::output("out", DataType::Boolean)],
            properties: vec![("op", PropertyValue::String("<".to_string()))],
            check: Some(check_comparison_operator),
            ..node("logic/compare", NodeKind::Pure, emit::emit_compare)
        },
        NodeTypeDescriptor {
            inputs: vec![PinSpec::required("value", DataType::Boolean)],
            outputs: vec![PinSpec::output("out", DataType::Boolean)],
            ..node("logic/not", NodeKind::Pure, emit::emit_not)
        },
        // Strings
        NodeTypeDescriptor {
            inputs: vec![
                PinSpec::with_default("a", DataType::Any, PropertyValue::String(String::new())),
                PinSpec::with_default("b", DataType::Any, PropertyValue::String(String::new())),
            ],
            outputs: vec![PinSpec::output("out", DataType::String)],
            ..node("string/concat", NodeKind::Pure, emit::emit_concat)
        },
        // Vectors
        NodeTypeDescriptor {
            inputs: vec![
                PinSpec::with_default("x", DataType::Number, number(0.0)),
                PinSpec::with_default("y", DataType::Number, number(0.0)),
                PinSpec::with_default("z", DataType::Number, number(0.0)),
            ],
            outputs: vec![PinSpec::output("out", DataType::Vector)],
            ..node("vector/make", NodeKind::Pure, emit::emit_make_vector)
        },
        NodeTypeDescriptor {
            inputs: vec![PinSpec::required("v", DataType::Vector)],
            outputs: vec![PinSpec::output("out", DataType::Number)],
            ..node("vector/length", NodeKind::Pure, emit::emit_vector_length)
        },
        // Variables
        NodeTypeDescriptor {
            outputs: vec![PinSpec::output("value", DataType::Any)],
            properties: vec![("name", PropertyValue::String(String::new()))],
            check: Some(check_declared_variable),
            ..node("variable/get", NodeKind::Pure, emit::emit_get_variable)
        },
        NodeTypeDescriptor {
            inputs: vec![PinSpec::exec(), PinSpec::required("value", DataType::Any)],
            outputs: vec![PinSpec::output("exec", DataType::Execution)],
            properties: vec![("name", PropertyValue::String(String::new()))],
            check: Some(check_declared_variable),
            ..node("variable/set", NodeKind::Flow, emit::emit_set_variable)
        },
        // Flow
        NodeTypeDescriptor {
            inputs: vec![
                PinSpec::exec(),
                PinSpec::with_default("message", DataType::Any, PropertyValue::String(String::new())),
            ],
            outputs: vec![PinSpec::output("exec", DataType::Execution)],
            ..node("debug/log", NodeKind::Flow, emit::emit_log)
        },
        NodeTypeDescriptor {
            inputs: vec![PinSpec::exec(), PinSpec::required("condition", DataType::Boolean)],
            outputs: vec![
                PinSpec::output("true", DataType::Execution),
                PinSpec::output("false", DataType::Execution),
            ],
            ..node("flow/branch", NodeKind::Flow, emit::emit_branch)
        },
        // Scene
        NodeTypeDescriptor {
            outputs: vec![PinSpec::output("out", DataType::Boolean)],
            ..node("scene/attached", NodeKind::Pure, emit::emit_scene_attached)
        },
    ]
}

fn expect_value(node: &NodeInstance, expected: DataType) -> Result<(), String> {
    match node.property("value") {
        Some(value) if value.data_type() == expected => Ok(()),
        Some(value) => Err(format!(
            "property 'value' must be a {}, found {}",
            expected,
            value.data_type()
        )),
        None => Err("property 'value' is missing".to_string()),
    }
}

fn check_number_value(node: &NodeInstance, _graph: &GraphDescription) -> Result<(), String> {
    expect_value(node, DataType::Number)
}

fn check_string_value(node: &NodeInstance, _graph: &GraphDescription) -> Result<(), String> {
    expect_value(node, DataType::String)
}

fn check_boolean_value(node: &NodeInstance, _graph: &GraphDescription) -> Result<(), String> {
    expect_value(node, DataType::Boolean)
}

fn check_vector_value(node: &NodeInstance, _graph: &GraphDescription) -> Result<(), String> {
    expect_value(node, DataType::Vector)
}

fn check_divisor(node: &NodeInstance, graph: &GraphDescription) -> Result<(), String> {
    if graph.incoming_link(node.id(), "b").is_some() {
        return Ok(());
    }
    match node.property("b").and_then(PropertyValue::as_number) {
        Some(divisor) if divisor == 0.0 => Err("division by zero: literal divisor 'b' is 0".to_string()),
        _ => Ok(()),
    }
}

fn check_clamp_range(node: &NodeInstance, _graph: &GraphDescription) -> Result<(), String> {
    let bound = |name: &str| {
        node.property(name)
            .and_then(PropertyValue::as_number)
            .ok_or_else(|| format!("property '{}' must be a number", name))
    };
    let (min, max) = (bound("min")?, bound("max")?);
    if min > max {
        return Err(format!("clamp range is empty: min {} > max {}", min, max));
    }
    Ok(())
}

fn check_comparison_operator(node: &NodeInstance, _graph: &GraphDescription) -> Result<(), String> {
    match node.property("op").and_then(PropertyValue::as_str) {
        Some(op) if COMPARISON_OPERATORS.contains(&op) => Ok(()),
        Some(op) => Err(format!("unsupported comparison operator '{}'", op)),
        None => Err("property 'op' must be a string".to_string()),
    }
}

fn check_declared_variable(node: &NodeInstance, graph: &GraphDescription) -> Result<(), String> {
    match node.property("name").and_then(PropertyValue::as_str) {
        Some("") | None => Err("variable name is empty".to_string()),
        Some(name) if !graph.variables().contains_key(name) => {
            Err(format!("variable '{}' is not declared", name))
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Link, NodeId};

    fn instance(name: &str) -> NodeInstance {
        let descriptor = descriptors()
            .into_iter()
            .find(|descriptor| descriptor.name == name)
            .unwrap();
        NodeInstance::from_descriptor(NodeId(1), &descriptor)
    }

    #[test]
    fn test_type_names_are_unique() {
        let mut names: Vec<_> = descriptors().iter().map(|d| d.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_clamp_rejects_inverted_range() {
        let graph = GraphDescription::new("clamp");
        let node = instance("math/clamp");
        assert!(check_clamp_range(&node, &graph).is_ok());

        let inverted = node
            .with_property("min", number(5.0))
            .with_property("max", number(1.0));
        let err = check_clamp_range(&inverted, &graph).unwrap_err();
        assert!(err.contains("min 5 > max 1"));
    }

    #[test]
    fn test_divide_rejects_literal_zero() {
        let graph = GraphDescription::new("divide");
        let node = instance("math/divide").with_property("b", number(0.0));
        assert!(check_divisor(&node, &graph).is_err());
        assert!(check_divisor(&instance("math/divide"), &graph).is_ok());
    }

    #[test]
    fn test_linked_divisor_ignores_stale_literal() {
        let mut graph = GraphDescription::new("divide");
        graph.push_link_unchecked(Link::new(NodeId(7), "out", NodeId(1), "b"));
        let node = instance("math/divide").with_property("b", number(0.0));
        assert!(check_divisor(&node, &graph).is_ok());
    }

    #[test]
    fn test_compare_operator_must_be_known() {
        let graph = GraphDescription::new("compare");
        let node = instance("logic/compare").with_property("op", PropertyValue::String("=~".into()));
        assert_eq!(
            check_comparison_operator(&node, &graph),
            Err("unsupported comparison operator '=~'".to_string())
        );
    }

    #[test]
    fn test_variables_must_be_declared() {
        let mut graph = GraphDescription::new("vars");
        let node = instance("variable/get").with_property("name", PropertyValue::String("score".into()));
        assert!(check_declared_variable(&node, &graph).is_err());

        graph.declare_variable("score", number(0.0));
        assert!(check_declared_variable(&node, &graph).is_ok());
        assert!(check_declared_variable(&instance("variable/get"), &graph).is_err());
    }

    #[test]
    fn test_constant_value_type_is_checked() {
        let graph = GraphDescription::new("constants");
        let node = instance("constant/number").with_property("value", PropertyValue::Boolean(true));
        assert_eq!(
            check_number_value(&node, &graph),
            Err("property 'value' must be a number, found boolean".to_string())
        );
    }
}
