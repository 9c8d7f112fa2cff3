//! # Node-Specific Handlers
//!
//! Emission rules for the built-in node types, plus the literal formatting
//! they share.
//!
//! Every handler declares one script variable per output pin
//! (`n{id}_{pin}`). Execution pins are boolean activation variables: event
//! nodes raise theirs when the runtime dispatches the matching event, flow
//! nodes guard their side effect on the incoming activation and forward it.

use crate::graph::PropertyValue;
use crate::registry::EmitContext;

/// Script variable naming the event being dispatched (`"start"` or `"tick"`).
pub const EVENT_VARIABLE: &str = "graph_event";
/// Seconds since the previous dispatch.
pub const DELTA_VARIABLE: &str = "graph_dt";
/// Object map holding graph variables across dispatches.
pub const VARIABLES_MAP: &str = "graph_vars";
/// Scene binding; unit in standalone runs.
pub const SCENE_VARIABLE: &str = "scene";

pub const START_EVENT: &str = "start";
pub const TICK_EVENT: &str = "tick";

/// Render a literal as a Rhai expression.
pub fn literal(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Boolean(b) => b.to_string(),
        PropertyValue::Number(n) => number_literal(*n),
        PropertyValue::String(s) => string_literal(s),
        PropertyValue::Vector([x, y, z]) => format!(
            "[{}, {}, {}]",
            number_literal(*x),
            number_literal(*y),
            number_literal(*z)
        ),
    }
}

/// Floats always carry a fractional part so Rhai never sees an integer.
pub fn number_literal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{:?}", value)
    }
}

pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn string_property(ctx: &EmitContext<'_>, name: &str) -> Result<String, String> {
    match ctx.property(name) {
        Some(PropertyValue::String(s)) => Ok(s.clone()),
        _ => Err(format!("property '{}' must be a string", name)),
    }
}

fn number_property(ctx: &EmitContext<'_>, name: &str) -> Result<f64, String> {
    ctx.property(name)
        .and_then(PropertyValue::as_number)
        .ok_or_else(|| format!("property '{}' must be a number", name))
}

/// Guarded statement followed by forwarding the activation.
fn guarded(ctx: &EmitContext<'_>, statement: &str) -> Result<String, String> {
    let exec = ctx.input("exec")?;
    Ok(format!(
        "if {exec} {{ {statement} }}\nlet {} = {exec};",
        ctx.output("exec")
    ))
}

fn binary(ctx: &EmitContext<'_>, operator: &str) -> Result<String, String> {
    Ok(format!(
        "let {} = {} {} {};",
        ctx.output("out"),
        ctx.input("a")?,
        operator,
        ctx.input("b")?
    ))
}

pub fn emit_start_event(ctx: &EmitContext<'_>) -> Result<String, String> {
    Ok(format!(
        "let {} = {} == {};",
        ctx.output("exec"),
        EVENT_VARIABLE,
        string_literal(START_EVENT)
    ))
}

pub fn emit_tick_event(ctx: &EmitContext<'_>) -> Result<String, String> {
    Ok(format!(
        "let {} = {} == {};\nlet {} = {};",
        ctx.output("exec"),
        EVENT_VARIABLE,
        string_literal(TICK_EVENT),
        ctx.output("dt"),
        DELTA_VARIABLE
    ))
}

pub fn emit_constant(ctx: &EmitContext<'_>) -> Result<String, String> {
    let value = ctx
        .property("value")
        .ok_or_else(|| "property 'value' is missing".to_string())?;
    Ok(format!("let {} = {};", ctx.output("out"), literal(value)))
}

pub fn emit_add(ctx: &EmitContext<'_>) -> Result<String, String> {
    binary(ctx, "+")
}

pub fn emit_subtract(ctx: &EmitContext<'_>) -> Result<String, String> {
    binary(ctx, "-")
}

pub fn emit_multiply(ctx: &EmitContext<'_>) -> Result<String, String> {
    binary(ctx, "*")
}

pub fn emit_divide(ctx: &EmitContext<'_>) -> Result<String, String> {
    binary(ctx, "/")
}

pub fn emit_clamp(ctx: &EmitContext<'_>) -> Result<String, String> {
    let min = number_literal(number_property(ctx, "min")?);
    let max = number_literal(number_property(ctx, "max")?);
    Ok(format!(
        "let {} = {{ let v = {}; if v < {min} {{ {min} }} else if v > {max} {{ {max} }} else {{ v }} }};",
        ctx.output("out"),
        ctx.input("value")?
    ))
}

pub fn emit_compare(ctx: &EmitContext<'_>) -> Result<String, String> {
    let op = string_property(ctx, "op")?;
    binary(ctx, &op)
}

pub fn emit_not(ctx: &EmitContext<'_>) -> Result<String, String> {
    Ok(format!("let {} = !({});", ctx.output("out"), ctx.input("value")?))
}

pub fn emit_concat(ctx: &EmitContext<'_>) -> Result<String, String> {
    Ok(format!(
        "let {} = ({}).to_string() + ({}).to_string();",
        ctx.output("out"),
        ctx.input("a")?,
        ctx.input("b")?
    ))
}

pub fn emit_make_vector(ctx: &EmitContext<'_>) -> Result<String, String> {
    Ok(format!(
        "let {} = [{}, {}, {}];",
        ctx.output("out"),
        ctx.input("x")?,
        ctx.input("y")?,
        ctx.input("z")?
    ))
}

pub fn emit_vector_length(ctx: &EmitContext<'_>) -> Result<String, String> {
    Ok(format!(
        "let {} = {{ let v = {}; (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt() }};",
        ctx.output("out"),
        ctx.input("v")?
    ))
}

pub fn emit_get_variable(ctx: &EmitContext<'_>) -> Result<String, String> {
    let name = string_property(ctx, "name")?;
    Ok(format!(
        "let {} = {}[{}];",
        ctx.output("value"),
        VARIABLES_MAP,
        string_literal(&name)
    ))
}

pub fn emit_set_variable(ctx: &EmitContext<'_>) -> Result<String, String> {
    let name = string_property(ctx, "name")?;
    let statement = format!(
        "{}[{}] = {};",
        VARIABLES_MAP,
        string_literal(&name),
        ctx.input("value")?
    );
    guarded(ctx, &statement)
}

pub fn emit_log(ctx: &EmitContext<'_>) -> Result<String, String> {
    let statement = format!("print(({}).to_string());", ctx.input("message")?);
    guarded(ctx, &statement)
}

pub fn emit_branch(ctx: &EmitContext<'_>) -> Result<String, String> {
    let exec = ctx.input("exec")?;
    let condition = ctx.input("condition")?;
    Ok(format!(
        "let {} = {exec} && ({condition});\nlet {} = {exec} && !({condition});",
        ctx.output("true"),
        ctx.output("false")
    ))
}

pub fn emit_scene_attached(ctx: &EmitContext<'_>) -> Result<String, String> {
    Ok(format!(
        "let {} = type_of({}) != \"()\";",
        ctx.output("out"),
        SCENE_VARIABLE
    ))
}
