//! Tier 2 and 3 handlers: state mutation and expression evaluation.

use serde_json::{json, Map, Value};

use crate::engine::Variant;

use super::{resolve_node, str_arg, CommandError, HandlerCtx, HandlerResult};

pub fn handle_set_property(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let node = resolve_node(ctx.engine, args)?;
    let property = str_arg(args, "property")?;
    let value = args
        .get("value")
        .ok_or_else(|| CommandError::bad_args("missing required arg value"))?;
    ctx.engine
        .set_property(node, property, Variant::from_json(value))?;
    Ok(json!({}))
}

pub fn handle_call_method(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let node = resolve_node(ctx.engine, args)?;
    let method = str_arg(args, "method")?;
    let call_args = args
        .get("args")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(Variant::from_json).collect())
        .unwrap_or_default();
    let result = ctx.engine.call_method(node, method, call_args)?;
    Ok(json!({ "result": result.to_json() }))
}

/// Arms deferred termination; the host is asked to quit on the next tick so
/// this response reaches the wire first.
pub fn handle_quit(ctx: &mut HandlerCtx) -> HandlerResult {
    *ctx.quit_requested = true;
    Ok(json!({}))
}

pub fn handle_run_custom_command(
    ctx: &mut HandlerCtx,
    args: &Map<String, Value>,
) -> HandlerResult {
    let name = str_arg(args, "name")?;
    let call_args: Vec<Variant> = args
        .get("args")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(Variant::from_json).collect())
        .unwrap_or_default();
    match ctx.engine.custom_command(name, call_args) {
        None => Err(CommandError::not_found(format!(
            "no custom command named {name}"
        ))),
        Some(Err(err)) => Err(CommandError::internal(err)),
        Some(Ok(result)) => Ok(json!({ "result": result.to_json() })),
    }
}

/// Tier 3. The dispatcher has already checked both the tier and the danger
/// flag; this only evaluates and reports.
pub fn handle_eval(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let expr = str_arg(args, "expr")?;
    match ctx.engine.evaluate(expr) {
        Ok(result) => Ok(json!({ "result": result.to_display_string() })),
        Err(err) => Err(CommandError::internal(err)),
    }
}
