//! Tier 1 handlers: simulated input.
//!
//! These translate wire arguments into [`crate::input::InputDriver`] calls;
//! the driver owns tagging, OS-cursor warping and deferred releases.

use serde_json::{json, Map, Value};

use crate::engine::NodeId;

use super::{f64_arg, opt_f64_arg, opt_u64_arg, point_arg, str_arg, CommandError, HandlerCtx, HandlerResult};

pub fn handle_click(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let x = f64_arg(args, "x")? as f32;
    let y = f64_arg(args, "y")? as f32;
    ctx.input.click(ctx.engine, x, y);
    Ok(json!({}))
}

pub fn handle_drag(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let from = point_arg(args.get("from"), "from")?;
    let to = point_arg(args.get("to"), "to")?;
    ctx.input.drag(ctx.engine, from, to);
    Ok(json!({}))
}

pub fn handle_scroll(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let x = f64_arg(args, "x")? as f32;
    let y = f64_arg(args, "y")? as f32;
    let delta = opt_f64_arg(args, "delta", -3.0);
    ctx.input.scroll(ctx.engine, x, y, delta);
    Ok(json!({}))
}

/// `key(action?, keycode?)`: a non-empty `action` wins; otherwise a
/// non-negative `keycode` is pressed and released.
pub fn handle_key(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let action = args.get("action").and_then(Value::as_str).unwrap_or("");
    if !action.is_empty() {
        ctx.input.action(ctx.engine, action);
        return Ok(json!({}));
    }
    let keycode = args.get("keycode").and_then(Value::as_i64).unwrap_or(-1);
    if keycode >= 0 {
        ctx.input.key(ctx.engine, keycode);
        return Ok(json!({}));
    }
    Err(CommandError::bad_args("key needs action or keycode"))
}

pub fn handle_press_button(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let name = str_arg(args, "name")?;
    let root = ctx
        .engine
        .root()
        .ok_or_else(|| CommandError::not_found("no scene root"))?;
    let node = find_button(ctx, root, name)
        .ok_or_else(|| CommandError::not_found(format!("no button named {name}")))?;
    ctx.engine.emit_pressed(node)?;
    Ok(json!({}))
}

fn find_button(ctx: &HandlerCtx, node: NodeId, name: &str) -> Option<NodeId> {
    if ctx.engine.name(node) == name && ctx.engine.type_name(node).contains("Button") {
        return Some(node);
    }
    ctx.engine
        .children(node)
        .into_iter()
        .find_map(|child| find_button(ctx, child, name))
}

/// `gesture(type, params)`: `pinch` takes `{center, scale}`, `swipe` takes
/// `{center, delta}`.
pub fn handle_gesture(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let kind = str_arg(args, "type")?;
    let params = args
        .get("params")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let (cx, cy) = point_arg(params.get("center"), "center")?;

    match kind {
        "pinch" => {
            let scale = f64_arg(&params, "scale")? as f32;
            ctx.input.pinch(ctx.engine, cx, cy, scale);
        }
        "swipe" => {
            let (dx, dy) = point_arg(params.get("delta"), "delta")?;
            ctx.input.pan(ctx.engine, cx, cy, dx, dy);
        }
        other => {
            return Err(CommandError::bad_args(format!(
                "unknown gesture type {other}"
            )));
        }
    }
    Ok(json!({}))
}

/// `gamepad(action, ...)`: `button` presses with auto-release, `axis` emits
/// axis motion, `vibrate` drives the host vibration API with
/// `weak`/`strong` magnitudes (default 0.5) for `duration_ms` (default 400).
pub fn handle_gamepad(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let action = str_arg(args, "action")?;
    match action {
        "button" => {
            let button = args
                .get("button")
                .and_then(Value::as_i64)
                .ok_or_else(|| CommandError::bad_args("missing required arg button"))?;
            let now = ctx.now;
            ctx.input.gamepad_button(ctx.engine, button, now);
        }
        "axis" => {
            let axis = args
                .get("axis")
                .and_then(Value::as_i64)
                .ok_or_else(|| CommandError::bad_args("missing required arg axis"))?;
            let value = f64_arg(args, "value")? as f32;
            ctx.input.gamepad_axis(ctx.engine, axis, value);
        }
        "vibrate" => {
            let weak = opt_f64_arg(args, "weak", 0.5) as f32;
            let strong = opt_f64_arg(args, "strong", 0.5) as f32;
            let duration_ms = opt_u64_arg(args, "duration_ms", 400);
            ctx.engine.start_vibration(weak, strong, duration_ms);
        }
        other => {
            return Err(CommandError::bad_args(format!(
                "unknown gamepad action {other}"
            )));
        }
    }
    Ok(json!({}))
}
