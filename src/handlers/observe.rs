//! Tier 0 handlers: read-only observation.

use base64::Engine as _;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;

use crate::engine::NodeId;
use crate::protocol::PROTO_VERSION;
use crate::registry;

use super::{opt_i64_arg, opt_u64_arg, resolve_node, str_arg, CommandError, HandlerCtx, HandlerResult};

/// Default recursion depth for `scene_tree`.
const DEFAULT_TREE_DEPTH: i64 = 10;

/// Default result cap for `find_nodes`.
const DEFAULT_FIND_LIMIT: usize = 50;

pub fn handle_ping() -> HandlerResult {
    Ok(json!({ "pong": true }))
}

pub fn handle_auth_info(ctx: &mut HandlerCtx) -> HandlerResult {
    Ok(json!({
        "proto": PROTO_VERSION,
        "tier": ctx.session.tier.level(),
        "danger_enabled": ctx.session.danger_enabled,
    }))
}

pub fn handle_capabilities(ctx: &mut HandlerCtx) -> HandlerResult {
    Ok(json!({
        "tier": ctx.session.tier.level(),
        "commands": registry::commands_for_tier(ctx.session.tier),
    }))
}

pub fn handle_screenshot(ctx: &mut HandlerCtx) -> HandlerResult {
    let shot = ctx
        .engine
        .capture_frame()
        .map_err(|err| CommandError::internal(format!("capture failed: {err}")))?;
    Ok(json!({
        "width": shot.width,
        "height": shot.height,
        "png_base64": base64::engine::general_purpose::STANDARD.encode(&shot.png),
    }))
}

pub fn handle_scene_tree(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let max_depth = opt_i64_arg(args, "max_depth", DEFAULT_TREE_DEPTH).max(1);
    let root = ctx
        .engine
        .root()
        .ok_or_else(|| CommandError::not_found("no scene root"))?;
    Ok(walk_tree(ctx, root, 1, max_depth))
}

fn walk_tree(ctx: &HandlerCtx, node: NodeId, depth: i64, max_depth: i64) -> Value {
    let children: Vec<Value> = if depth < max_depth {
        ctx.engine
            .children(node)
            .into_iter()
            .map(|child| walk_tree(ctx, child, depth + 1, max_depth))
            .collect()
    } else {
        Vec::new()
    };
    json!({
        "name": ctx.engine.name(node),
        "type": ctx.engine.type_name(node),
        "children": children,
    })
}

pub fn handle_get_property(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let node = resolve_node(ctx.engine, args)?;
    let property = str_arg(args, "property")?;
    let value = ctx
        .engine
        .get_property(node, property)
        .ok_or_else(|| CommandError::not_found(format!("no property named {property}")))?;
    Ok(json!({ "value": value.to_json() }))
}

pub fn handle_runtime_info(ctx: &mut HandlerCtx) -> HandlerResult {
    let (error_count, warning_count) = ctx.diagnostics.totals();
    let scene = ctx.engine.current_scene();
    let uptime_ms = ctx.now.saturating_duration_since(ctx.started).as_millis() as u64;
    Ok(json!({
        "engine_version": ctx.engine.version(),
        "fps": ctx.engine.fps(),
        "process_frames": ctx.engine.process_frames(),
        "time_scale": ctx.engine.time_scale(),
        "current_scene": scene.as_ref().map(|(path, _)| path.clone()),
        "current_scene_name": scene.as_ref().map(|(_, name)| name.clone()),
        "node_count": ctx.engine.node_count(),
        "input_mode": ctx.session.input_mode.as_str(),
        "error_count": error_count,
        "warning_count": warning_count,
        "uptime_ms": uptime_ms,
    }))
}

pub fn handle_get_errors(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let since = opt_u64_arg(args, "since_index", 0);
    let (entries, next_index) = ctx.diagnostics.since(since);
    let (error_count, warning_count) = ctx.diagnostics.totals();
    let errors: Vec<Value> = entries
        .iter()
        .map(|entry| serde_json::to_value(entry).unwrap_or(Value::Null))
        .collect();
    Ok(json!({
        "errors": errors,
        "next_index": next_index,
        "error_count": error_count,
        "warning_count": warning_count,
    }))
}

pub fn handle_find_nodes(ctx: &mut HandlerCtx, args: &Map<String, Value>) -> HandlerResult {
    let name = args.get("name").and_then(Value::as_str);
    let type_name = args.get("type").and_then(Value::as_str);
    let group = args.get("group").and_then(Value::as_str);
    if name.is_none() && type_name.is_none() && group.is_none() {
        return Err(CommandError::bad_args(
            "at least one of name, type, group is required",
        ));
    }
    let limit = opt_i64_arg(args, "limit", DEFAULT_FIND_LIMIT as i64).max(0) as usize;
    let name_needle = name.map(str::to_lowercase);

    let mut matches = Vec::new();
    let mut queue = VecDeque::new();
    if let Some(root) = ctx.engine.root() {
        queue.push_back(root);
    }
    while let Some(node) = queue.pop_front() {
        if matches.len() >= limit {
            break;
        }
        let node_groups = ctx.engine.groups(node);
        let name_ok = match name_needle.as_deref() {
            None => true,
            Some("*") => true,
            Some(needle) => ctx.engine.name(node).to_lowercase().contains(needle),
        };
        let type_ok = type_name.map_or(true, |t| ctx.engine.type_name(node) == t);
        let group_ok = group.map_or(true, |g| node_groups.iter().any(|ng| ng == g));
        if name_ok && type_ok && group_ok {
            matches.push(json!({
                "name": ctx.engine.name(node),
                "type": ctx.engine.type_name(node),
                "path": ctx.engine.path_of(node),
                "groups": node_groups,
            }));
        }
        queue.extend(ctx.engine.children(node));
    }

    Ok(json!({ "count": matches.len(), "matches": matches }))
}

fn pairs_to_object(pairs: Vec<(String, crate::engine::Variant)>) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key, value.to_json());
    }
    Value::Object(map)
}

pub fn handle_audio_state(ctx: &mut HandlerCtx) -> HandlerResult {
    Ok(pairs_to_object(ctx.engine.audio_state()))
}

pub fn handle_network_state(ctx: &mut HandlerCtx) -> HandlerResult {
    Ok(pairs_to_object(ctx.engine.network_state()))
}

pub fn handle_performance(ctx: &mut HandlerCtx) -> HandlerResult {
    Ok(pairs_to_object(ctx.engine.performance()))
}
