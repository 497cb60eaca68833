//! Command handlers.
//!
//! One function per command verb, all executed on the engine's main thread
//! with a borrowed [`HandlerCtx`]. Handlers never panic and never write to
//! the wire themselves: they return a JSON payload (flattened into the
//! success envelope by the dispatcher) or a [`CommandError`].

pub mod control;
pub mod input;
pub mod observe;

use serde_json::{Map, Value};
use std::time::Instant;

use crate::config::Session;
use crate::diagnostics::DiagnosticRing;
use crate::engine::{Engine, EngineError, NodeId};
use crate::input::InputDriver;
use crate::protocol::ErrorCode;

/// Everything a handler may touch, borrowed for the duration of one call.
pub struct HandlerCtx<'a> {
    pub engine: &'a mut dyn Engine,
    pub session: &'a Session,
    pub diagnostics: &'a DiagnosticRing,
    pub input: &'a mut InputDriver,
    /// When the bridge was activated.
    pub started: Instant,
    /// Set by the `quit` handler; the bridge asks the host to terminate on
    /// the next tick so the response can be flushed first.
    pub quit_requested: &'a mut bool,
    pub now: Instant,
}

/// A command-level failure, turned into an error envelope by the dispatcher.
#[derive(Debug, Clone)]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
    pub extra: Option<Value>,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            extra: None,
        }
    }

    pub fn bad_args(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadArgs, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl From<EngineError> for CommandError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NodeNotFound
            | EngineError::MethodMissing(_)
            | EngineError::PropertyMissing(_) => Self::not_found(err.to_string()),
            EngineError::Host(_) => Self::internal(err.to_string()),
        }
    }
}

pub type HandlerResult = Result<Value, CommandError>;

/// Route a validated, authorized command to its handler. The dispatcher has
/// already rejected unknown names, so the fallback arm is defensive only.
pub fn run(ctx: &mut HandlerCtx, cmd: &str, args: &Map<String, Value>) -> HandlerResult {
    match cmd {
        // Observe.
        "ping" => observe::handle_ping(),
        "auth_info" => observe::handle_auth_info(ctx),
        "capabilities" => observe::handle_capabilities(ctx),
        "screenshot" => observe::handle_screenshot(ctx),
        "scene_tree" => observe::handle_scene_tree(ctx, args),
        "get_property" => observe::handle_get_property(ctx, args),
        "runtime_info" => observe::handle_runtime_info(ctx),
        "get_errors" => observe::handle_get_errors(ctx, args),
        "find_nodes" => observe::handle_find_nodes(ctx, args),
        "audio_state" => observe::handle_audio_state(ctx),
        "network_state" => observe::handle_network_state(ctx),
        "grb_performance" => observe::handle_performance(ctx),

        // Input.
        "click" => input::handle_click(ctx, args),
        "drag" => input::handle_drag(ctx, args),
        "scroll" => input::handle_scroll(ctx, args),
        "key" => input::handle_key(ctx, args),
        "press_button" => input::handle_press_button(ctx, args),
        "gesture" => input::handle_gesture(ctx, args),
        "gamepad" => input::handle_gamepad(ctx, args),

        // Control.
        "set_property" => control::handle_set_property(ctx, args),
        "call_method" => control::handle_call_method(ctx, args),
        "quit" => control::handle_quit(ctx),
        "run_custom_command" => control::handle_run_custom_command(ctx, args),

        // Danger.
        "eval" => control::handle_eval(ctx, args),

        other => Err(CommandError::internal(format!(
            "no handler for command {other}"
        ))),
    }
}

/// Extract a required string argument.
pub fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, CommandError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CommandError::bad_args(format!("missing required arg {key}")))
}

/// Extract a required numeric argument as f64.
pub fn f64_arg(args: &Map<String, Value>, key: &str) -> Result<f64, CommandError> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| CommandError::bad_args(format!("missing required arg {key}")))
}

/// Extract an optional integer argument with a default.
pub fn opt_i64_arg(args: &Map<String, Value>, key: &str, default: i64) -> i64 {
    args.get(key).and_then(Value::as_i64).unwrap_or(default)
}

/// Extract an optional unsigned argument with a default.
pub fn opt_u64_arg(args: &Map<String, Value>, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// Extract an optional float argument with a default.
pub fn opt_f64_arg(args: &Map<String, Value>, key: &str, default: f64) -> f64 {
    args.get(key).and_then(Value::as_f64).unwrap_or(default)
}

/// Extract a `[x, y]` point argument.
pub fn point_arg(value: Option<&Value>, key: &str) -> Result<(f32, f32), CommandError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| CommandError::bad_args(format!("{key} must be a [x, y] array")))?;
    if items.len() != 2 {
        return Err(CommandError::bad_args(format!(
            "{key} must be a [x, y] array"
        )));
    }
    let x = items[0]
        .as_f64()
        .ok_or_else(|| CommandError::bad_args(format!("{key} must be numeric")))?;
    let y = items[1]
        .as_f64()
        .ok_or_else(|| CommandError::bad_args(format!("{key} must be numeric")))?;
    Ok((x as f32, y as f32))
}

/// Resolve the node named by the `node` argument, or fail with `not_found`.
pub fn resolve_node(
    engine: &dyn Engine,
    args: &Map<String, Value>,
) -> Result<NodeId, CommandError> {
    let path = str_arg(args, "node")?;
    engine
        .resolve(path)
        .filter(|id| engine.is_valid(*id))
        .ok_or_else(|| CommandError::not_found(format!("no node at {path}")))
}
