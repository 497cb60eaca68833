//! Per-frame request dispatcher.
//!
//! Runs on the engine's main thread. For each parsed envelope drained from
//! the inbound queue it applies, in order: the parse verdict, the command
//! table, the token check (timing-safe), the tier gate, the danger gate,
//! then either delegates `wait_for` to the scheduler or invokes the
//! handler. Synchronous responses keep the arrival order; only `wait_for`
//! responses may arrive later, so `id` is the client's sole correlation key.

use serde_json::{json, Value};

use crate::handlers::{self, HandlerCtx};
use crate::protocol::{self, ErrorCode, ParsedLine, Request};
use crate::registry;
use crate::waits::{WaitScheduler, DEFAULT_TIMEOUT_MS};

/// Constant-time string equality, so token probes learn nothing from
/// response latency.
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut out = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        out |= x ^ y;
    }
    out == 0
}

/// Process one parsed line. Returns the response to enqueue now, or `None`
/// when the request became a pending wait.
pub fn dispatch(
    parsed: ParsedLine,
    ctx: &mut HandlerCtx,
    waits: &mut WaitScheduler,
) -> Option<Value> {
    let request = match parsed {
        Ok(request) => request,
        Err(failure) => {
            return Some(protocol::error(
                &failure.id,
                failure.code,
                &failure.message,
                None,
            ));
        }
    };

    let spec = match registry::find(&request.cmd) {
        Some(spec) => spec,
        None => {
            return Some(protocol::error(
                &request.id,
                ErrorCode::UnknownCmd,
                &format!("unknown command {}", request.cmd),
                None,
            ));
        }
    };

    if !spec.token_exempt && !timing_safe_eq(&request.token, &ctx.session.token) {
        return Some(protocol::error(
            &request.id,
            ErrorCode::BadToken,
            "missing or invalid token",
            None,
        ));
    }

    if spec.tier > ctx.session.tier {
        return Some(protocol::error(
            &request.id,
            ErrorCode::TierDenied,
            &format!("command requires tier {}", spec.tier.level()),
            Some(json!({ "tier_required": spec.tier.level() })),
        ));
    }

    if request.cmd == "eval" && !ctx.session.danger_enabled {
        return Some(protocol::error(
            &request.id,
            ErrorCode::DangerDisabled,
            "eval requires GDRB_ENABLE_DANGER=1",
            None,
        ));
    }

    if spec.deferred {
        return schedule_wait(&request, ctx, waits);
    }

    match handlers::run(ctx, &request.cmd, &request.args) {
        Ok(data) => Some(protocol::ok(&request.id, data)),
        Err(err) => Some(protocol::error(
            &request.id,
            err.code,
            &err.message,
            err.extra,
        )),
    }
}

/// Validate `wait_for` arguments and register the wait. Argument errors and
/// unresolvable nodes answer immediately instead of enqueueing.
fn schedule_wait(
    request: &Request,
    ctx: &mut HandlerCtx,
    waits: &mut WaitScheduler,
) -> Option<Value> {
    let node = match handlers::resolve_node(ctx.engine, &request.args) {
        Ok(node) => node,
        Err(err) => {
            return Some(protocol::error(
                &request.id,
                err.code,
                &err.message,
                err.extra,
            ));
        }
    };
    let property = match handlers::str_arg(&request.args, "property") {
        Ok(property) => property,
        Err(err) => {
            return Some(protocol::error(
                &request.id,
                err.code,
                &err.message,
                err.extra,
            ));
        }
    };
    let expected = match request.args.get("value") {
        Some(value) => value,
        None => {
            return Some(protocol::error(
                &request.id,
                ErrorCode::BadArgs,
                "missing required arg value",
                None,
            ));
        }
    };
    let timeout_ms = handlers::opt_u64_arg(&request.args, "timeout_ms", DEFAULT_TIMEOUT_MS);

    waits.schedule(&request.id, node, property, expected, timeout_ms);
    None
}
