//! Pending-wait scheduler.
//!
//! `wait_for` is the one command whose response is produced across frames.
//! Outstanding waits are plain data polled by the main-thread tick: no
//! coroutine, no callback, cancellable by removal. Each poll either keeps
//! the wait, resolves it as matched, times it out, or fails it because the
//! watched node was freed.
//!
//! Equality is tested on string forms: the watched property's
//! [`Variant::to_display_string`] against the expected JSON value rendered
//! the same way. Engine compound values lack a stable JSON equivalence, so
//! the display string is the deliberate contract; clients matching vectors
//! or colors must supply the host's rendering of them.

use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::engine::{Engine, NodeId, Variant};
use crate::protocol::{self, ErrorCode};

/// Default `timeout_ms` when the request omits one.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// One outstanding `wait_for` request.
#[derive(Debug)]
pub struct PendingWait {
    id: String,
    node: NodeId,
    property: String,
    expected: String,
    timeout: Duration,
    started: Instant,
}

/// Unordered collection of pending waits, polled once per frame.
#[derive(Default)]
pub struct WaitScheduler {
    waits: Vec<PendingWait>,
}

impl WaitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.waits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waits.is_empty()
    }

    /// Register a wait. The expected value arrives as JSON and is rendered
    /// once into the comparison form.
    pub fn schedule(
        &mut self,
        id: &str,
        node: NodeId,
        property: &str,
        expected: &Value,
        timeout_ms: u64,
    ) {
        self.waits.push(PendingWait {
            id: id.to_string(),
            node,
            property: property.to_string(),
            expected: Variant::from_json(expected).to_display_string(),
            timeout: Duration::from_millis(timeout_ms),
            started: Instant::now(),
        });
    }

    /// Poll every wait against the live scene graph. Returns the responses
    /// to enqueue, in no particular order relative to other commands.
    pub fn tick(&mut self, engine: &dyn Engine, now: Instant) -> Vec<Value> {
        let mut responses = Vec::new();

        self.waits.retain(|wait| {
            if !engine.is_valid(wait.node) {
                responses.push(protocol::error(
                    &wait.id,
                    ErrorCode::NotFound,
                    "node was freed while waiting",
                    None,
                ));
                return false;
            }

            let elapsed_ms = now.saturating_duration_since(wait.started).as_millis() as u64;
            let value = engine.get_property(wait.node, &wait.property);

            let matched = value
                .as_ref()
                .map(|v| v.to_display_string() == wait.expected)
                .unwrap_or(false);
            if matched {
                responses.push(protocol::ok(
                    &wait.id,
                    json!({ "matched": true, "elapsed_ms": elapsed_ms }),
                ));
                return false;
            }

            if now.saturating_duration_since(wait.started) >= wait.timeout {
                let last_value = value.map(|v| v.to_json()).unwrap_or(Value::Null);
                responses.push(protocol::ok(
                    &wait.id,
                    json!({
                        "matched": false,
                        "elapsed_ms": elapsed_ms,
                        "last_value": last_value,
                    }),
                ));
                return false;
            }

            true
        });

        responses
    }
}
