//! gdrb: an in-process debug bridge for a running game.
//!
//! The bridge embeds a loopback TCP server inside a game process and exposes
//! the running game to external automation clients (AI assistants, test
//! runners, QA harnesses) over a newline-delimited JSON protocol (`grb/1`).
//! Clients observe (screenshots, scene tree, properties, telemetry), inject
//! input (mouse, keyboard, gesture, gamepad), mutate state (property writes,
//! method calls) and evaluate expressions. Every command is gated by a
//! capability tier and a shared secret token.
//!
//! The host engine is abstracted behind [`engine::Engine`]. The host's
//! main/render thread calls [`bridge::Bridge::activate`] once at startup and
//! [`bridge::Bridge::tick`] once per frame; socket I/O runs on a single
//! background worker and the two sides meet only at a pair of mutex-guarded
//! queues.
//!
//! Activation is double-gated: the host build must expose one of the
//! `grb`/`debug`/`editor` feature tags, and the environment must carry
//! either `GDRB_TOKEN` or `GODOT_DEBUG_SERVER=1`. Shipped builds pass
//! neither gate and the bridge has zero footprint.

pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod handlers;
pub mod input;
pub mod io_loop;
pub mod protocol;
pub mod queues;
pub mod registry;
pub mod testing;
pub mod waits;

pub use bridge::Bridge;
pub use config::{BridgeConfig, InputMode};
pub use engine::Engine;
pub use registry::Tier;
