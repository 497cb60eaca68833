//! Activation gate and bridge lifecycle.
//!
//! [`Bridge::activate`] is the host's single entry point. It evaluates the
//! two-factor gate (build-feature tag, then environment), and only when both
//! pass does anything happen: the session is fixed, the diagnostic ring is
//! created, the I/O worker starts and the readiness banner is printed. A
//! shipped build fails the first gate and returns `None` with zero
//! footprint: no thread, no port, no banner.
//!
//! After activation the host calls [`Bridge::tick`] once per frame on its
//! main/render thread. The tick applies deferred input releases, polls
//! pending waits, drains the inbound queue through the dispatcher and arms
//! deferred termination. Dropping the bridge (or calling
//! [`Bridge::shutdown`]) stops the worker and joins it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{BridgeConfig, InputMode, Session};
use crate::diagnostics::DiagnosticRing;
use crate::dispatch;
use crate::engine::Engine;
use crate::handlers::HandlerCtx;
use crate::input::InputDriver;
use crate::io_loop::{self, IoConfig, IoShared};
use crate::protocol;
use crate::waits::WaitScheduler;

/// Build-feature tags; the host must expose at least one for the bridge to
/// start. Retail builds carry none of these.
pub const BUILD_FEATURE_TAGS: &[&str] = &["grb", "debug", "editor"];

pub(crate) fn passes_feature_gate(engine: &dyn Engine) -> bool {
    BUILD_FEATURE_TAGS.iter().any(|tag| engine.has_feature(tag))
}

/// The in-process debug bridge. Owned and ticked by the host's main thread.
pub struct Bridge<E: Engine> {
    engine: E,
    session: Session,
    diagnostics: Arc<DiagnosticRing>,
    shared: Arc<IoShared>,
    worker: Option<JoinHandle<()>>,
    input: InputDriver,
    waits: WaitScheduler,
    started: Instant,
    quit_requested: bool,
    quit_armed: bool,
}

impl<E: Engine> Bridge<E> {
    /// Evaluate both activation gates and start the bridge if they pass.
    /// Returns `None` silently otherwise; failing to start is not an error.
    pub fn activate(engine: E) -> Option<Bridge<E>> {
        if !passes_feature_gate(&engine) {
            return None;
        }
        let config = match BridgeConfig::from_env() {
            Some(config) => config,
            None => {
                debug!("bridge environment gate not satisfied, staying dormant");
                return None;
            }
        };
        Some(Self::start(engine, config))
    }

    /// Start with an explicit configuration, skipping the gates. Hosts that
    /// manage their own activation policy (and tests) use this directly.
    pub fn start(mut engine: E, config: BridgeConfig) -> Bridge<E> {
        // Automation wants full frame rate even when the window is idle.
        engine.set_low_processor_mode(false);
        if config.force_windowed {
            engine.force_windowed();
        }
        if config.input_mode == InputMode::Synthetic {
            engine.set_input_isolation(true);
        }

        let session = Session::from_config(&config);
        let shared = Arc::new(IoShared::new());
        let worker = io_loop::spawn(
            Arc::clone(&shared),
            IoConfig {
                port: config.port,
                token: config.token.clone(),
                tier: config.tier,
                input_mode: config.input_mode,
            },
        );

        info!(
            "debug bridge active (tier {}, input mode {})",
            session.tier.level(),
            session.input_mode.as_str()
        );

        Bridge {
            engine,
            session,
            diagnostics: Arc::new(DiagnosticRing::new()),
            shared,
            worker: Some(worker),
            input: InputDriver::new(config.input_mode),
            waits: WaitScheduler::new(),
            started: Instant::now(),
            quit_requested: false,
            quit_armed: false,
        }
    }

    /// One frame of bridge work, on the main thread.
    pub fn tick(&mut self) {
        let now = Instant::now();

        // A quit armed last frame fires now, after its response had a full
        // frame to reach the wire.
        if self.quit_armed {
            self.quit_armed = false;
            self.engine.request_quit();
        }

        self.input.flush_deferred(&mut self.engine, now);

        for response in self.waits.tick(&self.engine, now) {
            self.shared.outbound.push(protocol::encode_line(&response));
        }

        for parsed in self.shared.inbound.drain() {
            let mut ctx = HandlerCtx {
                engine: &mut self.engine,
                session: &self.session,
                diagnostics: self.diagnostics.as_ref(),
                input: &mut self.input,
                started: self.started,
                quit_requested: &mut self.quit_requested,
                now,
            };
            if let Some(response) = dispatch::dispatch(parsed, &mut ctx, &mut self.waits) {
                self.shared.outbound.push(protocol::encode_line(&response));
            }
        }

        if self.quit_requested {
            self.quit_requested = false;
            self.quit_armed = true;
        }
    }

    /// The resolved listen port, once the worker has bound.
    pub fn port(&self) -> Option<u16> {
        *self.shared.port.lock()
    }

    /// Poll for the resolved port, for callers that start the bridge and
    /// immediately need the address.
    pub fn wait_for_port(&self, timeout: Duration) -> Option<u16> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(port) = self.port() {
                return Some(port);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// The diagnostic ring, for wiring the host logger and the
    /// [`crate::diagnostics::DiagnosticLayer`] into it.
    pub fn diagnostics(&self) -> Arc<DiagnosticRing> {
        Arc::clone(&self.diagnostics)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Stop the I/O worker and join it. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.engine.set_input_isolation(false);
    }
}

impl<E: Engine> Drop for Bridge<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Tier;
    use crate::testing::SimEngine;
    use serde_json::json;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            token: "tok".into(),
            port: 0,
            tier: Tier::Control,
            danger_enabled: false,
            input_mode: InputMode::Synthetic,
            force_windowed: false,
        }
    }

    #[test]
    fn test_feature_gate() {
        let retail = SimEngine::new();
        assert!(!passes_feature_gate(&retail));

        let dev = SimEngine::new();
        dev.add_feature("debug");
        assert!(passes_feature_gate(&dev));

        let tagged = SimEngine::new();
        tagged.add_feature("grb");
        assert!(passes_feature_gate(&tagged));
    }

    #[test]
    fn test_start_configures_host() {
        let sim = SimEngine::new();
        let handle = sim.clone();
        let _bridge = Bridge::start(sim, test_config());
        assert_eq!(handle.low_processor_mode(), Some(false));
        assert!(handle.input_isolation());
    }

    #[test]
    fn test_start_binds_and_answers_ping() {
        use std::io::{Read, Write};
        use std::net::TcpStream;

        let sim = SimEngine::new();
        sim.add_root("Root", "Node");
        let mut bridge = Bridge::start(sim, test_config());
        let port = bridge.wait_for_port(Duration::from_secs(2)).unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .write_all(b"{\"id\":\"a\",\"cmd\":\"ping\"}\n")
            .unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();

        // Pump frames until the response line lands.
        let mut collected = Vec::new();
        let mut chunk = [0u8; 256];
        let deadline = Instant::now() + Duration::from_secs(5);
        while !collected.contains(&b'\n') {
            assert!(Instant::now() < deadline, "no response before deadline");
            bridge.tick();
            if let Ok(n) = stream.read(&mut chunk) {
                collected.extend_from_slice(&chunk[..n]);
            }
        }
        let text = String::from_utf8(collected).unwrap();
        let response: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(response, json!({"id": "a", "ok": true, "pong": true}));

        bridge.shutdown();
    }

    #[test]
    fn test_quit_is_deferred_one_tick() {
        let sim = SimEngine::new();
        sim.add_root("Root", "Node");
        let handle = sim.clone();
        let mut bridge = Bridge::start(sim, test_config());

        bridge
            .shared
            .inbound
            .push(crate::protocol::parse_line(r#"{"id":"q","cmd":"quit","token":"tok"}"#));
        bridge.tick();
        assert_eq!(handle.quit_requests(), 0);
        bridge.tick();
        assert_eq!(handle.quit_requests(), 1);

        bridge.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent_and_joins() {
        let sim = SimEngine::new();
        let mut bridge = Bridge::start(sim, test_config());
        bridge.wait_for_port(Duration::from_secs(2)).unwrap();
        bridge.shutdown();
        bridge.shutdown();
        assert!(bridge.worker.is_none());
    }
}
