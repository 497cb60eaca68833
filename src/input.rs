//! Synthetic input injection.
//!
//! All injected input flows through [`InputDriver`], which tags every event
//! as synthetic and, in OS mode, additionally warps the OS cursor to the
//! event position. Mouse presses are released on the next frame: the driver
//! carries at most one deferred release slot, consumed at the top of the
//! following tick before any new request is dispatched. Gamepad button
//! presses auto-release the same way but on a timer (~100 ms), modeled as a
//! due-list the tick drains.

use std::time::{Duration, Instant};

use crate::config::InputMode;
use crate::engine::{Engine, InputEvent, MouseButton, TaggedEvent};

/// Delay before an injected gamepad button press is released.
pub const GAMEPAD_RELEASE_MS: u64 = 100;

#[derive(Debug, Clone, Copy)]
struct DeferredRelease {
    x: f32,
    y: f32,
    button: MouseButton,
}

/// Main-thread-only driver for injected input. No synchronization: the I/O
/// worker never touches it.
pub struct InputDriver {
    mode: InputMode,
    pending_release: Option<DeferredRelease>,
    timed_releases: Vec<(Instant, InputEvent)>,
}

impl InputDriver {
    pub fn new(mode: InputMode) -> Self {
        Self {
            mode,
            pending_release: None,
            timed_releases: Vec::new(),
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Inject one tagged event, warping the OS cursor first when the mode
    /// calls for it and the event carries a position.
    fn send(&mut self, engine: &mut dyn Engine, event: InputEvent) {
        if self.mode == InputMode::Os {
            if let Some((x, y)) = event_position(&event) {
                engine.warp_cursor(x, y);
            }
        }
        engine.push_input(TaggedEvent::synthetic(event));
    }

    /// Move to `(x, y)` and press the left button; the release lands on the
    /// next frame via the deferred slot.
    pub fn click(&mut self, engine: &mut dyn Engine, x: f32, y: f32) {
        self.send(
            engine,
            InputEvent::MouseMotion {
                x,
                y,
                relative: (0.0, 0.0),
            },
        );
        self.send(
            engine,
            InputEvent::MouseButton {
                x,
                y,
                button: MouseButton::Left,
                pressed: true,
                factor: 1.0,
            },
        );
        self.pending_release = Some(DeferredRelease {
            x,
            y,
            button: MouseButton::Left,
        });
    }

    /// Press at `from`, move to `to`, defer the release at `to`.
    pub fn drag(&mut self, engine: &mut dyn Engine, from: (f32, f32), to: (f32, f32)) {
        self.send(
            engine,
            InputEvent::MouseMotion {
                x: from.0,
                y: from.1,
                relative: (0.0, 0.0),
            },
        );
        self.send(
            engine,
            InputEvent::MouseButton {
                x: from.0,
                y: from.1,
                button: MouseButton::Left,
                pressed: true,
                factor: 1.0,
            },
        );
        self.send(
            engine,
            InputEvent::MouseMotion {
                x: to.0,
                y: to.1,
                relative: (to.0 - from.0, to.1 - from.1),
            },
        );
        self.pending_release = Some(DeferredRelease {
            x: to.0,
            y: to.1,
            button: MouseButton::Left,
        });
    }

    /// Wheel press and release at `(x, y)`. The sign of `delta` picks the
    /// direction, its magnitude becomes the scroll factor.
    pub fn scroll(&mut self, engine: &mut dyn Engine, x: f32, y: f32, delta: f64) {
        let button = if delta < 0.0 {
            MouseButton::WheelDown
        } else {
            MouseButton::WheelUp
        };
        let factor = delta.abs() as f32;
        for pressed in [true, false] {
            self.send(
                engine,
                InputEvent::MouseButton {
                    x,
                    y,
                    button,
                    pressed,
                    factor,
                },
            );
        }
    }

    /// Press and release a named input action.
    pub fn action(&mut self, engine: &mut dyn Engine, name: &str) {
        for pressed in [true, false] {
            self.send(
                engine,
                InputEvent::Action {
                    name: name.to_string(),
                    pressed,
                },
            );
        }
    }

    /// Press and release a physical keycode.
    pub fn key(&mut self, engine: &mut dyn Engine, keycode: i64) {
        for pressed in [true, false] {
            self.send(engine, InputEvent::Key { keycode, pressed });
        }
    }

    pub fn pinch(&mut self, engine: &mut dyn Engine, x: f32, y: f32, factor: f32) {
        self.send(engine, InputEvent::Pinch { x, y, factor });
    }

    pub fn pan(&mut self, engine: &mut dyn Engine, x: f32, y: f32, dx: f32, dy: f32) {
        self.send(engine, InputEvent::Pan { x, y, dx, dy });
    }

    /// Press a gamepad button now and schedule its release.
    pub fn gamepad_button(&mut self, engine: &mut dyn Engine, button: i64, now: Instant) {
        self.send(
            engine,
            InputEvent::JoyButton {
                button,
                pressed: true,
            },
        );
        self.timed_releases.push((
            now + Duration::from_millis(GAMEPAD_RELEASE_MS),
            InputEvent::JoyButton {
                button,
                pressed: false,
            },
        ));
    }

    pub fn gamepad_axis(&mut self, engine: &mut dyn Engine, axis: i64, value: f32) {
        self.send(engine, InputEvent::JoyAxis { axis, value });
    }

    /// Inject the deferred mouse release (if armed) and any due gamepad
    /// releases. Called at the top of every frame tick, before dispatch.
    pub fn flush_deferred(&mut self, engine: &mut dyn Engine, now: Instant) {
        if let Some(release) = self.pending_release.take() {
            self.send(
                engine,
                InputEvent::MouseButton {
                    x: release.x,
                    y: release.y,
                    button: release.button,
                    pressed: false,
                    factor: 1.0,
                },
            );
        }

        let mut due = Vec::new();
        self.timed_releases.retain(|(deadline, event)| {
            if *deadline <= now {
                due.push(event.clone());
                false
            } else {
                true
            }
        });
        for event in due {
            self.send(engine, event);
        }
    }

    pub fn has_pending_release(&self) -> bool {
        self.pending_release.is_some()
    }
}

fn event_position(event: &InputEvent) -> Option<(f32, f32)> {
    match event {
        InputEvent::MouseMotion { x, y, .. }
        | InputEvent::MouseButton { x, y, .. }
        | InputEvent::Pinch { x, y, .. }
        | InputEvent::Pan { x, y, .. } => Some((*x, *y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimEngine;

    #[test]
    fn test_click_defers_release_to_next_flush() {
        let mut sim = SimEngine::new();
        let mut driver = InputDriver::new(InputMode::Synthetic);

        driver.click(&mut sim, 10.0, 20.0);
        let events = sim.taken_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].event, InputEvent::MouseMotion { .. }));
        assert!(matches!(
            events[1].event,
            InputEvent::MouseButton { pressed: true, .. }
        ));
        assert!(driver.has_pending_release());

        driver.flush_deferred(&mut sim, Instant::now());
        let events = sim.taken_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].event,
            InputEvent::MouseButton {
                pressed: false,
                x,
                y,
                ..
            } if x == 10.0 && y == 20.0
        ));
        assert!(!driver.has_pending_release());
    }

    #[test]
    fn test_drag_reports_relative_motion() {
        let mut sim = SimEngine::new();
        let mut driver = InputDriver::new(InputMode::Synthetic);

        driver.drag(&mut sim, (0.0, 0.0), (30.0, 40.0));
        let events = sim.taken_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[2].event,
            InputEvent::MouseMotion { relative, .. } if relative == (30.0, 40.0)
        ));
        assert!(driver.has_pending_release());
    }

    #[test]
    fn test_scroll_direction_and_magnitude() {
        let mut sim = SimEngine::new();
        let mut driver = InputDriver::new(InputMode::Synthetic);

        driver.scroll(&mut sim, 5.0, 5.0, -3.0);
        let events = sim.taken_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].event,
            InputEvent::MouseButton {
                button: MouseButton::WheelDown,
                pressed: true,
                factor,
                ..
            } if factor == 3.0
        ));
        assert!(matches!(
            events[1].event,
            InputEvent::MouseButton { pressed: false, .. }
        ));
    }

    #[test]
    fn test_gamepad_button_releases_after_delay() {
        let mut sim = SimEngine::new();
        let mut driver = InputDriver::new(InputMode::Synthetic);
        let start = Instant::now();

        driver.gamepad_button(&mut sim, 0, start);
        assert_eq!(sim.taken_events().len(), 1);

        // Not yet due.
        driver.flush_deferred(&mut sim, start + Duration::from_millis(10));
        assert!(sim.taken_events().is_empty());

        driver.flush_deferred(&mut sim, start + Duration::from_millis(150));
        let events = sim.taken_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].event,
            InputEvent::JoyButton {
                pressed: false,
                ..
            }
        ));
    }

    #[test]
    fn test_os_mode_warps_cursor() {
        let mut sim = SimEngine::new();
        let mut driver = InputDriver::new(InputMode::Os);

        driver.click(&mut sim, 64.0, 32.0);
        assert_eq!(sim.cursor(), Some((64.0, 32.0)));

        // Key events carry no position, so no warp.
        let mut sim2 = SimEngine::new();
        let mut driver2 = InputDriver::new(InputMode::Os);
        driver2.key(&mut sim2, 65);
        assert_eq!(sim2.cursor(), None);
    }

    #[test]
    fn test_every_event_is_tagged_synthetic() {
        let mut sim = SimEngine::new();
        let mut driver = InputDriver::new(InputMode::Synthetic);

        driver.click(&mut sim, 1.0, 1.0);
        driver.action(&mut sim, "jump");
        driver.pinch(&mut sim, 2.0, 2.0, 1.5);
        assert!(sim.taken_events().iter().all(|e| e.synthetic));
    }
}
