//! Host engine capability surface.
//!
//! The bridge never talks to the game engine directly; everything it needs
//! (scene graph, properties, input pipeline, capture, telemetry) goes through
//! the [`Engine`] trait. The trait is object-safe and main-thread-only: the
//! I/O worker holds no engine references, so implementations do not need to
//! be `Send` or `Sync`.
//!
//! Engine-native values cross the seam as [`Variant`]. Primitives map to the
//! matching JSON value; lists and maps map element-wise; everything else
//! (vectors, colors, object handles) degrades to its display string via
//! [`Variant::Opaque`]. The same mapping is used everywhere a value leaves
//! the engine, including the `wait_for` equality check.

use serde_json::{Map, Value};
use thiserror::Error;

/// Opaque handle to a scene-graph node.
///
/// Handles may dangle once the node is freed; callers must check
/// [`Engine::is_valid`] before dereferencing a handle held across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// An engine value crossing the bridge seam.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Variant>),
    /// Key/value pairs in insertion order. Keys are already strings; hosts
    /// coerce non-string dictionary keys before handing the value over.
    Map(Vec<(String, Variant)>),
    /// Catch-all for engine-native compound types, carrying only the host's
    /// display form (for example `Vector2(480, 270)`).
    Opaque(String),
}

impl Variant {
    /// Marshal into JSON. Primitives pass through, containers map
    /// element-wise, opaque values become their display string.
    pub fn to_json(&self) -> Value {
        match self {
            Variant::Nil => Value::Null,
            Variant::Bool(b) => Value::Bool(*b),
            Variant::Int(i) => Value::from(*i),
            Variant::Float(f) => Value::from(*f),
            Variant::Str(s) => Value::String(s.clone()),
            Variant::List(items) => Value::Array(items.iter().map(Variant::to_json).collect()),
            Variant::Map(pairs) => {
                let mut map = Map::new();
                for (key, value) in pairs {
                    map.insert(key.clone(), value.to_json());
                }
                Value::Object(map)
            }
            Variant::Opaque(display) => Value::String(display.clone()),
        }
    }

    /// Convert a JSON value into a `Variant` (for `set_property`, call
    /// arguments and `wait_for` expectations).
    pub fn from_json(value: &Value) -> Variant {
        match value {
            Value::Null => Variant::Nil,
            Value::Bool(b) => Variant::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Variant::Int(i)
                } else {
                    Variant::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => Variant::Str(s.clone()),
            Value::Array(items) => Variant::List(items.iter().map(Variant::from_json).collect()),
            Value::Object(map) => Variant::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Variant::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// The canonical string form used by the `wait_for` equality contract.
    ///
    /// Strings and opaque values compare raw; every other variant compares
    /// via its JSON rendering. Clients matching engine compound values must
    /// supply the host's display string.
    pub fn to_display_string(&self) -> String {
        match self {
            Variant::Str(s) => s.clone(),
            Variant::Opaque(display) => display.clone(),
            other => other.to_json().to_string(),
        }
    }
}

/// A captured viewport frame, already PNG-encoded by the host.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Mouse buttons the bridge can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    WheelUp,
    WheelDown,
}

/// An input event to inject into the host's per-viewport input queue.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MouseMotion {
        x: f32,
        y: f32,
        relative: (f32, f32),
    },
    MouseButton {
        x: f32,
        y: f32,
        button: MouseButton,
        pressed: bool,
        /// Scroll magnitude for wheel buttons; 1.0 otherwise.
        factor: f32,
    },
    Key {
        keycode: i64,
        pressed: bool,
    },
    Action {
        name: String,
        pressed: bool,
    },
    Pinch {
        x: f32,
        y: f32,
        factor: f32,
    },
    Pan {
        x: f32,
        y: f32,
        dx: f32,
        dy: f32,
    },
    JoyButton {
        button: i64,
        pressed: bool,
    },
    JoyAxis {
        axis: i64,
        value: f32,
    },
}

/// An input event plus the marker that distinguishes bridge-injected input
/// from real devices. While synthetic isolation is active the host viewport
/// drops untagged events so user keyboard/mouse activity cannot leak into an
/// automated run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub event: InputEvent,
    pub synthetic: bool,
}

impl TaggedEvent {
    pub fn synthetic(event: InputEvent) -> Self {
        Self {
            event,
            synthetic: true,
        }
    }
}

/// Faults surfaced by the host engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("node not found")]
    NodeNotFound,
    #[error("no method named {0}")]
    MethodMissing(String),
    #[error("no property named {0}")]
    PropertyMissing(String),
    #[error("{0}")]
    Host(String),
}

/// Capability interface the host engine provides to the bridge.
///
/// Every method is called from the host's main/render thread only.
pub trait Engine {
    // Identity and telemetry.
    fn version(&self) -> String;
    fn fps(&self) -> f64;
    fn process_frames(&self) -> u64;
    fn time_scale(&self) -> f64;
    /// Path and name of the currently loaded scene, if any.
    fn current_scene(&self) -> Option<(String, String)>;
    fn node_count(&self) -> usize;
    /// Host audio telemetry as ordered key/value pairs. Hosts document the
    /// keys they emit.
    fn audio_state(&self) -> Vec<(String, Variant)>;
    /// Host networking telemetry as ordered key/value pairs.
    fn network_state(&self) -> Vec<(String, Variant)>;
    /// Host performance counters as ordered key/value pairs.
    fn performance(&self) -> Vec<(String, Variant)>;

    // Scene graph.
    fn root(&self) -> Option<NodeId>;
    /// Resolve a hierarchical path (for example `Main/Player`) to a node.
    fn resolve(&self, path: &str) -> Option<NodeId>;
    fn is_valid(&self, node: NodeId) -> bool;
    fn name(&self, node: NodeId) -> String;
    fn type_name(&self, node: NodeId) -> String;
    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn groups(&self, node: NodeId) -> Vec<String>;
    fn path_of(&self, node: NodeId) -> String;

    // Properties and calls.
    fn get_property(&self, node: NodeId, property: &str) -> Option<Variant>;
    fn set_property(
        &mut self,
        node: NodeId,
        property: &str,
        value: Variant,
    ) -> Result<(), EngineError>;
    fn call_method(
        &mut self,
        node: NodeId,
        method: &str,
        args: Vec<Variant>,
    ) -> Result<Variant, EngineError>;

    // Rendering.
    fn capture_frame(&mut self) -> Result<Screenshot, EngineError>;

    // Input.
    fn push_input(&mut self, event: TaggedEvent);
    fn warp_cursor(&mut self, x: f32, y: f32);
    /// Enable or disable the viewport filter that drops untagged input while
    /// synthetic mode is active.
    fn set_input_isolation(&mut self, enabled: bool);
    /// Activate a button node as if it had been pressed. Hosts whose signal
    /// dispatch cannot reach the node under certain viewport configurations
    /// must invoke the registered listeners directly.
    fn emit_pressed(&mut self, node: NodeId) -> Result<(), EngineError>;
    fn start_vibration(&mut self, weak: f32, strong: f32, duration_ms: u64);

    // Host services.
    /// Compile and evaluate an expression against the scene root. The error
    /// string carries the host's parse or execution failure text.
    fn evaluate(&mut self, expr: &str) -> Result<Variant, String>;
    /// Consult the host-registered registry of game-defined callables.
    /// `None` means no callable with that name is registered.
    fn custom_command(
        &mut self,
        name: &str,
        args: Vec<Variant>,
    ) -> Option<Result<Variant, String>>;
    /// Ask the host to terminate at its next safe point.
    fn request_quit(&mut self);
    fn set_low_processor_mode(&mut self, enabled: bool);
    fn force_windowed(&mut self);
    /// Whether the host build exposes a feature tag (`grb`, `debug`, ...).
    fn has_feature(&self, tag: &str) -> bool;
}
