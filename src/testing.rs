//! Simulated host engine.
//!
//! [`SimEngine`] is a small in-memory host implementing [`Engine`] for unit
//! and integration tests: a mutable node tree with properties and groups,
//! recorded input with isolation semantics, scripted expression results and
//! fixed telemetry. It is clonable and thread-safe, so a test can hand one
//! clone to the bridge's frame pump and keep another to mutate state and
//! assert on what the bridge did.
//!
//! Two deliberate bits of game logic make end-to-end input tests possible:
//! a delivered pinch gesture multiplies the `zoom` property of every node
//! in the `gesture_targets` group, and delivered events are recorded in
//! arrival order for inspection via [`SimEngine::taken_events`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{
    Engine, EngineError, InputEvent, NodeId, Screenshot, TaggedEvent, Variant,
};

type MethodFn = Box<dyn FnMut(Vec<Variant>) -> Variant + Send>;
type CustomFn = Box<dyn FnMut(Vec<Variant>) -> Result<Variant, String> + Send>;

struct SimNode {
    name: String,
    type_name: String,
    parent: Option<u64>,
    children: Vec<u64>,
    groups: Vec<String>,
    properties: Vec<(String, Variant)>,
    valid: bool,
}

#[derive(Default)]
struct SimState {
    nodes: HashMap<u64, SimNode>,
    root: Option<u64>,
    next_id: u64,
    version: String,
    fps: f64,
    process_frames: u64,
    time_scale: f64,
    scene: Option<(String, String)>,
    features: Vec<String>,
    events: Vec<TaggedEvent>,
    rejected_events: u64,
    isolation: bool,
    cursor: Option<(f32, f32)>,
    pressed: Vec<String>,
    vibrations: Vec<(f32, f32, u64)>,
    quit_requests: u64,
    low_processor_mode: Option<bool>,
    windowed: bool,
    capture_fails: bool,
    eval_results: HashMap<String, Result<Variant, String>>,
    methods: HashMap<(u64, String), MethodFn>,
    custom: HashMap<String, CustomFn>,
}

/// Clonable simulated host. All clones share one state.
#[derive(Clone)]
pub struct SimEngine {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                version: "sim-4.2.1".to_string(),
                fps: 60.0,
                time_scale: 1.0,
                next_id: 1,
                ..SimState::default()
            })),
        }
    }

    // ------------------------------------------------------------------
    // Tree construction
    // ------------------------------------------------------------------

    /// Create the root node. Replaces any existing tree.
    pub fn add_root(&self, name: &str, type_name: &str) -> NodeId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.clear();
        state.nodes.insert(
            id,
            SimNode {
                name: name.to_string(),
                type_name: type_name.to_string(),
                parent: None,
                children: Vec::new(),
                groups: Vec::new(),
                properties: Vec::new(),
                valid: true,
            },
        );
        state.root = Some(id);
        NodeId(id)
    }

    pub fn add_child(&self, parent: NodeId, name: &str, type_name: &str) -> NodeId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            id,
            SimNode {
                name: name.to_string(),
                type_name: type_name.to_string(),
                parent: Some(parent.0),
                children: Vec::new(),
                groups: Vec::new(),
                properties: Vec::new(),
                valid: true,
            },
        );
        if let Some(node) = state.nodes.get_mut(&parent.0) {
            node.children.push(id);
        }
        NodeId(id)
    }

    pub fn set_sim_property(&self, node: NodeId, property: &str, value: Variant) {
        let mut state = self.state.lock();
        if let Some(node) = state.nodes.get_mut(&node.0) {
            if let Some(slot) = node.properties.iter_mut().find(|(k, _)| k == property) {
                slot.1 = value;
            } else {
                node.properties.push((property.to_string(), value));
            }
        }
    }

    pub fn add_to_group(&self, node: NodeId, group: &str) {
        let mut state = self.state.lock();
        if let Some(node) = state.nodes.get_mut(&node.0) {
            node.groups.push(group.to_string());
        }
    }

    /// Resolve a path that must exist, for test setup.
    pub fn resolve_path(&self, path: &str) -> NodeId {
        Engine::resolve(self, path).unwrap_or_else(|| panic!("no node at {path}"))
    }

    /// Invalidate a node and detach it from its parent, as if the game freed
    /// it mid-frame.
    pub fn free_node(&self, node: NodeId) {
        let mut state = self.state.lock();
        let parent = state.nodes.get(&node.0).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(parent_node) = state.nodes.get_mut(&parent) {
                parent_node.children.retain(|&c| c != node.0);
            }
        }
        if let Some(node) = state.nodes.get_mut(&node.0) {
            node.valid = false;
        }
    }

    // ------------------------------------------------------------------
    // Behavior scripting
    // ------------------------------------------------------------------

    pub fn add_feature(&self, tag: &str) {
        self.state.lock().features.push(tag.to_string());
    }

    pub fn set_scene(&self, path: &str, name: &str) {
        self.state.lock().scene = Some((path.to_string(), name.to_string()));
    }

    pub fn fail_captures(&self) {
        self.state.lock().capture_fails = true;
    }

    /// Script the result of `evaluate` for one expression.
    pub fn script_eval(&self, expr: &str, result: Result<Variant, String>) {
        self.state.lock().eval_results.insert(expr.to_string(), result);
    }

    pub fn register_method(
        &self,
        node: NodeId,
        name: &str,
        f: impl FnMut(Vec<Variant>) -> Variant + Send + 'static,
    ) {
        self.state
            .lock()
            .methods
            .insert((node.0, name.to_string()), Box::new(f));
    }

    pub fn register_custom_command(
        &self,
        name: &str,
        f: impl FnMut(Vec<Variant>) -> Result<Variant, String> + Send + 'static,
    ) {
        self.state.lock().custom.insert(name.to_string(), Box::new(f));
    }

    // ------------------------------------------------------------------
    // Observation for assertions
    // ------------------------------------------------------------------

    /// Take every event delivered to game nodes since the last call.
    pub fn taken_events(&self) -> Vec<TaggedEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Count of untagged events the viewport filter dropped.
    pub fn rejected_events(&self) -> u64 {
        self.state.lock().rejected_events
    }

    pub fn cursor(&self) -> Option<(f32, f32)> {
        self.state.lock().cursor
    }

    /// Names of buttons activated through `emit_pressed`, in order.
    pub fn pressed_buttons(&self) -> Vec<String> {
        self.state.lock().pressed.clone()
    }

    pub fn vibrations(&self) -> Vec<(f32, f32, u64)> {
        self.state.lock().vibrations.clone()
    }

    pub fn quit_requests(&self) -> u64 {
        self.state.lock().quit_requests
    }

    pub fn low_processor_mode(&self) -> Option<bool> {
        self.state.lock().low_processor_mode
    }

    pub fn input_isolation(&self) -> bool {
        self.state.lock().isolation
    }

    pub fn windowed(&self) -> bool {
        self.state.lock().windowed
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Deliver an event to "game logic": record it and apply the pinch rule.
    fn deliver(state: &mut SimState, event: &TaggedEvent) {
        if let InputEvent::Pinch { factor, .. } = event.event {
            let targets: Vec<u64> = state
                .nodes
                .iter()
                .filter(|(_, n)| n.valid && n.groups.iter().any(|g| g == "gesture_targets"))
                .map(|(id, _)| *id)
                .collect();
            for id in targets {
                if let Some(node) = state.nodes.get_mut(&id) {
                    if let Some((_, Variant::Float(zoom))) =
                        node.properties.iter_mut().find(|(k, _)| k == "zoom")
                    {
                        *zoom *= factor as f64;
                    }
                }
            }
        }
        state.events.push(event.clone());
    }
}

impl Engine for SimEngine {
    fn version(&self) -> String {
        self.state.lock().version.clone()
    }

    fn fps(&self) -> f64 {
        self.state.lock().fps
    }

    fn process_frames(&self) -> u64 {
        self.state.lock().process_frames
    }

    fn time_scale(&self) -> f64 {
        self.state.lock().time_scale
    }

    fn current_scene(&self) -> Option<(String, String)> {
        self.state.lock().scene.clone()
    }

    fn node_count(&self) -> usize {
        self.state.lock().nodes.values().filter(|n| n.valid).count()
    }

    fn audio_state(&self) -> Vec<(String, Variant)> {
        vec![
            ("output_latency_ms".into(), Variant::Float(8.0)),
            ("bus_count".into(), Variant::Int(2)),
            ("master_volume_db".into(), Variant::Float(0.0)),
        ]
    }

    fn network_state(&self) -> Vec<(String, Variant)> {
        vec![
            ("multiplayer_active".into(), Variant::Bool(false)),
            ("connected_peers".into(), Variant::Int(0)),
        ]
    }

    fn performance(&self) -> Vec<(String, Variant)> {
        vec![
            ("fps".into(), Variant::Float(self.fps())),
            ("process_time_ms".into(), Variant::Float(2.5)),
            ("object_count".into(), Variant::Int(self.node_count() as i64)),
        ]
    }

    fn root(&self) -> Option<NodeId> {
        self.state.lock().root.map(NodeId)
    }

    fn resolve(&self, path: &str) -> Option<NodeId> {
        let state = self.state.lock();
        let root = state.root?;
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        // The root's own name is accepted as a leading alias.
        if segments.first() == Some(&state.nodes.get(&root)?.name.as_str()) {
            segments.remove(0);
        }
        let mut current = root;
        for segment in segments {
            let node = state.nodes.get(&current)?;
            current = *node.children.iter().find(|&&c| {
                state
                    .nodes
                    .get(&c)
                    .map(|child| child.valid && child.name == segment)
                    .unwrap_or(false)
            })?;
        }
        state
            .nodes
            .get(&current)
            .filter(|n| n.valid)
            .map(|_| NodeId(current))
    }

    fn is_valid(&self, node: NodeId) -> bool {
        self.state
            .lock()
            .nodes
            .get(&node.0)
            .map(|n| n.valid)
            .unwrap_or(false)
    }

    fn name(&self, node: NodeId) -> String {
        self.state
            .lock()
            .nodes
            .get(&node.0)
            .map(|n| n.name.clone())
            .unwrap_or_default()
    }

    fn type_name(&self, node: NodeId) -> String {
        self.state
            .lock()
            .nodes
            .get(&node.0)
            .map(|n| n.type_name.clone())
            .unwrap_or_default()
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .nodes
            .get(&node.0)
            .map(|n| n.children.iter().map(|&c| NodeId(c)).collect())
            .unwrap_or_default()
    }

    fn groups(&self, node: NodeId) -> Vec<String> {
        self.state
            .lock()
            .nodes
            .get(&node.0)
            .map(|n| n.groups.clone())
            .unwrap_or_default()
    }

    fn path_of(&self, node: NodeId) -> String {
        let state = self.state.lock();
        let mut segments = Vec::new();
        let mut current = Some(node.0);
        while let Some(id) = current {
            match state.nodes.get(&id) {
                Some(n) => {
                    if n.parent.is_some() {
                        segments.push(n.name.clone());
                    } else if segments.is_empty() {
                        segments.push(n.name.clone());
                    }
                    current = n.parent;
                }
                None => break,
            }
        }
        segments.reverse();
        segments.join("/")
    }

    fn get_property(&self, node: NodeId, property: &str) -> Option<Variant> {
        self.state
            .lock()
            .nodes
            .get(&node.0)
            .filter(|n| n.valid)
            .and_then(|n| {
                n.properties
                    .iter()
                    .find(|(k, _)| k == property)
                    .map(|(_, v)| v.clone())
            })
    }

    fn set_property(
        &mut self,
        node: NodeId,
        property: &str,
        value: Variant,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(&node.0)
            .filter(|n| n.valid)
            .ok_or(EngineError::NodeNotFound)?;
        if let Some(slot) = node.properties.iter_mut().find(|(k, _)| k == property) {
            slot.1 = value;
        } else {
            node.properties.push((property.to_string(), value));
        }
        Ok(())
    }

    fn call_method(
        &mut self,
        node: NodeId,
        method: &str,
        args: Vec<Variant>,
    ) -> Result<Variant, EngineError> {
        let mut state = self.state.lock();
        if !state.nodes.get(&node.0).map(|n| n.valid).unwrap_or(false) {
            return Err(EngineError::NodeNotFound);
        }
        match state.methods.get_mut(&(node.0, method.to_string())) {
            Some(f) => Ok(f(args)),
            None => Err(EngineError::MethodMissing(method.to_string())),
        }
    }

    fn capture_frame(&mut self) -> Result<Screenshot, EngineError> {
        let state = self.state.lock();
        if state.capture_fails {
            return Err(EngineError::Host("viewport capture returned no image".into()));
        }
        // Eight-byte PNG signature plus filler; enough for clients that only
        // check the header.
        let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0u8; 32]);
        Ok(Screenshot {
            width: 320,
            height: 180,
            png,
        })
    }

    fn push_input(&mut self, event: TaggedEvent) {
        let mut state = self.state.lock();
        if state.isolation && !event.synthetic {
            state.rejected_events += 1;
            return;
        }
        SimEngine::deliver(&mut state, &event);
    }

    fn warp_cursor(&mut self, x: f32, y: f32) {
        self.state.lock().cursor = Some((x, y));
    }

    fn set_input_isolation(&mut self, enabled: bool) {
        self.state.lock().isolation = enabled;
    }

    fn emit_pressed(&mut self, node: NodeId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let name = state
            .nodes
            .get(&node.0)
            .filter(|n| n.valid)
            .map(|n| n.name.clone())
            .ok_or(EngineError::NodeNotFound)?;
        state.pressed.push(name);
        Ok(())
    }

    fn start_vibration(&mut self, weak: f32, strong: f32, duration_ms: u64) {
        self.state.lock().vibrations.push((weak, strong, duration_ms));
    }

    fn evaluate(&mut self, expr: &str) -> Result<Variant, String> {
        self.state
            .lock()
            .eval_results
            .get(expr)
            .cloned()
            .unwrap_or_else(|| Err(format!("failed to parse expression: {expr}")))
    }

    fn custom_command(
        &mut self,
        name: &str,
        args: Vec<Variant>,
    ) -> Option<Result<Variant, String>> {
        let mut state = self.state.lock();
        state.custom.get_mut(name).map(|f| f(args))
    }

    fn request_quit(&mut self) {
        self.state.lock().quit_requests += 1;
    }

    fn set_low_processor_mode(&mut self, enabled: bool) {
        self.state.lock().low_processor_mode = Some(enabled);
    }

    fn force_windowed(&mut self) {
        self.state.lock().windowed = true;
    }

    fn has_feature(&self, tag: &str) -> bool {
        self.state.lock().features.iter().any(|f| f == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_paths() {
        let sim = SimEngine::new();
        let root = sim.add_root("Root", "Node");
        let main = sim.add_child(root, "Main", "Node2D");
        let gesture = sim.add_child(main, "GestureTest", "Node2D");

        assert_eq!(sim.resolve("Root"), Some(root));
        assert_eq!(sim.resolve("Main"), Some(main));
        assert_eq!(sim.resolve("Main/GestureTest"), Some(gesture));
        assert_eq!(sim.resolve("Main/Nope"), None);
        assert_eq!(sim.resolve("Nope"), None);
    }

    #[test]
    fn test_path_of_roundtrips_through_resolve() {
        let sim = SimEngine::new();
        let root = sim.add_root("Root", "Node");
        let main = sim.add_child(root, "Main", "Node2D");
        let deep = sim.add_child(main, "Deep", "Node2D");

        assert_eq!(sim.path_of(deep), "Main/Deep");
        assert_eq!(sim.resolve(&sim.path_of(deep)), Some(deep));
        assert_eq!(sim.resolve(&sim.path_of(root)), Some(root));
    }

    #[test]
    fn test_freed_nodes_disappear() {
        let sim = SimEngine::new();
        let root = sim.add_root("Root", "Node");
        let child = sim.add_child(root, "Child", "Node");

        assert!(sim.is_valid(child));
        sim.free_node(child);
        assert!(!sim.is_valid(child));
        assert_eq!(sim.resolve("Child"), None);
        assert_eq!(sim.children(root), Vec::<NodeId>::new());
        assert_eq!(sim.node_count(), 1);
    }

    #[test]
    fn test_isolation_filters_untagged_events() {
        let mut sim = SimEngine::new();
        sim.set_input_isolation(true);

        sim.push_input(TaggedEvent {
            event: InputEvent::Key {
                keycode: 65,
                pressed: true,
            },
            synthetic: false,
        });
        sim.push_input(TaggedEvent::synthetic(InputEvent::Key {
            keycode: 66,
            pressed: true,
        }));

        let events = sim.taken_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].synthetic);
        assert_eq!(sim.rejected_events(), 1);

        // With isolation off, untagged events flow again.
        sim.set_input_isolation(false);
        sim.push_input(TaggedEvent {
            event: InputEvent::Key {
                keycode: 67,
                pressed: true,
            },
            synthetic: false,
        });
        assert_eq!(sim.taken_events().len(), 1);
    }

    #[test]
    fn test_pinch_scales_gesture_targets() {
        let mut sim = SimEngine::new();
        let root = sim.add_root("Root", "Node");
        let target = sim.add_child(root, "GestureTest", "Node2D");
        sim.set_sim_property(target, "zoom", Variant::Float(1.0));
        sim.add_to_group(target, "gesture_targets");

        sim.push_input(TaggedEvent::synthetic(InputEvent::Pinch {
            x: 480.0,
            y: 270.0,
            factor: 1.2,
        }));

        match sim.get_property(target, "zoom") {
            Some(Variant::Float(zoom)) => assert!(zoom > 1.0),
            other => panic!("unexpected zoom value: {other:?}"),
        }
    }

    #[test]
    fn test_methods_and_custom_commands() {
        let mut sim = SimEngine::new();
        let root = sim.add_root("Root", "Node");
        sim.register_method(root, "sum", |args| {
            let total = args
                .iter()
                .map(|v| match v {
                    Variant::Int(i) => *i,
                    _ => 0,
                })
                .sum();
            Variant::Int(total)
        });
        sim.register_custom_command("spawn_wave", |_| Ok(Variant::Str("wave 1".into())));

        assert_eq!(
            sim.call_method(root, "sum", vec![Variant::Int(2), Variant::Int(3)])
                .unwrap(),
            Variant::Int(5)
        );
        assert!(matches!(
            sim.call_method(root, "nope", Vec::new()),
            Err(EngineError::MethodMissing(_))
        ));
        assert_eq!(
            sim.custom_command("spawn_wave", Vec::new()),
            Some(Ok(Variant::Str("wave 1".into())))
        );
        assert_eq!(sim.custom_command("nope", Vec::new()), None);
    }
}
