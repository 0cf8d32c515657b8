use crate::input_controller::{PointerButton, PointerEvent};
use glam::Vec2;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{Key, NamedKey};

/// Pixels of trackpad scroll treated as one wheel notch.
const PIXELS_PER_WHEEL_STEP: f32 = 50.0;

/// Collects window input for one frame: pointer events for the scene and bound editor actions.
pub struct Input {
    bindings: InputBindings,
    pointer_events: Vec<PointerEvent>,
    actions: Vec<InputAction>,
    cursor_pos: Option<Vec2>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        let bindings = InputBindings::load_or_default(path);
        Self::with_bindings(bindings)
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self { bindings, pointer_events: Vec::new(), actions: Vec::new(), cursor_pos: None }
    }

    pub fn push(&mut self, ev: InputEvent) {
        match ev {
            InputEvent::Key { key, pressed } => {
                if pressed {
                    self.apply_key_binding(&key);
                }
            }
            InputEvent::CursorPos { x, y } => {
                let position = Vec2::new(x, y);
                self.cursor_pos = Some(position);
                self.pointer_events.push(PointerEvent::Move { position });
            }
            InputEvent::MouseButton { button, pressed } => {
                let Some(button) = pointer_button(button) else {
                    return;
                };
                let position = self.cursor_pos.unwrap_or(Vec2::ZERO);
                self.pointer_events.push(if pressed {
                    PointerEvent::Down { button, position }
                } else {
                    PointerEvent::Up { button, position }
                });
            }
            InputEvent::Wheel { delta } => {
                if delta.abs() > f32::EPSILON {
                    self.pointer_events.push(PointerEvent::Wheel { delta });
                }
            }
            InputEvent::CursorLeft => self.cursor_pos = None,
            InputEvent::Other => {}
        }
    }

    pub fn take_pointer_events(&mut self) -> Vec<PointerEvent> {
        std::mem::take(&mut self.pointer_events)
    }

    pub fn take_actions(&mut self) -> Vec<InputAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn cursor_position(&self) -> Option<Vec2> {
        self.cursor_pos
    }

    fn apply_key_binding(&mut self, key: &Key) {
        if let Some(binding_key) = InputKeyBinding::from_event_key(key) {
            let actions: Vec<_> = self.bindings.actions_for_key(&binding_key).collect();
            self.actions.extend(actions);
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

fn pointer_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Right => Some(PointerButton::Secondary),
        MouseButton::Middle => Some(PointerButton::Auxiliary),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::from_config(config, &path.display().to_string()),
                Err(err) => {
                    log::warn!(
                        "[input] Failed to parse {}: {err}. Falling back to default bindings.",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!("[input] Failed to read {}: {err}. Falling back to default bindings.", path.display());
                Self::default()
            }
        }
    }

    fn from_config(config: InputConfigFile, origin: &str) -> Self {
        let overrides = config.into_overrides(origin);
        Self::with_overrides(overrides)
    }

    fn with_overrides(overrides: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in overrides {
            if keys.is_empty() {
                continue;
            }
            action_map.insert(action, keys);
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<InputAction, Vec<InputKeyBinding>> {
        use InputAction::*;
        let mut map = HashMap::new();
        map.insert(ExportLayout, vec![InputKeyBinding::character("e")]);
        map.insert(ReloadLayout, vec![InputKeyBinding::character("r")]);
        map.insert(LoadSampleGrid, vec![InputKeyBinding::character("1")]);
        map.insert(LoadSampleBasic, vec![InputKeyBinding::character("2")]);
        map.insert(ClearSelection, vec![InputKeyBinding::named(NamedKeyCode::Escape)]);
        map.insert(Quit, vec![InputKeyBinding::character("q")]);
        map
    }

    fn from_action_map(action_map: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>> = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_actions.entry(key).or_default().push(action);
            }
        }
        Self { key_to_actions }
    }

    fn actions_for_key(&self, key: &InputKeyBinding) -> impl Iterator<Item = InputAction> + '_ {
        self.key_to_actions.get(key).into_iter().flatten().copied()
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputKeyBinding {
    Character(String),
    Named(NamedKeyCode),
}

impl InputKeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn named(named: NamedKeyCode) -> Self {
        Self::Named(named)
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) => {
                let s = ch.to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(Self::Character(s.to_lowercase()))
                }
            }
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        if let Some(named) = NamedKeyCode::from_str(&normalized) {
            return Some(Self::Named(named));
        }
        if normalized.chars().count() == 1 {
            return Some(Self::Character(normalized));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKeyCode {
    Escape,
    Space,
    Delete,
    F5,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::Escape => Some(Self::Escape),
            NamedKey::Space => Some(Self::Space),
            NamedKey::Delete => Some(Self::Delete),
            NamedKey::F5 => Some(Self::F5),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "escape" | "esc" => Some(Self::Escape),
            "space" => Some(Self::Space),
            "delete" | "del" => Some(Self::Delete),
            "f5" => Some(Self::F5),
            _ => None,
        }
    }
}

/// Editor commands reachable from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    ExportLayout,
    ReloadLayout,
    LoadSampleGrid,
    LoadSampleBasic,
    ClearSelection,
    Quit,
}

impl InputAction {
    fn from_str(value: &str) -> Option<Self> {
        match value {
            "export_layout" => Some(Self::ExportLayout),
            "reload_layout" => Some(Self::ReloadLayout),
            "load_sample_grid" => Some(Self::LoadSampleGrid),
            "load_sample_basic" => Some(Self::LoadSampleBasic),
            "clear_selection" => Some(Self::ClearSelection),
            "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> HashMap<InputAction, Vec<InputKeyBinding>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let action_key = action_name.trim().to_lowercase();
            match InputAction::from_str(&action_key) {
                Some(action) => {
                    let mut parsed = Vec::new();
                    for key in keys {
                        match InputKeyBinding::from_config_value(&key) {
                            Some(binding) => parsed.push(binding),
                            None => log::warn!(
                                "[input] {origin}: unknown key '{key}' for action '{action_name}', ignoring."
                            ),
                        }
                    }
                    if parsed.is_empty() {
                        log::warn!("[input] {origin}: action '{action_name}' has no valid keys, keeping defaults.");
                        continue;
                    }
                    overrides.insert(action, parsed);
                }
                None => log::warn!("[input] {origin}: unknown action '{action_name}', ignoring."),
            }
        }
        overrides
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key { key: Key, pressed: bool },
    CursorPos { x: f32, y: f32 },
    CursorLeft,
    MouseButton { button: MouseButton, pressed: bool },
    Wheel { delta: f32 },
    Other,
}

impl InputEvent {
    pub fn from_window_event(ev: &WindowEvent) -> Self {
        match ev {
            WindowEvent::MouseWheel { delta, .. } => {
                let d = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_WHEEL_STEP,
                };
                InputEvent::Wheel { delta: d }
            }
            WindowEvent::CursorMoved { position, .. } => {
                InputEvent::CursorPos { x: position.x as f32, y: position.y as f32 }
            }
            WindowEvent::CursorLeft { .. } => InputEvent::CursorLeft,
            WindowEvent::MouseInput { state, button, .. } => {
                InputEvent::MouseButton { button: *button, pressed: *state == ElementState::Pressed }
            }
            WindowEvent::KeyboardInput { event, .. } if !event.repeat => InputEvent::Key {
                key: event.logical_key.clone(),
                pressed: event.state == ElementState::Pressed,
            },
            _ => InputEvent::Other,
        }
    }
}
