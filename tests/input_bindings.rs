use copperlab::input::{Input, InputAction, InputEvent};
use copperlab::input_controller::{PointerButton, PointerEvent};
use glam::Vec2;
use std::io::Write;
use tempfile::NamedTempFile;
use winit::event::MouseButton;
use winit::keyboard::{Key, NamedKey};

fn press(input: &mut Input, key: Key) {
    input.push(InputEvent::Key { key, pressed: true });
}

#[test]
fn remapped_export_key_overrides_default() {
    let mut temp = NamedTempFile::new().expect("temp input config");
    write!(temp, r#"{{"bindings":{{"export_layout":["x"],"clear_selection":["delete"]}}}}"#)
        .expect("write remap config");

    let mut input = Input::from_config(temp.path());
    assert!(input.take_actions().is_empty(), "no events yet");

    press(&mut input, Key::Character("x".into()));
    assert_eq!(input.take_actions(), vec![InputAction::ExportLayout]);

    press(&mut input, Key::Character("e".into()));
    assert!(input.take_actions().is_empty(), "default key no longer fires once remapped");

    press(&mut input, Key::Named(NamedKey::Delete));
    assert_eq!(input.take_actions(), vec![InputAction::ClearSelection]);

    press(&mut input, Key::Character("1".into()));
    assert_eq!(input.take_actions(), vec![InputAction::LoadSampleGrid], "unmapped actions keep defaults");
}

#[test]
fn broken_config_falls_back_to_defaults() {
    let mut temp = NamedTempFile::new().expect("temp input config");
    write!(temp, "{{ not json").expect("write config");

    let mut input = Input::from_config(temp.path());
    press(&mut input, Key::Named(NamedKey::Escape));
    press(&mut input, Key::Character("Q".into()));
    assert_eq!(input.take_actions(), vec![InputAction::ClearSelection, InputAction::Quit]);
}

#[test]
fn mouse_buttons_become_pointer_events_at_cursor() {
    let mut input = Input::new();
    input.push(InputEvent::CursorPos { x: 120.0, y: 80.0 });
    input.push(InputEvent::MouseButton { button: MouseButton::Left, pressed: true });
    input.push(InputEvent::MouseButton { button: MouseButton::Right, pressed: false });
    input.push(InputEvent::Wheel { delta: 1.5 });

    let position = Vec2::new(120.0, 80.0);
    assert_eq!(
        input.take_pointer_events(),
        vec![
            PointerEvent::Move { position },
            PointerEvent::Down { button: PointerButton::Primary, position },
            PointerEvent::Up { button: PointerButton::Secondary, position },
            PointerEvent::Wheel { delta: 1.5 },
        ]
    );
    assert!(input.take_pointer_events().is_empty());

    input.push(InputEvent::CursorLeft);
    assert!(input.cursor_position().is_none());
}
