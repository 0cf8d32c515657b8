mod layout_io;

use crate::config::{AppConfig, AppConfigOverrides};
use crate::events::EditorEvent;
use crate::input::{Input, InputAction, InputEvent};
use crate::renderer::Renderer;
use crate::scene_manager::SceneManager;
use crate::time::FrameClock;

use anyhow::{Context, Result};
use std::path::PathBuf;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::CursorIcon;

pub use layout_io::{load_layout_file, save_layout_file};

pub const CONFIG_PATH: &str = "config/app.json";

pub async fn run() -> Result<()> {
    run_with_overrides(AppConfigOverrides::default()).await
}

pub async fn run_with_overrides(overrides: AppConfigOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default(CONFIG_PATH);
    if !overrides.is_empty() {
        log::info!("[cli] overriding {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

pub struct App {
    pub(crate) renderer: Renderer,
    pub(crate) scene: SceneManager,
    pub(crate) input: Input,
    config: AppConfig,
    clock: FrameClock,
    /// File the current layout came from; `None` for the built-in samples.
    layout_source: Option<PathBuf>,
    layout_ready: bool,
    cursor_icon: CursorIcon,
    should_close: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let viewport = PhysicalSize::new(config.window.width, config.window.height);
        Self {
            renderer: Renderer::new(&config.window),
            scene: SceneManager::new(&config, viewport),
            input: Input::from_config(&config.layout.bindings_path),
            layout_source: config.layout.startup_path.clone(),
            config,
            clock: FrameClock::new(),
            layout_ready: false,
            cursor_icon: CursorIcon::Default,
            should_close: false,
        }
    }

    pub fn scene(&self) -> &SceneManager {
        &self.scene
    }

    fn load_initial_layout(&mut self) {
        if self.layout_ready {
            return;
        }
        self.layout_ready = true;
        if self.layout_source.is_some() {
            self.reload_layout();
        } else {
            self.scene.load_sample_grid();
        }
    }

    /// Re-reads the layout file. A failed read leaves the current scene in place, or the
    /// grid sample when nothing has been loaded yet.
    fn reload_layout(&mut self) {
        let Some(path) = self.layout_source.clone() else {
            log::warn!("[layout] current layout is a built-in sample; nothing to reload");
            return;
        };
        match load_layout_file(&path) {
            Ok(document) => {
                log::info!("[layout] loaded {}", path.display());
                self.scene.load_layout(&document);
            }
            Err(err) => {
                log::error!("[layout] {err:?}");
                if self.scene.graph().interactables().is_empty() {
                    self.scene.load_sample_grid();
                }
            }
        }
    }

    fn export_layout(&mut self) {
        let document = self.scene.export_layout();
        let path = self.config.layout.export_path.clone();
        match save_layout_file(&document, &path) {
            Ok(()) => log::info!("[layout] exported to {}", path.display()),
            Err(err) => log::error!("[layout] {err:?}"),
        }
    }

    pub(crate) fn apply_action(&mut self, action: InputAction) {
        match action {
            InputAction::ExportLayout => self.export_layout(),
            InputAction::ReloadLayout => self.reload_layout(),
            InputAction::LoadSampleGrid => {
                self.layout_source = None;
                self.scene.load_sample_grid();
            }
            InputAction::LoadSampleBasic => {
                self.layout_source = None;
                self.scene.load_sample_basic();
            }
            InputAction::ClearSelection => self.scene.clear_selection(),
            InputAction::Quit => self.should_close = true,
        }
    }

    pub(crate) fn process_input(&mut self) {
        for event in self.input.take_pointer_events() {
            self.scene.handle_pointer(event);
        }
        for action in self.input.take_actions() {
            self.apply_action(action);
        }
    }

    fn update_window_state(&mut self) {
        let mut title = None;
        for event in self.scene.drain_events() {
            log::trace!("[app] {event}");
            if let EditorEvent::SelectionChanged(selection) = event {
                title = Some(match selection {
                    Some(selected) => format!("{} - {selected}", self.config.window.title),
                    None => self.config.window.title.clone(),
                });
            }
        }
        let icon = self.scene.input().cursor_icon();
        let Some(window) = self.renderer.window() else {
            return;
        };
        if let Some(title) = title {
            window.set_title(&title);
        }
        if icon != self.cursor_icon {
            window.set_cursor(icon);
            self.cursor_icon = icon;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.renderer.ensure_window(event_loop) {
            log::error!("[renderer] initialization error: {err:?}");
            self.should_close = true;
            return;
        }
        self.scene.set_viewport(self.renderer.size());
        self.load_initial_layout();
    }

    fn window_event(&mut self, _el: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        self.input.push(InputEvent::from_window_event(&event));
        match &event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => {
                self.renderer.resize(*size);
                self.scene.set_viewport(*size);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.renderer.render(&mut self.scene) {
                    log::error!("[renderer] frame failed: {err:?}");
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            event_loop.exit();
            return;
        }
        self.clock.tick();
        self.process_input();
        self.scene.tick(self.clock.elapsed_seconds());
        self.update_window_state();
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.scene.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input_controller::{PointerButton, PointerEvent};
    use glam::Vec2;

    fn app() -> App {
        let mut config = AppConfig::default();
        config.layout.bindings_path = PathBuf::from("missing/input.json");
        App::new(config)
    }

    #[test]
    fn sample_actions_replace_the_scene() {
        let mut app = app();
        app.apply_action(InputAction::LoadSampleBasic);
        assert_eq!(app.scene.graph().pad_batch().map(|batch| batch.len()), Some(3));
        app.apply_action(InputAction::LoadSampleGrid);
        assert_eq!(app.scene.graph().pad_batch().map(|batch| batch.len()), Some(100));
    }

    #[test]
    fn export_action_writes_configured_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = app();
        app.config.layout.export_path = dir.path().join("out.json");
        app.apply_action(InputAction::LoadSampleBasic);
        app.apply_action(InputAction::ExportLayout);
        let document = load_layout_file(dir.path().join("out.json")).expect("exported file");
        assert_eq!(document.components.map(|c| c.len()), Some(5));
    }

    #[test]
    fn reload_without_file_keeps_sample() {
        let mut app = app();
        app.apply_action(InputAction::LoadSampleBasic);
        app.apply_action(InputAction::ReloadLayout);
        assert_eq!(app.scene.graph().pad_batch().map(|batch| batch.len()), Some(3));
    }

    #[test]
    fn missing_startup_file_falls_back_to_grid() {
        let mut config = AppConfig::default();
        config.layout.startup_path = Some(PathBuf::from("does/not/exist.json"));
        config.layout.bindings_path = PathBuf::from("missing/input.json");
        let mut app = App::new(config);
        app.load_initial_layout();
        assert_eq!(app.scene.graph().pad_batch().map(|batch| batch.len()), Some(100));
    }

    #[test]
    fn quit_action_requests_close() {
        let mut app = app();
        app.apply_action(InputAction::Quit);
        assert!(app.should_close);
    }

    #[test]
    fn clicking_empty_space_is_harmless() {
        let mut app = app();
        app.apply_action(InputAction::LoadSampleBasic);
        app.input.push(InputEvent::CursorPos { x: 2.0, y: 2.0 });
        app.process_input();
        app.scene.handle_pointer(PointerEvent::Down { button: PointerButton::Primary, position: Vec2::new(2.0, 2.0) });
        assert!(app.scene.selection().is_none());
    }
}
