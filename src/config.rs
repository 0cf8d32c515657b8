use crate::board::{parse_hex_color, DEFAULT_BOARD_COLOR};
use crate::layout::DEFAULT_BOARD_THICKNESS;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "CameraConfig::default_near")]
    pub near: f32,
    #[serde(default = "CameraConfig::default_far")]
    pub far: f32,
    #[serde(default = "CameraConfig::default_position")]
    pub position: [f32; 3],
    #[serde(default)]
    pub target: [f32; 3],
    #[serde(default = "CameraConfig::default_rotate_speed")]
    pub rotate_speed: f32,
    #[serde(default = "CameraConfig::default_zoom_speed")]
    pub zoom_speed: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "BoardConfig::default_color")]
    pub color: String,
    #[serde(default = "BoardConfig::default_thickness")]
    pub thickness: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    /// Loaded at startup; the grid sample is used when absent.
    #[serde(default)]
    pub startup_path: Option<PathBuf>,
    #[serde(default = "LayoutConfig::default_export_path")]
    pub export_path: PathBuf,
    #[serde(default = "LayoutConfig::default_bindings_path")]
    pub bindings_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub window: WindowConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub layout: Option<PathBuf>,
    pub export: Option<PathBuf>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "CopperLab".to_string(), width: 1280, height: 720, vsync: true }
    }
}

impl CameraConfig {
    const fn default_fov_degrees() -> f32 {
        45.0
    }

    const fn default_near() -> f32 {
        0.1
    }

    const fn default_far() -> f32 {
        1000.0
    }

    const fn default_position() -> [f32; 3] {
        [0.0, 50.0, 50.0]
    }

    const fn default_rotate_speed() -> f32 {
        0.005
    }

    const fn default_zoom_speed() -> f32 {
        0.1
    }

    pub fn fov_y_radians(&self) -> f32 {
        self.fov_degrees.clamp(1.0, 170.0).to_radians()
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: Self::default_fov_degrees(),
            near: Self::default_near(),
            far: Self::default_far(),
            position: Self::default_position(),
            target: [0.0; 3],
            rotate_speed: Self::default_rotate_speed(),
            zoom_speed: Self::default_zoom_speed(),
        }
    }
}

impl BoardConfig {
    fn default_color() -> String {
        "#2e8b57".to_string()
    }

    const fn default_thickness() -> f32 {
        DEFAULT_BOARD_THICKNESS
    }

    /// Parsed board colour; an unparseable value falls back to the default green.
    pub fn color_rgb(&self) -> [f32; 3] {
        parse_hex_color(&self.color).unwrap_or_else(|| {
            log::warn!("[config] invalid board color '{}'; using default", self.color);
            DEFAULT_BOARD_COLOR
        })
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self { color: Self::default_color(), thickness: Self::default_thickness() }
    }
}

impl LayoutConfig {
    fn default_export_path() -> PathBuf {
        PathBuf::from("layout_export.json")
    }

    fn default_bindings_path() -> PathBuf {
        PathBuf::from("config/input.json")
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            startup_path: None,
            export_path: Self::default_export_path(),
            bindings_path: Self::default_bindings_path(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(layout) = &overrides.layout {
            self.layout.startup_path = Some(layout.clone());
        }
        if let Some(export) = &overrides.export {
            self.layout.export_path = export.clone();
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.applied_fields().is_empty()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.layout.is_some() {
            fields.push("layout");
        }
        if self.export.is_some() {
            fields.push("export");
        }
        fields
    }
}
