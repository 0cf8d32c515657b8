pub mod app;
pub mod board;
pub mod camera3d;
pub mod cli;
pub mod config;
pub mod events;
pub mod gizmo;
pub mod input;
pub mod input_controller;
pub mod interaction;
pub mod layout;
pub mod mesh;
pub mod picking;
pub mod primitives;
pub mod renderer;
pub mod resources;
pub mod scene_graph;
pub mod scene_manager;
pub mod time;

pub use app::{run, run_with_overrides, App};
pub use layout::LayoutDocument;
pub use scene_manager::SceneManager;
