//! Draws the board, pad instances, trace ribbons and gizmo handles into the window surface.

mod scene_pass;
mod window_surface;

pub use window_surface::{SurfaceFrame, WindowSurface};

use crate::board::DEFAULT_BOARD_COLOR;
use crate::config::WindowConfig;
use crate::gizmo::HandleSegment;
use crate::mesh::Mesh;
use crate::resources::{CopperMaterial, DepthBias, Material, ResourceCache, BOARD_SHININESS, COPPER_MATERIAL};
use crate::scene_graph::SceneGraph;
use crate::scene_manager::SceneManager;
use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3};
use scene_pass::{DrawCall, Globals, InstanceRaw, PipelineKind, ScenePass};
use std::ops::Range;
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub const COPPER_COLOR: [f32; 3] = [0.72, 0.45, 0.2];
const HANDLE_HIGHLIGHT_COLOR: [f32; 3] = [1.0, 0.95, 0.4];
const HANDLE_THICKNESS_FRACTION: f32 = 0.04;
const LIGHT_DIR: [f32; 3] = [-0.4, -1.0, -0.3];
const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.09, g: 0.1, b: 0.12, a: 1.0 };
/// Instance id that tells the shader to use the per-vertex id instead.
const VERTEX_ID_MARKER: f32 = -1.0;

/// Meshes and instance ranges for one frame, before GPU upload.
struct MeshBatch {
    pipeline: PipelineKind,
    mesh: Arc<Mesh>,
    instances: Range<u32>,
}

#[derive(Default)]
struct FrameDraws {
    instances: Vec<InstanceRaw>,
    batches: Vec<MeshBatch>,
}

impl FrameDraws {
    fn push(&mut self, pipeline: PipelineKind, mesh: &Arc<Mesh>, instances: &[InstanceRaw]) {
        if instances.is_empty() {
            return;
        }
        let start = self.instances.len() as u32;
        self.instances.extend_from_slice(instances);
        let end = self.instances.len() as u32;
        self.batches.push(MeshBatch { pipeline, mesh: Arc::clone(mesh), instances: start..end });
    }
}

pub struct Renderer {
    surface: WindowSurface,
    pass: Option<ScenePass>,
    pad_instances: Vec<InstanceRaw>,
    handle_mesh: Arc<Mesh>,
}

impl Renderer {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            surface: WindowSurface::new(window_cfg),
            pass: None,
            pad_instances: Vec::new(),
            handle_mesh: Arc::new(Mesh::cuboid(Vec3::ONE)),
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        self.surface.ensure_window(event_loop)
    }

    pub fn window(&self) -> Option<&Window> {
        self.surface.window()
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.surface.size()
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.surface.resize(new_size);
    }

    /// Renders the current scene. Pad instance data is rebuilt only when the batch reports a change.
    pub fn render(&mut self, scene: &mut SceneManager) -> Result<()> {
        let size = self.surface.size();
        if size.width == 0 || size.height == 0 || scene.is_disposed() {
            return Ok(());
        }
        if self.pass.is_none() {
            let device = self.surface.device()?;
            let format = self.surface.surface_format()?;
            self.pass = Some(ScenePass::new(device, format, copper_depth_bias(scene)));
        }
        if scene.take_pad_batch_upload() || scene.graph().pad_batch().is_none() {
            self.pad_instances = pad_instances(scene.graph());
        }

        let frame_draws = self.collect_draws(scene);
        let globals = frame_globals(scene, size);

        let frame = self.surface.acquire_surface_frame()?;
        let depth_view = self.surface.depth_view()?;
        let (device, queue) = self.surface.device_and_queue()?;
        let pass = self.pass.as_mut().context("Scene pass missing")?;

        let draws: Vec<DrawCall> = frame_draws
            .batches
            .iter()
            .map(|batch| DrawCall {
                pipeline: batch.pipeline,
                mesh_key: pass.prepare_mesh(device, &batch.mesh),
                instances: batch.instances.clone(),
            })
            .collect();
        pass.write_globals(queue, &globals);
        pass.write_instances(device, queue, &frame_draws.instances);

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Scene Encoder") });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(CLEAR_COLOR), store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.draw(&mut render_pass, &draws);
        }
        queue.submit(Some(encoder.finish()));
        frame.present();

        let evicted = pass.evict_unused();
        if evicted > 0 {
            log::debug!("[renderer] evicted {evicted} GPU meshes ({} cached)", pass.cached_meshes());
        }
        Ok(())
    }

    fn collect_draws(&self, scene: &SceneManager) -> FrameDraws {
        let graph = scene.graph();
        let mut frame = FrameDraws::default();

        if let Some((slab, transform)) = scene.board_entity().and_then(|entity| graph.board(entity)) {
            let (color, shininess) = board_appearance(scene.resources(), &slab.material);
            let instance = InstanceRaw::new(transform.to_matrix(), color, VERTEX_ID_MARKER).with_shininess(shininess);
            frame.push(PipelineKind::Lit, &slab.mesh, &[instance]);
        }
        if let Some(batch) = graph.pad_batch() {
            frame.push(PipelineKind::Copper, &batch.geometry, &self.pad_instances);
        }
        for &(_, entity) in graph.interactables().traces() {
            let Some(trace) = graph.trace(entity) else {
                continue;
            };
            let model = graph.transform(entity).unwrap_or_default().to_matrix();
            frame.push(PipelineKind::Copper, &trace.mesh, &[InstanceRaw::new(model, COPPER_COLOR, VERTEX_ID_MARKER)]);
        }

        let handles: Vec<InstanceRaw> = scene.gizmo_handles().iter().filter_map(handle_instance).collect();
        frame.push(PipelineKind::Overlay, &self.handle_mesh, &handles);
        frame
    }
}

fn copper_depth_bias(scene: &SceneManager) -> DepthBias {
    match scene.resources().material(COPPER_MATERIAL) {
        Some(Material::Copper(copper)) => copper.depth_bias,
        _ => CopperMaterial::default().depth_bias,
    }
}

/// Colour and shininess of the board material, or the defaults when it is not cached.
fn board_appearance(resources: &ResourceCache, key: &str) -> ([f32; 3], f32) {
    match resources.material(key) {
        Some(Material::Phong(phong)) => (phong.color, phong.shininess),
        _ => (DEFAULT_BOARD_COLOR, BOARD_SHININESS),
    }
}

fn pad_instances(graph: &SceneGraph) -> Vec<InstanceRaw> {
    let Some(batch) = graph.pad_batch() else {
        return Vec::new();
    };
    batch
        .matrices
        .iter()
        .zip(batch.instance_ids.iter())
        .map(|(matrix, id)| InstanceRaw::new(*matrix, COPPER_COLOR, *id))
        .collect()
}

/// Stretches the unit cube along a handle segment.
fn handle_instance(segment: &HandleSegment) -> Option<InstanceRaw> {
    let delta = segment.end - segment.start;
    let length = delta.length();
    if length <= f32::EPSILON {
        return None;
    }
    let thickness = (length * HANDLE_THICKNESS_FRACTION).max(0.02);
    let rotation = Quat::from_rotation_arc(Vec3::X, delta / length);
    let model = Mat4::from_scale_rotation_translation(
        Vec3::new(length, thickness, thickness),
        rotation,
        segment.start + delta * 0.5,
    );
    let color = if segment.highlighted { HANDLE_HIGHLIGHT_COLOR } else { segment.axis.color() };
    Some(InstanceRaw::new(model, color, VERTEX_ID_MARKER))
}

fn frame_globals(scene: &SceneManager, viewport: PhysicalSize<u32>) -> Globals {
    let camera = scene.camera();
    let uniforms = match scene.resources().material(COPPER_MATERIAL) {
        Some(material) => material.interaction_uniforms().copied().unwrap_or_default(),
        None => Default::default(),
    };
    Globals {
        view_proj: camera.view_projection(viewport).to_cols_array_2d(),
        camera_pos: camera.position.extend(1.0).to_array(),
        light_dir: Vec3::from_array(LIGHT_DIR).normalize().extend(0.0).to_array(),
        interaction: [uniforms.hovered_id, uniforms.selected_id, uniforms.time, 0.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::gizmo::GizmoAxis;

    fn scene_with_basic_layout() -> SceneManager {
        let mut scene = SceneManager::new(&AppConfig::default(), PhysicalSize::new(800, 600));
        scene.load_sample_basic();
        scene
    }

    #[test]
    fn frame_draws_cover_board_pads_and_traces() {
        let mut scene = scene_with_basic_layout();
        let mut renderer = Renderer::new(&WindowConfig::default());
        assert!(scene.take_pad_batch_upload());
        renderer.pad_instances = pad_instances(scene.graph());

        let pad_count = scene.graph().pad_batch().map(|batch| batch.len()).unwrap_or(0);
        let trace_count = scene.graph().interactables().traces().len();
        let frame = renderer.collect_draws(&scene);

        assert_eq!(frame.instances.len(), 1 + pad_count + trace_count);
        assert_eq!(frame.batches.len(), 2 + trace_count);
        assert_eq!(frame.batches[0].pipeline, PipelineKind::Lit);
        assert_eq!(frame.batches[1].instances, 1..1 + pad_count as u32);
        assert!(!scene.take_pad_batch_upload(), "flag is cleared once taken");
    }

    #[test]
    fn board_draw_reads_cached_material() {
        let mut config = AppConfig::default();
        config.board.color = "#ff0000".into();
        let scene = SceneManager::new(&config, PhysicalSize::new(800, 600));
        let renderer = Renderer::new(&WindowConfig::default());
        let frame = renderer.collect_draws(&scene);
        let board = frame.instances[frame.batches[0].instances.start as usize];
        assert_eq!(board.color[..3], [1.0, 0.0, 0.0]);
        assert_eq!(board.params[1], BOARD_SHININESS);

        assert_eq!(board_appearance(&ResourceCache::new(), "missing"), (DEFAULT_BOARD_COLOR, BOARD_SHININESS));
    }

    #[test]
    fn pad_instances_carry_index_ids() {
        let scene = scene_with_basic_layout();
        let instances = pad_instances(scene.graph());
        for (index, instance) in instances.iter().enumerate() {
            assert_eq!(instance.params[0], index as f32);
        }
    }

    #[test]
    fn handle_instance_spans_segment() {
        let segment = HandleSegment {
            axis: GizmoAxis::X,
            start: Vec3::new(1.0, 0.0, 2.0),
            end: Vec3::new(11.0, 0.0, 2.0),
            highlighted: false,
        };
        let instance = handle_instance(&segment).expect("non-degenerate segment");
        let model = Mat4::from_cols_array_2d(&instance.model);
        let tip = model.transform_point3(Vec3::new(0.5, 0.0, 0.0));
        assert!((tip - segment.end).length() < 1e-4);
        assert_eq!(instance.color[..3], GizmoAxis::X.color());

        let degenerate = HandleSegment { end: segment.start, ..segment };
        assert!(handle_instance(&degenerate).is_none());
    }

    #[test]
    fn globals_mirror_copper_uniforms() {
        let mut scene = scene_with_basic_layout();
        scene.tick(2.5);
        let globals = frame_globals(&scene, PhysicalSize::new(800, 600));
        assert_eq!(globals.interaction[2], 2.5);
        assert_eq!(globals.interaction[0], -1.0);
        assert_eq!(globals.camera_pos[3], 1.0);
    }
}
