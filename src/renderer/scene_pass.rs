use crate::mesh::{Mesh, MeshVertex};
use crate::resources::DepthBias;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

use super::DEPTH_FORMAT;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub(super) struct Globals {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub light_dir: [f32; 4],
    pub interaction: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub(super) struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub params: [f32; 4],
}

impl InstanceRaw {
    const ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
        3 => Float32x4,
        4 => Float32x4,
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4
    ];

    pub fn new(model: glam::Mat4, color: [f32; 3], instance_id: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: [color[0], color[1], color[2], 1.0],
            params: [instance_id, 0.0, 0.0, 0.0],
        }
    }

    pub fn with_shininess(mut self, shininess: f32) -> Self {
        self.params[1] = shininess;
        self
    }

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum PipelineKind {
    /// Board slab, depth tested.
    Lit,
    /// Pads and traces, depth biased towards the camera, hover/select highlight.
    Copper,
    /// Gizmo handles, drawn on top.
    Overlay,
}

pub(super) struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    /// Keeps the keyed address alive while cached.
    _source: Arc<Mesh>,
    used_this_frame: bool,
}

/// One draw: a cached mesh and a range into the frame's instance buffer.
pub(super) struct DrawCall {
    pub pipeline: PipelineKind,
    pub mesh_key: usize,
    pub instances: std::ops::Range<u32>,
}

pub(super) struct ScenePass {
    lit: wgpu::RenderPipeline,
    copper: wgpu::RenderPipeline,
    overlay: wgpu::RenderPipeline,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    instance_buffer: Option<wgpu::Buffer>,
    instance_capacity: usize,
    meshes: HashMap<usize, GpuMesh>,
}

impl ScenePass {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, copper_bias: DepthBias) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/scene.wgsl").into()),
        });
        let globals_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Globals BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Globals Buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Globals BG"),
            layout: &globals_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: globals_buffer.as_entire_binding() }],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&globals_bgl],
            push_constant_ranges: &[],
        });

        let depth = |write: bool, compare: wgpu::CompareFunction, bias: wgpu::DepthBiasState| {
            wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: write,
                depth_compare: compare,
                stencil: wgpu::StencilState::default(),
                bias,
            }
        };
        let copper_bias = wgpu::DepthBiasState {
            constant: copper_bias.constant,
            slope_scale: copper_bias.slope_scale,
            clamp: 0.0,
        };
        let lit = create_pipeline(
            device,
            &layout,
            &shader,
            format,
            "Board Pipeline",
            "fs_board",
            depth(true, wgpu::CompareFunction::Less, wgpu::DepthBiasState::default()),
        );
        let copper = create_pipeline(
            device,
            &layout,
            &shader,
            format,
            "Copper Pipeline",
            "fs_copper",
            depth(true, wgpu::CompareFunction::LessEqual, copper_bias),
        );
        let overlay = create_pipeline(
            device,
            &layout,
            &shader,
            format,
            "Gizmo Pipeline",
            "fs_board",
            depth(false, wgpu::CompareFunction::Always, wgpu::DepthBiasState::default()),
        );

        Self {
            lit,
            copper,
            overlay,
            globals_buffer,
            globals_bind_group,
            instance_buffer: None,
            instance_capacity: 0,
            meshes: HashMap::new(),
        }
    }

    /// Uploads `mesh` on first use and returns its cache key. The key is the `Arc`
    /// address; the cache holds a clone so the address stays unique while cached.
    pub fn prepare_mesh(&mut self, device: &wgpu::Device, mesh: &Arc<Mesh>) -> usize {
        let key = Arc::as_ptr(mesh) as usize;
        let entry = self.meshes.entry(key).or_insert_with(|| {
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Mesh VB"),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Mesh IB"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.indices.len() as u32,
                _source: Arc::clone(mesh),
                used_this_frame: false,
            }
        });
        entry.used_this_frame = true;
        key
    }

    /// Drops GPU meshes that no draw referenced since the last call.
    pub fn evict_unused(&mut self) -> usize {
        let before = self.meshes.len();
        self.meshes.retain(|_, mesh| std::mem::take(&mut mesh.used_this_frame));
        before - self.meshes.len()
    }

    pub fn cached_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn write_globals(&self, queue: &wgpu::Queue, globals: &Globals) {
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(globals));
    }

    pub fn write_instances(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, instances: &[InstanceRaw]) {
        self.ensure_instance_capacity(device, instances.len());
        if let Some(buffer) = self.instance_buffer.as_ref() {
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(instances));
        }
    }

    fn ensure_instance_capacity(&mut self, device: &wgpu::Device, count: usize) {
        if self.instance_capacity >= count && self.instance_buffer.is_some() {
            return;
        }
        let mut new_cap = self.instance_capacity.max(256);
        while new_cap < count {
            new_cap *= 2;
        }
        let size = (new_cap * std::mem::size_of::<InstanceRaw>()) as u64;
        self.instance_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Instance Buffer"),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.instance_capacity = new_cap;
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, draws: &[DrawCall]) {
        let Some(instance_buffer) = self.instance_buffer.as_ref() else {
            return;
        };
        pass.set_bind_group(0, &self.globals_bind_group, &[]);
        pass.set_vertex_buffer(1, instance_buffer.slice(..));
        let mut bound: Option<PipelineKind> = None;
        for draw in draws {
            let Some(mesh) = self.meshes.get(&draw.mesh_key) else {
                continue;
            };
            if draw.instances.is_empty() || mesh.index_count == 0 {
                continue;
            }
            if bound != Some(draw.pipeline) {
                pass.set_pipeline(match draw.pipeline {
                    PipelineKind::Lit => &self.lit,
                    PipelineKind::Copper => &self.copper,
                    PipelineKind::Overlay => &self.overlay,
                });
                bound = Some(draw.pipeline);
            }
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, draw.instances.clone());
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    label: &str,
    fragment_entry: &str,
    depth_stencil: wgpu::DepthStencilState,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[MeshVertex::layout(), InstanceRaw::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(depth_stencil),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_layout_matches_struct() {
        assert_eq!(std::mem::size_of::<InstanceRaw>(), 96);
        assert_eq!(InstanceRaw::ATTRIBUTES[5].offset, 80);
        assert_eq!(std::mem::size_of::<Globals>(), 112);
    }

    #[test]
    fn instance_carries_id_and_opaque_color() {
        let raw = InstanceRaw::new(glam::Mat4::IDENTITY, [0.8, 0.5, 0.2], 7.0);
        assert_eq!(raw.params[0], 7.0);
        assert_eq!(raw.color[3], 1.0);
    }
}
