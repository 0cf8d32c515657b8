//! Top-level scene orchestration: builders, pointer routing, gizmo attachment, the
//! per-frame proxy sync and layout import/export.

use crate::board::BoardBuilder;
use crate::camera3d::{Camera3D, OrbitControls};
use crate::config::AppConfig;
use crate::events::{EditorEvent, EventBus};
use crate::gizmo::{HandleSegment, TranslateGizmo};
use crate::input_controller::{CameraSettings, InputController, PointerButton, PointerEvent};
use crate::interaction::Selection;
use crate::layout::{sample_basic_layout, sample_grid_layout, BoardSpec, LayoutDocument};
use crate::primitives::PrimitivesBuilder;
use crate::resources::ResourceCache;
use crate::scene_graph::{GizmoProxy, SceneGraph, Transform3D};
use bevy_ecs::prelude::Entity;
use glam::Vec3;
use winit::dpi::PhysicalSize;

pub type SelectionListener = Box<dyn FnMut(Option<&Selection>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Gizmo proxy standing in for instance `pad_index` of the pad batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProxyBinding {
    entity: Entity,
    pad_index: usize,
}

pub struct SceneManager {
    graph: SceneGraph,
    resources: ResourceCache,
    board: BoardBuilder,
    primitives: PrimitivesBuilder,
    input: InputController,
    gizmo: TranslateGizmo,
    proxy: Option<ProxyBinding>,
    selection: Option<Selection>,
    listeners: Vec<(SubscriptionId, SelectionListener)>,
    next_subscription: u64,
    board_color: [f32; 3],
    default_thickness: f32,
    events: EventBus,
    disposed: bool,
}

impl SceneManager {
    /// Builds an empty scene with the default board.
    pub fn new(config: &AppConfig, viewport: PhysicalSize<u32>) -> Self {
        let camera = &config.camera;
        let mut orbit = OrbitControls::looking_at(Vec3::from_array(camera.position), Vec3::from_array(camera.target));
        orbit.rotate_speed = camera.rotate_speed;
        orbit.zoom_speed = camera.zoom_speed;
        let settings = CameraSettings { fov_y_radians: camera.fov_y_radians(), near: camera.near, far: camera.far };

        let mut manager = Self {
            graph: SceneGraph::new(),
            resources: ResourceCache::new(),
            board: BoardBuilder::new(),
            primitives: PrimitivesBuilder::new(),
            input: InputController::new(orbit, settings, viewport),
            gizmo: TranslateGizmo::new(),
            proxy: None,
            selection: None,
            listeners: Vec::new(),
            next_subscription: 0,
            board_color: config.board.color_rgb(),
            default_thickness: config.board.thickness,
            events: EventBus::default(),
            disposed: false,
        };
        let spec = BoardSpec { thickness: manager.default_thickness, ..BoardSpec::default() };
        manager.board.create_board(&mut manager.graph, &mut manager.resources, spec, manager.board_color);
        manager
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn camera(&self) -> &Camera3D {
        self.input.camera()
    }

    pub fn gizmo(&self) -> &TranslateGizmo {
        &self.gizmo
    }

    pub fn board_entity(&self) -> Option<Entity> {
        self.board.entity()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_viewport(&mut self, viewport: PhysicalSize<u32>) {
        self.input.set_viewport(viewport);
    }

    pub fn gizmo_handles(&self) -> Vec<HandleSegment> {
        self.gizmo.handle_segments(&self.graph, self.input.camera())
    }

    /// True when pad instance matrices changed since the last call.
    pub fn take_pad_batch_upload(&mut self) -> bool {
        self.graph.pad_batch_mut().is_some_and(|mut batch| batch.take_needs_upload())
    }

    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        self.events.drain()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(Option<&Selection>) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Routes one pointer event: the gizmo sees it first, then the input controller.
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        if self.disposed {
            return;
        }
        let camera = self.input.camera().clone();
        let viewport = self.input.viewport();
        match event {
            PointerEvent::Move { position } => {
                self.gizmo.pointer_move(&mut self.graph, &camera, viewport, position);
                let gizmo_dragging = self.gizmo.is_dragging();
                self.input.pointer_move(&mut self.graph, &mut self.resources, position, gizmo_dragging);
            }
            PointerEvent::Down { button, position } => {
                let consumed = button == PointerButton::Primary
                    && self.gizmo.pointer_down(&self.graph, &camera, viewport, position);
                self.input.pointer_down(&mut self.graph, &mut self.resources, button, position, consumed);
            }
            PointerEvent::Up { button, .. } => {
                if button == PointerButton::Primary && self.gizmo.pointer_up() {
                    self.flush_attached();
                }
                self.input.pointer_up(button);
            }
            PointerEvent::Wheel { delta } => self.input.wheel(delta),
        }
        self.dispatch_input_events();
    }

    /// Per-frame sync: proxy translation into the pad instance, drags into retained records.
    pub fn tick(&mut self, elapsed_seconds: f32) {
        if self.disposed {
            return;
        }
        self.flush_attached();
        self.resources.set_time(elapsed_seconds);
    }

    /// Re-targets the gizmo for `data`. Lookup failures leave the gizmo detached.
    pub fn handle_selection(&mut self, data: Option<&Selection>) {
        self.flush_attached();
        self.gizmo.detach();
        self.discard_proxy();

        match data {
            None => {}
            Some(Selection::Pad { id, interaction_id, .. }) => {
                let by_index = self.graph.pad_batch().and_then(|batch| {
                    let index = interaction_id.0 as usize;
                    batch.records.get(index).filter(|record| record.id == *id).map(|_| index)
                });
                let Some(pad_index) = by_index.or_else(|| self.primitives.pad_index(&self.graph, id)) else {
                    log::debug!("[scene] pad '{id}' not found; nothing to attach");
                    return;
                };
                let Some(matrix) = self.graph.pad_batch().and_then(|batch| batch.matrix_at(pad_index)) else {
                    return;
                };
                let entity = self.graph.world.spawn((Transform3D::from_matrix(&matrix), GizmoProxy)).id();
                self.proxy = Some(ProxyBinding { entity, pad_index });
                self.gizmo.attach(entity);
                log::debug!("[gizmo] attached to proxy for pad '{id}' (instance {pad_index})");
            }
            Some(Selection::Trace { id, .. }) => match self.primitives.trace_entity(&self.graph, id) {
                Some(entity) => {
                    self.gizmo.attach(entity);
                    log::debug!("[gizmo] attached to trace '{id}'");
                }
                None => log::debug!("[scene] trace '{id}' not found; nothing to attach"),
            },
        }
    }

    /// Snapshot of the retained board, pad and trace records.
    pub fn export_layout(&mut self) -> LayoutDocument {
        self.flush_attached();
        let board = self.board.spec().unwrap_or_default();
        let pads = self.primitives.pad_records(&self.graph);
        let traces = self.primitives.trace_records(&self.graph);
        LayoutDocument::new(board, &pads, &traces)
    }

    /// Destructive replace. An absent `board` or `components` leaves that part untouched;
    /// the selection is always cleared.
    pub fn load_layout(&mut self, document: &LayoutDocument) {
        if self.disposed {
            return;
        }
        self.clear_selection();

        if let Some(board) = document.board {
            self.board.create_board(&mut self.graph, &mut self.resources, board, self.board_color);
        }
        if let Some(parts) = document.partition() {
            self.primitives.create_pads(&mut self.graph, &mut self.resources, &parts.pads);
            self.primitives.create_traces(&mut self.graph, &mut self.resources, &parts.traces);
            log::info!("[scene] loaded layout: {} pads, {} traces", parts.pads.len(), parts.traces.len());
            self.events.push(EditorEvent::LayoutLoaded { pads: parts.pads.len(), traces: parts.traces.len() });
        }
    }

    pub fn load_sample_grid(&mut self) {
        self.load_layout(&sample_grid_layout());
    }

    pub fn load_sample_basic(&mut self) {
        self.load_layout(&sample_basic_layout());
    }

    pub fn clear_selection(&mut self) {
        if self.disposed {
            return;
        }
        self.input.reset_selection(&mut self.resources);
        self.input.drain_events();
        self.apply_selection(None);
    }

    /// Tears the scene down: gizmo, input, listeners, geometry, then shared resources.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.gizmo.detach();
        self.discard_proxy();
        self.input.dispose();
        self.listeners.clear();
        self.board.dispose(&mut self.graph);
        self.primitives.dispose(&mut self.graph);
        self.resources.dispose_all();
        self.selection = None;
        self.disposed = true;
        log::debug!("[scene] disposed");
    }

    fn dispatch_input_events(&mut self) {
        for event in self.input.drain_events() {
            match event {
                EditorEvent::SelectionChanged(selection) => self.apply_selection(selection),
                other => self.events.push(other),
            }
        }
    }

    fn apply_selection(&mut self, selection: Option<Selection>) {
        self.handle_selection(selection.as_ref());
        match &selection {
            Some(selected) => log::debug!("[scene] selected {selected}"),
            None => log::debug!("[scene] selection cleared"),
        }
        for (_, listener) in self.listeners.iter_mut() {
            listener(selection.as_ref());
        }
        self.events.push(EditorEvent::SelectionChanged(selection.clone()));
        self.selection = selection;
    }

    /// Pushes the gizmo target's transform into retained data.
    fn flush_attached(&mut self) {
        let Some(object) = self.gizmo.object() else {
            return;
        };
        if let Some(binding) = self.proxy.filter(|binding| binding.entity == object) {
            self.sync_proxy(binding);
        } else if self.graph.trace(object).is_some() {
            self.graph.write_back_trace(object);
        }
    }

    fn sync_proxy(&mut self, binding: ProxyBinding) {
        let Some(proxy) = self.graph.transform(binding.entity) else {
            return;
        };
        let Some(mut batch) = self.graph.pad_batch_mut() else {
            return;
        };
        let Some(mut matrix) = batch.matrix_at(binding.pad_index) else {
            return;
        };
        if matrix.w_axis.truncate() == proxy.translation {
            return;
        }
        matrix.w_axis = proxy.translation.extend(1.0);
        batch.set_matrix_at(binding.pad_index, matrix);
        if let Some(record) = batch.records.get_mut(binding.pad_index) {
            record.pos = proxy.translation.to_array();
        }
    }

    fn discard_proxy(&mut self) {
        if let Some(binding) = self.proxy.take() {
            self.graph.despawn(binding.entity);
        }
    }
}

impl Drop for SceneManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
