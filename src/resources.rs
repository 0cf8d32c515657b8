use crate::mesh::Mesh;
use std::collections::HashMap;
use std::sync::Arc;

pub const COPPER_MATERIAL: &str = "copper";
pub const PAD_GEOMETRY: &str = "pad_unit_box";
pub const BOARD_SHININESS: f32 = 30.0;

/// Hover/selection state mirrored into every interactable material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionUniforms {
    pub hovered_id: f32,
    pub selected_id: f32,
    pub time: f32,
}

impl Default for InteractionUniforms {
    fn default() -> Self {
        Self { hovered_id: -1.0, selected_id: -1.0, time: 0.0 }
    }
}

/// Constant depth offset applied to copper so it wins against the board top at y = 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    pub constant: i32,
    pub slope_scale: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CopperMaterial {
    pub uniforms: InteractionUniforms,
    pub depth_bias: DepthBias,
}

impl Default for CopperMaterial {
    fn default() -> Self {
        Self {
            uniforms: InteractionUniforms::default(),
            depth_bias: DepthBias { constant: -1, slope_scale: -1.0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhongMaterial {
    pub color: [f32; 3],
    pub shininess: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Copper(CopperMaterial),
    Phong(PhongMaterial),
}

impl Material {
    pub fn copper() -> Self {
        Material::Copper(CopperMaterial::default())
    }

    pub fn board(color: [f32; 3]) -> Self {
        Material::Phong(PhongMaterial { color, shininess: BOARD_SHININESS })
    }

    pub fn interaction_uniforms(&self) -> Option<&InteractionUniforms> {
        match self {
            Material::Copper(copper) => Some(&copper.uniforms),
            Material::Phong(_) => None,
        }
    }
}

/// Cache key of the board material for `color`. Entries are never invalidated, so a
/// different colour gets its own key.
pub fn board_material_key(color: [f32; 3]) -> String {
    let [r, g, b] = color.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8);
    format!("board_phong_#{r:02x}{g:02x}{b:02x}")
}

/// Memoized registry of shared materials and base geometries, keyed by name.
///
/// Entries live until [`ResourceCache::dispose_all`]; there is no per-entry invalidation.
#[derive(Default)]
pub struct ResourceCache {
    materials: HashMap<String, Material>,
    geometries: HashMap<String, Arc<Mesh>>,
    created: usize,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_material(&mut self, name: &str, factory: impl FnOnce() -> Material) -> &Material {
        let created = &mut self.created;
        self.materials.entry(name.to_string()).or_insert_with(|| {
            *created += 1;
            factory()
        })
    }

    pub fn get_geometry(&mut self, name: &str, factory: impl FnOnce() -> Mesh) -> Arc<Mesh> {
        let created = &mut self.created;
        self.geometries
            .entry(name.to_string())
            .or_insert_with(|| {
                *created += 1;
                Arc::new(factory())
            })
            .clone()
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    pub fn geometry(&self, name: &str) -> Option<&Arc<Mesh>> {
        self.geometries.get(name)
    }

    pub fn materials_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.materials.values_mut()
    }

    /// Writes hover/selection ids into every material that carries interaction uniforms.
    pub fn set_interaction_ids(&mut self, hovered_id: f32, selected_id: f32) {
        for material in self.materials_mut() {
            if let Material::Copper(copper) = material {
                copper.uniforms.hovered_id = hovered_id;
                copper.uniforms.selected_id = selected_id;
            }
        }
    }

    pub fn set_time(&mut self, seconds: f32) {
        for material in self.materials_mut() {
            if let Material::Copper(copper) = material {
                copper.uniforms.time = seconds;
            }
        }
    }

    /// Number of factory invocations so far.
    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn len(&self) -> usize {
        self.materials.len() + self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases every cached resource. Safe to call on an empty cache.
    pub fn dispose_all(&mut self) -> usize {
        let released = self.len();
        self.materials.clear();
        self.geometries.clear();
        if released > 0 {
            log::debug!("[resources] released {released} cached resources");
        }
        released
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        if !self.is_empty() {
            log::warn!("[resources] cache dropped with {} live resources; call dispose_all first", self.len());
        }
    }
}
