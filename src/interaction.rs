use bevy_ecs::prelude::Entity;
use glam::{Vec2, Vec3};
use serde::Serialize;
use std::fmt;

/// First interaction id handed to traces. Pads occupy `[0, pad_count)` below it.
pub const TRACE_ID_BASE: u32 = 10_000;

/// Identifier used for hover/select bookkeeping and by the copper shader.
///
/// Pad ids are batch indices and become stale whenever the pad batch is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InteractionId(pub u32);

impl InteractionId {
    pub fn pad(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn trace(numeric_id: u32) -> Self {
        Self(TRACE_ID_BASE.saturating_add(numeric_id))
    }

    pub fn is_trace(self) -> bool {
        self.0 >= TRACE_ID_BASE
    }

    /// Uniform encoding: the id as a float, `-1.0` for none.
    pub fn uniform_value(id: Option<Self>) -> f32 {
        id.map_or(-1.0, |id| id.0 as f32)
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an interaction id resolves to. Filled in by the builders at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Instance `index` of the pad batch.
    Pad { index: usize },
    /// A trace entity; its transform can be manipulated directly.
    Trace { entity: Entity },
}

/// Selection record reported to the surrounding UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Selection {
    Pad {
        id: String,
        #[serde(skip)]
        interaction_id: InteractionId,
        pos: [f32; 3],
        size: [f32; 2],
    },
    Trace {
        id: String,
        #[serde(skip)]
        interaction_id: InteractionId,
    },
}

impl Selection {
    pub fn id(&self) -> &str {
        match self {
            Selection::Pad { id, .. } | Selection::Trace { id, .. } => id,
        }
    }

    pub fn interaction_id(&self) -> InteractionId {
        match self {
            Selection::Pad { interaction_id, .. } | Selection::Trace { interaction_id, .. } => *interaction_id,
        }
    }

    pub fn position(&self) -> Option<Vec3> {
        match self {
            Selection::Pad { pos, .. } => Some(Vec3::from_array(*pos)),
            Selection::Trace { .. } => None,
        }
    }

    pub fn size(&self) -> Option<Vec2> {
        match self {
            Selection::Pad { size, .. } => Some(Vec2::from_array(*size)),
            Selection::Trace { .. } => None,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Pad { id, interaction_id, pos, size } => write!(
                f,
                "pad '{id}' {interaction_id} at ({:.2}, {:.2}, {:.2}) size {:.2}x{:.2}",
                pos[0], pos[1], pos[2], size[0], size[1]
            ),
            Selection::Trace { id, interaction_id } => write!(f, "trace '{id}' {interaction_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_ranges_are_disjoint() {
        assert!(!InteractionId::pad(9_999).is_trace());
        assert!(InteractionId::trace(0).is_trace());
        assert_eq!(InteractionId::trace(5), InteractionId(10_005));
    }

    #[test]
    fn uniform_encoding_uses_minus_one_for_none() {
        assert_eq!(InteractionId::uniform_value(None), -1.0);
        assert_eq!(InteractionId::uniform_value(Some(InteractionId(10_001))), 10_001.0);
    }

    #[test]
    fn selection_serializes_for_ui() {
        let pad = Selection::Pad {
            id: "p1".into(),
            interaction_id: InteractionId(0),
            pos: [1.0, 0.05, 2.0],
            size: [2.0, 2.0],
        };
        let value = serde_json::to_value(&pad).expect("serialize");
        assert_eq!(value["type"], "pad");
        assert_eq!(value["id"], "p1");
        assert!(value.get("interaction_id").is_none());
        let trace = Selection::Trace { id: "t1".into(), interaction_id: InteractionId(10_001) };
        assert_eq!(serde_json::to_value(&trace).expect("serialize")["type"], "trace");
    }
}
