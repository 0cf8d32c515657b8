//! Persisted board layout: the flat JSON document exchanged with the file boundary.
//!
//! Parsing is the only fallible step. Once a [`LayoutDocument`] exists the scene core
//! treats it as well typed; missing `board` or `components` mean "nothing to update".

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_BOARD_THICKNESS: f32 = 1.6;
pub const DEFAULT_TRACE_WIDTH: f32 = 0.5;
/// Serialized `type` of exported traces.
pub const TRACE_TYPE_TAG: &str = "path";

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to parse layout JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to access layout file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

const fn default_thickness() -> f32 {
    DEFAULT_BOARD_THICKNESS
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub width: f32,
    pub height: f32,
    #[serde(default = "default_thickness")]
    pub thickness: f32,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self { width: 100.0, height: 80.0, thickness: DEFAULT_BOARD_THICKNESS }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PadRecord {
    pub id: String,
    /// x, height above board, z.
    pub pos: [f32; 3],
    /// width, depth.
    pub size: [f32; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub id: String,
    /// Board-plane points `[x, z]`. Only the first two produce geometry.
    pub points: Vec<[f32; 2]>,
    pub width: f32,
    pub numeric_id: u32,
}

/// One entry of `components`. Pads and traces share the array; the kind is inferred from
/// `type` and from which fields are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[f32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<[f32; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(rename = "numericId", default, skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<u32>,
}

impl ComponentRecord {
    pub fn is_pad(&self) -> bool {
        self.kind.as_deref() == Some("pad") || self.pos.is_some() || self.size.is_some()
    }

    pub fn is_trace(&self) -> bool {
        self.kind.as_deref() == Some("trace") || self.points.is_some()
    }

    pub fn to_pad(&self) -> Option<PadRecord> {
        Some(PadRecord { id: self.id.clone(), pos: self.pos?, size: self.size? })
    }

    pub fn to_trace(&self) -> Option<TraceRecord> {
        Some(TraceRecord {
            id: self.id.clone(),
            points: self.points.clone()?,
            width: self.width.unwrap_or(DEFAULT_TRACE_WIDTH),
            numeric_id: self.numeric_id.unwrap_or(0),
        })
    }
}

impl From<&PadRecord> for ComponentRecord {
    fn from(pad: &PadRecord) -> Self {
        Self { id: pad.id.clone(), pos: Some(pad.pos), size: Some(pad.size), ..Default::default() }
    }
}

impl From<&TraceRecord> for ComponentRecord {
    fn from(trace: &TraceRecord) -> Self {
        Self {
            id: trace.id.clone(),
            kind: Some(TRACE_TYPE_TAG.to_string()),
            points: Some(trace.points.clone()),
            width: Some(trace.width),
            numeric_id: Some(trace.numeric_id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<ComponentRecord>>,
}

/// Pads and traces split out of a `components` array. A record matching both predicates
/// lands in both lists; records missing required fields are dropped with a warning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionedComponents {
    pub pads: Vec<PadRecord>,
    pub traces: Vec<TraceRecord>,
}

impl LayoutDocument {
    pub fn new(board: BoardSpec, pads: &[PadRecord], traces: &[TraceRecord]) -> Self {
        let components = pads.iter().map(ComponentRecord::from).chain(traces.iter().map(ComponentRecord::from));
        Self { board: Some(board), components: Some(components.collect()) }
    }

    pub fn from_json_str(json: &str) -> Result<Self, LayoutError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, LayoutError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, LayoutError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value, LayoutError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|source| LayoutError::Io { path: path.display().to_string(), source })?;
        Self::from_json_str(&contents)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), LayoutError> {
        let path = path.as_ref();
        let json = self.to_json_string_pretty()?;
        fs::write(path, json).map_err(|source| LayoutError::Io { path: path.display().to_string(), source })
    }

    pub fn partition(&self) -> Option<PartitionedComponents> {
        let components = self.components.as_ref()?;
        let mut out = PartitionedComponents::default();
        for record in components {
            if record.is_pad() {
                match record.to_pad() {
                    Some(pad) => out.pads.push(pad),
                    None => log::warn!("[layout] pad '{}' is missing pos or size; skipped", record.id),
                }
            }
            if record.is_trace() {
                match record.to_trace() {
                    Some(trace) => out.traces.push(trace),
                    None => log::warn!("[layout] trace '{}' has no points; skipped", record.id),
                }
            }
        }
        Some(out)
    }
}

/// 10×10 pad grid on a 100×80 board with one trace snaking through every pad.
pub fn sample_grid_layout() -> LayoutDocument {
    const GRID: usize = 10;
    const SPACING_X: f32 = 8.0;
    const SPACING_Z: f32 = 6.0;
    const START_X: f32 = -36.0;
    const START_Z: f32 = -27.0;

    let grid_point = |row: usize, col: usize| {
        [START_X + col as f32 * SPACING_X, START_Z + row as f32 * SPACING_Z]
    };

    let mut pads = Vec::with_capacity(GRID * GRID);
    for row in 0..GRID {
        for col in 0..GRID {
            let [x, z] = grid_point(row, col);
            pads.push(PadRecord { id: format!("pad-{}", row * GRID + col), pos: [x, 0.05, z], size: [2.0, 2.0] });
        }
    }

    let mut points = Vec::with_capacity(GRID * GRID);
    for row in 0..GRID {
        if row % 2 == 0 {
            points.extend((0..GRID).map(|col| grid_point(row, col)));
        } else {
            points.extend((0..GRID).rev().map(|col| grid_point(row, col)));
        }
    }
    let trace = TraceRecord { id: "trace-all".to_string(), points, width: 0.25, numeric_id: 1 };

    LayoutDocument::new(BoardSpec::default(), &pads, &[trace])
}

/// Three pads and two crossing traces.
pub fn sample_basic_layout() -> LayoutDocument {
    let pads = [
        PadRecord { id: "pad-1".into(), pos: [10.0, 0.05, 10.0], size: [10.0, 10.0] },
        PadRecord { id: "pad-2".into(), pos: [-10.0, 0.05, -10.0], size: [3.0, 3.0] },
        PadRecord { id: "pad-3".into(), pos: [20.0, 0.05, -5.0], size: [4.0, 6.0] },
    ];
    let traces = [
        TraceRecord {
            id: "trace-1".into(),
            points: vec![[10.0, 10.0], [-10.0, -10.0]],
            width: 10.0,
            numeric_id: 1,
        },
        TraceRecord {
            id: "trace-2".into(),
            points: vec![[11.0, 11.0], [-11.0, -11.0]],
            width: 10.0,
            numeric_id: 2,
        },
    ];
    LayoutDocument::new(BoardSpec::default(), &pads, &traces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_uses_type_and_fields() {
        let doc = LayoutDocument::from_json_str(
            r#"{"components":[
                {"id":"p1","pos":[0,0,0],"size":[2,2]},
                {"id":"p2","type":"pad","pos":[1,0,1],"size":[1,1]},
                {"id":"t1","type":"path","points":[[0,0],[10,0]],"width":1,"numericId":5},
                {"id":"t2","type":"trace","points":[[0,0],[0,4]]}
            ]}"#,
        )
        .expect("parse");
        assert!(doc.board.is_none());
        let parts = doc.partition().expect("components present");
        assert_eq!(parts.pads.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), ["p1", "p2"]);
        assert_eq!(parts.traces.len(), 2);
        assert_eq!(parts.traces[0].numeric_id, 5);
        assert_eq!(parts.traces[1].width, DEFAULT_TRACE_WIDTH);
        assert_eq!(parts.traces[1].numeric_id, 0);
    }

    #[test]
    fn missing_components_is_not_an_error() {
        let doc = LayoutDocument::from_json_str(r#"{"board":{"width":10,"height":5}}"#).expect("parse");
        assert!(doc.partition().is_none());
        assert_eq!(doc.board.map(|b| b.thickness), Some(DEFAULT_BOARD_THICKNESS));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err = LayoutDocument::from_json_str(r#"{"board": "wide"}"#).unwrap_err();
        assert!(matches!(err, LayoutError::Parse(_)));
    }

    #[test]
    fn exported_trace_shape_matches_file_format() {
        let trace = TraceRecord { id: "t".into(), points: vec![[0.0, 0.0], [1.0, 0.0]], width: 0.3, numeric_id: 7 };
        let value = serde_json::to_value(ComponentRecord::from(&trace)).expect("serialize");
        assert_eq!(value["type"], "path");
        assert_eq!(value["numericId"], 7);
        assert!(value.get("pos").is_none());
        let pad = PadRecord { id: "p".into(), pos: [1.0, 0.05, 2.0], size: [2.0, 3.0] };
        let value = serde_json::to_value(ComponentRecord::from(&pad)).expect("serialize");
        assert!(value.get("type").is_none());
        assert_eq!(value["size"][1], 3.0);
    }

    #[test]
    fn grid_sample_has_hundred_pads_and_one_trace() {
        let parts = sample_grid_layout().partition().expect("components");
        assert_eq!(parts.pads.len(), 100);
        assert_eq!(parts.traces.len(), 1);
        assert_eq!(parts.traces[0].points.len(), 100);
        assert_eq!(parts.traces[0].points[10], [36.0, -21.0]);
    }
}
