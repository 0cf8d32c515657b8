use copperlab::config::AppConfig;
use copperlab::interaction::{InteractionId, Primitive};
use copperlab::layout::{sample_basic_layout, BoardSpec, LayoutDocument};
use copperlab::SceneManager;
use winit::dpi::PhysicalSize;

fn scene() -> SceneManager {
    SceneManager::new(&AppConfig::default(), PhysicalSize::new(800, 600))
}

#[test]
fn import_then_export_preserves_board_pad_and_trace() {
    let document = LayoutDocument::from_json_str(
        r#"{
            "board": {"width": 50, "height": 40, "thickness": 1},
            "components": [
                {"id": "p1", "pos": [0, 0, 0], "size": [2, 2]},
                {"id": "t1", "type": "path", "points": [[0, 0], [10, 0]], "width": 1, "numericId": 5}
            ]
        }"#,
    )
    .expect("layout parses");

    let mut scene = scene();
    scene.load_layout(&document);

    let exported = scene.export_layout();
    assert_eq!(exported.board, Some(BoardSpec { width: 50.0, height: 40.0, thickness: 1.0 }));
    let parts = exported.partition().expect("components exported");
    assert_eq!(parts.pads.len(), 1);
    assert_eq!(parts.pads[0].id, "p1");
    assert_eq!(parts.traces.len(), 1);
    assert_eq!(parts.traces[0].id, "t1");
    assert_eq!(parts.traces[0].numeric_id, 5);
    assert!(matches!(scene.graph().resolve(InteractionId(10_005)), Some(Primitive::Trace { .. })));
    assert!(matches!(scene.graph().resolve(InteractionId(0)), Some(Primitive::Pad { index: 0 })));
}

#[test]
fn exported_file_reloads_into_identical_scene() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("layout.json");

    let mut scene = scene();
    scene.load_sample_basic();
    let first = scene.export_layout();
    first.save_to_path(&path).expect("save layout");

    let reloaded = LayoutDocument::load_from_path(&path).expect("load layout");
    let mut other = self::scene();
    other.load_layout(&reloaded);
    assert_eq!(other.export_layout(), first);
    assert_eq!(first, sample_basic_layout());
}

#[test]
fn board_only_document_keeps_components() {
    let mut scene = scene();
    scene.load_sample_basic();
    let board_only = LayoutDocument::from_json_str(r#"{"board":{"width":20,"height":10}}"#).expect("parse");
    scene.load_layout(&board_only);

    let exported = scene.export_layout();
    assert_eq!(exported.board.map(|board| (board.width, board.height)), Some((20.0, 10.0)));
    let parts = exported.partition().expect("components");
    assert_eq!(parts.pads.len(), 3);
    assert_eq!(parts.traces.len(), 2);
}

#[test]
fn short_traces_survive_export_without_geometry() {
    let document = LayoutDocument::from_json_str(
        r#"{"components":[{"id":"stub","type":"trace","points":[[1,1]],"numericId":3}]}"#,
    )
    .expect("parse");
    let mut scene = scene();
    scene.load_layout(&document);

    assert!(scene.graph().resolve(InteractionId(10_003)).is_none());
    let parts = scene.export_layout().partition().expect("components");
    assert_eq!(parts.traces.len(), 1);
    assert_eq!(parts.traces[0].points, vec![[1.0, 1.0]]);
}

#[test]
fn duplicate_numeric_ids_get_unique_interaction_ids() {
    let document = LayoutDocument::from_json_str(
        r#"{"components":[
            {"id":"a","type":"path","points":[[0,0],[5,0]],"numericId":2},
            {"id":"b","type":"path","points":[[0,5],[5,5]],"numericId":2}
        ]}"#,
    )
    .expect("parse");
    let mut scene = scene();
    scene.load_layout(&document);

    let ids: Vec<InteractionId> = scene.graph().interactables().traces().iter().map(|(id, _)| *id).collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert!(ids.iter().all(|id| id.is_trace()));
}
