#![allow(clippy::cast_precision_loss)]
use ndarray::{s, Array2, Array3};
use patternview_core::classify::panel_paths;
use patternview_core::{PanelPlacement, TileLayout, PANEL_COUNT};
use patternview_io::{write_cbf, Error, ReaderConfig, Session};
use std::path::Path;
use tempfile::TempDir;

fn write_nexus(path: &Path, data: &Array3<u32>) {
    let file = hdf5::File::create(path).unwrap();
    let detector = file
        .create_group("entry")
        .unwrap()
        .create_group("instrument")
        .unwrap()
        .create_group("detector")
        .unwrap();
    detector
        .new_dataset_builder()
        .with_data(data)
        .create("data")
        .unwrap();
}

fn stack_data(frames: usize) -> Array3<u32> {
    Array3::from_shape_fn((frames, 4, 6), |(f, r, c)| {
        u32::try_from(1000 * f + 10 * r + c).unwrap()
    })
}

fn small_layout() -> TileLayout {
    TileLayout {
        composite_rows: 6,
        composite_cols: 9,
        panel_rows: 2,
        panel_cols: 4,
        panels: [
            PanelPlacement::new(4, 0),
            PanelPlacement::new(0, 5),
            PanelPlacement::new(2, 5),
            PanelPlacement::new(4, 5),
        ],
    }
}

fn write_tiles(dir: &Path, root: &str, frames: usize, layout: &TileLayout) {
    for (i, path) in panel_paths(&dir.join(root)).iter().enumerate() {
        let shape = (frames, layout.panel_rows, layout.panel_cols);
        let data =
            Array3::from_shape_fn(shape, |(f, _, _)| u32::try_from(100 * (i + 1) + f).unwrap());
        write_nexus(path, &data);
    }
}

fn session_for(layout: TileLayout) -> Session {
    Session::with_config(ReaderConfig {
        layout,
        ..ReaderConfig::default()
    })
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_cbf(
        dir.path().join("a_00001_00001.cbf"),
        Array2::from_elem((3, 3), 7).view(),
    )
    .unwrap();
    write_nexus(&dir.path().join("b_00001_00001.nxs"), &stack_data(3));
    write_tiles(dir.path(), "c_00001_00001", 2, &small_layout());
    dir
}

#[test]
fn test_scan_mixed_directory() {
    let dir = fixture();
    let mut session = session_for(small_layout());
    let entries = session.scan(dir.path().to_str().unwrap()).unwrap();

    let keys: Vec<_> = entries.iter().map(|e| e.display_key()).collect();
    assert_eq!(
        keys,
        vec!["a_00001_00001.cbf", "b_00001_00001.nxs", "c_00001_00001"]
    );
    let labels: Vec<_> = entries.iter().map(|e| e.kind().label()).collect();
    assert_eq!(labels, vec!["cbf", "stack", "tiled"]);
    assert!(entries.iter().all(|e| e.children().is_none()));
}

#[test]
fn test_at_most_one_open_across_three_roots() {
    let dir = fixture();
    let mut session = session_for(small_layout());
    session.scan(dir.path().to_str().unwrap()).unwrap();

    for key in [
        "a_00001_00001.cbf",
        "b_00001_00001.nxs",
        "c_00001_00001",
        "b_00001_00001.nxs_00002",
        "a_00001_00001.cbf",
    ] {
        session.activate(key).unwrap();
        assert_eq!(session.open_roots().len(), 1, "after activating {key}");
    }
    assert_eq!(session.open_roots(), vec!["a_00001_00001.cbf"]);
}

#[test]
fn test_stack_children_and_frames() {
    let dir = fixture();
    let data = stack_data(3);
    let mut session = session_for(small_layout());
    session.scan(dir.path().to_str().unwrap()).unwrap();

    // Sub-keys only exist once the stack has been opened.
    assert!(matches!(
        session.activate("b_00001_00001.nxs_00002"),
        Err(Error::UnknownKey(_))
    ));

    let first = session.activate("b_00001_00001.nxs").unwrap();
    assert_eq!(first.name, "b_00001_00001.nxs_00001");
    assert_eq!(first.pixels, data.slice(s![0, .., ..]).mapv(|v| v as f32));

    let entry = session.entry("b_00001_00001.nxs").unwrap();
    assert_eq!(
        entry.children().unwrap(),
        &[
            "b_00001_00001.nxs_00001",
            "b_00001_00001.nxs_00002",
            "b_00001_00001.nxs_00003"
        ]
    );

    for k in 0..3 {
        let key = format!("b_00001_00001.nxs_{:05}", k + 1);
        let shown = session.activate(&key).unwrap();
        assert_eq!(shown.name, key);
        assert_eq!(shown.pixels, data.slice(s![k, .., ..]).mapv(|v| v as f32));
    }
    assert!(matches!(
        session.activate("b_00001_00001.nxs_00004"),
        Err(Error::UnknownKey(_))
    ));
}

#[test]
fn test_children_kept_when_file_grows() {
    let dir = fixture();
    let stack = dir.path().join("b_00001_00001.nxs");
    let mut session = session_for(small_layout());
    session.scan(dir.path().to_str().unwrap()).unwrap();

    session.activate("b_00001_00001.nxs").unwrap();
    session.activate("a_00001_00001.cbf").unwrap();
    assert!(!session.entry("b_00001_00001.nxs").unwrap().is_open());

    write_nexus(&stack, &stack_data(5));
    let shown = session.activate("b_00001_00001.nxs_00003").unwrap();
    assert_eq!(shown.pixels[[0, 0]], 2000.0);

    let entry = session.entry("b_00001_00001.nxs").unwrap();
    assert_eq!(entry.frame_count(), Some(5));
    assert_eq!(entry.children().unwrap().len(), 3);
    assert!(matches!(
        session.activate("b_00001_00001.nxs_00005"),
        Err(Error::UnknownKey(_))
    ));
}

#[test]
fn test_tiled_activation_is_idempotent() {
    let dir = fixture();
    let layout = small_layout();
    let mut session = session_for(layout.clone());
    session.scan(dir.path().to_str().unwrap()).unwrap();

    let first = session.activate("c_00001_00001_00002").unwrap_err();
    assert!(matches!(first, Error::UnknownKey(_)));

    let a = session.activate("c_00001_00001").unwrap();
    assert_eq!(a.name, "c_00001_00001_00001");
    let a = a.pixels.to_owned();

    session.activate("c_00001_00001_00002").unwrap();
    let b = session.activate("c_00001_00001_00001").unwrap().pixels.to_owned();
    assert_eq!(a, b);

    for ((r, c), &v) in a.indexed_iter() {
        let panel = (0..PANEL_COUNT).find(|&i| {
            let (rows, cols) = layout.panel_region(i);
            rows.contains(&r) && cols.contains(&c)
        });
        let expected = panel.map_or(0.0, |i| (100 * (i + 1)) as f32);
        assert_eq!(v, expected, "pixel ({r}, {c})");
    }

    let second = session.activate("c_00001_00001_00002").unwrap();
    assert_eq!(second.pixels[[4, 0]], 101.0);
    assert_eq!(second.pixels[[0, 0]], 0.0);
}

#[test]
fn test_tiled_mismatch_keeps_previous_active() {
    let dir = TempDir::new().unwrap();
    let layout = small_layout();
    write_cbf(
        dir.path().join("a_00001_00001.cbf"),
        Array2::from_elem((2, 2), 1).view(),
    )
    .unwrap();
    write_tiles(dir.path(), "t_00001_00001", 2, &layout);
    let short = Array3::<u32>::zeros((1, layout.panel_rows, layout.panel_cols));
    write_nexus(&dir.path().join("t_00001_00001_m04.nxs"), &short);

    let mut session = session_for(layout);
    session.scan(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(session.entries().len(), 2);

    session.activate("a_00001_00001.cbf").unwrap();
    let err = session.activate("t_00001_00001").unwrap_err();
    assert!(matches!(err, Error::TileMismatch { .. }), "{err}");
    assert_eq!(session.active_key(), Some("a_00001_00001.cbf"));
    assert_eq!(session.open_roots(), vec!["a_00001_00001.cbf"]);
}

#[test]
fn test_repeat_scan_ordering() {
    let dir = TempDir::new().unwrap();
    for name in ["x_00001_00003.cbf", "x_00001r2_00003.cbf"] {
        write_cbf(dir.path().join(name), Array2::<i32>::zeros((1, 1)).view()).unwrap();
    }

    let mut session = Session::new();
    let keys: Vec<_> = session
        .scan(dir.path().to_str().unwrap())
        .unwrap()
        .iter()
        .map(|e| e.display_key().to_string())
        .collect();
    assert_eq!(keys, vec!["x_00001r2_00003.cbf", "x_00001_00003.cbf"]);
}

#[test]
fn test_lambda_composite_through_session() {
    let dir = TempDir::new().unwrap();
    let layout = TileLayout::lambda_3m();
    write_tiles(dir.path(), "lam_00002_00001", 1, &layout);

    let mut session = Session::new();
    session.scan(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(session.entries().len(), 1);

    let shown = session.activate("lam_00002_00001").unwrap();
    assert_eq!(shown.name, "lam_00002_00001_00001");
    assert_eq!(shown.pixels.dim(), (1834, 3147));
    assert_eq!(shown.pixels[[1311, 0]], 100.0);
    assert_eq!(shown.pixels[[0, 1587]], 200.0);
    assert_eq!(shown.pixels[[658, 1591]], 300.0);
    assert_eq!(shown.pixels[[1318, 1584]], 400.0);
    assert_eq!(shown.pixels[[0, 0]], 0.0);
    assert_eq!(
        session.entry("lam_00002_00001").unwrap().children(),
        Some(&[][..])
    );
}
