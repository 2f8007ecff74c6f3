//! End-to-end exporter scenarios over an in-memory manager.

use std::collections::HashMap;

use dataex_core::{
    CellValue, Column, DataKey, DescriptorDoc, Document, DocumentSink, EventDoc, EventPageDoc,
    ExportError, Frame, StartDoc, StopDoc,
};
use dataex_export::{export, ExportConfig, Exporter};
use dataex_storage::{frames_of, read_container, Dataset, MemoryManager};

fn start_doc() -> Document {
    Document::Start(StartDoc::new("r1", 5).with_scan_id(12).with_energy(8.0))
}

fn primary_descriptor() -> Document {
    Document::Descriptor(
        DescriptorDoc::new("d-primary", "r1", "primary")
            .with_data_key("Andor_image", DataKey::array("Andor", vec![10, 10])),
    )
}

/// A primary page of `n` frames with per-pixel value = frame index offset.
fn primary_page(first_index: usize, n: usize) -> Document {
    let frames: Vec<Frame> = (0..n)
        .map(|i| Frame::filled(10, 10, (first_index + i) as f64))
        .collect();
    let times: Vec<f64> = (0..n).map(|i| (first_index + i) as f64).collect();
    let seq: Vec<u64> = (0..n).map(|i| (first_index + i) as u64).collect();
    Document::EventPage(
        EventPageDoc::new("d-primary")
            .with_index(seq, times.clone())
            .with_column("Andor_image", Column::Frames(frames), times),
    )
}

fn stop_doc() -> Document {
    Document::Stop(StopDoc::success("s1", "r1"))
}

fn exported_container(docs: Vec<Document>) -> std::collections::BTreeMap<String, Dataset> {
    let artifacts = export(docs, MemoryManager::new(), ExportConfig::default()).unwrap();
    let bytes = artifacts["stream_data"][0].bytes().unwrap();
    read_container(&bytes).unwrap()
}

#[test]
fn scenario_full_run_trims_and_extracts_references() {
    // start -> primary descriptor -> two pages of 5 frames -> stop
    let container = exported_container(vec![
        start_doc(),
        primary_descriptor(),
        primary_page(0, 5),
        primary_page(5, 5),
        stop_doc(),
    ]);

    // 2*5 frames, minus one leading dark frame, minus two trailing frames.
    assert_eq!(container["/exchange/data"].frames(), Some(7));
    let data = frames_of(&container, "/exchange/data").unwrap();
    assert_eq!(data[0].data()[0], 1.0);
    assert_eq!(data[6].data()[0], 7.0);

    // The white reference is the mean of the final chunk (frames 5..9), and
    // it supersedes the first-frame dark average in data_dark.
    let white = frames_of(&container, "/exchange/data_white").unwrap();
    let dark = frames_of(&container, "/exchange/data_dark").unwrap();
    assert_eq!(white[0].data()[0], 7.0);
    assert_eq!(dark[0].data()[0], 7.0);

    // Run metadata scalars.
    assert_eq!(
        container.get("uid"),
        Some(&Dataset::Scalar { value: "r1".into() }),
    );
    assert_eq!(
        container.get("scan_id"),
        Some(&Dataset::Scalar { value: 12i64.into() }),
    );
    assert_eq!(
        container.get("X_eng"),
        Some(&Dataset::Scalar { value: 8.0f64.into() }),
    );

    // No monitor stream: no theta.
    assert!(!container.contains_key("/exchange/theta"));
}

#[test]
fn scenario_stop_without_primary_descriptor_fails() {
    let err = export(
        vec![start_doc(), stop_doc()],
        MemoryManager::new(),
        ExportConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ExportError::Sequencing { .. }));
}

#[test]
fn scenario_template_field_missing() {
    let config = ExportConfig::default().with_template("{sample_name}-");
    let err = export(vec![start_doc()], MemoryManager::new(), config).unwrap_err();
    match err {
        ExportError::TemplateFieldMissing { field } => assert_eq!(field, "sample_name"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn baseline_snapshot_is_first_wins() {
    let baseline_descriptor = Document::Descriptor(DescriptorDoc::new("d-base", "r1", "baseline"));
    let baseline_page = |x: f64| {
        Document::EventPage(
            EventPageDoc::new("d-base")
                .with_index(vec![0], vec![0.0])
                .with_column("zps_sx", Column::Scalars(vec![x]), vec![0.0])
                .with_column("zps_sy", Column::Scalars(vec![2.0]), vec![0.0])
                .with_column("zps_sz", Column::Scalars(vec![3.0]), vec![0.0])
                .with_column("zps_pi_r", Column::Scalars(vec![4.0]), vec![0.0]),
        )
    };

    let container = exported_container(vec![
        start_doc(),
        primary_descriptor(),
        baseline_descriptor,
        baseline_page(1.0),
        primary_page(0, 5),
        baseline_page(99.0), // ignored: baseline already recorded
        primary_page(5, 5),
        stop_doc(),
    ]);

    assert_eq!(
        container.get("x_ini"),
        Some(&Dataset::Scalar { value: 1.0f64.into() }),
    );
    assert_eq!(
        container.get("r_ini"),
        Some(&Dataset::Scalar { value: 4.0f64.into() }),
    );
}

#[test]
fn monitor_series_is_aligned_and_clamped() {
    let monitor_descriptor =
        Document::Descriptor(DescriptorDoc::new("d-mon", "r1", "zps_pi_r_monitor"));
    // Sparse monitor samples covering only [2, 6]: targets outside clamp.
    let monitor_event = |t: f64, pos: f64| {
        let mut data = HashMap::new();
        data.insert("zps_pi_r".to_string(), CellValue::Scalar(pos));
        Document::Event(EventDoc {
            descriptor: "d-mon".to_string(),
            seq_num: 0,
            time: t,
            data,
            timestamps: HashMap::new(),
            filled: None,
        })
    };

    let container = exported_container(vec![
        start_doc(),
        primary_descriptor(),
        monitor_descriptor,
        monitor_event(2.0, 20.0),
        primary_page(0, 5),
        monitor_event(6.0, 60.0),
        primary_page(5, 5),
        stop_doc(),
    ]);

    // Frame timestamps retained after dark drop and tail trim: 1..=7.
    let theta = match &container["/exchange/theta"] {
        Dataset::Array1 { data } => data.clone(),
        other => panic!("theta has wrong kind: {other:?}"),
    };
    assert_eq!(theta.len(), 7);
    assert_eq!(theta[0], 20.0); // t=1 before first sample: clamped
    assert_eq!(theta[2], 30.0); // t=3 interpolated
    assert_eq!(theta[6], 60.0); // t=7 after last sample: clamped
}

#[test]
fn file_manager_produces_a_named_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let mut exporter = Exporter::to_directory(
        dir.path(),
        ExportConfig::default().with_template("{uid}-{scan_id}-"),
    );
    for doc in [
        start_doc(),
        primary_descriptor(),
        primary_page(0, 5),
        primary_page(5, 5),
        stop_doc(),
    ] {
        exporter.process(&doc).unwrap();
    }
    exporter.close().unwrap();

    let artifacts = exporter.artifacts();
    let path = artifacts["stream_data"][0].path().unwrap();
    assert_eq!(path.file_name().unwrap(), "r1-12-.json");
    let container = read_container(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(container["/exchange/data"].frames(), Some(7));
}

#[test]
fn events_after_stop_are_rejected() {
    let mut exporter = Exporter::new(MemoryManager::new(), ExportConfig::default());
    for doc in [
        start_doc(),
        primary_descriptor(),
        primary_page(0, 5),
        primary_page(5, 5),
        stop_doc(),
    ] {
        exporter.process(&doc).unwrap();
    }
    assert!(exporter.process(&primary_page(10, 5)).is_err());
}
