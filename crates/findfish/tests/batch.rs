#![cfg(feature = "image")]

mod common;

use std::path::Path;

use common::*;
use findfish::{FrameSink, ImageSequenceSink, ProcessError, ProcessorConfig, VideoPairCoordinator};
use serde_json::Value;

fn write_recording(dir: &Path, marker_at: Option<u64>) {
    let mut sink = ImageSequenceSink::new(dir, "png");
    for frame in recording(30, marker_at, 12..15) {
        sink.write_frame(&frame).unwrap();
    }
}

fn coordinator(out: &Path) -> VideoPairCoordinator {
    VideoPairCoordinator::new(identity_undistorter(), ProcessorConfig::default(), out)
        .with_decoder(corner_decoder)
}

#[test]
fn pairs_are_processed_into_sync_dirs_and_event_files() {
    let tmp = tempfile::tempdir().unwrap();
    let videos = tmp.path().join("videos");
    write_recording(&videos.join("trial1_L"), Some(3));
    write_recording(&videos.join("trial1_R"), Some(5));
    write_recording(&videos.join("trial2_L"), Some(2));
    write_recording(&videos.join("trial2_R"), None);
    write_recording(&videos.join("solo_L"), Some(0));

    let out = tmp.path().join("out");
    let coord = coordinator(&out);
    let pairs = coord.discover(&videos).unwrap();
    let tags: Vec<&str> = pairs.iter().map(|p| p.tag.as_str()).collect();
    assert_eq!(tags, ["trial1", "trial2"]);
    assert!(pairs[0].left.ends_with("trial1_L"));

    let reports = coord.run(&pairs);
    assert_eq!(reports.len(), 2);

    let ok = reports[0].result.as_ref().unwrap();
    assert_eq!((ok.offset, ok.frames_written), (5, 25));
    let written = std::fs::read_dir(coord.sync_dir("trial1")).unwrap().count();
    assert_eq!(written, 25);

    let text = std::fs::read_to_string(out.join("DE_trial1.json")).unwrap();
    let events: Value = serde_json::from_str(&text).unwrap();
    let list = events["DetectedEvents"].as_array().unwrap();
    assert_eq!(list[0]["Event_QRCode_left"]["frame"], 3);
    assert_eq!(list[1]["Event_QRCode_right"]["site"], "tank3");

    assert!(matches!(
        reports[1].result,
        Err(ProcessError::NeverSynced { .. })
    ));
    assert!(!coord.sync_dir("trial2").exists());
    assert!(!coord.events_path("trial2").exists());
}

#[test]
fn empty_recording_fails_only_its_pair() {
    let tmp = tempfile::tempdir().unwrap();
    let videos = tmp.path().join("videos");
    write_recording(&videos.join("a_L"), Some(1));
    std::fs::create_dir_all(videos.join("a_R")).unwrap();
    write_recording(&videos.join("b_L"), Some(1));
    write_recording(&videos.join("b_R"), Some(1));

    let coord = coordinator(&tmp.path().join("out"));
    let reports = coord.run(&coord.discover(&videos).unwrap());
    assert!(matches!(reports[0].result, Err(ProcessError::Stream(_))));
    assert!(reports[1].is_ok());
}
