//! File-system interface against temporary directories.

mod common;

use common::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

use hl7link_network::{FileSystemConfig, FileSystemInterface, Hl7Interface, InterfaceError};
use hl7link_protocol::FrameMarkers;

fn interface_for(dir: &TempDir) -> FileSystemInterface {
    FileSystemInterface::new(
        "files",
        FileSystemConfig {
            directory: dir.path().to_path_buf(),
            extension: "hl7".to_string(),
            scan_interval: Duration::from_millis(50),
            ..FileSystemConfig::default()
        },
    )
}

fn framed_file(ids: &[&str]) -> Vec<u8> {
    let markers = FrameMarkers::default();
    let mut content = Vec::new();
    for id in ids {
        content.extend_from_slice(&markers.wrap(adt_a01_text(id).as_bytes()));
        content.extend_from_slice(b"\r\n");
    }
    content
}

#[tokio::test]
async fn test_scan_dispatches_in_name_order() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("b.hl7"), framed_file(&["B1", "B2"])).unwrap();
    fs::write(dir.path().join("a.hl7"), adt_a01_text("A1")).unwrap();
    fs::write(dir.path().join("ignored.txt"), adt_a01_text("NO")).unwrap();

    let iface = interface_for(&dir);
    let mut messages = iface.events().subscribe_messages();
    let mut status = iface.events().subscribe_status();

    assert_eq!(iface.scan_once().await.unwrap(), 3);
    assert_eq!(recv(&mut status).await.text, "2 .hl7 files found");

    for id in ["A1", "B1", "B2"] {
        assert_eq!(recv(&mut messages).await.message_control_id(), Some(id));
    }

    assert!(dir.path().join("a.hl7.processed").exists());
    assert!(dir.path().join("b.hl7.processed").exists());
    assert!(!dir.path().join("a.hl7").exists());
    assert!(dir.path().join("ignored.txt").exists());
    assert_eq!(iface.statistics().success_count("ADT^A01"), 3);
}

#[tokio::test]
async fn test_processed_files_are_not_rescanned() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("one.hl7"), adt_a01_text("1")).unwrap();

    let iface = interface_for(&dir);
    assert_eq!(iface.scan_once().await.unwrap(), 1);
    assert_eq!(iface.scan_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unreadable_file_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.hl7"), [0xFFu8, 0xFE, 0x00]).unwrap();
    fs::write(dir.path().join("good.hl7"), adt_a01_text("OK")).unwrap();

    let iface = interface_for(&dir);
    let mut errors = iface.events().subscribe_errors();

    assert_eq!(iface.scan_once().await.unwrap(), 1);
    assert!(matches!(
        *recv_error(&mut errors).await,
        InterfaceError::FileSystem { .. }
    ));
    assert!(dir.path().join("bad.hl7").exists());
    assert!(dir.path().join("good.hl7.processed").exists());
}

#[tokio::test]
async fn test_running_interface_picks_up_new_files() {
    let dir = TempDir::new().unwrap();
    let iface = interface_for(&dir);
    let mut messages = iface.events().subscribe_messages();
    let mut status = iface.events().subscribe_status();

    assert!(iface.start_async(true).await);
    assert_eq!(
        recv(&mut status).await.text,
        format!("File system scanning initiated at {}", dir.path().display())
    );

    let staging = dir.path().join("late.tmp");
    fs::write(&staging, adt_a01_text("LATE")).unwrap();
    fs::rename(&staging, dir.path().join("late.hl7")).unwrap();
    assert_eq!(
        recv(&mut messages).await.message_control_id(),
        Some("LATE")
    );

    assert!(iface.stop_async(true).await);
    assert!(!iface.is_running());
}

#[tokio::test]
async fn test_empty_extension_does_not_start() {
    let dir = TempDir::new().unwrap();
    let iface = FileSystemInterface::new(
        "files",
        FileSystemConfig {
            directory: dir.path().to_path_buf(),
            extension: " ".to_string(),
            ..FileSystemConfig::default()
        },
    );
    let mut errors = iface.events().subscribe_errors();

    assert!(!iface.start_async(true).await);
    assert!(matches!(
        *recv_error(&mut errors).await,
        InterfaceError::Config(_)
    ));
}
