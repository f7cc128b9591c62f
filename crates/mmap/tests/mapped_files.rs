//! File mappings: durability, modes, page operations and the tracking registry.
//!
//! Every test here is `#[serial]` because the tracking registry is
//! process-wide.

use nebula_mmap::prelude::*;
use nebula_mmap::{is_tracking_enabled, set_tracking_enabled, tracked_mappings};
use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::TempDir;

fn temp_file(name: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

#[test]
#[serial]
fn written_bytes_survive_reopen() {
    let (_dir, path) = temp_file("durable.bin");
    let mut writer = MMapBuffer::open_range(&path, 0, 10, MapMode::ReadWrite, ByteOrder::native())
        .unwrap();
    for i in 0..10u8 {
        writer.memory().put_u8(usize::from(i), i + 1).unwrap();
    }
    writer.flush(0, 10).unwrap();
    writer.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), (1..=10).collect::<Vec<u8>>());

    let reader = MMapBuffer::open(&path, MapMode::ReadOnly, ByteOrder::native()).unwrap();
    assert_eq!(reader.len(), 10);
    assert_eq!(reader.memory().to_vec(), (1..=10).collect::<Vec<u8>>());
}

#[test]
#[serial]
fn read_only_mapping_rejects_writes_and_short_files() {
    let (_dir, path) = temp_file("ro.bin");
    std::fs::write(&path, [7u8; 16]).unwrap();

    let buffer = MMapBuffer::open(&path, MapMode::ReadOnly, ByteOrder::native()).unwrap();
    assert!(matches!(
        buffer.memory().put_u8(0, 1),
        Err(MemoryError::ReadOnly { .. })
    ));
    assert_eq!(buffer.memory().get_u8(15).unwrap(), 7);

    let err = MMapBuffer::open_range(&path, 8, 16, MapMode::ReadOnly, ByteOrder::native())
        .unwrap_err();
    assert!(matches!(err, MemoryError::InvalidArgument { .. }));
}

#[test]
#[serial]
fn missing_file_is_not_found() {
    let (_dir, path) = temp_file("absent.bin");
    let err = MMapBuffer::open(&path, MapMode::ReadOnly, ByteOrder::native()).unwrap_err();
    assert!(matches!(err, MemoryError::NotFound { .. }));
}

#[test]
#[serial]
fn unaligned_offset_maps_from_the_right_byte() {
    let (_dir, path) = temp_file("offset.bin");
    let bytes: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    std::fs::write(&path, &bytes).unwrap();

    let buffer =
        MMapBuffer::open_range(&path, 4099, 100, MapMode::ReadOnly, ByteOrder::native()).unwrap();
    assert_eq!(buffer.len(), 100);
    assert_eq!(buffer.memory().to_vec(), bytes[4099..4199].to_vec());
    buffer.advise(0, 100).unwrap();
    assert!(!buffer.resident_pages(0, 100).unwrap().is_empty());
}

#[test]
#[serial]
fn read_write_extends_short_file() {
    let (_dir, path) = temp_file("extend.bin");
    std::fs::write(&path, b"abc").unwrap();
    let buffer =
        MMapBuffer::open_range(&path, 0, 8192, MapMode::ReadWrite, ByteOrder::native()).unwrap();
    assert_eq!(buffer.memory().get_u8(2).unwrap(), b'c');
    assert_eq!(buffer.memory().get_u8(8191).unwrap(), 0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
}

#[test]
#[serial]
fn closing_twice_and_using_after_close() {
    let (_dir, path) = temp_file("closed.bin");
    let mut buffer =
        MMapBuffer::open_range(&path, 0, 64, MapMode::ReadWrite, ByteOrder::native()).unwrap();
    buffer.close().unwrap();
    buffer.close().unwrap();
    assert!(buffer.is_closed());
    assert_eq!(buffer.memory().length(), 0);
    assert!(matches!(buffer.flush(0, 1), Err(MemoryError::InvalidState { .. })));
}

#[test]
#[serial]
fn tracking_registers_and_forgets_mappings() {
    let was_enabled = is_tracking_enabled();
    set_tracking_enabled(true);
    let baseline = tracked_mappings();

    let (_dir, path) = temp_file("tracked.bin");
    let mut first =
        MMapBuffer::open_range(&path, 0, 4096, MapMode::ReadWrite, ByteOrder::native()).unwrap();
    let second =
        MMapBuffer::open_range(&path, 0, 4096, MapMode::ReadWrite, ByteOrder::native()).unwrap();
    assert!(first.is_tracked());
    assert_eq!(tracked_mappings(), baseline + 2);

    first.memory().put_i64(0, 99).unwrap();
    let summary = MMapBuffer::advise_dont_need_tracked();
    assert!(summary.advised >= 2);
    assert_eq!(summary.failed, 0);
    // shared file pages are re-read from the page cache
    assert_eq!(second.memory().get_i64(0).unwrap(), 99);

    first.close().unwrap();
    assert_eq!(tracked_mappings(), baseline + 1);
    drop(second);
    assert_eq!(tracked_mappings(), baseline);

    set_tracking_enabled(false);
    let untracked =
        MMapBuffer::open_range(&path, 0, 4096, MapMode::ReadOnly, ByteOrder::native()).unwrap();
    assert!(!untracked.is_tracked());
    assert_eq!(tracked_mappings(), 0);
    set_tracking_enabled(was_enabled);
}

#[test]
#[serial]
fn zero_length_range_past_end_leaves_file_alone() {
    let (_dir, path) = temp_file("empty.bin");
    std::fs::write(&path, b"").unwrap();

    for mode in [MapMode::ReadOnly, MapMode::ReadWrite] {
        let mut buffer = MMapBuffer::open_range(&path, 100, 0, mode, ByteOrder::native()).unwrap();
        assert!(buffer.is_empty());
        assert!(!buffer.is_tracked());
        assert_eq!(buffer.memory().length(), 0);
        buffer.flush(0, 0).unwrap();
        buffer.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0, "{mode}");
    }
}

#[test]
#[serial]
fn disabling_tracking_forgets_open_mappings() {
    let was_enabled = is_tracking_enabled();
    set_tracking_enabled(true);

    let (_dir, path) = temp_file("forgotten.bin");
    let buffer =
        MMapBuffer::open_range(&path, 0, 4096, MapMode::ReadWrite, ByteOrder::native()).unwrap();
    assert!(buffer.is_tracked());

    set_tracking_enabled(false);
    set_tracking_enabled(true);
    assert!(!buffer.is_tracked());
    assert_eq!(tracked_mappings(), 0);

    let fresh =
        MMapBuffer::open_range(&path, 0, 4096, MapMode::ReadWrite, ByteOrder::native()).unwrap();
    assert!(fresh.is_tracked());
    assert!(!buffer.is_tracked());

    drop(fresh);
    drop(buffer);
    set_tracking_enabled(was_enabled);
}
