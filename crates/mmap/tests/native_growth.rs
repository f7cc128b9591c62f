//! Growth sequences of native buffers across the malloc/mmap threshold.

use nebula_mmap::prelude::*;
use nebula_mmap::{Capabilities, NativeBufferConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

const THRESHOLD: usize = 16 * 1024;

fn config(remap: bool) -> NativeBufferConfig {
    let capabilities = if remap {
        Capabilities::current()
    } else {
        Capabilities::current().without_remap()
    };
    NativeBufferConfig::new()
        .with_mmap_threshold(THRESHOLD)
        .with_capabilities(capabilities)
}

/// Fill `[0, len)` with a position-derived pattern.
fn stamp(memory: &DirectMemory<'_>, len: usize) {
    for i in 0..len {
        memory.put_u8(i, (i % 251) as u8).unwrap();
    }
}

fn assert_stamped(memory: &DirectMemory<'_>, len: usize) {
    for i in 0..len {
        assert_eq!(memory.get_u8(i).unwrap(), (i % 251) as u8, "byte {i}");
    }
}

#[rstest]
#[case::below_threshold(&[64, 128, 1024, 4096])]
#[case::one_crossing(&[1024, THRESHOLD - 1, THRESHOLD, THRESHOLD * 2])]
#[case::many_crossings(&[100, THRESHOLD * 4, 200, THRESHOLD + 1, 50, THRESHOLD * 3])]
fn growth_preserves_common_prefix(#[case] sizes: &[usize], #[values(true, false)] remap: bool) {
    let mut buffer = NativeBuffer::with_config(32, ByteOrder::native(), config(remap)).unwrap();
    stamp(&buffer.memory(), 32);
    let mut live = 32;

    for &size in sizes {
        buffer.realloc(size).unwrap();
        assert_eq!(buffer.len(), size);
        assert_eq!(buffer.is_mmapped(), size >= THRESHOLD);

        let kept = live.min(size);
        assert_stamped(&buffer.memory(), kept);
        // bytes exposed by growth read as zero
        for i in kept..size {
            assert_eq!(buffer.memory().get_u8(i).unwrap(), 0, "byte {i} of {size}");
        }

        stamp(&buffer.memory(), size);
        live = size;
    }
    buffer.close().unwrap();
}

#[test]
fn shrink_to_zero_then_grow() {
    let mut buffer = NativeBuffer::with_config(THRESHOLD * 2, ByteOrder::native(), config(true))
        .unwrap();
    buffer.memory().put_i64(0, 5).unwrap();
    buffer.realloc(0).unwrap();
    assert!(buffer.is_empty());
    assert!(buffer.memory().get_u8(0).is_err());

    buffer.realloc(THRESHOLD).unwrap();
    assert!(buffer.is_mmapped());
    assert_eq!(buffer.memory().get_i64(0).unwrap(), 0);
}

#[test]
fn invalid_config_is_rejected() {
    let config = NativeBufferConfig::new().with_mmap_threshold(0);
    let err = NativeBuffer::with_config(16, ByteOrder::native(), config).unwrap_err();
    assert!(matches!(err, MemoryError::InvalidConfig { .. }));
}

#[test]
fn closed_buffer_is_inert() {
    let mut buffer = NativeBuffer::new(128, ByteOrder::BigEndian).unwrap();
    buffer.close().unwrap();
    buffer.close().unwrap();
    assert!(buffer.realloc(256).is_err());
    assert_eq!(buffer.memory().length(), 0);
    assert!(buffer.pin(0, 1).is_err());
}
