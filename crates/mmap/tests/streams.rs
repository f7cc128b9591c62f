//! Sequential adapters over memories and growable outputs.

use std::io::{Read, Seek, SeekFrom, Write};

use nebula_mmap::prelude::*;
use nebula_mmap::{MemoryScatteringReader, NativeBufferConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;

#[rstest]
#[case::single_byte(1)]
#[case::kilobyte(1024)]
#[case::megabyte(1024 * 1024)]
fn zero_copy_chunked_writes(#[case] chunk: usize) {
    let config = NativeBufferConfig::new().with_mmap_threshold(64 * 1024);
    let mut stream = ZeroCopyOutputStream::with_config(16, ByteOrder::BigEndian, config).unwrap();
    let payload: Vec<u8> = (0..(3 * chunk + 23)).map(|i| (i * 31 % 256) as u8).collect();

    let mut written = 0;
    let mut grew = false;
    for piece in payload.chunks(chunk) {
        let before = stream.capacity();
        stream.write_all(piece).unwrap();
        written += piece.len();
        grew |= stream.capacity() > before;

        assert_eq!(stream.position(), written);
        assert_eq!(stream.memory().unwrap().to_vec(), payload[..written].to_vec());
    }
    assert!(grew);
    assert_eq!(stream.position(), payload.len());
    assert!(stream.capacity() >= payload.len());
    assert!(stream.capacity().is_power_of_two());

    assert_eq!(stream.memory().unwrap().to_vec(), payload);

    let mut read_back = Vec::new();
    stream.input_stream().unwrap().read_to_end(&mut read_back).unwrap();
    assert_eq!(read_back, payload);
    stream.close().unwrap();
}

#[test]
fn zero_copy_typed_writes_read_back_through_data_input() {
    let mut stream = ZeroCopyOutputStream::with_capacity(8, ByteOrder::LittleEndian).unwrap();
    stream.write_i16(-5).unwrap();
    stream.write_u16(65_000).unwrap();
    stream.write_i64(i64::MIN).unwrap();
    stream.write_f32(3.5).unwrap();
    stream.write_bool(false).unwrap();

    let mut input = MemoryDataInput::new(stream.memory().unwrap());
    assert_eq!(input.read_i16().unwrap(), -5);
    assert_eq!(input.read_u16().unwrap(), 65_000);
    assert_eq!(input.read_i64().unwrap(), i64::MIN);
    assert_eq!(input.read_f32().unwrap(), 3.5);
    assert!(!input.read_bool().unwrap());
    assert!(input.read_u8().is_err());
}

#[test]
fn input_stream_over_mapped_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stream.bin");
    std::fs::write(&path, b"0123456789").unwrap();

    let buffer = MMapBuffer::open(&path, MapMode::ReadOnly, ByteOrder::native()).unwrap();
    let mut stream = MemoryInputStream::new(buffer.memory());
    stream.seek(SeekFrom::Start(4)).unwrap();
    let mut four = [0u8; 4];
    stream.read_exact(&mut four).unwrap();
    assert_eq!(&four, b"4567");
    assert_eq!(stream.skip(10), 2);
    assert_eq!(stream.read(&mut four).unwrap(), 0);
}

#[test]
fn scattering_reader_over_native_memory() {
    let buffer = NativeBuffer::new(12, ByteOrder::native()).unwrap();
    buffer.memory().put_bytes(0, b"abcdefghijkl").unwrap();

    let mut reader = MemoryScatteringReader::new(buffer.memory());
    let mut head = [0u8; 5];
    let mut tail = [0u8; 5];
    assert_eq!(reader.read_scatter_all(&mut [&mut head[..], &mut tail[..]]).unwrap(), Some(10));
    assert_eq!((&head, &tail), (b"abcde", b"fghij"));
    assert_eq!(reader.read_scatter(&mut head).unwrap(), Some(2));
    assert_eq!(reader.read_scatter(&mut head).unwrap(), None);
}

#[test]
fn dynamic_writer_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dynamic.bin");

    let mut writer = DynamicMMapWriter::create(&path, ByteOrder::BigEndian).unwrap();
    for i in 0..10_000_i64 {
        writer.write_i64(i * 3).unwrap();
    }
    writer.flush().unwrap();
    let written = writer.position();
    writer.close().unwrap();
    assert_eq!(written, 80_000);

    let reopened = MMapBuffer::open(&path, MapMode::ReadOnly, ByteOrder::BigEndian).unwrap();
    assert!(reopened.len() >= written);
    let longs = reopened.memory().long_array(0, 10_000).unwrap();
    assert_eq!(longs.get(0).unwrap(), 0);
    assert_eq!(longs.get(9_999).unwrap(), 29_997);
}
