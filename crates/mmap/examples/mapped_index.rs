//! Build a fixed-width index file with `DynamicMMapWriter`, then map it
//! read-only and binary-search it in place.
//!
//! ```sh
//! RUST_LOG=nebula_mmap=debug cargo run -p nebula-mmap --example mapped_index
//! ```

use nebula_mmap::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// key (i64) + value (i32)
const ENTRY: usize = 12;

fn main() -> MemoryResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let dir = std::env::temp_dir().join(format!("nebula-mmap-{}", std::process::id()));
    std::fs::create_dir_all(&dir).map_err(|e| MemoryError::io("create example dir", e))?;
    let path = dir.join("index.bin");

    let mut writer = DynamicMMapWriter::create(&path, ByteOrder::BigEndian)?;
    for key in 0..50_000_i64 {
        writer.write_i64(key * 7)?;
        writer.write_i32((key % 1000) as i32)?;
    }
    writer.flush()?;
    let entries = writer.position() / ENTRY;
    writer.close()?;
    info!(entries, path = %path.display(), "index written");

    let index = MMapBuffer::open(&path, MapMode::ReadOnly, ByteOrder::BigEndian)?;
    let memory = index.memory().slice(0, entries * ENTRY)?;
    index.advise(0, memory.length())?;

    for wanted in [0_i64, 7 * 12_345, 7 * 49_999, 8] {
        match lookup(&memory, entries, wanted)? {
            Some(value) => info!(key = wanted, value, "found"),
            None => info!(key = wanted, "missing"),
        }
    }

    drop(index);
    std::fs::remove_dir_all(&dir).map_err(|e| MemoryError::io("remove example dir", e))?;
    Ok(())
}

fn lookup(memory: &DirectMemory<'_>, entries: usize, key: i64) -> MemoryResult<Option<i32>> {
    let (mut low, mut high) = (0, entries);
    while low < high {
        let mid = low + (high - low) / 2;
        let at = mid * ENTRY;
        let probe = memory.get_i64(at)?;
        match probe.cmp(&key) {
            std::cmp::Ordering::Less => low = mid + 1,
            std::cmp::Ordering::Greater => high = mid,
            std::cmp::Ordering::Equal => return memory.get_i32(at + 8).map(Some),
        }
    }
    Ok(None)
}
