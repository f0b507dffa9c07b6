//! On-disk chunk codec.
//!
//! One file per chunk, named deterministically from its chunk coordinate.
//! The layout is a fixed little-endian header followed by the full row-major
//! cell payload:
//!
//! ```text
//! magic "GSCH" | version u16 | rows u32 | cols u32 | no_data f64 | rows*cols f64
//! ```
//!
//! The header carries enough geometry to validate a reload without external
//! input; any disagreement with the expected geometry is reported as
//! [`GridError::CorruptChunk`] rather than silently substituting no-data.

use crate::chunk::{dense_cost, same_value, sparse_cost, CellStore, DenseStore, SparseStore};
use crate::coord::ChunkCoord;
use crate::error::GridError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: [u8; 4] = *b"GSCH";
const VERSION: u16 = 1;
const HEADER_BYTES: u64 = 4 + 2 + 4 + 4 + 8;

/// Deterministic file name for a chunk within its grid's backing directory.
pub fn chunk_file_name(coord: ChunkCoord) -> String {
    format!("c{}_{}.gsc", coord.chunk_row, coord.chunk_col)
}

/// Persist a chunk store to `path`, replacing any previous file.
pub fn write_chunk(path: &Path, store: &dyn CellStore, no_data: f64) -> Result<(), GridError> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    w.write_all(&MAGIC)?;
    w.write_u16::<LittleEndian>(VERSION)?;
    w.write_u32::<LittleEndian>(store.rows() as u32)?;
    w.write_u32::<LittleEndian>(store.cols() as u32)?;
    w.write_f64::<LittleEndian>(no_data)?;

    for lr in 0..store.rows() {
        for lc in 0..store.cols() {
            w.write_f64::<LittleEndian>(store.get(lr, lc))?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Reload a chunk store from `path`, validating against the expected geometry.
///
/// The returned encoding is chosen from the persisted density: mostly-no-data
/// payloads come back sparse, well-populated ones dense.
pub fn read_chunk(
    path: &Path,
    rows: usize,
    cols: usize,
    no_data: f64,
) -> Result<Box<dyn CellStore>, GridError> {
    let corrupt = |detail: String| GridError::CorruptChunk {
        path: path.to_path_buf(),
        detail,
    };

    let expected_len = HEADER_BYTES + (rows * cols * 8) as u64;
    let actual_len = std::fs::metadata(path)?.len();
    if actual_len != expected_len {
        return Err(corrupt(format!(
            "file is {actual_len} bytes, expected {expected_len}"
        )));
    }

    let mut r = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(corrupt(format!("bad magic {magic:?}")));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != VERSION {
        return Err(corrupt(format!("unsupported version {version}")));
    }
    let file_rows = r.read_u32::<LittleEndian>()? as usize;
    let file_cols = r.read_u32::<LittleEndian>()? as usize;
    if file_rows != rows || file_cols != cols {
        return Err(corrupt(format!(
            "geometry is {file_rows}x{file_cols}, expected {rows}x{cols}"
        )));
    }
    let file_no_data = r.read_f64::<LittleEndian>()?;
    if !same_value(file_no_data, no_data) {
        return Err(corrupt(format!(
            "no-data value is {file_no_data}, expected {no_data}"
        )));
    }

    let mut values = Vec::with_capacity(rows * cols);
    for _ in 0..rows * cols {
        values.push(r.read_f64::<LittleEndian>()?);
    }

    let occupied = values.iter().filter(|v| !same_value(**v, no_data)).count();
    if sparse_cost(occupied) < dense_cost(rows, cols) {
        let mut sparse = SparseStore::new(rows, cols, no_data);
        for (i, v) in values.into_iter().enumerate() {
            if !same_value(v, no_data) {
                sparse.set(i / cols, i % cols, v);
            }
        }
        Ok(Box::new(sparse))
    } else {
        Ok(Box::new(DenseStore::from_values(rows, cols, no_data, values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;

    #[test]
    fn test_chunk_file_name() {
        assert_eq!(chunk_file_name(ChunkCoord::new(3, 12)), "c3_12.gsc");
    }

    #[test]
    fn test_round_trip_sparse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c0_0.gsc");

        let mut store = SparseStore::new(8, 8, -9999.0);
        store.set(0, 0, 1.0);
        store.set(7, 7, 2.5);
        write_chunk(&path, &store, -9999.0).unwrap();

        let loaded = read_chunk(&path, 8, 8, -9999.0).unwrap();
        assert_eq!(loaded.get(0, 0), 1.0);
        assert_eq!(loaded.get(7, 7), 2.5);
        assert_eq!(loaded.get(3, 3), -9999.0);
        // 2 occupied cells of 64 come back sparse
        assert_eq!(loaded.occupied(), 2);
        assert!(loaded.is_promotable());
    }

    #[test]
    fn test_round_trip_dense() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c0_0.gsc");

        let mut store = DenseStore::filled(4, 4, 0.0);
        for lr in 0..4 {
            for lc in 0..4 {
                store.set(lr, lc, (lr * 4 + lc) as f64 + 0.5);
            }
        }
        write_chunk(&path, &store, 0.0).unwrap();

        let loaded = read_chunk(&path, 4, 4, 0.0).unwrap();
        assert!(!loaded.is_promotable());
        for lr in 0..4 {
            for lc in 0..4 {
                assert_eq!(loaded.get(lr, lc), (lr * 4 + lc) as f64 + 0.5);
            }
        }
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c0_0.gsc");

        let store = SparseStore::new(4, 4, 0.0);
        write_chunk(&path, &store, 0.0).unwrap();

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(file.metadata().unwrap().len() - 8).unwrap();

        match read_chunk(&path, 4, 4, 0.0) {
            Err(GridError::CorruptChunk { .. }) => {}
            other => panic!("expected CorruptChunk, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c0_0.gsc");

        let store = SparseStore::new(2, 2, 0.0);
        write_chunk(&path, &store, 0.0).unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.rewind().unwrap();
        file.write_all(b"XXXX").unwrap();

        match read_chunk(&path, 2, 2, 0.0) {
            Err(GridError::CorruptChunk { detail, .. }) => {
                assert!(detail.contains("magic"));
            }
            other => panic!("expected CorruptChunk, got {other:?}"),
        }
    }

    #[test]
    fn test_geometry_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c0_0.gsc");

        let store = SparseStore::new(4, 4, 0.0);
        write_chunk(&path, &store, 0.0).unwrap();

        match read_chunk(&path, 8, 2, 0.0) {
            Err(GridError::CorruptChunk { .. }) => {}
            other => panic!("expected CorruptChunk, got {other:?}"),
        }
    }
}
