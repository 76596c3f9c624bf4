//! Length-framed chunk I/O: `[u32 little-endian length][payload]`,
//! concatenated in ascending position order (spec §3, §6.3). Every index's
//! block/bucket/leaf file and its overflow file are built from this.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult};
use serde::{de::DeserializeOwned, Serialize};

fn bincode_config() -> impl Config {
    config::legacy()
}

pub fn bincode_encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    encode_to_vec(value, bincode_config())
        .map_err(|e| DbError::Storage(format!("encode failed: {e}")))
}

pub fn bincode_decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    decode_from_slice(bytes, bincode_config())
        .map(|(v, _)| v)
        .map_err(|e| DbError::CorruptIndex(format!("decode failed: {e}")))
}

pub fn open_rw(path: &Path) -> DbResult<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// Reads one chunk at a known byte offset. Used for single-bucket/block/leaf
/// reads so each logical access costs exactly one I/O counter increment.
pub fn read_chunk_at(file: &mut File, offset: u64) -> DbResult<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf)
        .map_err(|_| DbError::CorruptIndex("truncated chunk header".into()))?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)
        .map_err(|_| DbError::CorruptIndex("truncated chunk payload".into()))?;
    Ok(buf)
}

/// Reads every chunk in the file from the start, returning `(offset,
/// payload)` pairs in file order. A truncated trailing chunk ends the scan
/// gracefully (treated as end of data, mirroring the heap's disk manager)
/// instead of failing the whole read.
pub fn read_all_chunks(file: &mut File) -> DbResult<Vec<(u64, Vec<u8>)>> {
    file.seek(SeekFrom::Start(0))?;
    let mut out = Vec::new();
    loop {
        let offset = file.stream_position()?;
        let mut len_buf = [0u8; 4];
        if file.read_exact(&mut len_buf).is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        if file.read_exact(&mut buf).is_err() {
            break;
        }
        out.push((offset, buf));
    }
    Ok(out)
}

/// Truncates the file and rewrites its entire chunk sequence, returning the
/// byte offset of each written chunk (used to rebuild a position index).
/// Every index's physical delete goes through this: payloads are variable
/// length, so removing one forces a full sequential rewrite (spec §4.4,
/// §9 "Full-file rewrites on delete").
pub fn rewrite_chunks(file: &mut File, payloads: &[Vec<u8>]) -> DbResult<Vec<u64>> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    let mut offsets = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let offset = file.stream_position()?;
        file.write_all(&(payload.len() as u32).to_le_bytes())?;
        file.write_all(payload)?;
        offsets.push(offset);
    }
    file.flush()?;
    Ok(offsets)
}

/// Convenience wrapper for files that only ever hold a single whole-state
/// chunk (the overflow files): rewrite with exactly one payload.
pub fn rewrite_single(file: &mut File, payload: &[u8]) -> DbResult<()> {
    rewrite_chunks(file, std::slice::from_ref(&payload.to_vec())).map(|_| ())
}

/// Reads the single whole-state chunk written by `rewrite_single`, or `None`
/// if the file is empty/absent.
pub fn read_single(file: &mut File) -> DbResult<Option<Vec<u8>>> {
    let chunks = read_all_chunks(file)?;
    Ok(chunks.into_iter().next().map(|(_, payload)| payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rewrite_and_read_all_chunks_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.dat");
        let mut file = open_rw(&path).unwrap();
        let payloads = vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()];
        let offsets = rewrite_chunks(&mut file, &payloads).unwrap();
        assert_eq!(offsets.len(), 3);

        let chunks = read_all_chunks(&mut file).unwrap();
        let decoded: Vec<Vec<u8>> = chunks.into_iter().map(|(_, p)| p).collect();
        assert_eq!(decoded, payloads);
    }

    #[test]
    fn read_chunk_at_reads_one_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.dat");
        let mut file = open_rw(&path).unwrap();
        let payloads = vec![b"alpha".to_vec(), b"beta".to_vec()];
        let offsets = rewrite_chunks(&mut file, &payloads).unwrap();

        let second = read_chunk_at(&mut file, offsets[1]).unwrap();
        assert_eq!(second, b"beta".to_vec());
    }

    #[test]
    fn truncated_trailing_chunk_ends_scan_gracefully() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.dat");
        {
            let mut file = open_rw(&path).unwrap();
            rewrite_chunks(&mut file, &[b"full".to_vec()]).unwrap();
            // Append a truncated length-prefix with no payload.
            file.write_all(&100u32.to_le_bytes()).unwrap();
        }
        let mut file = open_rw(&path).unwrap();
        let chunks = read_all_chunks(&mut file).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1, b"full".to_vec());
    }

    #[test]
    fn single_whole_state_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overflow.dat");
        let mut file = open_rw(&path).unwrap();
        rewrite_single(&mut file, b"state").unwrap();
        assert_eq!(read_single(&mut file).unwrap(), Some(b"state".to_vec()));
    }

    #[test]
    fn read_single_on_empty_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        let mut file = open_rw(&path).unwrap();
        assert_eq!(read_single(&mut file).unwrap(), None);
    }
}
