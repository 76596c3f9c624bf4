//! Fixed-size paged file I/O: the lowest layer of the storage stack.
//!
//! A `DiskManager` owns one file per table and reads/writes whole
//! `PAGE_SIZE`-byte pages by `(table, page_id)`. It knows nothing about
//! records-per-page policy or catalogs; that lives one layer up.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use bincode::config::{self, Config as BincodeConfig};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, IoStats, Record};

pub const PAGE_SIZE: usize = 4096;

fn bincode_config() -> impl BincodeConfig {
    config::legacy()
}

/// A fixed-size unit of heap I/O: a page id and the records it holds.
/// Serialized form is zero-padded to `PAGE_SIZE` on disk.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub id: u64,
    pub records: Vec<Record>,
    pub dirty: bool,
}

impl Page {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            records: Vec::new(),
            dirty: false,
        }
    }

    pub fn with_records(id: u64, records: Vec<Record>) -> Self {
        Self {
            id,
            records,
            dirty: false,
        }
    }
}

/// Owns one on-disk file per table and performs raw page reads/writes.
/// Tracks its own `reads`/`writes` counters, independent of anything built
/// on top of it (buffer pool, indexes).
pub struct DiskManager {
    data_dir: PathBuf,
    files: HashMap<String, File>,
    io: IoStats,
}

impl DiskManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> DbResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            files: HashMap::new(),
            io: IoStats::default(),
        })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.dat"))
    }

    fn file_mut(&mut self, table: &str) -> DbResult<&mut File> {
        if !self.files.contains_key(table) {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.table_path(table))?;
            self.files.insert(table.to_string(), file);
        }
        Ok(self.files.get_mut(table).expect("just inserted"))
    }

    /// Creates the table's file if it does not already exist. Does not
    /// count as I/O.
    pub fn touch_table(&mut self, table: &str) -> DbResult<()> {
        self.file_mut(table)?;
        Ok(())
    }

    pub fn get_num_pages(&mut self, table: &str) -> DbResult<u64> {
        let len = self.file_mut(table)?.metadata()?.len();
        Ok(len / PAGE_SIZE as u64)
    }

    pub fn get_table_size(&mut self, table: &str) -> DbResult<u64> {
        Ok(self.file_mut(table)?.metadata()?.len())
    }

    pub fn allocate_page(&mut self, table: &str) -> DbResult<Page> {
        let id = self.get_num_pages(table)?;
        Ok(Page::new(id))
    }

    /// Reads one page. Returns `None` if `page_id` is past EOF, or if the
    /// page cannot be read/decoded (treated as a graceful end of data
    /// rather than a hard error).
    pub fn read_page(&mut self, table: &str, page_id: u64) -> DbResult<Option<Page>> {
        let num_pages = self.get_num_pages(table)?;
        if page_id >= num_pages {
            return Ok(None);
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        {
            let file = self.file_mut(table)?;
            file.seek(SeekFrom::Start(page_id * PAGE_SIZE as u64))?;
            if file.read_exact(&mut buf).is_err() {
                return Ok(None);
            }
        }

        let records: Vec<Record> = match decode_from_slice(&buf, bincode_config()) {
            Ok((records, _consumed)) => records,
            Err(_) => return Ok(None),
        };

        self.io.record_read();
        Ok(Some(Page::with_records(page_id, records)))
    }

    /// Writes one page. Fails with `PageOverflow` if the encoded payload
    /// exceeds `PAGE_SIZE`; otherwise right-pads with zero bytes.
    pub fn write_page(&mut self, table: &str, page: &Page) -> DbResult<()> {
        let mut bytes = encode_to_vec(&page.records, bincode_config())
            .map_err(|e| DbError::Storage(format!("serialize page failed: {e}")))?;
        if bytes.len() > PAGE_SIZE {
            return Err(DbError::PageOverflow {
                page_size: PAGE_SIZE,
                actual: bytes.len(),
            });
        }
        bytes.resize(PAGE_SIZE, 0);

        let file = self.file_mut(table)?;
        file.seek(SeekFrom::Start(page.id * PAGE_SIZE as u64))?;
        file.write_all(&bytes)?;
        file.flush()?;
        self.io.record_write();
        Ok(())
    }

    /// Linear scan from page 0 until EOF or the first unreadable page.
    pub fn read_all_pages(&mut self, table: &str) -> DbResult<Vec<Page>> {
        let num_pages = self.get_num_pages(table)?;
        let mut out = Vec::with_capacity(num_pages as usize);
        for page_id in 0..num_pages {
            match self.read_page(table, page_id)? {
                Some(page) => out.push(page),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn truncate_table(&mut self, table: &str) -> DbResult<()> {
        let file = self.file_mut(table)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub fn delete_table(&mut self, table: &str) -> DbResult<()> {
        self.files.remove(table);
        let path = self.table_path(table);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn get_io_stats(&self) -> IoStats {
        self.io
    }

    pub fn reset_counters(&mut self) {
        self.io.reset();
    }
}
