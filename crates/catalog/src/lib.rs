//! Heap storage and its persistent catalog.
//!
//! `Heap` packs records into fixed-size pages through the buffer pool and
//! keeps one JSON document, `catalog.json`, mapping each table name to its
//! record/page counts, optional schema, and chosen index type. The catalog
//! file is the ground truth for table existence: a `.dat` file with no
//! catalog entry does not count as a table.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use buffer::{BufferPool, BufferStats};
use common::{DbError, DbResult, IoStats, Record, TableSchema};
use serde::{Deserialize, Serialize};
use storage::{DiskManager, Page};

/// The four index implementations a table may pick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    #[serde(rename = "sequential")]
    Sequential,
    #[serde(rename = "isam")]
    Isam,
    #[serde(rename = "ext_hash")]
    ExtHash,
    #[serde(rename = "bplustree")]
    BPlusTree,
}

impl Default for IndexType {
    fn default() -> Self {
        IndexType::Sequential
    }
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Sequential => "sequential",
            IndexType::Isam => "isam",
            IndexType::ExtHash => "ext_hash",
            IndexType::BPlusTree => "bplustree",
        }
    }
}

/// Per-table catalog entry, the unit persisted in `catalog.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TableMeta {
    pub num_records: u64,
    pub num_pages: u64,
    pub schema: Option<TableSchema>,
    pub index_type: IndexType,
}

/// Aggregate stats returned by `Heap::get_stats`: buffer pool counters, raw
/// disk counters, and the configured `records_per_page`.
#[derive(Debug, Clone)]
pub struct HeapStats {
    pub buffer: BufferStats,
    pub disk: IoStats,
    pub records_per_page: usize,
}

pub struct Heap {
    records_per_page: usize,
    buffer: BufferPool,
    data_dir: PathBuf,
    catalog_path: PathBuf,
    entries: HashMap<String, TableMeta>,
}

impl Heap {
    pub fn open(
        data_dir: impl Into<PathBuf>,
        records_per_page: usize,
        pool_size: usize,
    ) -> DbResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        let disk = DiskManager::new(&data_dir)?;
        let buffer = BufferPool::new(disk, pool_size);
        let catalog_path = data_dir.join("catalog.json");
        let entries = Self::load_catalog(&catalog_path)?;
        Ok(Self {
            records_per_page,
            buffer,
            data_dir,
            catalog_path,
            entries,
        })
    }

    fn load_catalog(path: &Path) -> DbResult<HashMap<String, TableMeta>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| DbError::PersistenceFailure(format!("catalog.json: {e}")))
    }

    fn save_catalog(&self) -> DbResult<()> {
        fs::create_dir_all(&self.data_dir)?;
        let data = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| DbError::PersistenceFailure(format!("serialize catalog: {e}")))?;
        fs::write(&self.catalog_path, data)?;
        Ok(())
    }

    pub fn create_table(&mut self, name: &str) -> DbResult<()> {
        if !self.entries.contains_key(name) {
            self.entries.insert(name.to_string(), TableMeta::default());
            self.buffer.disk_manager().touch_table(name)?;
            self.save_catalog()?;
        }
        Ok(())
    }

    pub fn set_table_metadata(
        &mut self,
        name: &str,
        schema: Option<TableSchema>,
        index_type: Option<IndexType>,
    ) -> DbResult<()> {
        self.create_table(name)?;
        let entry = self.entries.get_mut(name).expect("just created");
        if let Some(schema) = schema {
            entry.schema = Some(schema);
        }
        if let Some(index_type) = index_type {
            entry.index_type = index_type;
        }
        self.save_catalog()
    }

    pub fn get_table_metadata(&self, name: &str) -> Option<&TableMeta> {
        self.entries.get(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Splits `rows` into `records_per_page`-sized pages, appends them
    /// starting at the table's current page count, writes each through the
    /// buffer pool, and updates + saves the catalog entry.
    pub fn load(&mut self, name: &str, rows: Vec<Record>) -> DbResult<()> {
        self.create_table(name)?;
        if rows.is_empty() {
            return Ok(());
        }

        let total_rows = rows.len() as u64;
        let chunks: Vec<Vec<Record>> = rows
            .chunks(self.records_per_page)
            .map(|c| c.to_vec())
            .collect();
        let starting_page = self.entries[name].num_pages;

        for (i, chunk) in chunks.iter().enumerate() {
            let page = Page::with_records(starting_page + i as u64, chunk.clone());
            self.buffer.put_page(name, page, true)?;
        }

        let entry = self.entries.get_mut(name).expect("created above");
        entry.num_records += total_rows;
        entry.num_pages += chunks.len() as u64;
        self.save_catalog()
    }

    pub fn read_all(&mut self, name: &str) -> DbResult<Vec<Record>> {
        let num_pages = match self.entries.get(name) {
            Some(meta) => meta.num_pages,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for page_id in 0..num_pages {
            if let Some(page) = self.buffer.get_page(name, page_id)? {
                out.extend(page.records);
            }
        }
        Ok(out)
    }

    pub fn read_page(&mut self, name: &str, page_id: u64) -> DbResult<Vec<Record>> {
        Ok(self
            .buffer
            .get_page(name, page_id)?
            .map(|p| p.records)
            .unwrap_or_default())
    }

    pub fn write_page(&mut self, name: &str, page_id: u64, records: Vec<Record>) -> DbResult<()> {
        self.buffer
            .put_page(name, Page::with_records(page_id, records), false)
    }

    pub fn get_num_pages(&self, name: &str) -> u64 {
        self.entries.get(name).map(|m| m.num_pages).unwrap_or(0)
    }

    pub fn flush_all(&mut self) -> DbResult<()> {
        self.buffer.flush_all()
    }

    pub fn flush_table(&mut self, name: &str) -> DbResult<()> {
        self.buffer.flush_table(name)
    }

    pub fn clear_table(&mut self, name: &str) -> DbResult<()> {
        if self.entries.contains_key(name) {
            self.buffer.clear_table(name)?;
            self.buffer.disk_manager().truncate_table(name)?;
            let entry = self.entries.get_mut(name).expect("checked above");
            entry.num_records = 0;
            entry.num_pages = 0;
            self.save_catalog()?;
        }
        Ok(())
    }

    pub fn delete_table(&mut self, name: &str) -> DbResult<()> {
        if self.entries.remove(name).is_some() {
            self.buffer.clear_table(name)?;
            self.buffer.disk_manager().delete_table(name)?;
            self.save_catalog()?;
        }
        Ok(())
    }

    pub fn get_table_size(&mut self, name: &str) -> DbResult<u64> {
        self.buffer.disk_manager().get_table_size(name)
    }

    pub fn get_stats(&self) -> HeapStats {
        HeapStats {
            buffer: self.buffer.stats(),
            disk: self.buffer.disk_io_stats(),
            records_per_page: self.records_per_page,
        }
    }

    pub fn reset_metrics(&mut self) {
        self.buffer.reset_stats();
        self.buffer.disk_manager().reset_counters();
    }
}
