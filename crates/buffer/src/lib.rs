//! LRU buffer pool caching heap pages in front of the disk manager.
//!
//! Every heap access funnels through here; index files never do (each index
//! performs its own raw I/O against its own files, see the `index-core`
//! crate). Capacity is fixed at construction; eviction always writes back a
//! dirty page before it is dropped.

#[cfg(test)]
mod tests;

use common::{DbResult, IoStats};
use hashbrown::HashSet;
use lru::LruCache;
use std::num::NonZeroUsize;
use storage::{DiskManager, Page};

type PageKey = (String, u64);

/// Snapshot of buffer pool counters, reported alongside the passthrough
/// disk manager counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferStats {
    pub hits: u64,
    pub misses: u64,
    pub pages_resident: usize,
    pub pool_size: usize,
}

impl BufferStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Fixed-capacity LRU cache of heap pages keyed by `(table, page_id)`.
pub struct BufferPool {
    disk: DiskManager,
    pool_size: usize,
    cache: LruCache<PageKey, Page>,
    dirty: HashSet<PageKey>,
    hits: u64,
    misses: u64,
}

impl BufferPool {
    pub fn new(disk: DiskManager, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self {
            disk,
            pool_size,
            cache: LruCache::new(NonZeroUsize::new(pool_size).unwrap()),
            dirty: HashSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn disk_manager(&mut self) -> &mut DiskManager {
        &mut self.disk
    }

    pub fn disk_io_stats(&self) -> IoStats {
        self.disk.get_io_stats()
    }

    /// On hit, promotes the page to MRU and counts a hit. On miss, delegates
    /// to the disk manager and (if the page exists) caches it, possibly
    /// evicting the current LRU entry first.
    pub fn get_page(&mut self, table: &str, page_id: u64) -> DbResult<Option<Page>> {
        let key: PageKey = (table.to_string(), page_id);
        if let Some(page) = self.cache.get(&key) {
            self.hits += 1;
            return Ok(Some(page.clone()));
        }
        self.misses += 1;
        match self.disk.read_page(table, page_id)? {
            Some(page) => {
                self.insert_evicting(key, page.clone())?;
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }

    /// Inserts/refreshes a page at MRU, marking it dirty. If
    /// `write_through`, the page is flushed to disk immediately instead of
    /// waiting for eviction.
    pub fn put_page(&mut self, table: &str, mut page: Page, write_through: bool) -> DbResult<()> {
        let key: PageKey = (table.to_string(), page.id);
        page.dirty = true;
        if write_through {
            self.disk.write_page(table, &page)?;
            page.dirty = false;
            self.dirty.remove(&key);
        } else {
            self.dirty.insert(key.clone());
        }
        self.insert_evicting(key, page)
    }

    fn insert_evicting(&mut self, key: PageKey, page: Page) -> DbResult<()> {
        if self.cache.len() >= self.pool_size && !self.cache.contains(&key) {
            if let Some((evicted_key, evicted_page)) = self.cache.pop_lru() {
                if self.dirty.remove(&evicted_key) {
                    self.disk.write_page(&evicted_key.0, &evicted_page)?;
                }
            }
        }
        self.cache.put(key, page);
        Ok(())
    }

    pub fn flush_page(&mut self, table: &str, page_id: u64) -> DbResult<()> {
        let key: PageKey = (table.to_string(), page_id);
        if self.dirty.remove(&key) {
            if let Some(page) = self.cache.peek(&key) {
                self.disk.write_page(table, page)?;
            }
        }
        Ok(())
    }

    pub fn flush_table(&mut self, table: &str) -> DbResult<()> {
        let keys: Vec<PageKey> = self
            .dirty
            .iter()
            .filter(|(t, _)| t == table)
            .cloned()
            .collect();
        for key in keys {
            if let Some(page) = self.cache.peek(&key) {
                self.disk.write_page(&key.0, page)?;
            }
            self.dirty.remove(&key);
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> DbResult<()> {
        let keys: Vec<PageKey> = self.dirty.iter().cloned().collect();
        for key in keys {
            if let Some(page) = self.cache.peek(&key) {
                self.disk.write_page(&key.0, page)?;
            }
            self.dirty.remove(&key);
        }
        Ok(())
    }

    /// Flush then evict every cached page belonging to `table`.
    pub fn clear_table(&mut self, table: &str) -> DbResult<()> {
        self.flush_table(table)?;
        let keys: Vec<PageKey> = self
            .cache
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|(t, _)| t == table)
            .collect();
        for key in keys {
            self.cache.pop(&key);
        }
        Ok(())
    }

    pub fn clear_all(&mut self) -> DbResult<()> {
        self.flush_all()?;
        self.cache.clear();
        Ok(())
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            hits: self.hits,
            misses: self.misses,
            pages_resident: self.cache.len(),
            pool_size: self.pool_size,
        }
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }
}
