use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::models::{JobRecord, HEADERS};
use super::{Result, SheetError, SheetStore};

/// In-process sheet used for local development and tests.
///
/// Mirrors the remote layout: a header row followed by data rows.
#[derive(Default)]
pub struct MemorySheetStore {
    header: Mutex<Vec<String>>,
    rows: Mutex<Vec<Vec<String>>>,
    header_writes: AtomicUsize,
    unreachable: AtomicBool,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SheetError::Connection("memory sheet marked unreachable".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl MemorySheetStore {
    /// Seed the store with existing records.
    pub fn with_records(records: &[JobRecord]) -> Self {
        let store = Self::new();
        store
            .rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(records.iter().map(JobRecord::to_row));
        store
    }

    /// Simulate the backing service going away.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn header(&self) -> Vec<String> {
        self.header.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of times the header row was written.
    pub fn header_writes(&self) -> usize {
        self.header_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetStore for MemorySheetStore {
    async fn validate_connection(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn initialize_headers(&self) -> Result<bool> {
        self.check_reachable()?;
        let mut header = self.header.lock().unwrap_or_else(|e| e.into_inner());
        if header.iter().map(String::as_str).eq(HEADERS.iter().copied()) {
            return Ok(false);
        }
        *header = HEADERS.iter().map(|h| h.to_string()).collect();
        self.header_writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn read_all(&self) -> Result<Vec<JobRecord>> {
        self.check_reachable()?;
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.iter().filter_map(|r| JobRecord::from_row(r)).collect())
    }

    async fn append_records(&self, records: &[JobRecord]) -> Result<usize> {
        self.check_reachable()?;
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.extend(records.iter().map(JobRecord::to_row));
        debug!("Memory sheet now holds {} rows", rows.len());
        Ok(records.len())
    }
}
