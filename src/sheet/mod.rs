pub mod google;
pub mod memory;
pub mod models;

pub use google::GoogleSheetStore;
pub use memory::MemorySheetStore;
pub use models::JobRecord;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a sheet backend
#[derive(Debug, Error)]
pub enum SheetError {
    /// Service unreachable or credentials rejected
    #[error("Sheet connection error: {0}")]
    Connection(String),

    #[error("Sheet API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected sheet response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, SheetError>;

/// Durable, append-oriented storage of job records in a tabular service.
///
/// Every call goes to the backing service; implementations keep no cache.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Check credentials and connectivity.
    async fn validate_connection(&self) -> Result<()>;

    /// Make row 1 match [`HEADERS`]. Returns `true` if a write was issued.
    async fn initialize_headers(&self) -> Result<bool>;

    /// Read every stored record. Each call re-reads the source.
    async fn read_all(&self) -> Result<Vec<JobRecord>>;

    /// Append rows as-is. Returns the number of rows written.
    async fn append_records(&self, records: &[JobRecord]) -> Result<usize>;
}
