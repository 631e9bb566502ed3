pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{ClassifiedSample, PersistedRecord};

/// Save/query contract for processed samples.
///
/// `commit_batch` is atomic: either every row is stored and returned with its
/// assigned id, or nothing is.
pub trait RecordStore: Send + Sync {
    fn commit_batch(&self, samples: &[ClassifiedSample]) -> Result<Vec<PersistedRecord>>;

    fn get_by_id(&self, id: i64) -> Result<Option<PersistedRecord>>;

    fn list_all(&self) -> Result<Vec<PersistedRecord>>;

    /// Returns the number of affected rows
    fn update_by_id(&self, id: i64, sample: &ClassifiedSample) -> Result<usize>;

    /// Returns the number of affected rows
    fn delete_by_id(&self, id: i64) -> Result<usize>;
}
