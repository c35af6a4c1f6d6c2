// Persisted shape shared by everything the durable store holds

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A versioned, identifiable row of one collection
///
/// Each collection is one `{collection}.jsonl` file; the latest version of a
/// record (by `updated_at`) wins on replay.
pub trait Record: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Milliseconds since epoch
    fn updated_at(&self) -> i64;

    fn collection_name() -> &'static str
    where
        Self: Sized;

    /// Field name to value pairs kept in the lookup index, queried with
    /// [`crate::filter::Filter`]
    fn indexed_fields(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}
