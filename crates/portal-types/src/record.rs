//! Record trait

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A uniquely keyed unit of persisted data.
///
/// Every implementor lives in its own collection, so keys only need to be
/// unique within one type. Writing a record whose key already exists replaces
/// the stored value entirely (last write wins, no merge).
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name. Must differ between record types.
    const COLLECTION: &'static str;

    /// Serialized field names kept in a secondary index.
    ///
    /// Lookups on other fields still work but scan the whole collection.
    const INDEXES: &'static [&'static str] = &[];

    /// The key of this record within its collection. Never empty for a
    /// record that can be stored.
    fn key(&self) -> &str;
}
