//! Record identity, collections, and the record trait

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Identifier of a record, unique within its collection.
///
/// Records created on this device get a UUID v7; records that originate on the
/// server keep whatever opaque string id the server assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a new time-sortable id for a locally created record
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The synchronized record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    CustomersB2B,
    CustomersB2C,
    WorkApprovals,
}

impl Collection {
    /// Every synchronized collection, in sync order
    pub const fn all() -> [Self; 4] {
        [
            Self::Users,
            Self::CustomersB2B,
            Self::CustomersB2C,
            Self::WorkApprovals,
        ]
    }

    /// Storage table and wire key for this collection
    pub const fn table(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::CustomersB2B => "customers_b2b",
            Self::CustomersB2C => "customers_b2c",
            Self::WorkApprovals => "work_approvals",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::all()
            .into_iter()
            .find(|collection| collection.table() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("unknown collection: {s}")))
    }
}

/// A typed record stored in one collection.
///
/// Implementors are plain serde structs whose field names match the column
/// names of their table; the store maps them to rows through the table's
/// static schema.
pub trait Record:
    Serialize + DeserializeOwned + Clone + Default + fmt::Debug + Send + Sync + 'static
{
    const COLLECTION: Collection;

    fn id(&self) -> &RecordId;
    fn set_id(&mut self, id: RecordId);
    fn created_at(&self) -> i64;
    fn updated_at(&self) -> i64;
    fn set_timestamps(&mut self, created_at: i64, updated_at: i64);
}

macro_rules! impl_record {
    ($ty:ty, $collection:expr) => {
        impl $crate::models::Record for $ty {
            const COLLECTION: $crate::models::Collection = $collection;

            fn id(&self) -> &$crate::models::RecordId {
                &self.id
            }

            fn set_id(&mut self, id: $crate::models::RecordId) {
                self.id = id;
            }

            fn created_at(&self) -> i64 {
                self.created_at
            }

            fn updated_at(&self) -> i64 {
                self.updated_at
            }

            fn set_timestamps(&mut self, created_at: i64, updated_at: i64) {
                self.created_at = created_at;
                self.updated_at = updated_at;
            }
        }
    };
}

pub(crate) use impl_record;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }

    #[test]
    fn record_id_serializes_as_plain_string() {
        let id = RecordId::from("srv-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"srv-42\"");
    }

    #[test]
    fn collection_parses_table_names_and_dashes() {
        assert_eq!(
            "customers-b2c".parse::<Collection>().unwrap(),
            Collection::CustomersB2C
        );
        assert_eq!(
            "work_approvals".parse::<Collection>().unwrap(),
            Collection::WorkApprovals
        );
        assert!("orders".parse::<Collection>().is_err());
    }
}
