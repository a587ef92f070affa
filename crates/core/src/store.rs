//! Persistence API and the in-memory entity store.
//!
//! Entities are stored schemaless as JSON values keyed by `(kind, id)`,
//! the way a subgraph store keeps them. [`Store::load_or_create`] is the
//! atomic check-then-act used by every get-or-create in the repository.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entity table discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Account,
    Position,
    Transaction,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Account => "Account",
            Self::Position => "AccountCToken",
            Self::Transaction => "AccountCTokenTransaction",
        };
        f.write_str(name)
    }
}

/// A persisted record with a stable string id.
pub trait Entity: Serialize + DeserializeOwned + Clone {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored {kind} '{id}' could not be decoded: {source}")]
    Corrupt {
        kind: EntityKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} '{id}' could not be encoded: {source}")]
    Encode {
        kind: EntityKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Load/save persistence API.
///
/// Implementations must give read-your-writes consistency: a `load` issued
/// after a `save` of the same id observes that save.
pub trait Store: Send + Sync {
    fn load<E: Entity>(&self, id: &str) -> Result<Option<E>, StoreError>;

    fn save<E: Entity>(&self, entity: &E) -> Result<(), StoreError>;

    /// Load `id`, or persist `create()` if absent, as one atomic step.
    ///
    /// Returns the entity and whether it was created by this call.
    fn load_or_create<E, F>(&self, id: &str, create: F) -> Result<(E, bool), StoreError>
    where
        E: Entity,
        F: FnOnce() -> E;

    /// Every stored entity of kind `E`.
    fn scan<E: Entity>(&self) -> Result<Vec<E>, StoreError>;

    fn count(&self, kind: EntityKind) -> usize;
}

/// DashMap-backed store for a single process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: DashMap<(EntityKind, String), serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn encode<E: Entity>(entity: &E) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(entity).map_err(|source| StoreError::Encode {
            kind: E::KIND,
            id: entity.id().to_string(),
            source,
        })
    }

    fn decode<E: Entity>(id: &str, value: &serde_json::Value) -> Result<E, StoreError> {
        E::deserialize(value).map_err(|source| StoreError::Corrupt {
            kind: E::KIND,
            id: id.to_string(),
            source,
        })
    }
}

impl Store for MemoryStore {
    fn load<E: Entity>(&self, id: &str) -> Result<Option<E>, StoreError> {
        match self.entities.get(&(E::KIND, id.to_string())) {
            Some(value) => Self::decode(id, value.value()).map(Some),
            None => Ok(None),
        }
    }

    fn save<E: Entity>(&self, entity: &E) -> Result<(), StoreError> {
        let value = Self::encode(entity)?;
        self.entities
            .insert((E::KIND, entity.id().to_string()), value);
        Ok(())
    }

    fn load_or_create<E, F>(&self, id: &str, create: F) -> Result<(E, bool), StoreError>
    where
        E: Entity,
        F: FnOnce() -> E,
    {
        // The entry guard holds the shard lock, so no other caller can
        // create the same key between the check and the insert.
        match self.entities.entry((E::KIND, id.to_string())) {
            Entry::Occupied(entry) => Self::decode(id, entry.get()).map(|e| (e, false)),
            Entry::Vacant(entry) => {
                let entity = create();
                entry.insert(Self::encode(&entity)?);
                Ok((entity, true))
            }
        }
    }

    fn scan<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        self.entities
            .iter()
            .filter(|entry| entry.key().0 == E::KIND)
            .map(|entry| Self::decode(&entry.key().1, entry.value()))
            .collect()
    }

    fn count(&self, kind: EntityKind) -> usize {
        self.entities.iter().filter(|entry| entry.key().0 == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: String,
        value: u32,
    }

    impl Entity for Sample {
        const KIND: EntityKind = EntityKind::Account;

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn sample(id: &str, value: u32) -> Sample {
        Sample { id: id.to_string(), value }
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        assert_eq!(store.load::<Sample>("a").unwrap(), None);

        store.save(&sample("a", 1)).unwrap();
        assert_eq!(store.load::<Sample>("a").unwrap(), Some(sample("a", 1)));

        store.save(&sample("a", 2)).unwrap();
        assert_eq!(store.load::<Sample>("a").unwrap(), Some(sample("a", 2)));
        assert_eq!(store.count(EntityKind::Account), 1);
    }

    #[test]
    fn test_load_or_create_only_creates_once() {
        let store = MemoryStore::new();

        let (first, created) = store.load_or_create("a", || sample("a", 7)).unwrap();
        assert!(created);
        assert_eq!(first.value, 7);

        let (second, created) = store.load_or_create("a", || sample("a", 99)).unwrap();
        assert!(!created);
        assert_eq!(second, first);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_kinds_do_not_collide() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Other {
            id: String,
        }
        impl Entity for Other {
            const KIND: EntityKind = EntityKind::Transaction;
            fn id(&self) -> &str {
                &self.id
            }
        }

        let store = MemoryStore::new();
        store.save(&sample("x", 1)).unwrap();
        store.save(&Other { id: "x".into() }).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.scan::<Sample>().unwrap().len(), 1);
        assert_eq!(store.count(EntityKind::Transaction), 1);
    }

    #[test]
    fn test_corrupt_value_is_reported() {
        let store = MemoryStore::new();
        store
            .entities
            .insert((EntityKind::Account, "bad".into()), serde_json::json!({"id": 5}));

        let err = store.load::<Sample>("bad").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { kind: EntityKind::Account, .. }));
    }
}
