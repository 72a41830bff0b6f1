// In-memory persistence, useful for tests and for callers who accept that a
// process restart loses in-flight state. `put` is "durable" the instant the
// lock is released; there is no crash to survive.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;

use super::PersistenceStore;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn keys(&self, client_id: &str) -> Result<Vec<String>> {
        let prefix = format!("{client_id}/");
        Ok(self.entries.lock().unwrap().keys().filter(|k| k.starts_with(&prefix)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{persistence_key, Direction};
    use codec::PacketId;

    #[test]
    fn put_get_remove_roundtrip() {
        let store = MemoryStore::new();
        let key = persistence_key("client-1", Direction::Outbound, PacketId::new(3));
        store.put(&key, b"hi").unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(b"hi".to_vec()));
        store.remove(&key).unwrap();
        assert_eq!(store.get(&key).unwrap(), None);
    }

    #[test]
    fn keys_are_scoped_per_client() {
        let store = MemoryStore::new();
        store.put(&persistence_key("a", Direction::Outbound, PacketId::new(1)), b"x").unwrap();
        store.put(&persistence_key("b", Direction::Outbound, PacketId::new(1)), b"y").unwrap();
        assert_eq!(store.keys("a").unwrap().len(), 1);
    }
}
