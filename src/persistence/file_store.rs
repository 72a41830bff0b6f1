// Default file-backed persistence (SPEC_FULL 4.C.1): one file per entry,
// named `<direction>-<packet_id>.bin` under a per-client-id subdirectory, so
// crash-consistency is a single-file-write property rather than requiring a
// write-ahead log.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ClientError, Result};

use super::PersistenceStore;

pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| ClientError::Persistence(e.to_string()))?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let (client_id, rest) = key
            .split_once('/')
            .ok_or_else(|| ClientError::Persistence(format!("malformed key {key:?}")))?;
        let file_name = rest.replace('/', "-");
        Ok(self.base_dir.join(client_id).join(format!("{file_name}.bin")))
    }
}

impl PersistenceStore for FileStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ClientError::Persistence(e.to_string()))?;
        }
        let mut file =
            fs::File::create(&path).map_err(|e| ClientError::Persistence(e.to_string()))?;
        file.write_all(bytes).map_err(|e| ClientError::Persistence(e.to_string()))?;
        file.sync_all().map_err(|e| ClientError::Persistence(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Persistence(e.to_string())),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) | Err(_) => Ok(()), // fire-and-forget; duplicate delivery is tolerated
        }
    }

    fn keys(&self, client_id: &str) -> Result<Vec<String>> {
        let dir = self.base_dir.join(client_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| ClientError::Persistence(e.to_string()))? {
            let entry = entry.map_err(|e| ClientError::Persistence(e.to_string()))?;
            if let Some(stem) = stem_as_key(&entry.path(), client_id) {
                out.push(stem);
            }
        }
        Ok(out)
    }
}

fn stem_as_key(path: &Path, client_id: &str) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (direction, packet_id) = stem.split_once('-')?;
    Some(format!("{client_id}/{direction}/{packet_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::PacketId;

    #[test]
    fn put_get_remove_roundtrip() {
        let dir = std::env::temp_dir().join(format!("mqtt-client-test-{}", std::process::id()));
        let store = FileStore::new(&dir).unwrap();
        let key = super::super::persistence_key("client-1", super::super::Direction::Outbound, PacketId::new(7));
        store.put(&key, b"payload").unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(b"payload".to_vec()));
        store.remove(&key).unwrap();
        assert_eq!(store.get(&key).unwrap(), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn keys_enumerates_client_namespace() {
        let dir = std::env::temp_dir().join(format!("mqtt-client-test-keys-{}", std::process::id()));
        let store = FileStore::new(&dir).unwrap();
        let k1 = super::super::persistence_key("client-2", super::super::Direction::Outbound, PacketId::new(1));
        let k2 = super::super::persistence_key("client-2", super::super::Direction::Inbound, PacketId::new(2));
        store.put(&k1, b"a").unwrap();
        store.put(&k2, b"b").unwrap();
        let mut keys = store.keys("client-2").unwrap();
        keys.sort();
        assert_eq!(keys.len(), 2);
        let _ = fs::remove_dir_all(&dir);
    }
}
