//! Optional durability hook behind the cache tier
//!
//! The cache tier alone loses everything on restart. A `PersistenceHook`
//! receives every write and delete and can replay its contents into a fresh
//! store.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::types::{MemoryEntry, MemoryId};

/// Write-through durability for memory entries
pub trait PersistenceHook: Send + Sync {
    /// Persist the current version of an entry
    fn save(&self, entry: &MemoryEntry) -> Result<()>;

    /// Forget an entry; removing an unknown entry is not an error
    fn remove(&self, user_id: &str, id: MemoryId) -> Result<()>;

    /// Every persisted entry, used to rehydrate a store
    fn load_all(&self) -> Result<Vec<MemoryEntry>>;
}

/// One JSON file per entry under `<root>/<hex(user_id)>/<id>.json`
pub struct JsonDirPersistence {
    root: PathBuf,
}

impl JsonDirPersistence {
    /// Open (and create if needed) a persistence directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        // Hex keeps arbitrary user ids filesystem-safe
        self.root.join(hex::encode(user_id.as_bytes()))
    }

    fn entry_path(&self, user_id: &str, id: MemoryId) -> PathBuf {
        self.user_dir(user_id).join(format!("{}.json", id))
    }
}

impl PersistenceHook for JsonDirPersistence {
    fn save(&self, entry: &MemoryEntry) -> Result<()> {
        let dir = self.user_dir(&entry.user_id);
        fs::create_dir_all(&dir)?;

        let mut stored = entry.clone();
        stored.relevance_cache = None;
        let bytes = serde_json::to_vec_pretty(&stored)?;

        // Write-then-rename so a crash never leaves a torn file
        let path = self.entry_path(&entry.user_id, entry.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, user_id: &str, id: MemoryId) -> Result<()> {
        match fs::remove_file(self.entry_path(user_id, id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load_all(&self) -> Result<Vec<MemoryEntry>> {
        let mut entries = Vec::new();
        for user_dir in fs::read_dir(&self.root)? {
            let user_dir = user_dir?;
            if !user_dir.file_type()?.is_dir() {
                continue;
            }
            for file in fs::read_dir(user_dir.path())? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let bytes = fs::read(&path)?;
                let entry: MemoryEntry = serde_json::from_slice(&bytes).map_err(|e| {
                    StoreError::Persistence(format!("{}: {}", path.display(), e))
                })?;
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn entry(user_id: &str, content: &str) -> MemoryEntry {
        let now = Utc::now();
        MemoryEntry {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: content.into(),
            memory_type: MemoryType::Instruction,
            tags: vec!["t".into()],
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            relevance_cache: None,
        }
    }

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let hook = JsonDirPersistence::open(dir.path()).unwrap();

        let a = entry("user/with:odd chars", "always answer in French");
        let b = entry("u2", "short replies");
        hook.save(&a).unwrap();
        hook.save(&b).unwrap();

        let loaded = hook.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains(&a));

        hook.remove(&a.user_id, a.id).unwrap();
        hook.remove(&a.user_id, a.id).unwrap();
        let loaded = hook.load_all().unwrap();
        assert_eq!(loaded, vec![b]);
    }

    #[test]
    fn test_corrupt_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let hook = JsonDirPersistence::open(dir.path()).unwrap();
        let user_dir = dir.path().join("7531");
        fs::create_dir_all(&user_dir).unwrap();
        fs::write(user_dir.join("broken.json"), b"{not json").unwrap();

        let err = hook.load_all().unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert!(err.to_string().contains("broken.json"));
    }
}
