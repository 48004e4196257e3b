//! On-disk store for decoded messages.
//!
//! Character detail is the latest-state cache: one `<character_id>.json` per
//! character, overwritten on every capture. Every other recognised message is
//! appended as a uniquely named diagnostic file. Only identifier-named files
//! are ever read back.

use crate::error::StorageError;
use chrono::Utc;
use stashsort_protocol::{CharacterDataBase, CharacterInfoResponse, Message};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

/// Where a persisted message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    /// Character detail, written to the character's own file.
    Character { character_id: u64, path: PathBuf },
    /// Diagnostic trail entry.
    Diagnostic { path: PathBuf },
}

impl Persisted {
    pub fn path(&self) -> &Path {
        match self {
            Persisted::Character { path, .. } | Persisted::Diagnostic { path } => path,
        }
    }

    pub fn character_id(&self) -> Option<u64> {
        match self {
            Persisted::Character { character_id, .. } => Some(*character_id),
            Persisted::Diagnostic { .. } => None,
        }
    }
}

/// Directory of persisted messages.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Opens or creates a store at the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists a decoded message.
    pub fn persist(&self, message: &Message) -> Result<Persisted, StorageError> {
        let data = message.to_json()?;

        if let Message::CharacterInfo(info) = message {
            if let Some(character) = info.character() {
                let character_id = character.character_id;
                let path = self.character_path(character_id);
                self.write_atomic(&path, &data)?;
                tracing::info!(
                    "Saved character {} ({}) to {}",
                    character_id,
                    character.display_name(),
                    path.display()
                );
                return Ok(Persisted::Character { character_id, path });
            }
        }

        let path = self.dir.join(format!(
            "{}_{}_{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            message.command().name(),
            &Uuid::new_v4().simple().to_string()[..8]
        ));
        let mut file = File::create(&path)?;
        file.write_all(&data)?;
        tracing::debug!("Saved {} to {}", message.command(), path.display());
        Ok(Persisted::Diagnostic { path })
    }

    /// Ids of every character with a saved detail file, ascending.
    pub fn list_characters(&self) -> Result<Vec<u64>, StorageError> {
        let mut ids: Vec<u64> = self
            .character_files()?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// The character whose detail file was written most recently.
    pub fn latest_character(&self) -> Result<Option<u64>, StorageError> {
        Ok(self
            .character_files()?
            .into_iter()
            .max_by_key(|(id, modified)| (*modified, *id))
            .map(|(id, _)| id))
    }

    /// Loads the saved detail of one character.
    pub fn load_character(&self, character_id: u64) -> Result<CharacterDataBase, StorageError> {
        let path = self.character_path(character_id);
        if !path.exists() {
            return Err(StorageError::CharacterNotFound(character_id));
        }

        let reader = BufReader::new(File::open(&path)?);
        let response: CharacterInfoResponse = serde_json::from_reader(reader)?;
        response
            .character_data_base
            .ok_or(StorageError::CharacterNotFound(character_id))
    }

    fn character_path(&self, character_id: u64) -> PathBuf {
        self.dir.join(format!("{}.json", character_id))
    }

    fn character_files(&self) -> Result<Vec<(u64, SystemTime)>, StorageError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            let modified = entry.metadata()?.modified()?;
            files.push((id, modified));
        }
        Ok(files)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashsort_protocol::{CharacterListResponse, CharacterSummary, ItemInfo, StorageInfo};
    use tempfile::TempDir;

    fn detail(character_id: u64, level: u32) -> Message {
        Message::CharacterInfo(CharacterInfoResponse {
            result: CharacterInfoResponse::RESULT_OK,
            character_data_base: Some(CharacterDataBase {
                character_id,
                level,
                storage_infos: vec![StorageInfo {
                    inventory_id: 4,
                    items: vec![ItemInfo {
                        item_unique_id: 1,
                        item_id: "DesignDataItem:Id_Item_Gem_1001".to_string(),
                        slot_id: Some(0),
                        ..Default::default()
                    }],
                }],
                ..Default::default()
            }),
        })
    }

    fn json_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_character_detail_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let first = store.persist(&detail(42, 1)).unwrap();
        let second = store.persist(&detail(42, 7)).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.character_id(), Some(42));

        assert_eq!(json_files(dir.path()), vec!["42.json".to_string()]);
        let loaded = store.load_character(42).unwrap();
        assert_eq!(loaded.level, 7);
        assert_eq!(loaded.storage_infos[0].items[0].slot_id, Some(0));
    }

    #[test]
    fn test_other_messages_are_diagnostic() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let list = Message::CharacterList(CharacterListResponse {
            result: 1,
            character_list: vec![CharacterSummary {
                character_id: 42,
                ..Default::default()
            }],
            ..Default::default()
        });

        let a = store.persist(&list).unwrap();
        let b = store.persist(&list).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("S2C_ACCOUNT_CHARACTER_LIST_RES"));

        // A failed lookup is not a character snapshot.
        let failed = Message::CharacterInfo(CharacterInfoResponse {
            result: 0,
            character_data_base: None,
        });
        assert!(matches!(store.persist(&failed).unwrap(), Persisted::Diagnostic { .. }));

        assert!(store.list_characters().unwrap().is_empty());
        assert_eq!(json_files(dir.path()).len(), 3);
    }

    #[test]
    fn test_list_and_latest() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path().join("nested")).unwrap();
        store.persist(&detail(9, 1)).unwrap();
        store.persist(&detail(3, 1)).unwrap();
        fs::write(store.dir().join("notes.json"), b"{}").unwrap();
        fs::write(store.dir().join("5.json.tmp"), b"{}").unwrap();

        assert_eq!(store.list_characters().unwrap(), vec![3, 9]);
        assert!(store.latest_character().unwrap().is_some());
    }

    #[test]
    fn test_load_missing_character() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let err = store.load_character(1).unwrap_err();
        assert!(err.is_not_found());
    }
}
