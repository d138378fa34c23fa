use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::slot::{SlotStore, StoreError};

/// One JSON file per slot under a directory. Writes go to a temp file that
/// is synced and renamed over the target.
#[derive(Debug, Clone)]
pub struct FileSlotStore {
    dir: PathBuf,
}

impl FileSlotStore {
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, slot: &str) -> PathBuf {
        let name: String = slot
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl SlotStore for FileSlotStore {
    async fn read(&self, slot: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(slot)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(slot);
        let tmp = path.with_extension("tmp");

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_data().await?;
        drop(file);

        fs::rename(&tmp, &path).await?;
        debug!("Slot {} written to {}", slot, path.display());
        Ok(())
    }

    async fn clear(&self, slot: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(slot)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
