// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Durable JSON key/value store on the local filesystem

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Durable key/value store for recorder state
///
/// Every value is a JSON document in its own file under the data directory.
/// Reads treat missing or malformed entries as absent, so a corrupted file
/// can never take the recorder down.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Ensure the data directory exists and drop abandoned staging files
    pub async fn initialize(&self) -> Result<()> {
        if !self.base_path.exists() {
            info!("Creating data directory: {}", self.base_path.display());
            fs::create_dir_all(&self.base_path)
                .await
                .context("Failed to create data directory")?;
            return Ok(());
        }

        // A temp file left behind by an interrupted write is dead at startup
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .context("Failed to scan data directory")?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to scan data directory")?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                debug!("Removing abandoned temp file: {}", path.display());
                if let Err(e) = fs::remove_file(&path).await {
                    warn!("Cannot remove temp file {}: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.json", key_to_file_name(key)))
    }

    /// Read a value; missing and malformed entries both come back as `None`
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.file_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read key '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding malformed entry for key '{}': {}", key, e);
                None
            }
        }
    }

    /// Write a value, replacing any previous one
    ///
    /// Goes through a temp file and a rename so a crash mid-write leaves
    /// either the old value or the new one, never half of each. The temp
    /// name is unique per write; two writers racing on one key each stage
    /// into their own file and the last rename wins whole.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.file_path(key);
        let json = serde_json::to_string(value).context("Failed to serialize value")?;

        let tmp_path = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        let mut file = fs::File::create(&tmp_path)
            .await
            .context(format!("Failed to create file: {}", tmp_path.display()))?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write value")?;
        file.flush().await.context("Failed to flush value")?;
        drop(file);

        fs::rename(&tmp_path, &path)
            .await
            .context(format!("Failed to persist key '{}'", key))?;

        debug!("Wrote {} bytes to key '{}'", json.len(), key);
        Ok(())
    }

    /// Remove a key; removing an absent key is not an error
    pub async fn remove(&self, key: &str) -> Result<()> {
        let path = self.file_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!("Failed to remove key '{}'", key)),
        }
    }
}

/// Map a store key to a safe file name
pub fn key_to_file_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
