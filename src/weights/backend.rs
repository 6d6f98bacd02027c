// Durable storage for per-conversation weight vectors
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

use crate::errors::{ChatError, Result};
use crate::weights::vector::ExpertWeightVector;

/// Persisted state for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub conversation_id: String,
    pub weights: ExpertWeightVector,
    /// Reference point for lazy decay
    pub last_decay: DateTime<Utc>,
    /// Feedback events applied so far
    #[serde(default)]
    pub updates: u64,
}

impl WeightRecord {
    pub fn uniform(conversation_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            weights: ExpertWeightVector::uniform(),
            last_decay: now,
            updates: 0,
        }
    }
}

/// Storage seam behind the weight store
#[async_trait]
pub trait WeightBackend: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<WeightRecord>>;

    async fn save(&self, record: &WeightRecord) -> Result<()>;

    async fn delete(&self, conversation_id: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<String>>;
}

/// Process-local backend for tests and ephemeral runs
#[derive(Default)]
pub struct InMemoryWeightBackend {
    records: RwLock<HashMap<String, WeightRecord>>,
}

impl InMemoryWeightBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WeightBackend for InMemoryWeightBackend {
    async fn load(&self, conversation_id: &str) -> Result<Option<WeightRecord>> {
        Ok(self.records.read().await.get(conversation_id).cloned())
    }

    async fn save(&self, record: &WeightRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.conversation_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.records.write().await.remove(conversation_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

const FILE_PREFIX: &str = "weights_";
const FILE_SUFFIX: &str = ".json";

/// One JSON file per conversation under `storage_dir`
pub struct FileWeightBackend {
    storage_dir: PathBuf,
}

impl FileWeightBackend {
    /// Create the backend, creating the directory if needed
    pub async fn new(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        fs::create_dir_all(&storage_dir).await.map_err(|e| {
            ChatError::WeightStoreError(format!(
                "Failed to create weight storage directory {}: {}",
                storage_dir.display(),
                e
            ))
        })?;
        Ok(Self { storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        self.storage_dir.join(format!(
            "{}{}{}",
            FILE_PREFIX,
            encode_id(conversation_id),
            FILE_SUFFIX
        ))
    }
}

#[async_trait]
impl WeightBackend for FileWeightBackend {
    async fn load(&self, conversation_id: &str) -> Result<Option<WeightRecord>> {
        let path = self.path_for(conversation_id);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ChatError::WeightStoreError(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let record: WeightRecord = serde_json::from_str(&json)?;
        Ok(Some(record))
    }

    async fn save(&self, record: &WeightRecord) -> Result<()> {
        let path = self.path_for(&record.conversation_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;

        // Write-then-rename so readers never see a partial file
        fs::write(&tmp, json).await.map_err(|e| {
            ChatError::WeightStoreError(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).await.map_err(|e| {
            ChatError::WeightStoreError(format!("Failed to commit {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        let path = self.path_for(conversation_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.storage_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(encoded) = filename
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            {
                if let Some(id) = decode_id(encoded) {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

/// Filename-safe id: `[A-Za-z0-9_-]` pass through, other bytes become `%XX`
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_id(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
