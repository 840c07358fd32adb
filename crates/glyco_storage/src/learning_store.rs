#![forbid(unsafe_code)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use glyco_kernel_contracts::learning_state::{StoredLearningState, LEARNING_STATE_VERSION};
use glyco_kernel_contracts::{MonotonicTimeMs, Validate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::StorageError;

/// A single place where one learning blob lives.
pub trait LearningSlot: std::fmt::Debug {
    fn read(&self) -> Result<Option<String>, StorageError>;
    fn write(&mut self, payload: &str) -> Result<(), StorageError>;
    fn clear(&mut self) -> Result<(), StorageError>;
}

/// File-backed slot. Writes land in a sibling `.tmp` file and are renamed
/// over the target, so readers see either the old blob or the new one.
#[derive(Debug, Clone)]
pub struct FileLearningSlot {
    path: PathBuf,
}

impl FileLearningSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        tmp.set_extension("tmp");
        tmp
    }
}

impl LearningSlot for FileLearningSlot {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&mut self, payload: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.tmp_path();
        fs::write(&tmp, payload.as_bytes())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        for path in [self.path.clone(), self.tmp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLearningSlot {
    payload: Option<String>,
}

impl InMemoryLearningSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Some(payload.into()),
        }
    }
}

impl LearningSlot for InMemoryLearningSlot {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.payload.clone())
    }

    fn write(&mut self, payload: &str) -> Result<(), StorageError> {
        self.payload = Some(payload.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.payload = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LearningEnvelope {
    version: String,
    saved_at_millis: MonotonicTimeMs,
    digest_sha256: String,
    /// Exact bytes the digest covers.
    state_json: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Restored(StoredLearningState),
    Absent,
    VersionMismatch { found: String },
    Corrupt { reason: String },
}

#[derive(Debug)]
pub struct LearningStore {
    slot: Box<dyn LearningSlot>,
    version: String,
}

impl LearningStore {
    pub fn new(slot: Box<dyn LearningSlot>) -> Self {
        Self::with_version(slot, LEARNING_STATE_VERSION)
    }

    pub fn with_version(slot: Box<dyn LearningSlot>, version: impl Into<String>) -> Self {
        Self {
            slot,
            version: version.into(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(FileLearningSlot::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryLearningSlot::new()))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn save(&mut self, state: &StoredLearningState) -> Result<(), StorageError> {
        state.validate()?;
        let state_json = serde_json::to_string(state)?;
        let envelope = LearningEnvelope {
            version: self.version.clone(),
            saved_at_millis: state.saved_at_millis,
            digest_sha256: sha256_hex(state_json.as_bytes()),
            state_json,
        };
        let payload = serde_json::to_string_pretty(&envelope)?;
        self.slot.write(&payload)?;
        debug!(records = state.evidence.len(), "learning state saved");
        Ok(())
    }

    /// Reads the slot. Unreadable, torn or tampered blobs come back as
    /// `Corrupt`; only slot I/O failures are errors.
    pub fn restore(&self) -> Result<RestoreOutcome, StorageError> {
        let Some(raw) = self.slot.read()? else {
            return Ok(RestoreOutcome::Absent);
        };
        match self.decode(&raw) {
            Ok(state) => Ok(RestoreOutcome::Restored(state)),
            Err(StorageError::VersionMismatch { found, .. }) => {
                warn!(found = found.as_str(), expected = self.version.as_str(), "learning blob version mismatch");
                Ok(RestoreOutcome::VersionMismatch { found })
            }
            Err(StorageError::Io(err)) => Err(StorageError::Io(err)),
            Err(err) => {
                warn!(error = %err, "learning blob unreadable; treating as absent");
                Ok(RestoreOutcome::Corrupt {
                    reason: err.to_string(),
                })
            }
        }
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.slot.clear()
    }

    fn decode(&self, raw: &str) -> Result<StoredLearningState, StorageError> {
        let envelope: LearningEnvelope = serde_json::from_str(raw)?;
        if envelope.version != self.version {
            return Err(StorageError::VersionMismatch {
                found: envelope.version,
                expected: self.version.clone(),
            });
        }
        let actual = sha256_hex(envelope.state_json.as_bytes());
        if actual != envelope.digest_sha256 {
            return Err(StorageError::IntegrityMismatch {
                expected: envelope.digest_sha256,
                actual,
            });
        }
        let state: StoredLearningState = serde_json::from_str(&envelope.state_json)?;
        if state.version != self.version {
            return Err(StorageError::VersionMismatch {
                found: state.version,
                expected: self.version.clone(),
            });
        }
        Ok(state)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
