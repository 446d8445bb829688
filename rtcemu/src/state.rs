//! Durable record of the active lab.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// One firewall rule, stored in all three forms it is used in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub check_args: Vec<String>,
    pub add_args: Vec<String>,
    pub del_args: Vec<String>,
}

/// Everything needed to tear a lab down again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabState {
    pub bridge: String,
    pub subnet: String,
    pub nodes: Vec<String>,
    pub rules: Vec<FirewallRule>,
    /// `net.ipv4.ip_forward` before the lab touched it; empty when unknown.
    pub ip_forward_before: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("lab state not found")]
    NotFound,
    #[error("failed to read state file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse state file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write state file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to serialize lab state: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to remove state file {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// [`StateError::NotFound`] means no lab exists; any other error means the
    /// record could not be trusted.
    async fn load(&self) -> Result<LabState, StateError>;

    /// Replace the record. Readers see either the old or the new one.
    async fn save(&self, state: &LabState) -> Result<(), StateError>;

    /// Remove the record. Removing an absent record succeeds.
    async fn delete(&self) -> Result<(), StateError>;
}

/// JSON file at a fixed path, replaced with write-then-rename.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<LabState, StateError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StateError::NotFound),
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&data).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, state: &LabState) -> Result<(), StateError> {
        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(parent)
                .await
                .map_err(write_err)?;
        }

        let data = serde_json::to_vec_pretty(state).map_err(StateError::Serialize)?;
        let tmp = self.tmp_path();

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true).mode(0o600);
        let mut file = options.open(&tmp).await.map_err(write_err)?;
        file.write_all(&data).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        if let Err(source) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(write_err(source));
        }

        debug!(path = %self.path.display(), "saved lab state");
        Ok(())
    }

    async fn delete(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LabState {
        LabState {
            bridge: "rtcemu0".into(),
            subnet: "10.200.0.0/24".into(),
            nodes: vec!["node1".into(), "node2".into()],
            rules: vec![FirewallRule {
                check_args: vec!["-C".into(), "FORWARD".into()],
                add_args: vec!["-A".into(), "FORWARD".into()],
                del_args: vec!["-D".into(), "FORWARD".into()],
            }],
            ip_forward_before: "0".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("lab.json"));
        assert!(store.load().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("lab.json");
        let store = FileStateStore::new(&path);

        store.save(&sample()).await.unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("run").join("lab.json.tmp").exists());
        assert_eq!(store.load().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_saved_file_uses_stable_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");
        FileStateStore::new(&path).save(&sample()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["bridge"], "rtcemu0");
        assert_eq!(raw["ip_forward_before"], "0");
        assert_eq!(raw["rules"][0]["del_args"][0], "-D");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_not_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = FileStateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StateError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("lab.json"));

        store.save(&sample()).await.unwrap();
        store.delete().await.unwrap();
        store.delete().await.unwrap();
        assert!(store.load().await.unwrap_err().is_not_found());
    }
}
