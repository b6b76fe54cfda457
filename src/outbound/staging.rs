use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{AchError, Result};

const STAGED_EXT: &str = "ach";
const CANCELED_SUFFIX: &str = ".canceled";
const MERGED_DIR: &str = "merged";
const SNAPSHOT_DIR: &str = "snapshots";
const REJECTED_DIR: &str = "rejected";

/// On-disk staging area.
///
/// ```text
/// <root>/<routing>/<transfer>-<leg>.ach       staged, waiting for cutoff
/// <root>/<routing>/<transfer>-<leg>.ach.canceled
/// <root>/snapshots/<routing>-<uuid>/          taken at cutoff
/// <root>/merged/<routing>/<name>.ach          merged, waiting for upload
/// <root>/rejected/                            staged files that failed to decode
/// ```
#[derive(Debug, Clone)]
pub struct Staging {
    root: PathBuf,
}

/// A staged file read back out of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub contents: String,
}

impl Staging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn routing_dir(&self, routing: &str) -> PathBuf {
        self.root.join(routing)
    }

    fn merged_dir(&self, routing: &str) -> PathBuf {
        self.root.join(MERGED_DIR).join(routing)
    }

    /// Writes `<transfer>-<leg>.ach` for a routing number, replacing any
    /// earlier delivery of the same leg.
    pub async fn stage(
        &self,
        routing: &str,
        transfer_id: &str,
        leg: &str,
        contents: &[u8],
    ) -> Result<PathBuf> {
        check_component(routing)?;
        check_component(transfer_id)?;
        check_component(leg)?;

        let dir = self.routing_dir(routing);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}-{}.{}", transfer_id, leg, STAGED_EXT));
        write_atomic(&path, contents).await?;
        debug!("Staged {}", path.display());
        Ok(path)
    }

    /// Tombstones every staged file of a transfer. Returns how many were canceled.
    pub async fn cancel(&self, transfer_id: &str) -> Result<usize> {
        check_component(transfer_id)?;
        let prefix = format!("{}-", transfer_id);

        let mut canceled = 0;
        for routing in self.routings().await? {
            for path in list_files(&self.routing_dir(&routing)).await? {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if name.starts_with(&prefix) && is_staged(&path) {
                    let mut tombstone = path.clone().into_os_string();
                    tombstone.push(CANCELED_SUFFIX);
                    tokio::fs::rename(&path, &tombstone).await?;
                    canceled += 1;
                }
            }
        }
        Ok(canceled)
    }

    /// Routing numbers that have a staging directory.
    pub async fn routings(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut routings = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.len() == 9 && name.chars().all(|c| c.is_ascii_digit()) {
                    routings.push(name.to_string());
                }
            }
        }
        routings.sort();
        Ok(routings)
    }

    /// Routing numbers with merged files still waiting for upload.
    pub async fn merged_routings(&self) -> Result<Vec<String>> {
        let mut routings = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.root.join(MERGED_DIR)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(routings),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if !self.pending_merged(name).await?.is_empty() {
                    routings.push(name.to_string());
                }
            }
        }
        routings.sort();
        Ok(routings)
    }

    /// Moves the routing directory aside so new deliveries start a fresh one.
    ///
    /// Returns `None` when nothing is staged for the routing number.
    pub async fn snapshot(&self, routing: &str) -> Result<Option<PathBuf>> {
        check_component(routing)?;
        let dir = self.routing_dir(routing);
        match tokio::fs::metadata(&dir).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let snapshots = self.root.join(SNAPSHOT_DIR);
        tokio::fs::create_dir_all(&snapshots).await?;
        let snapshot = snapshots.join(format!("{}-{}", routing, uuid::Uuid::new_v4()));
        tokio::fs::rename(&dir, &snapshot).await?;
        Ok(Some(snapshot))
    }

    /// Staged files in a snapshot, tombstones excluded, in name order.
    pub async fn read_snapshot(&self, snapshot: &Path) -> Result<Vec<SnapshotFile>> {
        let mut files = Vec::new();
        for path in list_files(snapshot).await? {
            if !is_staged(&path) {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            files.push(SnapshotFile { path, contents });
        }
        Ok(files)
    }

    pub async fn remove_snapshot(&self, snapshot: &Path) -> Result<()> {
        tokio::fs::remove_dir_all(snapshot).await?;
        Ok(())
    }

    /// Puts a snapshot file back under its routing directory so it waits for
    /// a later cutoff. A newer delivery of the same leg wins over the held copy.
    pub async fn restore(&self, routing: &str, path: &Path) -> Result<PathBuf> {
        check_component(routing)?;
        let name = path
            .file_name()
            .ok_or_else(|| AchError::validation(format!("bad staged path {}", path.display())))?;
        let dir = self.routing_dir(routing);
        tokio::fs::create_dir_all(&dir).await?;
        let target = dir.join(name);
        if tokio::fs::try_exists(&target).await? {
            debug!("Newer {} already staged, dropping held copy", target.display());
            return Ok(target);
        }
        tokio::fs::rename(path, &target).await?;
        Ok(target)
    }

    /// Moves a staged file that cannot be decoded out of the way.
    pub async fn reject(&self, path: &Path) -> Result<PathBuf> {
        let dir = self.root.join(REJECTED_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AchError::validation(format!("bad staged path {}", path.display())))?;
        let target = dir.join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        tokio::fs::rename(path, &target).await?;
        warn!("Moved undecodable staged file to {}", target.display());
        Ok(target)
    }

    /// Writes a merged file, bumping `-<n>` until the name is unused.
    pub async fn write_merged(&self, routing: &str, stem: &str, contents: &[u8]) -> Result<PathBuf> {
        check_component(routing)?;
        check_component(stem)?;
        let dir = self.merged_dir(routing);
        tokio::fs::create_dir_all(&dir).await?;

        let mut path = dir.join(format!("{}.{}", stem, STAGED_EXT));
        let mut n = 1;
        while tokio::fs::try_exists(&path).await? {
            path = dir.join(format!("{}-{}.{}", stem, n, STAGED_EXT));
            n += 1;
        }
        write_atomic(&path, contents).await?;
        Ok(path)
    }

    /// Merged files of a routing number that have not been uploaded yet.
    pub async fn pending_merged(&self, routing: &str) -> Result<Vec<PathBuf>> {
        check_component(routing)?;
        Ok(list_files(&self.merged_dir(routing))
            .await?
            .into_iter()
            .filter(|p| is_staged(p))
            .collect())
    }

    pub async fn remove_merged(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

/// Rejects anything that could leave the staging directory.
fn check_component(value: &str) -> Result<()> {
    if value.is_empty() || value.contains(['/', '\\']) || value.contains("..") {
        return Err(AchError::PathEscape(value.to_string()));
    }
    Ok(())
}

fn is_staged(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(STAGED_EXT)
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    tokio::fs::write(&partial, contents).await?;
    tokio::fs::rename(&partial, path).await?;
    Ok(())
}
