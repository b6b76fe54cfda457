use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::{
    error::{AchError, Result},
    transport::agent::{Connector, RemoteSession},
};

/// Connects to an ODFI mailbox mounted as a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryConnector {
    root: PathBuf,
    address: IpAddr,
}

impl DirectoryConnector {
    /// `address` is the host the mount is served from.
    pub fn new(root: impl Into<PathBuf>, address: IpAddr) -> Self {
        Self {
            root: root.into(),
            address,
        }
    }
}

#[async_trait]
impl Connector for DirectoryConnector {
    type Session = DirectorySession;

    async fn connect(&self) -> Result<DirectorySession> {
        let meta = tokio::fs::metadata(&self.root).await.map_err(|e| {
            AchError::Transport(format!("mailbox {} unavailable: {}", self.root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(AchError::Transport(format!(
                "mailbox {} is not a directory",
                self.root.display()
            )));
        }
        Ok(DirectorySession {
            root: self.root.clone(),
            address: self.address,
        })
    }
}

pub struct DirectorySession {
    root: PathBuf,
    address: IpAddr,
}

impl DirectorySession {
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(Path::new(path))
    }
}

#[async_trait]
impl RemoteSession for DirectorySession {
    fn peer_addr(&self) -> Option<IpAddr> {
        Some(self.address)
    }

    async fn ping(&mut self) -> Result<()> {
        tokio::fs::metadata(&self.root)
            .await
            .map(|_| ())
            .map_err(|e| AchError::Transport(format!("mailbox unreachable: {}", e)))
    }

    async fn list(&mut self, dir: &str) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.resolve(dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(path)).await?)
    }

    async fn write(&mut self, path: &str, contents: &[u8]) -> Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = target.with_extension("part");
        tokio::fs::write(&partial, contents).await?;
        tokio::fs::rename(&partial, &target).await?;
        Ok(())
    }

    async fn remove(&mut self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
