use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::{
    error::{ErrorList, Result},
    events::InboundKind,
    metrics::MetricsSink,
    transport::{path, RemoteFile, Transport},
};

pub const INBOUND_DIR: &str = "inbound";
pub const RETURNED_DIR: &str = "returned";

/// A remote file copied into the local working directory.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub kind: InboundKind,
    /// Remote path, used to delete the file once it has been processed.
    pub remote_path: String,
    pub local: PathBuf,
}

impl DownloadedFile {
    pub fn name(&self) -> String {
        self.local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One download run. The working directory lives as long as this value.
#[derive(Debug)]
pub struct Download {
    dir: TempDir,
    pub files: Vec<DownloadedFile>,
}

impl Download {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn into_dir(self) -> TempDir {
        self.dir
    }
}

pub struct Downloader {
    transport: Arc<dyn Transport>,
    metrics: Arc<dyn MetricsSink>,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { transport, metrics }
    }

    /// Copies inbound and return files into a fresh temporary directory.
    ///
    /// A failed listing for one kind is recorded in `errors` and the other kind
    /// is still fetched.
    pub async fn download(&self, errors: &mut ErrorList) -> Result<Download> {
        let dir = tempfile::Builder::new().prefix("ach-inbound-").tempdir()?;
        tokio::fs::create_dir(dir.path().join(INBOUND_DIR)).await?;
        tokio::fs::create_dir(dir.path().join(RETURNED_DIR)).await?;

        let mut files = Vec::new();
        for kind in [InboundKind::Inbound, InboundKind::Return] {
            let fetched = match kind {
                InboundKind::Inbound => self.transport.get_inbound_files().await,
                InboundKind::Return => self.transport.get_return_files().await,
            };
            let Some(remote) = errors.capture(fetched) else {
                continue;
            };

            let subdir = dir.path().join(subdir_for(kind));
            let count = remote.len();
            for file in remote {
                if let Some(local) = errors.capture(save(&subdir, &file).await) {
                    files.push(DownloadedFile {
                        kind,
                        remote_path: file.path,
                        local,
                    });
                }
            }
            self.metrics
                .incr("inbound_files_downloaded", &[("kind", kind_label(kind))], count as u64);
            if count > 0 {
                info!("Downloaded {} {} files", count, kind_label(kind));
            }
        }

        debug!("Download directory {}", dir.path().display());
        Ok(Download { dir, files })
    }
}

pub fn subdir_for(kind: InboundKind) -> &'static str {
    match kind {
        InboundKind::Inbound => INBOUND_DIR,
        InboundKind::Return => RETURNED_DIR,
    }
}

fn kind_label(kind: InboundKind) -> &'static str {
    match kind {
        InboundKind::Inbound => "inbound",
        InboundKind::Return => "return",
    }
}

async fn save(dir: &Path, file: &RemoteFile) -> Result<PathBuf> {
    let name = path::file_name(&file.name);
    path::validate(name)?;
    let local = dir.join(name);
    tokio::fs::write(&local, &file.contents).await?;
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingMetrics;
    use crate::transport::{AgentTransport, DirectoryConnector, IpAllowlist, TransportPaths};

    #[tokio::test]
    async fn test_download_sorts_files_by_kind() {
        let remote = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(remote.path().join("inbound")).unwrap();
        std::fs::create_dir_all(remote.path().join("returned")).unwrap();
        std::fs::write(remote.path().join("inbound/cor.ach"), b"cor").unwrap();
        std::fs::write(remote.path().join("returned/ret1.ach"), b"r1").unwrap();
        std::fs::write(remote.path().join("returned/ret2.ach"), b"r2").unwrap();

        let transport = Arc::new(AgentTransport::new(
            DirectoryConnector::new(remote.path(), "127.0.0.1".parse().unwrap()),
            IpAllowlist::default(),
            TransportPaths::new("inbound", "outbound", "returned").unwrap(),
        ));
        let metrics = Arc::new(RecordingMetrics::new());
        let downloader = Downloader::new(transport, metrics.clone());

        let mut errors = ErrorList::new();
        let download = downloader.download(&mut errors).await.unwrap();
        assert!(errors.is_empty());
        assert_eq!(download.files.len(), 3);
        assert_eq!(download.files[0].kind, InboundKind::Inbound);
        assert_eq!(download.files[0].remote_path, "inbound/cor.ach");
        assert!(download.path().join("returned/ret2.ach").exists());
        assert_eq!(metrics.get("inbound_files_downloaded", &[("kind", "return")]), 2);
        assert_eq!(metrics.get("inbound_files_downloaded", &[("kind", "inbound")]), 1);

        let dir = download.path().to_path_buf();
        drop(download);
        assert!(!dir.exists());
    }
}
