use futures::future::join_all;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{
    config::InboundConfig,
    error::{ErrorList, Result},
    inbound::download::{Download, INBOUND_DIR, RETURNED_DIR},
    transport::Transport,
};

/// Disposes of a finished download.
///
/// With `keep_local_files` the downloaded files are copied under
/// `local_dir/<download>/` first, leaving out subdirectories that received
/// nothing. Unless `retain_remote_files` is set, every remote file in
/// `processed` is deleted; failed deletions are collected, not fatal to
/// the others.
pub async fn cleanup(
    download: Download,
    config: &InboundConfig,
    transport: &dyn Transport,
    processed: &[String],
) -> Result<()> {
    let mut errors = ErrorList::new();

    if config.keep_local_files {
        match &config.local_dir {
            Some(local_dir) => {
                errors.capture(persist(download.path(), Path::new(local_dir)).await);
            }
            None => warn!("keep_local_files is set without inbound.local_dir; nothing kept"),
        }
    }
    if let Err(e) = download.into_dir().close() {
        errors.add(e);
    }

    if !config.retain_remote_files && !processed.is_empty() {
        let results = join_all(processed.iter().map(|path| transport.delete(path))).await;
        let mut deleted = 0;
        for (path, result) in processed.iter().zip(results) {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!("Could not delete remote file {}: {}", path, e);
                    errors.add(e);
                }
            }
        }
        info!("Deleted {} processed remote files", deleted);
    }

    errors.into_result()
}

async fn persist(download: &Path, local_dir: &Path) -> Result<()> {
    let name = download
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let target = local_dir.join(name);

    for subdir in [INBOUND_DIR, RETURNED_DIR] {
        let mut entries = tokio::fs::read_dir(download.join(subdir)).await?;
        let mut copied = 0;
        while let Some(entry) = entries.next_entry().await? {
            if copied == 0 {
                tokio::fs::create_dir_all(target.join(subdir)).await?;
            }
            tokio::fs::copy(entry.path(), target.join(subdir).join(entry.file_name())).await?;
            copied += 1;
        }
        if copied > 0 {
            debug!("Kept {} {} files in {}", copied, subdir, target.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorList;
    use crate::inbound::download::Downloader;
    use crate::metrics::RecordingMetrics;
    use crate::transport::{AgentTransport, DirectoryConnector, IpAllowlist, TransportPaths};
    use std::sync::Arc;

    fn inbound_config(keep: bool, local_dir: Option<&Path>, retain: bool) -> InboundConfig {
        InboundConfig {
            interval_secs: 0,
            keep_local_files: keep,
            local_dir: local_dir.map(|p| p.to_string_lossy().into_owned()),
            retain_remote_files: retain,
        }
    }

    async fn setup() -> (tempfile::TempDir, Arc<dyn Transport>, Download) {
        let remote = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(remote.path().join("returned")).unwrap();
        std::fs::write(remote.path().join("returned/ret.ach"), b"r").unwrap();
        let transport: Arc<dyn Transport> = Arc::new(AgentTransport::new(
            DirectoryConnector::new(remote.path(), "127.0.0.1".parse().unwrap()),
            IpAllowlist::default(),
            TransportPaths::new("inbound", "outbound", "returned").unwrap(),
        ));
        let download = Downloader::new(transport.clone(), Arc::new(RecordingMetrics::new()))
            .download(&mut ErrorList::new())
            .await
            .unwrap();
        (remote, transport, download)
    }

    #[tokio::test]
    async fn test_removes_download_and_remote_files() {
        let (remote, transport, download) = setup().await;
        let dir = download.path().to_path_buf();
        let processed = vec!["returned/ret.ach".to_string()];

        cleanup(download, &inbound_config(false, None, false), transport.as_ref(), &processed)
            .await
            .unwrap();
        assert!(!dir.exists());
        assert!(!remote.path().join("returned/ret.ach").exists());
    }

    #[tokio::test]
    async fn test_keeps_local_and_remote_files_when_asked() {
        let (remote, transport, download) = setup().await;
        let local = tempfile::tempdir().unwrap();
        let name = download.path().file_name().unwrap().to_owned();
        let processed = vec!["returned/ret.ach".to_string()];

        cleanup(
            download,
            &inbound_config(true, Some(local.path()), true),
            transport.as_ref(),
            &processed,
        )
        .await
        .unwrap();

        let kept = local.path().join(name);
        assert!(kept.join("returned/ret.ach").exists());
        // empty inbound/ is not carried over
        assert!(!kept.join("inbound").exists());
        assert!(remote.path().join("returned/ret.ach").exists());
    }
}
