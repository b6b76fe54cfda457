//! Inbound side: periodically downloads ODFI files, runs them through the
//! processor chain and cleans up after itself.

pub mod cleanup;
pub mod download;
pub mod processors;

pub use download::{Download, DownloadedFile, Downloader};
pub use processors::{
    CorrectionProcessor, FileProcessor, FileSummary, PrenoteProcessor, ProcessorChain,
    ReturnProcessor,
};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::InboundConfig,
    error::{ErrorList, Result},
    events::{InboundNotice, Publisher},
    metrics::MetricsSink,
    nacha::{self, NachaError},
    transport::Transport,
};

/// One download, process and cleanup pass.
pub struct InboundPipeline {
    downloader: Downloader,
    chain: ProcessorChain,
    transport: Arc<dyn Transport>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<dyn MetricsSink>,
    config: InboundConfig,
}

impl InboundPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        chain: ProcessorChain,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<dyn MetricsSink>,
        config: InboundConfig,
    ) -> Self {
        Self {
            downloader: Downloader::new(transport.clone(), metrics.clone()),
            chain,
            transport,
            publisher,
            metrics,
            config,
        }
    }

    pub async fn run_once(&self) -> Result<()> {
        let mut errors = ErrorList::new();
        let download = self.downloader.download(&mut errors).await?;

        let mut processed = Vec::new();
        for file in &download.files {
            match self.process_file(file).await {
                Ok(()) => processed.push(file.remote_path.clone()),
                Err(e) if e.is_permanent() => {
                    error!("Inbound file {} can never be processed, removing it: {}", file.name(), e);
                    self.metrics.incr("inbound_files_rejected", &[], 1);
                    processed.push(file.remote_path.clone());
                    errors.add(e);
                }
                Err(e) => {
                    warn!("Inbound file {} failed: {}", file.name(), e);
                    self.metrics.incr("inbound_files_failed", &[], 1);
                    errors.add(e);
                }
            }
        }
        if !processed.is_empty() {
            info!("Processed {} inbound files", processed.len());
        }

        errors.capture(
            cleanup::cleanup(download, &self.config, self.transport.as_ref(), &processed).await,
        );
        errors.into_result()
    }

    async fn process_file(&self, downloaded: &DownloadedFile) -> Result<()> {
        let contents = tokio::fs::read_to_string(&downloaded.local).await?;
        let file = match nacha::read_file(&contents) {
            Ok(file) => file,
            Err(NachaError::MissingFileHeader(partial)) => {
                warn!(
                    "{} has no file header, processing its batches anyway",
                    downloaded.name()
                );
                *partial
            }
            Err(e) => return Err(e.into()),
        };

        let mut summary = FileSummary::default();
        let result = self.chain.process(&file, &mut summary).await;

        let notice = InboundNotice {
            filename: downloaded.name(),
            kind: downloaded.kind,
            entries: summary.entries,
            returns: summary.returns,
            corrections: summary.corrections,
            prenotes: summary.prenotes,
            processed_at: Utc::now(),
        };
        if let Err(e) = self.publisher.notify_inbound(notice).await {
            warn!("Could not publish notice for {}: {}", downloaded.name(), e);
        }
        result
    }
}

/// When the inbound pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundScheduler {
    Periodic(Duration),
    Disabled,
}

impl InboundScheduler {
    pub fn from_config(config: &InboundConfig) -> Self {
        match config.interval_secs {
            0 => InboundScheduler::Disabled,
            secs => InboundScheduler::Periodic(Duration::from_secs(secs)),
        }
    }

    /// Ticks until `shutdown` fires. A failed pass is logged and the next
    /// tick runs as usual.
    pub async fn run(self, pipeline: Arc<InboundPipeline>, shutdown: CancellationToken) {
        let every = match self {
            InboundScheduler::Disabled => {
                info!("Inbound processing is disabled");
                return;
            }
            InboundScheduler::Periodic(every) => every,
        };

        info!("Inbound processing every {}s", every.as_secs());
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Inbound scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = pipeline.run_once().await {
                        error!("Inbound pass failed: {}", e);
                    }
                }
            }
        }
    }
}
