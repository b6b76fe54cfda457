use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    builder::calendar,
    error::{AchError, ErrorList, Result},
    events::{OutboundEvent, OutboundFile},
    metrics::MetricsSink,
    nacha::{self, File, FileHeader},
    outbound::{merge::merge_files, schedule::CutoffSchedule, staging::Staging},
    transport::Transport,
};

/// How long the loop sleeps when no cutoff is scheduled in the lookahead window.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Where a routing number is in its cutoff cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingState {
    /// Nothing staged.
    Idle,
    /// Files staged, waiting for cutoff.
    Accumulating,
    /// Merged files written and not yet uploaded.
    Merged,
    /// Everything merged has been uploaded.
    Uploaded,
}

impl std::fmt::Display for RoutingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoutingState::Idle => "idle",
            RoutingState::Accumulating => "accumulating",
            RoutingState::Merged => "merged",
            RoutingState::Uploaded => "uploaded",
        };
        write!(f, "{}", s)
    }
}

/// Shared view of every routing number's state.
#[derive(Debug, Clone, Default)]
pub struct RoutingStates(Arc<Mutex<HashMap<String, RoutingState>>>);

impl RoutingStates {
    pub fn get(&self, routing: &str) -> RoutingState {
        self.0
            .lock()
            .ok()
            .and_then(|states| states.get(routing).copied())
            .unwrap_or(RoutingState::Idle)
    }

    fn set(&self, routing: &str, state: RoutingState) {
        if let Ok(mut states) = self.0.lock() {
            let old = states.insert(routing.to_string(), state);
            if old != Some(state) {
                debug!(
                    "Routing {} is now {} (was {})",
                    routing,
                    state,
                    old.unwrap_or(RoutingState::Idle)
                );
            }
        }
    }
}

/// Result of one cutoff run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CutoffReport {
    /// Names of files uploaded.
    pub uploaded: Vec<String>,
    /// Names of merged files kept for the next cutoff.
    pub retained: Vec<String>,
}

impl CutoffReport {
    fn extend(&mut self, other: CutoffReport) {
        self.uploaded.extend(other.uploaded);
        self.retained.extend(other.retained);
    }
}

/// Manual cutoff request handed to the aggregator loop.
pub struct CutoffRequest {
    reply: oneshot::Sender<Result<CutoffReport>>,
}

/// Requests an immediate cutoff of every routing number and waits for it.
#[derive(Debug, Clone)]
pub struct CutoffTrigger {
    requests: mpsc::Sender<CutoffRequest>,
}

impl CutoffTrigger {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CutoffRequest>) {
        let (requests, receiver) = mpsc::channel(capacity);
        (Self { requests }, receiver)
    }

    pub async fn trigger(&self, timeout: Duration) -> Result<CutoffReport> {
        let (reply, response) = oneshot::channel();
        let request = async {
            self.requests
                .send(CutoffRequest { reply })
                .await
                .map_err(|_| AchError::Other(anyhow::anyhow!("aggregator is not running")))?;
            response
                .await
                .map_err(|_| AchError::Other(anyhow::anyhow!("aggregator dropped the cutoff request")))?
        };
        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| AchError::Timeout(timeout))?
    }
}

/// Stages outbound files per routing number and uploads merged files at cutoff.
pub struct Aggregator {
    staging: Staging,
    transport: Arc<dyn Transport>,
    schedule: CutoffSchedule,
    metrics: Arc<dyn MetricsSink>,
    states: RoutingStates,
}

impl Aggregator {
    pub fn new(
        staging: Staging,
        transport: Arc<dyn Transport>,
        schedule: CutoffSchedule,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            staging,
            transport,
            schedule,
            metrics,
            states: RoutingStates::default(),
        }
    }

    pub fn state(&self, routing: &str) -> RoutingState {
        self.states.get(routing)
    }

    /// Handle for observing states after the aggregator moves into its task.
    pub fn states(&self) -> RoutingStates {
        self.states.clone()
    }

    pub async fn handle_event(&self, event: OutboundEvent) -> Result<()> {
        match event {
            OutboundEvent::FileStaged(outbound) => self.stage(outbound).await,
            OutboundEvent::TransferCanceled { transfer_id } => {
                let canceled = self.staging.cancel(&transfer_id).await?;
                if canceled > 0 {
                    info!("Canceled {} staged files of transfer {}", canceled, transfer_id);
                    self.metrics
                        .incr("outbound_files_canceled", &[], canceled as u64);
                } else {
                    debug!("No staged files left for canceled transfer {}", transfer_id);
                }
                Ok(())
            }
        }
    }

    async fn stage(&self, outbound: OutboundFile) -> Result<()> {
        let routing = outbound
            .file
            .header
            .as_ref()
            .map(|h| h.immediate_destination.clone())
            .ok_or_else(|| AchError::validation("outbound file has no header"))?;
        let contents = nacha::write_file(&outbound.file)?;
        self.staging
            .stage(&routing, &outbound.transfer_id, &outbound.leg, contents.as_bytes())
            .await?;

        if matches!(
            self.states.get(&routing),
            RoutingState::Idle | RoutingState::Uploaded
        ) {
            self.states.set(&routing, RoutingState::Accumulating);
        }
        self.metrics
            .incr("outbound_files_staged", &[("routing", &routing)], 1);
        info!(
            "Staged {} leg of transfer {} for {}",
            outbound.leg, outbound.transfer_id, routing
        );
        Ok(())
    }

    /// Cutoff for every routing number with staged or retained files.
    pub async fn cutoff_all(&self, now: DateTime<Utc>) -> Result<CutoffReport> {
        let mut routings = self.staging.routings().await?;
        routings.extend(self.staging.merged_routings().await?);
        routings.sort();
        routings.dedup();

        let mut report = CutoffReport::default();
        let mut errors = ErrorList::new();
        for routing in routings {
            match self.cutoff(&routing, now).await {
                Ok(r) => report.extend(r),
                Err(e) => errors.add(e),
            }
        }
        errors.into_result()?;
        Ok(report)
    }

    /// Merges everything staged for `routing` that is due and uploads the
    /// result along with any merged files a previous cutoff failed to upload.
    ///
    /// Files whose effective entry date lies beyond the next banking day stay
    /// staged, so they can still be canceled until they are due.
    pub async fn cutoff(&self, routing: &str, now: DateTime<Utc>) -> Result<CutoffReport> {
        let mut errors = ErrorList::new();
        let mut held = 0;

        if let Some(snapshot) = self.staging.snapshot(routing).await? {
            if let Some((merged, kept)) =
                errors.capture(self.merge_snapshot(routing, &snapshot, now).await)
            {
                held = kept;
                if merged > 0 {
                    self.states.set(routing, RoutingState::Merged);
                }
            }
        }

        let mut report = CutoffReport::default();
        for path in self.staging.pending_merged(routing).await? {
            let name = file_name(&path);
            match self.upload(&path, &name).await {
                Ok(()) => {
                    self.staging.remove_merged(&path).await?;
                    self.metrics
                        .incr("outbound_uploads", &[("routing", routing), ("result", "ok")], 1);
                    report.uploaded.push(name);
                }
                Err(e) => {
                    warn!("Upload of {} failed, keeping it for the next cutoff: {}", name, e);
                    self.metrics.incr(
                        "outbound_uploads",
                        &[("routing", routing), ("result", "error")],
                        1,
                    );
                    report.retained.push(name);
                    errors.add(e);
                }
            }
        }

        if report.retained.is_empty() && !report.uploaded.is_empty() {
            self.states.set(routing, RoutingState::Uploaded);
            info!("Uploaded {} files for {}", report.uploaded.len(), routing);
            self.states.set(routing, RoutingState::Idle);
        } else if !report.retained.is_empty() {
            self.states.set(routing, RoutingState::Merged);
        } else if held == 0 {
            self.states.set(routing, RoutingState::Idle);
        }
        if held > 0 && report.retained.is_empty() {
            self.states.set(routing, RoutingState::Accumulating);
        }

        errors.into_result()?;
        Ok(report)
    }

    async fn upload(&self, path: &Path, name: &str) -> Result<()> {
        let contents = tokio::fs::read(path).await?;
        self.transport.upload_file(name, &contents).await
    }

    /// Decodes, merges and writes the due files of a snapshot, puts the
    /// rest back in staging, then removes the snapshot.
    /// Returns the number of merged files written and of files held back.
    async fn merge_snapshot(
        &self,
        routing: &str,
        snapshot: &Path,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize)> {
        let timezone = self.schedule.timezone_for(routing).unwrap_or(Tz::UTC);
        let local = now.with_timezone(&timezone);
        let release_by = calendar::next_banking_day(local.date_naive());

        let mut errors = ErrorList::new();
        let mut files: Vec<File> = Vec::new();
        let mut held = 0;
        for staged in self.staging.read_snapshot(snapshot).await? {
            match nacha::read_file(&staged.contents) {
                Ok(file) if is_due(&file, release_by) => files.push(file),
                Ok(_) => {
                    self.staging.restore(routing, &staged.path).await?;
                    held += 1;
                }
                Err(e) => {
                    self.staging.reject(&staged.path).await?;
                    errors.add(e);
                }
            }
        }
        if held > 0 {
            info!("Holding {} staged files for {} until they are due", held, routing);
        }

        let staged_count = files.len();
        let written = match files.iter().find_map(|f| f.header.clone()) {
            Some(header) => {
                let header = FileHeader {
                    file_creation_date: local.date_naive(),
                    file_creation_time: Some(local.time()),
                    ..header
                };
                let stem = format!("{}-{}", local.format("%Y%m%d-%H%M"), routing);

                let merged = merge_files(header, files)?;
                for file in &merged {
                    let contents = nacha::write_file(file)?;
                    let path = self
                        .staging
                        .write_merged(routing, &stem, contents.as_bytes())
                        .await?;
                    debug!("Wrote merged file {}", path.display());
                }
                merged.len()
            }
            None => 0,
        };

        self.staging.remove_snapshot(snapshot).await?;
        if written > 0 {
            info!(
                "Merged {} staged files into {} for {}",
                staged_count, written, routing
            );
            self.metrics
                .incr("outbound_files_merged", &[("routing", routing)], written as u64);
        }
        errors.into_result()?;
        Ok((written, held))
    }

    /// Runs until `shutdown` fires: stages events as they arrive, answers
    /// manual cutoff requests, and cuts off each routing number on schedule.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<OutboundEvent>,
        mut requests: mpsc::Receiver<CutoffRequest>,
        shutdown: CancellationToken,
    ) {
        info!(
            "Outbound aggregator started for {} routing numbers",
            self.schedule.routings().len()
        );

        loop {
            let next = self.schedule.next_cutoff(Utc::now());
            let wait = match &next {
                Some((at, _)) => (*at - Utc::now()).to_std().unwrap_or_default(),
                None => IDLE_WAIT,
            };
            if let Some((at, due)) = &next {
                debug!("Next cutoff at {} for {}", at, due.join(", "));
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Outbound aggregator shutting down");
                    break;
                }
                Some(event) = events.recv() => {
                    if let Err(e) = self.handle_event(event).await {
                        error!("Failed to handle outbound event: {}", e);
                    }
                }
                Some(request) = requests.recv() => {
                    let result = self.cutoff_all(Utc::now()).await;
                    if let Err(e) = &result {
                        error!("Manual cutoff failed: {}", e);
                    }
                    let _ = request.reply.send(result);
                }
                _ = tokio::time::sleep(wait) => {
                    let Some((_, due)) = next else { continue };
                    for routing in due {
                        match self.cutoff(&routing, Utc::now()).await {
                            Ok(report) if !report.uploaded.is_empty() => {
                                info!("Cutoff for {} uploaded {}", routing, report.uploaded.join(", "));
                            }
                            Ok(_) => debug!("Cutoff for {}: nothing staged", routing),
                            Err(e) => error!("Cutoff for {} failed: {}", routing, e),
                        }
                    }
                }
                else => break,
            }
        }
    }
}

/// Whether every batch settles on or before `release_by`.
fn is_due(file: &File, release_by: chrono::NaiveDate) -> bool {
    file.batches
        .iter()
        .filter_map(|b| b.header.effective_entry_date)
        .all(|date| date <= release_by)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CutoffConfig;
    use crate::metrics::RecordingMetrics;
    use crate::nacha::testutil::{entry, file_with};
    use crate::nacha::TransactionCode;
    use crate::transport::{AgentTransport, DirectoryConnector, IpAllowlist, TransportPaths};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicBool, Ordering};

    const ROUTING: &str = "231380104";

    fn schedule() -> CutoffSchedule {
        CutoffSchedule::from_config(&[CutoffConfig {
            routing_number: ROUTING.to_string(),
            timezone: "America/New_York".to_string(),
            windows: vec!["16:20".to_string()],
        }])
        .unwrap()
    }

    fn cutoff_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 20, 20, 0).unwrap()
    }

    fn outbound(transfer_id: &str, leg: &str, trace: &str) -> OutboundEvent {
        OutboundEvent::FileStaged(OutboundFile {
            transfer_id: transfer_id.to_string(),
            leg: leg.to_string(),
            file: file_with(vec![entry(TransactionCode::CHECKING_CREDIT, 1247, trace)]),
        })
    }

    fn outbound_effective(
        transfer_id: &str,
        leg: &str,
        trace: &str,
        effective: chrono::NaiveDate,
    ) -> OutboundEvent {
        let mut file = file_with(vec![entry(TransactionCode::CHECKING_CREDIT, 1247, trace)]);
        file.batches[0].header.effective_entry_date = Some(effective);
        OutboundEvent::FileStaged(OutboundFile {
            transfer_id: transfer_id.to_string(),
            leg: leg.to_string(),
            file,
        })
    }

    fn mailbox(root: &Path) -> Arc<dyn Transport> {
        Arc::new(AgentTransport::new(
            DirectoryConnector::new(root, IpAddr::V4(Ipv4Addr::LOCALHOST)),
            IpAllowlist::default(),
            TransportPaths::new("inbound", "outbound", "returned").unwrap(),
        ))
    }

    /// Upload fails while `down` is set.
    struct FlakyTransport {
        inner: Arc<dyn Transport>,
        down: AtomicBool,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn get_inbound_files(&self) -> Result<Vec<crate::transport::RemoteFile>> {
            self.inner.get_inbound_files().await
        }

        async fn get_return_files(&self) -> Result<Vec<crate::transport::RemoteFile>> {
            self.inner.get_return_files().await
        }

        async fn upload_file(&self, name: &str, contents: &[u8]) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(AchError::Transport("connection refused".to_string()));
            }
            self.inner.upload_file(name, contents).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.inner.delete(path).await
        }

        fn inbound_path(&self) -> &str {
            self.inner.inbound_path()
        }

        fn outbound_path(&self) -> &str {
            self.inner.outbound_path()
        }

        fn return_path(&self) -> &str {
            self.inner.return_path()
        }
    }

    async fn uploaded(root: &Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(root.join("outbound")).await {
            while let Some(entry) = entries.next_entry().await.unwrap() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_cutoff_merges_and_uploads() {
        let staging = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let metrics = Arc::new(RecordingMetrics::new());
        let aggregator = Aggregator::new(
            Staging::new(staging.path()),
            mailbox(remote.path()),
            schedule(),
            metrics.clone(),
        );

        assert_eq!(aggregator.state(ROUTING), RoutingState::Idle);
        aggregator
            .handle_event(outbound("t1", "debit", "231380100000001"))
            .await
            .unwrap();
        aggregator
            .handle_event(outbound("t2", "single", "231380100000002"))
            .await
            .unwrap();
        // re-delivery overwrites
        aggregator
            .handle_event(outbound("t2", "single", "231380100000002"))
            .await
            .unwrap();
        assert_eq!(aggregator.state(ROUTING), RoutingState::Accumulating);

        let report = aggregator.cutoff(ROUTING, cutoff_time()).await.unwrap();
        assert_eq!(report.uploaded, vec!["20261016-1620-231380104.ach".to_string()]);
        assert!(report.retained.is_empty());
        assert_eq!(aggregator.state(ROUTING), RoutingState::Idle);
        assert_eq!(uploaded(remote.path()).await, report.uploaded);

        let contents =
            tokio::fs::read_to_string(remote.path().join("outbound").join(&report.uploaded[0]))
                .await
                .unwrap();
        let file = nacha::read_file(&contents).unwrap();
        assert_eq!(file.batches.len(), 1);
        assert_eq!(file.entries().count(), 2);
        assert_eq!(metrics.get("outbound_files_staged", &[("routing", ROUTING)]), 3);
        assert_eq!(
            metrics.get("outbound_uploads", &[("routing", ROUTING), ("result", "ok")]),
            1
        );

        // nothing staged is still a success
        let empty = aggregator.cutoff(ROUTING, cutoff_time()).await.unwrap();
        assert_eq!(empty, CutoffReport::default());
    }

    #[tokio::test]
    async fn test_canceled_transfer_is_not_uploaded() {
        let staging = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let aggregator = Aggregator::new(
            Staging::new(staging.path()),
            mailbox(remote.path()),
            schedule(),
            Arc::new(RecordingMetrics::new()),
        );
        aggregator
            .handle_event(outbound("t1", "credit", "231380100000001"))
            .await
            .unwrap();
        aggregator
            .handle_event(OutboundEvent::TransferCanceled {
                transfer_id: "t1".to_string(),
            })
            .await
            .unwrap();

        let report = aggregator.cutoff(ROUTING, cutoff_time()).await.unwrap();
        assert!(report.uploaded.is_empty());
        assert!(uploaded(remote.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_credit_held_until_due_can_still_be_canceled() {
        let staging = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let aggregator = Aggregator::new(
            Staging::new(staging.path()),
            mailbox(remote.path()),
            schedule(),
            Arc::new(RecordingMetrics::new()),
        );
        let monday = chrono::NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let wednesday = chrono::NaiveDate::from_ymd_opt(2026, 10, 21).unwrap();
        aggregator
            .handle_event(outbound_effective("t1", "debit", "231380100000001", monday))
            .await
            .unwrap();
        aggregator
            .handle_event(outbound_effective("t1", "credit", "231380100000002", wednesday))
            .await
            .unwrap();

        let report = aggregator.cutoff(ROUTING, cutoff_time()).await.unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(aggregator.state(ROUTING), RoutingState::Accumulating);
        let contents =
            tokio::fs::read_to_string(remote.path().join("outbound").join(&report.uploaded[0]))
                .await
                .unwrap();
        let file = nacha::read_file(&contents).unwrap();
        assert_eq!(file.entries().count(), 1);
        assert_eq!(file.batches[0].header.effective_entry_date, Some(monday));

        // the debit comes back before the credit is due
        aggregator
            .handle_event(OutboundEvent::TransferCanceled {
                transfer_id: "t1".to_string(),
            })
            .await
            .unwrap();
        let later = Utc.with_ymd_and_hms(2026, 10, 20, 20, 20, 0).unwrap();
        let report = aggregator.cutoff(ROUTING, later).await.unwrap();
        assert!(report.uploaded.is_empty());
        assert_eq!(uploaded(remote.path()).await.len(), 1);
        assert_eq!(aggregator.state(ROUTING), RoutingState::Idle);
    }

    #[tokio::test]
    async fn test_held_credit_goes_out_once_due() {
        let staging = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let aggregator = Aggregator::new(
            Staging::new(staging.path()),
            mailbox(remote.path()),
            schedule(),
            Arc::new(RecordingMetrics::new()),
        );
        let wednesday = chrono::NaiveDate::from_ymd_opt(2026, 10, 21).unwrap();
        aggregator
            .handle_event(outbound_effective("t1", "credit", "231380100000002", wednesday))
            .await
            .unwrap();

        assert!(aggregator.cutoff(ROUTING, cutoff_time()).await.unwrap().uploaded.is_empty());
        // Tuesday's cutoff releases files effective Wednesday
        let tuesday = Utc.with_ymd_and_hms(2026, 10, 20, 20, 20, 0).unwrap();
        let report = aggregator.cutoff(ROUTING, tuesday).await.unwrap();
        assert_eq!(report.uploaded, vec!["20261020-1620-231380104.ach".to_string()]);
        assert_eq!(aggregator.state(ROUTING), RoutingState::Idle);
    }

    #[tokio::test]
    async fn test_failed_upload_is_retried() {
        let staging = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let flaky = Arc::new(FlakyTransport {
            inner: mailbox(remote.path()),
            down: AtomicBool::new(true),
        });
        let aggregator = Aggregator::new(
            Staging::new(staging.path()),
            flaky.clone(),
            schedule(),
            Arc::new(RecordingMetrics::new()),
        );
        aggregator
            .handle_event(outbound("t1", "single", "231380100000001"))
            .await
            .unwrap();

        assert!(aggregator.cutoff(ROUTING, cutoff_time()).await.is_err());
        assert_eq!(aggregator.state(ROUTING), RoutingState::Merged);
        assert_eq!(
            Staging::new(staging.path())
                .pending_merged(ROUTING)
                .await
                .unwrap()
                .len(),
            1
        );

        flaky.down.store(false, Ordering::SeqCst);
        let report = aggregator.cutoff_all(cutoff_time()).await.unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(aggregator.state(ROUTING), RoutingState::Idle);
    }

    #[tokio::test]
    async fn test_manual_trigger_through_running_loop() {
        let staging = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let aggregator = Aggregator::new(
            Staging::new(staging.path()),
            mailbox(remote.path()),
            schedule(),
            Arc::new(RecordingMetrics::new()),
        );
        let states = aggregator.states();
        let (events_tx, events) = mpsc::channel(8);
        let (trigger, requests) = CutoffTrigger::channel(1);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(aggregator.run(events, requests, shutdown.clone()));

        events_tx
            .send(outbound_effective(
                "t1",
                "single",
                "231380100000001",
                Utc::now().date_naive(),
            ))
            .await
            .unwrap();
        while states.get(ROUTING) != RoutingState::Accumulating {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let report = trigger.trigger(Duration::from_secs(10)).await.unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(states.get(ROUTING), RoutingState::Idle);

        shutdown.cancel();
        task.await.unwrap();
        assert!(trigger.trigger(Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_trigger_times_out() {
        let (trigger, _requests) = CutoffTrigger::channel(1);
        let err = trigger.trigger(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, AchError::Timeout(_)));
    }
}
