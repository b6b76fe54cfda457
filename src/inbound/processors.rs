use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    builder,
    depository,
    error::{AchError, ErrorList, Result},
    events::{OutboundFile, Publisher},
    fundflow::{ReturnedEntry, Strategy},
    metrics::MetricsSink,
    nacha::File,
    storage::{
        DepositoryRepository, MicroDeposit, MicroDepositRepository, TransferRepository,
        TransferStatus,
    },
};

/// Counts gathered while a file passes through the processor chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub entries: usize,
    pub returns: usize,
    pub corrections: usize,
    pub prenotes: usize,
}

/// One stage of inbound file handling.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, file: &File, summary: &mut FileSummary) -> Result<()>;
}

/// Runs every processor over a file in order. A failing processor does not
/// stop the ones after it; all failures come back together.
pub struct ProcessorChain {
    processors: Vec<Box<dyn FileProcessor>>,
}

impl ProcessorChain {
    pub fn new(processors: Vec<Box<dyn FileProcessor>>) -> Self {
        Self { processors }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    pub async fn process(&self, file: &File, summary: &mut FileSummary) -> Result<()> {
        summary.entries = file.entries().count();
        let mut errors = ErrorList::new();
        for processor in &self.processors {
            if let Err(e) = processor.process(file, summary).await {
                warn!("{} processor failed: {}", processor.name(), e);
                errors.add(e);
            }
        }
        errors.into_result()
    }
}

/// Notifications of change (addenda 98).
pub struct CorrectionProcessor {
    metrics: Arc<dyn MetricsSink>,
}

impl CorrectionProcessor {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl FileProcessor for CorrectionProcessor {
    fn name(&self) -> &'static str {
        "correction"
    }

    async fn process(&self, file: &File, summary: &mut FileSummary) -> Result<()> {
        for addenda in file.entries().filter_map(|e| e.addenda98.as_ref()) {
            let code = addenda.change_code.trim();
            info!(
                "Notification of change {} for trace {}: corrected data {:?}",
                code,
                addenda.original_trace.trim(),
                addenda.corrected_data.trim()
            );
            self.metrics
                .incr("inbound_corrections", &[("change_code", code)], 1);
            summary.corrections += 1;
        }
        Ok(())
    }
}

/// Prenotes must carry a zero amount.
pub struct PrenoteProcessor;

#[async_trait]
impl FileProcessor for PrenoteProcessor {
    fn name(&self) -> &'static str {
        "prenote"
    }

    async fn process(&self, file: &File, summary: &mut FileSummary) -> Result<()> {
        let mut errors = ErrorList::new();
        for entry in file.entries().filter(|e| e.transaction_code.is_prenote()) {
            summary.prenotes += 1;
            if entry.amount != 0 {
                errors.add(AchError::validation(format!(
                    "prenote entry {} has non-zero amount {}",
                    entry.trace_number, entry.amount
                )));
            } else {
                debug!("Prenote {} for RDFI {}", entry.trace_number, entry.rdfi_identification);
            }
        }
        errors.into_result()
    }
}

/// Returned entries (addenda 99): fails the originating transfer and follows
/// up on everything that hangs off it.
pub struct ReturnProcessor {
    transfers: Arc<dyn TransferRepository>,
    depositories: Arc<dyn DepositoryRepository>,
    micro_deposits: Arc<dyn MicroDepositRepository>,
    strategy: Arc<dyn Strategy>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<dyn MetricsSink>,
}

impl ReturnProcessor {
    pub fn new(
        transfers: Arc<dyn TransferRepository>,
        depositories: Arc<dyn DepositoryRepository>,
        micro_deposits: Arc<dyn MicroDepositRepository>,
        strategy: Arc<dyn Strategy>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            transfers,
            depositories,
            micro_deposits,
            strategy,
            publisher,
            metrics,
        }
    }

    /// Every step is safe to repeat: the transfer is only marked failed once
    /// all of them went through, so a retried file picks up where it stopped.
    async fn handle(&self, returned: &ReturnedEntry) -> Result<()> {
        let code = returned.return_code.as_str();
        let reason = depository::lookup(code)
            .map(|rc| rc.reason)
            .unwrap_or("unknown return code");
        self.metrics.incr("inbound_returns", &[("code", code)], 1);

        let Some(transfer) = self.transfers.find_transfer_by_trace(&returned.original_trace)? else {
            warn!(
                "Return {} ({}) for unknown trace {}",
                code, reason, returned.original_trace
            );
            return Ok(());
        };
        if transfer.status == TransferStatus::Failed {
            debug!("Transfer {} already failed, ignoring repeated return", transfer.id);
            return Ok(());
        }

        info!(
            "Transfer {} returned with {} ({})",
            transfer.id, code, reason
        );

        if let Some(micro_deposit) = self.micro_deposits.find_micro_deposit_by_transfer(&transfer.id)? {
            self.update_micro_deposit(&micro_deposit, &transfer.id, code)?;
        }

        // the RDFI returned the entry posted to the receiver's account
        let (originator, receiver) = if returned.was_debit() {
            (&transfer.destination, &transfer.source)
        } else {
            (&transfer.source, &transfer.destination)
        };
        depository::record_return(
            self.depositories.as_ref(),
            code,
            &originator.account_id,
            &receiver.account_id,
        )?;

        // must precede the reversals, or the tombstone would cover them too
        self.publisher.cancel_transfer(&transfer.id).await?;

        let reversals = self.strategy.handle_return(returned, &transfer).await?;
        if !reversals.is_empty() {
            let traces: Vec<String> = reversals
                .iter()
                .flat_map(|leg| builder::trace_numbers(&leg.file))
                .collect();
            self.transfers.save_trace_numbers(&transfer.id, &traces)?;
        }
        for leg in reversals {
            info!("Publishing {} file for transfer {}", leg.kind.as_str(), transfer.id);
            self.publisher
                .publish_file(OutboundFile {
                    transfer_id: transfer.id.clone(),
                    leg: leg.kind.as_str().to_string(),
                    file: leg.file,
                })
                .await?;
        }

        self.transfers
            .update_transfer_status(&transfer.id, TransferStatus::Failed, Some(code))
    }

    /// Recomputes the micro-deposit status as if `failed` had already failed.
    fn update_micro_deposit(&self, micro_deposit: &MicroDeposit, failed: &str, code: &str) -> Result<()> {
        let mut statuses = Vec::with_capacity(micro_deposit.transfer_ids.len());
        for id in &micro_deposit.transfer_ids {
            if id == failed {
                statuses.push(TransferStatus::Failed);
            } else if let Some(t) = self.transfers.get_transfer(id)? {
                statuses.push(t.status);
            }
        }
        let status = MicroDeposit::status_from(&statuses);
        info!("Micro-deposit {} is now {} after {}", micro_deposit.id, status, code);
        self.micro_deposits
            .update_micro_deposit(&micro_deposit.id, status, Some(code))
    }
}

#[async_trait]
impl FileProcessor for ReturnProcessor {
    fn name(&self) -> &'static str {
        "return"
    }

    async fn process(&self, file: &File, summary: &mut FileSummary) -> Result<()> {
        let mut errors = ErrorList::new();
        for entry in file.entries() {
            let Some(returned) = ReturnedEntry::from_entry(entry) else {
                continue;
            };
            summary.returns += 1;
            if let Err(e) = self.handle(&returned).await {
                errors.add(e);
            }
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FileBuilder;
    use crate::config::{testutil::odfi, SettlementPosture};
    use crate::directory::{AccountNumber, AccountType, InMemoryDirectory, PartyRef};
    use crate::directory::testutil::party;
    use crate::events::{ChannelPublisher, OutboundEvent};
    use crate::fundflow::{FirstParty, ThirdParty};
    use crate::metrics::RecordingMetrics;
    use crate::nacha::testutil::{entry, file_with};
    use crate::nacha::{Addenda98, Addenda99, TransactionCode};
    use crate::storage::{Database, Depository, DepositoryStatus, Transfer};

    const TRACE: &str = "231380100000001";

    fn return_entry(code: TransactionCode, return_code: &str, original: &str) -> crate::nacha::EntryDetail {
        let mut e = entry(code, 1247, "121042880000009");
        e.addenda99 = Some(Addenda99 {
            return_code: return_code.to_string(),
            original_trace: original.to_string(),
            date_of_death: None,
            original_dfi: "23138010".to_string(),
            addenda_information: String::new(),
            trace_number: "121042880000009".to_string(),
        });
        e
    }

    fn transfer() -> Transfer {
        Transfer::new(
            "USD 12.47".parse().unwrap(),
            PartyRef::new("a", "src"),
            PartyRef::new("b", "dst"),
            "rent",
        )
    }

    struct Fixture {
        db: Arc<Database>,
        processor: ReturnProcessor,
        events: tokio::sync::mpsc::Receiver<OutboundEvent>,
    }

    fn fixture(strategy: Arc<dyn Strategy>) -> Fixture {
        let db = Arc::new(Database::in_memory().unwrap());
        let (publisher, events) = ChannelPublisher::new(16);
        let processor = ReturnProcessor::new(
            db.clone(),
            db.clone(),
            db.clone(),
            strategy,
            Arc::new(publisher),
            Arc::new(RecordingMetrics::new()),
        );
        Fixture {
            db,
            processor,
            events,
        }
    }

    fn first_party() -> Arc<dyn Strategy> {
        Arc::new(FirstParty::new(Arc::new(FileBuilder::new(odfi()).unwrap())))
    }

    #[tokio::test]
    async fn test_return_fails_transfer_and_rejects_receiver() {
        let mut fx = fixture(first_party());
        let t = transfer();
        fx.db.create_transfer(&t).unwrap();
        fx.db.save_trace_numbers(&t.id, &[TRACE.to_string()]).unwrap();
        let mut dst = Depository::new("b", "dst", "121042882", "222", "John");
        dst.status = DepositoryStatus::Verified;
        fx.db.upsert_depository(&dst).unwrap();

        let file = file_with(vec![return_entry(
            TransactionCode::CHECKING_RETURN_CREDIT,
            "R03",
            TRACE,
        )]);
        let mut summary = FileSummary::default();
        fx.processor.process(&file, &mut summary).await.unwrap();
        assert_eq!(summary.returns, 1);

        let stored = fx.db.get_transfer(&t.id).unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Failed);
        assert_eq!(stored.return_code.as_deref(), Some("R03"));
        assert_eq!(
            fx.db.get_depository("dst").unwrap().unwrap().status,
            DepositoryStatus::Rejected
        );
        assert!(matches!(
            fx.events.try_recv(),
            Ok(OutboundEvent::TransferCanceled { transfer_id }) if transfer_id == t.id
        ));
        assert!(fx.events.try_recv().is_err());

        // a second delivery of the same return changes nothing
        fx.processor.process(&file, &mut summary).await.unwrap();
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_debit_return_under_credit_line_publishes_reversal() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert(
            party("b", "dst", "121042882", AccountType::Checking),
            AccountNumber::new("55501234"),
        );
        let strategy = Arc::new(ThirdParty::new(
            Arc::new(FileBuilder::new(odfi()).unwrap()),
            directory,
            SettlementPosture::CreditLine,
            0,
        ));
        let mut fx = fixture(strategy);
        let t = transfer();
        fx.db.create_transfer(&t).unwrap();
        fx.db.save_trace_numbers(&t.id, &[TRACE.to_string()]).unwrap();

        let file = file_with(vec![return_entry(
            TransactionCode::CHECKING_RETURN_DEBIT,
            "R01",
            TRACE,
        )]);
        fx.processor
            .process(&file, &mut FileSummary::default())
            .await
            .unwrap();

        assert!(matches!(
            fx.events.try_recv(),
            Ok(OutboundEvent::TransferCanceled { .. })
        ));
        match fx.events.try_recv() {
            Ok(OutboundEvent::FileStaged(staged)) => {
                assert_eq!(staged.leg, "reversal");
                let traces = builder::trace_numbers(&staged.file);
                let found = fx.db.find_transfer_by_trace(&traces[0]).unwrap().unwrap();
                assert_eq!(found.id, t.id);
            }
            _ => panic!("expected a reversal file"),
        }
    }

    #[tokio::test]
    async fn test_debit_return_rejects_debited_account() {
        let mut fx = fixture(first_party());
        let t = transfer();
        fx.db.create_transfer(&t).unwrap();
        fx.db.save_trace_numbers(&t.id, &[TRACE.to_string()]).unwrap();
        for (customer, account, routing) in [("a", "src", "121042882"), ("b", "dst", "231380104")] {
            let mut d = Depository::new(customer, account, routing, "333", "Jane");
            d.status = DepositoryStatus::Verified;
            fx.db.upsert_depository(&d).unwrap();
        }

        let file = file_with(vec![return_entry(
            TransactionCode::CHECKING_RETURN_DEBIT,
            "R03",
            TRACE,
        )]);
        fx.processor
            .process(&file, &mut FileSummary::default())
            .await
            .unwrap();

        assert_eq!(
            fx.db.get_depository("src").unwrap().unwrap().status,
            DepositoryStatus::Rejected
        );
        assert_eq!(
            fx.db.get_depository("dst").unwrap().unwrap().status,
            DepositoryStatus::Verified
        );
        assert!(matches!(
            fx.events.try_recv(),
            Ok(OutboundEvent::TransferCanceled { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_follow_up_is_redone_on_retry() {
        let directory = Arc::new(InMemoryDirectory::new());
        let strategy = Arc::new(ThirdParty::new(
            Arc::new(FileBuilder::new(odfi()).unwrap()),
            directory.clone(),
            SettlementPosture::CreditLine,
            0,
        ));
        let mut fx = fixture(strategy);
        let t = transfer();
        fx.db.create_transfer(&t).unwrap();
        fx.db.save_trace_numbers(&t.id, &[TRACE.to_string()]).unwrap();
        let file = file_with(vec![return_entry(
            TransactionCode::CHECKING_RETURN_DEBIT,
            "R01",
            TRACE,
        )]);

        // the reversal cannot be built while the destination is unknown
        let err = fx
            .processor
            .process(&file, &mut FileSummary::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AchError::NotFound(_)));
        assert_eq!(
            fx.db.get_transfer(&t.id).unwrap().unwrap().status,
            TransferStatus::Pending
        );
        while fx.events.try_recv().is_ok() {}

        directory.insert(
            party("b", "dst", "121042882", AccountType::Checking),
            AccountNumber::new("55501234"),
        );
        fx.processor
            .process(&file, &mut FileSummary::default())
            .await
            .unwrap();

        let stored = fx.db.get_transfer(&t.id).unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Failed);
        assert_eq!(stored.return_code.as_deref(), Some("R01"));
        assert!(matches!(
            fx.events.try_recv(),
            Ok(OutboundEvent::TransferCanceled { .. })
        ));
        assert!(matches!(
            fx.events.try_recv(),
            Ok(OutboundEvent::FileStaged(staged)) if staged.leg == "reversal"
        ));
    }

    #[tokio::test]
    async fn test_return_updates_micro_deposit() {
        let fx = fixture(first_party());
        let credit = transfer();
        let debit = transfer();
        let micro = MicroDeposit {
            id: "md1".to_string(),
            destination: PartyRef::new("b", "dst"),
            amounts: vec!["USD 0.05".parse().unwrap(), "USD 0.07".parse().unwrap()],
            transfer_ids: vec![credit.id.clone(), debit.id.clone()],
            status: TransferStatus::Pending,
            return_code: None,
            created: chrono::Utc::now(),
        };
        fx.db
            .create_micro_deposit(
                &micro,
                &[
                    (credit.clone(), vec![TRACE.to_string()]),
                    (debit.clone(), vec!["231380100000002".to_string()]),
                ],
            )
            .unwrap();

        let file = file_with(vec![return_entry(
            TransactionCode::CHECKING_RETURN_CREDIT,
            "R02",
            TRACE,
        )]);
        fx.processor
            .process(&file, &mut FileSummary::default())
            .await
            .unwrap();

        let stored = fx
            .db
            .latest_micro_deposit(&PartyRef::new("b", "dst"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransferStatus::Failed);
        assert_eq!(stored.return_code.as_deref(), Some("R02"));
    }

    #[tokio::test]
    async fn test_unknown_trace_is_skipped() {
        let fx = fixture(first_party());
        let file = file_with(vec![return_entry(
            TransactionCode::CHECKING_RETURN_CREDIT,
            "R01",
            "999999990000001",
        )]);
        let mut summary = FileSummary::default();
        fx.processor.process(&file, &mut summary).await.unwrap();
        assert_eq!(summary.returns, 1);
    }

    #[tokio::test]
    async fn test_chain_runs_every_processor() {
        let metrics = Arc::new(RecordingMetrics::new());
        let chain = ProcessorChain::new(vec![
            Box::new(CorrectionProcessor::new(metrics.clone())),
            Box::new(PrenoteProcessor),
        ]);
        assert_eq!(chain.names(), vec!["correction", "prenote"]);

        let mut cor = entry(TransactionCode::CHECKING_RETURN_CREDIT, 0, "121042880000001");
        cor.addenda98 = Some(Addenda98 {
            change_code: "C01".to_string(),
            original_trace: TRACE.to_string(),
            original_dfi: "23138010".to_string(),
            corrected_data: "1918171614".to_string(),
            trace_number: "121042880000001".to_string(),
        });
        let bad_prenote = entry(TransactionCode::CHECKING_PRENOTE_CREDIT, 100, "121042880000002");
        let file = file_with(vec![cor, bad_prenote]);

        let mut summary = FileSummary::default();
        let err = chain.process(&file, &mut summary).await.unwrap_err();
        assert!(err.to_string().contains("non-zero amount"));
        assert_eq!(
            summary,
            FileSummary {
                entries: 2,
                returns: 0,
                corrections: 1,
                prenotes: 1,
            }
        );
        assert_eq!(metrics.get("inbound_corrections", &[("change_code", "C01")]), 1);
    }
}
