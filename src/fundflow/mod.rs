pub mod first_party;
pub mod third_party;

pub use first_party::FirstParty;
pub use third_party::ThirdParty;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    builder::{self, FileBuilder},
    config::{FundFlowConfig, FundFlowKind},
    directory::{self, AccountDirectory, ResolvedParty},
    error::{AchError, Result},
    events::{OutboundFile, Publisher},
    nacha::{EntryDetail, File, TransactionCode},
    storage::{Transfer, TransferRepository, TransferStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegKind {
    Single,
    Debit,
    Credit,
    Reversal,
}

impl LegKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegKind::Single => "single",
            LegKind::Debit => "debit",
            LegKind::Credit => "credit",
            LegKind::Reversal => "reversal",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LegFile {
    pub kind: LegKind,
    pub file: File,
}

/// A returned entry as read from a return file.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnedEntry {
    pub return_code: String,
    pub original_trace: String,
    pub transaction_code: TransactionCode,
    pub amount: u64,
}

impl ReturnedEntry {
    /// `None` when the entry carries no return addenda.
    pub fn from_entry(entry: &EntryDetail) -> Option<Self> {
        let addenda = entry.addenda99.as_ref()?;
        Some(Self {
            return_code: addenda.return_code.trim().to_string(),
            original_trace: addenda.original_trace.trim().to_string(),
            transaction_code: entry.transaction_code,
            amount: entry.amount,
        })
    }

    /// Whether the entry that came back was a debit.
    pub fn was_debit(&self) -> bool {
        self.transaction_code.is_debit()
    }
}

/// How a transfer's money moves through the ODFI.
#[async_trait]
pub trait Strategy: Send + Sync {
    async fn originate(
        &self,
        company_id: &str,
        transfer: &Transfer,
        source: &ResolvedParty,
        destination: &ResolvedParty,
    ) -> Result<Vec<LegFile>>;

    /// Files to send after one of the transfer's entries was returned.
    async fn handle_return(
        &self,
        returned: &ReturnedEntry,
        transfer: &Transfer,
    ) -> Result<Vec<LegFile>>;
}

pub fn strategy_from_config(
    config: &FundFlowConfig,
    builder: Arc<FileBuilder>,
    directory: Arc<dyn AccountDirectory>,
) -> Arc<dyn Strategy> {
    match config.kind {
        FundFlowKind::FirstParty => Arc::new(FirstParty::new(builder)),
        FundFlowKind::ThirdParty => Arc::new(ThirdParty::new(
            builder,
            directory,
            config.posture,
            config.hold_days,
        )),
    }
}

/// Accepts new transfers: resolves both parties, builds every leg, then
/// records the transfer and publishes its files.
pub struct Originator {
    directory: Arc<dyn AccountDirectory>,
    strategy: Arc<dyn Strategy>,
    transfers: Arc<dyn TransferRepository>,
    publisher: Arc<dyn Publisher>,
    company_id: String,
}

impl Originator {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        strategy: Arc<dyn Strategy>,
        transfers: Arc<dyn TransferRepository>,
        publisher: Arc<dyn Publisher>,
        company_id: &str,
    ) -> Self {
        Self {
            directory,
            strategy,
            transfers,
            publisher,
            company_id: company_id.to_string(),
        }
    }

    pub async fn submit(&self, transfer: Transfer) -> Result<Transfer> {
        let source = directory::resolve(self.directory.as_ref(), &transfer.source).await?;
        let destination =
            directory::resolve(self.directory.as_ref(), &transfer.destination).await?;

        let legs = self
            .strategy
            .originate(&self.company_id, &transfer, &source, &destination)
            .await?;

        self.transfers.create_transfer(&transfer)?;
        let traces: Vec<String> = legs
            .iter()
            .flat_map(|leg| builder::trace_numbers(&leg.file))
            .collect();
        self.transfers.save_trace_numbers(&transfer.id, &traces)?;

        if let Err(e) = self.publish(&transfer, legs).await {
            fail_unpublished(self.transfers.as_ref(), self.publisher.as_ref(), &transfer.id, &e)
                .await;
            return Err(e);
        }

        info!(
            "Accepted transfer {} for {} ({} -> {})",
            transfer.id, transfer.amount, transfer.source, transfer.destination
        );
        Ok(transfer)
    }

    async fn publish(&self, transfer: &Transfer, legs: Vec<LegFile>) -> Result<()> {
        for leg in legs {
            self.publisher
                .publish_file(OutboundFile {
                    transfer_id: transfer.id.clone(),
                    leg: leg.kind.as_str().to_string(),
                    file: leg.file,
                })
                .await?;
        }
        Ok(())
    }
}

/// Marks a stored transfer whose files never reached the aggregator as
/// failed, and tombstones whatever legs did get through.
pub async fn fail_unpublished<R: TransferRepository + ?Sized>(
    transfers: &R,
    publisher: &dyn Publisher,
    transfer_id: &str,
    cause: &AchError,
) {
    error!("Transfer {} could not be staged: {}", transfer_id, cause);
    if let Err(e) = transfers.update_transfer_status(transfer_id, TransferStatus::Failed, None) {
        error!("Could not mark transfer {} failed: {}", transfer_id, e);
    }
    if let Err(e) = publisher.cancel_transfer(transfer_id).await {
        warn!("Could not cancel staged legs of {}: {}", transfer_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{testutil::odfi, SettlementPosture};
    use crate::directory::testutil::party;
    use crate::directory::{AccountNumber, AccountType, InMemoryDirectory, PartyRef, PartyStatus};
    use crate::events::{ChannelPublisher, OutboundEvent};
    use crate::nacha::{testutil::entry, Addenda99};
    use crate::storage::Database;

    fn originator(
        directory: InMemoryDirectory,
        db: Arc<Database>,
    ) -> (Originator, tokio::sync::mpsc::Receiver<OutboundEvent>) {
        let directory: Arc<dyn AccountDirectory> = Arc::new(directory);
        let builder = Arc::new(FileBuilder::new(odfi()).unwrap());
        let strategy = Arc::new(ThirdParty::new(
            builder,
            directory.clone(),
            SettlementPosture::Hold,
            2,
        ));
        let (publisher, events) = ChannelPublisher::new(8);
        let originator = Originator::new(directory, strategy, db, Arc::new(publisher), "1234567890");
        (originator, events)
    }

    fn seeded() -> InMemoryDirectory {
        let directory = InMemoryDirectory::new();
        directory.insert(
            party("a", "a1", "121042882", AccountType::Checking),
            AccountNumber::new("11112222"),
        );
        directory.insert(
            party("b", "b1", "273976369", AccountType::Savings),
            AccountNumber::new("33334444"),
        );
        directory
    }

    #[tokio::test]
    async fn test_unpublished_transfer_is_marked_failed() {
        let db = Arc::new(Database::in_memory().unwrap());
        let (originator, events) = originator(seeded(), db.clone());
        drop(events);
        let transfer = Transfer::new(
            "USD 12.47".parse().unwrap(),
            PartyRef::new("a", "a1"),
            PartyRef::new("b", "b1"),
            "rent",
        );
        let id = transfer.id.clone();

        assert!(originator.submit(transfer).await.is_err());
        let stored = db.get_transfer(&id).unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Failed);
        assert_eq!(stored.return_code, None);
    }

    #[tokio::test]
    async fn test_submit_records_and_publishes_every_leg() {
        let db = Arc::new(Database::in_memory().unwrap());
        let (originator, mut events) = originator(seeded(), db.clone());
        let transfer = Transfer::new(
            "USD 12.47".parse().unwrap(),
            PartyRef::new("a", "a1"),
            PartyRef::new("b", "b1"),
            "rent",
        );

        let accepted = originator.submit(transfer).await.unwrap();
        assert_eq!(accepted.status, TransferStatus::Pending);

        let mut legs = Vec::new();
        while let Ok(OutboundEvent::FileStaged(outbound)) = events.try_recv() {
            assert_eq!(outbound.transfer_id, accepted.id);
            legs.push(outbound);
        }
        let names: Vec<_> = legs.iter().map(|l| l.leg.as_str()).collect();
        assert_eq!(names, vec!["debit", "credit"]);

        for leg in &legs {
            let batch = &leg.file.batches[0];
            // each leg carries its offset, so the batch nets to zero
            assert_eq!(batch.total_debit(), 1247);
            assert_eq!(batch.total_credit(), 1247);
            for e in &batch.entries {
                assert!(e.trace_number.starts_with("23138010"));
                let found = db.find_transfer_by_trace(&e.trace_number).unwrap().unwrap();
                assert_eq!(found.id, accepted.id);
            }
        }
    }

    #[tokio::test]
    async fn test_submit_refuses_unknown_or_blocked_source() {
        let db = Arc::new(Database::in_memory().unwrap());
        let directory = seeded();
        directory.set_status("a", "a1", PartyStatus::ReceiveOnly);
        let (originator, mut events) = originator(directory, db.clone());

        let blocked = Transfer::new(
            "USD 12.47".parse().unwrap(),
            PartyRef::new("a", "a1"),
            PartyRef::new("b", "b1"),
            "",
        );
        assert!(matches!(
            originator.submit(blocked.clone()).await,
            Err(crate::error::AchError::Policy(_))
        ));
        assert!(db.get_transfer(&blocked.id).unwrap().is_none());

        let unknown = Transfer::new(
            "USD 1.00".parse().unwrap(),
            PartyRef::new("x", "x1"),
            PartyRef::new("b", "b1"),
            "",
        );
        assert!(matches!(
            originator.submit(unknown).await,
            Err(crate::error::AchError::NotFound(_))
        ));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_returned_entry_requires_addenda99() {
        let mut e = entry(TransactionCode::CHECKING_RETURN_DEBIT, 1247, "121042880000001");
        assert!(ReturnedEntry::from_entry(&e).is_none());

        e.addenda99 = Some(Addenda99 {
            return_code: "R01".to_string(),
            original_trace: "231380100000001".to_string(),
            date_of_death: None,
            original_dfi: "23138010".to_string(),
            addenda_information: String::new(),
            trace_number: "121042880000001".to_string(),
        });
        let returned = ReturnedEntry::from_entry(&e).unwrap();
        assert_eq!(returned.return_code, "R01");
        assert_eq!(returned.original_trace, "231380100000001");
        assert!(returned.was_debit());
    }
}
