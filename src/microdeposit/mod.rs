pub mod limiter;

pub use limiter::{AttemptLimiter, SqliteAttemptLimiter};

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    builder::{self, Direction, FileBuilder, Leg},
    directory::{self, AccountDirectory, PartyRef, ResolvedParty},
    error::{AchError, ErrorList, Result},
    events::{OutboundFile, Publisher},
    fundflow::{self, LegKind},
    money::Amount,
    nacha::File,
    storage::{
        Depository, DepositoryRepository, DepositoryStatus, MicroDeposit, MicroDepositRepository,
        Transfer, TransferStatus,
    },
};

/// Company entry description NACHA requires on account validation entries.
pub const ENTRY_DESCRIPTION: &str = "ACCTVERIFY";

const MIN_CENTS: i64 = 1;
const MAX_CENTS: i64 = 25;

/// Two random amounts between 0.01 and 0.25.
pub fn random_amounts() -> Result<[Amount; 2]> {
    let mut rng = rand::thread_rng();
    Ok([
        Amount::from_minor_units("USD", rng.gen_range(MIN_CENTS..=MAX_CENTS))?,
        Amount::from_minor_units("USD", rng.gen_range(MIN_CENTS..=MAX_CENTS))?,
    ])
}

/// Whether `guesses` hold exactly the same amounts as `amounts`, in any order.
pub fn compare_guesses(amounts: &[Amount], guesses: &[Amount]) -> bool {
    if amounts.len() != guesses.len() {
        return false;
    }
    let key = |a: &Amount| (a.currency().to_string(), a.minor_units());
    let mut expected: Vec<_> = amounts.iter().map(key).collect();
    let mut actual: Vec<_> = guesses.iter().map(key).collect();
    expected.sort();
    actual.sort();
    expected == actual
}

/// Verifies account ownership with small credits the customer must read
/// back from their statement.
pub struct MicroDeposits {
    builder: Arc<FileBuilder>,
    directory: Arc<dyn AccountDirectory>,
    micro_deposits: Arc<dyn MicroDepositRepository>,
    depositories: Arc<dyn DepositoryRepository>,
    limiter: Arc<dyn AttemptLimiter>,
    publisher: Arc<dyn Publisher>,
    source: PartyRef,
}

impl MicroDeposits {
    pub fn new(
        builder: Arc<FileBuilder>,
        directory: Arc<dyn AccountDirectory>,
        micro_deposits: Arc<dyn MicroDepositRepository>,
        depositories: Arc<dyn DepositoryRepository>,
        limiter: Arc<dyn AttemptLimiter>,
        publisher: Arc<dyn Publisher>,
        source: PartyRef,
    ) -> Self {
        Self {
            builder,
            directory,
            micro_deposits,
            depositories,
            limiter,
            publisher,
            source,
        }
    }

    pub async fn initiate(&self, destination: &PartyRef) -> Result<MicroDeposit> {
        self.initiate_with(destination, random_amounts()?).await
    }

    /// Sends two credits of `amounts` to `destination` and one debit of
    /// their sum back.
    ///
    /// Every file is built before anything is stored, and the micro-deposit
    /// is stored with its transfers in one transaction before any file is
    /// published.
    pub async fn initiate_with(
        &self,
        destination: &PartyRef,
        amounts: [Amount; 2],
    ) -> Result<MicroDeposit> {
        let receiver = directory::resolve(self.directory.as_ref(), destination).await?;
        // the source only has to exist; entries post against the ODFI offset account
        directory::resolve(self.directory.as_ref(), &self.source).await?;

        let total = amounts[0].plus(&amounts[1])?;
        let description = "micro-deposit verification";
        let legs = [
            (
                Transfer::new(amounts[0].clone(), self.source.clone(), destination.clone(), description),
                Direction::Credit,
            ),
            (
                Transfer::new(amounts[1].clone(), self.source.clone(), destination.clone(), description),
                Direction::Credit,
            ),
            (
                Transfer::new(total, destination.clone(), self.source.clone(), description),
                Direction::Debit,
            ),
        ];

        let mut errors = ErrorList::new();
        let mut built: Vec<(Transfer, Direction, File)> = Vec::with_capacity(legs.len());
        for (transfer, direction) in legs {
            if let Some(file) = errors.capture(self.build(&transfer, direction, &receiver)) {
                built.push((transfer, direction, file));
            }
        }
        errors.into_result()?;

        let micro_deposit = MicroDeposit {
            id: Uuid::new_v4().to_string(),
            destination: destination.clone(),
            amounts: amounts.to_vec(),
            transfer_ids: built.iter().map(|(t, _, _)| t.id.clone()).collect(),
            status: TransferStatus::Pending,
            return_code: None,
            created: Utc::now(),
        };

        let existing = self.depositories.get_depository(&destination.account_id)?;
        if existing.as_ref().map(|d| d.status) == Some(DepositoryStatus::Rejected) {
            return Err(AchError::policy(format!(
                "depository {} is rejected",
                destination.account_id
            )));
        }
        if existing.is_none() {
            self.depositories.upsert_depository(&Depository::new(
                &destination.customer_id,
                &destination.account_id,
                &receiver.party.routing_number,
                receiver.account_number.expose(),
                &receiver.party.holder_name,
            ))?;
        }

        let records: Vec<(Transfer, Vec<String>)> = built
            .iter()
            .map(|(t, _, file)| (t.clone(), builder::trace_numbers(file)))
            .collect();
        self.micro_deposits
            .create_micro_deposit(&micro_deposit, &records)?;

        if let Err(e) = self.publish(built).await {
            for id in &micro_deposit.transfer_ids {
                fundflow::fail_unpublished(
                    self.micro_deposits.as_ref(),
                    self.publisher.as_ref(),
                    id,
                    &e,
                )
                .await;
            }
            if let Err(update) =
                self.micro_deposits
                    .update_micro_deposit(&micro_deposit.id, TransferStatus::Failed, None)
            {
                warn!("Could not mark micro-deposit {} failed: {}", micro_deposit.id, update);
            }
            return Err(e);
        }

        info!(
            "Sent micro-deposits {} to {}",
            micro_deposit.id, micro_deposit.destination
        );
        Ok(micro_deposit)
    }

    async fn publish(&self, built: Vec<(Transfer, Direction, File)>) -> Result<()> {
        for (transfer, direction, file) in built {
            let kind = match direction {
                Direction::Credit => LegKind::Credit,
                Direction::Debit => LegKind::Debit,
            };
            self.publisher
                .publish_file(OutboundFile {
                    transfer_id: transfer.id,
                    leg: kind.as_str().to_string(),
                    file,
                })
                .await?;
        }
        Ok(())
    }

    fn build(&self, transfer: &Transfer, direction: Direction, receiver: &ResolvedParty) -> Result<File> {
        let company_id = &self.builder.odfi().company_id;
        self.builder.build_leg(&Leg {
            transfer,
            direction,
            party: receiver,
            company_id,
            delay_days: 0,
            entry_description: Some(ENTRY_DESCRIPTION),
        })
    }

    /// Checks the customer's guesses against the latest micro-deposit and
    /// marks the depository verified on a match.
    pub async fn confirm(&self, destination: &PartyRef, guesses: &[Amount]) -> Result<()> {
        let depository_id = destination.account_id.as_str();
        let now = Utc::now();
        self.limiter.check(depository_id, now)?;
        self.limiter.record(depository_id, now)?;

        if let Some(depository) = self.depositories.get_depository(depository_id)? {
            if depository.status == DepositoryStatus::Rejected {
                return Err(AchError::policy(format!(
                    "depository {} is rejected",
                    depository_id
                )));
            }
        }
        let latest = self.micro_deposits.latest_micro_deposit(destination)?;
        if let Some(md) = latest.as_ref().filter(|md| md.status == TransferStatus::Failed) {
            return Err(AchError::policy(format!(
                "micro-deposit {} was returned ({})",
                md.id,
                md.return_code.as_deref().unwrap_or("no code")
            )));
        }
        let amounts = latest.map(|md| md.amounts).unwrap_or_default();
        if amounts.is_empty() {
            return Err(AchError::validation("got 0 micro deposits"));
        }
        if amounts.len() != guesses.len() {
            return Err(AchError::validation(format!(
                "incorrect micro deposit guesses: expected {} got {}",
                amounts.len(),
                guesses.len()
            )));
        }
        if !compare_guesses(&amounts, guesses) {
            warn!("Incorrect micro-deposit guesses for {}", destination);
            return Err(AchError::validation("incorrect micro deposit guesses"));
        }

        self.depositories
            .update_depository_status(depository_id, DepositoryStatus::Verified)?;
        info!("Depository {} verified by micro-deposits", depository_id);
        Ok(())
    }
}
