use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    builder::{Direction, FileBuilder, Leg},
    config::SettlementPosture,
    directory::{self, AccountDirectory, ResolvedParty},
    error::{ErrorList, Result},
    fundflow::{LegFile, LegKind, ReturnedEntry, Strategy},
    storage::Transfer,
};

const REVERSAL_DESCRIPTION: &str = "REVERSAL";

/// Neither party banks with the ODFI: the source is debited into the ODFI and
/// the destination credited out of it.
pub struct ThirdParty {
    builder: Arc<FileBuilder>,
    directory: Arc<dyn AccountDirectory>,
    posture: SettlementPosture,
    hold_days: u32,
}

impl ThirdParty {
    pub fn new(
        builder: Arc<FileBuilder>,
        directory: Arc<dyn AccountDirectory>,
        posture: SettlementPosture,
        hold_days: u32,
    ) -> Self {
        Self {
            builder,
            directory,
            posture,
            hold_days,
        }
    }

    fn credit_delay(&self) -> u32 {
        match self.posture {
            SettlementPosture::Hold => self.hold_days,
            SettlementPosture::PreFund | SettlementPosture::CreditLine => 0,
        }
    }
}

#[async_trait]
impl Strategy for ThirdParty {
    async fn originate(
        &self,
        company_id: &str,
        transfer: &Transfer,
        source: &ResolvedParty,
        destination: &ResolvedParty,
    ) -> Result<Vec<LegFile>> {
        let debit = Leg {
            transfer,
            direction: Direction::Debit,
            party: source,
            company_id,
            delay_days: 0,
            entry_description: None,
        };
        let credit = Leg {
            transfer,
            direction: Direction::Credit,
            party: destination,
            company_id,
            delay_days: self.credit_delay(),
            entry_description: None,
        };

        let mut errors = ErrorList::new();
        let debit = errors.capture(self.builder.build_leg(&debit));
        let credit = errors.capture(self.builder.build_leg(&credit));
        errors.into_result()?;

        let legs = debit
            .map(|file| LegFile {
                kind: LegKind::Debit,
                file,
            })
            .into_iter()
            .chain(credit.map(|file| LegFile {
                kind: LegKind::Credit,
                file,
            }))
            .collect();
        Ok(legs)
    }

    async fn handle_return(
        &self,
        returned: &ReturnedEntry,
        transfer: &Transfer,
    ) -> Result<Vec<LegFile>> {
        if !returned.was_debit() {
            info!(
                "Credit leg of transfer {} returned ({}), nothing to reverse",
                transfer.id, returned.return_code
            );
            return Ok(Vec::new());
        }

        match self.posture {
            SettlementPosture::Hold => {
                info!(
                    "Debit leg of transfer {} returned ({}), held credit will be canceled",
                    transfer.id, returned.return_code
                );
                Ok(Vec::new())
            }
            SettlementPosture::PreFund => {
                warn!(
                    "Debit leg of transfer {} returned ({}) after pre-funded credit",
                    transfer.id, returned.return_code
                );
                Ok(Vec::new())
            }
            SettlementPosture::CreditLine => {
                let destination =
                    directory::resolve(self.directory.as_ref(), &transfer.destination).await?;
                let company_id = self.builder.odfi().company_id.clone();
                let file = self.builder.build_leg(&Leg {
                    transfer,
                    direction: Direction::Debit,
                    party: &destination,
                    company_id: &company_id,
                    delay_days: 0,
                    entry_description: Some(REVERSAL_DESCRIPTION),
                })?;
                info!(
                    "Debit leg of transfer {} returned ({}), reversing credit to {}",
                    transfer.id, returned.return_code, transfer.destination
                );
                Ok(vec![LegFile {
                    kind: LegKind::Reversal,
                    file,
                }])
            }
        }
    }
}
