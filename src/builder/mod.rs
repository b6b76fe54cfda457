pub mod calendar;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::{
    config::OdfiConfig,
    directory::ResolvedParty,
    error::{AchError, Result},
    nacha::{
        Addenda05, Batch, BatchHeader, EntryDetail, File, FileHeader, ServiceClass,
        StandardEntryClass, MAX_AMOUNT,
    },
    routing,
    storage::Transfer,
};

/// Individual name written on balancing entries.
pub const OFFSET_MARKER: &str = "OFFSET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

/// One entry to originate: which account it posts to and how.
#[derive(Debug, Clone)]
pub struct Leg<'a> {
    pub transfer: &'a Transfer,
    pub direction: Direction,
    pub party: &'a ResolvedParty,
    pub company_id: &'a str,
    /// Extra banking days added to the effective entry date.
    pub delay_days: u32,
    /// Replaces the configured company entry description.
    pub entry_description: Option<&'a str>,
}

pub struct FileBuilder {
    odfi: OdfiConfig,
    timezone: Tz,
    sec: StandardEntryClass,
}

impl FileBuilder {
    pub fn new(odfi: OdfiConfig) -> Result<Self> {
        let timezone: Tz = odfi.timezone.parse().map_err(|_| {
            AchError::Config(format!("unknown timezone {:?}", odfi.timezone))
        })?;
        let sec = StandardEntryClass::parse(&odfi.standard_entry_class).ok_or_else(|| {
            AchError::Config(format!(
                "unsupported standard entry class {:?}",
                odfi.standard_entry_class
            ))
        })?;
        Ok(Self {
            odfi,
            timezone,
            sec,
        })
    }

    pub fn odfi(&self) -> &OdfiConfig {
        &self.odfi
    }

    /// Builds the single file moving `transfer` between the two parties.
    pub fn build(
        &self,
        transfer: &Transfer,
        source: &ResolvedParty,
        destination: &ResolvedParty,
    ) -> Result<File> {
        self.build_for(&self.odfi.company_id, transfer, source, destination)
    }

    /// As [`FileBuilder::build`], originating for `company_id`.
    ///
    /// When the ODFI holds the source account the entry credits the
    /// destination; otherwise it debits the source.
    pub fn build_for(
        &self,
        company_id: &str,
        transfer: &Transfer,
        source: &ResolvedParty,
        destination: &ResolvedParty,
    ) -> Result<File> {
        let (direction, party) = if self.odfi.routing_number == source.party.routing_number {
            (Direction::Credit, destination)
        } else {
            (Direction::Debit, source)
        };
        self.build_leg(&Leg {
            transfer,
            direction,
            party,
            company_id,
            delay_days: 0,
            entry_description: None,
        })
    }

    pub fn build_leg(&self, leg: &Leg<'_>) -> Result<File> {
        self.build_leg_at(leg, Utc::now())
    }

    pub fn build_leg_at(&self, leg: &Leg<'_>, now: DateTime<Utc>) -> Result<File> {
        let transfer = leg.transfer;
        let party = &leg.party.party;

        if leg.direction == Direction::Debit && !party.status.can_debit() {
            return Err(AchError::policy(format!(
                "account {} cannot be debited while {:?}",
                party.reference(),
                party.status
            )));
        }
        if transfer.amount.currency() != "USD" {
            return Err(AchError::validation(format!(
                "transfer {} is in {}; ACH entries are USD only",
                transfer.id,
                transfer.amount.currency()
            )));
        }
        let amount = transfer.amount.minor_units();
        if amount <= 0 || amount as u64 > MAX_AMOUNT {
            return Err(AchError::validation(format!(
                "transfer {} amount {} must be positive and at most {} cents",
                transfer.id, transfer.amount, MAX_AMOUNT
            )));
        }
        let amount = amount as u64;

        let local = now.with_timezone(&self.timezone);
        let today = local.date_naive();
        let effective = calendar::add_banking_days(
            self.effective_date(today, transfer.same_day),
            leg.delay_days,
        );
        let descriptive_date = if transfer.same_day {
            format!("SD{}", local.format("%H%M"))
        } else {
            String::new()
        };

        let code = match leg.direction {
            Direction::Credit => party.account_type.credit_code(),
            Direction::Debit => party.account_type.debit_code(),
        };
        let mut entry = EntryDetail {
            transaction_code: code,
            rdfi_identification: routing::aba8(&party.routing_number),
            check_digit: routing::aba_check_digit(&party.routing_number),
            dfi_account_number: leg.party.account_number.expose().to_string(),
            amount,
            identification_number: truncate(&transfer.id, 15),
            individual_name: truncate(&party.holder_name, 22),
            discretionary_data: String::new(),
            trace_number: routing::trace_number(&self.odfi.routing_number),
            addenda05: Vec::new(),
            addenda98: None,
            addenda99: None,
        };
        if self.odfi.include_addenda && !transfer.description.is_empty() {
            entry.addenda05.push(Addenda05 {
                payment_related_information: truncate(&transfer.description, 80),
                sequence_number: 1,
                entry_detail_sequence_number: entry.sequence_number(),
            });
        }
        debug!(
            transfer = %transfer.id,
            code = %entry.transaction_code,
            trace = %entry.trace_number,
            account = %leg.party.account_number,
            "built entry"
        );

        let mut entries = vec![entry];
        if let Some(offset) = &self.odfi.offset {
            let code = match leg.direction {
                Direction::Credit => offset.account_type.debit_code(),
                Direction::Debit => offset.account_type.credit_code(),
            };
            entries.push(EntryDetail {
                transaction_code: code,
                rdfi_identification: routing::aba8(&self.odfi.routing_number),
                check_digit: routing::aba_check_digit(&self.odfi.routing_number),
                dfi_account_number: offset.account_number.clone(),
                amount,
                identification_number: truncate(&transfer.id, 15),
                individual_name: OFFSET_MARKER.to_string(),
                discretionary_data: String::new(),
                trace_number: routing::trace_number(&self.odfi.routing_number),
                addenda05: Vec::new(),
                addenda98: None,
                addenda99: None,
            });
        }

        let description = leg
            .entry_description
            .unwrap_or(&self.odfi.entry_description);
        let mut batch = Batch::new(BatchHeader {
            service_class: ServiceClass::Mixed,
            company_name: truncate(&self.odfi.company_name, 16),
            company_discretionary_data: String::new(),
            company_identification: truncate(leg.company_id, 10),
            standard_entry_class: self.sec,
            company_entry_description: truncate(description, 10),
            company_descriptive_date: descriptive_date,
            effective_entry_date: Some(effective),
            originator_status_code: '1',
            odfi_identification: routing::aba8(&self.odfi.routing_number),
            batch_number: 1,
        });
        batch.entries = entries;
        batch.refresh_service_class();

        let mut file = File::new(FileHeader {
            immediate_destination: self.odfi.routing_number.clone(),
            immediate_origin: self.odfi.origin().to_string(),
            file_creation_date: today,
            file_creation_time: Some(local.time()),
            file_id_modifier: 'A',
            immediate_destination_name: self.odfi.destination_name.clone(),
            immediate_origin_name: self.odfi.origin_name.clone(),
            reference_code: String::new(),
        });
        file.add_batch(batch);
        file.validate()?;
        Ok(file)
    }

    fn effective_date(&self, today: NaiveDate, same_day: bool) -> NaiveDate {
        if same_day {
            calendar::banking_day_on_or_after(today)
        } else {
            calendar::next_banking_day(today)
        }
    }
}

/// Trace numbers of every entry in `file`, offsets included.
pub fn trace_numbers(file: &File) -> Vec<String> {
    file.entries().map(|e| e.trace_number.clone()).collect()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
