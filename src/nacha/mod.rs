//! NACHA record model: File, Batch, EntryDetail and the 05/98/99 addenda.
//!
//! Control records (batch control, file control) are not stored; their totals
//! are derived from the entries whenever a file is written or checked.

pub mod codes;
pub mod reader;
pub mod writer;

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

pub use codes::{ServiceClass, StandardEntryClass, TransactionCode};
pub use reader::read_file;
pub use writer::write_file;

use crate::routing;

pub const RECORD_LENGTH: usize = 94;
pub const BLOCKING_FACTOR: usize = 10;
pub const MAX_AMOUNT: u64 = 9_999_999_999;
/// Largest number of records a single file may contain.
pub const MAX_FILE_RECORDS: usize = 10_000;

#[derive(Error, Debug)]
pub enum NachaError {
    /// Batches were read but no file header record was present.
    #[error("file header record is missing")]
    MissingFileHeader(Box<File>),

    #[error("line {line}: {message}")]
    Line { line: usize, message: String },

    #[error("{0}")]
    Invalid(String),
}

impl NachaError {
    fn invalid(msg: impl Into<String>) -> Self {
        NachaError::Invalid(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub immediate_destination: String,
    pub immediate_origin: String,
    pub file_creation_date: NaiveDate,
    pub file_creation_time: Option<NaiveTime>,
    pub file_id_modifier: char,
    pub immediate_destination_name: String,
    pub immediate_origin_name: String,
    pub reference_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchHeader {
    pub service_class: ServiceClass,
    pub company_name: String,
    pub company_discretionary_data: String,
    pub company_identification: String,
    pub standard_entry_class: StandardEntryClass,
    pub company_entry_description: String,
    pub company_descriptive_date: String,
    pub effective_entry_date: Option<NaiveDate>,
    pub originator_status_code: char,
    pub odfi_identification: String,
    pub batch_number: u32,
}

impl BatchHeader {
    /// Whether two headers describe the same batch apart from numbering and
    /// service class, so their entries may share one batch.
    pub fn mergeable_with(&self, other: &BatchHeader) -> bool {
        self.company_name == other.company_name
            && self.company_discretionary_data == other.company_discretionary_data
            && self.company_identification == other.company_identification
            && self.standard_entry_class == other.standard_entry_class
            && self.company_entry_description == other.company_entry_description
            && self.company_descriptive_date == other.company_descriptive_date
            && self.effective_entry_date == other.effective_entry_date
            && self.odfi_identification == other.odfi_identification
    }
}

/// Payment related information.
#[derive(Debug, Clone, PartialEq)]
pub struct Addenda05 {
    pub payment_related_information: String,
    pub sequence_number: u32,
    pub entry_detail_sequence_number: u32,
}

/// Notification of change.
#[derive(Debug, Clone, PartialEq)]
pub struct Addenda98 {
    pub change_code: String,
    pub original_trace: String,
    pub original_dfi: String,
    pub corrected_data: String,
    pub trace_number: String,
}

/// Return.
#[derive(Debug, Clone, PartialEq)]
pub struct Addenda99 {
    pub return_code: String,
    pub original_trace: String,
    pub date_of_death: Option<NaiveDate>,
    pub original_dfi: String,
    pub addenda_information: String,
    pub trace_number: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryDetail {
    pub transaction_code: TransactionCode,
    pub rdfi_identification: String,
    pub check_digit: String,
    pub dfi_account_number: String,
    pub amount: u64,
    pub identification_number: String,
    pub individual_name: String,
    pub discretionary_data: String,
    pub trace_number: String,
    pub addenda05: Vec<Addenda05>,
    pub addenda98: Option<Addenda98>,
    pub addenda99: Option<Addenda99>,
}

impl EntryDetail {
    pub fn has_addenda(&self) -> bool {
        !self.addenda05.is_empty() || self.addenda98.is_some() || self.addenda99.is_some()
    }

    pub fn addenda_count(&self) -> usize {
        self.addenda05.len()
            + usize::from(self.addenda98.is_some())
            + usize::from(self.addenda99.is_some())
    }

    /// Last seven digits of the trace number, used as the entry sequence.
    pub fn sequence_number(&self) -> u32 {
        let len = self.trace_number.len();
        self.trace_number
            .get(len.saturating_sub(7)..)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), NachaError> {
        let trace = &self.trace_number;
        if !self.transaction_code.is_known() {
            return Err(NachaError::invalid(format!(
                "entry {}: unknown transaction code {}",
                trace, self.transaction_code
            )));
        }
        if self.rdfi_identification.len() != 8 || !is_digits(&self.rdfi_identification) {
            return Err(NachaError::invalid(format!(
                "entry {}: RDFI identification {:?} must be 8 digits",
                trace, self.rdfi_identification
            )));
        }
        let expected = routing::compute_check_digit(&self.rdfi_identification);
        let actual = self.check_digit.parse::<u32>().ok();
        if self.check_digit.len() != 1 || expected != actual {
            return Err(NachaError::invalid(format!(
                "entry {}: check digit {:?} does not match routing number {}",
                trace, self.check_digit, self.rdfi_identification
            )));
        }
        if self.dfi_account_number.trim().is_empty() || self.dfi_account_number.len() > 17 {
            return Err(NachaError::invalid(format!(
                "entry {}: account number must be 1-17 characters",
                trace
            )));
        }
        if self.amount > MAX_AMOUNT {
            return Err(NachaError::invalid(format!(
                "entry {}: amount {} exceeds the 10 digit field",
                trace, self.amount
            )));
        }
        if trace.len() != 15 || !is_digits(trace) {
            return Err(NachaError::invalid(format!(
                "trace number {:?} must be 15 digits",
                trace
            )));
        }
        for (i, addenda) in self.addenda05.iter().enumerate() {
            if addenda.sequence_number as usize != i + 1 {
                return Err(NachaError::invalid(format!(
                    "entry {}: addenda sequence {} out of order",
                    trace, addenda.sequence_number
                )));
            }
        }
        for field in [
            &self.dfi_account_number,
            &self.identification_number,
            &self.individual_name,
            &self.discretionary_data,
        ] {
            if !field.is_ascii() {
                return Err(NachaError::invalid(format!(
                    "entry {}: non-ASCII field {:?}",
                    trace, field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub header: BatchHeader,
    pub entries: Vec<EntryDetail>,
}

impl Batch {
    pub fn new(header: BatchHeader) -> Self {
        Self {
            header,
            entries: Vec::new(),
        }
    }

    pub fn total_debit(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.transaction_code.is_debit())
            .map(|e| e.amount)
            .sum()
    }

    pub fn total_credit(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.transaction_code.is_credit())
            .map(|e| e.amount)
            .sum()
    }

    /// Entry plus addenda record count.
    pub fn entry_addenda_count(&self) -> usize {
        self.entries.iter().map(|e| 1 + e.addenda_count()).sum()
    }

    pub fn entry_hash(&self) -> u64 {
        let sum: u64 = self
            .entries
            .iter()
            .filter_map(|e| e.rdfi_identification.parse::<u64>().ok())
            .sum();
        sum % 10_000_000_000
    }

    /// Header, entries, addenda and control.
    pub fn record_count(&self) -> usize {
        2 + self.entry_addenda_count()
    }

    /// Recomputes the service class from the entries it now holds.
    pub fn refresh_service_class(&mut self) {
        let has_credits = self.entries.iter().any(|e| e.transaction_code.is_credit());
        let has_debits = self.entries.iter().any(|e| e.transaction_code.is_debit());
        self.header.service_class = ServiceClass::for_entries(has_credits, has_debits);
    }

    pub fn validate(&self) -> Result<(), NachaError> {
        let header = &self.header;
        if self.entries.is_empty() {
            return Err(NachaError::invalid(format!(
                "batch {} has no entries",
                header.batch_number
            )));
        }
        if header.odfi_identification.len() != 8 || !is_digits(&header.odfi_identification) {
            return Err(NachaError::invalid(format!(
                "batch {}: ODFI identification {:?} must be 8 digits",
                header.batch_number, header.odfi_identification
            )));
        }
        if header.company_identification.trim().is_empty() {
            return Err(NachaError::invalid(format!(
                "batch {}: company identification is required",
                header.batch_number
            )));
        }
        for entry in &self.entries {
            entry.validate()?;
            let allowed = match header.service_class {
                ServiceClass::Mixed => true,
                ServiceClass::CreditsOnly => entry.transaction_code.is_credit(),
                ServiceClass::DebitsOnly => entry.transaction_code.is_debit(),
            };
            if !allowed {
                return Err(NachaError::invalid(format!(
                    "batch {}: transaction code {} not allowed in service class {}",
                    header.batch_number,
                    entry.transaction_code,
                    header.service_class.code()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub header: Option<FileHeader>,
    pub batches: Vec<Batch>,
}

impl File {
    pub fn new(header: FileHeader) -> Self {
        Self {
            header: Some(header),
            batches: Vec::new(),
        }
    }

    pub fn add_batch(&mut self, mut batch: Batch) {
        batch.header.batch_number = self.batches.len() as u32 + 1;
        self.batches.push(batch);
    }

    pub fn entries(&self) -> impl Iterator<Item = &EntryDetail> {
        self.batches.iter().flat_map(|b| b.entries.iter())
    }

    pub fn total_debit(&self) -> u64 {
        self.batches.iter().map(Batch::total_debit).sum()
    }

    pub fn total_credit(&self) -> u64 {
        self.batches.iter().map(Batch::total_credit).sum()
    }

    pub fn entry_addenda_count(&self) -> usize {
        self.batches.iter().map(Batch::entry_addenda_count).sum()
    }

    pub fn entry_hash(&self) -> u64 {
        self.batches.iter().map(Batch::entry_hash).sum::<u64>() % 10_000_000_000
    }

    /// Records before block padding: file header, batches, file control.
    pub fn record_count(&self) -> usize {
        2 + self.batches.iter().map(Batch::record_count).sum::<usize>()
    }

    pub fn block_count(&self) -> usize {
        self.record_count().div_ceil(BLOCKING_FACTOR)
    }

    pub fn validate(&self) -> Result<(), NachaError> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| NachaError::invalid("file header is missing"))?;
        if header.immediate_destination.len() != 9 || !is_digits(&header.immediate_destination) {
            return Err(NachaError::invalid(format!(
                "immediate destination {:?} must be a 9 digit routing number",
                header.immediate_destination
            )));
        }
        if header.immediate_origin.trim().is_empty() || header.immediate_origin.len() > 10 {
            return Err(NachaError::invalid(format!(
                "immediate origin {:?} must be 1-10 characters",
                header.immediate_origin
            )));
        }
        if !header.file_id_modifier.is_ascii_alphanumeric() {
            return Err(NachaError::invalid(format!(
                "file ID modifier {:?} must be A-Z or 0-9",
                header.file_id_modifier
            )));
        }
        if self.batches.is_empty() {
            return Err(NachaError::invalid("file has no batches"));
        }
        for batch in &self.batches {
            batch.validate()?;
        }
        Ok(())
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::NaiveDate;

    pub fn header() -> FileHeader {
        FileHeader {
            immediate_destination: "231380104".to_string(),
            immediate_origin: "121042882".to_string(),
            file_creation_date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            file_creation_time: NaiveTime::from_hms_opt(9, 30, 0),
            file_id_modifier: 'A',
            immediate_destination_name: "Citadel".to_string(),
            immediate_origin_name: "Wells Fargo".to_string(),
            reference_code: String::new(),
        }
    }

    pub fn batch_header(service_class: ServiceClass) -> BatchHeader {
        BatchHeader {
            service_class,
            company_name: "Acme Payroll".to_string(),
            company_discretionary_data: String::new(),
            company_identification: "121042882".to_string(),
            standard_entry_class: StandardEntryClass::Ppd,
            company_entry_description: "PAYROLL".to_string(),
            company_descriptive_date: String::new(),
            effective_entry_date: NaiveDate::from_ymd_opt(2026, 10, 19),
            originator_status_code: '1',
            odfi_identification: "23138010".to_string(),
            batch_number: 1,
        }
    }

    pub fn entry(code: TransactionCode, amount: u64, trace: &str) -> EntryDetail {
        EntryDetail {
            transaction_code: code,
            rdfi_identification: "12104288".to_string(),
            check_digit: "2".to_string(),
            dfi_account_number: "81967038518".to_string(),
            amount,
            identification_number: "transfer-1".to_string(),
            individual_name: "Jane Doe".to_string(),
            discretionary_data: String::new(),
            trace_number: trace.to_string(),
            addenda05: Vec::new(),
            addenda98: None,
            addenda99: None,
        }
    }

    pub fn file_with(entries: Vec<EntryDetail>) -> File {
        let mut batch = Batch::new(batch_header(ServiceClass::Mixed));
        batch.entries = entries;
        batch.refresh_service_class();
        let mut file = File::new(header());
        file.add_batch(batch);
        file
    }
}
