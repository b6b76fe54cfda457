use chrono::{NaiveDate, NaiveTime};

use super::{
    Addenda05, Addenda98, Addenda99, Batch, BatchHeader, EntryDetail, File, FileHeader,
    NachaError, ServiceClass, StandardEntryClass, TransactionCode, RECORD_LENGTH,
};

/// Decodes a NACHA file.
///
/// When batches are present but the file header record is not, the decoded
/// file is still returned inside [`NachaError::MissingFileHeader`] so callers
/// can choose to process it.
pub fn read_file(input: &str) -> Result<File, NachaError> {
    let mut file = File {
        header: None,
        batches: Vec::new(),
    };
    let mut current: Option<(Batch, usize)> = None;

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let raw = raw.trim_end_matches('\r');
        if raw.trim().is_empty() {
            continue;
        }
        if !raw.is_ascii() {
            return Err(line_err(line_no, "record contains non-ASCII characters"));
        }
        if raw.len() > RECORD_LENGTH {
            return Err(line_err(
                line_no,
                format!("record is {} characters, expected {}", raw.len(), RECORD_LENGTH),
            ));
        }
        let line = format!("{:<width$}", raw, width = RECORD_LENGTH);
        let rec = Record {
            line: &line,
            line_no,
        };

        match &line[..1] {
            "1" => {
                if file.header.is_some() {
                    return Err(line_err(line_no, "duplicate file header record"));
                }
                file.header = Some(rec.file_header()?);
            }
            "5" => {
                if current.is_some() {
                    return Err(line_err(line_no, "batch header before previous batch control"));
                }
                current = Some((Batch::new(rec.batch_header()?), line_no));
            }
            "6" => {
                let (batch, _) = current
                    .as_mut()
                    .ok_or_else(|| line_err(line_no, "entry detail outside of a batch"))?;
                batch.entries.push(rec.entry_detail()?);
            }
            "7" => {
                let entry = current
                    .as_mut()
                    .and_then(|(batch, _)| batch.entries.last_mut())
                    .ok_or_else(|| line_err(line_no, "addenda without an entry detail"))?;
                rec.attach_addenda(entry)?;
            }
            "8" => {
                let (batch, _) = current
                    .take()
                    .ok_or_else(|| line_err(line_no, "batch control without a batch header"))?;
                rec.check_batch_control(&batch)?;
                file.batches.push(batch);
            }
            "9" => {
                if line.chars().all(|c| c == '9') {
                    continue;
                }
                rec.check_file_control(&file)?;
            }
            other => {
                return Err(line_err(line_no, format!("unknown record type {:?}", other)));
            }
        }
    }

    if let Some((_, started)) = current {
        return Err(line_err(started, "batch is missing its batch control record"));
    }

    match (&file.header, file.batches.is_empty()) {
        (Some(_), _) => Ok(file),
        (None, false) => Err(NachaError::MissingFileHeader(Box::new(file))),
        (None, true) => Err(NachaError::invalid("file contains no records")),
    }
}

fn line_err(line: usize, message: impl Into<String>) -> NachaError {
    NachaError::Line {
        line,
        message: message.into(),
    }
}

struct Record<'a> {
    line: &'a str,
    line_no: usize,
}

impl<'a> Record<'a> {
    /// 1-indexed, inclusive column range as in the NACHA layout tables.
    fn field(&self, start: usize, end: usize) -> &'a str {
        &self.line[start - 1..end]
    }

    fn text(&self, start: usize, end: usize) -> String {
        self.field(start, end).trim().to_string()
    }

    fn number(&self, start: usize, end: usize, name: &str) -> Result<u64, NachaError> {
        let raw = self.field(start, end).trim();
        raw.parse().map_err(|_| {
            line_err(self.line_no, format!("{} {:?} is not numeric", name, raw))
        })
    }

    fn date(&self, start: usize, end: usize, name: &str) -> Result<Option<NaiveDate>, NachaError> {
        let raw = self.field(start, end).trim();
        if raw.is_empty() || raw.chars().all(|c| c == '0') {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw, "%y%m%d")
            .map(Some)
            .map_err(|_| line_err(self.line_no, format!("{} {:?} is not YYMMDD", name, raw)))
    }

    fn file_header(&self) -> Result<FileHeader, NachaError> {
        let file_creation_date = self
            .date(24, 29, "file creation date")?
            .ok_or_else(|| line_err(self.line_no, "file creation date is required"))?;
        let raw_time = self.field(30, 33).trim();
        let file_creation_time = if raw_time.is_empty() {
            None
        } else {
            Some(NaiveTime::parse_from_str(raw_time, "%H%M").map_err(|_| {
                line_err(self.line_no, format!("file creation time {:?} is not HHMM", raw_time))
            })?)
        };

        Ok(FileHeader {
            immediate_destination: self.text(4, 13),
            immediate_origin: self.text(14, 23),
            file_creation_date,
            file_creation_time,
            file_id_modifier: self.field(34, 34).chars().next().unwrap_or('A'),
            immediate_destination_name: self.text(41, 63),
            immediate_origin_name: self.text(64, 86),
            reference_code: self.text(87, 94),
        })
    }

    fn batch_header(&self) -> Result<BatchHeader, NachaError> {
        let code = self.number(2, 4, "service class code")? as u16;
        let service_class = ServiceClass::from_code(code).ok_or_else(|| {
            line_err(self.line_no, format!("unknown service class code {}", code))
        })?;
        let sec = self.field(51, 53);
        let standard_entry_class = StandardEntryClass::parse(sec).ok_or_else(|| {
            line_err(self.line_no, format!("unsupported standard entry class {:?}", sec))
        })?;

        Ok(BatchHeader {
            service_class,
            company_name: self.text(5, 20),
            company_discretionary_data: self.text(21, 40),
            company_identification: self.text(41, 50),
            standard_entry_class,
            company_entry_description: self.text(54, 63),
            company_descriptive_date: self.text(64, 69),
            effective_entry_date: self.date(70, 75, "effective entry date")?,
            originator_status_code: self.field(79, 79).chars().next().unwrap_or('1'),
            odfi_identification: self.text(80, 87),
            batch_number: self.number(88, 94, "batch number")? as u32,
        })
    }

    fn entry_detail(&self) -> Result<EntryDetail, NachaError> {
        Ok(EntryDetail {
            transaction_code: TransactionCode(self.number(2, 3, "transaction code")? as u8),
            rdfi_identification: self.text(4, 11),
            check_digit: self.text(12, 12),
            dfi_account_number: self.text(13, 29),
            amount: self.number(30, 39, "amount")?,
            identification_number: self.text(40, 54),
            individual_name: self.text(55, 76),
            discretionary_data: self.text(77, 78),
            trace_number: self.text(80, 94),
            addenda05: Vec::new(),
            addenda98: None,
            addenda99: None,
        })
    }

    fn attach_addenda(&self, entry: &mut EntryDetail) -> Result<(), NachaError> {
        match self.field(2, 3) {
            "05" => entry.addenda05.push(Addenda05 {
                payment_related_information: self.text(4, 83),
                sequence_number: self.number(84, 87, "addenda sequence number")? as u32,
                entry_detail_sequence_number: self.number(88, 94, "entry detail sequence")?
                    as u32,
            }),
            "98" => {
                entry.addenda98 = Some(Addenda98 {
                    change_code: self.text(4, 6),
                    original_trace: self.text(7, 21),
                    original_dfi: self.text(28, 35),
                    corrected_data: self.text(36, 64),
                    trace_number: self.text(80, 94),
                })
            }
            "99" => {
                entry.addenda99 = Some(Addenda99 {
                    return_code: self.text(4, 6),
                    original_trace: self.text(7, 21),
                    date_of_death: self.date(22, 27, "date of death")?,
                    original_dfi: self.text(28, 35),
                    addenda_information: self.text(36, 79),
                    trace_number: self.text(80, 94),
                })
            }
            other => {
                return Err(line_err(
                    self.line_no,
                    format!("unsupported addenda type {:?}", other),
                ))
            }
        }
        Ok(())
    }

    fn check_batch_control(&self, batch: &Batch) -> Result<(), NachaError> {
        let count = self.number(5, 10, "entry/addenda count")?;
        if count != batch.entry_addenda_count() as u64 {
            return Err(line_err(
                self.line_no,
                format!(
                    "batch control counts {} records, batch has {}",
                    count,
                    batch.entry_addenda_count()
                ),
            ));
        }
        let debit = self.number(21, 32, "total debit")?;
        let credit = self.number(33, 44, "total credit")?;
        if debit != batch.total_debit() || credit != batch.total_credit() {
            return Err(line_err(
                self.line_no,
                format!(
                    "batch control totals debit={} credit={} do not match entries debit={} credit={}",
                    debit,
                    credit,
                    batch.total_debit(),
                    batch.total_credit()
                ),
            ));
        }
        Ok(())
    }

    fn check_file_control(&self, file: &File) -> Result<(), NachaError> {
        let batches = self.number(2, 7, "batch count")?;
        if batches != file.batches.len() as u64 {
            return Err(line_err(
                self.line_no,
                format!(
                    "file control counts {} batches, file has {}",
                    batches,
                    file.batches.len()
                ),
            ));
        }
        Ok(())
    }
}
