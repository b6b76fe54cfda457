use super::{
    Addenda05, Addenda98, Addenda99, Batch, EntryDetail, File, FileHeader, NachaError,
    BLOCKING_FACTOR, RECORD_LENGTH,
};

/// Encodes `file` as 94-column records, padded to a full block with `9` lines.
pub fn write_file(file: &File) -> Result<String, NachaError> {
    file.validate()?;
    let header = file
        .header
        .as_ref()
        .ok_or_else(|| NachaError::invalid("file header is missing"))?;

    let mut lines = Vec::with_capacity(file.block_count() * BLOCKING_FACTOR);
    lines.push(file_header(header));
    for batch in &file.batches {
        write_batch(batch, &mut lines);
    }
    lines.push(file_control(file));
    while lines.len() % BLOCKING_FACTOR != 0 {
        lines.push("9".repeat(RECORD_LENGTH));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

fn write_batch(batch: &Batch, lines: &mut Vec<String>) {
    let h = &batch.header;
    lines.push(format!(
        "5{:03}{}{}{}{}{}{}{}   {}{}{}",
        h.service_class.code(),
        alpha(&h.company_name, 16),
        alpha(&h.company_discretionary_data, 20),
        alpha(&h.company_identification, 10),
        h.standard_entry_class.as_str(),
        alpha(&h.company_entry_description, 10),
        alpha(&h.company_descriptive_date, 6),
        h.effective_entry_date
            .map(|d| d.format("%y%m%d").to_string())
            .unwrap_or_else(|| " ".repeat(6)),
        h.originator_status_code,
        alpha(&h.odfi_identification, 8),
        numeric(h.batch_number as u64, 7),
    ));

    for entry in &batch.entries {
        lines.push(entry_detail(entry));
        for addenda in &entry.addenda05 {
            lines.push(addenda05(addenda));
        }
        if let Some(addenda) = &entry.addenda98 {
            lines.push(addenda98(addenda));
        }
        if let Some(addenda) = &entry.addenda99 {
            lines.push(addenda99(addenda));
        }
    }

    lines.push(format!(
        "8{:03}{}{}{}{}{}{}{}{}{}",
        h.service_class.code(),
        numeric(batch.entry_addenda_count() as u64, 6),
        numeric(batch.entry_hash(), 10),
        numeric(batch.total_debit(), 12),
        numeric(batch.total_credit(), 12),
        alpha(&h.company_identification, 10),
        " ".repeat(19),
        " ".repeat(6),
        alpha(&h.odfi_identification, 8),
        numeric(h.batch_number as u64, 7),
    ));
}

fn file_header(h: &FileHeader) -> String {
    format!(
        "101{}{}{}{}{}094101{}{}{}",
        right(&h.immediate_destination, 10),
        right(&h.immediate_origin, 10),
        h.file_creation_date.format("%y%m%d"),
        h.file_creation_time
            .map(|t| t.format("%H%M").to_string())
            .unwrap_or_else(|| " ".repeat(4)),
        h.file_id_modifier,
        alpha(&h.immediate_destination_name, 23),
        alpha(&h.immediate_origin_name, 23),
        alpha(&h.reference_code, 8),
    )
}

fn file_control(file: &File) -> String {
    format!(
        "9{}{}{}{}{}{}{}",
        numeric(file.batches.len() as u64, 6),
        numeric(file.block_count() as u64, 6),
        numeric(file.entry_addenda_count() as u64, 8),
        numeric(file.entry_hash(), 10),
        numeric(file.total_debit(), 12),
        numeric(file.total_credit(), 12),
        " ".repeat(39),
    )
}

fn entry_detail(e: &EntryDetail) -> String {
    format!(
        "6{}{}{}{}{}{}{}{}{}{}",
        e.transaction_code,
        alpha(&e.rdfi_identification, 8),
        alpha(&e.check_digit, 1),
        alpha(&e.dfi_account_number, 17),
        numeric(e.amount, 10),
        alpha(&e.identification_number, 15),
        alpha(&e.individual_name, 22),
        alpha(&e.discretionary_data, 2),
        if e.has_addenda() { '1' } else { '0' },
        alpha(&e.trace_number, 15),
    )
}

fn addenda05(a: &Addenda05) -> String {
    format!(
        "705{}{}{}",
        alpha(&a.payment_related_information, 80),
        numeric(a.sequence_number as u64, 4),
        numeric(a.entry_detail_sequence_number as u64, 7),
    )
}

fn addenda98(a: &Addenda98) -> String {
    format!(
        "798{}{}{}{}{}{}{}",
        alpha(&a.change_code, 3),
        alpha(&a.original_trace, 15),
        " ".repeat(6),
        alpha(&a.original_dfi, 8),
        alpha(&a.corrected_data, 29),
        " ".repeat(15),
        alpha(&a.trace_number, 15),
    )
}

fn addenda99(a: &Addenda99) -> String {
    format!(
        "799{}{}{}{}{}{}",
        alpha(&a.return_code, 3),
        alpha(&a.original_trace, 15),
        a.date_of_death
            .map(|d| d.format("%y%m%d").to_string())
            .unwrap_or_else(|| " ".repeat(6)),
        alpha(&a.original_dfi, 8),
        alpha(&a.addenda_information, 44),
        alpha(&a.trace_number, 15),
    )
}

/// Left-justified, space padded, truncated to `width`.
fn alpha(s: &str, width: usize) -> String {
    let mut out: String = s.chars().filter(|c| c.is_ascii()).take(width).collect();
    while out.len() < width {
        out.push(' ');
    }
    out
}

/// Right-justified, space padded.
fn right(s: &str, width: usize) -> String {
    let trimmed: String = s.chars().filter(|c| c.is_ascii()).take(width).collect();
    format!("{:>width$}", trimmed, width = width)
}

/// Zero padded; values wider than the field keep their low-order digits.
fn numeric(n: u64, width: usize) -> String {
    let s = format!("{:0width$}", n, width = width);
    s[s.len() - width..].to_string()
}
