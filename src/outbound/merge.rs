use crate::nacha::{Batch, File, FileHeader, NachaError, MAX_FILE_RECORDS};

const FILE_ID_MODIFIERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Consolidates staged files into as few files as the record limit allows.
///
/// Entries of batches with matching headers share one batch; batches are
/// renumbered and control totals follow from the entries. `header` is used
/// for every output file, with the file ID modifier advanced per file.
pub fn merge_files(header: FileHeader, files: Vec<File>) -> Result<Vec<File>, NachaError> {
    let mut batches: Vec<Batch> = Vec::new();
    for batch in files.into_iter().flat_map(|f| f.batches) {
        match batches
            .iter_mut()
            .find(|b| b.header.mergeable_with(&batch.header))
        {
            Some(existing) => existing.entries.extend(batch.entries),
            None => batches.push(batch),
        }
    }
    for batch in &mut batches {
        batch.refresh_service_class();
    }

    let pieces: Vec<Batch> = batches
        .into_iter()
        .flat_map(|b| split_batch(b, MAX_FILE_RECORDS - 2))
        .collect();

    let mut out: Vec<File> = Vec::new();
    let mut current = File::new(header.clone());
    for batch in pieces {
        if !current.batches.is_empty()
            && current.record_count() + batch.record_count() > MAX_FILE_RECORDS
        {
            out.push(current);
            current = File::new(header.clone());
        }
        current.add_batch(batch);
    }
    if !current.batches.is_empty() {
        out.push(current);
    }

    for (i, file) in out.iter_mut().enumerate() {
        if let Some(h) = file.header.as_mut() {
            h.file_id_modifier = FILE_ID_MODIFIERS[i % FILE_ID_MODIFIERS.len()] as char;
        }
        file.validate()?;
    }
    Ok(out)
}

/// Splits a batch so no piece exceeds `max_records` including its header
/// and control records.
fn split_batch(batch: Batch, max_records: usize) -> Vec<Batch> {
    if batch.record_count() <= max_records {
        return vec![batch];
    }

    let mut pieces = Vec::new();
    let mut current = Batch::new(batch.header.clone());
    for entry in batch.entries {
        let size = 1 + entry.addenda_count();
        if !current.entries.is_empty() && current.record_count() + size > max_records {
            current.refresh_service_class();
            pieces.push(current);
            current = Batch::new(batch.header.clone());
        }
        current.entries.push(entry);
    }
    if !current.entries.is_empty() {
        current.refresh_service_class();
        pieces.push(current);
    }
    pieces
}
