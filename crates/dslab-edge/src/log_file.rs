//! Binary metrics log files.
//!
//! A log file is a sequence of frames, one per flush. Each frame is a 4-byte big-endian payload length followed by
//! a bincode-encoded list of metrics records.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use indexmap::IndexSet;

use crate::error::{Result, SimError};
use crate::monitoring::Metrics;

const FRAME_HEADER_LEN: usize = 4;

/// Writes records as a new frame. Truncates the file first if `truncate` is set, otherwise appends.
pub fn write_frame(path: &Path, records: &[Metrics], truncate: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    let mut writer = BufWriter::new(options.open(path)?);
    let payload = bincode::serialize(records)?;
    let len = u32::try_from(payload.len()).map_err(|_| SimError::InvalidLog {
        path: path.to_path_buf(),
        reason: format!("frame of {} bytes is too large", payload.len()),
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Decodes all records stored in a log file, in the order they were written.
pub fn read_log<P: AsRef<Path>>(path: P) -> Result<Vec<Metrics>> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let mut records = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes.len() - pos < FRAME_HEADER_LEN {
            return Err(SimError::InvalidLog {
                path: path.to_path_buf(),
                reason: format!("truncated frame header at offset {}", pos),
            });
        }
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&bytes[pos..pos + FRAME_HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        pos += FRAME_HEADER_LEN;
        if bytes.len() - pos < len {
            return Err(SimError::InvalidLog {
                path: path.to_path_buf(),
                reason: format!("truncated frame payload at offset {}", pos),
            });
        }
        let frame: Vec<Metrics> = bincode::deserialize(&bytes[pos..pos + len])?;
        records.extend(frame);
        pos += len;
    }
    Ok(records)
}

/// Writes records to CSV file, one row per record.
///
/// Columns are the union of record keys in order of first appearance, missing values are left empty.
pub fn export_csv<P: AsRef<Path>>(records: &[Metrics], path: P) -> Result<()> {
    let mut columns: IndexSet<&str> = IndexSet::new();
    for record in records {
        columns.extend(record.keys().map(|k| k.as_str()));
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(columns.iter())?;
    for record in records {
        wtr.write_record(
            columns
                .iter()
                .map(|column| record.get(*column).map(|v| v.to_string()).unwrap_or_default()),
        )?;
    }
    wtr.flush()?;
    Ok(())
}
