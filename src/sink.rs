use anyhow::{Context, Result};
use log::info;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::dns::DecodedRecord;

/// Persistence seam for decoded records.
///
/// The schema and storage engine behind it are not this crate's concern;
/// implementations must tolerate concurrent, unordered writes when several
/// capture instances share one sink.
pub trait RecordSink: Send + Sync + 'static {
    /// Durably store one record. Called once per record, fire-and-forget:
    /// the caller logs an error and moves on.
    fn persist(&self, record: &DecodedRecord) -> Result<()>;
}

/// Append-only sink writing one JSON object per record.
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open sink file {}", path.display()))?;
        info!("Writing decoded records to {}", path.display());
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl RecordSink for JsonLinesSink {
    fn persist(&self, record: &DecodedRecord) -> Result<()> {
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        // Records are rare relative to traffic; flush per record so a
        // crash loses nothing.
        writer.flush()?;
        Ok(())
    }
}
