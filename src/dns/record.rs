use crate::schema::SchemaMatch;
use bytes::Bytes;
use chrono::{DateTime, Local};
use serde::Serialize;

use super::QueryEvent;

/// A fully decoded exfiltration record, ready for the sink.
///
/// Exists only when all three smuggled fields validated; `context` plus
/// `line` place the chunk inside one logical stream, but reassembly is the
/// downstream consumer's job.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedRecord {
    /// Source address of the originating query, textual form.
    pub source: String,
    pub is_v6: bool,
    pub received_at: DateTime<Local>,
    /// Session identifier grouping chunks into one stream.
    pub context: String,
    /// Sequence number of this chunk within its context.
    pub line: u64,
    /// Payload chunk, verbatim from the query name.
    #[serde(with = "data_bytes")]
    pub data: Bytes,
}

impl DecodedRecord {
    pub fn new(event: &QueryEvent, fields: SchemaMatch) -> Self {
        Self {
            source: event.source.to_string(),
            is_v6: event.is_v6,
            received_at: event.received_at,
            context: fields.context,
            line: fields.line,
            data: fields.data,
        }
    }

    /// One-line log form emitted per stored record.
    pub fn summary(&self) -> String {
        format!(
            "context={} line={} from={} ({}) {} bytes",
            self.context,
            self.line,
            self.source,
            if self.is_v6 { "v6" } else { "v4" },
            self.data.len(),
        )
    }
}

// The payload alphabet is [A-Za-z0-9_-], so rendering it as a string is
// lossless.
mod data_bytes {
    use bytes::Bytes;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(data))
    }
}
