use bytes::Bytes;
use chrono::{DateTime, Local};
use std::net::IpAddr;

/// One captured, unanswered DNS query, as handed from the capture task to
/// the decode task. Transient: either it decodes into a record or it is
/// dropped, never persisted itself.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    /// Query name as dotted labels with a trailing root dot,
    /// e.g. `b"chunk.3.<32 hex>.example.com."`.
    pub qname: Bytes,
    /// Source address of the query packet.
    pub source: IpAddr,
    /// Address family the query was observed over.
    pub is_v6: bool,
    /// When the packet was observed.
    pub received_at: DateTime<Local>,
}
