use anyhow::Result;
use log::{info, warn};
use tokio::sync::mpsc;

use crate::dns::{DecodedRecord, QueryEvent};
use crate::schema::Matcher;
use crate::sink::RecordSink;

/// Drives the decode side of the pipeline: drains the capture channel on a
/// single task, applies the matcher to each query and forwards decoded
/// records to the sink.
///
/// Staying single-task is what keeps `line` and `received_at` ordering
/// faithful to observation order; there is no parallel fan-out to undo.
pub struct RecordCollector<S> {
    matcher: Matcher,
    rx: mpsc::Receiver<QueryEvent>,
    sink: S,
}

impl<S: RecordSink> RecordCollector<S> {
    pub fn new(matcher: Matcher, rx: mpsc::Receiver<QueryEvent>, sink: S) -> Self {
        Self { matcher, rx, sink }
    }

    /// Runs until the capture side closes the channel.
    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.rx.recv().await {
            let Some(fields) = self.matcher.decode(&event.qname) else {
                // Ordinary traffic on the interface, the common case.
                continue;
            };
            let record = DecodedRecord::new(&event, fields);
            info!("decoded record: {}", record.summary());
            // Fire and forget: a sink failure never stalls the capture
            // pipeline, and a rejected record is never re-presented.
            if let Err(e) = self.sink.persist(&record) {
                warn!("failed to persist record: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Local;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemorySink {
        records: Arc<Mutex<Vec<DecodedRecord>>>,
    }

    impl RecordSink for MemorySink {
        fn persist(&self, record: &DecodedRecord) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn event(qname: &str, source: IpAddr) -> QueryEvent {
        QueryEvent {
            qname: Bytes::copy_from_slice(qname.as_bytes()),
            source,
            is_v6: source.is_ipv6(),
            received_at: Local::now(),
        }
    }

    const CTX: &str = "0123456789abcdef0123456789abcdef";

    #[tokio::test]
    async fn decodes_and_persists_in_observation_order() {
        let (tx, rx) = mpsc::channel(16);
        let sink = MemorySink::default();
        let collector = RecordCollector::new(Matcher::new(b"example.com"), rx, sink.clone());

        let src = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        for line in 0..5u64 {
            tx.send(event(&format!("AbC123.{line}.{CTX}.example.com."), src))
                .await
                .unwrap();
        }
        drop(tx);
        collector.run().await.unwrap();

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.line, i as u64);
            assert_eq!(record.context, CTX);
            assert_eq!(&record.data[..], b"AbC123");
            assert_eq!(record.source, "10.0.0.5");
            assert!(!record.is_v6);
        }
    }

    #[tokio::test]
    async fn unmatched_queries_persist_nothing() {
        let (tx, rx) = mpsc::channel(16);
        let sink = MemorySink::default();
        let collector = RecordCollector::new(Matcher::new(b"example.com"), rx, sink.clone());

        let src = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        tx.send(event("www.google.com.", src)).await.unwrap();
        tx.send(event(&format!("!!!.42.{CTX}.example.com."), src))
            .await
            .unwrap();
        tx.send(event(&format!("AbC.nan.{CTX}.example.com."), src))
            .await
            .unwrap();
        drop(tx);
        collector.run().await.unwrap();

        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn v6_source_is_flagged() {
        let (tx, rx) = mpsc::channel(4);
        let sink = MemorySink::default();
        let collector = RecordCollector::new(Matcher::new(b"example.com"), rx, sink.clone());

        let src = IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1));
        tx.send(event(&format!("chunk.1.{CTX}.example.com."), src))
            .await
            .unwrap();
        drop(tx);
        collector.run().await.unwrap();

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_v6);
        assert_eq!(records[0].source, "2001:db8::1");
    }
}
