mod collector;
mod event;
pub mod filter;
mod record;

pub use collector::RecordCollector;
pub use event::QueryEvent;
pub use record::DecodedRecord;
