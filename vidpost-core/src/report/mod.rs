//! Job results and where they end up.

mod aggregator;
mod ledger;
mod result;
mod sink;
mod summary;

pub use aggregator::ResultAggregator;
pub use ledger::{configure_connection, LedgerEntry, SqliteResultLedger};
pub use result::{JobResult, JobStatus};
pub use sink::{FileResultSink, MemorySink, ResultSink, SinkError};
pub use summary::RunSummary;
