//! Attribute ingestion engine.
//!
//! Maps retailer product documents onto the normalized entity graph with
//! write-if-changed updates, and reports vocabulary drift without failing.

pub mod aggregator;
pub mod batch;
pub mod components;
pub mod drift;
pub mod error;
pub mod importer;
pub mod mapper;
pub mod memory;
pub mod nested;
pub mod observe;
pub mod updater;

pub use aggregator::{aggregate, TreeOutcome};
pub use batch::{import_batch, BatchItem, BatchReport, BatchTotals};
pub use drift::{check_categories, check_category, DriftEvent, ROOT_SCOPE};
pub use error::{IngestError, IngestIssue};
pub use importer::{ImportOutcome, ImportSummary, Importer};
pub use mapper::{map_group, GroupOutcome};
pub use memory::{MemoryStore, MemoryTx};
pub use observe::{ChannelObserver, IngestEvent, Observer, RecordingObserver, TracingObserver};
pub use updater::{apply_fields, update, FieldDiff, UpdateOutcome, FALSY_NEVER_OVERWRITES};
