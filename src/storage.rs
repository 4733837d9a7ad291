//! JSON persistence and exchange of rule sets.

pub mod record;
pub use record::{
    CurrentRecord, Decoded, LegacyRecord, RecordError, RecordFailure, RuleRecord, decode_rules,
};

pub mod rule_file;
pub use rule_file::{LoadError, Snapshot};

mod exchange;
pub use exchange::{
    ExportDocument, ExportLayout, ImportError, ImportReport, decode_document, read_document,
};

pub mod index;
pub use index::IndexDocument;
