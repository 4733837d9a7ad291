//! Exchange documents: the hand-off format produced by export and consumed
//! by import.
//!
//! Two layouts exist. The grouped layout separates ordinary rules from
//! tuning-logic rules:
//!
//! ```json
//! { "BL_rules": [...], "TL_rules": [...], "exported_at": "...", "exported": true }
//! ```
//!
//! The flat layout holds one array:
//!
//! ```json
//! { "rules": [...], "exported_at": "..." }
//! ```
//!
//! Import accepts either, in both schema generations of the records.

use std::{fs, io, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    domain::{IdScheme, Rule, RuleKind},
    storage::{
        record::{CurrentRecord, Decoded, RecordFailure, decode_rules},
        rule_file::write_json_atomic,
    },
};

/// Shape of exported documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportLayout {
    /// Separate `BL_rules` and `TL_rules` arrays.
    #[default]
    Grouped,
    /// A single `rules` array.
    Flat,
}

/// An exported rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportDocument {
    /// See [`ExportLayout::Grouped`].
    Grouped {
        /// Ordinary rules.
        #[serde(rename = "BL_rules")]
        bl_rules: Vec<CurrentRecord>,
        /// Tuning-logic rules.
        #[serde(rename = "TL_rules")]
        tl_rules: Vec<CurrentRecord>,
        /// When the export was taken.
        exported_at: DateTime<Utc>,
        /// Always `true`.
        exported: bool,
    },
    /// See [`ExportLayout::Flat`].
    Flat {
        /// Every rule.
        rules: Vec<CurrentRecord>,
        /// When the export was taken.
        exported_at: DateTime<Utc>,
    },
}

impl ExportDocument {
    /// Builds a document from `rules`, padding IDs to `digits`.
    pub fn build<'a>(
        rules: impl IntoIterator<Item = &'a Rule>,
        layout: ExportLayout,
        digits: usize,
    ) -> Self {
        let exported_at = Utc::now();
        match layout {
            ExportLayout::Flat => Self::Flat {
                rules: rules
                    .into_iter()
                    .map(|rule| CurrentRecord::from_rule(rule, digits))
                    .collect(),
                exported_at,
            },
            ExportLayout::Grouped => {
                let (tl, bl): (Vec<&Rule>, Vec<&Rule>) =
                    rules.into_iter().partition(|rule| is_tuning_logic(rule));
                let records = |rules: Vec<&Rule>| {
                    rules
                        .into_iter()
                        .map(|rule| CurrentRecord::from_rule(rule, digits))
                        .collect()
                };
                Self::Grouped {
                    bl_rules: records(bl),
                    tl_rules: records(tl),
                    exported_at,
                    exported: true,
                }
            }
        }
    }

    /// Number of rules in the document.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Grouped {
                bl_rules, tl_rules, ..
            } => bl_rules.len() + tl_rules.len(),
            Self::Flat { rules, .. } => rules.len(),
        }
    }

    /// Whether the document holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the document to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        write_json_atomic(path, self)
    }
}

fn is_tuning_logic(rule: &Rule) -> bool {
    rule.is_tuning() || rule.kind() == RuleKind::Dynamic
}

/// Errors that abort a whole import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The document could not be read.
    #[error("failed to read import document: {0}")]
    Io(#[from] io::Error),
    /// The document is not valid JSON.
    #[error("import document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The document has none of the rule arrays.
    #[error("import document has no 'rules', 'BL_rules' or 'TL_rules' array")]
    NoRules,
}

/// The outcome of a best-effort import.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Number of rules recovered.
    pub imported: usize,
    /// Records that were skipped.
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    rules: Option<Vec<Value>>,
    #[serde(default, rename = "BL_rules", alias = "bl_rules")]
    bl_rules: Option<Vec<Value>>,
    #[serde(default, rename = "TL_rules", alias = "tl_rules")]
    tl_rules: Option<Vec<Value>>,
}

/// Decodes an exchange document from JSON text.
///
/// Records are decoded best-effort: a malformed record is skipped and
/// reported, the rest are kept.
///
/// # Errors
///
/// Returns an error if the text is not a JSON object or carries none of the
/// rule arrays.
#[instrument(level = "debug", skip_all)]
pub fn decode_document(text: &str, scheme: IdScheme) -> Result<Decoded, ImportError> {
    let incoming: Incoming = serde_json::from_str(text)?;
    let records: Vec<Value> = match incoming {
        Incoming {
            rules: None,
            bl_rules: None,
            tl_rules: None,
        } => return Err(ImportError::NoRules),
        Incoming {
            rules,
            bl_rules,
            tl_rules,
        } => [rules, bl_rules, tl_rules]
            .into_iter()
            .flatten()
            .flatten()
            .collect(),
    };
    debug!("Decoding {} records", records.len());
    Ok(decode_rules(&records, scheme))
}

/// Reads and decodes the exchange document at `path`.
///
/// # Errors
///
/// See [`decode_document`]; also fails if the file cannot be read.
pub fn read_document(path: &Path, scheme: IdScheme) -> Result<Decoded, ImportError> {
    let text = fs::read_to_string(path)?;
    decode_document(&text, scheme)
}
