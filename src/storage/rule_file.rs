//! The persisted rule file.
//!
//! The file is one JSON document holding every live rule, replaced as a
//! whole on each save:
//!
//! ```json
//! {
//!   "rules": [ { "logic_id": "BL01", "selection_expression": "K1", ... } ],
//!   "saved_at": "2024-05-01T09:30:00Z",
//!   "exported": false,
//!   "timestamp": "20240501_093000"
//! }
//! ```
//!
//! Writes go to a sibling temporary file which is flushed to disk and then
//! renamed over the target, so a crash never leaves a torn file behind.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    domain::{IdScheme, RuleSet},
    storage::record::{CurrentRecord, Decoded, RecordFailure, decode_rules},
};

/// Format of the compact `timestamp` field.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// The rule file as read back from disk.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// The recovered rules.
    pub rules: RuleSet,
    /// When the file was last written, if known.
    pub saved_at: Option<DateTime<Utc>>,
    /// Whether the rules were exported before the file was written.
    pub exported: bool,
    /// Records that could not be recovered.
    pub failures: Vec<RecordFailure>,
}

/// Errors raised while reading the rule file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read rule file {path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The file is not a JSON document of the expected shape.
    #[error("failed to parse rule file {path}: {source}")]
    Json {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Stored {
    #[serde(default)]
    rules: Vec<Value>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    exported: bool,
}

#[derive(Debug, Serialize)]
struct Writing {
    rules: Vec<CurrentRecord>,
    saved_at: DateTime<Utc>,
    exported: bool,
    timestamp: String,
}

/// Reads the rule file at `path`.
///
/// A missing file reads as an empty, never-exported snapshot. Malformed
/// records are skipped and reported in [`Snapshot::failures`]; records
/// without a usable ID are numbered under `scheme`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or is not a JSON
/// object.
#[instrument(level = "debug", skip(scheme))]
pub fn load(path: &Path, scheme: IdScheme) -> Result<Snapshot, LoadError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("No rule file at {}, starting empty", path.display());
            return Ok(Snapshot::default());
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let stored: Stored = serde_json::from_str(&content).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Decoded { rules, failures } = decode_rules(&stored.rules, scheme);

    debug!("Loaded {} rules from {}", rules.len(), path.display());
    Ok(Snapshot {
        rules,
        saved_at: stored.saved_at,
        exported: stored.exported,
        failures,
    })
}

/// Replaces the rule file at `path` with `rules`, returning the save time.
///
/// Parent directories are created if needed.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
#[instrument(level = "debug", skip(rules))]
pub fn save(
    path: &Path,
    rules: &RuleSet,
    exported: bool,
    digits: usize,
) -> io::Result<DateTime<Utc>> {
    let now = Utc::now();
    let document = Writing {
        rules: rules
            .iter()
            .map(|rule| CurrentRecord::from_rule(rule, digits))
            .collect(),
        saved_at: now,
        exported,
        timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
    };

    write_json_atomic(path, &document)?;
    debug!("Saved {} rules to {}", rules.len(), path.display());
    Ok(now)
}

/// Serialises `value` as pretty JSON and atomically replaces `path` with it.
///
/// # Errors
///
/// Returns an error if serialisation or any filesystem step fails.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use tempfile::TempDir;

    use super::*;
    use crate::domain::{Prefix, Relation, Rule, RuleId, Status};

    fn rules() -> RuleSet {
        [
            Rule::new(
                RuleId::new(Prefix::BL, NonZeroUsize::MIN),
                "K1 AND K2".to_string(),
                Some(Relation::Implies),
                "1139101".to_string(),
                Status::Enabled,
            ),
            Rule::new(
                RuleId::new(Prefix::TL, NonZeroUsize::MIN),
                "if K1".to_string(),
                None,
                "display [K2]".to_string(),
                Status::Testing,
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let snapshot = load(&tmp.path().join("rules.json"), IdScheme::Logic).unwrap();
        assert!(snapshot.rules.is_empty());
        assert!(!snapshot.exported);
        assert!(snapshot.saved_at.is_none());
    }

    #[test]
    fn save_then_load_keeps_rules_and_flags() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("rules.json");
        let rules = rules();

        let saved_at = save(&path, &rules, true, 2).unwrap();
        let snapshot = load(&path, IdScheme::Logic).unwrap();

        assert_eq!(snapshot.rules.len(), 2);
        assert!(snapshot.exported);
        assert_eq!(snapshot.saved_at, Some(saved_at));
        let keyword = snapshot.rules.get("TL01".parse().unwrap()).unwrap();
        assert_eq!(keyword.action(), "display [K2]");
        assert_eq!(keyword.status(), Status::Testing);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn written_document_has_expected_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.json");

        save(&path, &rules(), false, 3).unwrap();
        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(value["rules"][0]["logic_id"], "BL001");
        assert_eq!(value["rules"][0]["logic_relation"], "→");
        assert_eq!(value["exported"], false);
        assert_eq!(value["timestamp"].as_str().unwrap().len(), 15);
        assert!(value["saved_at"].is_string());
    }

    #[test]
    fn unreadable_document_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rules.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            load(&path, IdScheme::Logic),
            Err(LoadError::Json { .. })
        ));
    }
}
