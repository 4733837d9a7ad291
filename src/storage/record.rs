//! Rule records as they appear in JSON documents.
//!
//! Two schema generations exist. Older documents use `rule_id`,
//! `condition`, `relation` and `action`; current documents use `logic_id`,
//! `selection_expression`, `logic_relation` and `impact_expression`. A
//! record is classified by which keys it carries, then decoded with the
//! matching shape. Only the current shape is ever written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    domain::{
        IdScheme, Prefix, Relation, Rule, RuleId, RuleSet, Status, Tag,
        rule::{Content, Metadata, UnknownRelation, UnknownStatus, structural_kind},
    },
    expression::{Keyword, Token, render, tokenize},
};

const CURRENT_KEYS: [&str; 4] = [
    "logic_id",
    "selection_expression",
    "logic_relation",
    "impact_expression",
];

const LEGACY_KEYS: [&str; 5] = ["rule_id", "condition", "relation", "action", "rule_type"];

/// A record in the current schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRecord {
    /// The rule ID, e.g. `BL01`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_id: Option<String>,
    /// The condition.
    #[serde(default)]
    pub selection_expression: String,
    /// The relation symbol, empty for keyword rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_relation: Option<String>,
    /// The action.
    #[serde(default)]
    pub impact_expression: String,
    /// `enabled`, `testing` or `disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Free-text labels.
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    /// Path to technical documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_doc_path: Option<String>,
    /// The rule description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the rule was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the rule was last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// A record in the original schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyRecord {
    /// The rule ID, e.g. `LS01`.
    #[serde(default)]
    pub rule_id: Option<String>,
    /// The condition.
    #[serde(default)]
    pub condition: String,
    /// The relation symbol.
    #[serde(default)]
    pub relation: Option<String>,
    /// The action.
    #[serde(default)]
    pub action: String,
    /// `enabled`, `testing` or `disabled`.
    #[serde(default)]
    pub status: Option<String>,
    /// Free-text labels.
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    /// `static` or `dynamic`. Informational only; the kind is derived from
    /// the expression.
    #[serde(default)]
    pub rule_type: Option<String>,
    /// The rule description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A record of either schema generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleRecord {
    /// `rule_id`/`condition`/`relation`/`action`.
    Legacy(LegacyRecord),
    /// `logic_id`/`selection_expression`/`logic_relation`/`impact_expression`.
    Current(CurrentRecord),
}

/// Why a single record could not be turned into a rule.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The record is not a JSON object.
    #[error("record is not an object")]
    NotAnObject,
    /// The record has neither schema's keys.
    #[error("record has none of the expected keys")]
    Unrecognised,
    /// A field has the wrong type.
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The status is not recognised.
    #[error(transparent)]
    Status(#[from] UnknownStatus),
    /// The relation symbol is not recognised.
    #[error(transparent)]
    Relation(#[from] UnknownRelation),
    /// An enabled or testing rule has no condition or action.
    #[error("active rule has an empty {0}")]
    MissingExpression(&'static str),
    /// Another record already holds this ID.
    #[error("duplicate rule ID {0}")]
    DuplicateId(RuleId),
}

/// A record that was skipped.
#[derive(Debug)]
pub struct RecordFailure {
    /// Position of the record in its array.
    pub index: usize,
    /// The ID the record claimed, if any.
    pub id: Option<String>,
    /// What was wrong with it.
    pub error: RecordError,
}

impl RuleRecord {
    /// Classifies and decodes a record by the keys it carries.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object, carries neither
    /// schema's keys, or has mistyped fields.
    pub fn decode(value: &Value) -> Result<Self, RecordError> {
        let Value::Object(map) = value else {
            return Err(RecordError::NotAnObject);
        };
        if has_any(map, &CURRENT_KEYS) {
            Ok(Self::Current(serde_json::from_value(value.clone())?))
        } else if has_any(map, &LEGACY_KEYS) {
            Ok(Self::Legacy(serde_json::from_value(value.clone())?))
        } else {
            Err(RecordError::Unrecognised)
        }
    }

    /// The ID the record claims, verbatim.
    #[must_use]
    pub fn claimed_id(&self) -> Option<&str> {
        match self {
            Self::Legacy(record) => record.rule_id.as_deref(),
            Self::Current(record) => record.logic_id.as_deref(),
        }
    }

    /// Upgrades the record to the current schema.
    #[must_use]
    pub fn into_current(self) -> CurrentRecord {
        match self {
            Self::Legacy(record) => record.into(),
            Self::Current(record) => record,
        }
    }
}

impl From<LegacyRecord> for CurrentRecord {
    fn from(record: LegacyRecord) -> Self {
        Self {
            logic_id: record.rule_id,
            selection_expression: record.condition,
            logic_relation: record.relation,
            impact_expression: record.action,
            status: record.status,
            tags: record.tags,
            tech_doc_path: None,
            comment: record.description,
            created_at: None,
            modified_at: None,
        }
    }
}

impl CurrentRecord {
    fn into_parts(self) -> Result<Parts, RecordError> {
        let Self {
            selection_expression: condition,
            logic_relation: relation,
            impact_expression: action,
            status,
            tags,
            tech_doc_path,
            comment: description,
            created_at: created,
            modified_at: modified,
            ..
        } = self;

        let status = status
            .as_deref()
            .map(str::parse::<Status>)
            .transpose()?
            .unwrap_or_default();
        let relation = relation
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<Relation>)
            .transpose()?;
        let (condition, action) = match relation {
            None if action.trim().is_empty() => split_keyword_rule(&condition),
            _ => (condition.trim().to_string(), action.trim().to_string()),
        };

        if status.is_active() {
            if condition.is_empty() {
                return Err(RecordError::MissingExpression("condition"));
            }
            if action.is_empty() {
                return Err(RecordError::MissingExpression("action"));
            }
        }

        let now = Utc::now();
        let created = created.unwrap_or(now);
        Ok(Parts {
            content: Content {
                condition,
                relation,
                action,
                tags: tags.iter().filter_map(|t| Tag::new(t).ok()).collect(),
            },
            metadata: Metadata {
                status,
                description: description.filter(|d| !d.trim().is_empty()),
                tech_doc_path: tech_doc_path.filter(|p| !p.trim().is_empty()),
                created,
                modified: modified.unwrap_or(created),
            },
        })
    }

    /// The record written for `rule`, with IDs padded to `digits`.
    #[must_use]
    pub fn from_rule(rule: &Rule, digits: usize) -> Self {
        Self {
            logic_id: Some(rule.id().display(digits).to_string()),
            selection_expression: rule.condition().to_string(),
            logic_relation: rule.relation().map(|r| r.symbol().to_string()),
            impact_expression: rule.action().to_string(),
            status: Some(rule.status().as_str().to_string()),
            tags: rule.tags().iter().map(ToString::to_string).collect(),
            tech_doc_path: rule.tech_doc_path().map(str::to_string),
            comment: rule.description().map(str::to_string),
            created_at: Some(rule.created()),
            modified_at: Some(rule.modified()),
        }
    }
}

struct Parts {
    content: Content,
    metadata: Metadata,
}

/// Rules recovered from a list of records, and the records that were
/// skipped.
#[derive(Debug, Default)]
pub struct Decoded {
    /// The recovered rules.
    pub rules: RuleSet,
    /// Records that could not be recovered.
    pub failures: Vec<RecordFailure>,
}

/// Turns a list of records into rules.
///
/// Records whose ID is missing, malformed, or carries a prefix that does not
/// match the rule's shape get a fresh ID under `scheme`, after every valid
/// ID has been claimed. A record claiming an ID already taken is skipped.
pub fn decode_rules(values: &[Value], scheme: IdScheme) -> Decoded {
    let mut decoded = Decoded::default();
    let mut unassigned = Vec::new();

    for (index, value) in values.iter().enumerate() {
        let record = match RuleRecord::decode(value) {
            Ok(record) => record,
            Err(error) => {
                decoded.failures.push(failure(index, claimed(value), error));
                continue;
            }
        };
        let claimed_id = record.claimed_id().map(str::to_string);
        let parts = match record.into_current().into_parts() {
            Ok(parts) => parts,
            Err(error) => {
                decoded.failures.push(failure(index, claimed_id, error));
                continue;
            }
        };
        let kind = structural_kind(parts.content.relation, &parts.content.action);

        match claimed_id.as_deref().map(str::parse::<RuleId>) {
            Some(Ok(id)) if id.kind() == kind => {
                if decoded.rules.contains(id) {
                    decoded
                        .failures
                        .push(failure(index, claimed_id, RecordError::DuplicateId(id)));
                } else {
                    decoded.rules.insert(parts.into_rule(id));
                }
            }
            Some(Ok(id)) => {
                warn!(%id, %kind, "rule ID prefix does not match the rule, assigning a new ID");
                unassigned.push(parts);
            }
            Some(Err(error)) => {
                warn!(%error, "malformed rule ID, assigning a new ID");
                unassigned.push(parts);
            }
            None => unassigned.push(parts),
        }
    }

    for parts in unassigned {
        let kind = structural_kind(parts.content.relation, &parts.content.action);
        let id = decoded.rules.next_id(Prefix::for_kind(scheme, kind));
        decoded.rules.insert(parts.into_rule(id));
    }

    for failure in &decoded.failures {
        warn!(
            index = failure.index,
            id = failure.id.as_deref().unwrap_or("-"),
            error = %failure.error,
            "skipping rule record"
        );
    }
    decoded
}

impl Parts {
    fn into_rule(self, id: RuleId) -> Rule {
        Rule {
            id,
            content: self.content,
            metadata: self.metadata,
        }
    }
}

const fn failure(index: usize, id: Option<String>, error: RecordError) -> RecordFailure {
    RecordFailure { index, id, error }
}

fn claimed(value: &Value) -> Option<String> {
    ["logic_id", "rule_id"]
        .iter()
        .find_map(|key| value.get(key)?.as_str())
        .map(str::to_string)
}

fn has_any(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|key| map.contains_key(*key))
}

/// Splits `if … display [..]` held in one field into condition and action.
fn split_keyword_rule(text: &str) -> (String, String) {
    let Ok(tokens) = tokenize(text) else {
        return (text.trim().to_string(), String::new());
    };
    let at = tokens
        .iter()
        .skip(1)
        .position(|t| matches!(t, Token::Keyword(k) if k.is_action()))
        .map_or(tokens.len(), |at| at + 1);
    let is_keyword_rule = matches!(tokens.first(), Some(Token::Keyword(Keyword::If | Keyword::Before)));
    if is_keyword_rule {
        (render(&tokens[..at]), render(&tokens[at..]))
    } else {
        (text.trim().to_string(), String::new())
    }
}

fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Option::<Tags>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Tags::Joined(joined)) => Tag::parse_list(&joined).map(|t| t.to_string()).collect(),
        Some(Tags::List(list)) => list,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::RuleKind;

    #[test]
    fn decodes_legacy_record() {
        let value = json!({
            "rule_id": "LS03",
            "condition": "K1 AND K2",
            "relation": "→",
            "action": "1139101",
            "status": "Testing",
            "tags": "seat, airbag",
            "rule_type": "static"
        });

        let decoded = decode_rules(&[value], IdScheme::Legacy);

        assert!(decoded.failures.is_empty());
        let rule = decoded.rules.get("LS03".parse().unwrap()).unwrap();
        assert_eq!(rule.condition(), "K1 AND K2");
        assert_eq!(rule.relation(), Some(Relation::Implies));
        assert_eq!(rule.status(), Status::Testing);
        assert_eq!(rule.tags().len(), 2);
    }

    #[test]
    fn decodes_current_record() {
        let value = json!({
            "logic_id": "TL02",
            "selection_expression": "K1",
            "logic_relation": "→",
            "impact_expression": "ON 2 ADD 1",
            "status": "enabled",
            "tags": ["tuning"],
            "tech_doc_path": "docs/tl02.pdf",
            "comment": "extra seat"
        });

        let decoded = decode_rules(&[value], IdScheme::Logic);

        let rule = decoded.rules.get("TL02".parse().unwrap()).unwrap();
        assert_eq!(rule.kind(), RuleKind::Dynamic);
        assert_eq!(rule.description(), Some("extra seat"));
        assert_eq!(rule.tech_doc_path(), Some("docs/tl02.pdf"));
    }

    #[test]
    fn keyword_rule_in_one_field_is_split() {
        let value = json!({
            "logic_id": "TL01",
            "selection_expression": "if K1 display [K2, K3]",
            "impact_expression": ""
        });

        let decoded = decode_rules(&[value], IdScheme::Logic);

        let rule = decoded.rules.get("TL01".parse().unwrap()).unwrap();
        assert_eq!(rule.condition(), "if K1");
        assert_eq!(rule.action(), "display [K2, K3]");
        assert_eq!(rule.relation(), None);
    }

    #[test]
    fn reassigns_missing_and_mismatched_ids() {
        let values = [
            json!({"selection_expression": "K1", "logic_relation": "→", "impact_expression": "1139101"}),
            json!({"logic_id": "TL05", "selection_expression": "K2", "logic_relation": "→", "impact_expression": "1139101"}),
            json!({"logic_id": "BL01", "selection_expression": "K3", "logic_relation": "→", "impact_expression": "1139101"}),
        ];

        let decoded = decode_rules(&values, IdScheme::Logic);

        assert!(decoded.failures.is_empty());
        let ids: Vec<_> = decoded.rules.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["BL01", "BL02", "BL03"]);
        let explicit = decoded.rules.get("BL01".parse().unwrap()).unwrap();
        assert_eq!(explicit.condition(), "K3");
    }

    #[test]
    fn skips_bad_records_and_keeps_the_rest() {
        let values = [
            json!({"logic_id": "BL01", "selection_expression": "K1", "logic_relation": "→", "impact_expression": "1139101"}),
            json!({"logic_id": "BL01", "selection_expression": "K2", "logic_relation": "→", "impact_expression": "1139101"}),
            json!({"logic_id": "BL02", "selection_expression": "K3", "logic_relation": "→", "impact_expression": "1139101", "status": "archived"}),
            json!({"logic_id": "BL03", "selection_expression": "", "logic_relation": "→", "impact_expression": "1139101"}),
            json!({"unrelated": true}),
            json!("not an object"),
        ];

        let decoded = decode_rules(&values, IdScheme::Logic);

        assert_eq!(decoded.rules.len(), 1);
        let errors: Vec<_> = decoded.failures.iter().map(|f| &f.error).collect();
        assert!(matches!(errors[0], RecordError::DuplicateId(_)));
        assert!(matches!(errors[1], RecordError::Status(_)));
        assert!(matches!(errors[2], RecordError::MissingExpression("condition")));
        assert!(matches!(errors[3], RecordError::Unrecognised));
        assert!(matches!(errors[4], RecordError::NotAnObject));
    }

    #[test]
    fn disabled_rule_may_be_empty() {
        let value = json!({"logic_id": "BL01", "selection_expression": "", "logic_relation": "→", "impact_expression": "", "status": "disabled"});
        let decoded = decode_rules(&[value], IdScheme::Logic);
        assert_eq!(decoded.rules.len(), 1);
    }
}
