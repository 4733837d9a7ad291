use std::{collections::BTreeSet, fmt, str::FromStr};

use borsh::BorshSerialize;
use chrono::{DateTime, Utc};
use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{domain::RuleId, expression::tuning};

/// The two families of rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// A boolean combination of options implying options or BOM codes.
    Static,
    /// A keyword rule (`if`/`before` … `display`/`disable`/`choose`/`info`),
    /// or a relation whose right side is a tuning action.
    Dynamic,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        })
    }
}

/// Whether a rule takes part in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The rule is active.
    #[default]
    Enabled,
    /// The rule is active for trial configurations only.
    Testing,
    /// The rule is kept but has no effect.
    Disabled,
}

impl Status {
    /// The lowercase name used in files and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Testing => "testing",
            Self::Disabled => "disabled",
        }
    }

    /// Whether rules with this status must carry an executable expression.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Enabled | Self::Testing)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for a status name that is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rule status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(Self::Enabled),
            "testing" => Ok(Self::Testing),
            "disabled" => Ok(Self::Disabled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// The symbol joining the two sides of a static rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `→`, implication.
    Implies,
    /// `:`, assignment.
    Colon,
}

impl Relation {
    /// The symbol as written in expressions.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Implies => "→",
            Self::Colon => ":",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Error returned for a relation symbol that is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relation symbol '{0}'")]
pub struct UnknownRelation(pub String);

impl FromStr for Relation {
    type Err = UnknownRelation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "→" | "->" => Ok(Self::Implies),
            ":" => Ok(Self::Colon),
            other => Err(UnknownRelation(other.to_string())),
        }
    }
}

/// A free-text label attached to a rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(NonEmptyString);

/// Error returned when a tag is blank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tags must not be blank")]
pub struct BlankTag;

impl Tag {
    /// Creates a tag, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`BlankTag`] if nothing is left after trimming.
    pub fn new(s: &str) -> Result<Self, BlankTag> {
        NonEmptyString::new(s.trim().to_string())
            .map(Self)
            .map_err(|_| BlankTag)
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Splits a comma-separated tag string, dropping blank entries.
    pub fn parse_list(s: &str) -> impl Iterator<Item = Self> + '_ {
        s.split(',').filter_map(|part| Self::new(part).ok())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conditional configuration rule.
///
/// Rules are created and changed only through the
/// [`Repository`](crate::Repository), which validates the expression first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub(crate) id: RuleId,
    /// The executable part of the rule; contributes to the fingerprint.
    pub(crate) content: Content,
    pub(crate) metadata: Metadata,
}

/// The semantically important content of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Content {
    pub(crate) condition: String,
    pub(crate) relation: Option<Relation>,
    pub(crate) action: String,
    pub(crate) tags: BTreeSet<Tag>,
}

/// Annotations and lifecycle data. Does not contribute to the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Metadata {
    pub(crate) status: Status,
    pub(crate) description: Option<String>,
    pub(crate) tech_doc_path: Option<String>,
    pub(crate) created: DateTime<Utc>,
    pub(crate) modified: DateTime<Utc>,
}

impl Content {
    /// Calculate the fingerprint of this content.
    ///
    /// The fingerprint is a SHA256 hash of the Borsh-serialized condition,
    /// relation, action and tags.
    ///
    /// # Panics
    ///
    /// Panics if borsh serialization fails (which should never happen for this
    /// data structure).
    fn fingerprint(&self) -> String {
        #[derive(BorshSerialize)]
        struct FingerprintData<'a> {
            condition: &'a str,
            relation: &'a str,
            action: &'a str,
            tags: Vec<&'a str>,
        }

        let data = FingerprintData {
            condition: &self.condition,
            relation: self.relation.map_or("", Relation::symbol),
            action: &self.action,
            tags: self.tags.iter().map(Tag::as_str).collect(),
        };

        let encoded = borsh::to_vec(&data).expect("this should never fail");
        let hash = Sha256::digest(encoded);
        format!("{hash:x}")
    }
}

impl Rule {
    pub(crate) fn new(
        id: RuleId,
        condition: String,
        relation: Option<Relation>,
        action: String,
        status: Status,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            content: Content {
                condition,
                relation,
                action,
                tags: BTreeSet::new(),
            },
            metadata: Metadata {
                status,
                description: None,
                tech_doc_path: None,
                created: now,
                modified: now,
            },
        }
    }

    /// The rule's identifier.
    #[must_use]
    pub const fn id(&self) -> RuleId {
        self.id
    }

    /// The rule kind, derived from the ID prefix.
    #[must_use]
    pub const fn kind(&self) -> RuleKind {
        self.id.kind()
    }

    /// The left-hand expression.
    ///
    /// For dynamic keyword rules this holds the whole `if …`/`before …`
    /// expression.
    #[must_use]
    pub fn condition(&self) -> &str {
        &self.content.condition
    }

    /// The relation symbol, absent for dynamic keyword rules.
    #[must_use]
    pub const fn relation(&self) -> Option<Relation> {
        self.content.relation
    }

    /// The right-hand expression.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.content.action
    }

    /// Whether the action is a tuning micro-operation.
    #[must_use]
    pub fn is_tuning(&self) -> bool {
        tuning::is_tuning_action(&self.content.action)
    }

    /// The whole rule as one line of text.
    #[must_use]
    pub fn expression(&self) -> String {
        join_expression(
            &self.content.condition,
            self.content.relation,
            &self.content.action,
        )
    }

    /// The rule's tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<Tag> {
        &self.content.tags
    }

    /// The rule's status.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.metadata.status
    }

    /// The human annotation shown under the rule, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.metadata.description.as_deref()
    }

    /// Path to technical documentation for the rule, if any.
    #[must_use]
    pub fn tech_doc_path(&self) -> Option<&str> {
        self.metadata.tech_doc_path.as_deref()
    }

    /// When the rule was created.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.metadata.created
    }

    /// When the rule was last changed.
    #[must_use]
    pub const fn modified(&self) -> DateTime<Utc> {
        self.metadata.modified
    }

    /// A hash of the executable content and tags.
    ///
    /// Any change to the expression or tags changes the fingerprint;
    /// status, description and timestamps do not.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.content.fingerprint()
    }

    /// The kind the rule's structure implies, independent of its ID.
    ///
    /// A relation followed by a tuning action, or no relation at all, is
    /// dynamic; any other relation is static.
    #[must_use]
    pub fn structural_kind(&self) -> RuleKind {
        structural_kind(self.content.relation, &self.content.action)
    }

    pub(crate) fn touch(&mut self) {
        self.metadata.modified = Utc::now();
    }
}

/// The rule kind implied by a relation and action.
#[must_use]
pub fn structural_kind(relation: Option<Relation>, action: &str) -> RuleKind {
    match relation {
        Some(_) if !tuning::is_tuning_action(action) => RuleKind::Static,
        _ => RuleKind::Dynamic,
    }
}

/// Join the parts of a rule into one line of text.
#[must_use]
pub fn join_expression(condition: &str, relation: Option<Relation>, action: &str) -> String {
    match relation {
        Some(relation) => format!("{condition} {relation} {action}"),
        None if action.is_empty() => condition.to_string(),
        None => format!("{condition} {action}"),
    }
}
