//! The rule repository.
//!
//! [`Repository`] is the single authority over rule identity and mutation.
//! Every change is validated first, applied in memory, written to the rule
//! file, and announced to listeners, in that order. The in-memory set stays
//! authoritative if the write fails: the change is kept, listeners are still
//! notified, and the write error is returned to the caller.

use std::{
    collections::BTreeSet,
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};

use crate::{
    domain::{
        CodeUniverse, Config, Prefix, Relation, Rule, RuleId, RuleKind, RuleSet, Status, Tag,
        rule::structural_kind,
    },
    events::{EventBus, RuleEvent, SubscriptionId},
    expression::{Formatter, Keyword, Profile, Reason, Token, Validator, Violation, render},
    storage::{
        ExportDocument, ImportError, ImportReport, IndexDocument, LoadError, RecordFailure,
        Snapshot, decode_document, read_document, rule_file,
    },
};

/// Errors raised by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The expression was rejected.
    #[error("invalid rule: {0}")]
    Invalid(#[from] Violation),

    /// No rule has this ID.
    #[error("rule {0} not found")]
    NotFound(RuleId),

    /// The new expression would change the rule's kind.
    #[error("rule {id} is {expected}, but the new expression is {found}")]
    KindMismatch {
        /// The rule being edited.
        id: RuleId,
        /// The kind its ID implies.
        expected: RuleKind,
        /// The kind of the new expression.
        found: RuleKind,
    },

    /// The import document could not be read at all.
    #[error(transparent)]
    Import(#[from] ImportError),

    /// The rule file could not be written.
    #[error("failed to write rule file: {0}")]
    Persist(#[source] io::Error),

    /// A document other than the rule file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The document.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

/// Field changes applied by [`Repository::update`]. `None` leaves a field
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleUpdate {
    /// A new expression. Must keep the rule's kind.
    pub expression: Option<String>,
    /// A new status.
    pub status: Option<Status>,
    /// A new tag set.
    pub tags: Option<BTreeSet<Tag>>,
    /// A new description; `Some(None)` removes it.
    pub description: Option<Option<String>>,
    /// A new technical document path; `Some(None)` removes it.
    pub tech_doc_path: Option<Option<String>>,
}

/// Annotations attached to a rule as it is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDetails {
    /// Initial tags.
    pub tags: BTreeSet<Tag>,
    /// A description shown under the rule.
    pub description: Option<String>,
    /// Path to technical documentation.
    pub tech_doc_path: Option<String>,
}

/// The authoritative store of rules.
pub struct Repository {
    path: PathBuf,
    config: Config,
    universe: Option<Box<dyn CodeUniverse>>,
    rules: RuleSet,
    exported: bool,
    saved_at: Option<DateTime<Utc>>,
    events: EventBus,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("rules", &self.rules.len())
            .field("exported", &self.exported)
            .field("has_universe", &self.universe.is_some())
            .finish_non_exhaustive()
    }
}

/// The parts of a validated expression.
struct Parsed {
    condition: String,
    relation: Option<Relation>,
    action: String,
    kind: RuleKind,
}

impl Repository {
    /// Opens the repository persisted at `path`.
    ///
    /// A missing file opens an empty repository. Records in the file that
    /// cannot be recovered are skipped and returned alongside.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    #[instrument(skip(config, universe))]
    pub fn open(
        path: PathBuf,
        config: Config,
        universe: Option<Box<dyn CodeUniverse>>,
    ) -> Result<(Self, Vec<RecordFailure>), LoadError> {
        let Snapshot {
            rules,
            saved_at,
            exported,
            failures,
        } = rule_file::load(&path, config.id_scheme)?;

        let repository = Self {
            path,
            config,
            universe,
            rules,
            exported,
            saved_at,
            events: EventBus::default(),
        };
        Ok((repository, failures))
    }

    /// The rule file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configuration in force.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The code universe, if one was supplied.
    #[must_use]
    pub fn universe(&self) -> Option<&dyn CodeUniverse> {
        self.universe.as_deref()
    }

    /// A validator over this repository's code universe.
    #[must_use]
    pub fn validator(&self) -> Validator<'_> {
        Validator::new(self.universe()).with_expansion(self.config.feature_expansion)
    }

    /// A formatter over this repository's code universe.
    #[must_use]
    pub fn formatter(&self) -> Formatter<'_> {
        Formatter::new(self.universe())
    }

    /// Retrieves a rule by ID.
    #[must_use]
    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id)
    }

    /// All live rules, ordered by ID.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// The live rule set.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Number of live rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the repository holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether the last export has been followed by no further editing.
    #[must_use]
    pub const fn exported(&self) -> bool {
        self.exported
    }

    /// When the rule file was last written.
    #[must_use]
    pub const fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.saved_at
    }

    /// Whether rules from a previous session are waiting to be exported.
    #[must_use]
    pub fn has_unsaved_rules(&self) -> bool {
        !self.exported && !self.rules.is_empty()
    }

    /// Registers a listener for every change.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&RuleEvent) -> anyhow::Result<()> + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Registers a coarse "something changed" listener.
    pub fn on_change<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut() + 'static,
    {
        self.events.on_change(listener)
    }

    /// Registers a listener for newly created rules.
    pub fn on_created<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&Rule) -> anyhow::Result<()> + 'static,
    {
        self.events.on_created(listener)
    }

    /// Removes a listener, returning whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Creates a static rule, or a tuning rule if the action is a tuning
    /// action.
    ///
    /// `condition`, `relation` and `action` are joined before checking, so
    /// the whole rule may be passed as `condition` with the other two left
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is invalid. If the rule file
    /// cannot be written the rule is still created.
    #[instrument(skip(self))]
    pub fn create_static(
        &mut self,
        condition: &str,
        relation: &str,
        action: &str,
        status: Status,
    ) -> Result<Rule, RuleError> {
        let text = [condition, relation, action].join(" ");
        let parsed = self.parse(&text, Profile::StaticRule)?;
        self.insert(parsed, status)
    }

    /// Creates a dynamic keyword rule such as `if K1` / `display [K2]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is invalid. If the rule file
    /// cannot be written the rule is still created.
    #[instrument(skip(self))]
    pub fn create_dynamic(
        &mut self,
        condition: &str,
        action: &str,
        status: Status,
    ) -> Result<Rule, RuleError> {
        let text = [condition, action].join(" ");
        let parsed = self.parse(&text, Profile::DynamicRule)?;
        self.insert(parsed, status)
    }

    /// Creates a rule of whichever kind `expression` describes.
    ///
    /// # Errors
    ///
    /// See [`Repository::create_static`].
    pub fn create(&mut self, expression: &str, status: Status) -> Result<Rule, RuleError> {
        self.create_with(expression, status, RuleDetails::default())
    }

    /// Creates a rule carrying `details` from the start, so listeners see
    /// one `Created` event with the annotations already in place.
    ///
    /// # Errors
    ///
    /// See [`Repository::create_static`].
    #[instrument(skip(self, details))]
    pub fn create_with(
        &mut self,
        expression: &str,
        status: Status,
        details: RuleDetails,
    ) -> Result<Rule, RuleError> {
        let parsed = self.parse(expression, profile_for(expression))?;
        self.insert_with(parsed, status, details)
    }

    /// Applies `update` to the rule `id`, returning the updated rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule does not exist, the new expression is
    /// invalid or of a different kind, or an enabled or testing rule would
    /// be left without an expression. If the rule file cannot be written the
    /// update is still applied.
    #[instrument(skip(self, update))]
    pub fn update(&mut self, id: RuleId, update: RuleUpdate) -> Result<Rule, RuleError> {
        let RuleUpdate {
            expression,
            status,
            tags,
            description,
            tech_doc_path,
        } = update;

        let parsed = expression
            .map(|text| self.parse(&text, profile_for(&text)))
            .transpose()?;
        if let Some(parsed) = &parsed {
            if parsed.kind != id.kind() {
                return Err(RuleError::KindMismatch {
                    id,
                    expected: id.kind(),
                    found: parsed.kind,
                });
            }
        }

        let rule = self.rules.get_mut(id).ok_or(RuleError::NotFound(id))?;
        let activating = status.is_some_and(Status::is_active);
        let empty = parsed.as_ref().map_or_else(
            || rule.condition().is_empty() || rule.action().is_empty(),
            |parsed| parsed.condition.is_empty() || parsed.action.is_empty(),
        );
        if activating && empty {
            return Err(Violation::new(Reason::EmptyExpression).into());
        }

        if let Some(Parsed {
            condition,
            relation,
            action,
            ..
        }) = parsed
        {
            rule.content.condition = condition;
            rule.content.relation = relation;
            rule.content.action = action;
        }
        if let Some(status) = status {
            rule.metadata.status = status;
        }
        if let Some(tags) = tags {
            rule.content.tags = tags;
        }
        if let Some(description) = description {
            rule.metadata.description = description.filter(|d| !d.trim().is_empty());
        }
        if let Some(path) = tech_doc_path {
            rule.metadata.tech_doc_path = path.filter(|p| !p.trim().is_empty());
        }
        rule.touch();
        let rule = rule.clone();

        info!(%id, "Updated rule");
        self.commit(&RuleEvent::Modified(rule.clone()))?;
        Ok(rule)
    }

    /// Sets the status of rule `id`.
    ///
    /// # Errors
    ///
    /// See [`Repository::update`].
    pub fn set_status(&mut self, id: RuleId, status: Status) -> Result<Rule, RuleError> {
        self.update(
            id,
            RuleUpdate {
                status: Some(status),
                ..RuleUpdate::default()
            },
        )
    }

    /// Replaces the tags of rule `id`.
    ///
    /// # Errors
    ///
    /// See [`Repository::update`].
    pub fn set_tags(
        &mut self,
        id: RuleId,
        tags: impl IntoIterator<Item = Tag>,
    ) -> Result<Rule, RuleError> {
        self.update(
            id,
            RuleUpdate {
                tags: Some(tags.into_iter().collect()),
                ..RuleUpdate::default()
            },
        )
    }

    /// Sets or removes the description of rule `id`.
    ///
    /// # Errors
    ///
    /// See [`Repository::update`].
    pub fn set_description(
        &mut self,
        id: RuleId,
        description: Option<String>,
    ) -> Result<Rule, RuleError> {
        self.update(
            id,
            RuleUpdate {
                description: Some(description),
                ..RuleUpdate::default()
            },
        )
    }

    /// Deletes rule `id`, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule file cannot be written. The rule is
    /// deleted regardless.
    #[instrument(skip(self))]
    pub fn delete(&mut self, id: RuleId) -> Result<bool, RuleError> {
        let Some(rule) = self.rules.remove(id) else {
            return Ok(false);
        };
        info!(%id, "Deleted rule");
        self.commit(&RuleEvent::Deleted {
            id,
            kind: rule.kind(),
        })?;
        Ok(true)
    }

    /// Hands every rule off in an exchange document.
    ///
    /// The repository is marked exported and cleared, so the next editing
    /// session starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule file cannot be written. The repository
    /// is cleared regardless; use [`Repository::export_to`] to have the
    /// document on disk before clearing.
    #[instrument(skip(self))]
    pub fn export_all(&mut self) -> Result<ExportDocument, RuleError> {
        let document =
            ExportDocument::build(self.rules.iter(), self.config.export_layout, self.config.digits());
        self.rules.drain();
        self.exported = true;
        info!(rules = document.len(), "Exported rules");
        self.commit(&RuleEvent::Cleared)?;
        Ok(document)
    }

    /// Writes the exchange document to `path`, then clears the repository as
    /// [`Repository::export_all`] does.
    ///
    /// Nothing is cleared if the document cannot be written.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn export_to(&mut self, path: &Path) -> Result<ExportDocument, RuleError> {
        let document =
            ExportDocument::build(self.rules.iter(), self.config.export_layout, self.config.digits());
        document.write(path).map_err(|source| RuleError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        self.export_all()
    }

    /// Replaces every rule with those in the exchange document `text`.
    ///
    /// Malformed records are skipped and reported; the rest are kept.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the repository untouched, if the document
    /// is not JSON or has no rule arrays. Returns an error if the rule file
    /// cannot be written, in which case the import is still applied.
    #[instrument(skip(self, text))]
    pub fn import_all(&mut self, text: &str) -> Result<ImportReport, RuleError> {
        let decoded = decode_document(text, self.config.id_scheme)?;
        self.replace(decoded.rules, decoded.failures)
    }

    /// Imports the exchange document at `path`.
    ///
    /// # Errors
    ///
    /// See [`Repository::import_all`]; also fails if the file cannot be
    /// read.
    pub fn import_from(&mut self, path: &Path) -> Result<ImportReport, RuleError> {
        let decoded = read_document(path, self.config.id_scheme)?;
        self.replace(decoded.rules, decoded.failures)
    }

    /// Drops every rule without exporting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule file cannot be written. The rules are
    /// dropped regardless.
    #[instrument(skip(self))]
    pub fn discard(&mut self) -> Result<usize, RuleError> {
        let dropped = self.rules.drain().len();
        info!(dropped, "Discarded rules");
        self.commit(&RuleEvent::Cleared)?;
        Ok(dropped)
    }

    /// Re-reads the rule file, replacing the in-memory set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn reload(&mut self) -> Result<Vec<RecordFailure>, LoadError> {
        let Snapshot {
            rules,
            saved_at,
            exported,
            failures,
        } = rule_file::load(&self.path, self.config.id_scheme)?;
        self.rules = rules;
        self.saved_at = saved_at;
        self.exported = exported;
        self.events.emit(&RuleEvent::Imported {
            count: self.rules.len(),
        });
        Ok(failures)
    }

    /// Builds the cross-referenced index of the live rules.
    #[must_use]
    pub fn index(&self) -> IndexDocument {
        IndexDocument::build(&self.rules, &self.validator(), self.config.digits())
    }

    fn parse(&self, text: &str, profile: Profile) -> Result<Parsed, Violation> {
        let tokens = self.validator().validate_str(text, profile)?;
        Ok(split_rule(&tokens))
    }

    fn insert(&mut self, parsed: Parsed, status: Status) -> Result<Rule, RuleError> {
        self.insert_with(parsed, status, RuleDetails::default())
    }

    fn insert_with(
        &mut self,
        parsed: Parsed,
        status: Status,
        details: RuleDetails,
    ) -> Result<Rule, RuleError> {
        let prefix = Prefix::for_kind(self.config.id_scheme, parsed.kind);
        let id = self.rules.next_id(prefix);
        let mut rule = Rule::new(id, parsed.condition, parsed.relation, parsed.action, status);
        rule.content.tags = details.tags;
        rule.metadata.description = details.description.filter(|d| !d.trim().is_empty());
        rule.metadata.tech_doc_path = details.tech_doc_path.filter(|p| !p.trim().is_empty());

        self.rules.insert(rule.clone());
        self.exported = false;
        info!(%id, "Created rule");
        self.commit(&RuleEvent::Created(rule.clone()))?;
        Ok(rule)
    }

    fn replace(
        &mut self,
        rules: RuleSet,
        failures: Vec<RecordFailure>,
    ) -> Result<ImportReport, RuleError> {
        self.rules = rules;
        self.exported = false;
        let imported = self.rules.len();
        info!(imported, skipped = failures.len(), "Imported rules");
        self.commit(&RuleEvent::Imported { count: imported })?;
        Ok(ImportReport { imported, failures })
    }

    /// Persists the current state, then notifies listeners whether or not
    /// the write succeeded.
    fn commit(&mut self, event: &RuleEvent) -> Result<(), RuleError> {
        let persisted = rule_file::save(
            &self.path,
            &self.rules,
            self.exported,
            self.config.digits(),
        );
        let result = match persisted {
            Ok(saved_at) => {
                self.saved_at = Some(saved_at);
                Ok(())
            }
            Err(source) => {
                error!(path = %self.path.display(), "failed to write rule file: {source}");
                Err(RuleError::Persist(source))
            }
        };
        self.events.emit(event);
        result
    }
}

/// Picks the grammar for a whole rule by its first token.
fn profile_for(text: &str) -> Profile {
    let first = text.split_whitespace().next().unwrap_or_default();
    if first.eq_ignore_ascii_case(Keyword::If.as_str())
        || first.eq_ignore_ascii_case(Keyword::Before.as_str())
    {
        Profile::DynamicRule
    } else {
        Profile::StaticRule
    }
}

/// Splits validated tokens into condition, relation and action.
fn split_rule(tokens: &[Token]) -> Parsed {
    if let Some(at) = tokens.iter().position(|t| matches!(t, Token::Relation(_))) {
        let relation = match tokens[at] {
            Token::Relation(relation) => Some(relation),
            _ => None,
        };
        let action = render(&tokens[at + 1..]);
        return Parsed {
            condition: render(&tokens[..at]),
            kind: structural_kind(relation, &action),
            relation,
            action,
        };
    }

    let at = tokens
        .iter()
        .skip(1)
        .position(|t| matches!(t, Token::Keyword(k) if k.is_action()))
        .map_or(tokens.len(), |at| at + 1);
    Parsed {
        condition: render(&tokens[..at]),
        relation: None,
        action: render(&tokens[at..]),
        kind: RuleKind::Dynamic,
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, fs, rc::Rc};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        domain::{Catalog, IdScheme},
        events::ChangeKind,
    };

    fn catalog() -> Catalog {
        Catalog::default()
            .with_feature(
                "F10",
                "Seating",
                [("K-1", "Bench"), ("K-2", "Buckets")],
            )
            .with_feature(
                "F20",
                "Safety",
                [
                    ("K-200-000017", "Seat 2a Z-rack"),
                    ("K-200-000246", "Airbag"),
                ],
            )
            .with_bom("1139101", "Airbag module")
    }

    fn open(tmp: &TempDir) -> Repository {
        open_with(tmp, Config::default())
    }

    fn open_with(tmp: &TempDir, config: Config) -> Repository {
        let (repository, failures) = Repository::open(
            tmp.path().join("rules.json"),
            config,
            Some(Box::new(catalog())),
        )
        .unwrap();
        assert!(failures.is_empty());
        repository
    }

    fn id(s: &str) -> RuleId {
        s.parse().unwrap()
    }

    #[test]
    fn creates_first_static_rule_as_bl01() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);

        let rule = repository
            .create_static(
                "K-200-000017 AND K-200-000246",
                "→",
                "1139101",
                Status::Enabled,
            )
            .unwrap();

        assert_eq!(rule.id().to_string(), "BL01");
        assert_eq!(rule.kind(), RuleKind::Static);
        assert_eq!(rule.condition(), "K-200-000017 AND K-200-000246");
        assert_eq!(rule.relation(), Some(Relation::Implies));
        assert_eq!(rule.action(), "1139101");
        assert!(repository.path().exists());
    }

    #[test]
    fn combined_string_is_split_at_the_relation() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);

        let rule = repository
            .create_static("K-1 -> 1139101", "", "", Status::Testing)
            .unwrap();

        assert_eq!(rule.condition(), "K-1");
        assert_eq!(rule.relation(), Some(Relation::Implies));
        assert_eq!(rule.action(), "1139101");
    }

    #[test]
    fn tuning_and_keyword_rules_are_dynamic() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);

        let tuning = repository
            .create_static("K-1", "→", "ON 2 ADD 1", Status::Enabled)
            .unwrap();
        let keyword = repository
            .create_dynamic("if F10 == K-1", "display [K-2]", Status::Enabled)
            .unwrap();
        let auto = repository
            .create("before K-1 choose K-2", Status::Enabled)
            .unwrap();

        assert_eq!(tuning.id().to_string(), "TL01");
        assert_eq!(keyword.id().to_string(), "TL02");
        assert_eq!(keyword.condition(), "if F10 == K-1");
        assert_eq!(keyword.action(), "display [K-2]");
        assert_eq!(auto.id().to_string(), "TL03");
        assert_eq!(auto.relation(), None);
    }

    #[test]
    fn legacy_scheme_uses_ls_and_ld() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.id_scheme = IdScheme::Legacy;
        let mut repository = open_with(&tmp, config);

        let rule = repository.create("K-1 → 1139101", Status::Enabled).unwrap();
        let dynamic = repository
            .create("if K-1 display [K-2]", Status::Enabled)
            .unwrap();

        assert_eq!(rule.id().to_string(), "LS01");
        assert_eq!(dynamic.id().to_string(), "LD01");
    }

    #[test]
    fn invalid_expression_is_rejected_without_change() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);

        let error = repository
            .create_static("K-1 K-2", "→", "1139101", Status::Enabled)
            .unwrap_err();

        assert!(matches!(
            error,
            RuleError::Invalid(Violation {
                reason: Reason::ConsecutiveCodes,
                ..
            })
        ));
        assert!(repository.is_empty());
        assert!(!repository.path().exists());
    }

    #[test]
    fn deleted_number_is_reused_before_advancing() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        for _ in 0..3 {
            repository.create("K-1 → 1139101", Status::Enabled).unwrap();
        }

        assert!(repository.delete(id("BL02")).unwrap());
        assert!(!repository.delete(id("BL02")).unwrap());
        let reused = repository.create("K-2 → 1139101", Status::Enabled).unwrap();
        let next = repository.create("K-2 → 1139101", Status::Enabled).unwrap();

        assert_eq!(reused.id().to_string(), "BL02");
        assert_eq!(next.id().to_string(), "BL04");
    }

    #[test]
    fn update_replaces_fields_and_keeps_kind() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        let rule = repository.create("K-1 → 1139101", Status::Enabled).unwrap();

        let updated = repository
            .update(
                rule.id(),
                RuleUpdate {
                    expression: Some("K-1 OR K-2 : K-200-000017".to_string()),
                    tags: Some(Tag::parse_list("seat, safety").collect()),
                    description: Some(Some("Seat safety".to_string())),
                    ..RuleUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.condition(), "K-1 OR K-2");
        assert_eq!(updated.relation(), Some(Relation::Colon));
        assert_eq!(updated.tags().len(), 2);
        assert_eq!(updated.description(), Some("Seat safety"));
        assert_ne!(updated.fingerprint(), rule.fingerprint());

        let error = repository
            .update(
                rule.id(),
                RuleUpdate {
                    expression: Some("if K-1 display [K-2]".to_string()),
                    ..RuleUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(error, RuleError::KindMismatch { .. }));
    }

    #[test]
    fn status_change_on_missing_rule_fails() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);

        assert!(matches!(
            repository.set_status(id("BL09"), Status::Disabled),
            Err(RuleError::NotFound(_))
        ));
    }

    #[test]
    fn export_hands_off_and_clears() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        repository.create("K-1 → 1139101", Status::Enabled).unwrap();
        repository.create("K-1 → ON 2 ADD 1", Status::Enabled).unwrap();
        assert!(repository.has_unsaved_rules());

        let document = repository.export_all().unwrap();

        assert_eq!(document.len(), 2);
        assert!(repository.is_empty());
        assert!(repository.exported());
        assert!(!repository.has_unsaved_rules());

        let (reopened, _) =
            Repository::open(repository.path().to_path_buf(), Config::default(), None).unwrap();
        assert!(reopened.is_empty());
        assert!(reopened.exported());
    }

    #[test]
    fn exported_rule_imports_back_unchanged() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        repository
            .create_static(
                "K-200-000017 AND K-200-000246",
                "→",
                "1139101",
                Status::Testing,
            )
            .unwrap();
        let export_path = tmp.path().join("export.json");

        repository.export_to(&export_path).unwrap();
        let report = repository.import_from(&export_path).unwrap();

        assert_eq!(report.imported, 1);
        let rule = repository.get(id("BL01")).unwrap();
        assert_eq!(rule.condition(), "K-200-000017 AND K-200-000246");
        assert_eq!(rule.action(), "1139101");
        assert_eq!(rule.status(), Status::Testing);
        assert!(!repository.exported());
    }

    #[test]
    fn import_skips_malformed_records() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        let document = r#"{
            "rules": [
                {"logic_id": "BL01", "selection_expression": "K-1", "logic_relation": "→", "impact_expression": "1139101"},
                {"logic_id": "BL02", "selection_expression": "K-2", "logic_relation": "⇒", "impact_expression": "1139101"},
                {"rule_id": "LS01", "condition": "K-2", "relation": "→", "action": "1139101", "rule_type": "static"}
            ]
        }"#;

        let report = repository.import_all(document).unwrap();

        assert_eq!(report.imported, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(repository.len(), 2);
    }

    #[test]
    fn unreadable_import_leaves_rules_alone() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        repository.create("K-1 → 1139101", Status::Enabled).unwrap();

        let error = repository.import_all(r#"{"other": 1}"#).unwrap_err();

        assert!(matches!(error, RuleError::Import(ImportError::NoRules)));
        assert_eq!(repository.len(), 1);
    }

    #[test]
    fn listeners_see_typed_events() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let created = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&kinds);
        repository.subscribe(move |event| {
            seen.borrow_mut().push(event.kind());
            Ok(())
        });
        repository.subscribe(|_| anyhow::bail!("listener failure"));
        let counter = Rc::clone(&created);
        repository.on_created(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let rule = repository.create("K-1 → 1139101", Status::Enabled).unwrap();
        repository.set_status(rule.id(), Status::Disabled).unwrap();
        repository.delete(rule.id()).unwrap();
        repository.import_all(r#"{"rules": []}"#).unwrap();
        repository.export_all().unwrap();

        assert_eq!(
            *kinds.borrow(),
            [
                ChangeKind::Created,
                ChangeKind::Modified,
                ChangeKind::Deleted,
                ChangeKind::Imported,
                ChangeKind::Cleared,
            ]
        );
        assert_eq!(*created.borrow(), 1);
    }

    #[test]
    fn details_arrive_with_the_created_event() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        let events = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&events);
        repository.subscribe(move |event| {
            let tags = event.rule().map(|rule| rule.tags().len());
            seen.borrow_mut().push((event.kind(), tags));
            Ok(())
        });

        let rule = repository
            .create_with(
                "K-1 → 1139101",
                Status::Testing,
                RuleDetails {
                    tags: Tag::parse_list("seat, airbag").collect(),
                    description: Some("bench seat module".to_string()),
                    tech_doc_path: Some("  ".to_string()),
                },
            )
            .unwrap();

        assert_eq!(*events.borrow(), [(ChangeKind::Created, Some(2))]);
        assert_eq!(rule.description(), Some("bench seat module"));
        assert_eq!(rule.tech_doc_path(), None);
        assert_eq!(open(&tmp).get(rule.id()).unwrap().tags().len(), 2);
    }

    #[test]
    fn failed_write_keeps_change_and_notifies() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        fs::create_dir(tmp.path().join("rules.tmp")).unwrap();
        let changes = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&changes);
        repository.on_change(move || *counter.borrow_mut() += 1);

        let error = repository.create("K-1 → 1139101", Status::Enabled).unwrap_err();

        assert!(matches!(error, RuleError::Persist(_)));
        assert_eq!(repository.len(), 1);
        assert_eq!(*changes.borrow(), 1);
    }

    #[test]
    fn reopening_restores_rules() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        let rule = repository.create("K-1 → 1139101", Status::Enabled).unwrap();
        repository
            .set_tags(rule.id(), Tag::parse_list("seat"))
            .unwrap();

        let reopened = open(&tmp);

        let restored = reopened.get(rule.id()).unwrap();
        assert_eq!(restored.fingerprint(), repository.get(rule.id()).unwrap().fingerprint());
        assert!(reopened.has_unsaved_rules());
        assert!(reopened.saved_at().is_some());
    }

    #[test]
    fn discard_drops_everything() {
        let tmp = TempDir::new().unwrap();
        let mut repository = open(&tmp);
        repository.create("K-1 → 1139101", Status::Enabled).unwrap();

        assert_eq!(repository.discard().unwrap(), 1);
        assert!(repository.is_empty());
        assert!(!repository.exported());
    }
}
