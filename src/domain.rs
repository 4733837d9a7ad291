//! Domain models for configuration rules.
//!
//! This module contains the core domain types including codes and the
//! catalogs that know them, rule identifiers, rules, and configuration.

/// Code classification and the catalog interface.
pub mod code;
pub use code::{CatalogError, CodeKind, CodeUniverse, PatternUniverse};

/// In-memory code catalog.
pub mod catalog;
pub use catalog::Catalog;

mod config;
pub use config::Config;

/// Rule domain model.
pub mod rule;
pub use rule::{Relation, Rule, RuleKind, Status, Tag};

/// Rule identifier types and parsing.
pub mod rule_id;
pub use rule_id::{Error as RuleIdError, IdScheme, Prefix, RuleId};

mod ruleset;
pub use ruleset::RuleSet;
