//! Coded Product-Configuration Rules
//!
//! Rules relate option codes (`K…`) to the options and bill-of-material
//! codes (`…`/`PL-…`) they imply. They are written in a small expression
//! language, checked against a catalog of codes, and kept in a JSON rule
//! file until they are handed off by export.
//!
//! ```no_run
//! use bomlogic::{Catalog, Config, Repository, Status};
//!
//! let catalog = Catalog::load("catalog.toml".as_ref())?;
//! let (mut repository, _skipped) =
//!     Repository::open("rules.json".into(), Config::default(), Some(Box::new(catalog)))?;
//!
//! let rule = repository.create("K-200-000017 AND K-200-000246 → 1139101", Status::Enabled)?;
//! assert_eq!(rule.id().to_string(), "BL01");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod domain;
pub use domain::{
    Catalog, CodeKind, CodeUniverse, Config, IdScheme, PatternUniverse, Relation, Rule, RuleId,
    RuleKind, RuleSet, Status, Tag,
};

pub mod expression;
pub use expression::{
    FeatureExpansion, Formatter, Profile, Reason, Token, Validator, VerticalStyle, Violation,
};

pub mod storage;
pub use storage::{ExportDocument, ExportLayout, ImportReport, IndexDocument, RecordFailure};

pub mod events;
pub use events::{ChangeKind, RuleEvent, SubscriptionId};

mod repository;
pub use repository::{Repository, RuleDetails, RuleError, RuleUpdate};
