use std::{fmt, sync::LazyLock};

use regex::Regex;

static FEATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^F\d+$").expect("static regex is valid"));
static OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^K(\d+|-\d+(-\d+)*)$").expect("static regex is valid"));
static BOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+|PL-[A-Za-z0-9-]+)$").expect("static regex is valid"));

/// The lexical family a code token belongs to.
///
/// Classification is purely by shape. Whether a code actually exists is
/// decided by a [`CodeUniverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CodeKind {
    /// A feature code, `F` followed by digits (e.g. `F10`).
    Feature,
    /// A selectable option code, `K` followed by digits or the vendor form
    /// `K-ddd-dddddd`.
    Option,
    /// A bill-of-material code, plain digits or `PL-…`.
    Bom,
}

impl CodeKind {
    /// Classify a token by shape, returning `None` if it is not a code.
    #[must_use]
    pub fn classify(token: &str) -> Option<Self> {
        if FEATURE.is_match(token) {
            Some(Self::Feature)
        } else if OPTION.is_match(token) {
            Some(Self::Option)
        } else if BOM.is_match(token) {
            Some(Self::Bom)
        } else {
            None
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Feature => "feature",
            Self::Option => "option",
            Self::Bom => "BOM",
        };
        f.write_str(name)
    }
}

/// A failure inside a code catalog.
///
/// The validator never lets these escape. They surface as a
/// `validation_failed` reason instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("code catalog unavailable: {0}")]
pub struct CatalogError(pub String);

/// The universe of codes a rule may refer to.
///
/// Implemented by catalogs that know which feature, option and BOM codes
/// exist. The rule engine only ever asks membership questions on demand and
/// never caches the answers.
pub trait CodeUniverse {
    /// Whether `code` is a known feature code.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    fn is_feature_code(&self, code: &str) -> Result<bool, CatalogError>;

    /// Whether `code` is a known option code.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    fn is_option_code(&self, code: &str) -> Result<bool, CatalogError>;

    /// The option codes selectable for `feature`, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    fn options_of(&self, feature: &str) -> Result<Vec<String>, CatalogError>;

    /// Whether `code` is a known BOM code.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    fn is_bom_code(&self, code: &str) -> Result<bool, CatalogError>;

    /// A human-readable description of `code`, if the catalog has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    fn description_of(&self, code: &str) -> Result<Option<String>, CatalogError>;

    /// Whether `option` is selectable for `feature`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    fn belongs_to(&self, feature: &str, option: &str) -> Result<bool, CatalogError> {
        Ok(self.options_of(feature)?.iter().any(|o| o == option))
    }
}

/// A universe that accepts every well-formed code.
///
/// Used when no catalog has been loaded but shape-only checking is
/// acceptable. Features have no known options and no code has a description.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternUniverse;

impl CodeUniverse for PatternUniverse {
    fn is_feature_code(&self, code: &str) -> Result<bool, CatalogError> {
        Ok(CodeKind::classify(code) == Some(CodeKind::Feature))
    }

    fn is_option_code(&self, code: &str) -> Result<bool, CatalogError> {
        Ok(CodeKind::classify(code) == Some(CodeKind::Option))
    }

    fn options_of(&self, _feature: &str) -> Result<Vec<String>, CatalogError> {
        Ok(Vec::new())
    }

    fn is_bom_code(&self, code: &str) -> Result<bool, CatalogError> {
        Ok(CodeKind::classify(code) == Some(CodeKind::Bom))
    }

    fn description_of(&self, _code: &str) -> Result<Option<String>, CatalogError> {
        Ok(None)
    }

    fn belongs_to(&self, feature: &str, option: &str) -> Result<bool, CatalogError> {
        Ok(self.is_feature_code(feature)? && self.is_option_code(option)?)
    }
}

/// Ask `universe` whether `code` is a member of the family `kind`.
///
/// # Errors
///
/// Propagates catalog failures.
pub fn is_member(
    universe: &dyn CodeUniverse,
    kind: CodeKind,
    code: &str,
) -> Result<bool, CatalogError> {
    match kind {
        CodeKind::Feature => universe.is_feature_code(code),
        CodeKind::Option => universe.is_option_code(code),
        CodeKind::Bom => universe.is_bom_code(code),
    }
}
