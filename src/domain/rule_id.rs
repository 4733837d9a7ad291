use std::{fmt, num::NonZeroUsize, str::FromStr};

use serde::{Deserialize, Serialize};

use super::RuleKind;

/// Default zero-padding width of the numeric part of a rule ID.
pub const DEFAULT_DIGITS: usize = 2;

/// The naming scheme used when allocating new rule IDs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// `BL` for BOM logic, `TL` for tuning logic.
    #[default]
    Logic,
    /// `LS` for static rules, `LD` for dynamic rules.
    Legacy,
}

/// The alphabetic prefix of a rule ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Prefix {
    /// Legacy static rule.
    LS,
    /// Legacy dynamic rule.
    LD,
    /// BOM logic rule.
    BL,
    /// Tuning logic rule.
    TL,
}

impl Prefix {
    /// The prefix used for a rule of `kind` under `scheme`.
    #[must_use]
    pub const fn for_kind(scheme: IdScheme, kind: RuleKind) -> Self {
        match (scheme, kind) {
            (IdScheme::Logic, RuleKind::Static) => Self::BL,
            (IdScheme::Logic, RuleKind::Dynamic) => Self::TL,
            (IdScheme::Legacy, RuleKind::Static) => Self::LS,
            (IdScheme::Legacy, RuleKind::Dynamic) => Self::LD,
        }
    }

    /// The rule kind every ID with this prefix denotes.
    #[must_use]
    pub const fn kind(self) -> RuleKind {
        match self {
            Self::LS | Self::BL => RuleKind::Static,
            Self::LD | Self::TL => RuleKind::Dynamic,
        }
    }

    /// The scheme this prefix belongs to.
    #[must_use]
    pub const fn scheme(self) -> IdScheme {
        match self {
            Self::LS | Self::LD => IdScheme::Legacy,
            Self::BL | Self::TL => IdScheme::Logic,
        }
    }

    /// The prefix as it appears in an ID.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LS => "LS",
            Self::LD => "LD",
            Self::BL => "BL",
            Self::TL => "TL",
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Prefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LS" => Ok(Self::LS),
            "LD" => Ok(Self::LD),
            "BL" => Ok(Self::BL),
            "TL" => Ok(Self::TL),
            other => Err(Error::Prefix(other.to_string())),
        }
    }
}

/// The identifier of a rule.
///
/// Format: `{PREFIX}{NUMBER}`, where `PREFIX` is one of `LS`, `LD`, `BL`, `TL`
/// and `NUMBER` is a positive integer, zero-padded when displayed (e.g.
/// `BL01`, `TL12`, `LS003`).
///
/// IDs order by prefix first and number second, so all IDs of one prefix
/// form a contiguous range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId {
    prefix: Prefix,
    number: NonZeroUsize,
}

impl RuleId {
    /// Create a rule ID from pre-validated parts.
    #[must_use]
    pub const fn new(prefix: Prefix, number: NonZeroUsize) -> Self {
        Self { prefix, number }
    }

    /// The alphabetic prefix.
    #[must_use]
    pub const fn prefix(&self) -> Prefix {
        self.prefix
    }

    /// The numeric part.
    #[must_use]
    pub const fn number(&self) -> NonZeroUsize {
        self.number
    }

    /// The rule kind implied by the prefix.
    #[must_use]
    pub const fn kind(&self) -> RuleKind {
        self.prefix.kind()
    }

    /// Returns a displayable representation with the specified digit width.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroUsize;
    ///
    /// use bomlogic::domain::rule_id::{Prefix, RuleId};
    ///
    /// let id = RuleId::new(Prefix::BL, NonZeroUsize::new(7).unwrap());
    ///
    /// assert_eq!(id.display(2).to_string(), "BL07");
    /// assert_eq!(id.display(3).to_string(), "BL007");
    /// assert_eq!(id.display(1).to_string(), "BL7");
    /// ```
    #[must_use]
    pub const fn display(&self, digits: usize) -> FormattedRuleId {
        FormattedRuleId { id: *self, digits }
    }
}

/// A rule ID formatted with a fixed digit width.
#[derive(Debug, Clone, Copy)]
pub struct FormattedRuleId {
    id: RuleId,
    digits: usize,
}

impl fmt::Display for FormattedRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            self.id.prefix,
            self.id.number,
            width = self.digits
        )
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display(DEFAULT_DIGITS).fmt(f)
    }
}

/// Errors that can occur while parsing a rule ID.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The ID does not start with a recognised prefix.
    #[error("unknown rule ID prefix '{0}'")]
    Prefix(String),

    /// The numeric part is missing, non-numeric or zero.
    #[error("invalid number in rule ID '{0}'")]
    Number(String),
}

impl FromStr for RuleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map_or(s.len(), |(i, _)| i);
        let (prefix, digits) = s.split_at(split);
        let prefix: Prefix = prefix.parse()?;

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Number(s.to_string()));
        }
        let number = digits
            .parse::<usize>()
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| Error::Number(s.to_string()))?;

        Ok(Self::new(prefix, number))
    }
}

impl TryFrom<&str> for RuleId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl Serialize for RuleId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RuleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn id(prefix: Prefix, number: usize) -> RuleId {
        RuleId::new(prefix, NonZeroUsize::new(number).unwrap())
    }

    #[test_case(2, 1, "BL01"; "two digits")]
    #[test_case(2, 99, "BL99"; "two digits at boundary")]
    #[test_case(2, 100, "BL100"; "two digits expansion")]
    #[test_case(3, 5, "BL005"; "three digits")]
    fn display_pads_number(digits: usize, number: usize, expected: &str) {
        assert_eq!(id(Prefix::BL, number).display(digits).to_string(), expected);
    }

    #[test_case("BL01", Prefix::BL, 1; "logic static")]
    #[test_case("TL12", Prefix::TL, 12; "logic tuning")]
    #[test_case("LS003", Prefix::LS, 3; "legacy static")]
    #[test_case("LD7", Prefix::LD, 7; "legacy dynamic unpadded")]
    fn parses_valid_ids(input: &str, prefix: Prefix, number: usize) {
        assert_eq!(input.parse::<RuleId>().unwrap(), id(prefix, number));
    }

    #[test_case("XX01"; "unknown prefix")]
    #[test_case("01"; "missing prefix")]
    #[test_case("bl01"; "lowercase prefix")]
    fn rejects_bad_prefix(input: &str) {
        assert!(matches!(input.parse::<RuleId>(), Err(Error::Prefix(_))));
    }

    #[test_case("BL"; "missing number")]
    #[test_case("BL00"; "zero")]
    #[test_case("BL1a"; "trailing letters")]
    #[test_case("BL-1"; "dash")]
    fn rejects_bad_number(input: &str) {
        assert!(matches!(input.parse::<RuleId>(), Err(Error::Number(_))));
    }

    #[test]
    fn prefix_determines_kind() {
        assert_eq!(id(Prefix::BL, 1).kind(), RuleKind::Static);
        assert_eq!(id(Prefix::LS, 1).kind(), RuleKind::Static);
        assert_eq!(id(Prefix::TL, 1).kind(), RuleKind::Dynamic);
        assert_eq!(id(Prefix::LD, 1).kind(), RuleKind::Dynamic);
    }

    #[test]
    fn scheme_selects_prefix() {
        assert_eq!(
            Prefix::for_kind(IdScheme::Logic, RuleKind::Dynamic),
            Prefix::TL
        );
        assert_eq!(
            Prefix::for_kind(IdScheme::Legacy, RuleKind::Static),
            Prefix::LS
        );
        assert_eq!(Prefix::LD.scheme(), IdScheme::Legacy);
    }

    #[test]
    fn ids_of_one_prefix_are_contiguous() {
        let mut ids = vec![id(Prefix::TL, 1), id(Prefix::BL, 10), id(Prefix::BL, 2)];
        ids.sort();
        assert_eq!(ids, vec![id(Prefix::BL, 2), id(Prefix::BL, 10), id(Prefix::TL, 1)]);
    }

    #[test]
    fn serde_uses_display_form() {
        let json = serde_json::to_string(&id(Prefix::BL, 3)).unwrap();
        assert_eq!(json, "\"BL03\"");
        let back: RuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id(Prefix::BL, 3));
    }
}
