//! The cross-referenced index document.
//!
//! Downstream consumers use the index to answer "which rules mention this
//! option" and "which rules produce this BOM code" without parsing
//! expressions themselves.

use std::{collections::BTreeMap, io, path::Path};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    domain::{CodeKind, Rule, RuleSet, Status},
    expression::{Token, TuningAction, Validator, tokenize},
    storage::rule_file::write_json_atomic,
};

/// Version of the index layout.
pub const INDEX_VERSION: &str = "1.0";

/// The index document.
#[derive(Debug, Clone, Serialize)]
pub struct IndexDocument {
    /// Document-level facts.
    pub metadata: IndexMetadata,
    /// Every rule with its parsed sides.
    pub rules: Vec<IndexedRule>,
    /// Inverted indexes.
    pub indexes: Indexes,
}

/// Document-level facts.
#[derive(Debug, Clone, Serialize)]
pub struct IndexMetadata {
    /// Layout version.
    pub version: &'static str,
    /// When the index was built.
    pub timestamp: DateTime<Utc>,
    /// Number of rules indexed.
    pub total_rules: usize,
}

/// One rule in the index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedRule {
    /// The rule ID.
    pub id: String,
    /// The whole rule as one line.
    pub expression: String,
    /// The rule status.
    pub status: Status,
    /// The rule description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Content fingerprint.
    pub fingerprint: String,
    /// Codes on each side.
    pub parsed: ParsedSides,
}

/// Codes mentioned on each side of a rule.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedSides {
    /// The condition.
    pub left: Side,
    /// The action.
    pub right: Side,
}

/// Codes mentioned on one side of a rule, in order of first appearance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Side {
    /// Option codes.
    pub option_codes: Vec<String>,
    /// BOM codes.
    pub bom_codes: Vec<String>,
    /// The side as written.
    pub expression: String,
}

/// Inverted indexes from codes to rules.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Indexes {
    /// Rules whose condition mentions each option code.
    pub by_option_code: BTreeMap<String, Vec<OptionEntry>>,
    /// Rules whose action produces each BOM code.
    pub by_bom_code: BTreeMap<String, Vec<BomEntry>>,
}

/// A rule conditioned on an option code.
#[derive(Debug, Clone, Serialize)]
pub struct OptionEntry {
    /// The rule ID.
    pub rule_id: String,
    /// The whole rule as one line.
    pub expression: String,
    /// Codes the rule acts on.
    pub affects: Vec<String>,
}

/// A rule producing a BOM code.
#[derive(Debug, Clone, Serialize)]
pub struct BomEntry {
    /// The rule ID.
    pub rule_id: String,
    /// The whole rule as one line.
    pub expression: String,
    /// Option codes in the rule's condition.
    pub triggered_by: Vec<String>,
}

impl IndexDocument {
    /// Builds the index of `rules`.
    ///
    /// Feature codes on a relation right side are expanded to their options
    /// through `validator`. Rules that cannot be tokenized are listed with
    /// empty code lists.
    #[must_use]
    pub fn build(rules: &RuleSet, validator: &Validator<'_>, digits: usize) -> Self {
        let mut indexed = Vec::with_capacity(rules.len());
        let mut indexes = Indexes::default();

        for rule in rules.iter() {
            let id = rule.id().display(digits).to_string();
            let expression = rule.expression();
            let parsed = parse_sides(rule, validator);

            for code in &parsed.left.option_codes {
                indexes
                    .by_option_code
                    .entry(code.clone())
                    .or_default()
                    .push(OptionEntry {
                        rule_id: id.clone(),
                        expression: expression.clone(),
                        affects: parsed
                            .right
                            .option_codes
                            .iter()
                            .chain(&parsed.right.bom_codes)
                            .cloned()
                            .collect(),
                    });
            }
            for code in &parsed.right.bom_codes {
                indexes
                    .by_bom_code
                    .entry(code.clone())
                    .or_default()
                    .push(BomEntry {
                        rule_id: id.clone(),
                        expression: expression.clone(),
                        triggered_by: parsed.left.option_codes.clone(),
                    });
            }

            indexed.push(IndexedRule {
                id,
                expression,
                status: rule.status(),
                comment: rule.description().map(str::to_string),
                fingerprint: rule.fingerprint(),
                parsed,
            });
        }

        debug!(
            "Indexed {} rules, {} option codes, {} BOM codes",
            indexed.len(),
            indexes.by_option_code.len(),
            indexes.by_bom_code.len()
        );
        Self {
            metadata: IndexMetadata {
                version: INDEX_VERSION,
                timestamp: Utc::now(),
                total_rules: indexed.len(),
            },
            rules: indexed,
            indexes,
        }
    }

    /// Writes the index to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        write_json_atomic(path, self)
    }
}

fn parse_sides(rule: &Rule, validator: &Validator<'_>) -> ParsedSides {
    let left = Side {
        expression: rule.condition().to_string(),
        ..codes_in(&lex(rule, rule.condition()))
    };

    let right_codes = if rule.is_tuning() {
        match rule.action().parse::<TuningAction>() {
            Ok(TuningAction::ChangeQuantity { code, .. }) => codes_in(&[Token::Word(code)]),
            _ => Side::default(),
        }
    } else if rule.relation().is_some() {
        let tokens = lex(rule, &rule.expression());
        let expanded = validator.expand_features(&tokens).unwrap_or_else(|violation| {
            debug!(id = %rule.id(), %violation, "feature codes left unexpanded");
            tokens
        });
        let rhs = expanded
            .iter()
            .position(|t| matches!(t, Token::Relation(_)))
            .map_or(&[][..], |at| &expanded[at + 1..]);
        codes_in(rhs)
    } else {
        codes_in(&lex(rule, rule.action()))
    };

    ParsedSides {
        left,
        right: Side {
            expression: rule.action().to_string(),
            ..right_codes
        },
    }
}

fn lex(rule: &Rule, text: &str) -> Vec<Token> {
    tokenize(text).unwrap_or_else(|error| {
        warn!(id = %rule.id(), %error, "rule text could not be tokenized for indexing");
        Vec::new()
    })
}

fn codes_in(tokens: &[Token]) -> Side {
    let mut side = Side::default();
    for word in tokens.iter().filter_map(Token::as_word) {
        let bucket = match CodeKind::classify(word) {
            Some(CodeKind::Option) => &mut side.option_codes,
            Some(CodeKind::Bom) => &mut side.bom_codes,
            _ => continue,
        };
        if !bucket.iter().any(|c| c == word) {
            bucket.push(word.to_string());
        }
    }
    side
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::domain::{Catalog, Prefix, Relation, RuleId};

    fn rule(prefix: Prefix, number: usize, condition: &str, relation: Option<Relation>, action: &str) -> Rule {
        Rule::new(
            RuleId::new(prefix, NonZeroUsize::new(number).unwrap()),
            condition.to_string(),
            relation,
            action.to_string(),
            Status::Enabled,
        )
    }

    fn rules() -> RuleSet {
        [
            rule(Prefix::BL, 1, "K1 AND NOT K2", Some(Relation::Implies), "1139101 OR PL-A1"),
            rule(Prefix::BL, 2, "K1", Some(Relation::Implies), "F20"),
            rule(Prefix::TL, 1, "K3", Some(Relation::Implies), "CHANGE QUANTITY OF 1139101 TO 2"),
            rule(Prefix::TL, 2, "if F10 == K1", None, "display [K4, K5]"),
        ]
        .into_iter()
        .collect()
    }

    fn catalog() -> Catalog {
        Catalog::default()
            .with_feature("F10", "Seats", [("K1", "Leather"), ("K2", "Cloth")])
            .with_feature("F20", "Roof", [("K6", "Glass"), ("K7", "Steel")])
    }

    #[test]
    fn parses_codes_on_each_side() {
        let catalog = catalog();
        let index = IndexDocument::build(&rules(), &Validator::new(Some(&catalog)), 2);

        let first = &index.rules[0];
        assert_eq!(first.id, "BL01");
        assert_eq!(first.parsed.left.option_codes, ["K1", "K2"]);
        assert_eq!(first.parsed.right.bom_codes, ["1139101", "PL-A1"]);
        assert_eq!(first.parsed.left.expression, "K1 AND NOT K2");
        assert_eq!(index.metadata.total_rules, 4);
    }

    #[test]
    fn expands_features_on_the_right() {
        let catalog = catalog();
        let index = IndexDocument::build(&rules(), &Validator::new(Some(&catalog)), 2);

        assert_eq!(index.rules[1].parsed.right.option_codes, ["K6", "K7"]);
    }

    #[test]
    fn tuning_quantities_are_not_codes() {
        let index = IndexDocument::build(&rules(), &Validator::new(None), 2);

        let tuning = index.rules.iter().find(|r| r.id == "TL01").unwrap();
        assert_eq!(tuning.parsed.right.bom_codes, ["1139101"]);
        assert!(tuning.parsed.right.option_codes.is_empty());
    }

    #[test]
    fn inverted_indexes_cross_reference() {
        let index = IndexDocument::build(&rules(), &Validator::new(None), 2);

        let by_k1: Vec<_> = index.indexes.by_option_code["K1"]
            .iter()
            .map(|e| e.rule_id.as_str())
            .collect();
        assert_eq!(by_k1, ["BL01", "BL02", "TL02"]);

        let producers = &index.indexes.by_bom_code["1139101"];
        assert_eq!(producers.len(), 2);
        assert_eq!(producers[0].triggered_by, ["K1", "K2"]);
        assert_eq!(producers[1].triggered_by, ["K3"]);

        let dynamic = index.indexes.by_option_code["K1"]
            .iter()
            .find(|e| e.rule_id == "TL02")
            .unwrap();
        assert_eq!(dynamic.affects, ["K4", "K5"]);
    }

    #[test]
    fn serialises_expected_layout() {
        let index = IndexDocument::build(&rules(), &Validator::new(None), 2);
        let value = serde_json::to_value(&index).unwrap();

        assert_eq!(value["metadata"]["version"], "1.0");
        assert!(value["rules"][0]["parsed"]["left"]["option_codes"].is_array());
        assert!(value["indexes"]["by_bom_code"]["PL-A1"].is_array());
    }
}
