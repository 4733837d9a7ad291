//! Horizontal and vertical renderings of rules.
//!
//! The horizontal form is the one-line expression stored on a rule. The
//! vertical form puts each code or connective on its own line, optionally
//! followed by `  # description`, and is meant for reading and editing by
//! hand. [`to_horizontal`] turns an edited vertical text back into one line.

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    domain::code::{CodeKind, CodeUniverse},
    expression::{
        LexError, Token, render, token::render_with, tokenize, tuning::is_tuning_starter,
    },
};

/// Layout of the vertical rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalStyle {
    /// One block per top-level `OR` alternative, nested parentheses kept.
    #[default]
    Grouped,
    /// Every parenthesis dropped; one token per line.
    Expanded,
}

/// Errors raised while reformatting an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The text could not be tokenized.
    #[error(transparent)]
    Lex(#[from] LexError),
    /// The text is neither `condition relation action` nor a keyword rule.
    #[error("expression has no relation symbol or condition keyword")]
    MissingRelation,
}

/// Renders expressions, annotating codes from a code universe.
#[derive(Clone, Copy, Default)]
pub struct Formatter<'a> {
    universe: Option<&'a dyn CodeUniverse>,
}

impl std::fmt::Debug for Formatter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formatter")
            .field("has_universe", &self.universe.is_some())
            .finish()
    }
}

impl<'a> Formatter<'a> {
    /// Creates a formatter. Without a universe no descriptions are attached.
    #[must_use]
    pub const fn new(universe: Option<&'a dyn CodeUniverse>) -> Self {
        Self { universe }
    }

    /// Renders `expression` one code or connective per line.
    ///
    /// Static rules are split at the relation symbol, which gets a line of its
    /// own. A tuning action is kept on one line. Keyword rules put the
    /// condition keyword first and the whole action on the last line.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be tokenized or has neither a
    /// relation symbol nor a leading condition keyword.
    pub fn to_vertical(
        &self,
        expression: &str,
        style: VerticalStyle,
        with_comments: bool,
    ) -> Result<String, FormatError> {
        let tokens = tokenize(expression)?;
        let mut lines: Vec<Vec<Token>> = Vec::new();

        match split(&tokens)? {
            Shape::Static { lhs, relation, rhs } => {
                lines.extend(condition_lines(lhs, style));
                lines.push(vec![relation.clone()]);
                if rhs.first().and_then(Token::as_word).is_some_and(is_tuning_starter) {
                    lines.push(rhs.to_vec());
                } else {
                    lines.extend(condition_lines(rhs, style));
                }
            }
            Shape::Keyword {
                keyword,
                condition,
                action,
            } => {
                lines.push(vec![keyword.clone()]);
                lines.extend(condition_lines(condition, style));
                if !action.is_empty() {
                    lines.push(action.to_vec());
                }
            }
        }

        let text: Vec<String> = lines
            .iter()
            .map(|line| {
                let body = render_with(line, vertical_spelling);
                match with_comments.then(|| self.comment(line)).flatten() {
                    Some(comment) => format!("{body}  # {comment}"),
                    None => body,
                }
            })
            .collect();
        Ok(text.join("\n"))
    }

    /// Replaces every code with its description, where one is known.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be tokenized.
    pub fn summarize(&self, expression: &str) -> Result<String, FormatError> {
        let tokens = tokenize(expression)?;
        Ok(render_with(&tokens, |token| match token.as_word() {
            Some(word) if CodeKind::classify(word).is_some() => {
                self.describe(word).unwrap_or_else(|| word.to_string())
            }
            _ => vertical_spelling(token),
        }))
    }

    fn comment(&self, line: &[Token]) -> Option<String> {
        let descriptions: Vec<String> = line
            .iter()
            .filter_map(Token::as_word)
            .filter(|word| CodeKind::classify(word).is_some())
            .filter_map(|code| self.describe(code))
            .collect();
        (!descriptions.is_empty()).then(|| descriptions.join(", "))
    }

    fn describe(&self, code: &str) -> Option<String> {
        match self.universe?.description_of(code) {
            Ok(description) => description,
            Err(error) => {
                debug!(%error, code, "no description available");
                None
            }
        }
    }
}

/// Rebuilds the one-line expression from a vertical rendering.
///
/// Comments are dropped. Each top-level `OR` alternative of more than one
/// atom is wrapped in parentheses, so the result may carry brackets the
/// original did not, but never changes token order or grouping.
///
/// # Errors
///
/// Returns an error if the text cannot be tokenized or has neither a
/// relation symbol nor a leading condition keyword.
pub fn to_horizontal(vertical: &str) -> Result<String, FormatError> {
    let joined: Vec<&str> = vertical
        .lines()
        .map(strip_comment)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let tokens = tokenize(&joined.join(" "))?;

    Ok(match split(&tokens)? {
        Shape::Static { lhs, relation, rhs } => {
            format!("{} {relation} {}", regroup(lhs), render(rhs))
        }
        Shape::Keyword {
            keyword,
            condition,
            action,
        } if action.is_empty() => format!("{keyword} {}", regroup(condition)),
        Shape::Keyword {
            keyword,
            condition,
            action,
        } => format!("{keyword} {} {}", regroup(condition), render(action)),
    })
}

enum Shape<'t> {
    Static {
        lhs: &'t [Token],
        relation: &'t Token,
        rhs: &'t [Token],
    },
    Keyword {
        keyword: &'t Token,
        condition: &'t [Token],
        action: &'t [Token],
    },
}

fn split(tokens: &[Token]) -> Result<Shape<'_>, FormatError> {
    if let Some(at) = tokens.iter().position(|t| matches!(t, Token::Relation(_))) {
        return Ok(Shape::Static {
            lhs: &tokens[..at],
            relation: &tokens[at],
            rhs: &tokens[at + 1..],
        });
    }
    match tokens.split_first() {
        Some((keyword @ Token::Keyword(k), rest)) if k.is_condition() => {
            let at = rest
                .iter()
                .position(|t| matches!(t, Token::Keyword(k) if k.is_action()))
                .unwrap_or(rest.len());
            Ok(Shape::Keyword {
                keyword,
                condition: &rest[..at],
                action: &rest[at..],
            })
        }
        _ => Err(FormatError::MissingRelation),
    }
}

fn vertical_spelling(token: &Token) -> String {
    match token {
        Token::And => "and".to_string(),
        Token::Or => "or".to_string(),
        Token::Not => "not".to_string(),
        other => other.to_string(),
    }
}

/// Cuts a line at the first `#` outside quoted text.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (at, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..at],
            _ => {}
        }
    }
    line
}

/// Splits at `OR` outside any parentheses.
fn split_top_level_or(tokens: &[Token]) -> NonEmpty<&[Token]> {
    let mut depth = 0usize;
    let mut start = 0;
    let mut groups = Vec::new();
    for (at, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => depth = depth.saturating_sub(1),
            Token::Or if depth == 0 => {
                groups.push(&tokens[start..at]);
                start = at + 1;
            }
            _ => {}
        }
    }
    let last = &tokens[start..];

    let mut groups = groups.into_iter();
    match groups.next() {
        Some(head) => {
            let mut tail: Vec<_> = groups.collect();
            tail.push(last);
            NonEmpty { head, tail }
        }
        None => NonEmpty::new(last),
    }
}

/// Whether one pair of parentheses encloses the whole group.
fn is_wrapped(group: &[Token]) -> bool {
    if !matches!((group.first(), group.last()), (Some(Token::Open), Some(Token::Close))) {
        return false;
    }
    let mut depth = 0usize;
    for (at, token) in group.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return at == group.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn unwrap_group(group: &[Token]) -> &[Token] {
    if is_wrapped(group) {
        &group[1..group.len() - 1]
    } else {
        group
    }
}

/// Breaks a boolean expression into display lines.
fn condition_lines(tokens: &[Token], style: VerticalStyle) -> Vec<Vec<Token>> {
    let mut lines = Vec::new();
    match style {
        VerticalStyle::Grouped => {
            let groups = split_top_level_or(tokens);
            for (index, group) in groups.iter().enumerate() {
                if index > 0 {
                    lines.push(vec![Token::Or]);
                }
                push_atoms(unwrap_group(group), true, &mut lines);
            }
        }
        VerticalStyle::Expanded => push_atoms(tokens, false, &mut lines),
    }
    lines
}

/// One line per atom. A feature comparison is one atom.
fn push_atoms(tokens: &[Token], keep_parens: bool, lines: &mut Vec<Vec<Token>>) {
    let mut at = 0;
    while at < tokens.len() {
        let width = atom_width(&tokens[at..]);
        let atom = &tokens[at..at + width];
        at += width;
        if !keep_parens && matches!(atom, [Token::Open | Token::Close]) {
            continue;
        }
        lines.push(atom.to_vec());
    }
}

fn atom_width(tokens: &[Token]) -> usize {
    match tokens {
        [Token::Word(_), Token::Equals | Token::NotEquals, Token::Word(_), ..]
        | [Token::Word(_), Token::Not, Token::Empty, ..] => 3,
        [Token::Word(_), Token::Empty, ..] => 2,
        _ => 1,
    }
}

/// Joins top-level alternatives with `OR`, bracketing any of several atoms.
fn regroup(tokens: &[Token]) -> String {
    let groups: Vec<String> = split_top_level_or(tokens)
        .iter()
        .map(|group| {
            let mut atoms = Vec::new();
            push_atoms(group, true, &mut atoms);
            if atoms.len() > 1 && !is_wrapped(group) {
                format!("({})", render(group))
            } else {
                render(group)
            }
        })
        .collect();
    groups.join(" OR ")
}
