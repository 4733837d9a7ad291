use std::{fmt, iter::Peekable, str::CharIndices};

use crate::domain::Relation;

/// Keywords of dynamic rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    /// `if`, a condition evaluated while configuring.
    If,
    /// `before`, a condition evaluated ahead of a selection.
    Before,
    /// `display`, show the listed codes.
    Display,
    /// `disable`, grey out the listed codes.
    Disable,
    /// `choose`, select from the listed codes.
    Choose,
    /// `info`, show a quoted message.
    Info,
}

impl Keyword {
    /// Whether the keyword opens a dynamic condition.
    #[must_use]
    pub const fn is_condition(self) -> bool {
        matches!(self, Self::If | Self::Before)
    }

    /// Whether the keyword introduces a dynamic action.
    #[must_use]
    pub const fn is_action(self) -> bool {
        !self.is_condition()
    }

    /// The keyword as written.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Before => "before",
            Self::Display => "display",
            Self::Disable => "disable",
            Self::Choose => "choose",
            Self::Info => "info",
        }
    }

    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "if" => Some(Self::If),
            "before" => Some(Self::Before),
            "display" => Some(Self::Display),
            "disable" => Some(Self::Disable),
            "choose" => Some(Self::Choose),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

/// One lexical unit of a rule expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A code, a quantity, or a tuning word.
    Word(String),
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `NOT`
    Not,
    /// `(`
    Open,
    /// `)`
    Close,
    /// `[`
    ListOpen,
    /// `]`
    ListClose,
    /// `,`
    Comma,
    /// `→`, `->` or `:`
    Relation(Relation),
    /// A dynamic-rule keyword.
    Keyword(Keyword),
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// `empty`
    Empty,
    /// A double-quoted message, stored without the quotes.
    Text(String),
}

impl Token {
    /// Shorthand for a word token.
    #[must_use]
    pub fn word(s: &str) -> Self {
        Self::Word(s.to_string())
    }

    /// The word, if this is a word token.
    #[must_use]
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Self::Word(word) => Some(word),
            _ => None,
        }
    }

    /// Whether this is `AND`, `OR` or `NOT`.
    #[must_use]
    pub const fn is_connective(&self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Not)
    }

    fn from_word(word: &str) -> Self {
        match word.to_ascii_uppercase().as_str() {
            "AND" => return Self::And,
            "OR" => return Self::Or,
            "NOT" => return Self::Not,
            "EMPTY" => return Self::Empty,
            _ => {}
        }
        Keyword::parse(word).map_or_else(|| Self::word(word), Self::Keyword)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(word) => f.write_str(word),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Not => f.write_str("NOT"),
            Self::Open => f.write_str("("),
            Self::Close => f.write_str(")"),
            Self::ListOpen => f.write_str("["),
            Self::ListClose => f.write_str("]"),
            Self::Comma => f.write_str(","),
            Self::Relation(relation) => relation.fmt(f),
            Self::Keyword(keyword) => f.write_str(keyword.as_str()),
            Self::Equals => f.write_str("=="),
            Self::NotEquals => f.write_str("!="),
            Self::Empty => f.write_str("empty"),
            Self::Text(text) => write!(f, "\"{text}\""),
        }
    }
}

/// Errors raised while splitting text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// A `"` was opened but never closed.
    #[error("unterminated quoted text starting at byte {0}")]
    UnterminatedText(usize),
    /// A character that cannot start any token.
    #[error("unexpected character '{ch}' at byte {at}")]
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// Its byte offset.
        at: usize,
    },
}

const fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | ',' | '→' | ':' | '"') || c.is_whitespace()
}

/// Split an expression into tokens.
///
/// Brackets, commas, relation symbols and comparison operators need no
/// surrounding whitespace. `AND`/`OR`/`NOT`/`empty` and the dynamic keywords
/// are recognised case-insensitively.
///
/// # Errors
///
/// Returns an error for unterminated quoted text or a stray `=`/`!`.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((at, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::Open,
            ')' => Token::Close,
            '[' => Token::ListOpen,
            ']' => Token::ListClose,
            ',' => Token::Comma,
            '→' => Token::Relation(Relation::Implies),
            ':' => Token::Relation(Relation::Colon),
            '-' if next_is(&mut chars, '>') => Token::Relation(Relation::Implies),
            '=' if next_is(&mut chars, '=') => Token::Equals,
            '!' if next_is(&mut chars, '=') => Token::NotEquals,
            '=' | '!' => return Err(LexError::UnexpectedChar { ch: c, at }),
            '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, ch)) => text.push(ch),
                        None => return Err(LexError::UnterminatedText(at)),
                    }
                }
                Token::Text(text)
            }
            _ => {
                let mut word = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    let operator_starts = match next {
                        '-' => second_is(&chars, '>'),
                        '=' | '!' => second_is(&chars, '='),
                        _ => false,
                    };
                    if is_delimiter(next) || operator_starts {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                Token::from_word(&word)
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn next_is(chars: &mut Peekable<CharIndices<'_>>, expected: char) -> bool {
    if chars.peek().is_some_and(|&(_, c)| c == expected) {
        chars.next();
        true
    } else {
        false
    }
}

/// Whether the character after the peeked one is `expected`.
fn second_is(chars: &Peekable<CharIndices<'_>>, expected: char) -> bool {
    let mut lookahead = chars.clone();
    lookahead.next();
    lookahead.peek().is_some_and(|&(_, c)| c == expected)
}

/// Join tokens back into one line of text.
///
/// Opening brackets bind to the following token and closing brackets and
/// commas to the preceding one, so `( K1 AND K2 )` renders as
/// `(K1 AND K2)`.
#[must_use]
pub fn render(tokens: &[Token]) -> String {
    render_with(tokens, Token::to_string)
}

/// Like [`render`], spelling each token with `spell`.
pub(crate) fn render_with(tokens: &[Token], spell: impl Fn(&Token) -> String) -> String {
    let mut out = String::new();
    let mut glue = true;
    for token in tokens {
        let binds_left = matches!(token, Token::Close | Token::ListClose | Token::Comma);
        if !glue && !binds_left {
            out.push(' ');
        }
        out.push_str(&spell(token));
        glue = matches!(token, Token::Open | Token::ListOpen);
    }
    out
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn splits_brackets_without_whitespace() {
        let tokens = tokenize("(K1 AND K2)→1139101").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Open,
                Token::word("K1"),
                Token::And,
                Token::word("K2"),
                Token::Close,
                Token::Relation(Relation::Implies),
                Token::word("1139101"),
            ]
        );
    }

    #[test]
    fn ascii_arrow_is_implication_but_dash_stays_in_codes() {
        let tokens = tokenize("K-200-000017->PL-A1").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::word("K-200-000017"),
                Token::Relation(Relation::Implies),
                Token::word("PL-A1"),
            ]
        );
    }

    #[test]
    fn connectives_and_keywords_are_case_insensitive() {
        let tokens = tokenize("IF k1 and not K2 Display [K3]").unwrap();
        assert_eq!(tokens[0], Token::Keyword(Keyword::If));
        assert_eq!(tokens[2], Token::And);
        assert_eq!(tokens[3], Token::Not);
        assert_eq!(tokens[5], Token::Keyword(Keyword::Display));
    }

    #[test]
    fn comparisons_and_text() {
        let tokens = tokenize("if F10==K-1 info \"check seats\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::If),
                Token::word("F10"),
                Token::Equals,
                Token::word("K-1"),
                Token::Keyword(Keyword::Info),
                Token::Text("check seats".to_string()),
            ]
        );
    }

    #[test_case("F10==K-1", Token::Equals; "equals")]
    #[test_case("F10!=K-1", Token::NotEquals; "not equals")]
    #[test_case("F10 == K-1", Token::Equals; "spaced equals")]
    fn comparison_splits_words(input: &str, operator: Token) {
        assert_eq!(
            tokenize(input).unwrap(),
            vec![Token::word("F10"), operator, Token::word("K-1")]
        );
    }

    #[test]
    fn lone_bang_inside_word_is_kept() {
        assert_eq!(tokenize("K1!").unwrap(), vec![Token::word("K1!")]);
    }

    #[test]
    fn signed_numbers_are_words() {
        let tokens = tokenize("CHANGE PRICE -250").unwrap();
        assert_eq!(tokens[2], Token::word("-250"));
    }

    #[test]
    fn unterminated_text_is_an_error() {
        assert_eq!(
            tokenize("info \"oops"),
            Err(LexError::UnterminatedText(5))
        );
    }

    #[test]
    fn stray_equals_is_an_error() {
        assert!(matches!(
            tokenize("F1 = K1"),
            Err(LexError::UnexpectedChar { ch: '=', .. })
        ));
    }

    #[test]
    fn render_glues_brackets() {
        let tokens = tokenize("( K1 AND K2 ) OR K3 → 1139101").unwrap();
        assert_eq!(render(&tokens), "(K1 AND K2) OR K3 → 1139101");

        let tokens = tokenize("if K1 display [ K2 , K3 ]").unwrap();
        assert_eq!(render(&tokens), "if K1 display [K2, K3]");
    }
}
