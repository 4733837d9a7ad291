//! The incremental expression validator.
//!
//! A single state machine serves both live editing and save-time checks. A
//! [`Session`] is fed one token at a time and rejects any token that leaves
//! the expression with no path to validity; [`Session::finish`] then checks
//! that the expression is complete. [`Validator::can_append`] and
//! [`Validator::validate`] are thin wrappers over a session.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    domain::code::{CodeKind, CodeUniverse, is_member},
    expression::{
        Keyword, LexError, Token, tokenize,
        tuning::{self, TuningMachine},
    },
};

/// How a feature code on the right of a relation expands into its options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureExpansion {
    /// Any one of the feature's options (`K1 OR K2 OR …`).
    #[default]
    Any,
    /// All of the feature's options (`K1 AND K2 AND …`).
    All,
}

/// The grammar an expression is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// `condition relation action`, where the action is a boolean
    /// expression or a tuning action.
    StaticRule,
    /// A boolean combination of option codes.
    StaticCondition,
    /// The part after a relation symbol.
    RelationRhs,
    /// The codes of a `display`/`disable`/`choose` list, with or without
    /// the enclosing brackets.
    ListContent,
    /// `if|before <condition> <action>`.
    DynamicRule,
    /// One tuning action on its own.
    TuningAction,
}

macro_rules! reasons {
    ($($(#[doc = $doc:literal])* $variant:ident => $code:literal, $message:literal;)*) => {
        /// Why an expression was rejected.
        ///
        /// Serialised as the `snake_case` code returned by [`Reason::code`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Reason {
            $($(#[doc = $doc])* $variant,)*
        }

        impl Reason {
            /// The stable machine-readable code.
            #[must_use]
            pub const fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)*
                }
            }

            /// A short human-readable explanation.
            #[must_use]
            pub const fn message(self) -> &'static str {
                match self {
                    $(Self::$variant => $message,)*
                }
            }
        }
    };
}

reasons! {
    /// Nothing to validate.
    EmptyExpression => "empty_expression", "expression is empty";
    /// Two codes with no connective between them.
    ConsecutiveCodes => "consecutive_codes", "two codes without an operator between them";
    /// Two binary operators, or `NOT` followed by a binary operator.
    ConsecutiveOperators => "consecutive_operators", "two operators in a row";
    /// A binary operator at the start.
    LeadingOperator => "leading_operator", "expression starts with an operator";
    /// An operator with nothing after it.
    DanglingOperator => "dangling_operator", "operator without a right operand";
    /// A binary operator straight after `(`.
    OperatorAfterOpenParen => "operator_after_open_paren", "operator directly after '('";
    /// `(` straight after an operand.
    MissingOperator => "missing_operator", "'(' must follow an operator";
    /// `NOT` after a completed operand.
    InvalidBeforeNot => "invalid_before_not", "NOT must follow an operator, '(' or the start";
    /// Unbalanced parentheses.
    ParenthesesMismatch => "parentheses_mismatch", "unbalanced parentheses";
    /// `()`.
    EmptyParentheses => "empty_parentheses", "empty parentheses";
    /// A static rule without a relation symbol.
    MissingImplicationOperator => "missing_implication_operator", "rule has no relation symbol";
    /// A second relation symbol.
    DuplicateImplicationOperator => "duplicate_implication_operator", "rule has more than one relation symbol";
    /// A relation symbol where none may appear.
    UnexpectedImplicationOperator => "unexpected_implication_operator", "relation symbol not allowed here";
    /// Nothing before the relation symbol or action keyword.
    MissingCondition => "missing_condition", "condition is empty";
    /// Nothing after the relation symbol or condition.
    MissingAction => "missing_action", "action is empty";
    /// A code of a family not allowed on this side.
    DisallowedCode => "disallowed_code", "code kind not allowed here";
    /// A well-formed code the catalog does not know.
    UnknownCode => "unknown_code", "code is not in the catalog";
    /// Not a code, operator or keyword.
    UnknownToken => "unknown_token", "not a code, operator or keyword";
    /// A recognised token in a position where it cannot appear.
    UnexpectedToken => "unexpected_token", "token not allowed here";
    /// A feature code with no options to expand into.
    EmptyFeature => "empty_feature", "feature has no options";
    /// A dynamic rule that does not start with `if` or `before`.
    MissingConditionKeyword => "missing_condition_keyword", "dynamic rule must start with 'if' or 'before'";
    /// `if` or `before` after the start.
    MisplacedConditionKeyword => "misplaced_condition_keyword", "'if' and 'before' may only start a dynamic rule";
    /// An action the condition keyword does not admit.
    ActionNotAllowed => "action_not_allowed", "action not allowed after this condition keyword";
    /// A comparison operator with no feature code before it.
    MissingFeatureCode => "missing_feature_code", "comparison without a feature code";
    /// A feature code in a condition not followed by a comparison.
    MissingComparator => "missing_comparator", "feature code must be followed by '==', '!=', 'empty' or 'NOT empty'";
    /// A comparison operator with no option code after it.
    MissingComparisonValue => "missing_comparison_value", "comparison needs an option code";
    /// A comparison against an option of another feature.
    OptionNotInFeature => "option_not_in_feature", "option does not belong to the feature";
    /// A list action without its bracketed list.
    ExpectedList => "expected_list", "action needs a bracketed list";
    /// A list missing `]`.
    UnclosedList => "unclosed_list", "list is missing ']'";
    /// `[` inside a list.
    NestedList => "nested_list", "lists cannot be nested";
    /// A list with no codes.
    EmptyList => "empty_list", "list is empty";
    /// A comma that does not separate two codes.
    MisplacedComma => "misplaced_comma", "comma must separate two codes";
    /// A boolean operator inside a list.
    OperatorInList => "operator_in_list", "operators are not allowed in a list";
    /// A tuning word inside a list.
    TuningInList => "tuning_in_list", "tuning actions are not allowed in a list";
    /// `info` without quoted text.
    MissingInfoText => "missing_info_text", "'info' needs quoted text";
    /// An opening `"` with no closing one.
    UnterminatedText => "unterminated_text", "quoted text is not closed";
    /// Tokens after an action that is already complete.
    TrailingTokens => "trailing_tokens", "unexpected tokens after a complete action";
    /// Words that do not follow any tuning shape.
    InvalidTuning => "invalid_tuning", "malformed tuning action";
    /// A tuning action cut short.
    IncompleteTuning => "incomplete_tuning", "tuning action is incomplete";
    /// A tuning quantity that is not a non-negative integer.
    InvalidQuantity => "invalid_quantity", "quantity must be a non-negative integer";
    /// A price change that is not a signed integer.
    InvalidPrice => "invalid_price", "price change must be a signed integer such as +5 or -5";
    /// The code catalog failed while being consulted.
    ValidationFailed => "validation_failed", "the code catalog could not be consulted";
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for Reason {}

/// A rejected expression: the reason, and the token it was found at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Why the expression was rejected.
    pub reason: Reason,
    /// The offending token, if the problem is tied to one.
    pub token: Option<String>,
    /// Zero-based index of the offending token.
    pub position: Option<usize>,
}

impl Violation {
    /// A violation not tied to any token.
    #[must_use]
    pub const fn new(reason: Reason) -> Self {
        Self {
            reason,
            token: None,
            position: None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(token) => write!(f, "{} (at '{token}')", self.reason),
            None => self.reason.fmt(f),
        }
    }
}

impl std::error::Error for Violation {}

impl From<Reason> for Violation {
    fn from(reason: Reason) -> Self {
        Self::new(reason)
    }
}

impl From<LexError> for Violation {
    fn from(error: LexError) -> Self {
        match error {
            LexError::UnterminatedText(_) => Self::new(Reason::UnterminatedText),
            LexError::UnexpectedChar { ch, .. } => Self {
                reason: Reason::UnknownToken,
                token: Some(ch.to_string()),
                position: None,
            },
        }
    }
}

/// Checks expressions against a code universe.
///
/// Without a universe every code is [`Reason::UnknownCode`].
#[derive(Clone, Copy)]
pub struct Validator<'a> {
    universe: Option<&'a dyn CodeUniverse>,
    expansion: FeatureExpansion,
}

impl fmt::Debug for Validator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("has_universe", &self.universe.is_some())
            .field("expansion", &self.expansion)
            .finish()
    }
}

impl<'a> Validator<'a> {
    /// Creates a validator backed by `universe`.
    #[must_use]
    pub const fn new(universe: Option<&'a dyn CodeUniverse>) -> Self {
        Self {
            universe,
            expansion: FeatureExpansion::Any,
        }
    }

    /// Sets how right-hand feature codes expand.
    #[must_use]
    pub const fn with_expansion(mut self, expansion: FeatureExpansion) -> Self {
        self.expansion = expansion;
        self
    }

    /// Starts an incremental session for `profile`.
    #[must_use]
    pub fn session(&self, profile: Profile) -> Session<'_, 'a> {
        Session::new(self, profile)
    }

    /// Whether `next` may follow `sequence` under `profile`.
    ///
    /// Succeeds if the extended sequence is still a prefix of some valid
    /// expression. It need not be complete.
    ///
    /// # Errors
    ///
    /// Returns the first violation in `sequence` followed by `next`.
    pub fn can_append(
        &self,
        sequence: &[Token],
        next: &Token,
        profile: Profile,
    ) -> Result<(), Violation> {
        let mut session = self.session(profile);
        for token in sequence {
            session.push(token)?;
        }
        session.push(next)
    }

    /// Checks a complete token sequence.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    #[instrument(level = "debug", skip(self, tokens))]
    pub fn validate(&self, tokens: &[Token], profile: Profile) -> Result<(), Violation> {
        let mut session = self.session(profile);
        for token in tokens {
            session.push(token)?;
        }
        session.finish()
    }

    /// Tokenizes and checks `text`, returning its tokens.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, including lexical errors.
    pub fn validate_str(&self, text: &str, profile: Profile) -> Result<Vec<Token>, Violation> {
        let tokens = tokenize(text)?;
        self.validate(&tokens, profile)?;
        Ok(tokens)
    }

    /// Replaces feature codes after the relation symbol with their option
    /// groups.
    ///
    /// A feature with a single option becomes that option. Tuning actions
    /// are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns a violation if a feature cannot be expanded.
    pub fn expand_features(&self, tokens: &[Token]) -> Result<Vec<Token>, Violation> {
        let Some(split) = tokens.iter().position(|t| matches!(t, Token::Relation(_))) else {
            return Ok(tokens.to_vec());
        };
        let rhs = &tokens[split + 1..];
        if rhs
            .first()
            .and_then(Token::as_word)
            .is_some_and(tuning::is_tuning_starter)
        {
            return Ok(tokens.to_vec());
        }

        let connective = match self.expansion {
            FeatureExpansion::Any => Token::Or,
            FeatureExpansion::All => Token::And,
        };
        let mut expanded = tokens[..=split].to_vec();
        for token in rhs {
            let Some(word) = token
                .as_word()
                .filter(|w| CodeKind::classify(w) == Some(CodeKind::Feature))
            else {
                expanded.push(token.clone());
                continue;
            };
            let options = self.options_of(word).map_err(|reason| Violation {
                reason,
                token: Some(word.to_string()),
                position: None,
            })?;
            match options.as_slice() {
                [] => {
                    return Err(Violation {
                        reason: Reason::EmptyFeature,
                        token: Some(word.to_string()),
                        position: None,
                    });
                }
                [only] => expanded.push(Token::word(only)),
                [first, rest @ ..] => {
                    expanded.push(Token::Open);
                    expanded.push(Token::word(first));
                    for option in rest {
                        expanded.push(connective.clone());
                        expanded.push(Token::word(option));
                    }
                    expanded.push(Token::Close);
                }
            }
        }
        Ok(expanded)
    }

    fn check_member(&self, kind: CodeKind, code: &str) -> Result<(), Reason> {
        let Some(universe) = self.universe else {
            return Err(Reason::UnknownCode);
        };
        match is_member(universe, kind, code) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Reason::UnknownCode),
            Err(error) => {
                warn!(%error, code, "code catalog lookup failed");
                Err(Reason::ValidationFailed)
            }
        }
    }

    fn options_of(&self, feature: &str) -> Result<Vec<String>, Reason> {
        let Some(universe) = self.universe else {
            return Err(Reason::UnknownCode);
        };
        universe.options_of(feature).map_err(|error| {
            warn!(%error, feature, "code catalog lookup failed");
            Reason::ValidationFailed
        })
    }

    fn belongs_to(&self, feature: &str, option: &str) -> Result<bool, Reason> {
        let Some(universe) = self.universe else {
            return Err(Reason::UnknownCode);
        };
        universe.belongs_to(feature, option).map_err(|error| {
            warn!(%error, feature, option, "code catalog lookup failed");
            Reason::ValidationFailed
        })
    }
}

/// What the boolean machine saw last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Last {
    #[default]
    Start,
    Operand,
    Binary,
    Not,
    Open,
    Close,
}

/// Parenthesis depth and operand/operator alternation.
#[derive(Debug, Clone, Copy, Default)]
struct BoolState {
    depth: usize,
    last: Last,
}

impl BoolState {
    fn is_empty(self) -> bool {
        self.last == Last::Start
    }

    fn operand(&mut self) -> Result<(), Reason> {
        match self.last {
            Last::Operand | Last::Close => Err(Reason::ConsecutiveCodes),
            _ => {
                self.last = Last::Operand;
                Ok(())
            }
        }
    }

    fn binary(&mut self) -> Result<(), Reason> {
        match self.last {
            Last::Start => Err(Reason::LeadingOperator),
            Last::Open => Err(Reason::OperatorAfterOpenParen),
            Last::Binary | Last::Not => Err(Reason::ConsecutiveOperators),
            Last::Operand | Last::Close => {
                self.last = Last::Binary;
                Ok(())
            }
        }
    }

    fn not(&mut self) -> Result<(), Reason> {
        match self.last {
            Last::Operand | Last::Close => Err(Reason::InvalidBeforeNot),
            Last::Not => Err(Reason::ConsecutiveOperators),
            Last::Start | Last::Binary | Last::Open => {
                self.last = Last::Not;
                Ok(())
            }
        }
    }

    fn open(&mut self) -> Result<(), Reason> {
        match self.last {
            Last::Operand | Last::Close => Err(Reason::MissingOperator),
            _ => {
                self.depth += 1;
                self.last = Last::Open;
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<(), Reason> {
        if self.depth == 0 {
            return Err(Reason::ParenthesesMismatch);
        }
        match self.last {
            Last::Open => Err(Reason::EmptyParentheses),
            Last::Binary | Last::Not => Err(Reason::DanglingOperator),
            _ => {
                self.depth -= 1;
                self.last = Last::Close;
                Ok(())
            }
        }
    }

    fn finish(self) -> Result<(), Reason> {
        match self.last {
            Last::Start => Err(Reason::EmptyExpression),
            Last::Binary | Last::Not => Err(Reason::DanglingOperator),
            _ if self.depth > 0 => Err(Reason::ParenthesesMismatch),
            _ => Ok(()),
        }
    }

    /// Connectives and parentheses. Codes are handled by the caller, which
    /// knows which code families the current side admits.
    fn step(&mut self, token: &Token) -> Result<(), Reason> {
        match token {
            Token::And | Token::Or => self.binary(),
            Token::Not => self.not(),
            Token::Open => self.open(),
            Token::Close => self.close(),
            Token::Keyword(keyword) if keyword.is_condition() => {
                Err(Reason::MisplacedConditionKeyword)
            }
            Token::Word(_) => Err(Reason::UnknownToken),
            _ => Err(Reason::UnexpectedToken),
        }
    }
}

/// Progress through a feature comparison inside a dynamic condition.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Atom {
    Idle,
    /// Saw `F`, expecting a comparator.
    Feature(String),
    /// Saw `F ==` or `F !=`.
    Compare(String),
    /// Saw `F NOT`, expecting `empty`.
    NotEmpty,
}

#[derive(Debug, Clone, Copy, Default)]
struct ListState {
    bracketed: bool,
    items: usize,
    after_comma: bool,
}

impl ListState {
    /// Returns `true` once the closing bracket is consumed.
    fn push(&mut self, token: &Token) -> Result<bool, Reason> {
        match token {
            Token::Word(word) if tuning::is_tuning_word(word) => Err(Reason::TuningInList),
            Token::Word(word) if CodeKind::classify(word).is_some() => {
                self.items += 1;
                self.after_comma = false;
                Ok(false)
            }
            Token::Word(_) => Err(Reason::UnknownToken),
            Token::Comma if self.items == 0 || self.after_comma => Err(Reason::MisplacedComma),
            Token::Comma => {
                self.after_comma = true;
                Ok(false)
            }
            Token::ListClose if !self.bracketed => Err(Reason::UnexpectedToken),
            Token::ListClose if self.items == 0 => Err(Reason::EmptyList),
            Token::ListClose if self.after_comma => Err(Reason::MisplacedComma),
            Token::ListClose => Ok(true),
            Token::ListOpen => Err(Reason::NestedList),
            Token::And | Token::Or | Token::Not => Err(Reason::OperatorInList),
            _ => Err(Reason::UnexpectedToken),
        }
    }

    fn finish(self) -> Result<(), Reason> {
        if self.bracketed {
            Err(Reason::UnclosedList)
        } else if self.items == 0 {
            Err(Reason::EmptyList)
        } else if self.after_comma {
            Err(Reason::MisplacedComma)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
enum Phase {
    /// Left of the relation symbol.
    Condition(BoolState),
    /// Right of the relation symbol, boolean form.
    Rhs(BoolState),
    Tuning(TuningMachine),
    /// Start of a dynamic rule.
    ConditionKeyword,
    Dynamic {
        keyword: Keyword,
        condition: BoolState,
        atom: Atom,
    },
    /// After `display`/`disable`/`choose`.
    ListStart {
        brackets_required: bool,
    },
    List(ListState),
    InfoText,
    Done,
}

/// An in-progress validation.
///
/// A token that [`push`](Self::push) rejects leaves the session unchanged,
/// so an editor can refuse a keystroke and carry on.
#[derive(Debug, Clone)]
pub struct Session<'v, 'a> {
    validator: &'v Validator<'a>,
    profile: Profile,
    phase: Phase,
    position: usize,
}

impl<'v, 'a> Session<'v, 'a> {
    fn new(validator: &'v Validator<'a>, profile: Profile) -> Self {
        let phase = match profile {
            Profile::StaticRule | Profile::StaticCondition => {
                Phase::Condition(BoolState::default())
            }
            Profile::RelationRhs => Phase::Rhs(BoolState::default()),
            Profile::ListContent => Phase::ListStart {
                brackets_required: false,
            },
            Profile::DynamicRule => Phase::ConditionKeyword,
            Profile::TuningAction => Phase::Tuning(TuningMachine::default()),
        };
        Self {
            validator,
            profile,
            phase,
            position: 0,
        }
    }

    /// The profile this session checks.
    #[must_use]
    pub const fn profile(&self) -> Profile {
        self.profile
    }

    /// Number of tokens accepted so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.position
    }

    /// Whether no token has been accepted yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Offers the next token.
    ///
    /// # Errors
    ///
    /// Returns a violation if no valid expression can continue with `token`.
    pub fn push(&mut self, token: &Token) -> Result<(), Violation> {
        let mut phase = self.phase.clone();
        self.step(&mut phase, token).map_err(|reason| {
            debug!(%token, position = self.position, reason = reason.code(), "token rejected");
            Violation {
                reason,
                token: Some(token.to_string()),
                position: Some(self.position),
            }
        })?;
        self.phase = phase;
        self.position += 1;
        Ok(())
    }

    /// Checks that the tokens pushed so far form a complete expression.
    ///
    /// # Errors
    ///
    /// Returns a violation describing what is missing.
    pub fn finish(&self) -> Result<(), Violation> {
        self.check_complete().map_err(Violation::new)
    }

    fn relation_reason(&self) -> Reason {
        if self.profile == Profile::StaticRule {
            Reason::DuplicateImplicationOperator
        } else {
            Reason::UnexpectedImplicationOperator
        }
    }

    fn step(&self, phase: &mut Phase, token: &Token) -> Result<(), Reason> {
        match phase {
            Phase::Condition(state) => {
                if let Token::Relation(_) = token {
                    if self.profile != Profile::StaticRule {
                        return Err(Reason::UnexpectedImplicationOperator);
                    }
                    if state.is_empty() {
                        return Err(Reason::MissingCondition);
                    }
                    state.finish()?;
                    *phase = Phase::Rhs(BoolState::default());
                    return Ok(());
                }
                self.static_operand(state, token, &[CodeKind::Option])
            }
            Phase::Rhs(state) => match token {
                Token::Relation(_) => Err(self.relation_reason()),
                Token::Word(word) if state.is_empty() && tuning::is_tuning_starter(word) => {
                    let mut machine = TuningMachine::default();
                    machine.feed(token)?;
                    *phase = Phase::Tuning(machine);
                    Ok(())
                }
                Token::Word(word) if CodeKind::classify(word) == Some(CodeKind::Feature) => {
                    state.operand()?;
                    self.validator.check_member(CodeKind::Feature, word)?;
                    if self.validator.options_of(word)?.is_empty() {
                        return Err(Reason::EmptyFeature);
                    }
                    Ok(())
                }
                _ => self.static_operand(state, token, &[CodeKind::Option, CodeKind::Bom]),
            },
            Phase::Tuning(machine) => {
                if machine.is_done() {
                    return Err(Reason::TrailingTokens);
                }
                match token {
                    Token::Relation(_) => Err(self.relation_reason()),
                    Token::Word(word) if machine.expects_code() => {
                        match CodeKind::classify(word) {
                            Some(kind @ (CodeKind::Option | CodeKind::Bom)) => {
                                self.validator.check_member(kind, word)?;
                            }
                            Some(CodeKind::Feature) => return Err(Reason::DisallowedCode),
                            None => return Err(Reason::InvalidTuning),
                        }
                        machine.feed(token)
                    }
                    _ => machine.feed(token),
                }
            }
            Phase::ConditionKeyword => match token {
                Token::Keyword(keyword) if keyword.is_condition() => {
                    *phase = Phase::Dynamic {
                        keyword: *keyword,
                        condition: BoolState::default(),
                        atom: Atom::Idle,
                    };
                    Ok(())
                }
                _ => Err(Reason::MissingConditionKeyword),
            },
            Phase::Dynamic {
                keyword,
                condition,
                atom,
            } => {
                if let Some(next) = self.dynamic_step(*keyword, condition, atom, token)? {
                    *phase = next;
                }
                Ok(())
            }
            Phase::ListStart { brackets_required } => {
                let mut list = ListState::default();
                match token {
                    Token::ListOpen => list.bracketed = true,
                    _ if *brackets_required => return Err(Reason::ExpectedList),
                    _ => {
                        if list.push(token)? {
                            return Err(Reason::UnexpectedToken);
                        }
                    }
                }
                *phase = Phase::List(list);
                Ok(())
            }
            Phase::List(list) => {
                if list.push(token)? {
                    *phase = Phase::Done;
                }
                Ok(())
            }
            Phase::InfoText => match token {
                Token::Text(_) => {
                    *phase = Phase::Done;
                    Ok(())
                }
                _ => Err(Reason::MissingInfoText),
            },
            Phase::Done => Err(Reason::TrailingTokens),
        }
    }

    /// A token on either side of a static relation.
    fn static_operand(
        &self,
        state: &mut BoolState,
        token: &Token,
        allowed: &[CodeKind],
    ) -> Result<(), Reason> {
        let Token::Word(word) = token else {
            return state.step(token);
        };
        match CodeKind::classify(word) {
            Some(kind) if allowed.contains(&kind) => {
                state.operand()?;
                self.validator.check_member(kind, word)
            }
            Some(_) => Err(Reason::DisallowedCode),
            None if tuning::is_tuning_word(word) => Err(Reason::InvalidTuning),
            None => Err(Reason::UnknownToken),
        }
    }

    /// A token inside `if …`/`before …`. Returns the next phase once the
    /// action keyword is reached.
    fn dynamic_step(
        &self,
        keyword: Keyword,
        condition: &mut BoolState,
        atom: &mut Atom,
        token: &Token,
    ) -> Result<Option<Phase>, Reason> {
        match std::mem::replace(atom, Atom::Idle) {
            Atom::Feature(feature) => {
                *atom = match token {
                    Token::Equals | Token::NotEquals => Atom::Compare(feature),
                    Token::Empty => Atom::Idle,
                    Token::Not => Atom::NotEmpty,
                    _ => return Err(Reason::MissingComparator),
                };
                return Ok(None);
            }
            Atom::NotEmpty => {
                return match token {
                    Token::Empty => Ok(None),
                    _ => Err(Reason::MissingComparator),
                };
            }
            Atom::Compare(feature) => {
                let Some(option) = token
                    .as_word()
                    .filter(|w| CodeKind::classify(w) == Some(CodeKind::Option))
                else {
                    return Err(Reason::MissingComparisonValue);
                };
                self.validator.check_member(CodeKind::Option, option)?;
                if !self.validator.belongs_to(&feature, option)? {
                    return Err(Reason::OptionNotInFeature);
                }
                return Ok(None);
            }
            Atom::Idle => {}
        }

        match token {
            Token::Word(word) => match CodeKind::classify(word) {
                Some(CodeKind::Option) => {
                    condition.operand()?;
                    self.validator.check_member(CodeKind::Option, word)?;
                }
                Some(CodeKind::Feature) => {
                    condition.operand()?;
                    self.validator.check_member(CodeKind::Feature, word)?;
                    *atom = Atom::Feature(word.clone());
                }
                Some(CodeKind::Bom) => return Err(Reason::DisallowedCode),
                None if tuning::is_tuning_word(word) => return Err(Reason::InvalidTuning),
                None => return Err(Reason::UnknownToken),
            },
            Token::Equals | Token::NotEquals | Token::Empty => {
                return Err(Reason::MissingFeatureCode);
            }
            Token::Relation(_) => return Err(Reason::UnexpectedImplicationOperator),
            Token::Keyword(action) if action.is_action() => {
                if condition.is_empty() {
                    return Err(Reason::MissingCondition);
                }
                condition.finish()?;
                let next = match (keyword, action) {
                    (Keyword::If, Keyword::Info) => Phase::InfoText,
                    (Keyword::If, _) => Phase::ListStart {
                        brackets_required: true,
                    },
                    (_, Keyword::Choose) => Phase::ListStart {
                        brackets_required: false,
                    },
                    _ => return Err(Reason::ActionNotAllowed),
                };
                return Ok(Some(next));
            }
            _ => condition.step(token)?,
        }
        Ok(None)
    }

    fn check_complete(&self) -> Result<(), Reason> {
        match &self.phase {
            Phase::Condition(state) => {
                state.finish()?;
                if self.profile == Profile::StaticRule {
                    Err(Reason::MissingImplicationOperator)
                } else {
                    Ok(())
                }
            }
            Phase::Rhs(state) if state.is_empty() && self.profile == Profile::StaticRule => {
                Err(Reason::MissingAction)
            }
            Phase::Rhs(state) => state.finish(),
            Phase::Tuning(machine) => machine.finish(),
            Phase::ConditionKeyword => Err(Reason::EmptyExpression),
            Phase::Dynamic {
                condition, atom, ..
            } => {
                match atom {
                    Atom::Feature(_) | Atom::NotEmpty => return Err(Reason::MissingComparator),
                    Atom::Compare(_) => return Err(Reason::MissingComparisonValue),
                    Atom::Idle => {}
                }
                if condition.is_empty() {
                    return Err(Reason::MissingCondition);
                }
                condition.finish()?;
                Err(Reason::MissingAction)
            }
            Phase::ListStart { .. } if self.profile == Profile::ListContent => {
                Err(Reason::EmptyList)
            }
            Phase::ListStart { .. } => Err(Reason::ExpectedList),
            Phase::List(list) => list.finish(),
            Phase::InfoText => Err(Reason::MissingInfoText),
            Phase::Done => Ok(()),
        }
    }
}
