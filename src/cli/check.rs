use std::path::Path;

use bomlogic::{Profile, Token, Validator, Violation, expression::tokenize};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::instrument;

use super::terminal::Colorize;

/// Command arguments for `bl check`.
#[derive(Debug, Parser)]
#[command(about = "Check an expression without storing it")]
pub struct Check {
    /// The expression to check
    expression: String,

    /// The grammar to check against (default: inferred from the first
    /// word)
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Show how each token was received
    #[arg(long)]
    trace: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProfileArg {
    /// `condition → action`
    Rule,
    /// A condition on its own
    Condition,
    /// The part after a relation
    Rhs,
    /// The codes of a display, disable or choose list
    List,
    /// `if|before … display|disable|choose|info …`
    Dynamic,
    /// A tuning action on its own
    Tuning,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Rule => Self::StaticRule,
            ProfileArg::Condition => Self::StaticCondition,
            ProfileArg::Rhs => Self::RelationRhs,
            ProfileArg::List => Self::ListContent,
            ProfileArg::Dynamic => Self::DynamicRule,
            ProfileArg::Tuning => Self::TuningAction,
        }
    }
}

#[derive(Debug, Serialize)]
struct Outcome<'a> {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    violation: Option<&'a Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expanded: Option<String>,
}

impl Check {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let repository = super::open_repository(root)?;
        let validator = repository.validator();
        let profile = self
            .profile
            .map_or_else(|| infer_profile(&self.expression), Profile::from);

        if self.trace {
            trace(&validator, &self.expression, profile);
        }

        let result = validator.validate_str(&self.expression, profile);
        let expanded = result
            .as_ref()
            .ok()
            .and_then(|tokens| validator.expand_features(tokens).ok())
            .map(|tokens| bomlogic::expression::render(&tokens));

        if self.json {
            let outcome = Outcome {
                valid: result.is_ok(),
                violation: result.as_ref().err(),
                expanded,
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            match &result {
                Ok(_) => {
                    println!("{}", "valid".success());
                    if let Some(expanded) = expanded.filter(|e| *e != self.expression) {
                        println!("{}", format!("expands to: {expanded}").dim());
                    }
                }
                Err(violation) => {
                    println!("{} [{}] {violation}", "invalid".error(), violation.reason.code());
                }
            }
        }

        if let Err(violation) = result {
            anyhow::bail!("expression is invalid: {violation}");
        }
        Ok(())
    }
}

fn infer_profile(text: &str) -> Profile {
    match tokenize(text).ok().as_deref() {
        Some([Token::Keyword(keyword), ..]) if keyword.is_condition() => Profile::DynamicRule,
        Some(tokens) if tokens.iter().any(|t| matches!(t, Token::Relation(_))) => {
            Profile::StaticRule
        }
        _ => Profile::StaticCondition,
    }
}

/// Feeds tokens one at a time, as an editor would, reporting each.
fn trace(validator: &Validator<'_>, text: &str, profile: Profile) {
    let tokens = match tokenize(text) {
        Ok(tokens) => tokens,
        Err(error) => {
            println!("{} {error}", "lex error".error());
            return;
        }
    };
    let mut session = validator.session(profile);
    for token in &tokens {
        match session.push(token) {
            Ok(()) => println!("  {} {token}", "✓".success()),
            Err(violation) => {
                println!("  {} {token}  {}", "✗".error(), violation.reason.code().dim());
            }
        }
    }
    match session.finish() {
        Ok(()) => println!("  {}", "complete".success()),
        Err(violation) => println!("  {} {}", "incomplete".warning(), violation.reason.code()),
    }
}
