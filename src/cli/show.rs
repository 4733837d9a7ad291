use std::path::Path;

use bomlogic::{Formatter, Rule, RuleId, VerticalStyle};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::instrument;

use super::{
    parse_rule_id,
    terminal::{Colorize, status_label},
};

#[derive(Debug, Parser)]
pub struct Show {
    /// The rule to show
    #[clap(value_parser = parse_rule_id)]
    id: RuleId,

    /// Vertical layout (default: from the configuration)
    #[arg(long, value_enum)]
    style: Option<Style>,

    /// Leave out code descriptions
    #[arg(long)]
    no_comments: bool,

    /// Print the rule as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(super) enum Style {
    /// One block per `OR` alternative
    Grouped,
    /// One token per line, parentheses dropped
    Expanded,
}

impl From<Style> for VerticalStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Grouped => Self::Grouped,
            Style::Expanded => Self::Expanded,
        }
    }
}

#[derive(Debug, Serialize)]
struct View<'a> {
    id: String,
    kind: String,
    status: String,
    expression: String,
    vertical: String,
    summary: String,
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tech_doc_path: Option<&'a str>,
    created: String,
    modified: String,
    fingerprint: String,
}

impl<'a> View<'a> {
    fn of(
        rule: &'a Rule,
        formatter: Formatter<'_>,
        style: VerticalStyle,
        with_comments: bool,
        digits: usize,
    ) -> anyhow::Result<Self> {
        let expression = rule.expression();
        Ok(Self {
            id: rule.id().display(digits).to_string(),
            kind: rule.kind().to_string(),
            status: rule.status().to_string(),
            vertical: formatter.to_vertical(&expression, style, with_comments)?,
            summary: formatter.summarize(&expression)?,
            expression,
            tags: rule.tags().iter().map(|tag| tag.as_str()).collect(),
            description: rule.description(),
            tech_doc_path: rule.tech_doc_path(),
            created: rule.created().to_rfc3339(),
            modified: rule.modified().to_rfc3339(),
            fingerprint: rule.fingerprint(),
        })
    }
}

impl Show {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let repository = super::open_repository(root)?;
        let digits = repository.config().digits();
        let Some(rule) = repository.get(self.id) else {
            anyhow::bail!("Rule {} not found", self.id.display(digits));
        };

        let config = repository.config();
        let view = View::of(
            rule,
            repository.formatter(),
            self.style.map_or(config.vertical_style, VerticalStyle::from),
            config.comments && !self.no_comments,
            digits,
        )?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&view)?);
            return Ok(());
        }

        println!(
            "{}  {}  {}",
            view.id.info(),
            status_label(rule.status()),
            view.kind.dim()
        );
        println!();
        println!("{}", view.vertical);
        println!();
        println!("{}", view.summary.dim());
        if let Some(description) = view.description {
            println!();
            println!("{description}");
        }
        if !view.tags.is_empty() {
            println!("{}", format!("tags: {}", view.tags.join(", ")).dim());
        }
        if let Some(path) = view.tech_doc_path {
            println!("{}", format!("doc: {path}").dim());
        }
        println!(
            "{}",
            format!("modified {}  fingerprint {}", view.modified, &view.fingerprint[..12]).dim()
        );
        Ok(())
    }
}
