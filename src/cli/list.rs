use std::{fmt, path::Path};

use anyhow::Context;
use bomlogic::{Rule, RuleKind, Status};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::instrument;

use super::terminal::{Colorize, terminal_width};

/// Command arguments for `bl list`.
#[derive(Debug, Parser, Default)]
#[command(about = "List rules with filters")]
pub struct List {
    /// Columns to display (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "COL", value_enum)]
    columns: Vec<ListColumn>,

    /// Output format (default: table).
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,

    /// Suppress headers and format rows for scripting.
    #[arg(long)]
    quiet: bool,

    /// Filter by status (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "STATUS")]
    status: Vec<Status>,

    /// Filter by kind.
    #[arg(long, value_enum)]
    kind: Option<KindFilter>,

    /// Filter by tag (comma-separated, case-insensitive).
    #[arg(long, value_delimiter = ',', value_name = "TAG")]
    tag: Vec<String>,

    /// Only rules whose expression mentions this code.
    #[arg(long, value_name = "CODE")]
    code: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum KindFilter {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ListColumn {
    Id,
    Kind,
    Status,
    Expression,
    Tags,
    Description,
    Modified,
}

#[derive(Debug, Serialize)]
struct SerializableRow<'a> {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<RuleKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
}

impl List {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let repository = super::open_repository(root)?;
        let digits = repository.config().digits();

        let rules: Vec<&Rule> = repository.iter().filter(|rule| self.matches(rule)).collect();

        if rules.is_empty() && self.output == OutputFormat::Table && !self.quiet {
            println!("{}", "No matching rules.".dim());
            return Ok(());
        }

        match self.output {
            OutputFormat::Table => render_table(&rules, &self.columns, self.quiet, digits),
            OutputFormat::Json => render_json(&rules, &self.columns, digits)?,
            OutputFormat::Csv => render_csv(&rules, &self.columns, self.quiet, digits),
        }
        Ok(())
    }

    fn matches(&self, rule: &Rule) -> bool {
        if !self.status.is_empty() && !self.status.contains(&rule.status()) {
            return false;
        }
        match self.kind {
            Some(KindFilter::Static) if rule.kind() != RuleKind::Static => return false,
            Some(KindFilter::Dynamic) if rule.kind() != RuleKind::Dynamic => return false,
            _ => {}
        }
        if !self.tag.is_empty()
            && !rule.tags().iter().any(|tag| {
                self.tag
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(tag.as_str()))
            })
        {
            return false;
        }
        if let Some(code) = &self.code {
            let mentions = |text: &str| {
                text.split(|c: char| c.is_whitespace() || "()[],".contains(c))
                    .any(|word| word.eq_ignore_ascii_case(code))
            };
            if !mentions(rule.condition()) && !mentions(rule.action()) {
                return false;
            }
        }
        true
    }
}

fn render_table(rules: &[&Rule], columns: &[ListColumn], quiet: bool, digits: usize) {
    let selected_columns = if columns.is_empty() {
        if quiet {
            vec![ListColumn::Id]
        } else {
            vec![
                ListColumn::Id,
                ListColumn::Status,
                ListColumn::Expression,
                ListColumn::Tags,
            ]
        }
    } else {
        columns.to_vec()
    };

    let data: Vec<Vec<String>> = rules
        .iter()
        .map(|rule| {
            selected_columns
                .iter()
                .map(|column| column.value(rule, digits))
                .collect()
        })
        .collect();

    if quiet {
        for row in data {
            println!("{}", row.join("\t"));
        }
        return;
    }

    let headers: Vec<&str> = selected_columns.iter().map(|c| c.header()).collect();
    let mut widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            data.iter()
                .map(|row| row[idx].chars().count())
                .max()
                .unwrap_or(0)
                .max(header.len())
        })
        .collect();

    // Squeeze the expression column to fit the terminal.
    if let (Some(width), Some(idx)) = (
        terminal_width(),
        selected_columns
            .iter()
            .position(|c| *c == ListColumn::Expression),
    ) {
        let others: usize = widths
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, w)| w + 2)
            .sum();
        let available = usize::from(width).saturating_sub(others + 2);
        widths[idx] = widths[idx].min(available.max(headers[idx].len()));
    }

    for (header, width) in headers.iter().zip(&widths) {
        print!("{header:<width$}  ");
    }
    println!();
    for width in &widths {
        print!("{:-<width$}  ", "");
    }
    println!();

    for row in data {
        for (value, width) in row.iter().zip(&widths) {
            print!("{:<width$}  ", truncate(value, *width));
        }
        println!();
    }
}

fn render_json(rules: &[&Rule], columns: &[ListColumn], digits: usize) -> anyhow::Result<()> {
    let selected_columns = if columns.is_empty() {
        vec![
            ListColumn::Id,
            ListColumn::Kind,
            ListColumn::Status,
            ListColumn::Expression,
            ListColumn::Tags,
            ListColumn::Description,
            ListColumn::Modified,
        ]
    } else {
        columns.to_vec()
    };

    let rows: Vec<_> = rules
        .iter()
        .map(|rule| build_serializable_row(rule, &selected_columns, digits))
        .collect();

    serde_json::to_writer_pretty(std::io::stdout(), &rows)
        .context("failed to render json output")?;
    println!();
    Ok(())
}

fn render_csv(rules: &[&Rule], columns: &[ListColumn], quiet: bool, digits: usize) {
    let selected_columns = if columns.is_empty() {
        vec![
            ListColumn::Id,
            ListColumn::Kind,
            ListColumn::Status,
            ListColumn::Expression,
            ListColumn::Tags,
            ListColumn::Description,
        ]
    } else {
        columns.to_vec()
    };

    if !quiet {
        let header_line = selected_columns
            .iter()
            .map(|column| csv_escape(column.header()))
            .collect::<Vec<_>>()
            .join(",");
        println!("{header_line}");
    }

    for rule in rules {
        let values: Vec<String> = selected_columns
            .iter()
            .map(|column| csv_escape(&column.value(rule, digits)))
            .collect();
        println!("{}", values.join(","));
    }
}

fn build_serializable_row<'a>(
    rule: &'a Rule,
    columns: &[ListColumn],
    digits: usize,
) -> SerializableRow<'a> {
    let has = |column| columns.contains(&column);
    SerializableRow {
        id: rule.id().display(digits).to_string(),
        kind: has(ListColumn::Kind).then(|| rule.kind()),
        status: has(ListColumn::Status).then(|| rule.status()),
        expression: has(ListColumn::Expression).then(|| rule.expression()),
        tags: has(ListColumn::Tags).then(|| rule.tags().iter().map(|t| t.as_str()).collect()),
        description: if has(ListColumn::Description) {
            rule.description()
        } else {
            None
        },
        modified: has(ListColumn::Modified).then(|| rule.modified().to_rfc3339()),
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}…")
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl ListColumn {
    const fn header(self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Kind => "Kind",
            Self::Status => "Status",
            Self::Expression => "Expression",
            Self::Tags => "Tags",
            Self::Description => "Description",
            Self::Modified => "Modified",
        }
    }

    fn value(self, rule: &Rule, digits: usize) -> String {
        match self {
            Self::Id => rule.id().display(digits).to_string(),
            Self::Kind => rule.kind().to_string(),
            Self::Status => rule.status().to_string(),
            Self::Expression => rule.expression(),
            Self::Tags => rule
                .tags()
                .iter()
                .map(|tag| tag.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Self::Description => rule.description().unwrap_or_default().to_string(),
            Self::Modified => rule.modified().to_rfc3339(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

#[cfg(test)]
mod tests {
    use bomlogic::Tag;
    use tempfile::tempdir;

    use super::*;
    use crate::cli::{open_repository, tests::init_root};

    #[test]
    fn filters_by_status_kind_tag_and_code() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        let mut repository = open_repository(tmp.path()).unwrap();
        let first = repository.create("K1 → 1139101", Status::Enabled).unwrap();
        repository.create("K2 → K3", Status::Testing).unwrap();
        repository
            .create("if K1 display [K2]", Status::Enabled)
            .unwrap();
        repository
            .set_tags(first.id(), Tag::parse_list("airbag"))
            .unwrap();

        let select = |list: &List| -> Vec<String> {
            repository
                .iter()
                .filter(|rule| list.matches(rule))
                .map(|rule| rule.id().to_string())
                .collect()
        };

        let by_status = List {
            status: vec![Status::Testing],
            ..List::default()
        };
        assert_eq!(select(&by_status), ["BL02"]);

        let by_kind = List {
            kind: Some(KindFilter::Dynamic),
            ..List::default()
        };
        assert_eq!(select(&by_kind), ["TL01"]);

        let by_tag = List {
            tag: vec!["AIRBAG".to_string()],
            ..List::default()
        };
        assert_eq!(select(&by_tag), ["BL01"]);

        let by_code = List {
            code: Some("k2".to_string()),
            ..List::default()
        };
        assert_eq!(select(&by_code), ["BL02", "TL01"]);
    }

    #[test]
    fn json_row_includes_only_selected_columns() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        let mut repository = open_repository(tmp.path()).unwrap();
        let rule = repository.create("K1 → 1139101", Status::Enabled).unwrap();

        let row = build_serializable_row(&rule, &[ListColumn::Id, ListColumn::Status], 3);
        let value = serde_json::to_value(&row).unwrap();

        assert_eq!(value["id"], "BL001");
        assert_eq!(value["status"], "enabled");
        assert!(value.get("expression").is_none());
    }

    #[test]
    fn csv_values_are_escaped() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a, b"), "\"a, b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn long_values_are_truncated() {
        assert_eq!(truncate("K1 AND K2", 20), "K1 AND K2");
        assert_eq!(truncate("K1 AND K2", 5), "K1 A…");
    }

    #[test]
    fn run_succeeds_for_each_format() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        let mut repository = open_repository(tmp.path()).unwrap();
        repository.create("K1 → 1139101", Status::Enabled).unwrap();

        for output in [OutputFormat::Table, OutputFormat::Json, OutputFormat::Csv] {
            List {
                output,
                ..List::default()
            }
            .run(tmp.path())
            .unwrap();
        }
    }
}
