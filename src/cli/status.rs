use std::{collections::BTreeMap, path::Path};

use bomlogic::{Repository, Status as RuleStatus};
use clap::Parser;
use serde::Serialize;
use tracing::instrument;

use super::terminal::{Colorize, is_narrow};

#[derive(Debug, Parser, Default)]
#[command(about = "Show rule counts and unsaved-session state")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    /// Rule counts per ID prefix.
    prefixes: BTreeMap<String, usize>,
    /// Rule counts per status.
    statuses: BTreeMap<&'static str, usize>,
    total: usize,
    exported: bool,
    unsaved: bool,
    saved_at: Option<String>,
}

impl Summary {
    fn of(repository: &Repository) -> Self {
        let mut summary = Self {
            exported: repository.exported(),
            unsaved: repository.has_unsaved_rules(),
            saved_at: repository.saved_at().map(|t| t.to_rfc3339()),
            ..Self::default()
        };
        for status in [RuleStatus::Enabled, RuleStatus::Testing, RuleStatus::Disabled] {
            summary.statuses.insert(status.as_str(), 0);
        }
        for rule in repository.iter() {
            *summary
                .prefixes
                .entry(rule.id().prefix().to_string())
                .or_insert(0) += 1;
            *summary.statuses.entry(rule.status().as_str()).or_insert(0) += 1;
            summary.total += 1;
        }
        summary
    }
}

impl Status {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let repository = super::open_repository(root)?;
        let summary = Summary::of(&repository);

        match self.output {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            OutputFormat::Table if self.quiet => {
                println!(
                    "total={} exported={} unsaved={}",
                    summary.total, summary.exported, summary.unsaved
                );
            }
            OutputFormat::Table => Self::output_table(&summary),
        }
        Ok(())
    }

    fn output_table(summary: &Summary) {
        if summary.total == 0 {
            if summary.exported {
                println!("No rules. The last session was exported.");
            } else {
                println!("No rules found yet. Create one with 'bl add'.");
            }
            return;
        }

        println!("Rule counts");
        println!("{}", "───────────".dim());
        if is_narrow() {
            for (prefix, count) in &summary.prefixes {
                println!("{prefix}: {count}");
            }
            println!("Total: {}", summary.total);
        } else {
            println!("{:<10} {:<6}", "Prefix", "Count");
            for (prefix, count) in &summary.prefixes {
                println!("{prefix:<10} {count:<6}");
            }
            println!("Total      {}", summary.total);
        }

        println!();
        let statuses: Vec<String> = summary
            .statuses
            .iter()
            .map(|(status, count)| format!("{status} {count}"))
            .collect();
        println!("Status: {}", statuses.join(", "));

        println!();
        if summary.unsaved {
            println!("Unsaved session: {} ⚠️", "yes".warning());
            println!(
                "{}",
                "Run 'bl export <file>' to hand the rules off, or 'bl discard' to drop them."
                    .dim()
            );
        } else {
            println!("Unsaved session: {} ✅", "no".success());
        }
        if let Some(saved_at) = &summary.saved_at {
            println!("{}", format!("Last saved {saved_at}").dim());
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::cli::{open_repository, tests::init_root};

    #[test]
    fn summary_counts_prefixes_and_statuses() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        let mut repository = open_repository(tmp.path()).unwrap();
        repository.create("K1 → 1139101", RuleStatus::Enabled).unwrap();
        repository.create("K2 → 1139101", RuleStatus::Testing).unwrap();
        repository
            .create("if K1 display [K2]", RuleStatus::Enabled)
            .unwrap();

        let summary = Summary::of(&repository);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.prefixes["BL"], 2);
        assert_eq!(summary.prefixes["TL"], 1);
        assert_eq!(summary.statuses["enabled"], 2);
        assert_eq!(summary.statuses["disabled"], 0);
        assert!(summary.unsaved);
    }

    #[test]
    fn run_on_empty_repository_succeeds() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());

        Status::default().run(tmp.path()).unwrap();
        Status {
            output: OutputFormat::Json,
            quiet: false,
        }
        .run(tmp.path())
        .unwrap();
    }
}
