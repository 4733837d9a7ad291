use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::instrument;

use super::{confirm, report_failures, terminal::Colorize};

#[derive(Debug, Parser)]
pub struct Export {
    /// Where to write the exchange document
    file: PathBuf,

    /// Skip confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

impl Export {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut repository = super::open_repository(root)?;
        if repository.is_empty() {
            println!("Nothing to export.");
            return Ok(());
        }

        let prompt = format!(
            "Export {} rules to {}? The repository will be cleared.",
            repository.len(),
            self.file.display()
        );
        if !confirm(&prompt, self.yes)? {
            println!("Cancelled");
            return Ok(());
        }

        let document = repository.export_to(&self.file)?;
        println!(
            "{} {} rules to {}",
            "Exported".success(),
            document.len(),
            self.file.display()
        );
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct Import {
    /// The exchange document to read
    file: PathBuf,

    /// Skip confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

impl Import {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut repository = super::open_repository(root)?;
        if repository.has_unsaved_rules() {
            let prompt = format!(
                "Replace {} unexported rules with {}?",
                repository.len(),
                self.file.display()
            );
            if !confirm(&prompt, self.yes)? {
                println!("Cancelled");
                return Ok(());
            }
        }

        let report = repository.import_from(&self.file)?;
        report_failures(&report.failures);
        println!("{} {} rules", "Imported".success(), report.imported);
        if !report.failures.is_empty() {
            println!(
                "{}",
                format!("{} records skipped", report.failures.len()).warning()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct Index {
    /// Where to write the index document
    #[arg(default_value = "rule_index.json")]
    file: PathBuf,
}

impl Index {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let repository = super::open_repository(root)?;
        let index = repository.index();
        index
            .write(&self.file)
            .with_context(|| format!("failed to write {}", self.file.display()))?;
        println!(
            "{} {} rules, {} option codes, {} BOM codes to {}",
            "Indexed".success(),
            index.metadata.total_rules,
            index.indexes.by_option_code.len(),
            index.indexes.by_bom_code.len(),
            self.file.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bomlogic::Status;
    use tempfile::tempdir;

    use super::*;
    use crate::cli::{open_repository, tests::init_root};

    #[test]
    fn export_then_import_restores_rules() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        let mut repository = open_repository(tmp.path()).unwrap();
        repository.create("K1 → 1139101", Status::Enabled).unwrap();
        repository.create("if K1 display [K2]", Status::Testing).unwrap();
        let file = tmp.path().join("handoff.json");

        Export {
            file: file.clone(),
            yes: true,
        }
        .run(tmp.path())
        .unwrap();

        let repository = open_repository(tmp.path()).unwrap();
        assert!(repository.is_empty());
        assert!(repository.exported());

        Import { file, yes: true }.run(tmp.path()).unwrap();

        let repository = open_repository(tmp.path()).unwrap();
        assert_eq!(repository.len(), 2);
        assert!(!repository.exported());
    }

    #[test]
    fn import_of_document_without_rules_fails() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        let file = tmp.path().join("empty.json");
        fs::write(&file, r#"{"exported_at": "today"}"#).unwrap();

        let result = Import { file, yes: true }.run(tmp.path());

        assert!(result.is_err());
    }

    #[test]
    fn index_is_written() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        open_repository(tmp.path())
            .unwrap()
            .create("K1 AND K2 → 1139101", Status::Enabled)
            .unwrap();
        let file = tmp.path().join("index.json");

        Index { file: file.clone() }.run(tmp.path()).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(written["metadata"]["total_rules"], 1);
        assert_eq!(written["indexes"]["by_bom_code"]["1139101"][0]["rule_id"], "BL01");
    }
}
