use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::Context;
use bomlogic::{VerticalStyle, expression::to_horizontal};
use clap::Parser;
use tracing::instrument;

use super::show::Style;

#[derive(Debug, Parser)]
pub struct Format {
    /// The one-line expression to lay out vertically
    #[arg(required_unless_present = "horizontal")]
    expression: Option<String>,

    /// Read a vertical rendering from a file (`-` for stdin) and print it
    /// on one line
    #[arg(long, value_name = "FILE", conflicts_with = "expression")]
    horizontal: Option<PathBuf>,

    /// Vertical layout (default: from the configuration)
    #[arg(long, value_enum)]
    style: Option<Style>,

    /// Leave out code descriptions
    #[arg(long)]
    no_comments: bool,
}

impl Format {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        if let Some(source) = &self.horizontal {
            let vertical = read_source(source)?;
            println!("{}", to_horizontal(&vertical)?);
            return Ok(());
        }

        let expression = self.expression.unwrap_or_default();
        let repository = super::open_repository(root)?;
        let config = repository.config();
        let vertical = repository.formatter().to_vertical(
            &expression,
            self.style.map_or(config.vertical_style, VerticalStyle::from),
            config.comments && !self.no_comments,
        )?;
        println!("{vertical}");
        Ok(())
    }
}

fn read_source(source: &Path) -> anyhow::Result<String> {
    if source == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(source).with_context(|| format!("failed to read {}", source.display()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::cli::tests::init_root;

    #[test]
    fn formats_expression_vertically() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());

        Format {
            expression: Some("(K1 OR K2) AND K3 → 1139101".to_string()),
            horizontal: None,
            style: Some(Style::Expanded),
            no_comments: false,
        }
        .run(tmp.path())
        .unwrap();
    }

    #[test]
    fn reads_vertical_file_back() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("rule.txt");
        fs::write(&path, "K1  # Bench\nAND\nK3\n→\n1139101  # Airbag module\n").unwrap();

        assert_eq!(read_source(&path).unwrap().lines().count(), 5);
        Format {
            expression: None,
            horizontal: Some(path),
            style: None,
            no_comments: false,
        }
        .run(tmp.path())
        .unwrap();
    }

    #[test]
    fn rejects_text_without_relation() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());

        let result = Format {
            expression: Some("K1 AND K2".to_string()),
            horizontal: None,
            style: None,
            no_comments: true,
        }
        .run(tmp.path());

        assert!(result.is_err());
    }
}
