use std::path::Path;

use bomlogic::{Repository, Rule, RuleDetails, RuleError, RuleId, RuleUpdate, Status, Tag};
use clap::Parser;
use tracing::instrument;

use super::{parse_rule_id, terminal::Colorize};

fn parse_tag(s: &str) -> Result<Tag, String> {
    Tag::new(s).map_err(|e| e.to_string())
}

#[derive(Debug, Parser)]
pub struct Add {
    /// The rule, e.g. `K1 AND K2 → 1139101` or `if K1 display [K2]`
    expression: String,

    /// Initial status
    #[arg(long, default_value_t)]
    status: Status,

    /// Tags (comma-separated)
    #[arg(long, value_delimiter = ',', value_parser = parse_tag)]
    tag: Vec<Tag>,

    /// A free-text description
    #[arg(long)]
    description: Option<String>,

    /// Path to a technical document
    #[arg(long, value_name = "PATH")]
    doc: Option<String>,
}

impl Add {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut repository = super::open_repository(root)?;
        let rule = create(&mut repository, self)?;
        report("Added", &repository, &rule);
        Ok(())
    }
}

fn create(repository: &mut Repository, add: Add) -> Result<Rule, RuleError> {
    let details = RuleDetails {
        tags: add.tag.into_iter().collect(),
        description: add.description,
        tech_doc_path: add.doc,
    };
    repository.create_with(&add.expression, add.status, details)
}

#[derive(Debug, Parser)]
pub struct Edit {
    /// The rule to change
    #[clap(value_parser = parse_rule_id)]
    id: RuleId,

    /// A new expression of the same kind
    #[arg(long = "expr", value_name = "EXPRESSION")]
    expression: Option<String>,

    /// A new status
    #[arg(long)]
    status: Option<Status>,

    /// Replace the tags (comma-separated)
    #[arg(long, value_delimiter = ',', value_parser = parse_tag, conflicts_with = "clear_tags")]
    tag: Vec<Tag>,

    /// Remove every tag
    #[arg(long)]
    clear_tags: bool,

    /// A new description; an empty string removes it
    #[arg(long)]
    description: Option<String>,

    /// A new technical document path; an empty string removes it
    #[arg(long, value_name = "PATH")]
    doc: Option<String>,
}

impl Edit {
    fn to_update(&self) -> RuleUpdate {
        let tags = if self.clear_tags {
            Some(Default::default())
        } else {
            (!self.tag.is_empty()).then(|| self.tag.iter().cloned().collect())
        };
        RuleUpdate {
            expression: self.expression.clone(),
            status: self.status,
            tags,
            description: self.description.clone().map(non_blank),
            tech_doc_path: self.doc.clone().map(non_blank),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let update = self.to_update();
        if update == RuleUpdate::default() {
            anyhow::bail!("Nothing to change. Pass --expr, --status, --tag, --description or --doc.");
        }

        let mut repository = super::open_repository(root)?;
        let rule = repository.update(self.id, update)?;
        report("Updated", &repository, &rule);
        Ok(())
    }
}

fn non_blank(s: String) -> Option<String> {
    (!s.trim().is_empty()).then_some(s)
}

fn report(verb: &str, repository: &Repository, rule: &Rule) {
    let digits = repository.config().digits();
    println!(
        "{} {}  {}",
        verb.success(),
        rule.id().display(digits),
        rule.expression()
    );
    if !rule.tags().is_empty() {
        let tags: Vec<&str> = rule.tags().iter().map(Tag::as_str).collect();
        println!("{}", format!("tags: {}", tags.join(", ")).dim());
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::cli::{open_repository, tests::init_root};

    fn add(expression: &str) -> Add {
        Add {
            expression: expression.to_string(),
            status: Status::Enabled,
            tag: Vec::new(),
            description: None,
            doc: None,
        }
    }

    fn edit(id: &str) -> Edit {
        Edit {
            id: id.parse().unwrap(),
            expression: None,
            status: None,
            tag: Vec::new(),
            clear_tags: false,
            description: None,
            doc: None,
        }
    }

    #[test]
    fn add_stores_rule_with_metadata() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());

        Add {
            tag: vec![parse_tag("seating").unwrap()],
            description: Some("bench needs the module".to_string()),
            ..add("K1 → 1139101")
        }
        .run(tmp.path())
        .unwrap();

        let repository = open_repository(tmp.path()).unwrap();
        let rule = repository.iter().next().unwrap();
        assert_eq!(rule.id().to_string(), "BL01");
        assert_eq!(rule.tags().len(), 1);
        assert_eq!(rule.description(), Some("bench needs the module"));
        assert_eq!(rule.created(), rule.modified());
    }

    #[test]
    fn add_rejects_invalid_expression() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());

        assert!(add("K1 → → 1139101").run(tmp.path()).is_err());
        assert!(open_repository(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn edit_changes_status_and_clears_description() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        Add {
            description: Some("draft".to_string()),
            ..add("K1 → 1139101")
        }
        .run(tmp.path())
        .unwrap();

        Edit {
            status: Some(Status::Testing),
            description: Some(String::new()),
            ..edit("BL01")
        }
        .run(tmp.path())
        .unwrap();

        let repository = open_repository(tmp.path()).unwrap();
        let rule = repository.get("BL01".parse().unwrap()).unwrap();
        assert_eq!(rule.status(), Status::Testing);
        assert_eq!(rule.description(), None);
    }

    #[test]
    fn edit_without_changes_fails() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        add("K1 → 1139101").run(tmp.path()).unwrap();

        assert!(edit("BL01").run(tmp.path()).is_err());
    }

    #[test]
    fn edit_cannot_change_kind() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        add("K1 → 1139101").run(tmp.path()).unwrap();

        let result = Edit {
            expression: Some("if K1 display [K2]".to_string()),
            ..edit("BL01")
        }
        .run(tmp.path());

        assert!(result.is_err());
    }
}
