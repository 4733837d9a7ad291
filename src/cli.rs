use std::path::{Path, PathBuf};

mod add;
mod check;
mod exchange;
mod format;
mod list;
mod show;
mod status;
mod terminal;

use add::{Add, Edit};
use bomlogic::{
    Catalog, CodeUniverse, Config, PatternUniverse, RecordFailure, Repository, RuleId,
};
use check::Check;
use clap::ArgAction;
use exchange::{Export, Import, Index};
use format::Format;
use list::List;
use show::Show;
use status::Status;
use terminal::Colorize;
use tracing::{debug, instrument, warn};

/// Name of the directory holding configuration, catalog and rule file.
const DATA_DIR: &str = ".bl";

/// Parse a rule ID from a string, normalizing to uppercase.
fn parse_rule_id(s: &str) -> Result<RuleId, String> {
    s.to_uppercase().parse().map_err(|e| format!("{e}"))
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The project root, containing the `.bl` directory
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show rule counts and unsaved-session state (default)
    Status(Status),

    /// Initialize a new rule repository
    Init,

    /// Check an expression without storing it
    Check(Check),

    /// Create a rule
    Add(Add),

    /// Change a rule's expression, status, tags or description
    Edit(Edit),

    /// Delete a rule
    Delete(Delete),

    /// List rules with filters
    List(List),

    /// Show a rule in vertical form
    Show(Show),

    /// Convert an expression between one-line and vertical form
    Format(Format),

    /// Hand every rule off to an exchange document and clear the repository
    ///
    /// Export is destructive: the next editing session starts empty.
    Export(Export),

    /// Replace every rule with those in an exchange document
    Import(Import),

    /// Write the cross-referenced index document
    Index(Index),

    /// Drop every rule without exporting
    Discard(Discard),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(&root)?,
            Self::Init => Init::run(&root)?,
            Self::Check(command) => command.run(&root)?,
            Self::Add(command) => command.run(&root)?,
            Self::Edit(command) => command.run(&root)?,
            Self::Delete(command) => command.run(&root)?,
            Self::List(command) => command.run(&root)?,
            Self::Show(command) => command.run(&root)?,
            Self::Format(command) => command.run(&root)?,
            Self::Export(command) => command.run(&root)?,
            Self::Import(command) => command.run(&root)?,
            Self::Index(command) => command.run(&root)?,
            Self::Discard(command) => command.run(&root)?,
        }
        Ok(())
    }
}

fn load_config(root: &Path) -> Config {
    let path = root.join(DATA_DIR).join("config.toml");
    Config::load(&path).unwrap_or_else(|e| {
        debug!("Failed to load config: {e}");
        Config::default()
    })
}

/// The code universe for `root`: the catalog if one exists, otherwise the
/// shape-only universe if the configuration allows it.
fn load_universe(root: &Path, config: &Config) -> anyhow::Result<Option<Box<dyn CodeUniverse>>> {
    let path = root.join(DATA_DIR).join(&config.catalog_file);
    if path.exists() {
        let catalog = Catalog::load(&path)?;
        debug!(
            "Loaded catalog with {} features from {}",
            catalog.features().count(),
            path.display()
        );
        return Ok(Some(Box::new(catalog)));
    }
    if config.allow_uncatalogued {
        debug!("No catalog at {}, checking code shapes only", path.display());
        return Ok(Some(Box::new(PatternUniverse)));
    }
    warn!(
        "No catalog at {}; every code will be rejected as unknown",
        path.display()
    );
    Ok(None)
}

/// Opens the repository under `root`, reporting any skipped records.
fn open_repository(root: &Path) -> anyhow::Result<Repository> {
    let config = load_config(root);
    let universe = load_universe(root, &config)?;
    let path = root.join(DATA_DIR).join(&config.rules_file);
    let (repository, failures) = Repository::open(path, config, universe)?;
    report_failures(&failures);
    Ok(repository)
}

fn report_failures(failures: &[RecordFailure]) {
    for failure in failures {
        eprintln!(
            "{} record {} ({}): {}",
            "skipped".warning(),
            failure.index,
            failure.id.as_deref().unwrap_or("no id"),
            failure.error
        );
    }
}

/// Asks the user to confirm, unless `yes` was given.
fn confirm(prompt: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

#[derive(Debug, clap::Parser)]
pub struct Init {}

impl Init {
    #[instrument]
    fn run(root: &Path) -> anyhow::Result<()> {
        use std::fs;

        let data_dir = root.join(DATA_DIR);
        if data_dir.exists() {
            anyhow::bail!("Repository already initialized (found existing {DATA_DIR} directory)");
        }

        fs::create_dir_all(&data_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create {DATA_DIR} directory: {e}"))?;

        let config = Config::default();
        config
            .save(&data_dir.join("config.toml"))
            .map_err(|e| anyhow::anyhow!("Failed to create config.toml: {e}"))?;

        fs::write(
            data_dir.join(&config.catalog_file),
            "# Features list their selectable options; BOM codes stand alone.\n\n\
             [features.F10]\ndescription = \"Example feature\"\n\n\
             [features.F10.options]\nK1 = \"First option\"\nK2 = \"Second option\"\n\n\
             [bom]\n\"1000001\" = \"Example BOM entry\"\n",
        )
        .map_err(|e| anyhow::anyhow!("Failed to create catalog: {e}"))?;

        println!("Initialized rule repository in {}", root.display());
        println!("  Created: {DATA_DIR}/config.toml");
        println!("  Created: {DATA_DIR}/{}", config.catalog_file.display());
        println!();
        println!("Next steps:");
        println!("  bl add \"K1 → 1000001\"");
        println!("  bl list");

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Delete {
    /// The rule to delete
    #[clap(value_parser = parse_rule_id)]
    id: RuleId,

    /// Skip confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

impl Delete {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut repository = open_repository(root)?;
        let digits = repository.config().digits();

        let Some(rule) = repository.get(self.id) else {
            anyhow::bail!("Rule {} not found", self.id.display(digits));
        };
        println!("{}  {}", self.id.display(digits), rule.expression());

        if !confirm("Delete this rule?", self.yes)? {
            println!("Cancelled");
            return Ok(());
        }

        repository.delete(self.id)?;
        println!("{} {}", "Deleted".success(), self.id.display(digits));
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Discard {
    /// Skip confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

impl Discard {
    #[instrument(level = "debug", skip(self))]
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut repository = open_repository(root)?;
        if repository.is_empty() {
            println!("Nothing to discard.");
            return Ok(());
        }

        let prompt = format!("Discard {} rules without exporting?", repository.len());
        if !confirm(&prompt, self.yes)? {
            println!("Cancelled");
            return Ok(());
        }

        let dropped = repository.discard()?;
        println!("{} {dropped} rules", "Discarded".warning());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bomlogic::Status;
    use tempfile::tempdir;

    use super::*;

    /// Initializes `root` and adds a catalog covering the test codes.
    pub(super) fn init_root(root: &Path) {
        Init::run(root).unwrap();
        fs::write(
            root.join(DATA_DIR).join("catalog.toml"),
            r#"
[features.F10]
description = "Seating"

[features.F10.options]
K1 = "Bench"
K2 = "Buckets"

[features.F20]
description = "Safety"

[features.F20.options]
K3 = "Airbag"

[bom]
"1139101" = "Airbag module"
"#,
        )
        .unwrap();
    }

    #[test]
    fn init_creates_config_and_catalog() {
        let tmp = tempdir().unwrap();

        Init::run(tmp.path()).unwrap();

        assert!(tmp.path().join(".bl/config.toml").exists());
        assert!(tmp.path().join(".bl/catalog.toml").exists());
        assert!(Init::run(tmp.path()).is_err());
    }

    #[test]
    fn init_catalog_is_loadable() {
        let tmp = tempdir().unwrap();
        Init::run(tmp.path()).unwrap();

        let repository = open_repository(tmp.path()).unwrap();

        assert!(repository.universe().is_some());
    }

    #[test]
    fn delete_removes_rule() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        let mut repository = open_repository(tmp.path()).unwrap();
        let rule = repository.create("K1 → 1139101", Status::Enabled).unwrap();

        Delete {
            id: rule.id(),
            yes: true,
        }
        .run(tmp.path())
        .unwrap();

        assert!(open_repository(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_rule_fails() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());

        let result = Delete {
            id: "BL07".parse().unwrap(),
            yes: true,
        }
        .run(tmp.path());

        assert!(result.is_err());
    }

    #[test]
    fn discard_clears_rules() {
        let tmp = tempdir().unwrap();
        init_root(tmp.path());
        let mut repository = open_repository(tmp.path()).unwrap();
        repository.create("K1 → 1139101", Status::Enabled).unwrap();

        Discard { yes: true }.run(tmp.path()).unwrap();

        assert!(open_repository(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn rule_ids_are_case_insensitive() {
        assert_eq!(parse_rule_id("bl03").unwrap().to_string(), "BL03");
        assert!(parse_rule_id("XX03").is_err());
    }
}
