use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    domain::rule_id::{DEFAULT_DIGITS, IdScheme},
    expression::{FeatureExpansion, VerticalStyle},
    storage::ExportLayout,
};

/// Configuration for a rule repository.
///
/// This struct holds settings that control how rule IDs are allocated, how
/// expressions are checked and rendered, and where data files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// The prefix scheme for new rule IDs.
    pub id_scheme: IdScheme,

    /// The number of digits in a rule ID.
    ///
    /// Numbers are padded to this width with leading zeros, e.g. `BL01` (2
    /// digits) or `BL001` (3 digits).
    digits: usize,

    /// How feature codes on the right of a relation expand into options.
    pub feature_expansion: FeatureExpansion,

    /// The shape of documents written by export.
    pub export_layout: ExportLayout,

    /// The default layout for vertical rendering.
    pub vertical_style: VerticalStyle,

    /// Whether vertical rendering annotates codes with descriptions.
    pub comments: bool,

    /// Where rules are persisted, relative to the configuration directory.
    pub rules_file: PathBuf,

    /// Where the code catalog is read from, relative to the configuration
    /// directory.
    pub catalog_file: PathBuf,

    /// Whether to accept any well-formed code when no catalog is available.
    ///
    /// When `false` (default) and the catalog is missing, every code is
    /// treated as unknown.
    pub allow_uncatalogued: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_scheme: IdScheme::default(),
            digits: default_digits(),
            feature_expansion: FeatureExpansion::default(),
            export_layout: ExportLayout::default(),
            vertical_style: VerticalStyle::default(),
            comments: true,
            rules_file: default_rules_file(),
            catalog_file: default_catalog_file(),
            allow_uncatalogued: false,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Returns the number of digits for padding rule numbers.
    #[must_use]
    pub const fn digits(&self) -> usize {
        self.digits
    }

    /// Sets the number of digits, clamped to at least one.
    pub fn set_digits(&mut self, digits: usize) {
        self.digits = digits.max(1);
    }
}

const fn default_digits() -> usize {
    DEFAULT_DIGITS
}

const fn default_true() -> bool {
    true
}

fn default_rules_file() -> PathBuf {
    PathBuf::from("rules.json")
}

fn default_catalog_file() -> PathBuf {
    PathBuf::from("catalog.toml")
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        id_scheme: IdScheme,

        #[serde(default = "default_digits")]
        digits: usize,

        #[serde(default)]
        feature_expansion: FeatureExpansion,

        #[serde(default)]
        export_layout: ExportLayout,

        #[serde(default)]
        vertical_style: VerticalStyle,

        #[serde(default = "default_true")]
        comments: bool,

        #[serde(default = "default_rules_file")]
        rules_file: PathBuf,

        #[serde(default = "default_catalog_file")]
        catalog_file: PathBuf,

        #[serde(default)]
        allow_uncatalogued: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                id_scheme,
                digits,
                feature_expansion,
                export_layout,
                vertical_style,
                comments,
                rules_file,
                catalog_file,
                allow_uncatalogued,
            } => Self {
                id_scheme,
                digits: digits.max(1),
                feature_expansion,
                export_layout,
                vertical_style,
                comments,
                rules_file,
                catalog_file,
                allow_uncatalogued,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            id_scheme: config.id_scheme,
            digits: config.digits,
            feature_expansion: config.feature_expansion,
            export_layout: config.export_layout,
            vertical_style: config.vertical_style,
            comments: config.comments,
            rules_file: config.rules_file,
            catalog_file: config.catalog_file,
            allow_uncatalogued: config.allow_uncatalogued,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\nid_scheme = \"legacy\"\ndigits = 3\nfeature_expansion = \"all\"\nexport_layout = \"flat\"\ncomments = false\nallow_uncatalogued = true\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.id_scheme, IdScheme::Legacy);
        assert_eq!(config.digits(), 3);
        assert_eq!(config.feature_expansion, FeatureExpansion::All);
        assert_eq!(config.export_layout, ExportLayout::Flat);
        assert!(!config.comments);
        assert!(config.allow_uncatalogued);
        assert_eq!(config.rules_file, PathBuf::from("rules.json"));
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(error.starts_with("Failed to read config file:"));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\ndigits = \"two\"\n").unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let mut config = Config::default();
        config.set_digits(4);
        config.vertical_style = VerticalStyle::Expanded;

        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
