//! An in-memory code catalog.
//!
//! The catalog is the data source behind [`CodeUniverse`]: it knows which
//! feature codes exist, which option codes each feature offers, which BOM
//! codes exist, and how to describe each of them. It is loaded from a TOML
//! file of the form
//!
//! ```toml
//! [features.F10]
//! description = "Seating"
//!
//! [features.F10.options]
//! "K-200-000017" = "Seat 2a Z-rack"
//!
//! [bom]
//! "1139101" = "Airbag module"
//! ```

use std::{collections::BTreeMap, io, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use super::code::{CatalogError, CodeUniverse};

/// A feature and the option codes selectable for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Human-readable name of the feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Option codes mapped to their descriptions.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// A catalog of feature, option and BOM codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    features: BTreeMap<String, Feature>,
    #[serde(default)]
    bom: BTreeMap<String, String>,
    #[serde(skip)]
    owners: BTreeMap<String, String>,
}

/// Errors raised while loading a catalog file.
#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    /// The catalog file could not be read.
    #[error("failed to read catalog: {0}")]
    Io(#[from] io::Error),
    /// The catalog file is not valid TOML.
    #[error("failed to parse catalog: {0}")]
    Toml(#[from] toml::de::Error),
    /// The same option code is listed under two features.
    #[error("option {option} is listed under both {first} and {second}")]
    DuplicateOption {
        /// The repeated option code.
        option: String,
        /// The feature it was first seen under.
        first: String,
        /// The feature it was seen under again.
        second: String,
    },
}

impl Catalog {
    /// Loads a catalog from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// lists an option under more than one feature.
    pub fn load(path: &Path) -> Result<Self, CatalogLoadError> {
        let content = std::fs::read_to_string(path)?;
        let catalog = content.parse()?;
        tracing::debug!("Loaded catalog from {}", path.display());
        Ok(catalog)
    }

    /// Adds a feature with its options, returning the updated catalog.
    #[must_use]
    pub fn with_feature<'a>(
        mut self,
        code: &str,
        description: &str,
        options: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let options: BTreeMap<String, String> = options
            .into_iter()
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .collect();
        for option in options.keys() {
            self.owners.insert(option.clone(), code.to_string());
        }
        self.features.insert(
            code.to_string(),
            Feature {
                description: Some(description.to_string()),
                options,
            },
        );
        self
    }

    /// Adds a BOM code, returning the updated catalog.
    #[must_use]
    pub fn with_bom(mut self, code: &str, description: &str) -> Self {
        self.bom.insert(code.to_string(), description.to_string());
        self
    }

    /// The feature an option code belongs to.
    #[must_use]
    pub fn feature_of(&self, option: &str) -> Option<&str> {
        self.owners.get(option).map(String::as_str)
    }

    /// Iterates over all features in code order.
    pub fn features(&self) -> impl Iterator<Item = (&str, &Feature)> {
        self.features.iter().map(|(code, f)| (code.as_str(), f))
    }

    /// Number of BOM codes in the catalog.
    #[must_use]
    pub fn bom_len(&self) -> usize {
        self.bom.len()
    }

    fn index_owners(&mut self) -> Result<(), CatalogLoadError> {
        self.owners.clear();
        for (feature, entry) in &self.features {
            for option in entry.options.keys() {
                if let Some(first) = self.owners.insert(option.clone(), feature.clone()) {
                    return Err(CatalogLoadError::DuplicateOption {
                        option: option.clone(),
                        first,
                        second: feature.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Catalog {
    type Err = CatalogLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut catalog: Self = toml::from_str(s)?;
        catalog.index_owners()?;
        Ok(catalog)
    }
}

impl CodeUniverse for Catalog {
    fn is_feature_code(&self, code: &str) -> Result<bool, CatalogError> {
        Ok(self.features.contains_key(code))
    }

    fn is_option_code(&self, code: &str) -> Result<bool, CatalogError> {
        Ok(self.owners.contains_key(code))
    }

    fn options_of(&self, feature: &str) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .features
            .get(feature)
            .map(|f| f.options.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn is_bom_code(&self, code: &str) -> Result<bool, CatalogError> {
        Ok(self.bom.contains_key(code))
    }

    fn description_of(&self, code: &str) -> Result<Option<String>, CatalogError> {
        if let Some(feature) = self.features.get(code) {
            return Ok(feature.description.clone());
        }
        if let Some(owner) = self.owners.get(code) {
            return Ok(self
                .features
                .get(owner)
                .and_then(|f| f.options.get(code))
                .cloned());
        }
        Ok(self.bom.get(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
[features.F10]
description = "Seating"

[features.F10.options]
"K-200-000017" = "Seat 2a Z-rack"
"K-200-000246" = "Airbag"

[features.F20]
[features.F20.options]
"K-000-000020" = "MAN"

[bom]
"1139101" = "Airbag module"
"#;

    #[test]
    fn parses_features_options_and_bom() {
        let catalog: Catalog = SAMPLE.parse().unwrap();

        assert!(catalog.is_feature_code("F10").unwrap());
        assert!(catalog.is_option_code("K-000-000020").unwrap());
        assert!(!catalog.is_option_code("K-999-999999").unwrap());
        assert!(catalog.is_bom_code("1139101").unwrap());
        assert_eq!(
            catalog.options_of("F10").unwrap(),
            vec!["K-200-000017".to_string(), "K-200-000246".to_string()]
        );
        assert_eq!(catalog.feature_of("K-200-000246"), Some("F10"));
        assert_eq!(catalog.bom_len(), 1);
    }

    #[test]
    fn describes_every_code_family() {
        let catalog: Catalog = SAMPLE.parse().unwrap();

        assert_eq!(
            catalog.description_of("F10").unwrap().as_deref(),
            Some("Seating")
        );
        assert_eq!(
            catalog.description_of("K-200-000246").unwrap().as_deref(),
            Some("Airbag")
        );
        assert_eq!(
            catalog.description_of("1139101").unwrap().as_deref(),
            Some("Airbag module")
        );
        assert_eq!(catalog.description_of("F20").unwrap(), None);
        assert_eq!(catalog.description_of("nope").unwrap(), None);
    }

    #[test]
    fn rejects_option_listed_twice() {
        let doc = r#"
[features.F1.options]
"K1" = "a"
[features.F2.options]
"K1" = "b"
"#;
        let error = doc.parse::<Catalog>().unwrap_err();
        assert!(matches!(error, CatalogLoadError::DuplicateOption { .. }));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert_eq!(catalog.features().count(), 2);
    }

    #[test]
    fn builder_matches_parsed_membership() {
        let catalog = Catalog::default()
            .with_feature("F10", "Seating", [("K1", "one"), ("K2", "two")])
            .with_bom("PL-7", "Placeholder");

        assert!(catalog.is_option_code("K2").unwrap());
        assert_eq!(catalog.feature_of("K1"), Some("F10"));
        assert!(catalog.is_bom_code("PL-7").unwrap());
    }
}
