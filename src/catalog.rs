//! Reference Catalog - businesses and the experiences they deploy
//!
//! Loaded once from a static CSV export. Every business/experience pair that
//! reaches the query builder is checked against this catalog first.

use crate::error::{Result, SqiError};
use csv::ReaderBuilder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub business_id: String,
    pub business_name: String,
}

/// One catalog row: a business and one of its experience keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub business: BusinessRecord,
    pub experience_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    // business_name -> indexes into `entries`
    by_business: HashMap<String, Vec<usize>>,
}

const BUSINESS_NAME: &str = "business_name";
const BUSINESS_ID: &str = "business_id";
const EXPERIENCE_KEY: &str = "experience_key";

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            SqiError::Catalog(format!("Failed to open catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_reader(file)?;
        info!(
            "Loaded catalog from {}: {} businesses, {} experiences",
            path.display(),
            catalog.by_business.len(),
            catalog.entries.len()
        );
        Ok(catalog)
    }

    /// Parse catalog CSV. Header names are matched case-insensitively.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| SqiError::Catalog(format!("Catalog is missing column '{}'", name)))
        };
        let name_idx = column(BUSINESS_NAME)?;
        let id_idx = column(BUSINESS_ID)?;
        let experience_idx = column(EXPERIENCE_KEY)?;

        let mut entries = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let cell = |idx: usize| record.get(idx).unwrap_or("").to_string();

            let business_name = cell(name_idx);
            let experience_key = cell(experience_idx);
            if business_name.is_empty() || experience_key.is_empty() {
                debug!("Skipping catalog row {}: empty business name or experience key", line + 2);
                continue;
            }

            entries.push(CatalogEntry {
                business: BusinessRecord {
                    business_id: cell(id_idx),
                    business_name,
                },
                experience_key,
            });
        }

        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut by_business: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            by_business
                .entry(entry.business.business_name.clone())
                .or_default()
                .push(idx);
        }
        Self { entries, by_business }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unique business names in first-appearance order.
    pub fn list_businesses(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.business.business_name.as_str())
            .unique()
            .collect()
    }

    /// Unique experience keys for a business in first-appearance order.
    pub fn experiences_for(&self, business_name: &str) -> Result<Vec<&str>> {
        Ok(self
            .rows_for(business_name)?
            .map(|e| e.experience_key.as_str())
            .unique()
            .collect())
    }

    pub fn business_id_for(&self, business_name: &str) -> Result<&str> {
        self.rows_for(business_name)?
            .map(|e| e.business.business_id.as_str())
            .next()
            .ok_or_else(|| SqiError::Catalog(format!("Unknown business: {}", business_name)))
    }

    pub fn business(&self, business_name: &str) -> Result<&BusinessRecord> {
        self.rows_for(business_name)?
            .map(|e| &e.business)
            .next()
            .ok_or_else(|| SqiError::Catalog(format!("Unknown business: {}", business_name)))
    }

    /// Confirm the pair comes from the catalog before it is handed to the
    /// query builder, which never escapes its inputs.
    pub fn validate_selection(&self, business_name: &str, experience_key: &str) -> Result<&BusinessRecord> {
        let mut rows = self.rows_for(business_name)?;
        let first = rows
            .next()
            .ok_or_else(|| SqiError::Catalog(format!("Unknown business: {}", business_name)))?;
        if first.experience_key != experience_key && !rows.any(|e| e.experience_key == experience_key) {
            return Err(SqiError::Catalog(format!(
                "Experience '{}' does not belong to business '{}'",
                experience_key, business_name
            )));
        }
        Ok(&first.business)
    }

    fn rows_for<'a>(&'a self, business_name: &str) -> Result<impl Iterator<Item = &'a CatalogEntry> + 'a> {
        let indexes = self
            .by_business
            .get(business_name)
            .ok_or_else(|| SqiError::Catalog(format!("Unknown business: {}", business_name)))?;
        Ok(indexes.iter().map(move |&idx| &self.entries[idx]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Business_ID,BUSINESS_NAME,Experience_Key
101,Acme Corp,search-en
101,Acme Corp,search-fr
202,Globex,help-center
101,Acme Corp,search-en
";

    #[test]
    fn test_headers_are_case_insensitive() {
        let catalog = Catalog::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(catalog.list_businesses(), vec!["Acme Corp", "Globex"]);
    }

    #[test]
    fn test_experiences_are_unique_and_ordered() {
        let catalog = Catalog::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(
            catalog.experiences_for("Acme Corp").unwrap(),
            vec!["search-en", "search-fr"]
        );
        assert_eq!(catalog.business_id_for("Globex").unwrap(), "202");
    }

    #[test]
    fn test_unknown_business() {
        let catalog = Catalog::from_reader(CSV.as_bytes()).unwrap();
        assert!(matches!(
            catalog.experiences_for("Initech"),
            Err(SqiError::Catalog(_))
        ));
    }

    #[test]
    fn test_validate_selection() {
        let catalog = Catalog::from_reader(CSV.as_bytes()).unwrap();
        let business = catalog.validate_selection("Acme Corp", "search-fr").unwrap();
        assert_eq!(business.business_id, "101");
        assert!(catalog.validate_selection("Acme Corp", "help-center").is_err());
        assert!(catalog
            .validate_selection("Acme Corp' or 1=1 --", "search-en")
            .is_err());
    }

    #[test]
    fn test_missing_column() {
        let err = Catalog::from_reader("business_name,business_id\nAcme,1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("experience_key"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        std::fs::write(&path, CSV).unwrap();
        let catalog = Catalog::load(&path).unwrap();
        assert!(!catalog.is_empty());
        assert!(matches!(
            Catalog::load(dir.path().join("missing.csv")),
            Err(SqiError::Catalog(_))
        ));
    }
}
