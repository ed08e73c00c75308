use std::env;

use crate::error::AppError;
use crate::store::DEFAULT_MAX_ATTEMPTS;

pub const DEFAULT_COURSES_COLLECTION: &str = "cursos";
pub const DEFAULT_ENROLLMENTS_COLLECTION: &str = "inscripciones";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogConfig {
    pub courses_collection: String,
    pub enrollments_collection: String,
    pub max_transaction_attempts: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            courses_collection: DEFAULT_COURSES_COLLECTION.to_string(),
            enrollments_collection: DEFAULT_ENROLLMENTS_COLLECTION.to_string(),
            max_transaction_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl CatalogConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(name) = lookup("CATALOG_COURSES_COLLECTION") {
            config.courses_collection = non_empty("CATALOG_COURSES_COLLECTION", name)?;
        }
        if let Some(name) = lookup("CATALOG_ENROLLMENTS_COLLECTION") {
            config.enrollments_collection = non_empty("CATALOG_ENROLLMENTS_COLLECTION", name)?;
        }
        if let Some(raw) = lookup("CATALOG_TX_MAX_ATTEMPTS") {
            config.max_transaction_attempts = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "CATALOG_TX_MAX_ATTEMPTS must be a positive integer, got {:?}",
                        raw
                    ))
                })?;
        }

        Ok(config)
    }
}

fn non_empty(key: &str, value: String) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config(format!("{} is set but empty", key)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = CatalogConfig::from_lookup(lookup(&[])).expect("defaults should load");
        assert_eq!(config, CatalogConfig::default());
        assert_eq!(config.courses_collection, "cursos");
        assert_eq!(config.enrollments_collection, "inscripciones");
        assert_eq!(config.max_transaction_attempts, 5);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("CATALOG_COURSES_COLLECTION", "courses"),
            ("CATALOG_ENROLLMENTS_COLLECTION", " enrollments "),
            ("CATALOG_TX_MAX_ATTEMPTS", "3"),
        ]))
        .expect("overrides should load");
        assert_eq!(config.courses_collection, "courses");
        assert_eq!(config.enrollments_collection, "enrollments");
        assert_eq!(config.max_transaction_attempts, 3);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = CatalogConfig::from_lookup(lookup(&[("CATALOG_TX_MAX_ATTEMPTS", "0")]))
            .expect_err("zero attempts should be rejected");
        assert!(err.to_string().contains("CATALOG_TX_MAX_ATTEMPTS"));

        let err = CatalogConfig::from_lookup(lookup(&[("CATALOG_COURSES_COLLECTION", "  ")]))
            .expect_err("blank collection should be rejected");
        assert!(matches!(err, AppError::Config(_)));
    }
}
