//! JSON file persistence for collected records.
//!
//! Saving never fails from the caller's point of view: when the target cannot be
//! written the collection goes to a timestamped file in the temporary directory.

use crate::error::Result;
use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Save `records` as pretty JSON, creating parent directories.
///
/// Returns the path actually written, or `None` when even the fallback failed.
pub fn save<T: Serialize>(records: &[T], path: &Path) -> Option<PathBuf> {
    match write_json(records, path) {
        Ok(()) => {
            ::log::info!("Saved {} records to {}", records.len(), path.display());
            Some(path.to_path_buf())
        }
        Err(e) => {
            ::log::error!("Error saving records to {}: {}", path.display(), e);
            let fallback = fallback_path(path);
            match write_json(records, &fallback) {
                Ok(()) => {
                    ::log::warn!("Saved records to fallback location {}", fallback.display());
                    Some(fallback)
                }
                Err(e) => {
                    ::log::error!("Fallback save to {} failed as well: {}", fallback.display(), e);
                    None
                }
            }
        }
    }
}

/// Load a collection; a missing or unreadable file yields an empty one, a bad entry is skipped
pub fn load<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    if !path.exists() {
        ::log::info!("No existing records at {}", path.display());
        return Vec::new();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            ::log::error!("Error reading {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let values = match serde_json::from_str::<Vec<serde_json::Value>>(&contents) {
        Ok(values) => values,
        Err(e) => {
            ::log::error!("Error parsing {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                ::log::warn!("Skipping record {} in {}: {}", i, path.display(), e);
                None
            }
        })
        .collect();
    ::log::info!("Loaded {}/{} records from {}", records.len(), total, path.display());
    records
}

/// Load the existing collection, extend it and save it back
pub fn append<T: Serialize + DeserializeOwned + Clone>(records: &[T], path: &Path) -> Option<PathBuf> {
    let mut all = load::<T>(path);
    all.extend_from_slice(records);
    save(&all, path)
}

/// Write any serializable value as pretty JSON, creating parent directories
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let data = serde_json::to_string_pretty(value)?;
    std::fs::write(path, data)?;
    Ok(())
}

fn fallback_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("records");
    std::env::temp_dir().join(format!(
        "{}_{}.json",
        stem,
        Local::now().format("%Y%m%d_%H%M%S%3f")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ProductRecord;
    use tempfile::TempDir;

    fn product(name: &str) -> ProductRecord {
        ProductRecord {
            is_product: true,
            product_name: Some(name.to_string()),
            price: Some("$10".into()),
            ..ProductRecord::default()
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/data/products.json");
        let records = vec![product("Kettle"), product("Toaster")];

        assert_eq!(save(&records, &path), Some(path.clone()));
        let loaded: Vec<ProductRecord> = load(&path);
        assert_eq!(loaded, records);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  {"), "output should be pretty-printed");
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = TempDir::new().unwrap();
        let missing: Vec<ProductRecord> = load(&dir.path().join("absent.json"));
        assert!(missing.is_empty());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{ not a list").unwrap();
        let loaded: Vec<ProductRecord> = load(&corrupt);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_mistyped_extraction_survives_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.json");
        let kettle = ProductRecord::from_extraction(serde_json::json!({
            "is_product": true,
            "product_name": "Kettle",
            "price": "$20",
            "secondary_categories": "Kitchen",
            "brand": ["Acme", "Co"]
        }));
        let records = vec![kettle, product("Toaster")];

        save(&records, &path).unwrap();
        let loaded: Vec<ProductRecord> = load(&path);
        assert_eq!(loaded, records);
        assert_eq!(loaded[0].price.as_deref(), Some("$20"));
        assert_eq!(loaded[0].secondary_categories, Some(vec!["Kitchen".to_string()]));
    }

    #[test]
    fn test_bad_entry_does_not_drop_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.json");
        std::fs::write(
            &path,
            r#"[{"is_product": true, "product_name": "Kettle", "price": 24.5},
                {"is_product": true, "product_name": "Toaster"}]"#,
        )
        .unwrap();

        let loaded: Vec<ProductRecord> = load(&path);
        let names = loaded.iter().filter_map(|p| p.title()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Toaster"]);
    }

    #[test]
    fn test_append_extends_collection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.json");

        append(&[product("Kettle")], &path).unwrap();
        append(&[product("Toaster")], &path).unwrap();

        let loaded: Vec<ProductRecord> = load(&path);
        let names = loaded.iter().filter_map(|p| p.title()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Kettle", "Toaster"]);
    }

    #[test]
    fn test_unwritable_target_falls_back_to_temp_dir() {
        let dir = TempDir::new().unwrap();
        // a file where a directory is expected
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let path = blocker.join("products.json");

        let written = save(&[product("Kettle")], &path).unwrap();
        assert_ne!(written, path);
        assert!(written.starts_with(std::env::temp_dir()));
        let loaded: Vec<ProductRecord> = load(&written);
        assert_eq!(loaded.len(), 1);
        std::fs::remove_file(written).unwrap();
    }
}
