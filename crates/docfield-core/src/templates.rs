//! Vendor template persistence
//!
//! One pretty-printed JSON document per vendor, named after the vendor slug.
//! Saves overwrite without locking (last writer wins) and bump the version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::TemplateError;
use crate::types::TemplateExample;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorTemplate {
    pub vendor_name: String,
    pub fields: Vec<TemplateExample>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub version: u32,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Listing entry for a stored template
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TemplateSummary {
    pub vendor_name: String,
    pub slug: String,
    pub version: u32,
    pub field_count: usize,
    pub last_updated: DateTime<Utc>,
}

/// File name stem for a vendor: lowercase, every non-alphanumeric char as `_`
pub fn vendor_slug(vendor: &str) -> Result<String, TemplateError> {
    let slug: String = vendor
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if !slug.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(TemplateError::InvalidName(vendor.to_string()));
    }
    Ok(slug)
}

#[derive(Clone, Debug)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    /// Open (and create if needed) a template directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TemplateError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, vendor: &str) -> Result<PathBuf, TemplateError> {
        Ok(self.root.join(format!("{}.json", vendor_slug(vendor)?)))
    }

    fn read(path: &Path, vendor: &str) -> Result<VendorTemplate, TemplateError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TemplateError::NotFound(vendor.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load(&self, vendor: &str) -> Result<VendorTemplate, TemplateError> {
        Self::read(&self.path_for(vendor)?, vendor)
    }

    /// Create or replace a vendor template.
    ///
    /// The version starts at 1 and increments on every save; `created` is kept
    /// from the previous version.
    pub fn save(
        &self,
        vendor: &str,
        fields: Vec<TemplateExample>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<VendorTemplate, TemplateError> {
        let path = self.path_for(vendor)?;
        let now = Utc::now();
        let (version, created) = match Self::read(&path, vendor) {
            Ok(previous) => (previous.version.saturating_add(1), previous.created),
            Err(TemplateError::NotFound(_)) => (1, now),
            Err(TemplateError::Malformed(e)) => {
                warn!("Replacing unreadable template for {}: {}", vendor, e);
                (1, now)
            }
            Err(e) => return Err(e),
        };

        let template = VendorTemplate {
            vendor_name: vendor.trim().to_string(),
            fields,
            metadata,
            version,
            created,
            last_updated: now,
        };
        fs::write(&path, serde_json::to_string_pretty(&template)?)?;
        info!("Saved template for {} (version {})", template.vendor_name, version);
        Ok(template)
    }

    pub fn delete(&self, vendor: &str) -> Result<(), TemplateError> {
        match fs::remove_file(self.path_for(vendor)?) {
            Ok(()) => {
                info!("Deleted template for {}", vendor);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(TemplateError::NotFound(vendor.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every readable template, sorted by slug; unreadable files are skipped
    pub fn list(&self) -> Result<Vec<TemplateSummary>, TemplateError> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match Self::read(&path, &slug) {
                Ok(t) => summaries.push(TemplateSummary {
                    vendor_name: t.vendor_name,
                    slug,
                    version: t.version,
                    field_count: t.fields.len(),
                    last_updated: t.last_updated,
                }),
                Err(e) => warn!("Skipping template file {}: {}", path.display(), e),
            }
        }
        summaries.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn example(name: &str) -> TemplateExample {
        TemplateExample {
            field_name: name.into(),
            value: "x".into(),
            bbox: [10, 10, 50, 30],
        }
    }

    #[test]
    fn test_vendor_slug() {
        assert_eq!(vendor_slug("ACME Corp.").unwrap(), "acme_corp_");
        assert_eq!(vendor_slug("../etc/passwd").unwrap(), "___etc_passwd");
        assert!(matches!(vendor_slug(" -- "), Err(TemplateError::InvalidName(_))));
    }

    #[test]
    fn test_save_increments_version_and_keeps_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();

        let first = store.save("ACME Corp", vec![example("total")], Default::default()).unwrap();
        assert_eq!(first.version, 1);

        let second = store
            .save("acme corp", vec![example("total"), example("date")], Default::default())
            .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.created, first.created);
        assert!(second.last_updated >= first.last_updated);

        let loaded = store.load("ACME CORP").unwrap();
        assert_eq!(loaded, second);
        assert!(dir.path().join("acme_corp.json").exists());
    }

    #[test]
    fn test_missing_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        assert!(matches!(store.load("nobody"), Err(TemplateError::NotFound(_))));
        assert!(matches!(store.delete("nobody"), Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        store.save("Zeta", vec![example("a")], Default::default()).unwrap();
        store.save("Alpha", vec![example("a"), example("b")], Default::default()).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().unwrap();
        let slugs: Vec<&str> = listed.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["alpha", "zeta"]);
        assert_eq!(listed[0].field_count, 2);

        store.delete("Zeta").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_metadata_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        let mut metadata = serde_json::Map::new();
        metadata.insert("document_type".into(), serde_json::json!("customs"));
        store.save("Globex", vec![example("hs_code")], metadata.clone()).unwrap();
        assert_eq!(store.load("Globex").unwrap().metadata, metadata);
    }
}
