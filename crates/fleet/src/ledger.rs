//! Work ledger persistence.
//!
//! The ledger is a single JSON array of [`Record`]s shared by the
//! provisioner and the publisher. It tells both of them which deployments
//! already exist and which have already been published, so repeated runs
//! skip finished work.
//!
//! Every mutation rewrites the whole file. There is no locking and the
//! write is not atomic: two processes must not use the same ledger at the
//! same time, and a crash in the middle of [`Ledger::save`] can truncate it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

/// Default ledger file name, relative to the working directory.
pub const DEFAULT_LEDGER_FILE: &str = "deploy.json";

/// Errors that can occur while reading or writing the ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger file exists but could not be read.
    #[error("Failed to read ledger {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The ledger file could not be written.
    #[error("Failed to write ledger {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The ledger file is not a JSON array of records.
    #[error("Ledger {} is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Records could not be serialized.
    #[error("Failed to serialize ledger: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// One provisioned deployment.
///
/// Fields the ledger does not know about are kept in [`Record::extra`] and
/// written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Label requested at creation time, e.g. `Deployment-000`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    /// Identifier assigned by the control plane.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Release name, used as the registry repository.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release_name: String,
    /// Executor the deployment was created with.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub executor: String,
    /// Airflow version the deployment was created with.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub airflow_version: String,
    /// Tag of the last image published for this deployment.
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub tag: Option<String>,
    /// When the deployment was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When the image for `tag` was pushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Unrecognised fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

impl Record {
    /// Whether an image with `tag` has already been pushed for this record.
    #[must_use]
    pub fn is_published(&self, tag: &str) -> bool {
        self.tag.as_deref() == Some(tag)
    }

    /// Record a successful push of `tag`.
    pub fn mark_published(&mut self, tag: &str) {
        self.tag = Some(tag.to_string());
        self.published_at = Some(Utc::now());
    }

    /// Older ledgers stored the label as a key mapping to the deployment id,
    /// e.g. `{"Deployment-000": "ckx...", "releaseName": ...}`. Move such a key
    /// into the `label`/`id` fields.
    fn adopt_legacy_label(&mut self) {
        if !self.label.is_empty()
            || !self.id.is_empty()
            || self.release_name.is_empty()
            || self.extra.len() != 1
        {
            return;
        }

        let Some((label, Value::String(id))) = self
            .extra
            .iter()
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
        else {
            return;
        };

        self.extra.remove(&label);
        self.label = label;
        self.id = id;
    }
}

/// File-backed ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Create a ledger stored at `path`. Nothing is read until [`Ledger::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record.
    ///
    /// A missing file is initialised on disk as an empty array and yields an
    /// empty ledger.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a JSON array of
    /// records.
    pub fn load(&self) -> Result<Vec<Record>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Ledger not found, initializing empty ledger");
                self.save(&[])?;
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(LedgerError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut records: Vec<Record> =
            serde_json::from_str(&content).map_err(|source| LedgerError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        records.iter_mut().for_each(Record::adopt_legacy_label);

        debug!(path = %self.path.display(), records = records.len(), "Loaded ledger");
        Ok(records)
    }

    /// Overwrite the ledger with `records`.
    ///
    /// # Errors
    /// Returns an error if the records cannot be serialized or the file cannot
    /// be written.
    pub fn save(&self, records: &[Record]) -> Result<(), LedgerError> {
        let mut buf = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        records
            .serialize(&mut serializer)
            .map_err(LedgerError::Serialization)?;
        buf.push(b'\n');

        let write_err = |source: io::Error| LedgerError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, buf).map_err(write_err)?;

        debug!(path = %self.path.display(), records = records.len(), "Saved ledger");
        Ok(())
    }
}

/// Whether a record with exactly this label exists.
#[must_use]
pub fn contains_label(records: &[Record], label: &str) -> bool {
    records.iter().any(|r| r.label == label)
}

/// Records that have no image published under `tag` yet.
#[must_use]
pub fn find_unpublished<'a>(records: &'a [Record], tag: &str) -> Vec<&'a Record> {
    records.iter().filter(|r| !r.is_published(tag)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(label: &str, release_name: &str, tag: Option<&str>) -> Record {
        Record {
            label: label.to_string(),
            id: format!("id-{label}"),
            release_name: release_name.to_string(),
            executor: "CeleryExecutor".to_string(),
            airflow_version: "2.4.3".to_string(),
            tag: tag.map(str::to_string),
            ..Record::default()
        }
    }

    #[test]
    fn test_load_missing_file_initializes_empty_ledger() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("deploy.json"));

        let records = ledger.load().unwrap();
        assert!(records.is_empty());

        let on_disk = fs::read_to_string(ledger.path()).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&on_disk).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_load_preserves_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("deploy.json"));
        fs::write(ledger.path(), r#"[{"a":1}]"#).unwrap();

        let records = ledger.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].extra.get("a"), Some(&Value::from(1)));

        ledger.save(&records).unwrap();
        let on_disk: Value = serde_json::from_str(&fs::read_to_string(ledger.path()).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!([{"a": 1}]));
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("deploy.json"));
        fs::write(ledger.path(), "{not json").unwrap();

        assert!(matches!(ledger.load(), Err(LedgerError::Malformed { .. })));
    }

    #[test]
    fn test_load_rejects_non_array() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("deploy.json"));
        fs::write(ledger.path(), r#"{"label":"Deployment-000"}"#).unwrap();

        assert!(matches!(ledger.load(), Err(LedgerError::Malformed { .. })));
    }

    #[test]
    fn test_legacy_label_key_is_adopted() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("deploy.json"));
        fs::write(
            ledger.path(),
            r#"[{
                "Deployment-000": "ckx123",
                "releaseName": "stellar-orbit-1234",
                "executor": "KubernetesExecutor",
                "airflowVersion": "2.4.3",
                "tag": ""
            }]"#,
        )
        .unwrap();

        let records = ledger.load().unwrap();
        assert_eq!(records[0].label, "Deployment-000");
        assert_eq!(records[0].id, "ckx123");
        assert_eq!(records[0].tag, None);
        assert!(records[0].extra.is_empty());
        assert!(contains_label(&records, "Deployment-000"));
    }

    #[test]
    fn test_save_uses_four_space_indent() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("nested").join("deploy.json"));

        ledger.save(&[record("Deployment-000", "rel1", None)]).unwrap();

        let on_disk = fs::read_to_string(ledger.path()).unwrap();
        assert!(on_disk.starts_with("[\n    {\n        \"label\": \"Deployment-000\""));
        assert!(on_disk.ends_with("]\n"));
        assert!(!on_disk.contains("\"tag\""));
    }

    #[test]
    fn test_contains_label_matches_field_exactly() {
        let records = vec![record("Deployment-000", "rel1", None)];
        assert!(contains_label(&records, "Deployment-000"));
        assert!(!contains_label(&records, "Deployment-999"));

        // A label showing up inside another field is not a match.
        let stray = vec![record("other", "Deployment-001", None)];
        assert!(!contains_label(&stray, "Deployment-001"));
    }

    #[test]
    fn test_find_unpublished() {
        let records = vec![
            record("Deployment-000", "rel1", None),
            record("Deployment-001", "rel2", Some("deploy-1")),
            record("Deployment-002", "rel3", Some("deploy-0")),
        ];

        let pending: Vec<&str> = find_unpublished(&records, "deploy-1")
            .into_iter()
            .map(|r| r.label.as_str())
            .collect();
        assert_eq!(pending, vec!["Deployment-000", "Deployment-002"]);
    }

    #[test]
    fn test_mark_published() {
        let mut r = record("Deployment-000", "rel1", None);
        assert!(!r.is_published("deploy-1"));
        r.mark_published("deploy-1");
        assert!(r.is_published("deploy-1"));
        assert!(r.published_at.is_some());
    }
}
