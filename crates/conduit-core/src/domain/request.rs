//! Request payloads handed to the executor.
//!
//! The core never interprets these beyond `summary()`, which is stored on the
//! job for diagnostics. How they travel to the partner system is up to the
//! executor.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub entity_type: String,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    pub from_date: Option<NaiveDateTime>,
    pub to_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub filters: BTreeMap<String, serde_json::Value>,
    pub format: Option<String>,
    #[serde(default)]
    pub include_related: bool,
}

impl ExportRequest {
    pub fn summary(&self) -> String {
        format!(
            "ExportRequest{{entity_type={:?}, entity_ids={:?}, from_date={:?}, to_date={:?}, filters={}, format={:?}, include_related={}}}",
            self.entity_type,
            self.entity_ids,
            self.from_date,
            self.to_date,
            filters_summary(&self.filters),
            self.format,
            self.include_related,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub entity_type: String,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub from_date: Option<NaiveDateTime>,
    pub to_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub filters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub overwrite_existing: bool,
    #[serde(default)]
    pub validate_only: bool,
}

impl ImportRequest {
    pub fn summary(&self) -> String {
        format!(
            "ImportRequest{{entity_type={:?}, source_type={:?}, source_id={:?}, from_date={:?}, to_date={:?}, filters={}, overwrite_existing={}, validate_only={}}}",
            self.entity_type,
            self.source_type,
            self.source_id,
            self.from_date,
            self.to_date,
            filters_summary(&self.filters),
            self.overwrite_existing,
            self.validate_only,
        )
    }
}

/// An uploaded file to import. The bytes are skipped when serializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileImportRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub import_type: String,
}

impl FileImportRequest {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("File: {}, Type: {}", self.file_name, self.import_type)
    }
}

fn filters_summary(filters: &BTreeMap<String, serde_json::Value>) -> String {
    let pairs: Vec<String> = filters.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", pairs.join(", "))
}
