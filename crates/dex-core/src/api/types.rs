//! Wire types for the dataset API

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One column of the remote dataset schema, with its semantic concept tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub key: String,
    /// Declared JSON-schema type; absent for some platform-internal columns
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Concept URI identifying the column semantics (latitude, geometry, ...)
    #[serde(rename = "x-refersTo", default, skip_serializing_if = "Option::is_none")]
    pub refers_to: Option<String>,
    /// Columns computed by the platform, excluded from default exports
    #[serde(rename = "x-calculated", default)]
    pub calculated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SchemaField {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field_type: None,
            refers_to: None,
            calculated: false,
            title: None,
        }
    }

    pub fn with_concept(mut self, uri: impl Into<String>) -> Self {
        self.refers_to = Some(uri.into());
        self
    }

    pub fn with_type(mut self, field_type: impl Into<String>) -> Self {
        self.field_type = Some(field_type.into());
        self
    }
}

/// Dataset snapshot fetched once at run start
///
/// The snapshot is never refreshed mid-run; attachment replacement works
/// against this copy of `attachments`, which is an accepted race with
/// concurrent external edits.
#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub schema: Vec<SchemaField>,
    /// Spatial extent; absent or null means the dataset is not geographic
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// One page of the lines API response
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub total: Option<u64>,
    pub results: Vec<Map<String, Value>>,
    /// URL of the next page; absent terminates pagination
    #[serde(default)]
    pub next: Option<String>,
}

/// One metadata attachment of the dataset
///
/// `name` is the uniqueness key; `extra` keeps whatever the upload endpoint
/// returned (size, mimetype, timestamps) so the PATCH sends it back intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
