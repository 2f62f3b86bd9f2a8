//! Typed request and response records for the Elasticsearch endpoints the lab touches.

use std::collections::{BTreeMap, HashMap};

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::naming::generation_of;

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub message: String,
    pub log: LogFields,
    pub host: HostFields,
    pub event: EventFields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogFields {
    pub offset: OffsetValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostFields {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventFields {
    pub dataset: String,
}

/// `log.offset` on the wire: a JSON number maps dynamically to `long`,
/// a quoted string to `keyword`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OffsetValue {
    Number(u64),
    Text(String),
}

// ============================================================================
// Cluster
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterInfo {
    #[serde(default)]
    pub cluster_name: String,
    pub version: ClusterVersion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterVersion {
    pub number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolloverResponse {
    #[serde(default)]
    pub old_index: String,
    #[serde(default)]
    pub new_index: String,
    #[serde(default)]
    pub rolled_over: bool,
}

/// One row of `_cat/indices?format=json`.
#[derive(Debug, Clone, Deserialize)]
pub struct CatIndexRow {
    pub index: String,
}

// ============================================================================
// Data streams
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DataStreamsResponse {
    #[serde(default)]
    pub data_streams: Vec<DataStreamInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataStreamInfo {
    pub name: String,
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub indices: Vec<BackingIndexRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackingIndexRef {
    pub index_name: String,
}

impl DataStreamInfo {
    /// Backing indices in generation order. `add_backing_index` puts the
    /// added index at the front of `indices`, so list order is not enough.
    pub fn backing_indices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.indices.iter().map(|i| i.index_name.as_str()).collect();
        names.sort_by_key(|name| generation_of(name).unwrap_or(0));
        names
    }

    pub fn first_index(&self) -> Option<&str> {
        self.backing_indices().first().copied()
    }

    pub fn last_index(&self) -> Option<&str> {
        self.backing_indices().last().copied()
    }

    /// Generation for a new backing index, above every existing one.
    pub fn next_generation(&self) -> u64 {
        self.indices
            .iter()
            .filter_map(|i| generation_of(&i.index_name))
            .fold(self.generation, u64::max)
            + 1
    }
}

// ============================================================================
// Templates and policies
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentTemplatesResponse {
    #[serde(default)]
    pub component_templates: Vec<NamedComponentTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedComponentTemplate {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexTemplatesResponse {
    #[serde(default)]
    pub index_templates: Vec<NamedIndexTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedIndexTemplate {
    pub name: String,
    pub index_template: IndexTemplateBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexTemplateBody {
    #[serde(default)]
    pub composed_of: Vec<String>,
    #[serde(default)]
    pub priority: Option<u64>,
    #[serde(default)]
    pub data_stream: Option<Value>,
}

/// `GET _ilm/policy/<name>` is keyed by policy name.
pub type IlmPolicyResponse = HashMap<String, IlmPolicyEntry>;

#[derive(Debug, Clone, Deserialize)]
pub struct IlmPolicyEntry {
    pub policy: IlmPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IlmPolicy {
    #[serde(default)]
    pub phases: BTreeMap<String, Value>,
}

// ============================================================================
// Mappings
// ============================================================================

/// `GET <index>/_mapping` is keyed by concrete index name.
pub type MappingResponse = HashMap<String, IndexMapping>;

#[derive(Debug, Clone, Deserialize)]
pub struct IndexMapping {
    pub mappings: MappingBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingBody {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyMapping>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyMapping {
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyMapping>,
}

impl MappingBody {
    /// Concrete type of a dotted field path, following nested `properties`.
    pub fn field_type(&self, field_path: &str) -> Option<&str> {
        let mut current = &self.properties;
        let mut parts = field_path.split('.').peekable();
        while let Some(part) = parts.next() {
            let def = current.get(part)?;
            if parts.peek().is_none() {
                return def.field_type.as_deref();
            }
            current = &def.properties;
        }
        None
    }
}

/// `GET <target>/_field_caps?fields=...`.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldCapsResponse {
    #[serde(default)]
    pub fields: BTreeMap<String, BTreeMap<String, IgnoredAny>>,
}

impl FieldCapsResponse {
    /// Types a field holds across the target, sorted.
    pub fn types_of(&self, field_path: &str) -> Vec<String> {
        self.fields
            .get(field_path)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}
