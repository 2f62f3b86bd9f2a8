//! Conflict verifier: reads the data stream back and diagnoses `log.offset`.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::es_http::EsHttp;
use crate::es_ingest::Scenario;
use crate::types::{CountResponse, DataStreamsResponse, FieldCapsResponse, MappingResponse};

pub const CONFLICT_FIELD: &str = "log.offset";
/// Type ECS assigns to `log.offset`.
pub const ECS_OFFSET_TYPE: &str = "long";
/// Type dynamic mapping picks for a quoted number.
pub const STRING_OFFSET_TYPE: &str = "keyword";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFieldType {
    pub index: String,
    pub field_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Two backing indices disagree on the field type.
    CrossIndexConflict { first: String, last: String },
    /// The field was mapped as a string type where ECS expects `long`.
    EcsMismatch { found: String },
    NoConflict,
    Inconclusive { reason: String },
}

impl Verdict {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Verdict::CrossIndexConflict { .. } | Verdict::EcsMismatch { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub data_stream: String,
    pub scenario: Scenario,
    pub backing_indices: Vec<String>,
    pub doc_count: u64,
    pub first: Option<IndexFieldType>,
    pub last: Option<IndexFieldType>,
    pub field_caps_types: Vec<String>,
    pub verdict: Verdict,
}

impl ConflictReport {
    pub fn generations(&self) -> usize {
        self.backing_indices.len()
    }
}

pub fn decide_verdict(
    scenario: Scenario,
    first: Option<&IndexFieldType>,
    last: Option<&IndexFieldType>,
) -> Verdict {
    let Some(first) = first else {
        return Verdict::Inconclusive {
            reason: "data stream has no backing indices".to_string(),
        };
    };
    let Some(first_type) = first.field_type.as_deref() else {
        return Verdict::Inconclusive {
            reason: format!("{} has no mapping for {}", first.index, CONFLICT_FIELD),
        };
    };

    match scenario {
        Scenario::StringOffsets => {
            if first_type == STRING_OFFSET_TYPE {
                Verdict::EcsMismatch {
                    found: first_type.to_string(),
                }
            } else {
                Verdict::NoConflict
            }
        }
        Scenario::ExplicitMapping => {
            let Some(last) = last.filter(|l| l.index != first.index) else {
                return Verdict::Inconclusive {
                    reason: "only one backing index to compare".to_string(),
                };
            };
            match last.field_type.as_deref() {
                None => Verdict::Inconclusive {
                    reason: format!("{} has no mapping for {}", last.index, CONFLICT_FIELD),
                },
                Some(last_type) if last_type != first_type => Verdict::CrossIndexConflict {
                    first: first_type.to_string(),
                    last: last_type.to_string(),
                },
                Some(_) => Verdict::NoConflict,
            }
        }
    }
}

pub async fn verify(http: &EsHttp, data_stream: &str, scenario: Scenario) -> Result<ConflictReport> {
    let streams: DataStreamsResponse = http
        .get_json(&format!("_data_stream/{data_stream}"), "get data stream")
        .await?;
    let stream = streams
        .data_streams
        .into_iter()
        .find(|s| s.name == data_stream)
        .with_context(|| format!("data stream {data_stream} not found"))?;
    let backing_indices: Vec<String> = stream
        .backing_indices()
        .into_iter()
        .map(str::to_string)
        .collect();

    let count: CountResponse = http
        .get_json(&format!("{data_stream}/_count"), "count documents")
        .await?;

    let first = match stream.first_index() {
        Some(index) => Some(fetch_field_type(http, index, CONFLICT_FIELD).await?),
        None => None,
    };
    let last = match stream.last_index() {
        Some(index) if backing_indices.len() > 1 => {
            Some(fetch_field_type(http, index, CONFLICT_FIELD).await?)
        }
        _ => None,
    };

    let field_caps_types = match http
        .get_json::<FieldCapsResponse>(
            &format!("{data_stream}/_field_caps?fields={CONFLICT_FIELD}"),
            "field caps",
        )
        .await
    {
        Ok(caps) => caps.types_of(CONFLICT_FIELD),
        Err(err) => {
            warn!("verify: field_caps cross-check unavailable: {err:?}");
            Vec::new()
        }
    };

    let verdict = decide_verdict(scenario, first.as_ref(), last.as_ref());
    info!(
        data_stream,
        generations = backing_indices.len(),
        doc_count = count.count,
        conflict = verdict.is_conflict(),
        "verify: done"
    );

    Ok(ConflictReport {
        data_stream: data_stream.to_string(),
        scenario,
        backing_indices,
        doc_count: count.count,
        first,
        last,
        field_caps_types,
        verdict,
    })
}

/// Concrete mapping type of `field_path` in one index.
pub async fn fetch_field_type(
    http: &EsHttp,
    index: &str,
    field_path: &str,
) -> Result<IndexFieldType> {
    let resp: MappingResponse = http
        .get_json(&format!("{index}/_mapping"), "fetch mapping")
        .await?;
    let field_type = resp
        .get(index)
        .or_else(|| resp.values().next())
        .and_then(|m| m.mappings.field_type(field_path))
        .map(str::to_string);
    Ok(IndexFieldType {
        index: index.to_string(),
        field_type,
    })
}

pub fn render_report(report: &ConflictReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Data stream:      {}", report.data_stream);
    let _ = writeln!(out, "Scenario:         {}", report.scenario);
    let _ = writeln!(out, "Backing indices:  {}", report.generations());
    for index in &report.backing_indices {
        let _ = writeln!(out, "  - {index}");
    }
    let _ = writeln!(out, "Documents:        {}", report.doc_count);
    for (label, entry) in [("First", &report.first), ("Last", &report.last)] {
        if let Some(entry) = entry {
            let _ = writeln!(
                out,
                "{label} index {}: {} = {}",
                entry.index,
                CONFLICT_FIELD,
                entry.field_type.as_deref().unwrap_or("<unmapped>")
            );
        }
    }
    if !report.field_caps_types.is_empty() {
        let _ = writeln!(
            out,
            "Types across stream: {}",
            report.field_caps_types.join(", ")
        );
    }

    match &report.verdict {
        Verdict::CrossIndexConflict { first, last } => {
            let _ = writeln!(
                out,
                "CONFLICT DETECTED: {CONFLICT_FIELD} is '{first}' in the first backing index and '{last}' in the last."
            );
            let _ = writeln!(
                out,
                "Queries and visualizations on {CONFLICT_FIELD} will see a mapping conflict until the indices are reindexed."
            );
        }
        Verdict::EcsMismatch { found } => {
            let _ = writeln!(
                out,
                "CONFLICT DETECTED: {CONFLICT_FIELD} is mapped as '{found}' but ECS defines it as '{ECS_OFFSET_TYPE}'."
            );
        }
        Verdict::NoConflict => {
            let _ = writeln!(out, "No conflict detected for {CONFLICT_FIELD}.");
        }
        Verdict::Inconclusive { reason } => {
            let _ = writeln!(out, "Verification inconclusive: {reason}");
        }
    }
    out
}
