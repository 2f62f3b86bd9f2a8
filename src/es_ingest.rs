//! Conflict inducer: writes documents whose `log.offset` representation
//! differs between two backing indices of the same data stream.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::es_http::{EsHttp, Mutation};
use crate::naming::backing_index_name;
use crate::types::{
    DataStreamsResponse, EventFields, HostFields, LabDocument, LogFields, OffsetValue,
    RolloverResponse,
};

pub const HOST_NAME: &str = "training-host-01";
pub const EVENT_DATASET: &str = "filestream.generic";
const OFFSET_STRIDE: u64 = 128;

/// The two ways the lab produces a conflicting `log.offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Scenario {
    /// String offsets on both sides of a rollover; dynamic mapping yields
    /// `keyword` where ECS expects `long`.
    StringOffsets,
    /// Numeric offsets in the first backing index, then an explicitly
    /// `keyword`-mapped second backing index added to the stream.
    #[default]
    ExplicitMapping,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::StringOffsets => "string-offsets",
            Scenario::ExplicitMapping => "explicit-mapping",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InduceSummary {
    pub scenario: Scenario,
    pub first_index: Option<String>,
    pub second_index: Option<String>,
    pub docs_written: usize,
    pub docs_rejected: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchTally {
    written: usize,
    rejected: usize,
}

impl BatchTally {
    fn add(&mut self, other: BatchTally) {
        self.written += other.written;
        self.rejected += other.rejected;
    }
}

pub fn build_document(seq: u64, offset: OffsetValue, phase: &str) -> LabDocument {
    LabDocument {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        message: format!("{phase}: sample log line {seq}"),
        log: LogFields { offset },
        host: HostFields {
            name: HOST_NAME.to_string(),
        },
        event: EventFields {
            dataset: EVENT_DATASET.to_string(),
        },
    }
}

pub fn numeric_offset(seq: u64) -> OffsetValue {
    OffsetValue::Number(seq * OFFSET_STRIDE)
}

pub fn text_offset(seq: u64) -> OffsetValue {
    OffsetValue::Text((seq * OFFSET_STRIDE).to_string())
}

/// Body for the hand-made second backing index: `log.offset` pinned to `keyword`.
pub fn build_explicit_backing_index_body() -> Value {
    json!({
        "settings": {
            "index.hidden": true,
            "number_of_shards": 1
        },
        "mappings": {
            "properties": {
                "@timestamp": { "type": "date" },
                "message": { "type": "text" },
                "log": {
                    "properties": {
                        "offset": { "type": "keyword" }
                    }
                },
                "host": {
                    "properties": {
                        "name": { "type": "keyword" }
                    }
                },
                "event": {
                    "properties": {
                        "dataset": { "type": "keyword" }
                    }
                }
            }
        }
    })
}

pub fn build_add_backing_index_body(data_stream: &str, index: &str) -> Value {
    json!({
        "actions": [
            { "add_backing_index": { "data_stream": data_stream, "index": index } }
        ]
    })
}

pub struct ConflictInducer<'a> {
    http: &'a EsHttp,
    data_stream: &'a str,
    docs_per_index: usize,
    pacing: Duration,
    settle: Duration,
}

impl<'a> ConflictInducer<'a> {
    pub fn new(http: &'a EsHttp, cfg: &'a Config) -> Self {
        Self {
            http,
            data_stream: &cfg.data_stream,
            docs_per_index: cfg.docs_per_index,
            pacing: cfg.doc_pacing(),
            settle: cfg.rollover_settle(),
        }
    }

    pub async fn induce(&self, scenario: Scenario) -> Result<InduceSummary> {
        info!(
            scenario = %scenario,
            data_stream = self.data_stream,
            docs_per_index = self.docs_per_index,
            "induce: starting"
        );
        let summary = match scenario {
            Scenario::StringOffsets => self.induce_string_offsets().await?,
            Scenario::ExplicitMapping => self.induce_explicit_mapping().await?,
        };

        let _ = self
            .http
            .post_empty(&format!("{}/_refresh", self.data_stream), "refresh data stream")
            .await?;

        info!(
            scenario = %scenario,
            written = summary.docs_written,
            rejected = summary.docs_rejected,
            first = summary.first_index.as_deref().unwrap_or("-"),
            second = summary.second_index.as_deref().unwrap_or("-"),
            "induce: done"
        );
        Ok(summary)
    }

    async fn induce_string_offsets(&self) -> Result<InduceSummary> {
        let n = self.docs_per_index as u64;
        let mut tally = self
            .write_batch(self.data_stream, 1..=n, text_offset, "before rollover")
            .await?;

        let rollover = self
            .http
            .post_empty(&format!("{}/_rollover", self.data_stream), "rollover")
            .await?;
        let (first_index, second_index) = match rollover {
            Mutation::Applied(value) => {
                let resp: RolloverResponse =
                    serde_json::from_value(value).context("parse rollover response")?;
                info!(
                    "induce: rolled over {} -> {} (rolled_over={})",
                    resp.old_index, resp.new_index, resp.rolled_over
                );
                (Some(resp.old_index), Some(resp.new_index))
            }
            Mutation::Rejected { .. } => (None, None),
        };
        tokio::time::sleep(self.settle).await;

        tally.add(
            self.write_batch(self.data_stream, n + 1..=2 * n, text_offset, "after rollover")
                .await?,
        );

        Ok(InduceSummary {
            scenario: Scenario::StringOffsets,
            first_index,
            second_index,
            docs_written: tally.written,
            docs_rejected: tally.rejected,
        })
    }

    async fn induce_explicit_mapping(&self) -> Result<InduceSummary> {
        let n = self.docs_per_index as u64;
        let mut tally = self
            .write_batch(self.data_stream, 1..=n, numeric_offset, "numeric offsets")
            .await?;

        let streams: DataStreamsResponse = self
            .http
            .get_json(
                &format!("_data_stream/{}", self.data_stream),
                "get data stream",
            )
            .await?;
        let stream = streams
            .data_streams
            .into_iter()
            .find(|s| s.name == self.data_stream)
            .with_context(|| format!("data stream {} was not created", self.data_stream))?;
        let first_index = stream.first_index().map(str::to_string);
        let second_index = backing_index_name(
            self.data_stream,
            Utc::now().date_naive(),
            stream.next_generation(),
        );

        let _ = self
            .http
            .put_value(
                &second_index,
                &build_explicit_backing_index_body(),
                "create explicit backing index",
            )
            .await?;

        // Backing indices refuse direct appends once they belong to a data
        // stream, so the string documents land before registration.
        tally.add(
            self.write_batch(&second_index, n + 1..=2 * n, text_offset, "string offsets")
                .await?,
        );

        let added = self
            .http
            .post_value(
                "_data_stream/_modify",
                &build_add_backing_index_body(self.data_stream, &second_index),
                "add backing index",
            )
            .await?;
        if added.is_applied() {
            info!(
                "induce: added {} to data stream {}",
                second_index, self.data_stream
            );
        }
        tokio::time::sleep(self.settle).await;

        Ok(InduceSummary {
            scenario: Scenario::ExplicitMapping,
            first_index,
            second_index: Some(second_index),
            docs_written: tally.written,
            docs_rejected: tally.rejected,
        })
    }

    async fn write_batch(
        &self,
        target: &str,
        seqs: std::ops::RangeInclusive<u64>,
        offset: fn(u64) -> OffsetValue,
        phase: &str,
    ) -> Result<BatchTally> {
        let mut tally = BatchTally::default();
        let path = format!("{target}/_doc");
        for seq in seqs {
            let doc = serde_json::to_value(build_document(seq, offset(seq), phase))
                .context("serialize lab document")?;
            match self.http.post_value(&path, &doc, "index document").await? {
                Mutation::Applied(_) => tally.written += 1,
                Mutation::Rejected { status, .. } => {
                    warn!("induce: document {} into {} rejected status={}", seq, target, status);
                    tally.rejected += 1;
                }
            }
            debug!("induce: wrote document {} into {}", seq, target);
            tokio::time::sleep(self.pacing).await;
        }
        Ok(tally)
    }
}
