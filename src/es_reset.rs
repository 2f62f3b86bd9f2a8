//! Environment reset: tear down what the lab and the operator created.
//!
//! `logs@package` and the ILM policy survive; the data stream, any
//! leftover backing indices and `logs@custom*` templates do not.

use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::{info, warn};

use crate::es_http::EsHttp;
use crate::naming::{backing_index_prefix, is_backing_index_of, is_custom_component_template};
use crate::types::{CatIndexRow, ComponentTemplatesResponse, DataStreamsResponse};

/// Only an explicit `y` confirms.
pub fn parse_confirmation(input: &str) -> bool {
    matches!(input.trim(), "y" | "Y")
}

/// Print `prompt` and read one line. EOF counts as a decline.
pub fn prompt_confirmation<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    prompt: &str,
) -> std::io::Result<bool> {
    write!(output, "{prompt} [y/N] ")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(false);
    }
    Ok(parse_confirmation(&line))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownOutcome {
    pub data_stream_deleted: bool,
    pub deleted_indices: Vec<String>,
    pub failed_indices: Vec<String>,
    pub deleted_templates: Vec<String>,
    pub failed_templates: Vec<String>,
    pub data_stream_remaining: bool,
    pub remaining_indices: Vec<String>,
    pub remaining_templates: Vec<String>,
}

impl TeardownOutcome {
    pub fn is_clean(&self) -> bool {
        !self.data_stream_remaining
            && self.remaining_indices.is_empty()
            && self.remaining_templates.is_empty()
    }
}

/// Delete the data stream, stray backing indices and custom component
/// templates, then re-query to confirm each is gone.
///
/// Failed deletions are recorded and left to the re-check; only the
/// listing reads abort the teardown.
pub async fn teardown(http: &EsHttp, data_stream: &str) -> Result<TeardownOutcome> {
    let mut outcome = TeardownOutcome::default();

    match http
        .delete_allow_404(&format!("_data_stream/{data_stream}"), "delete data stream")
        .await
    {
        Ok(()) => {
            info!("reset: deleted data stream {}", data_stream);
            outcome.data_stream_deleted = true;
        }
        Err(err) => warn!("reset: could not delete data stream {}: {err:?}", data_stream),
    }

    for index in list_backing_indices(http, data_stream).await? {
        match http.delete_allow_404(&index, "delete stray index").await {
            Ok(()) => {
                info!("reset: deleted stray index {}", index);
                outcome.deleted_indices.push(index);
            }
            Err(err) => {
                warn!("reset: could not delete {}: {err:?}", index);
                outcome.failed_indices.push(index);
            }
        }
    }

    for name in list_custom_templates(http).await? {
        match http
            .delete_allow_404(
                &format!("_component_template/{name}"),
                "delete custom component template",
            )
            .await
        {
            Ok(()) => {
                info!("reset: deleted component template {}", name);
                outcome.deleted_templates.push(name);
            }
            Err(err) => {
                warn!("reset: could not delete component template {}: {err:?}", name);
                outcome.failed_templates.push(name);
            }
        }
    }

    let streams: Option<DataStreamsResponse> = http
        .get_json_opt(&format!("_data_stream/{data_stream}"), "recheck data stream")
        .await?;
    outcome.data_stream_remaining = streams
        .map(|s| s.data_streams.iter().any(|d| d.name == data_stream))
        .unwrap_or(false);
    outcome.remaining_indices = list_backing_indices(http, data_stream).await?;
    outcome.remaining_templates = list_custom_templates(http).await?;

    if outcome.is_clean() {
        info!("reset: teardown verified");
    } else {
        warn!(
            data_stream_remaining = outcome.data_stream_remaining,
            remaining_indices = outcome.remaining_indices.len(),
            remaining_templates = outcome.remaining_templates.len(),
            "reset: teardown left objects behind"
        );
    }
    Ok(outcome)
}

async fn list_backing_indices(http: &EsHttp, data_stream: &str) -> Result<Vec<String>> {
    let rows: Option<Vec<CatIndexRow>> = http
        .get_json_opt(
            &format!(
                "_cat/indices/{}*?format=json&expand_wildcards=all",
                backing_index_prefix(data_stream)
            ),
            "list backing indices",
        )
        .await?;
    Ok(rows
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.index)
        .filter(|i| is_backing_index_of(i, data_stream))
        .collect())
}

async fn list_custom_templates(http: &EsHttp) -> Result<Vec<String>> {
    let resp: ComponentTemplatesResponse = http
        .get_json("_component_template", "list component templates")
        .await?;
    Ok(resp
        .component_templates
        .into_iter()
        .map(|t| t.name)
        .filter(|n| is_custom_component_template(n))
        .collect())
}
