//! Connectivity gate run before any mutating call.

use std::fmt;

use reqwest::Method;
use tracing::info;

use crate::es_http::{truncate_body_snippet, EsHttp};
use crate::types::ClusterInfo;

/// Cluster identity reported by `GET /`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    pub cluster_name: String,
    pub version: String,
}

#[derive(Debug)]
pub enum PreflightError {
    Unreachable { url: String, reason: String },
    Rejected { url: String, status: u16, body_sample: String },
    Malformed { url: String, reason: String },
}

impl PreflightError {
    /// Remediation hints printed to the operator before exiting.
    pub fn guidance(&self) -> &'static str {
        match self {
            PreflightError::Unreachable { .. } => {
                "Check that the Elasticsearch pods are running (kubectl get pods), \
                 that a port-forward to 9200 is active, and that ELASTICSEARCH_URL points at it."
            }
            PreflightError::Rejected {
                status: 401 | 403, ..
            } => {
                "Check ELASTICSEARCH_USER and ELASTICSEARCH_PASSWORD."
            }
            PreflightError::Rejected { .. } => {
                "The cluster answered but refused the request; check its health and logs."
            }
            PreflightError::Malformed { .. } => {
                "ELASTICSEARCH_URL does not look like an Elasticsearch endpoint (is it pointing at Kibana?)."
            }
        }
    }
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreflightError::Unreachable { url, reason } => {
                write!(f, "cannot connect to Elasticsearch at {url}: {reason}")
            }
            PreflightError::Rejected {
                url,
                status,
                body_sample,
            } => write!(
                f,
                "Elasticsearch at {url} answered status={status} body_sample={body_sample}"
            ),
            PreflightError::Malformed { url, reason } => {
                write!(f, "unexpected response from {url}: {reason}")
            }
        }
    }
}

impl std::error::Error for PreflightError {}

/// Single authenticated `GET /`. No retries.
pub async fn check_connectivity(http: &EsHttp) -> Result<ClusterIdentity, PreflightError> {
    let url = http.base_url().to_string();
    let resp = http
        .request(Method::GET, "/")
        .send()
        .await
        .map_err(|err| PreflightError::Unreachable {
            url: url.clone(),
            reason: err.to_string(),
        })?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(PreflightError::Rejected {
            url,
            status: status.as_u16(),
            body_sample: truncate_body_snippet(&text, 300),
        });
    }

    let info: ClusterInfo = resp.json().await.map_err(|err| PreflightError::Malformed {
        url: url.clone(),
        reason: err.to_string(),
    })?;

    info!(
        cluster = %info.cluster_name,
        version = %info.version.number,
        "preflight: connected to {}",
        url
    );
    Ok(ClusterIdentity {
        cluster_name: info.cluster_name,
        version: info.version.number,
    })
}
