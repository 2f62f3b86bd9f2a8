//! Workflow runner - sequences preflight, provisioning, ingest, verification
//! and reset for the CLI commands.

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::es_bootstrap::{describe_environment, provision, EnvironmentState, ProvisionOutcome};
use crate::es_http::EsHttp;
use crate::es_ingest::{ConflictInducer, InduceSummary, Scenario};
use crate::es_preflight::{check_connectivity, ClusterIdentity};
use crate::es_reset::{teardown, TeardownOutcome};
use crate::es_verify::{verify, ConflictReport};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct SetupReport {
    pub cluster: ClusterIdentity,
    pub provision: ProvisionOutcome,
    pub induce: InduceSummary,
    pub conflict: ConflictReport,
}

#[derive(Debug, Clone)]
pub enum ResetReport {
    Declined,
    Completed {
        teardown: TeardownOutcome,
        setup: Box<SetupReport>,
    },
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub cluster: ClusterIdentity,
    pub environment: EnvironmentState,
}

// ============================================================================
// Workflows
// ============================================================================

/// Preflight, provision, induce the conflict and verify it.
pub async fn run_setup(http: &EsHttp, cfg: &Config, scenario: Scenario) -> Result<SetupReport> {
    let cluster = check_connectivity(http).await?;
    setup_after_preflight(http, cfg, scenario, cluster).await
}

async fn setup_after_preflight(
    http: &EsHttp,
    cfg: &Config,
    scenario: Scenario,
    cluster: ClusterIdentity,
) -> Result<SetupReport> {
    let provision = provision(http, &cfg.data_stream).await?;
    let induce = ConflictInducer::new(http, cfg).induce(scenario).await?;
    let conflict = verify(http, &cfg.data_stream, scenario).await?;
    Ok(SetupReport {
        cluster,
        provision,
        induce,
        conflict,
    })
}

pub async fn run_verify(http: &EsHttp, cfg: &Config, scenario: Scenario) -> Result<ConflictReport> {
    check_connectivity(http).await?;
    verify(http, &cfg.data_stream, scenario).await
}

/// Tear the lab down and rebuild it. A declined confirmation touches nothing.
pub async fn run_reset(
    http: &EsHttp,
    cfg: &Config,
    scenario: Scenario,
    confirmed: bool,
) -> Result<ResetReport> {
    if !confirmed {
        info!("reset: declined, no changes made");
        return Ok(ResetReport::Declined);
    }

    let cluster = check_connectivity(http).await?;
    let teardown = teardown(http, &cfg.data_stream).await?;
    info!(
        deleted_indices = teardown.deleted_indices.len(),
        deleted_templates = teardown.deleted_templates.len(),
        "reset: teardown complete, restoring initial state"
    );
    let setup = setup_after_preflight(http, cfg, scenario, cluster).await?;
    Ok(ResetReport::Completed {
        teardown,
        setup: Box::new(setup),
    })
}

pub async fn run_status(http: &EsHttp, cfg: &Config) -> Result<StatusReport> {
    let cluster = check_connectivity(http).await?;
    let environment = describe_environment(http, &cfg.data_stream).await?;
    Ok(StatusReport {
        cluster,
        environment,
    })
}
