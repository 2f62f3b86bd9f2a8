use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::es_http::{EsHttp, Mutation};
use crate::naming::{
    index_pattern, index_template_name, CUSTOM_COMPONENT_TEMPLATE, ILM_POLICY,
    PACKAGE_COMPONENT_TEMPLATE,
};
use crate::types::{ComponentTemplatesResponse, IlmPolicyResponse, IndexTemplatesResponse};

pub const INDEX_TEMPLATE_PRIORITY: u64 = 200;
pub const COMPONENT_TEMPLATE_VERSION: u64 = 1;

/// Which of the three provisioning PUTs Elasticsearch accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub ilm_policy: bool,
    pub component_template: bool,
    pub index_template: bool,
}

impl ProvisionOutcome {
    pub fn all_applied(&self) -> bool {
        self.ilm_policy && self.component_template && self.index_template
    }
}

/// Create (or fully replace) the ILM policy, component template and index
/// template that give the data stream its shape. Safe to re-run.
pub async fn provision(http: &EsHttp, data_stream: &str) -> Result<ProvisionOutcome> {
    let template_name = index_template_name(data_stream);

    let ilm = http
        .put_value(
            &format!("_ilm/policy/{ILM_POLICY}"),
            &build_ilm_policy_body(),
            "put ilm policy",
        )
        .await?;
    log_mutation("ilm policy", ILM_POLICY, &ilm);

    let component = http
        .put_value(
            &format!("_component_template/{PACKAGE_COMPONENT_TEMPLATE}"),
            &build_component_template_body(ILM_POLICY),
            "put component template",
        )
        .await?;
    log_mutation("component template", PACKAGE_COMPONENT_TEMPLATE, &component);

    let index_template = http
        .put_value(
            &format!("_index_template/{template_name}"),
            &build_index_template_body(data_stream),
            "put index template",
        )
        .await?;
    log_mutation("index template", &template_name, &index_template);

    Ok(ProvisionOutcome {
        ilm_policy: ilm.is_applied(),
        component_template: component.is_applied(),
        index_template: index_template.is_applied(),
    })
}

fn log_mutation(kind: &str, name: &str, outcome: &Mutation) {
    match outcome {
        Mutation::Applied(_) => info!("provision: {} {} applied", kind, name),
        Mutation::Rejected { status, .. } => {
            warn!("provision: {} {} rejected status={}", kind, name, status)
        }
    }
}

pub fn build_ilm_policy_body() -> Value {
    json!({
        "policy": {
            "phases": {
                "hot": {
                    "min_age": "0ms",
                    "actions": {
                        "rollover": {
                            "max_age": "30d",
                            "max_primary_shard_size": "50gb"
                        },
                        "set_priority": { "priority": 100 }
                    }
                },
                "warm": {
                    "min_age": "7d",
                    "actions": {
                        "shrink": { "number_of_shards": 1 },
                        "forcemerge": { "max_num_segments": 1 },
                        "set_priority": { "priority": 50 }
                    }
                },
                "cold": {
                    "min_age": "30d",
                    "actions": {
                        "set_priority": { "priority": 0 }
                    }
                },
                "delete": {
                    "min_age": "90d",
                    "actions": {
                        "delete": {}
                    }
                }
            }
        }
    })
}

/// ECS subset for the lab documents. `log.offset` is left to dynamic
/// mapping so each backing index decides its own type.
pub fn build_component_template_body(ilm_policy: &str) -> Value {
    json!({
        "version": COMPONENT_TEMPLATE_VERSION,
        "template": {
            "settings": {
                "index.lifecycle.name": ilm_policy
            },
            "mappings": {
                "properties": {
                    "@timestamp": { "type": "date" },
                    "message": { "type": "text" },
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
        },
        "_meta": {
            "description": "ECS subset for the offset conflict lab",
            "managed_by": "offsetlab"
        }
    })
}

pub fn build_index_template_body(data_stream: &str) -> Value {
    json!({
        "index_patterns": [index_pattern(data_stream)],
        "data_stream": {},
        "priority": INDEX_TEMPLATE_PRIORITY,
        "composed_of": [PACKAGE_COMPONENT_TEMPLATE, CUSTOM_COMPONENT_TEMPLATE],
        "ignore_missing_component_templates": [CUSTOM_COMPONENT_TEMPLATE],
        "_meta": {
            "managed_by": "offsetlab"
        }
    })
}

/// What the cluster currently holds for the provisioned objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentState {
    pub ilm_phases: Option<Vec<String>>,
    pub component_template_present: bool,
    pub index_template_priority: Option<u64>,
    pub index_template_composed_of: Vec<String>,
    pub index_template_is_data_stream: bool,
}

impl EnvironmentState {
    pub fn is_provisioned(&self) -> bool {
        self.ilm_phases.is_some()
            && self.component_template_present
            && self.index_template_priority.is_some()
            && self.index_template_is_data_stream
    }
}

/// Read the three provisioned objects back.
pub async fn describe_environment(http: &EsHttp, data_stream: &str) -> Result<EnvironmentState> {
    let template_name = index_template_name(data_stream);

    let ilm: Option<IlmPolicyResponse> = http
        .get_json_opt(&format!("_ilm/policy/{ILM_POLICY}"), "get ilm policy")
        .await?;
    let ilm_phases = ilm.and_then(|resp| {
        resp.get(ILM_POLICY)
            .map(|entry| entry.policy.phases.keys().cloned().collect())
    });

    let component: Option<ComponentTemplatesResponse> = http
        .get_json_opt(
            &format!("_component_template/{PACKAGE_COMPONENT_TEMPLATE}"),
            "get component template",
        )
        .await?;
    let component_template_present = component
        .map(|c| {
            c.component_templates
                .iter()
                .any(|t| t.name == PACKAGE_COMPONENT_TEMPLATE)
        })
        .unwrap_or(false);

    let templates: Option<IndexTemplatesResponse> = http
        .get_json_opt(&format!("_index_template/{template_name}"), "get index template")
        .await
        .context("describe index template")?;
    let template = templates.and_then(|t| {
        t.index_templates
            .into_iter()
            .find(|named| named.name == template_name)
    });

    let mut state = EnvironmentState {
        ilm_phases,
        component_template_present,
        ..EnvironmentState::default()
    };
    if let Some(named) = template {
        state.index_template_priority = named.index_template.priority;
        state.index_template_composed_of = named.index_template.composed_of;
        state.index_template_is_data_stream = named.index_template.data_stream.is_some();
    }
    Ok(state)
}
