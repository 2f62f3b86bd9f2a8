//! Offsetlab - provisions, verifies and resets a deliberately conflicting
//! Elasticsearch data stream for mapping-conflict training.

pub mod config;
pub mod es_bootstrap;
pub mod es_http;
pub mod es_ingest;
pub mod es_preflight;
pub mod es_reset;
pub mod es_verify;
pub mod naming;
pub mod runner;
pub mod types;
