use std::sync::Arc;
use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::es_http::HttpPolicy;
use crate::naming::DEFAULT_DATA_STREAM;

#[derive(Debug, Clone)]
pub struct Config {
    pub es_url: Arc<str>,
    pub es_user: Arc<str>,
    pub es_pass: Arc<str>,
    pub data_stream: Arc<str>,
    pub docs_per_index: usize,
    pub doc_pacing_ms: u64,
    pub rollover_settle_ms: u64,
    pub http_timeout_secs: u64,
    pub lenient_http: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            es_url: "http://localhost:9200".into(),
            es_user: "elastic".into(),
            es_pass: "elastic".into(),
            data_stream: DEFAULT_DATA_STREAM.into(),
            docs_per_index: 5,
            doc_pacing_ms: 100,
            rollover_settle_ms: 2_000,
            http_timeout_secs: 30,
            lenient_http: false,
        }
    }
}

/// File form of [`Config`]; every key is optional and falls back to the default.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    es_url: Option<String>,
    es_user: Option<String>,
    es_pass: Option<String>,
    data_stream: Option<String>,
    docs_per_index: Option<usize>,
    doc_pacing_ms: Option<u64>,
    rollover_settle_ms: Option<u64>,
    http_timeout_secs: Option<u64>,
    lenient_http: Option<bool>,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let d = Config::default();
        Self {
            es_url: raw.es_url.map(Arc::from).unwrap_or(d.es_url),
            es_user: raw.es_user.map(Arc::from).unwrap_or(d.es_user),
            es_pass: raw.es_pass.map(Arc::from).unwrap_or(d.es_pass),
            data_stream: raw.data_stream.map(Arc::from).unwrap_or(d.data_stream),
            docs_per_index: raw.docs_per_index.unwrap_or(d.docs_per_index),
            doc_pacing_ms: raw.doc_pacing_ms.unwrap_or(d.doc_pacing_ms),
            rollover_settle_ms: raw.rollover_settle_ms.unwrap_or(d.rollover_settle_ms),
            http_timeout_secs: raw.http_timeout_secs.unwrap_or(d.http_timeout_secs),
            lenient_http: raw.lenient_http.unwrap_or(d.lenient_http),
        }
    }
}

impl Config {
    /// Load from an explicit file, else the per-user config file, else
    /// defaults; then apply environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| env::var("OFFSETLAB_CONFIG").ok().map(PathBuf::from));
        let base = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        let cfg = base.with_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(Config::from(raw))
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = non_empty(lookup("ELASTICSEARCH_URL")) {
            self.es_url = v.into();
        }
        if let Some(v) = non_empty(lookup("ELASTICSEARCH_USER")) {
            self.es_user = v.into();
        }
        if let Some(v) = lookup("ELASTICSEARCH_PASSWORD") {
            self.es_pass = v.into();
        }
        if let Some(v) = non_empty(lookup("OFFSETLAB_DATA_STREAM")) {
            self.data_stream = v.into();
        }
        maybe_parse(&mut self.docs_per_index, lookup("OFFSETLAB_DOCS_PER_INDEX"));
        maybe_parse(&mut self.doc_pacing_ms, lookup("OFFSETLAB_DOC_PACING_MS"));
        maybe_parse(
            &mut self.rollover_settle_ms,
            lookup("OFFSETLAB_ROLLOVER_SETTLE_MS"),
        );
        maybe_parse(&mut self.http_timeout_secs, lookup("HTTP_TIMEOUT_SECS"));
        if let Some(v) = lookup("OFFSETLAB_LENIENT_HTTP") {
            self.lenient_http = v == "1" || v.eq_ignore_ascii_case("true");
        }
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn doc_pacing(&self) -> Duration {
        Duration::from_millis(self.doc_pacing_ms)
    }

    pub fn rollover_settle(&self) -> Duration {
        Duration::from_millis(self.rollover_settle_ms)
    }

    pub fn http_policy(&self) -> HttpPolicy {
        if self.lenient_http {
            HttpPolicy::Lenient
        } else {
            HttpPolicy::Strict
        }
    }
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "offsetlab", "offsetlab")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".offsetlab/config.toml"))
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.es_url.trim().is_empty() {
            anyhow::bail!("ELASTICSEARCH_URL is required (set via env or config)");
        }
        if !self.es_url.starts_with("http://") && !self.es_url.starts_with("https://") {
            anyhow::bail!("ELASTICSEARCH_URL must start with http:// or https://");
        }
        if self.data_stream.trim().is_empty() {
            anyhow::bail!("data stream name must not be empty");
        }
        if self.docs_per_index == 0 {
            anyhow::bail!("docs_per_index must be at least 1");
        }
        Ok(())
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn maybe_parse<T: std::str::FromStr>(val: &mut T, raw: Option<String>) {
    if let Some(n) = raw.and_then(|v| v.trim().parse::<T>().ok()) {
        *val = n;
    }
}
