use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::config::Config;

/// How mutating calls treat a non-2xx answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpPolicy {
    /// Fail the workflow on the first rejected write.
    #[default]
    Strict,
    /// Log the rejection and keep going.
    Lenient,
}

/// Outcome of a mutating call under [`HttpPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Applied(Value),
    Rejected { status: u16, body_sample: String },
}

impl Mutation {
    pub fn is_applied(&self) -> bool {
        matches!(self, Mutation::Applied(_))
    }
}

#[derive(Clone)]
pub struct EsHttp {
    client: Client,
    base_url: Arc<str>,
    user: Arc<str>,
    pass: Arc<str>,
    policy: HttpPolicy,
}

impl EsHttp {
    pub fn new(
        base_url: impl Into<Arc<str>>,
        user: impl Into<Arc<str>>,
        pass: impl Into<Arc<str>>,
        timeout: Duration,
        policy: HttpPolicy,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            user: user.into(),
            pass: pass.into(),
            policy,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.es_url.clone(),
            cfg.es_user.clone(),
            cfg.es_pass.clone(),
            cfg.http_timeout(),
            cfg.http_policy(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn policy(&self) -> HttpPolicy {
        self.policy
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .basic_auth(&*self.user, Some(&*self.pass))
    }

    pub async fn send_expect(
        &self,
        req: reqwest::RequestBuilder,
        context: &'static str,
        ok: impl FnOnce(StatusCode) -> bool,
    ) -> Result<Response> {
        let resp = req.send().await.context(context)?;
        let status = resp.status();
        if ok(status) {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!(
            "{} status={} body_sample={}",
            context,
            status,
            truncate_body_snippet(&text, 500)
        );
    }

    pub async fn send_ok(
        &self,
        req: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<Response> {
        self.send_expect(req, context, |s| s.is_success()).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        context: &'static str,
    ) -> Result<T> {
        let resp = self
            .send_ok(self.request(Method::GET, path), context)
            .await?;
        resp.json().await.context(context)
    }

    /// GET that maps 404 to `None` instead of an error.
    pub async fn get_json_opt<T: DeserializeOwned>(
        &self,
        path: &str,
        context: &'static str,
    ) -> Result<Option<T>> {
        let resp = self
            .send_expect(self.request(Method::GET, path), context, |s| {
                s.is_success() || s == StatusCode::NOT_FOUND
            })
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.json().await.context(context)?))
    }

    /// Send a write request and apply the configured [`HttpPolicy`].
    ///
    /// Transport errors are always fatal; only HTTP rejections are subject
    /// to the lenient policy.
    pub async fn mutate(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &'static str,
    ) -> Result<Mutation> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.context(context)?;
        let status = resp.status();
        if status.is_success() {
            let value = resp.json::<Value>().await.unwrap_or(Value::Null);
            return Ok(Mutation::Applied(value));
        }

        let text = resp.text().await.unwrap_or_default();
        let body_sample = truncate_body_snippet(&text, 500);
        match self.policy {
            HttpPolicy::Strict => anyhow::bail!(
                "{} status={} body_sample={}",
                context,
                status,
                body_sample
            ),
            HttpPolicy::Lenient => {
                warn!(
                    status = status.as_u16(),
                    path, "{context} rejected, continuing: {body_sample}"
                );
                Ok(Mutation::Rejected {
                    status: status.as_u16(),
                    body_sample,
                })
            }
        }
    }

    pub async fn put_value(
        &self,
        path: &str,
        body: &Value,
        context: &'static str,
    ) -> Result<Mutation> {
        self.mutate(Method::PUT, path, Some(body), context).await
    }

    pub async fn post_value(
        &self,
        path: &str,
        body: &Value,
        context: &'static str,
    ) -> Result<Mutation> {
        self.mutate(Method::POST, path, Some(body), context).await
    }

    pub async fn post_empty(&self, path: &str, context: &'static str) -> Result<Mutation> {
        self.mutate(Method::POST, path, None, context).await
    }

    pub async fn delete_allow_404(&self, path: &str, context: &'static str) -> Result<()> {
        self.send_expect(self.request(Method::DELETE, path), context, |s| {
            s.is_success() || s == StatusCode::NOT_FOUND
        })
        .await
        .map(drop)
    }
}

pub fn normalize_base_url(base_url: impl Into<Arc<str>>) -> Arc<str> {
    let base_url: Arc<str> = base_url.into();
    if base_url.ends_with('/') {
        Arc::<str>::from(base_url.trim_end_matches('/').to_string())
    } else {
        base_url
    }
}

pub fn truncate_body_snippet(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
