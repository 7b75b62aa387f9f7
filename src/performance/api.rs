//! Performance API client.

use anyhow::Context;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use url::Url;

use crate::performance::errors::{PerformanceApiError, without_url};
use crate::performance::json::parse_json_with_context;
use crate::performance::middleware::TransactionLogger;
use crate::sync::dispatch::Fetcher;
use crate::sync::entity::CachedEntity;
use crate::sync::key::CacheKey;
use crate::sync::window::Window;

/// Error bodies longer than this are cut before they land in an error message.
const MAX_ERROR_BODY: usize = 512;

/// One shared client for every refresh; the rate limiter spans all concurrent key tasks.
pub struct PerformanceApi {
    http: ClientWithMiddleware,
    /// Always ends with `/` so endpoints append as path segments.
    base_url: String,
    api_key: String,
    limiter: DefaultDirectRateLimiter,
}

impl PerformanceApi {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        requests_per_second: NonZeroU32,
    ) -> anyhow::Result<Self> {
        let http = ClientBuilder::new(
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("failed to build Performance API HTTP client")?,
        )
        .with(TransactionLogger)
        .build();

        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            api_key: api_key.into(),
            limiter: RateLimiter::direct(Quota::per_second(requests_per_second)),
        })
    }

    /// GET `endpoint` with the credential, `format=json` and `query`, decoding the body as `R`.
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<R, PerformanceApiError> {
        self.limiter.until_ready().await;

        // Reported URLs never include the query string, which carries the credential.
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("format", "json")])
            .query(query)
            .send()
            .await
            .map_err(|source| PerformanceApiError::Request {
                url: url.clone(),
                source: without_url(source),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(PerformanceApiError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| PerformanceApiError::Request {
                url: url.clone(),
                source: without_url(source.into()),
            })?;

        parse_json_with_context(&body)
            .map_err(|source| PerformanceApiError::ParseFailed { url, source })
    }
}

#[async_trait]
impl<E: CachedEntity> Fetcher<E> for PerformanceApi {
    async fn fetch(&self, key: &E::Key, window: &Window) -> Result<Vec<E>, PerformanceApiError> {
        let mut query = key.filter_params();
        query.push(("from_datetime", window.start.timestamp().to_string()));
        query.push(("to_datetime", window.end.timestamp().to_string()));

        let response: E::Response = self.get_json(E::KIND.endpoint(), &query).await?;
        Ok(E::from_response(response, key))
    }
}

fn normalize_base_url(raw: &str) -> anyhow::Result<String> {
    let mut url =
        Url::parse(raw).with_context(|| format!("invalid Performance API URL {raw:?}"))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("Performance API URL {raw:?} cannot have endpoint paths");
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    Ok(url.to_string())
}
