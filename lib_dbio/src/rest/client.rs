//! # REST Client
//!
//! Thin request/response wrapper over `reqwest` for the profile API:
//! fetch a resource, parse JSON, surface non-2xx statuses as typed errors.
//! Every response's ratelimit headers are recorded so callers can inspect
//! the most recent window state. 429 responses map to their own error
//! variant carrying the parsed headers.

use std::sync::Mutex;

use reqwest::header::{HeaderMap, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::bucket::Bucket;
use super::routes;
use crate::collection::Collection;
use crate::errors::{DbioError, RatelimitInfo, Result};
use crate::structures::{ProfilePayload, TopUser};

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestOptions {
    /// API base URL (scheme + host, no version segment).
    pub base_url: String,
    /// Base URL webhook deliveries are posted to.
    pub webhook_base: String,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            base_url: routes::BASE_URL.to_string(),
            webhook_base: routes::WEBHOOK_BASE.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct DetailsResponse {
    payload: ProfilePayload,
}

#[derive(Deserialize)]
struct TopLikesResponse {
    payload: Vec<TopUser>,
}

/// The REST half of the library.
pub struct RestClient {
    inner: reqwest::Client,
    base_url: String,
    webhook_base: String,
    /// Shared with the client facade; REST lookups are served from and
    /// stored into the same cache the gateway merges into.
    user_profiles: Option<Collection<String, ProfilePayload>>,
    ratelimit: Mutex<RatelimitInfo>,
    /// Ratelimit accounting contract; see [`super::bucket`].
    pub bucket: Bucket,
}

impl RestClient {
    /// Creates a REST client, optionally sharing the profile cache.
    pub fn new(
        options: RestOptions,
        user_profiles: Option<Collection<String, ProfilePayload>>,
    ) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: options.base_url.trim_end_matches('/').to_string(),
            webhook_base: options.webhook_base.trim_end_matches('/').to_string(),
            user_profiles,
            ratelimit: Mutex::new(RatelimitInfo::default()),
            bucket: Bucket::default(),
        }
    }

    /// The most recently observed ratelimit headers.
    pub fn ratelimit_info(&self) -> RatelimitInfo {
        *self.ratelimit.lock().expect("ratelimit lock poisoned")
    }

    /// Fetches a user's full profile by id or slug, serving from the
    /// profile cache when possible and storing fresh results back into it.
    pub async fn fetch_user_details(&self, query: &str) -> Result<ProfilePayload> {
        if let Some(cache) = &self.user_profiles {
            if let Some(hit) = cache.get(&query.to_string()) {
                log::debug!("rest: profile cache hit for {query}");
                return Ok(hit);
            }
        }
        let url = self.construct_path(routes::DETAILS, &[("input", query)])?;
        let json = self.request_json(url).await?;
        let details: DetailsResponse = serde_json::from_value(json)
            .map_err(|e| DbioError::Protocol(format!("unexpected details response shape: {e}")))?;
        if let Some(cache) = &self.user_profiles {
            cache.set(query.to_string(), details.payload.clone());
        }
        Ok(details.payload)
    }

    /// Fetches the top-liked users listing.
    pub async fn fetch_top_users(&self) -> Result<Vec<TopUser>> {
        let url = self.construct_path(routes::TOP_LIKES, &[])?;
        let json = self.request_json(url).await?;
        let top: TopLikesResponse = serde_json::from_value(json).map_err(|e| {
            DbioError::Protocol(format!("unexpected top-likes response shape: {e}"))
        })?;
        Ok(top.payload)
    }

    /// Delivers `payload` to a webhook. Fire-and-forget semantics at the
    /// call sites: failures are reported but never retried here.
    pub async fn execute_webhook(
        &self,
        webhook_id: &str,
        token: &str,
        payload: &Value,
    ) -> Result<()> {
        let url = Url::parse(&format!("{}/{webhook_id}/{token}", self.webhook_base))
            .map_err(|e| DbioError::Protocol(format!("invalid webhook URL: {e}")))?;
        let response = self
            .inner
            .post(url)
            .header(USER_AGENT, routes::USER_AGENT)
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DbioError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Builds a fully-qualified URL from the base URL, version and an
    /// endpoint template with `:param` placeholders.
    fn construct_path(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut path = format!("{}{}{}", self.base_url, routes::VERSION, endpoint);
        for (name, value) in params {
            path = path.replace(&format!("{}{name}", routes::PARAM_INDICATOR), value);
        }
        Url::parse(&path).map_err(|e| DbioError::Protocol(format!("invalid API URL {path}: {e}")))
    }

    /// Sends a GET request, records the ratelimit headers, and returns the
    /// parsed JSON body or a typed error for non-2xx statuses.
    async fn request_json(&self, url: Url) -> Result<Value> {
        let response = self
            .inner
            .get(url)
            .header(USER_AGENT, routes::USER_AGENT)
            .send()
            .await?;
        let status = response.status();
        let info = self.record_ratelimit(response.headers());
        let text = response.text().await?;
        let json: Option<Value> = serde_json::from_str(&text).ok();
        let message = || {
            json.as_ref()
                .and_then(|j| j.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| text.clone())
        };

        if status.as_u16() == 429 {
            return Err(DbioError::Ratelimit {
                message: message(),
                info,
            });
        }
        if !status.is_success() {
            return Err(DbioError::Api {
                status: status.as_u16(),
                message: message(),
            });
        }
        json.ok_or_else(|| DbioError::Api {
            status: status.as_u16(),
            message: "invalid JSON returned from request - API down?".to_string(),
        })
    }

    fn record_ratelimit(&self, headers: &HeaderMap) -> RatelimitInfo {
        let info = RatelimitInfo {
            limit: header_u64(headers, routes::headers::RATELIMIT_LIMIT),
            remaining: header_u64(headers, routes::headers::RATELIMIT_REMAINING),
            reset: header_u64(headers, routes::headers::RATELIMIT_RESET),
        };
        *self.ratelimit.lock().expect("ratelimit lock poisoned") = info;
        info
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}
