//! HTTP scheduler client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use usher_api::ScheduleName;
use usher_scheduler_api::{
    ExternalScheduler, SchedulerError, SchedulerResult, TriggerPayload, UpsertRequest,
};

/// Configuration for the HTTP scheduler backend
#[derive(Debug, Clone)]
pub struct HttpSchedulerConfig {
    /// Base URL of the scheduler API, without the `/schedules` suffix
    pub base_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Transport-level timeout for a single request
    pub request_timeout: Duration,
}

impl HttpSchedulerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct UpsertBody<'a> {
    fire_at: DateTime<Utc>,
    target: &'a str,
    action_label: &'a str,
    description: &'a str,
    payload: &'a TriggerPayload,
}

/// External scheduler reached over HTTP
pub struct HttpScheduler {
    base_url: Url,
    http: Client,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl HttpScheduler {
    pub fn new(config: HttpSchedulerConfig) -> SchedulerResult<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            SchedulerError::InvalidRequest(format!("bad base_url '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SchedulerError::InvalidRequest(format!(
                "base_url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SchedulerError::internal(e.to_string()))?;

        Ok(Self {
            base_url,
            http,
            auth_token: config.auth_token,
            request_timeout: config.request_timeout,
        })
    }

    fn schedule_url(&self, name: &ScheduleName) -> SchedulerResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SchedulerError::InvalidRequest("base_url cannot carry a path".into()))?
            .pop_if_empty()
            .push("schedules")
            .push(&name.to_string());
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SchedulerError {
        if err.is_timeout() {
            SchedulerError::Timeout(self.request_timeout)
        } else {
            SchedulerError::transport(err.to_string())
        }
    }

    async fn map_status(response: reqwest::Response) -> SchedulerResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        let code = status.as_u16();

        Err(match status {
            StatusCode::NOT_FOUND => SchedulerError::NotFound(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                SchedulerError::Unavailable {
                    status: code,
                    message,
                }
            }
            s if s.is_client_error() => SchedulerError::Rejected {
                status: code,
                message,
            },
            _ => SchedulerError::Unavailable {
                status: code,
                message,
            },
        })
    }
}

#[async_trait]
impl ExternalScheduler for HttpScheduler {
    fn backend(&self) -> &'static str {
        "http"
    }

    async fn upsert(&self, request: &UpsertRequest) -> SchedulerResult<()> {
        let url = self.schedule_url(&request.name)?;
        let body = UpsertBody {
            fire_at: request.fire_at,
            target: &request.target,
            action_label: &request.action_label,
            description: &request.description,
            payload: &request.payload,
        };

        debug!(url = %url, fire_at = %request.fire_at, "PUT schedule");

        let response = self
            .authorize(self.http.put(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        Self::map_status(response).await
    }

    async fn delete(&self, name: &ScheduleName) -> SchedulerResult<()> {
        let url = self.schedule_url(name)?;

        debug!(url = %url, "DELETE schedule");

        let response = self
            .authorize(self.http.delete(url))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        match Self::map_status(response).await {
            Err(SchedulerError::NotFound(_)) => Ok(()),
            other => other,
        }
    }
}
