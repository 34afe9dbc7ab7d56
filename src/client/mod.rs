//! Client layer: request execution, retry/backoff, and error classification.

mod error;
mod methods;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub use error::{ApiError, BotError, RawResponse, is_retryable};
pub(crate) use error::BoxError;

use crate::dispatch::{BoxFuture, HandlerSlot};
use crate::domain::{BotToken, Encoding, ErrorCode, Params, ValidationError};
use crate::transport::{
    EnvelopeError, FormField, build_form, decode_envelope, decode_envelope_unit, encode_json_body,
    plan_multipart,
};

const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Environment variable read by [`Bot::from_env`].
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
/// Per-attempt HTTP timeout used unless overridden.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub(crate) struct HttpResponse {
    pub(crate) status: u16,
    pub(crate) body: Bytes,
}

pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

pub(crate) struct StreamResponse {
    pub(crate) status: u16,
    pub(crate) body: ByteStream,
}

#[derive(Debug, Clone)]
pub(crate) enum RequestBody {
    Json(Vec<u8>),
    Multipart(Vec<FormField>),
}

pub(crate) trait HttpTransport: Send + Sync {
    fn post<'a>(
        &'a self,
        url: &'a str,
        body: &'a RequestBody,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<HttpResponse, BoxError>>;

    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<StreamResponse, BoxError>>;
}

#[derive(Debug, Clone)]
struct ReqwestTransport {
    client: reqwest::Client,
}

impl HttpTransport for ReqwestTransport {
    fn post<'a>(
        &'a self,
        url: &'a str,
        body: &'a RequestBody,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<HttpResponse, BoxError>> {
        Box::pin(async move {
            let request = self.client.post(url).timeout(timeout);
            let request = match body {
                RequestBody::Json(json) => request
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(json.clone()),
                RequestBody::Multipart(fields) => request.multipart(build_form(fields).await?),
            };
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok(HttpResponse { status, body })
        })
    }

    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<StreamResponse, BoxError>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response
                .bytes_stream()
                .map_err(|err| Box::new(err) as BoxError);
            Ok(StreamResponse {
                status,
                body: Box::pin(body),
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Retry policy for HTTP-level failures.
///
/// Only connection errors and timeouts are retried. A received envelope is never
/// retried, whatever its `error_code`.
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub retry_count: u32,
    /// Retry number `n` waits `n * backoff_unit`.
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_RETRY_COUNT: u32 = 3;

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            retry_count: 0,
            backoff_unit: Duration::ZERO,
        }
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_unit.saturating_mul(retry)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: Self::DEFAULT_RETRY_COUNT,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
/// Builder for [`Bot`].
///
/// Use this when you need to customize endpoints, timeouts, retries, or the
/// underlying HTTP client.
pub struct BotBuilder {
    token: BotToken,
    api_url: String,
    file_url: Option<String>,
    request_timeout: Duration,
    user_agent: Option<String>,
    retry: RetryPolicy,
    cancel: Option<CancellationToken>,
    http_client: Option<reqwest::Client>,
}

impl BotBuilder {
    /// Create a builder with the public Bot API endpoint and default timeouts.
    pub fn new(token: BotToken) -> Self {
        Self {
            token,
            api_url: DEFAULT_API_URL.to_owned(),
            file_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: None,
            retry: RetryPolicy::default(),
            cancel: None,
            http_client: None,
        }
    }

    /// Override the API server (for example a self-hosted Bot API server).
    ///
    /// Method calls go to `<api_url>/bot<token>/<method>`.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Override the file server. Defaults to `<api_url>/file`.
    pub fn file_url(mut self, url: impl Into<String>) -> Self {
        self.file_url = Some(url.into());
        self
    }

    /// Per-attempt timeout. `getUpdates` adds its long-poll timeout on top.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the HTTP `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry.retry_count = retry_count;
        self
    }

    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.retry.backoff_unit = unit;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Token observed by every call that is not given one explicitly.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Use a preconfigured `reqwest` client. `user_agent` is ignored in that case.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build a [`Bot`].
    pub fn build(self) -> Result<Bot, BotError> {
        let api_url = normalize_url("api", &self.api_url)?;
        let file_url = match self.file_url {
            Some(url) => normalize_url("file", &url)?,
            None => format!("{api_url}/file"),
        };

        let client = match self.http_client {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(user_agent) = self.user_agent {
                    builder = builder.user_agent(user_agent);
                }
                builder
                    .build()
                    .map_err(|err| BotError::Config(Box::new(err)))?
            }
        };

        Ok(Bot {
            token: self.token,
            api_url,
            file_url,
            request_timeout: self.request_timeout,
            retry: self.retry,
            cancel: self.cancel.unwrap_or_default(),
            http: Arc::new(ReqwestTransport { client }),
            handlers: Arc::default(),
        })
    }
}

fn normalize_url(field: &'static str, input: &str) -> Result<String, ValidationError> {
    let parsed = url::Url::parse(input.trim()).map_err(|_| ValidationError::InvalidUrl {
        field,
        input: input.to_owned(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidUrl {
            field,
            input: input.to_owned(),
        });
    }
    Ok(parsed.as_str().trim_end_matches('/').to_owned())
}

#[derive(Clone)]
/// Telegram Bot API client.
///
/// Cheap to clone; clones share the HTTP connection pool and the registered
/// update handler.
pub struct Bot {
    token: BotToken,
    api_url: String,
    file_url: String,
    request_timeout: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
    http: Arc<dyn HttpTransport>,
    pub(crate) handlers: Arc<HandlerSlot>,
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("token", &self.token)
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Bot {
    /// Create a bot with the default endpoint and settings.
    ///
    /// For more customization, use [`Bot::builder`].
    pub fn new(token: BotToken) -> Self {
        Self {
            token,
            api_url: DEFAULT_API_URL.to_owned(),
            file_url: format!("{DEFAULT_API_URL}/file"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            http: Arc::new(ReqwestTransport {
                client: reqwest::Client::new(),
            }),
            handlers: Arc::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_transport(
        token: BotToken,
        api_url: &str,
        http: Arc<dyn HttpTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            token,
            api_url: api_url.to_owned(),
            file_url: format!("{api_url}/file"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry,
            cancel: CancellationToken::new(),
            http,
            handlers: Arc::default(),
        }
    }

    /// Create a bot from the `TELEGRAM_BOT_TOKEN` environment variable.
    pub fn from_env() -> Result<Self, BotError> {
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| ValidationError::Empty { field: TOKEN_ENV })?;
        Ok(Self::new(BotToken::new(token)?))
    }

    /// Start building a bot with custom settings.
    pub fn builder(token: BotToken) -> BotBuilder {
        BotBuilder::new(token)
    }

    pub fn token(&self) -> &BotToken {
        &self.token
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// The bot-wide token used by calls that are not given one.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token.as_str(), method)
    }

    pub(crate) fn file_endpoint(&self, file_path: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.file_url,
            self.token.as_str(),
            file_path.trim_start_matches('/')
        )
    }

    /// Call `method` and decode its `result` into `T`.
    ///
    /// The body is JSON unless the bag contains an upload, in which case it is
    /// sent as `multipart/form-data`.
    ///
    /// Errors:
    /// - [`BotError::TransportExhausted`] when every attempt failed at the HTTP level,
    /// - [`BotError::Api`] when the service rejected the request,
    /// - [`BotError::MalformedEnvelope`] / [`BotError::MalformedResult`] for unexpected payloads,
    /// - [`BotError::Cancelled`] when the bot's cancellation token fires.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &Params,
    ) -> Result<T, BotError> {
        self.call_with(method, params, &self.cancel).await
    }

    /// Like [`Bot::call`], observing `cancel` instead of the bot-wide token.
    pub async fn call_with<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> Result<T, BotError> {
        self.request(method, params, cancel, Duration::ZERO).await
    }

    /// Call `method` when only success matters; `result` is not inspected.
    pub async fn call_unit(&self, method: &str, params: &Params) -> Result<(), BotError> {
        self.call_unit_with(method, params, &self.cancel).await
    }

    pub async fn call_unit_with(
        &self,
        method: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> Result<(), BotError> {
        let response = self
            .execute(method, params, params.encoding(), cancel, Duration::ZERO)
            .await?;
        decode_envelope_unit(&response.body).map_err(|err| classify(method, &response, err))
    }

    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &Params,
        cancel: &CancellationToken,
        extra_timeout: Duration,
    ) -> Result<T, BotError> {
        let response = self
            .execute(method, params, params.encoding(), cancel, extra_timeout)
            .await?;
        decode_envelope(&response.body).map_err(|err| classify(method, &response, err))
    }

    /// Send one request, retrying HTTP-level failures with linear backoff.
    pub(crate) async fn execute(
        &self,
        method: &str,
        params: &Params,
        encoding: Encoding,
        cancel: &CancellationToken,
        extra_timeout: Duration,
    ) -> Result<HttpResponse, BotError> {
        let body = match encoding {
            Encoding::Json => RequestBody::Json(encode_json_body(params)?),
            Encoding::Multipart => RequestBody::Multipart(plan_multipart(params).await?),
        };
        let url = self.endpoint(method);
        let timeout = self.request_timeout.saturating_add(extra_timeout);
        let max_attempts = self.retry.retry_count.saturating_add(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(BotError::Cancelled);
            }

            debug!(method, attempt, max_attempts, ?encoding, "sending request");
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BotError::Cancelled),
                result = self.http.post(&url, &body, timeout) => result,
            };

            match result {
                Ok(response) => {
                    trace!(
                        method,
                        status = response.status,
                        body = %String::from_utf8_lossy(&response.body),
                        "received response"
                    );
                    return Ok(response);
                }
                Err(err) if attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    debug!(
                        method,
                        attempt,
                        max_attempts,
                        ?delay,
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(BotError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(source) => {
                    warn!(
                        method,
                        attempts = max_attempts,
                        error = %source,
                        "request failed after retries"
                    );
                    return Err(BotError::TransportExhausted {
                        attempts: max_attempts,
                        source,
                    });
                }
            }
        }
    }

    pub(crate) async fn fetch(&self, url: &str) -> Result<StreamResponse, BotError> {
        self.http.get(url).await.map_err(BotError::Transport)
    }
}

fn classify(method: &str, response: &HttpResponse, err: EnvelopeError) -> BotError {
    match err {
        EnvelopeError::Malformed(source) => BotError::MalformedEnvelope {
            status: response.status,
            source,
        },
        EnvelopeError::Rejected {
            code,
            description,
            parameters,
        } => BotError::Api(ApiError {
            code: ErrorCode::new(code),
            message: description,
            parameters,
            response: Some(RawResponse {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }),
        EnvelopeError::MalformedResult(source) => BotError::MalformedResult {
            method: method.to_owned(),
            source,
        },
    }
}
