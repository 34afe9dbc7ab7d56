use std::time::Duration;

use crate::domain::params::{InputFile, Params};
use crate::domain::update::UpdateType;
use crate::domain::validation::ValidationError;

/// Largest batch `getUpdates` accepts.
pub const GET_UPDATES_MAX_LIMIT: u32 = 100;
/// Largest `max_connections` `setWebhook` accepts.
pub const WEBHOOK_MAX_CONNECTIONS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A single `getUpdates` request.
pub struct GetUpdates {
    pub offset: i64,
    pub limit: u32,
    /// Server-side long-poll timeout.
    pub timeout: Duration,
    pub allowed_updates: Vec<UpdateType>,
}

impl GetUpdates {
    pub fn to_params(&self) -> Params {
        let params = Params::new()
            .insert("offset", self.offset)
            .insert("limit", self.limit)
            .insert("timeout", self.timeout.as_secs() as i64);
        if self.allowed_updates.is_empty() {
            return params;
        }
        let names = self
            .allowed_updates
            .iter()
            .map(|ty| serde_json::Value::from(ty.as_str()))
            .collect::<Vec<_>>();
        params.insert("allowed_updates", serde_json::Value::Array(names))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Settings of the long-polling loop.
pub struct PollingOptions {
    /// Server-side long-poll timeout sent with every `getUpdates`.
    pub timeout: Duration,
    /// Maximum number of updates per fetch (`1..=100`).
    pub limit: u32,
    /// Initial cursor.
    pub offset: i64,
    /// Update kinds to receive; empty keeps the service's current setting.
    pub allowed_updates: Vec<UpdateType>,
    /// Pause after an empty batch or a failed fetch.
    pub poll_interval: Duration,
    /// Upper bound on handlers running at the same time.
    pub max_concurrent_handlers: usize,
    /// How long a stopping loop waits for in-flight handlers before aborting them.
    pub drain_timeout: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            limit: GET_UPDATES_MAX_LIMIT,
            offset: 0,
            allowed_updates: Vec::new(),
            poll_interval: Duration::from_millis(100),
            max_concurrent_handlers: 100,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl PollingOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=GET_UPDATES_MAX_LIMIT).contains(&self.limit) {
            return Err(ValidationError::OutOfRange {
                field: "limit",
                min: 1,
                max: u64::from(GET_UPDATES_MAX_LIMIT),
                actual: u64::from(self.limit),
            });
        }
        if self.max_concurrent_handlers == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_concurrent_handlers",
                min: 1,
                max: u64::MAX,
                actual: 0,
            });
        }
        Ok(())
    }

    pub(crate) fn request(&self, offset: i64) -> GetUpdates {
        GetUpdates {
            offset,
            limit: self.limit,
            timeout: self.timeout,
            allowed_updates: self.allowed_updates.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Arguments of `setWebhook`.
pub struct WebhookConfig {
    /// HTTPS URL the service will push updates to.
    pub url: String,
    /// Public key certificate for self-signed setups.
    pub certificate: Option<InputFile>,
    pub ip_address: Option<String>,
    pub max_connections: Option<u32>,
    pub allowed_updates: Vec<UpdateType>,
    pub drop_pending_updates: bool,
    /// Echoed back in `X-Telegram-Bot-Api-Secret-Token` on every push.
    pub secret_token: Option<String>,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn to_params(&self) -> Result<Params, ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::Empty { field: "url" });
        }
        if url::Url::parse(&self.url).is_err() {
            return Err(ValidationError::InvalidUrl {
                field: "webhook",
                input: self.url.clone(),
            });
        }
        if let Some(max) = self.max_connections
            && !(1..=WEBHOOK_MAX_CONNECTIONS).contains(&max)
        {
            return Err(ValidationError::OutOfRange {
                field: "max_connections",
                min: 1,
                max: u64::from(WEBHOOK_MAX_CONNECTIONS),
                actual: u64::from(max),
            });
        }

        let mut params = Params::new()
            .insert("url", self.url.as_str())
            .insert_opt("certificate", self.certificate.clone())
            .insert_opt("ip_address", self.ip_address.clone())
            .insert_opt("max_connections", self.max_connections)
            .insert_opt("secret_token", self.secret_token.clone());
        if !self.allowed_updates.is_empty() {
            let names = self
                .allowed_updates
                .iter()
                .map(|ty| serde_json::Value::from(ty.as_str()))
                .collect::<Vec<_>>();
            params = params.insert("allowed_updates", serde_json::Value::Array(names));
        }
        if self.drop_pending_updates {
            params = params.insert("drop_pending_updates", true);
        }
        Ok(params)
    }
}
