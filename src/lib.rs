//! Typed Rust client for the Telegram Bot API.
//!
//! The crate is split into a domain layer of strong types, a transport layer for
//! wire-format details (response envelopes, JSON and multipart bodies), and a
//! client layer that executes requests with bounded retries. Updates are
//! delivered either by long polling or by a webhook server; both hand them to a
//! single [`UpdateHandler`].
//!
//! ```rust,no_run
//! use tgbot::{Bot, HandlerError, Params, PollingOptions, Update, UpdateContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tgbot::BotError> {
//!     let bot = Bot::from_env()?;
//!     let polling = bot
//!         .polling()
//!         .options(PollingOptions::default())
//!         .handler(|cx: UpdateContext, update: Update| async move {
//!             if let Some(message) = update.message()
//!                 && let Some(text) = &message.text
//!             {
//!                 let params = Params::new()
//!                     .insert("chat_id", message.chat.id)
//!                     .insert("text", text.as_str());
//!                 cx.bot().call_unit("sendMessage", &params).await?;
//!             }
//!             Ok::<_, HandlerError>(())
//!         })
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     polling.shutdown().await;
//!     Ok(())
//! }
//! ```
#![forbid(unsafe_code)]

pub mod client;
pub mod dispatch;
pub mod domain;
pub mod polling;
mod transport;
pub mod webhook;

pub use client::{ApiError, Bot, BotBuilder, BotError, RawResponse, RetryPolicy, is_retryable};
pub use dispatch::{HandlerError, UpdateContext, UpdateHandler};
pub use domain::{
    BotToken, CallbackQuery, Chat, ErrorCode, File, GetUpdates, InputFile, KnownErrorCode,
    Message, Params, PollingOptions, ResponseParameters, Update, UpdateKind, UpdateType, User,
    ValidationError, WebhookConfig, WebhookInfo,
};
pub use polling::{PollingBuilder, PollingHandle, PollingState, advance_offset};
pub use tokio_util::sync::CancellationToken;
pub use transport::EncodeError;
pub use webhook::{SECRET_TOKEN_HEADER, TlsSource, WebhookServer};
