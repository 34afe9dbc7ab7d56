//! Long polling: fetch batches with `getUpdates`, advance the cursor, dispatch.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::value::RawValue;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{Bot, BotError};
use crate::dispatch::UpdateHandler;
use crate::domain::{PollingOptions, Update};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle of a polling loop after [`PollingBuilder::start`].
pub enum PollingState {
    Running,
    /// Stop requested; in-flight handlers are draining.
    Stopping,
    Stopped,
}

/// Next `getUpdates` offset after receiving `update_ids`.
///
/// Never decreases; for a non-empty batch at or past `offset` it is the largest
/// `update_id` plus one.
pub fn advance_offset(offset: i64, update_ids: impl IntoIterator<Item = i64>) -> i64 {
    update_ids.into_iter().fold(offset, |offset, update_id| {
        if update_id >= offset {
            update_id.saturating_add(1)
        } else {
            offset
        }
    })
}

#[derive(Deserialize)]
struct UpdateId {
    update_id: i64,
}

/// Split a raw batch into the ids to acknowledge and the updates that decoded.
///
/// An item that does not decode is acknowledged and skipped, so it cannot hold
/// back the rest of the stream.
fn decode_batch(items: &[Box<RawValue>]) -> (Vec<i64>, Vec<Update>) {
    let mut ids = Vec::with_capacity(items.len());
    let mut updates = Vec::with_capacity(items.len());
    for item in items {
        let update_id = match serde_json::from_str::<UpdateId>(item.get()) {
            Ok(UpdateId { update_id }) => update_id,
            Err(err) => {
                warn!(error = %err, "skipping update without a usable update_id");
                continue;
            }
        };
        ids.push(update_id);
        match serde_json::from_str::<Update>(item.get()) {
            Ok(update) => updates.push(update),
            Err(err) => {
                warn!(update_id, error = %err, "skipping update that failed to decode");
            }
        }
    }
    (ids, updates)
}

/// A polling loop that has not been started yet.
pub struct PollingBuilder {
    bot: Bot,
    handler: Option<Arc<dyn UpdateHandler>>,
    options: PollingOptions,
    cancel: Option<CancellationToken>,
}

impl Bot {
    /// Configure long polling for this bot.
    pub fn polling(&self) -> PollingBuilder {
        PollingBuilder {
            bot: self.clone(),
            handler: None,
            options: PollingOptions::default(),
            cancel: None,
        }
    }

    /// Start long polling with `handler` and `options`.
    pub async fn start_polling(
        &self,
        handler: impl UpdateHandler,
        options: PollingOptions,
    ) -> Result<PollingHandle, BotError> {
        self.polling().handler(handler).options(options).start().await
    }
}

impl PollingBuilder {
    pub fn handler(mut self, handler: impl UpdateHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn options(mut self, options: PollingOptions) -> Self {
        self.options = options;
        self
    }

    /// Governing token; defaults to the bot-wide token. Cancelling it stops the
    /// loop and is what handlers observe through their context.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Register the handler and spawn the loop.
    ///
    /// Fails with [`BotError::HandlerRequired`] when no handler was given, or
    /// [`BotError::Validation`] for out-of-range options.
    pub async fn start(self) -> Result<PollingHandle, BotError> {
        let handler = self.handler.ok_or(BotError::HandlerRequired)?;
        self.options.validate()?;

        self.bot.handlers.install(handler.clone()).await;

        let governing = self
            .cancel
            .unwrap_or_else(|| self.bot.cancellation().clone());
        let stop = governing.child_token();
        let (state, state_rx) = watch::channel(PollingState::Running);

        info!(
            offset = self.options.offset,
            limit = self.options.limit,
            timeout = ?self.options.timeout,
            "long polling started"
        );
        let poller = Poller {
            bot: self.bot,
            options: self.options,
            handler,
            governing,
            stop: stop.clone(),
            state,
        };
        let task = tokio::spawn(poller.run());

        Ok(PollingHandle {
            stop,
            state: state_rx,
            task,
        })
    }
}

#[derive(Debug)]
/// Control handle of a running polling loop.
///
/// Dropping the handle does not stop the loop.
pub struct PollingHandle {
    stop: CancellationToken,
    state: watch::Receiver<PollingState>,
    task: JoinHandle<()>,
}

impl PollingHandle {
    /// Request a stop. Idempotent.
    ///
    /// The current fetch is abandoned, undispatched updates of the current batch
    /// are dropped, and in-flight handlers get the drain timeout to finish.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn state(&self) -> PollingState {
        *self.state.borrow()
    }

    /// Wait until the loop has stopped (after [`PollingHandle::stop`] or
    /// cancellation of the governing token).
    pub async fn stopped(self) {
        if let Err(err) = self.task.await
            && err.is_panic()
        {
            std::panic::resume_unwind(err.into_panic());
        }
    }

    /// [`PollingHandle::stop`] followed by [`PollingHandle::stopped`].
    pub async fn shutdown(self) {
        self.stop();
        self.stopped().await;
    }
}

struct Poller {
    bot: Bot,
    options: PollingOptions,
    handler: Arc<dyn UpdateHandler>,
    governing: CancellationToken,
    stop: CancellationToken,
    state: watch::Sender<PollingState>,
}

impl Poller {
    async fn run(self) {
        let Self {
            bot,
            options,
            handler,
            governing,
            stop,
            state,
        } = self;

        let permits = Arc::new(Semaphore::new(options.max_concurrent_handlers));
        let mut in_flight = JoinSet::new();
        let mut offset = options.offset;

        'poll: loop {
            while let Some(result) = in_flight.try_join_next() {
                report(result);
            }
            if stop.is_cancelled() {
                break;
            }

            let request = options.request(offset);
            let items = match bot.get_update_batch(&request, &stop).await {
                Ok(items) => items,
                Err(BotError::Cancelled) => break,
                Err(err) => {
                    warn!(offset, error = %err, "failed to fetch updates");
                    if idle(&stop, options.poll_interval).await {
                        break;
                    }
                    continue;
                }
            };
            if items.is_empty() {
                if idle(&stop, options.poll_interval).await {
                    break;
                }
                continue;
            }

            let (ids, updates) = decode_batch(&items);
            offset = advance_offset(offset, ids);
            debug!(
                received = items.len(),
                decoded = updates.len(),
                offset,
                "received updates"
            );

            let mut pending = updates.into_iter();
            while let Some(update) = pending.next() {
                let permit = tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        warn!(
                            dropped = pending.len() + 1,
                            "polling stopped before the whole batch was dispatched"
                        );
                        break 'poll;
                    }
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'poll,
                    },
                };

                let bot = bot.clone();
                let cancel = governing.clone();
                in_flight.spawn(async move {
                    let update_id = update.update_id;
                    if let Err(err) = bot.dispatch(update, cancel).await {
                        warn!(update_id, error = %err, "update handler failed");
                    }
                    drop(permit);
                });
            }
        }

        state.send_replace(PollingState::Stopping);
        drain(&mut in_flight, options.drain_timeout).await;
        bot.handlers.release(&handler).await;
        state.send_replace(PollingState::Stopped);
        info!(offset, "long polling stopped");
    }
}

/// Sleep for `interval` unless stopped first. Returns `true` when stopped.
async fn idle(stop: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        biased;
        _ = stop.cancelled() => true,
        _ = tokio::time::sleep(interval) => false,
    }
}

async fn drain(in_flight: &mut JoinSet<()>, timeout: Duration) {
    if in_flight.is_empty() {
        return;
    }
    debug!(running = in_flight.len(), "waiting for update handlers");
    let wait = async {
        while let Some(result) = in_flight.join_next().await {
            report(result);
        }
    };
    if tokio::time::timeout(timeout, wait).await.is_err() {
        warn!(
            aborted = in_flight.len(),
            "update handlers did not finish within the drain timeout"
        );
        in_flight.shutdown().await;
    }
}

fn report(result: Result<(), JoinError>) {
    if let Err(err) = result
        && err.is_panic()
    {
        error!("update handler panicked");
    }
}
