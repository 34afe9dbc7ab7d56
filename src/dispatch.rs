//! Update dispatch: the handler seam shared by long polling and the webhook.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::Bot;
use crate::domain::Update;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error a handler reports for one update. It is logged, never retried.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Clone)]
/// What a handler gets alongside the update.
pub struct UpdateContext {
    bot: Bot,
    cancel: CancellationToken,
}

impl UpdateContext {
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Fires when the delivery mechanism that produced this update is shut down
    /// (polling) or when the HTTP request is dropped (webhook).
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Consumer of incoming updates.
///
/// Implemented for every `Fn(UpdateContext, Update) -> impl Future<Output = Result<(), E>>`,
/// so plain async closures work:
///
/// ```rust,no_run
/// # use tgbot::{UpdateContext, Update, HandlerError};
/// let handler = |_cx: UpdateContext, update: Update| async move {
///     println!("got update {}", update.update_id);
///     Ok::<_, HandlerError>(())
/// };
/// # let _ = handler;
/// ```
pub trait UpdateHandler: Send + Sync + 'static {
    fn handle(
        &self,
        cx: UpdateContext,
        update: Update,
    ) -> BoxFuture<'static, Result<(), HandlerError>>;
}

impl<F, Fut, E> UpdateHandler for F
where
    F: Fn(UpdateContext, Update) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<HandlerError>,
{
    fn handle(
        &self,
        cx: UpdateContext,
        update: Update,
    ) -> BoxFuture<'static, Result<(), HandlerError>> {
        let fut = self(cx, update);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// The handler currently registered on a bot.
///
/// Readers clone the `Arc` and release the lock before awaiting the handler, so a
/// replacement never waits on a running handler.
#[derive(Default)]
pub(crate) struct HandlerSlot {
    current: RwLock<Option<Arc<dyn UpdateHandler>>>,
}

impl HandlerSlot {
    pub(crate) async fn install(&self, handler: Arc<dyn UpdateHandler>) {
        *self.current.write().await = Some(handler);
    }

    /// Clear the slot if it still holds `handler`.
    pub(crate) async fn release(&self, handler: &Arc<dyn UpdateHandler>) {
        let mut current = self.current.write().await;
        if current.as_ref().is_some_and(|installed| {
            std::ptr::addr_eq(Arc::as_ptr(installed), Arc::as_ptr(handler))
        }) {
            *current = None;
        }
    }

    pub(crate) async fn current(&self) -> Option<Arc<dyn UpdateHandler>> {
        self.current.read().await.clone()
    }
}

impl Bot {
    /// Hand one update to the registered handler.
    ///
    /// With no handler registered the update is dropped and `Ok(())` returned.
    pub async fn dispatch(
        &self,
        update: Update,
        cancel: CancellationToken,
    ) -> Result<(), HandlerError> {
        let Some(handler) = self.handlers.current().await else {
            trace!(update_id = update.update_id, "no handler registered; dropping update");
            return Ok(());
        };
        let cx = UpdateContext {
            bot: self.clone(),
            cancel,
        };
        handler.handle(cx, update).await
    }

    /// Register `handler` for updates delivered through [`Bot::dispatch`].
    ///
    /// Long polling and the webhook server register their own handler on start.
    pub async fn set_handler(&self, handler: impl UpdateHandler) {
        self.handlers.install(Arc::new(handler)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::client::RetryPolicy;
    use crate::client::testing::{FakeTransport, bot_with};
    use crate::domain::UpdateKind;

    fn bot() -> Bot {
        bot_with(
            FakeTransport::json(200, r#"{"ok":true,"result":true}"#),
            RetryPolicy::none(),
        )
    }

    fn update(id: i64) -> Update {
        serde_json::from_value(serde_json::json!({ "update_id": id })).unwrap()
    }

    #[tokio::test]
    async fn dispatch_without_handler_is_noop() {
        let bot = bot();
        assert!(bot.dispatch(update(1), CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn dispatch_reaches_registered_handler() {
        let bot = bot();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bot.set_handler(move |_cx: UpdateContext, update: Update| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(update.update_id);
                Ok::<_, HandlerError>(())
            }
        })
        .await;

        bot.dispatch(update(7), CancellationToken::new()).await.unwrap();
        bot.clone()
            .dispatch(update(8), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
    }

    #[tokio::test]
    async fn handler_errors_are_returned() {
        let bot = bot();
        bot.set_handler(|_cx: UpdateContext, _update: Update| async {
            Err::<(), _>(std::io::Error::other("boom"))
        })
        .await;

        let err = bot.dispatch(update(1), CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn handler_sees_context() {
        let bot = bot();
        bot.set_handler(|cx: UpdateContext, update: Update| async move {
            assert!(cx.cancellation().is_cancelled());
            assert!(matches!(update.kind, UpdateKind::Unknown { .. }));
            assert_eq!(cx.bot().token().as_str(), "123:abc");
            Ok::<_, HandlerError>(())
        })
        .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        bot.dispatch(update(1), cancel).await.unwrap();
    }

    #[tokio::test]
    async fn release_only_clears_own_handler() {
        let slot = HandlerSlot::default();
        let first: Arc<dyn UpdateHandler> =
            Arc::new(|_cx: UpdateContext, _u: Update| async { Ok::<_, HandlerError>(()) });
        let second: Arc<dyn UpdateHandler> =
            Arc::new(|_cx: UpdateContext, _u: Update| async { Ok::<_, HandlerError>(()) });

        slot.install(first.clone()).await;
        slot.install(second.clone()).await;
        slot.release(&first).await;
        assert!(slot.current().await.is_some());

        slot.release(&second).await;
        assert!(slot.current().await.is_none());
    }
}
