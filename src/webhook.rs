//! Webhook ingress: an HTTP endpoint the service pushes updates to.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{Bot, BotError};
use crate::dispatch::UpdateHandler;
use crate::domain::Update;

/// Header carrying the `secret_token` given to `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Clone)]
/// Certificate material for [`WebhookServer::serve_tls`].
pub enum TlsSource {
    /// PEM certificate chain and private key on disk.
    PemFiles { cert: PathBuf, key: PathBuf },
    /// A ready `rustls` configuration.
    Config(Arc<ServerConfig>),
}

impl TlsSource {
    pub fn pem_files(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self::PemFiles {
            cert: cert.into(),
            key: key.into(),
        }
    }

    fn server_config(self) -> Result<Arc<ServerConfig>, BotError> {
        let (cert, key) = match self {
            Self::Config(config) => return Ok(config),
            Self::PemFiles { cert, key } => (cert, key),
        };

        let certs = CertificateDer::pem_file_iter(&cert)
            .map_err(config_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(config_error)?;
        let key = PrivateKeyDer::from_pem_file(&key).map_err(config_error)?;

        let provider = Arc::new(tokio_rustls::rustls::crypto::aws_lc_rs::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(config_error)?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(config_error)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

fn config_error(err: impl std::error::Error + Send + Sync + 'static) -> BotError {
    BotError::Config(Box::new(err))
}

fn server_error(err: impl std::error::Error + Send + Sync + 'static) -> BotError {
    BotError::Server(Box::new(err))
}

/// Receives updates over HTTP(S) and dispatches them to the bot's handler.
///
/// Response codes: `200` once the handler returned `Ok`, `400` for a body that is
/// not an update, `401` for a wrong secret token, `405` for anything but `POST`,
/// `500` when the handler failed. The service redelivers on non-2xx.
pub struct WebhookServer {
    bot: Bot,
    path: String,
    handler: Option<Arc<dyn UpdateHandler>>,
    secret_token: Option<String>,
}

#[derive(Clone)]
struct WebhookState {
    bot: Bot,
    secret_token: Option<Arc<str>>,
}

impl WebhookServer {
    /// Serve updates at `path` (for example `/telegram`).
    pub fn new(bot: Bot, path: impl Into<String>) -> Self {
        Self {
            bot,
            path: path.into(),
            handler: None,
            secret_token: None,
        }
    }

    pub fn handler(mut self, handler: impl UpdateHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Require the `X-Telegram-Bot-Api-Secret-Token` header to match.
    pub fn secret_token(mut self, token: impl Into<String>) -> Self {
        self.secret_token = Some(token.into());
        self
    }

    /// Register the handler and build the router, for embedding into an existing
    /// axum application.
    pub async fn into_router(self) -> Result<Router, BotError> {
        let handler = self.handler.ok_or(BotError::HandlerRequired)?;
        self.bot.handlers.install(handler).await;

        let path = match self.path.trim() {
            path if path.starts_with('/') => path.to_owned(),
            path => format!("/{path}"),
        };
        let state = WebhookState {
            bot: self.bot,
            secret_token: self.secret_token.map(Arc::from),
        };
        Ok(Router::new()
            .route(&path, post(receive_update))
            .with_state(state))
    }

    /// Bind `addr` and serve plain HTTP until `shutdown` fires.
    ///
    /// Use this behind a TLS-terminating proxy; the service only pushes to HTTPS.
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(), BotError> {
        let listener = TcpListener::bind(addr).await.map_err(server_error)?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve plain HTTP on an already bound listener until `shutdown` fires.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), BotError> {
        let router = self.into_router().await?;
        info!(addr = ?listener.local_addr().ok(), "webhook server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(server_error)?;
        info!("webhook server stopped");
        Ok(())
    }

    /// Bind `addr` and serve HTTPS until `shutdown` fires.
    ///
    /// Connections already accepted run to completion after `shutdown`.
    pub async fn serve_tls(
        self,
        addr: SocketAddr,
        tls: TlsSource,
        shutdown: CancellationToken,
    ) -> Result<(), BotError> {
        let acceptor = TlsAcceptor::from(tls.server_config()?);
        let listener = TcpListener::bind(addr).await.map_err(server_error)?;
        let router = self.into_router().await?;
        info!(%addr, "webhook server listening (TLS)");

        loop {
            let (tcp, peer) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                        continue;
                    }
                },
            };

            let acceptor = acceptor.clone();
            let router = router.clone();
            tokio::spawn(async move {
                let stream = match acceptor.accept(tcp).await {
                    Ok(stream) => stream,
                    Err(err) => {
                        debug!(%peer, error = %err, "TLS handshake failed");
                        return;
                    }
                };
                let builder = auto::Builder::new(TokioExecutor::new());
                let service = TowerToHyperService::new(router);
                if let Err(err) = builder
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(%peer, error = %err, "webhook connection closed with error");
                }
            });
        }

        info!("webhook server stopped");
        Ok(())
    }
}

async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = state.secret_token.as_deref() {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected) {
            warn!("rejected webhook request with a wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(err) => {
            debug!(error = %err, "webhook body is not an update");
            return StatusCode::BAD_REQUEST;
        }
    };

    let update_id = update.update_id;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    match state.bot.dispatch(update, cancel).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!(update_id, error = %err, "update handler failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
