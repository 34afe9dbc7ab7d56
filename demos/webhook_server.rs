use std::io;
use std::net::SocketAddr;

use tgbot::{
    Bot, CancellationToken, HandlerError, TlsSource, Update, UpdateContext, WebhookConfig,
    WebhookServer,
};

fn required(name: &str) -> io::Result<String> {
    std::env::var(name).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{name} environment variable is required"),
        )
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let public_url = required("WEBHOOK_URL")?;
    let addr: SocketAddr = std::env::var("WEBHOOK_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8443".to_owned())
        .parse()?;
    let secret = std::env::var("WEBHOOK_SECRET").ok();

    let bot = Bot::from_env()?;
    let mut config = WebhookConfig::new(public_url);
    config.secret_token = secret.clone();
    bot.set_webhook(&config).await?;

    let mut server = WebhookServer::new(bot, "/telegram").handler(
        |_cx: UpdateContext, update: Update| async move {
            println!("update {} ({:?})", update.update_id, update.update_type());
            Ok::<_, HandlerError>(())
        },
    );
    if let Some(secret) = secret {
        server = server.secret_token(secret);
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal.cancel();
    });

    // Serve TLS directly when a certificate is given, otherwise expect a proxy.
    match (std::env::var("WEBHOOK_CERT"), std::env::var("WEBHOOK_KEY")) {
        (Ok(cert), Ok(key)) => {
            server
                .serve_tls(addr, TlsSource::pem_files(cert, key), shutdown)
                .await?
        }
        _ => server.serve(addr, shutdown).await?,
    }
    Ok(())
}
