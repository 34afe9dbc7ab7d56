use tgbot::{Bot, HandlerError, Params, PollingOptions, Update, UpdateContext};

async fn echo(cx: UpdateContext, update: Update) -> Result<(), HandlerError> {
    let Some(message) = update.message() else {
        return Ok(());
    };
    let Some(text) = &message.text else {
        return Ok(());
    };
    let params = Params::new()
        .insert("chat_id", message.chat.id)
        .insert("text", text.as_str());
    cx.bot()
        .call_unit_with("sendMessage", &params, cx.cancellation())
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let bot = Bot::from_env()?;
    let me = bot.get_me().await?;
    println!("running as @{}", me.username.unwrap_or(me.first_name));

    // Long polling only works while no webhook is set.
    bot.delete_webhook(false).await?;

    let polling = bot
        .polling()
        .options(PollingOptions::default())
        .handler(echo)
        .start()
        .await?;

    tokio::signal::ctrl_c().await?;
    polling.shutdown().await;
    Ok(())
}
