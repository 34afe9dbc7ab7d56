use std::io;

use tgbot::Bot;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let file_id = std::env::var("TELEGRAM_FILE_ID").map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "TELEGRAM_FILE_ID environment variable is required",
        )
    })?;
    let dest = std::env::var("TELEGRAM_FILE_DEST").unwrap_or_else(|_| "download.bin".to_owned());

    let bot = Bot::from_env()?;
    let file = bot.get_file_and_download(&file_id, &dest).await?;
    println!(
        "saved {} ({} bytes) to {dest}",
        file.file_path.unwrap_or_default(),
        file.file_size.unwrap_or_default()
    );

    Ok(())
}
