use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use serde_json::value::RawValue;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Bot, BotError};
use crate::domain::{
    File, GetUpdates, Params, Update, User, ValidationError, WebhookConfig, WebhookInfo,
};

impl Bot {
    /// `getMe`: the bot's own account. Useful as a token check.
    pub async fn get_me(&self) -> Result<User, BotError> {
        self.call("getMe", &Params::new()).await
    }

    /// `getUpdates` with the bot-wide cancellation token.
    pub async fn get_updates(&self, request: &GetUpdates) -> Result<Vec<Update>, BotError> {
        self.get_updates_with(request, self.cancellation()).await
    }

    /// `getUpdates` observing `cancel`.
    ///
    /// Decoding is strict: one update that does not decode fails the call with
    /// [`BotError::MalformedResult`]. The polling loop decodes item by item instead.
    ///
    /// The HTTP timeout of each attempt is extended by the long-poll timeout so a
    /// quiet long poll is not mistaken for a transport failure.
    pub async fn get_updates_with(
        &self,
        request: &GetUpdates,
        cancel: &CancellationToken,
    ) -> Result<Vec<Update>, BotError> {
        self.request("getUpdates", &request.to_params(), cancel, request.timeout)
            .await
    }

    /// `getUpdates` with every item left undecoded, so one bad update cannot
    /// fail the whole batch.
    pub(crate) async fn get_update_batch(
        &self,
        request: &GetUpdates,
        cancel: &CancellationToken,
    ) -> Result<Vec<Box<RawValue>>, BotError> {
        self.request("getUpdates", &request.to_params(), cancel, request.timeout)
            .await
    }

    /// `setWebhook`. A certificate upload switches the body to multipart.
    pub async fn set_webhook(&self, config: &WebhookConfig) -> Result<(), BotError> {
        let params = config.to_params()?;
        self.call_unit("setWebhook", &params).await
    }

    /// `deleteWebhook`, required before switching back to long polling.
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<(), BotError> {
        let params = Params::new().insert_opt(
            "drop_pending_updates",
            drop_pending_updates.then_some(true),
        );
        self.call_unit("deleteWebhook", &params).await
    }

    pub async fn get_webhook_info(&self) -> Result<WebhookInfo, BotError> {
        self.call("getWebhookInfo", &Params::new()).await
    }

    /// `getFile`: resolve a `file_id` into a downloadable [`File`].
    pub async fn get_file(&self, file_id: &str) -> Result<File, BotError> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(ValidationError::Empty { field: "file_id" }.into());
        }
        self.call("getFile", &Params::new().insert("file_id", file_id))
            .await
    }

    /// Download URL of a resolved file, if the service returned a `file_path`.
    ///
    /// The URL embeds the bot token; do not log or share it.
    pub fn file_url(&self, file: &File) -> Option<String> {
        file.file_path
            .as_deref()
            .map(|file_path| self.file_endpoint(file_path))
    }

    /// Stream a resolved file to `dest`, returning the number of bytes written.
    ///
    /// The body is written to `<dest>.part` and renamed over `dest` once complete,
    /// so a failed download leaves an existing `dest` untouched. Downloads are not
    /// retried; each chunk must arrive within the request timeout.
    pub async fn download_file(
        &self,
        file: &File,
        dest: impl AsRef<Path>,
    ) -> Result<u64, BotError> {
        let dest = dest.as_ref();
        let url = self.file_url(file).ok_or(ValidationError::Empty {
            field: "file_path",
        })?;
        let part = partial_path(dest);

        let cancel = self.cancellation().clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BotError::Cancelled),
            result = self.stream_to(&url, &part) => result,
        };
        let result = match result {
            Ok(written) => tokio::fs::rename(&part, dest)
                .await
                .map(|()| written)
                .map_err(BotError::from),
            Err(err) => Err(err),
        };

        match result {
            Ok(written) => {
                debug!(file_id = %file.file_id, written, "file downloaded");
                Ok(written)
            }
            Err(err) => {
                if let Err(remove_err) = tokio::fs::remove_file(&part).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(
                        path = ?part,
                        error = %remove_err,
                        "failed to remove partial download"
                    );
                }
                Err(err)
            }
        }
    }

    /// `getFile` followed by [`Bot::download_file`].
    pub async fn get_file_and_download(
        &self,
        file_id: &str,
        dest: impl AsRef<Path>,
    ) -> Result<File, BotError> {
        let file = self.get_file(file_id).await?;
        self.download_file(&file, dest).await?;
        Ok(file)
    }

    async fn stream_to(&self, url: &str, part: &Path) -> Result<u64, BotError> {
        let mut response = tokio::time::timeout(self.request_timeout, self.fetch(url))
            .await
            .map_err(|elapsed| BotError::Transport(Box::new(elapsed)))??;
        if !(200..300).contains(&response.status) {
            return Err(BotError::HttpStatus {
                status: response.status,
            });
        }

        let mut out = tokio::fs::File::create(part).await?;
        let mut written = 0u64;
        loop {
            let chunk = tokio::time::timeout(self.request_timeout, response.body.next())
                .await
                .map_err(|elapsed| BotError::Transport(Box::new(elapsed)))?;
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk.map_err(BotError::Transport)?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        Ok(written)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_else(|| OsString::from("download"));
    name.push(".part");
    dest.with_file_name(name)
}
