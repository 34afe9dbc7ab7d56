use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;

use super::{
    BoxError, ByteStream, HttpResponse, HttpTransport, RequestBody, RetryPolicy, StreamResponse,
};
use crate::dispatch::BoxFuture;
use crate::domain::BotToken;
use crate::transport::FormField;
use crate::Bot;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) url: String,
    pub(crate) json: Option<serde_json::Value>,
    pub(crate) multipart: Option<Vec<FormField>>,
    pub(crate) timeout: Duration,
}

type Responder = dyn Fn(usize, &RecordedRequest) -> Result<HttpResponse, BoxError> + Send + Sync;

#[derive(Default)]
struct FakeState {
    requests: Vec<RecordedRequest>,
    downloads: Vec<String>,
}

#[derive(Clone)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
    responder: Arc<Responder>,
    download: Option<(u16, Vec<Bytes>)>,
    stall_download: bool,
}

impl FakeTransport {
    pub(crate) fn respond(
        responder: impl Fn(usize, &RecordedRequest) -> Result<HttpResponse, BoxError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            state: Arc::default(),
            responder: Arc::new(responder),
            download: None,
            stall_download: false,
        }
    }

    pub(crate) fn json(status: u16, body: &'static str) -> Self {
        Self::respond(move |_, _| {
            Ok(HttpResponse {
                status,
                body: Bytes::from_static(body.as_bytes()),
            })
        })
    }

    pub(crate) fn failing(message: &'static str) -> Self {
        Self::respond(move |_, _| Err(message.into()))
    }

    pub(crate) fn with_download(mut self, status: u16, chunks: Vec<&'static [u8]>) -> Self {
        self.download = Some((status, chunks.into_iter().map(Bytes::from_static).collect()));
        self
    }

    /// The download body never ends after its chunks.
    pub(crate) fn stalling(mut self) -> Self {
        self.stall_download = true;
        self
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub(crate) fn downloads(&self) -> Vec<String> {
        self.state.lock().unwrap().downloads.clone()
    }
}

impl HttpTransport for FakeTransport {
    fn post<'a>(
        &'a self,
        url: &'a str,
        body: &'a RequestBody,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<HttpResponse, BoxError>> {
        Box::pin(async move {
            let request = RecordedRequest {
                url: url.to_owned(),
                json: match body {
                    RequestBody::Json(json) => Some(serde_json::from_slice(json)?),
                    RequestBody::Multipart(_) => None,
                },
                multipart: match body {
                    RequestBody::Multipart(fields) => Some(fields.clone()),
                    RequestBody::Json(_) => None,
                },
                timeout,
            };
            let call = {
                let mut state = self.state.lock().unwrap();
                state.requests.push(request.clone());
                state.requests.len() - 1
            };
            (self.responder)(call, &request)
        })
    }

    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<StreamResponse, BoxError>> {
        Box::pin(async move {
            self.state.lock().unwrap().downloads.push(url.to_owned());
            let (status, chunks) = self
                .download
                .clone()
                .ok_or_else(|| BoxError::from("no download configured"))?;
            let stream = futures_util::stream::iter(chunks.into_iter().map(Ok));
            let body: ByteStream = if self.stall_download {
                Box::pin(stream.chain(futures_util::stream::pending()))
            } else {
                Box::pin(stream)
            };
            Ok(StreamResponse { status, body })
        })
    }
}

pub(crate) fn bot_with(transport: FakeTransport, retry: RetryPolicy) -> Bot {
    Bot::with_transport(
        BotToken::new("123:abc").unwrap(),
        "https://example.invalid",
        Arc::new(transport),
        retry,
    )
}
