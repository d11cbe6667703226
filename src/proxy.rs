use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};
use crate::logging::RequestLogger;
use crate::translate::bito_types::BitoRequest;
use crate::translate::openai_types::ChatCompletionResponse;
use crate::translate::response::aggregate;
use crate::translate::streaming::{SseFrame, StreamTranslator};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Translated frames for one request, fed by a background task.
///
/// Dropping this stream (e.g. when the client disconnects and axum drops the
/// response body) cancels the task and releases the upstream connection.
pub struct FrameStream {
    inner: ReceiverStream<SseFrame>,
    _cancel: DropGuard,
}

impl Stream for FrameStream {
    type Item = SseFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<SseFrame>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// POST a Bito request and return the response once its status is known good.
///
/// # Errors
/// `Http` when the request cannot be sent, `UpstreamStatus` (carrying the
/// response text) when Bito answers with a non-success status.
pub async fn send_upstream(
    client: &reqwest::Client,
    upstream: &UpstreamConfig,
    token: &str,
    payload: &BitoRequest,
) -> Result<reqwest::Response> {
    let response = client
        .post(&upstream.url)
        .header(USER_AGENT, &upstream.user_agent)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, token)
        .json(payload)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProxyError::UpstreamStatus {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

/// Start a streaming completion against Bito.
pub fn stream_completion(
    client: reqwest::Client,
    upstream: &UpstreamConfig,
    token: String,
    payload: BitoRequest,
    translator: StreamTranslator,
    log: RequestLogger,
) -> FrameStream {
    let capacity = upstream.channel_capacity;
    let upstream = upstream.clone();

    log.info(
        "upstream",
        format!("POST {} modelId={}", upstream.url, payload.model_id),
    );

    spawn_translator(translator, capacity, log, async move {
        send_upstream(&client, &upstream, &token, &payload)
            .await
            .map(reqwest::Response::bytes_stream)
    })
}

/// Run a completion to the end and fold it into a single response.
pub async fn complete(
    client: reqwest::Client,
    upstream: &UpstreamConfig,
    token: String,
    payload: BitoRequest,
    translator: StreamTranslator,
    log: RequestLogger,
) -> ChatCompletionResponse {
    let model = translator.model().to_string();
    let frames = stream_completion(client, upstream, token, payload, translator, log);
    aggregate(frames, &model).await
}

/// Spawn the task that awaits `upstream`, reads its body, and pushes the
/// translated frames into a bounded channel. A full channel suspends the task
/// and with it the upstream reads.
pub fn spawn_translator<F, S, E>(
    translator: StreamTranslator,
    capacity: usize,
    log: RequestLogger,
    upstream: F,
) -> FrameStream
where
    F: Future<Output = Result<S>> + Send + 'static,
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = CancellationToken::new();

    tokio::spawn(drive(translator, upstream, tx, cancel.clone(), log));

    FrameStream {
        inner: ReceiverStream::new(rx),
        _cancel: cancel.drop_guard(),
    }
}

async fn drive<F, S, E>(
    mut translator: StreamTranslator,
    upstream: F,
    tx: mpsc::Sender<SseFrame>,
    cancel: CancellationToken,
    log: RequestLogger,
) where
    F: Future<Output = Result<S>>,
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    let body = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            log.warn("stream", "Client went away before upstream responded");
            return;
        }
        res = upstream => res,
    };

    let body = match body {
        Ok(body) => body,
        Err(e) => {
            log.error("upstream", e.to_string());
            send_all(&tx, &cancel, translator.fail(e.stream_message())).await;
            return;
        }
    };

    futures::pin_mut!(body);
    let mut sent = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                log.warn("stream", format!("Client disconnected after {sent} frames, aborting upstream read"));
                return;
            }
            next = body.next() => next,
        };

        let frames = match next {
            Some(Ok(bytes)) => translator.push_bytes(&bytes),
            Some(Err(e)) => {
                log.error("upstream", format!("Byte stream error: {e}"));
                translator.fail(format!("Request error: {e}"))
            }
            None => translator.finish(),
        };

        let count = frames.len();
        // A receiver may stop reading once it has the terminal chunk.
        if !send_all(&tx, &cancel, frames).await && !translator.is_finished() {
            log.warn("stream", format!("Client disconnected after {sent} frames, aborting upstream read"));
            return;
        }
        sent += count;

        if translator.is_finished() {
            break;
        }
    }

    log.info("stream", format!("Stream completed ({sent} frames)"));
}

/// Send frames in order. Returns `false` (and cancels) once the receiver is gone.
async fn send_all(tx: &mpsc::Sender<SseFrame>, cancel: &CancellationToken, frames: Vec<SseFrame>) -> bool {
    for frame in frames {
        if tx.send(frame).await.is_err() {
            cancel.cancel();
            return false;
        }
    }
    true
}
