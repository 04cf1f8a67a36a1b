//! Drives the [`StreamReconstructor`] over a live byte stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::translate::gemini_types::GenerateContentResponse;
use crate::translate::streaming::{LineBuffer, StreamReconstructor};

type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// Lazy, single-pass sequence of response chunks for one streaming call.
///
/// The stream owns the transport. It is released when the sequence ends, when
/// an error is yielded, when [`close`](Self::close) is called, or when the
/// stream is dropped part-way through.
pub struct ResponseStream {
    inner: Option<ChunkStream>,
    call_id: String,
}

impl ResponseStream {
    pub fn new(
        inner: impl Stream<Item = Result<GenerateContentResponse>> + Send + 'static,
        call_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Some(Box::pin(inner)),
            call_id: call_id.into(),
        }
    }

    /// Stop the stream and release the transport. Later polls yield `None`.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(call_id = %self.call_id, "Response stream closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for ResponseStream {
    type Item = Result<GenerateContentResponse>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let item = futures::ready!(inner.as_mut().poll_next(cx));
        if item.is_none() {
            this.inner = None;
        }
        Poll::Ready(item)
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::debug!(call_id = %self.call_id, "Response stream dropped before completion");
        }
    }
}

/// Parse an OpenAI SSE byte stream into generate-content chunks.
///
/// Cancelling `cancel` yields one [`BridgeError::TransportAbort`] and ends the
/// sequence without flushing pending tool calls. A transport error is yielded
/// once and also ends the sequence without a flush.
pub fn reconstruct_stream<S, E>(
    byte_stream: S,
    cancel: Option<CancellationToken>,
    call_id: String,
) -> impl Stream<Item = Result<GenerateContentResponse>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<BridgeError> + Send + 'static,
{
    async_stream::stream! {
        let cancel = cancel.unwrap_or_default();
        let mut reconstructor = StreamReconstructor::new();
        let mut lines = LineBuffer::new();

        tokio::pin!(byte_stream);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                next = byte_stream.next() => Some(next),
            };

            let Some(next) = next else {
                tracing::debug!(call_id = %call_id, "Stream aborted by caller");
                yield Err(BridgeError::TransportAbort);
                return;
            };

            let chunk = match next {
                Some(Ok(c)) => c,
                Some(Err(e)) => {
                    let err: BridgeError = e.into();
                    tracing::warn!(call_id = %call_id, error = %err, "Byte stream error");
                    yield Err(err);
                    return;
                }
                None => break,
            };

            lines.push(&chunk);

            while let Some(line) = lines.next_line() {
                if cancel.is_cancelled() {
                    yield Err(BridgeError::TransportAbort);
                    return;
                }
                for response in reconstructor.process_line(&line) {
                    yield Ok(response);
                }
                if reconstructor.is_done() {
                    tracing::debug!(call_id = %call_id, "Stream completed");
                    return;
                }
            }
        }

        // Transport ended without [DONE]: the last line may lack its newline
        if let Some(rest) = lines.take_remainder() {
            for response in reconstructor.process_line(&rest) {
                yield Ok(response);
            }
        }
        if let Some(response) = reconstructor.finish() {
            yield Ok(response);
        }

        tracing::debug!(call_id = %call_id, "Stream ended without sentinel");
    }
}
