// Copyright 2017 PingCAP, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! The four surfaces a `Call` is adapted into for application code (§4.5):
//! `ClientUnaryReceiver` (a `Future`), `ClientCStreamSender` (client-stream
//! writer), `ClientSStreamReceiver` (server-stream reader, a `Stream`), and
//! the duplex pair that combines the two stream halves over one `Call`.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use log::warn;
use tokio::sync::{mpsc, oneshot};

use crate::call::transport::WriteObject;
use crate::call::{Call, CallEvent};
use crate::call_option::WriteFlags;
use crate::codec::{DeserializeFn, SerializeFn};
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::status::{Code, StatusObject};

/// Slot the aggregator tasks use to hand the first `CallEvent::Metadata`
/// through to whichever surface is reading it, without requiring the
/// surface to itself own the event channel.
type MetadataSlot = Arc<Mutex<Option<Metadata>>>;

fn new_metadata_slot() -> MetadataSlot {
    Arc::new(Mutex::new(None))
}

/// Drives a Call's event channel to completion, applying §4.6's unary
/// response handler: tolerates zero messages (`"Not enough responses
/// received"`), tolerates at most one (`"Too many responses received"` on a
/// second), and on `OK` status with exactly one message returns it decoded.
/// Tracks a count rather than testing the decoded value for truthiness, per
/// the resolved Open Question in §9.
fn spawn_unary_aggregator<Resp: Send + 'static>(
    call: Call,
    mut events: mpsc::UnboundedReceiver<CallEvent>,
    deserialize: DeserializeFn<Resp>,
    metadata: MetadataSlot,
    tx: oneshot::Sender<Result<Resp>>,
) {
    tokio::spawn(async move {
        let mut received: u32 = 0;
        let mut decoded: Option<Resp> = None;

        while let Some(ev) = events.recv().await {
            match ev {
                CallEvent::Metadata(md) => {
                    *metadata.lock().unwrap() = Some(md);
                }
                CallEvent::Data(buf) => {
                    received += 1;
                    if received > 1 {
                        call.cancel(Code::Internal, "Too many responses received");
                        continue;
                    }
                    match deserialize(&buf) {
                        Ok(v) => decoded = Some(v),
                        Err(_) => call.cancel(Code::Internal, "Failed to parse server response"),
                    }
                }
                CallEvent::End => {}
                CallEvent::Status(status) => {
                    let result = if !status.is_ok() {
                        Err(Error::RpcFailure(status))
                    } else if received == 0 {
                        Err(Error::RpcFailure(StatusObject::new(
                            Code::Internal,
                            "Not enough responses received".to_string(),
                        )))
                    } else {
                        match decoded {
                            Some(v) => Ok(v),
                            None => Err(Error::RpcFailure(status)),
                        }
                    };
                    let _ = tx.send(result);
                    return;
                }
            }
        }
        // The event channel closed before a terminal status arrived: the
        // driver task must have panicked or been dropped (§10.1).
        let _ = tx.send(Err(Error::QueueShutdown));
    });
}

/// The `Future` a unary-shaped RPC (including the response half of a
/// client-streaming RPC) resolves through.
pub struct ClientUnaryReceiver<Resp> {
    call: Call,
    metadata: MetadataSlot,
    result_rx: oneshot::Receiver<Result<Resp>>,
}

impl<Resp> ClientUnaryReceiver<Resp> {
    pub(crate) fn new(
        call: Call,
        events: mpsc::UnboundedReceiver<CallEvent>,
        deserialize: DeserializeFn<Resp>,
    ) -> ClientUnaryReceiver<Resp>
    where
        Resp: Send + 'static,
    {
        let metadata = new_metadata_slot();
        let (tx, rx) = oneshot::channel();
        spawn_unary_aggregator(call.clone(), events, deserialize, metadata.clone(), tx);
        ClientUnaryReceiver {
            call,
            metadata,
            result_rx: rx,
        }
    }

    pub fn peer(&self) -> String {
        self.call.peer()
    }

    /// The `metadata` event, once the server has sent it (§4.5).
    pub fn headers(&self) -> Option<Metadata> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn cancel(&self) {
        self.call.cancel(Code::Cancelled, "Cancelled on client");
    }
}

impl<Resp> Future for ClientUnaryReceiver<Resp> {
    type Output = Result<Resp>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.result_rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::QueueShutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Writable half of a client-streaming or duplex RPC (§4.5).
pub struct ClientCStreamSender<Req> {
    call: Call,
    serialize: SerializeFn<Req>,
}

impl<Req> ClientCStreamSender<Req> {
    pub(crate) fn new(call: Call, serialize: SerializeFn<Req>) -> ClientCStreamSender<Req> {
        ClientCStreamSender { call, serialize }
    }

    /// Serializes and writes one request message. A serialization failure
    /// cancels the call with `INTERNAL` "Serialization failure" and is
    /// reported back to the caller rather than to a terminal status alone
    /// (§4.5, §7 case 2).
    pub async fn send(&self, req: &Req, flags: WriteFlags) -> Result<()> {
        let payload = match (self.serialize)(req) {
            Ok(p) => p,
            Err(_) => {
                self.call.cancel(Code::Internal, "Serialization failure");
                return Err(Error::RpcFailure(StatusObject::new(
                    Code::Internal,
                    "Serialization failure".to_string(),
                )));
            }
        };
        self.call
            .write(WriteObject::new(payload, flags.bits()))
            .await
    }

    /// Half-closes the write side (§4.4 `end()`).
    pub async fn close(&self) -> Result<()> {
        self.call.end().await
    }

    pub fn peer(&self) -> String {
        self.call.peer()
    }

    pub fn cancel(&self) {
        self.call.cancel(Code::Cancelled, "Cancelled on client");
    }
}

const HIGH_WATERMARK: usize = 16;
const LOW_WATERMARK: usize = 4;

/// Readable half of a server-streaming or duplex RPC: a lazy, never-restarted
/// sequence of decoded response messages (§4.5).
///
/// Reads ahead into an internal buffer up to `HIGH_WATERMARK` items,
/// instructing the `Call` to pause the transport's read side once that's
/// reached, and to resume once the buffer has drained below
/// `LOW_WATERMARK` — the back-pressure contract in §4.4/§4.5/§8.
pub struct ClientSStreamReceiver<Resp> {
    call: Call,
    events: mpsc::UnboundedReceiver<CallEvent>,
    deserialize: DeserializeFn<Resp>,
    metadata: MetadataSlot,
    buffered: VecDeque<Result<Resp>>,
    paused: bool,
    finished: bool,
}

impl<Resp> ClientSStreamReceiver<Resp> {
    /// Public so generated stub code (outside this crate's scope, §1) can
    /// adapt a raw `Call` into this surface.
    pub fn new(
        call: Call,
        events: mpsc::UnboundedReceiver<CallEvent>,
        deserialize: DeserializeFn<Resp>,
    ) -> ClientSStreamReceiver<Resp> {
        ClientSStreamReceiver {
            call,
            events,
            deserialize,
            metadata: new_metadata_slot(),
            buffered: VecDeque::new(),
            paused: false,
            finished: false,
        }
    }

    pub fn peer(&self) -> String {
        self.call.peer()
    }

    pub fn headers(&self) -> Option<Metadata> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn cancel(&self) {
        self.call.cancel(Code::Cancelled, "Cancelled on client");
    }
}

impl<Resp: Unpin> Stream for ClientSStreamReceiver<Resp> {
    type Item = Result<Resp>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Drain everything immediately available into `buffered` before
        // handing one item back, so the buffer can genuinely grow past the
        // caller's consumption rate and cross `HIGH_WATERMARK` — otherwise
        // "read one, return one" would never trigger back-pressure.
        while !this.finished {
            match this.events.poll_recv(cx) {
                Poll::Pending => break,
                Poll::Ready(None) => this.finished = true,
                Poll::Ready(Some(CallEvent::Metadata(md))) => {
                    *this.metadata.lock().unwrap() = Some(md);
                }
                Poll::Ready(Some(CallEvent::Data(buf))) => {
                    let item = (this.deserialize)(&buf).map_err(|_| {
                        Error::RpcFailure(StatusObject::new(
                            Code::Internal,
                            "Failed to parse server response".to_string(),
                        ))
                    });
                    if item.is_err() {
                        this.call.cancel(Code::Internal, "Failed to parse server response");
                    }
                    this.buffered.push_back(item);
                    if !this.paused && this.buffered.len() >= HIGH_WATERMARK {
                        this.call.pause();
                        this.paused = true;
                    }
                }
                Poll::Ready(Some(CallEvent::End)) => {}
                Poll::Ready(Some(CallEvent::Status(status))) => {
                    this.finished = true;
                    if !status.is_ok() {
                        this.buffered.push_back(Err(Error::RpcFailure(status)));
                    }
                }
            }
        }

        if let Some(item) = this.buffered.pop_front() {
            if this.paused && this.buffered.len() <= LOW_WATERMARK {
                this.call.resume();
                this.paused = false;
            }
            return Poll::Ready(Some(item));
        }
        if this.finished {
            return Poll::Ready(None);
        }
        Poll::Pending
    }
}

/// A `Call` that could not be dispatched at all because its arguments were
/// invalid (§4.6 "fail synchronously with InvalidArgument; no Call is
/// created"). Logged at `warn!` since it indicates a caller bug, not a
/// transient failure.
pub(crate) fn reject(reason: impl Into<String>) -> Error {
    let reason = reason.into();
    warn!("rejecting dispatch: {}", reason);
    Error::InvalidArgument(reason)
}
