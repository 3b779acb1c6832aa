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

//! The per-RPC state machine (§4.4). A `Call` coordinates two half-streams —
//! a send axis `S0 init -> S1 metadata-sent -> S2 writing -> S3 half-closed`
//! and a receive axis `R0 init -> R1 metadata-received -> R2 reading -> R3
//! trailers-received` — driven by two independently spawned tasks that share
//! a single `FilterStack` and terminate through one code path, the receive
//! task, which is the sole producer of `CallEvent::End`/`CallEvent::Status`
//! (§9).

pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::sync::{mpsc, oneshot, watch};

use crate::call_option::{CallOption, Deadline};
use crate::error::{Error, Result};
use crate::filter::FilterStack;
use crate::metadata::Metadata;
use crate::status::{Code, StatusObject};

use transport::{TransportEvent, TransportPair, TransportReader, TransportWriter, WriteObject};

/// The four abstract RPC shapes the core turns into a uniform `Call` (§1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodType {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Duplex,
}

/// Events a `Call` emits to its surface stream, in the order they occur
/// (§4.4 ordering invariants). This is the "tagged event channel" the design
/// notes (§9) call for in place of a dynamic event bus.
#[derive(Debug)]
pub enum CallEvent {
    /// Emitted at most once, before any `Data`, `End` or `Status` (invariant 1).
    Metadata(Metadata),
    /// Emitted zero or more times, always after `Metadata` (invariant 2).
    Data(Vec<u8>),
    /// Emitted exactly once (invariant 3).
    End,
    /// Emitted exactly once, strictly after `End`, and always last (invariant 4).
    Status(StatusObject),
}

/// How a `Call` reached its terminal state: whether the transport stream
/// still needs a local reset (cancellation, internal failure) or not (clean
/// trailers from the peer, or a transport failure that already tore the
/// stream down on its own).
#[derive(Clone, Copy, Debug)]
enum Termination {
    Normal,
    Cancelled(Code),
}

enum SendCommand {
    SendMetadata(Metadata, oneshot::Sender<Result<()>>),
    Write(WriteObject, oneshot::Sender<Result<()>>),
    End(oneshot::Sender<Result<()>>),
}

enum RecvCommand {
    Pause,
    Resume,
    Cancel(Code, String),
}

/// Deadline and cancellation state a child `Call` inherits from its parent
/// (§4.4 parent linkage).
#[derive(Clone)]
pub struct ParentLink {
    pub deadline: Deadline,
    pub cancelled: watch::Receiver<bool>,
}

/// Handle to a live `Call`. Cheap to clone; every clone talks to the same
/// two driver tasks. The `Call` is finalized when a terminal status has
/// been both produced and delivered, and is never revived (§3).
#[derive(Clone)]
pub struct Call {
    method_name: &'static str,
    peer: String,
    deadline: Deadline,
    send_tx: mpsc::UnboundedSender<SendCommand>,
    recv_tx: mpsc::UnboundedSender<RecvCommand>,
    cancelled: watch::Receiver<bool>,
}

impl Call {
    pub fn method_name(&self) -> &'static str {
        self.method_name
    }

    pub fn peer(&self) -> String {
        self.peer.clone()
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// `sendMetadata(md)`, valid only in `S0` (enforced by the send task).
    pub async fn send_metadata(&self, md: Metadata) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_tx
            .send(SendCommand::SendMetadata(md, tx))
            .map_err(|_| Error::CallAlreadyTerminated)?;
        rx.await.map_err(|_| Error::CallAlreadyTerminated)?
    }

    /// `write(w)`, valid in `S1` or `S2`; ordered FIFO by the send task.
    pub async fn write(&self, msg: WriteObject) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_tx
            .send(SendCommand::Write(msg, tx))
            .map_err(|_| Error::CallAlreadyTerminated)?;
        rx.await.map_err(|_| Error::CallAlreadyTerminated)?
    }

    /// `end()`: flushes the write queue then half-closes (§4.4).
    pub async fn end(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_tx
            .send(SendCommand::End(tx))
            .map_err(|_| Error::CallAlreadyTerminated)?;
        rx.await.map_err(|_| Error::CallAlreadyTerminated)?
    }

    /// `cancelWithStatus`, idempotent and valid from any non-terminal state
    /// (§4.4). Once the call is already terminated this is a silent no-op,
    /// which is what makes repeated `cancel()` calls idempotent (§8).
    pub fn cancel(&self, code: Code, details: impl Into<String>) {
        let _ = self.recv_tx.send(RecvCommand::Cancel(code, details.into()));
    }

    pub fn pause(&self) {
        let _ = self.recv_tx.send(RecvCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.recv_tx.send(RecvCommand::Resume);
    }

    /// Hands out a link a child `Call` can use to inherit this call's
    /// deadline and to be cancelled when this call is (§4.4 parent linkage).
    pub fn child_link(&self) -> ParentLink {
        ParentLink {
            deadline: self.deadline,
            cancelled: self.cancelled.clone(),
        }
    }
}

/// Spawns the two driver tasks backing a `Call` and returns the handle plus
/// the event stream it feeds (§4.4, §9).
///
/// `parent` supplies deadline inheritance and cancellation propagation when
/// the caller did not set an explicit deadline (§4.4 parent linkage). A
/// `Call` with an already-elapsed deadline still runs the driver tasks, but
/// they observe the elapsed deadline on their very first tick and terminate
/// with `DEADLINE_EXCEEDED` before any wire interaction (§8 "deadline
/// monotonicity").
pub fn spawn_call(
    method_name: &'static str,
    transport: TransportPair,
    filters: Arc<FilterStack>,
    opt: &CallOption,
    parent: Option<ParentLink>,
) -> (Call, mpsc::UnboundedReceiver<CallEvent>) {
    let TransportPair { writer, reader, peer } = transport;
    let deadline = opt
        .deadline()
        .or_else(|| parent.as_ref().map(|p| p.deadline))
        .unwrap_or_default();

    let (send_tx, send_rx) = mpsc::unbounded_channel::<SendCommand>();
    let (recv_tx, recv_rx) = mpsc::unbounded_channel::<RecvCommand>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<CallEvent>();
    let (stop_tx, stop_rx) = watch::channel::<Option<Termination>>(None);
    let (cancelled_tx, cancelled_rx) = watch::channel(false);

    debug!("{}: call created, peer {}", method_name, peer);

    tokio::spawn(run_send(method_name, writer, send_rx, stop_rx, filters.clone()));
    tokio::spawn(run_recv(
        method_name,
        reader,
        recv_rx,
        event_tx,
        stop_tx,
        cancelled_tx,
        filters,
        deadline,
        parent,
    ));

    let call = Call {
        method_name,
        peer,
        deadline,
        send_tx,
        recv_tx,
        cancelled: cancelled_rx,
    };
    (call, event_rx)
}

/// Drives the send axis: `S0 -> S1 -> S2 -> S3`. Runs `sendMetadata`/`write`
/// requests through the (shared, send-direction) `FilterStack` in arrival
/// order, then onto the transport, honoring whatever back-pressure
/// `TransportWriter::send_message` imposes by simply not polling for the
/// next command until the current one's future resolves.
async fn run_send(
    method_name: &'static str,
    mut writer: Box<dyn TransportWriter>,
    mut cmd_rx: mpsc::UnboundedReceiver<SendCommand>,
    mut stop_rx: watch::Receiver<Option<Termination>>,
    filters: Arc<FilterStack>,
) {
    let mut metadata_sent = false;
    let mut half_closed = false;

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(Termination::Cancelled(code)) = *stop_rx.borrow() {
                    writer.reset(code);
                }
                break;
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    None => break,
                    Some(SendCommand::SendMetadata(md, ack)) => {
                        if metadata_sent {
                            let _ = ack.send(Err(Error::CallAlreadyTerminated));
                            continue;
                        }
                        let result = match filters.send_metadata(md).await {
                            Ok(md) => writer.send_headers(md).await,
                            Err(e) => Err(e),
                        };
                        metadata_sent = result.is_ok();
                        if metadata_sent {
                            debug!("{}: metadata sent", method_name);
                        }
                        let _ = ack.send(result);
                    }
                    Some(SendCommand::Write(msg, ack)) => {
                        if half_closed || !metadata_sent {
                            let _ = ack.send(Err(Error::CallAlreadyTerminated));
                            continue;
                        }
                        let WriteObject { payload, flags } = msg;
                        let len = payload.len();
                        let result = match filters.send_message(payload).await {
                            Ok(payload) => writer.send_message(WriteObject { payload, flags }).await,
                            Err(e) => Err(e),
                        };
                        if result.is_ok() {
                            trace!("{}: wrote message ({} bytes)", method_name, len);
                        }
                        let _ = ack.send(result);
                    }
                    Some(SendCommand::End(ack)) => {
                        if half_closed {
                            let _ = ack.send(Ok(()));
                            continue;
                        }
                        half_closed = true;
                        let result = writer.half_close().await;
                        debug!("{}: half-closed", method_name);
                        let _ = ack.send(result);
                    }
                }
            }
        }
    }

    // Drain anything left in the queue with a failure callback (§4.4
    // Cancellation: "drains pending writes with a failure callback").
    while let Ok(cmd) = cmd_rx.try_recv() {
        warn!("{}: discarding queued send command after call terminated", method_name);
        match cmd {
            SendCommand::SendMetadata(_, ack) => fail(ack),
            SendCommand::Write(_, ack) => fail(ack),
            SendCommand::End(ack) => fail(ack),
        }
    }
}

fn fail(ack: oneshot::Sender<Result<()>>) {
    let _ = ack.send(Err(Error::CallAlreadyTerminated));
}

/// Drives the receive axis: `R0 -> R1 -> R2 -> R3`, the deadline timer, and
/// cancellation (both explicit and inherited from a parent). This task is
/// the sole writer of `CallEvent::End`/`CallEvent::Status`, which is what
/// makes their ordering (§4.4 invariants 3 and 4) structural rather than
/// something that has to be policed at runtime (§9).
async fn run_recv(
    method_name: &'static str,
    mut reader: Box<dyn TransportReader>,
    mut cmd_rx: mpsc::UnboundedReceiver<RecvCommand>,
    event_tx: mpsc::UnboundedSender<CallEvent>,
    stop_tx: watch::Sender<Option<Termination>>,
    cancelled_tx: watch::Sender<bool>,
    filters: Arc<FilterStack>,
    deadline: Deadline,
    parent: Option<ParentLink>,
) {
    let mut metadata_seen = false;
    let mut paused = false;

    // A deadline that never elapses is modelled as a very long sleep rather
    // than an `Option`, so the `select!` arm below can be unconditional —
    // no deadline means this branch simply never wins the race.
    let has_deadline = deadline.instant().is_some();
    let sleep_for = deadline
        .remaining()
        .unwrap_or_else(|| Duration::from_secs(60 * 60 * 24 * 365));
    let sleep = tokio::time::sleep(sleep_for);
    tokio::pin!(sleep);

    let mut parent_cancelled = parent.map(|p| p.cancelled);

    loop {
        tokio::select! {
            biased;

            _ = &mut sleep, if has_deadline => {
                terminate(
                    method_name, &event_tx, &stop_tx, &cancelled_tx,
                    Termination::Cancelled(Code::DeadlineExceeded),
                    StatusObject::new(Code::DeadlineExceeded, "Deadline exceeded".to_string()),
                ).await;
                return;
            }

            changed = async { parent_cancelled.as_mut().unwrap().changed().await }, if parent_cancelled.is_some() => {
                if changed.is_ok() && *parent_cancelled.as_ref().unwrap().borrow() {
                    terminate(
                        method_name, &event_tx, &stop_tx, &cancelled_tx,
                        Termination::Cancelled(Code::Cancelled),
                        StatusObject::new(Code::Cancelled, "Cancelled on client".to_string()),
                    ).await;
                    return;
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    None => return,
                    Some(RecvCommand::Pause) => {
                        reader.pause_read();
                        paused = true;
                    }
                    Some(RecvCommand::Resume) => {
                        reader.resume_read();
                        paused = false;
                    }
                    Some(RecvCommand::Cancel(code, details)) => {
                        terminate(
                            method_name, &event_tx, &stop_tx, &cancelled_tx,
                            Termination::Cancelled(code),
                            StatusObject::new(code, details),
                        ).await;
                        return;
                    }
                }
            }

            ev = reader.recv(), if !paused => {
                match ev {
                    None => {
                        let code = if metadata_seen { Code::Unknown } else { Code::Unavailable };
                        terminate(
                            method_name, &event_tx, &stop_tx, &cancelled_tx,
                            Termination::Normal,
                            StatusObject::new(code, "transport closed without trailers".to_string()),
                        ).await;
                        return;
                    }
                    Some(TransportEvent::Error(msg)) => {
                        let code = if metadata_seen { Code::Unknown } else { Code::Unavailable };
                        terminate(
                            method_name, &event_tx, &stop_tx, &cancelled_tx,
                            Termination::Normal,
                            StatusObject::new(code, msg),
                        ).await;
                        return;
                    }
                    Some(TransportEvent::Headers(md)) => {
                        match filters.receive_metadata(md).await {
                            Ok(md) => {
                                metadata_seen = true;
                                debug!("{}: metadata received", method_name);
                                let _ = event_tx.send(CallEvent::Metadata(md));
                            }
                            Err(e) => {
                                warn!("{}: filter transform failed, cancelling: {}", method_name, e);
                                terminate(
                                    method_name, &event_tx, &stop_tx, &cancelled_tx,
                                    Termination::Cancelled(Code::Internal),
                                    StatusObject::new(Code::Internal, e.to_string()),
                                ).await;
                                return;
                            }
                        }
                    }
                    Some(TransportEvent::Message(buf)) => {
                        match filters.receive_message(buf).await {
                            Ok(buf) => {
                                let _ = event_tx.send(CallEvent::Data(buf));
                            }
                            Err(e) => {
                                warn!("{}: filter transform failed, cancelling: {}", method_name, e);
                                terminate(
                                    method_name, &event_tx, &stop_tx, &cancelled_tx,
                                    Termination::Cancelled(Code::Internal),
                                    StatusObject::new(Code::Internal, e.to_string()),
                                ).await;
                                return;
                            }
                        }
                    }
                    Some(TransportEvent::Trailers { code, message, metadata }) => {
                        let status = StatusObject::with_metadata(code, message, metadata);
                        match filters.receive_trailers(status).await {
                            Ok(status) => {
                                terminate(method_name, &event_tx, &stop_tx, &cancelled_tx, Termination::Normal, status).await;
                            }
                            Err(e) => {
                                warn!("{}: filter transform failed, cancelling: {}", method_name, e);
                                terminate(
                                    method_name, &event_tx, &stop_tx, &cancelled_tx,
                                    Termination::Cancelled(Code::Internal),
                                    StatusObject::new(Code::Internal, e.to_string()),
                                ).await;
                            }
                        }
                        return;
                    }
                }
            }
        }
    }
}

/// Emits `End` then `Status` exactly once, and arranges for the send task to
/// stop (and, for a cancellation, to reset the transport) via `stop_tx`
/// (§4.4 invariants 3 and 4, Cancellation).
async fn terminate(
    method_name: &'static str,
    event_tx: &mpsc::UnboundedSender<CallEvent>,
    stop_tx: &watch::Sender<Option<Termination>>,
    cancelled_tx: &watch::Sender<bool>,
    term: Termination,
    status: StatusObject,
) {
    debug!("{}: terminal status {:?} ({})", method_name, status.code(), status.details());
    let _ = stop_tx.send(Some(term));
    if matches!(term, Termination::Cancelled(_)) {
        let _ = cancelled_tx.send(true);
    }
    let _ = event_tx.send(CallEvent::End);
    let _ = event_tx.send(CallEvent::Status(status));
}
