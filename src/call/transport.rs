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

//! The boundary the `Call` state machine drives: an ordered, framed
//! HTTP/2-style request/response stream (§6). Channel connection management,
//! credential negotiation and name resolution are out of scope (§1) — this
//! is only the narrow interface the core consumes from whatever implements
//! it.
//!
//! The send and receive directions progress independently (§5), so the
//! transport is handed to the `Call` already split into its two halves —
//! the same shape `h2` exposes as `SendStream`/`RecvStream` — rather than
//! as one object requiring interior mutability to share between the two
//! driver tasks.

use async_trait::async_trait;

use crate::error::Result;
use crate::metadata::Metadata;
use crate::status::Code;

/// A message payload plus an optional flag word (bit 0 = no-compression
/// hint), produced by serialization and consumed by the transport (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteObject {
    pub payload: Vec<u8>,
    pub flags: u32,
}

impl WriteObject {
    pub fn new(payload: Vec<u8>, flags: u32) -> WriteObject {
        WriteObject { payload, flags }
    }
}

/// One inbound event surfaced by the transport, in the order it actually
/// arrived on the wire. Collapses `onHeaders`/`onMessage`/`onTrailers`/
/// `onError` (§6) into a single tagged stream, per the "event emitters ->
/// structured channels" design note (§9): the `Call` reads these one at a
/// time off `TransportReader::recv`.
#[derive(Debug)]
pub enum TransportEvent {
    Headers(Metadata),
    Message(Vec<u8>),
    /// `grpc-status`, optional `grpc-message`, and any additional trailer
    /// metadata, still raw — the `Call` is responsible for building the
    /// `StatusObject` and feeding it through `FilterStack::receive_trailers`.
    Trailers {
        code: Code,
        message: String,
        metadata: Metadata,
    },
    /// The transport failed before it could deliver a `Trailers` event
    /// (e.g. connection reset). Maps to `UNAVAILABLE` if headers were never
    /// seen, else to `UNKNOWN` (§7).
    Error(String),
}

/// The outbound half of a transport stream, owned exclusively by a `Call`'s
/// send-side driver task for the stream's lifetime (§3 Ownership).
#[async_trait]
pub trait TransportWriter: Send {
    async fn send_headers(&mut self, metadata: Metadata) -> Result<()>;

    async fn send_message(&mut self, msg: WriteObject) -> Result<()>;

    async fn half_close(&mut self) -> Result<()>;

    /// Resets the stream with a local cancellation code; best-effort, does
    /// not itself deliver a terminal event (the `Call` synthesizes the
    /// status, §4.4 Cancellation).
    fn reset(&mut self, code: Code);
}

/// The inbound half, owned exclusively by a `Call`'s receive-side driver
/// task for the stream's lifetime (§3 Ownership).
#[async_trait]
pub trait TransportReader: Send {
    /// Pulls the next inbound event, or `None` once the stream is
    /// exhausted and will never produce another event.
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Tells the transport to stop delivering `Message` events from `recv`
    /// until `resume_read` is called (§4.4 receive back-pressure).
    fn pause_read(&mut self);

    fn resume_read(&mut self);
}

/// What a Channel (or test harness) hands to `spawn_call`: the two
/// independent halves plus the peer identity, which is fixed for the
/// lifetime of the stream and so is captured once up front rather than
/// requiring a method call on either half (§4.5, §11).
pub struct TransportPair {
    pub writer: Box<dyn TransportWriter>,
    pub reader: Box<dyn TransportReader>,
    pub peer: String,
}
