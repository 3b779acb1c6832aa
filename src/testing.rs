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

//! An in-process `TransportPair` for exercising the `Call` state machine
//! without a real network socket (§8, §10.4) — the Rust analogue of the
//! teacher crate's completion-queue-driven test harness.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::call::transport::{TransportEvent, TransportPair, TransportReader, TransportWriter, WriteObject};
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::status::Code;

/// One call the test harness observed on the outbound (send) side.
#[derive(Debug)]
pub enum RecordedWrite {
    Headers(Metadata),
    Message(WriteObject),
    HalfClose,
    Reset(Code),
}

struct MockWriter {
    tx: mpsc::UnboundedSender<RecordedWrite>,
}

#[async_trait]
impl TransportWriter for MockWriter {
    async fn send_headers(&mut self, metadata: Metadata) -> Result<()> {
        self.tx
            .send(RecordedWrite::Headers(metadata))
            .map_err(|_| Error::TransportError("mock transport closed".to_string()))
    }

    async fn send_message(&mut self, msg: WriteObject) -> Result<()> {
        self.tx
            .send(RecordedWrite::Message(msg))
            .map_err(|_| Error::TransportError("mock transport closed".to_string()))
    }

    async fn half_close(&mut self) -> Result<()> {
        self.tx
            .send(RecordedWrite::HalfClose)
            .map_err(|_| Error::TransportError("mock transport closed".to_string()))
    }

    fn reset(&mut self, code: Code) {
        let _ = self.tx.send(RecordedWrite::Reset(code));
    }
}

struct MockReader {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    pause_count: Arc<AtomicUsize>,
    resume_count: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportReader for MockReader {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    fn pause_read(&mut self) {
        self.pause_count.fetch_add(1, Ordering::SeqCst);
    }

    fn resume_read(&mut self) {
        self.resume_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// The test-side handle paired with a `TransportPair` built by
/// [`mock_transport`]: push inbound `TransportEvent`s as if they arrived
/// from a peer, and drain what the `Call` wrote.
pub struct MockTransport {
    pub writes: mpsc::UnboundedReceiver<RecordedWrite>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pause_count: Arc<AtomicUsize>,
    resume_count: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn pause_count(&self) -> usize {
        self.pause_count.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> usize {
        self.resume_count.load(Ordering::SeqCst)
    }
}

/// Builds a `TransportPair` driven by an in-process `MockTransport` handle.
pub fn mock_transport(peer: &str) -> (TransportPair, MockTransport) {
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let pause_count = Arc::new(AtomicUsize::new(0));
    let resume_count = Arc::new(AtomicUsize::new(0));

    let pair = TransportPair {
        writer: Box::new(MockWriter { tx: write_tx }),
        reader: Box::new(MockReader {
            rx: event_rx,
            pause_count: pause_count.clone(),
            resume_count: resume_count.clone(),
        }),
        peer: peer.to_string(),
    };
    let handle = MockTransport {
        writes: write_rx,
        events: event_tx,
        pause_count,
        resume_count,
    };
    (pair, handle)
}
