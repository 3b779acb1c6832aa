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

//! An ordered async transform chain over metadata, messages and trailing
//! status (§4.3). `FilterStack` composes filters `F1..Fn` so sends apply
//! `F1` first through `Fn` last, and receives apply the mirror image.

use async_trait::async_trait;

use crate::error::Result;
use crate::metadata::Metadata;
use crate::status::StatusObject;

/// A single transform applied on the way into or out of a `Call`.
///
/// All five hooks default to identity, so a filter only overrides the ones
/// it cares about (the gateway-filter pattern in this corpus follows the
/// same default-passthrough shape for `on_response`).
#[async_trait]
pub trait Filter: Send + Sync {
    async fn send_metadata(&self, m: Metadata) -> Result<Metadata> {
        Ok(m)
    }

    async fn send_message(&self, w: Vec<u8>) -> Result<Vec<u8>> {
        Ok(w)
    }

    async fn receive_metadata(&self, m: Metadata) -> Result<Metadata> {
        Ok(m)
    }

    async fn receive_message(&self, buf: Vec<u8>) -> Result<Vec<u8>> {
        Ok(buf)
    }

    async fn receive_trailers(&self, s: StatusObject) -> Result<StatusObject> {
        Ok(s)
    }
}

/// A factory bound to a Channel's filter-factory registry; produces exactly
/// one `Filter` per `Call`, at Call construction time (§4.3).
pub trait FilterFactory: Send + Sync {
    fn create_filter(&self) -> Box<dyn Filter>;
}

/// Ordered composition of `Filter`s bound to a single `Call`. Construction
/// order is fixed by the Channel's filter-factory registry (§3).
pub struct FilterStack {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterStack {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> FilterStack {
        FilterStack { filters }
    }

    pub fn empty() -> FilterStack {
        FilterStack { filters: Vec::new() }
    }

    /// Send-direction transforms apply `F1` first through `Fn` last.
    pub async fn send_metadata(&self, mut m: Metadata) -> Result<Metadata> {
        for f in &self.filters {
            m = f.send_metadata(m).await?;
        }
        Ok(m)
    }

    pub async fn send_message(&self, mut w: Vec<u8>) -> Result<Vec<u8>> {
        for f in &self.filters {
            w = f.send_message(w).await?;
        }
        Ok(w)
    }

    /// Receive-direction transforms apply `Fn` first through `F1` last —
    /// the mirror image of the send direction.
    pub async fn receive_metadata(&self, mut m: Metadata) -> Result<Metadata> {
        for f in self.filters.iter().rev() {
            m = f.receive_metadata(m).await?;
        }
        Ok(m)
    }

    pub async fn receive_message(&self, mut buf: Vec<u8>) -> Result<Vec<u8>> {
        for f in self.filters.iter().rev() {
            buf = f.receive_message(buf).await?;
        }
        Ok(buf)
    }

    pub async fn receive_trailers(&self, mut s: StatusObject) -> Result<StatusObject> {
        for f in self.filters.iter().rev() {
            s = f.receive_trailers(s).await?;
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;

    /// Prepends a byte tag to every message; used to verify send/receive
    /// ordering is the mirror image of each other (§8 "filter symmetry").
    struct TagFilter(u8);

    #[async_trait]
    impl Filter for TagFilter {
        async fn send_message(&self, mut w: Vec<u8>) -> Result<Vec<u8>> {
            w.insert(0, self.0);
            Ok(w)
        }

        async fn receive_message(&self, mut buf: Vec<u8>) -> Result<Vec<u8>> {
            buf.insert(0, self.0);
            Ok(buf)
        }
    }

    #[tokio::test]
    async fn send_is_forward_receive_is_reverse() {
        let stack = FilterStack::new(vec![Box::new(TagFilter(1)), Box::new(TagFilter(2))]);

        let sent = stack.send_message(vec![b'X']).await.unwrap();
        assert_eq!(sent, vec![2, 1, b'X']);

        let received = stack.receive_message(vec![b'Y']).await.unwrap();
        assert_eq!(received, vec![1, 2, b'Y']);
    }

    #[tokio::test]
    async fn empty_stack_is_identity() {
        let stack = FilterStack::empty();
        let md = Metadata::new();
        assert_eq!(stack.send_metadata(md.clone()).await.unwrap(), md);
        let status = StatusObject::new(Code::Ok, String::new());
        assert_eq!(
            stack.receive_trailers(status.clone()).await.unwrap(),
            status
        );
    }
}
