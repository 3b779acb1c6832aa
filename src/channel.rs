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

//! The Channel boundary (§4.7). Connection management, credential
//! negotiation, name resolution and load balancing are external
//! collaborators out of scope for this crate (§1) — `Channel` is only the
//! narrow factory/observer interface the `Client` facade consumes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::call::{Call, CallEvent, ParentLink};
use crate::call_option::{CallOption, Deadline};
use crate::error::Result;

/// Connectivity states a Channel implementation reports, mirroring the
/// standard gRPC connectivity state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

/// Channel-adjacent configuration the core reads without itself implementing
/// the Channel (§10.3): a builder-style struct in the teacher's
/// `ChannelBuilder` shape (`max_concurrent_stream`, `max_receive_message_len`,
/// ... each `self -> Self`), narrowed to the one setting dispatch actually
/// consults — the deadline applied to a call that didn't set its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelOption {
    default_deadline: Option<Deadline>,
}

impl ChannelOption {
    pub fn new() -> ChannelOption {
        ChannelOption::default()
    }

    pub fn default_deadline(mut self, deadline: Deadline) -> ChannelOption {
        self.default_deadline = Some(deadline);
        self
    }

    pub fn get_default_deadline(&self) -> Option<Deadline> {
        self.default_deadline
    }
}

/// Abstract factory for `Call`s, and observer of the underlying connection's
/// health. Implementations own whatever transport-construction and
/// credential/name-resolution machinery the deployment needs; none of that
/// is this crate's concern.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Creates and spawns a new `Call` for `method_name`. `host` overrides
    /// the `:authority` the transport would otherwise pick; `parent` carries
    /// deadline inheritance and cancellation propagation (§4.4 parent
    /// linkage); `propagate_flags` round-trips to the transport layer
    /// uninterpreted (§9 "Parent-call propagation").
    fn create_call(
        &self,
        method_name: &'static str,
        host: Option<&str>,
        opt: &CallOption,
        parent: Option<ParentLink>,
        propagate_flags: u32,
    ) -> Result<(Call, mpsc::UnboundedReceiver<CallEvent>)>;

    /// Current connectivity state; `try_to_connect` asks an idle channel to
    /// start connecting rather than only reporting the passive state.
    fn get_connectivity_state(&self, try_to_connect: bool) -> ConnectivityState;

    /// Resolves once the state differs from `current`, or immediately if it
    /// already does. Used by `Client::wait_for_ready` to poll toward `READY`.
    async fn watch_connectivity_state(&self, current: ConnectivityState) -> ConnectivityState;

    /// Shuts the channel down; outstanding Calls are not forcibly cancelled,
    /// but no new Call may be created afterward.
    fn close(&self);

    /// Channel-adjacent config dispatch needs to read (§10.3). Implementations
    /// that don't carry any override this crate's dispatch logic cares about
    /// can leave the default.
    fn options(&self) -> ChannelOption {
        ChannelOption::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn channel_option_default_has_no_deadline() {
        assert_eq!(ChannelOption::new().get_default_deadline(), None);
    }

    #[test]
    fn channel_option_builder_sets_deadline() {
        let d = Deadline::from_timeout(Duration::from_secs(5));
        let opt = ChannelOption::new().default_deadline(d);
        assert_eq!(opt.get_default_deadline(), Some(d));
    }
}
