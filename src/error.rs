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

use std::result;

use crate::status::StatusObject;

/// Errors surfaced by this crate.
#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    /// A call ran to completion with a non-`Ok` status.
    #[error("RPC failed: {0:?}")]
    RpcFailure(StatusObject),

    /// A dispatch entry point was given arguments that cannot form a valid call.
    /// No `Call` is created when this is returned.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A method was invoked on a `Call` after it had already reached a terminal state.
    #[error("call already terminated")]
    CallAlreadyTerminated,

    /// User-supplied serialization or deserialization failed.
    #[error("codec error: {0}")]
    CodecError(String),

    /// The injected transport reported a failure that was not accompanied by a
    /// gRPC status from the peer (e.g. connection reset before headers arrived).
    #[error("transport error: {0}")]
    TransportError(String),

    /// The event channel feeding a surface stream was closed before a terminal
    /// status could be observed, e.g. the driving task panicked.
    #[error("call event queue shut down before a terminal status was observed")]
    QueueShutdown,
}

impl Error {
    /// Best-effort extraction of the gRPC status this error corresponds to.
    ///
    /// Every error kind in this crate maps to *some* terminal status once a call
    /// has to stop; this is used by the surfaces to synthesize the final
    /// `CallEvent::Status` when a local failure (codec, transport-before-headers)
    /// short-circuits the call before the driver produced one itself.
    pub fn to_status(&self) -> StatusObject {
        use crate::status::Code;
        match self {
            Error::RpcFailure(status) => status.clone(),
            Error::InvalidArgument(msg) => StatusObject::new(Code::InvalidArgument, msg.clone()),
            Error::CallAlreadyTerminated => {
                StatusObject::new(Code::Internal, "call already terminated".to_string())
            }
            Error::CodecError(msg) => StatusObject::new(Code::Internal, msg.clone()),
            Error::TransportError(msg) => StatusObject::new(Code::Unavailable, msg.clone()),
            Error::QueueShutdown => {
                StatusObject::new(Code::Internal, "call event queue shut down".to_string())
            }
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = result::Result<T, Error>;
