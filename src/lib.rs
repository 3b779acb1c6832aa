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

//! The core of a gRPC client runtime: the per-call state machine, its
//! filter pipeline, and the streaming surfaces built on top of it.
//!
//! This crate does not dial connections, negotiate credentials, resolve
//! names, or generate stubs from `.proto` files — it consumes an abstract
//! [`channel::Channel`] and an abstract [`call::transport::TransportPair`]
//! and turns them into the four RPC shapes (unary, client-streaming,
//! server-streaming, duplex) with gRPC's metadata, message-framing,
//! cancellation and deadline rules enforced uniformly.

pub mod call;
pub mod call_option;
pub mod channel;
pub mod client;
pub mod client_call;
pub mod codec;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod method;
pub mod status;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::call::{Call, CallEvent, MethodType, ParentLink};
pub use crate::call_option::{CallOption, Deadline, WriteFlags};
pub use crate::channel::{Channel, ChannelOption, ConnectivityState};
pub use crate::client::Client;
pub use crate::client_call::{ClientCStreamSender, ClientSStreamReceiver, ClientUnaryReceiver};
pub use crate::codec::Marshaller;
pub use crate::error::{Error, Result};
pub use crate::filter::{Filter, FilterFactory, FilterStack};
pub use crate::metadata::{Metadata, MetadataValue};
pub use crate::method::Method;
pub use crate::status::{Code, StatusObject};
