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

//! The `Client` facade (§4.6): dispatches the four RPC shapes onto a
//! `Channel`, fully typed per method rather than through the overloaded,
//! argument-sniffing entry point the source used (§9 "Overloaded dispatch
//! entry points").

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::call::transport::WriteObject;
use crate::call::MethodType;
use crate::call_option::{CallOption, Deadline};
use crate::channel::{Channel, ConnectivityState};
use crate::client_call::{
    ClientCStreamSender, ClientSStreamReceiver, ClientUnaryReceiver, reject,
};
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::method::Method;
use crate::status::Code;

/// Dispatches RPCs over a shared `Channel`. One `Client` is usually built
/// per logical service; cheap to clone (the `Channel` inside is an
/// `Arc<dyn Channel>`).
#[derive(Clone)]
pub struct Client {
    channel: Arc<dyn Channel>,
}

impl Client {
    pub fn new(channel: Arc<dyn Channel>) -> Client {
        Client { channel }
    }

    pub fn get_channel(&self) -> Arc<dyn Channel> {
        self.channel.clone()
    }

    pub fn close(&self) {
        self.channel.close();
    }

    /// Validates arguments that must be rejected before any Call exists
    /// (§4.6 case 7): a deadline already in the past combined with fail-fast
    /// eagerness can never succeed, so it's caught here rather than handed
    /// to the channel to discover.
    fn validate_dispatch(opt: &CallOption) -> Result<()> {
        if opt.is_fail_fast() {
            if let Some(d) = opt.deadline() {
                if d.exceeded() {
                    return Err(reject(
                        "deadline already in the past with fail_fast set",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Fills in the channel's default deadline (§10.3) when `opt` didn't set
    /// one of its own.
    fn apply_channel_defaults(&self, opt: CallOption) -> CallOption {
        if opt.deadline().is_some() {
            return opt;
        }
        match self.channel.options().get_default_deadline() {
            Some(d) => opt.with_deadline(d),
            None => opt,
        }
    }

    /// Unary dispatch (§4.6): creates a Call, sends metadata, writes the
    /// single serialized argument, half-closes, and installs the unary
    /// response handler.
    pub async fn unary<Req, Resp>(
        &self,
        method: &Method<Req, Resp>,
        req: &Req,
        metadata: Metadata,
        opt: CallOption,
    ) -> Result<ClientUnaryReceiver<Resp>>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        if method.ty != MethodType::Unary {
            return Err(reject(format!(
                "{} is not a unary method",
                method.name
            )));
        }
        Self::validate_dispatch(&opt)?;
        let opt = self.apply_channel_defaults(opt);

        let (call, events) = self
            .channel
            .create_call(method.name, None, &opt, None, 0)?;
        debug!("{}: dispatching unary call", method.name);
        call.send_metadata(metadata).await?;

        // Serialization happens after the Call exists: a failure here cancels
        // the call with `Internal`/"Serialization failure" (§4.6 case 2)
        // rather than rejecting the dispatch outright (case 7 is reserved for
        // arguments that are wrong before any Call could exist).
        let payload = match method.req_mar.serialize(req) {
            Ok(p) => p,
            Err(_) => {
                call.cancel(Code::Internal, "Serialization failure");
                return Ok(ClientUnaryReceiver::new(call, events, method.resp_mar.de));
            }
        };
        call.write(WriteObject::new(payload, opt.default_write_flags().bits()))
            .await?;
        call.end().await?;

        Ok(ClientUnaryReceiver::new(call, events, method.resp_mar.de))
    }

    /// Client-streaming dispatch (§4.6): creates a Call, sends metadata,
    /// installs the unary response handler, and returns the writable half.
    pub async fn client_streaming<Req, Resp>(
        &self,
        method: &Method<Req, Resp>,
        metadata: Metadata,
        opt: CallOption,
    ) -> Result<(ClientCStreamSender<Req>, ClientUnaryReceiver<Resp>)>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        if method.ty != MethodType::ClientStreaming {
            return Err(reject(format!(
                "{} is not a client-streaming method",
                method.name
            )));
        }
        Self::validate_dispatch(&opt)?;
        let opt = self.apply_channel_defaults(opt);

        let (call, events) = self
            .channel
            .create_call(method.name, None, &opt, None, 0)?;
        debug!("{}: dispatching client-streaming call", method.name);
        call.send_metadata(metadata).await?;

        let receiver = ClientUnaryReceiver::new(call.clone(), events, method.resp_mar.de);
        let sender = ClientCStreamSender::new(call, method.req_mar.ser);
        Ok((sender, receiver))
    }

    /// Server-streaming dispatch (§4.6): creates a Call, sends metadata,
    /// writes the single serialized argument, half-closes, and returns the
    /// readable half.
    pub async fn server_streaming<Req, Resp>(
        &self,
        method: &Method<Req, Resp>,
        req: &Req,
        metadata: Metadata,
        opt: CallOption,
    ) -> Result<ClientSStreamReceiver<Resp>>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        if method.ty != MethodType::ServerStreaming {
            return Err(reject(format!(
                "{} is not a server-streaming method",
                method.name
            )));
        }
        Self::validate_dispatch(&opt)?;
        let opt = self.apply_channel_defaults(opt);

        let (call, events) = self
            .channel
            .create_call(method.name, None, &opt, None, 0)?;
        debug!("{}: dispatching server-streaming call", method.name);
        call.send_metadata(metadata).await?;

        // See `unary`: serialization failure cancels the now-existing call
        // with `Internal` (§4.6 case 2) rather than rejecting pre-call.
        let payload = match method.req_mar.serialize(req) {
            Ok(p) => p,
            Err(_) => {
                call.cancel(Code::Internal, "Serialization failure");
                return Ok(ClientSStreamReceiver::new(call, events, method.resp_mar.de));
            }
        };
        call.write(WriteObject::new(payload, opt.default_write_flags().bits()))
            .await?;
        call.end().await?;

        Ok(ClientSStreamReceiver::new(call, events, method.resp_mar.de))
    }

    /// Bidi dispatch (§4.6): creates a Call, sends metadata, and returns
    /// both stream halves over it.
    pub async fn duplex_streaming<Req, Resp>(
        &self,
        method: &Method<Req, Resp>,
        metadata: Metadata,
        opt: CallOption,
    ) -> Result<(ClientCStreamSender<Req>, ClientSStreamReceiver<Resp>)>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        if method.ty != MethodType::Duplex {
            return Err(reject(format!("{} is not a duplex method", method.name)));
        }
        Self::validate_dispatch(&opt)?;
        let opt = self.apply_channel_defaults(opt);

        let (call, events) = self
            .channel
            .create_call(method.name, None, &opt, None, 0)?;
        debug!("{}: dispatching duplex call", method.name);
        call.send_metadata(metadata).await?;

        let receiver = ClientSStreamReceiver::new(call.clone(), events, method.resp_mar.de);
        let sender = ClientCStreamSender::new(call, method.req_mar.ser);
        Ok((sender, receiver))
    }

    /// Polls the channel's connectivity state until it reaches `READY` or
    /// `deadline` elapses (§4.6).
    pub async fn wait_for_ready(&self, deadline: Deadline) -> Result<()> {
        let mut state = self.channel.get_connectivity_state(true);
        loop {
            if state == ConnectivityState::Ready {
                return Ok(());
            }
            if state == ConnectivityState::Shutdown {
                return Err(Error::TransportError(
                    "The channel has been closed".to_string(),
                ));
            }
            let remaining = match deadline.remaining() {
                Some(d) if d == Duration::ZERO => {
                    return Err(Error::TransportError(
                        "Failed to connect before the deadline".to_string(),
                    ))
                }
                Some(d) => Some(d),
                None => None,
            };
            let watch = self.channel.watch_connectivity_state(state);
            state = match remaining {
                Some(d) => match tokio::time::timeout(d, watch).await {
                    Ok(s) => s,
                    Err(_) => {
                        return Err(Error::TransportError(
                            "Failed to connect before the deadline".to_string(),
                        ))
                    }
                },
                None => watch.await,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_fast_with_expired_deadline_is_rejected() {
        let opt = CallOption::new()
            .fail_fast(true)
            .timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            Client::validate_dispatch(&opt),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn fail_fast_with_live_deadline_is_accepted() {
        let opt = CallOption::new()
            .fail_fast(true)
            .timeout(Duration::from_secs(60));
        assert!(Client::validate_dispatch(&opt).is_ok());
    }

    #[test]
    fn non_fail_fast_ignores_expired_deadline() {
        let opt = CallOption::new().timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(Client::validate_dispatch(&opt).is_ok());
    }
}
