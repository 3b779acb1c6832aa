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

//! Drives a single unary call end to end over a `MockTransport`, standing
//! in for a real transport (e.g. an `h2` connection) a deployment would
//! plug into a `Channel` implementation.

use grpc_call_core::call::transport::{TransportEvent, WriteObject};
use grpc_call_core::call::{spawn_call, MethodType};
use grpc_call_core::call_option::CallOption;
use grpc_call_core::codec::Marshaller;
use grpc_call_core::filter::FilterStack;
use grpc_call_core::metadata::Metadata;
use grpc_call_core::method::Method;
use grpc_call_core::status::Code;
use grpc_call_core::testing::mock_transport;
use std::convert::TryInto;
use std::sync::Arc;

fn serialize_req(n: &u32) -> grpc_call_core::error::Result<Vec<u8>> {
    Ok(n.to_be_bytes().to_vec())
}

fn deserialize_resp(buf: &[u8]) -> grpc_call_core::error::Result<u32> {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(buf);
    Ok(u32::from_be_bytes(arr))
}

#[tokio::main]
async fn main() {
    let method: Method<u32, u32> = Method::new(
        MethodType::Unary,
        "/demo.Echo/Double",
        Marshaller::new(serialize_req, deserialize_resp),
        Marshaller::new(serialize_req, deserialize_resp),
    );

    let (transport, mock) = mock_transport("127.0.0.1:50051");
    let (call, mut events) = spawn_call(
        method.name,
        transport,
        Arc::new(FilterStack::empty()),
        &CallOption::new(),
        None,
    );

    // Drive the "server" side: echo back double the request once a message
    // arrives, then send OK trailers.
    tokio::spawn(async move {
        use grpc_call_core::testing::RecordedWrite;
        mock.events.send(TransportEvent::Headers(Metadata::new())).unwrap();
        while let Some(write) = mock.writes.recv().await {
            if let RecordedWrite::Message(WriteObject { payload, .. }) = write {
                let n = u32::from_be_bytes(payload.try_into().unwrap());
                let resp = (n * 2).to_be_bytes().to_vec();
                mock.events
                    .send(TransportEvent::Message(resp))
                    .unwrap();
                mock.events
                    .send(TransportEvent::Trailers {
                        code: Code::Ok,
                        message: String::new(),
                        metadata: Metadata::new(),
                    })
                    .unwrap();
                break;
            }
        }
    });

    call.send_metadata(Metadata::new()).await.unwrap();
    call.write(WriteObject::new(serialize_req(&21).unwrap(), 0))
        .await
        .unwrap();
    call.end().await.unwrap();

    let mut response = None;
    while let Some(ev) = events.recv().await {
        match ev {
            grpc_call_core::CallEvent::Data(buf) => response = Some(deserialize_resp(&buf).unwrap()),
            grpc_call_core::CallEvent::Status(status) => {
                println!("status: {:?}, response: {:?}", status.code(), response);
                break;
            }
            _ => {}
        }
    }
}
