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

//! A method descriptor binds a name and an RPC shape to a pair of codecs
//! (§1, §4.6). Produced by a code-generated stub in a real deployment; built
//! by hand in this crate's tests.

use crate::call::MethodType;
use crate::codec::Marshaller;

/// Describes one RPC: its wire name, its shape, and how to (de)serialize its
/// request and response types.
pub struct Method<Req, Resp> {
    pub ty: MethodType,
    pub name: &'static str,
    pub req_mar: Marshaller<Req>,
    pub resp_mar: Marshaller<Resp>,
}

impl<Req, Resp> Method<Req, Resp> {
    pub fn new(
        ty: MethodType,
        name: &'static str,
        req_mar: Marshaller<Req>,
        resp_mar: Marshaller<Resp>,
    ) -> Method<Req, Resp> {
        Method {
            ty,
            name,
            req_mar,
            resp_mar,
        }
    }
}
