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

//! The terminal record of an RPC: a [`Code`], a human-readable message and
//! trailing [`Metadata`]. Constructed only at terminal points (§4.2).

use crate::metadata::Metadata;

/// gRPC status codes, mirroring the canonical list used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Decodes the `grpc-status` trailer value (§6 wire mapping).
    pub fn from_i32(code: i32) -> Code {
        match code {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }
}

/// Terminal record of an RPC. `Ok` is the sole non-error code; all others
/// carry `details` for human diagnosis and may carry trailing metadata (§4.2).
#[derive(Clone, Debug, PartialEq)]
pub struct StatusObject {
    code: Code,
    details: String,
    metadata: Metadata,
}

impl StatusObject {
    /// Builds a status with empty trailing metadata.
    pub fn new(code: Code, details: String) -> StatusObject {
        StatusObject {
            code,
            details,
            metadata: Metadata::new(),
        }
    }

    /// Builds a status carrying trailing metadata received on the wire.
    pub fn with_metadata(code: Code, details: String, metadata: Metadata) -> StatusObject {
        StatusObject {
            code,
            details,
            metadata,
        }
    }

    /// The canonical `Ok` status with no details.
    pub fn ok() -> StatusObject {
        StatusObject::new(Code::Ok, String::new())
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_has_no_error() {
        let s = StatusObject::ok();
        assert!(s.is_ok());
        assert_eq!(s.details(), "");
    }

    #[test]
    fn equality_is_by_code_details_and_metadata() {
        let mut md = Metadata::new();
        md.add("x-trace", "1").unwrap();
        let a = StatusObject::with_metadata(Code::Internal, "boom".into(), md.clone());
        let b = StatusObject::with_metadata(Code::Internal, "boom".into(), md);
        assert_eq!(a, b);

        let c = StatusObject::new(Code::Internal, "boom".into());
        assert_ne!(a, c);
    }

    #[test]
    fn from_i32_unknown_falls_back_to_unknown() {
        assert_eq!(Code::from_i32(99), Code::Unknown);
        assert_eq!(Code::from_i32(0), Code::Ok);
    }
}
