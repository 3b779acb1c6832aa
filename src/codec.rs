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

//! How to serialize and deserialize between an application type and the
//! byte buffer the transport deals in.

use crate::error::{Error, Result};

pub type SerializeFn<T> = fn(&T) -> Result<Vec<u8>>;
pub type DeserializeFn<T> = fn(&[u8]) -> Result<T>;

/// Defines how to serialize and deserialize between a specialized type and a
/// byte slice.
///
/// Use function pointers here, as the teacher crate does, rather than a
/// trait object: code-generated stubs are out of scope (§1), so callers
/// supply plain `fn` items (typically produced by a protobuf/prost
/// codegen step that lives outside this crate).
pub struct Marshaller<T> {
    pub ser: SerializeFn<T>,
    pub de: DeserializeFn<T>,
}

impl<T> Marshaller<T> {
    pub fn new(ser: SerializeFn<T>, de: DeserializeFn<T>) -> Marshaller<T> {
        Marshaller { ser, de }
    }

    pub fn serialize(&self, t: &T) -> Result<Vec<u8>> {
        (self.ser)(t).map_err(|e| match e {
            Error::CodecError(m) => Error::CodecError(m),
            other => Error::CodecError(other.to_string()),
        })
    }

    pub fn deserialize(&self, buf: &[u8]) -> Result<T> {
        (self.de)(buf).map_err(|e| match e {
            Error::CodecError(m) => Error::CodecError(m),
            other => Error::CodecError(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ser(t: &u32) -> Result<Vec<u8>> {
        Ok(t.to_be_bytes().to_vec())
    }

    fn de(buf: &[u8]) -> Result<u32> {
        if buf.len() != 4 {
            return Err(Error::CodecError("expected 4 bytes".into()));
        }
        let mut arr = [0u8; 4];
        arr.copy_from_slice(buf);
        Ok(u32::from_be_bytes(arr))
    }

    #[test]
    fn round_trips_through_marshaller() {
        let m = Marshaller::new(ser, de);
        let bytes = m.serialize(&42).unwrap();
        assert_eq!(m.deserialize(&bytes).unwrap(), 42);
    }

    #[test]
    fn deserialize_failure_is_codec_error() {
        let m = Marshaller::new(ser, de);
        assert!(matches!(m.deserialize(&[1, 2]), Err(Error::CodecError(_))));
    }
}
