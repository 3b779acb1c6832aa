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

//! Canonical multi-valued header bag with gRPC semantics (§3, §4.1).

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Error, Result};

/// A single metadata value: printable ASCII, or opaque bytes for `-bin` keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataValue {
    Ascii(String),
    Binary(Vec<u8>),
}

impl MetadataValue {
    fn validate(key: &str, value: &MetadataValue) -> Result<()> {
        match value {
            MetadataValue::Binary(_) if !key.ends_with("-bin") => Err(Error::InvalidArgument(
                format!("key {} does not end in -bin but carries a binary value", key),
            )),
            MetadataValue::Ascii(s) if key.ends_with("-bin") => {
                // Ascii values are accepted on -bin keys too (caller already has a string).
                let _ = s;
                Ok(())
            }
            MetadataValue::Ascii(s)
                if !s.chars().all(|c| c.is_ascii_graphic() || c == ' ') =>
            {
                Err(Error::InvalidArgument(format!(
                    "value for key {} is not printable ASCII",
                    key
                )))
            }
            _ => Ok(()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> MetadataValue {
        MetadataValue::Ascii(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> MetadataValue {
        MetadataValue::Ascii(s)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(b: Vec<u8>) -> MetadataValue {
        MetadataValue::Binary(b)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("metadata key must not be empty".into()));
    }
    let lower_ok = key
        .chars()
        .all(|c| (c.is_ascii_graphic() || c == ' ') && !c.is_ascii_uppercase());
    if !lower_ok {
        return Err(Error::InvalidArgument(format!(
            "metadata key {} must be lowercase printable ASCII",
            key
        )));
    }
    Ok(())
}

/// Mapping from a lowercase ASCII key to an ordered sequence of values.
/// Iteration order is insertion order; cloning performs a deep copy (§3).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    // Keeps insertion order of keys separately from the map itself so that
    // `iter()` matches the order keys were first seen, matching the source's
    // "iteration order is insertion order" invariant.
    order: Vec<String>,
    values: HashMap<String, Vec<MetadataValue>>,
}

impl Metadata {
    pub fn new() -> Metadata {
        Metadata {
            order: Vec::new(),
            values: HashMap::new(),
        }
    }

    fn remember(&mut self, key: &str) {
        if !self.values.contains_key(key) {
            self.order.push(key.to_string());
        }
    }

    /// Replaces all values for `key` with a single value.
    pub fn set<V: Into<MetadataValue>>(&mut self, key: &str, value: V) -> Result<()> {
        validate_key(key)?;
        let value = value.into();
        MetadataValue::validate(key, &value)?;
        self.remember(key);
        self.values.insert(key.to_string(), vec![value]);
        Ok(())
    }

    /// Appends a value to the sequence for `key`.
    pub fn add<V: Into<MetadataValue>>(&mut self, key: &str, value: V) -> Result<()> {
        validate_key(key)?;
        let value = value.into();
        MetadataValue::validate(key, &value)?;
        self.remember(key);
        self.values.entry(key.to_string()).or_default().push(value);
        Ok(())
    }

    /// Removes all values for `key`.
    pub fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    /// Returns the value sequence for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&[MetadataValue]> {
        self.values.get(key).map(|v| v.as_slice())
    }

    /// Snapshot view of single-valued keys: last value wins for each key.
    pub fn get_map(&self) -> HashMap<String, MetadataValue> {
        self.order
            .iter()
            .filter_map(|k| self.values.get(k).and_then(|v| v.last()).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Iterates `(key, value)` pairs in insertion order, repeating the key for
    /// each value in its sequence.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.order.iter().flat_map(move |k| {
            self.values
                .get(k)
                .into_iter()
                .flat_map(move |vs| vs.iter().map(move |v| (k.as_str(), v)))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Encodes this bag as wire header pairs: `-bin` keys are base64-encoded,
    /// everything else passes through verbatim (§6 wire mapping).
    pub fn to_wire_pairs(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(k, v)| {
                let wire_value = match v {
                    MetadataValue::Ascii(s) => s.clone(),
                    MetadataValue::Binary(b) => STANDARD.encode(b),
                };
                (k.to_string(), wire_value)
            })
            .collect()
    }

    /// Rebuilds a `Metadata` from wire header pairs, reversing
    /// [`Metadata::to_wire_pairs`] (`-bin` keys are base64-decoded).
    pub fn from_wire_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Result<Metadata> {
        let mut md = Metadata::new();
        for (k, v) in pairs {
            if k.ends_with("-bin") {
                let bytes = STANDARD
                    .decode(v.as_bytes())
                    .map_err(|e| Error::InvalidArgument(format!("bad base64 in {}: {}", k, e)))?;
                md.add(&k, bytes)?;
            } else {
                md.add(&k, v)?;
            }
        }
        Ok(md)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_add_appends() {
        let mut md = Metadata::new();
        md.add("x-a", "1").unwrap();
        md.add("x-a", "2").unwrap();
        assert_eq!(md.get("x-a").unwrap().len(), 2);

        md.set("x-a", "3").unwrap();
        assert_eq!(md.get("x-a").unwrap().len(), 1);
    }

    #[test]
    fn rejects_invalid_keys() {
        let mut md = Metadata::new();
        assert!(md.set("", "v").is_err());
        assert!(md.set("X-Upper", "v").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        let mut md = Metadata::new();
        assert!(md.set("x-a", "bad\x01value").is_err());
        assert!(md.set("x-\x01a", "v").is_err());
    }

    #[test]
    fn rejects_binary_on_non_bin_key() {
        let mut md = Metadata::new();
        assert!(md.set("x-a", vec![1u8, 2, 3]).is_err());
        assert!(md.set("x-a-bin", vec![1u8, 2, 3]).is_ok());
    }

    #[test]
    fn get_map_last_wins() {
        let mut md = Metadata::new();
        md.add("x-a", "1").unwrap();
        md.add("x-a", "2").unwrap();
        let map = md.get_map();
        assert_eq!(map.get("x-a").unwrap(), &MetadataValue::Ascii("2".into()));
    }

    #[test]
    fn wire_round_trip_preserves_order_and_binary() {
        let mut md = Metadata::new();
        md.add("x-a", "v1").unwrap();
        md.add("x-a", "v2").unwrap();
        md.add("x-b-bin", vec![0u8, 1, 2, 255]).unwrap();

        let wire = md.to_wire_pairs();
        let restored = Metadata::from_wire_pairs(wire).unwrap();

        assert_eq!(restored.get("x-a").unwrap().len(), 2);
        assert_eq!(
            restored.get("x-b-bin").unwrap(),
            &[MetadataValue::Binary(vec![0, 1, 2, 255])]
        );
        let keys: Vec<_> = restored.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["x-a", "x-a", "x-b-bin"]);
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let mut md = Metadata::new();
        md.add("x-a", "1").unwrap();
        let mut clone = md.clone();
        clone.add("x-a", "2").unwrap();
        assert_eq!(md.get("x-a").unwrap().len(), 1);
        assert_eq!(clone.get("x-a").unwrap().len(), 2);
    }
}
