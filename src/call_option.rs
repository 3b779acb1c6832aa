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

//! Per-call configuration: [`Deadline`], [`CallOption`] and [`WriteFlags`] (§3, §10.3).

use std::time::{Duration, Instant};

/// Either an absolute wall-clock instant or `infinity` (§3).
///
/// Compared monotonically against [`Instant::now`]; a `None` inner value means
/// the timer is disabled, matching the source's "`null` or infinite deadline
/// disables the timer" rule (§4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn from_timeout(timeout: Duration) -> Deadline {
        Deadline {
            at: Some(Instant::now() + timeout),
        }
    }

    /// A deadline that never elapses.
    pub fn infinite() -> Deadline {
        Deadline { at: None }
    }

    /// Whether `Instant::now()` is at or past this deadline.
    pub fn exceeded(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Duration remaining until the deadline, or `None` if infinite.
    /// A deadline already in the past yields `Duration::ZERO`.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.at
    }
}

impl Default for Deadline {
    fn default() -> Deadline {
        Deadline::infinite()
    }
}

/// Per-write flags accompanying a [`crate::status::StatusObject`]-free message send.
///
/// Bit 0 is the no-compression hint carried by `WriteObject` (§3); bit 1 asks
/// the call to buffer the write instead of flushing it to the transport
/// immediately, mirroring the teacher crate's `WriteFlags::buffer_hint`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteFlags {
    flags: u32,
}

const FLAG_NO_COMPRESS: u32 = 1;
const FLAG_BUFFER_HINT: u32 = 1 << 1;

impl WriteFlags {
    pub fn new() -> WriteFlags {
        WriteFlags::default()
    }

    /// Hints that this message should not be compressed by the transport.
    pub fn force_no_compress(mut self, no_compress: bool) -> WriteFlags {
        if no_compress {
            self.flags |= FLAG_NO_COMPRESS;
        } else {
            self.flags &= !FLAG_NO_COMPRESS;
        }
        self
    }

    /// Hints that the transport may buffer this message rather than flush it.
    pub fn buffer_hint(mut self, buffer: bool) -> WriteFlags {
        if buffer {
            self.flags |= FLAG_BUFFER_HINT;
        } else {
            self.flags &= !FLAG_BUFFER_HINT;
        }
        self
    }

    pub fn is_no_compress(&self) -> bool {
        self.flags & FLAG_NO_COMPRESS != 0
    }

    pub fn is_buffered(&self) -> bool {
        self.flags & FLAG_BUFFER_HINT != 0
    }

    pub fn bits(&self) -> u32 {
        self.flags
    }
}

/// Options that configure a single call: its deadline, fail-fast eagerness and
/// per-write default flags (§10.3).
#[derive(Clone, Debug, Default)]
pub struct CallOption {
    deadline: Option<Deadline>,
    fail_fast: bool,
    write_flags: WriteFlags,
}

impl CallOption {
    pub fn new() -> CallOption {
        CallOption::default()
    }

    /// Sets an explicit deadline for this call, overriding any inherited
    /// from a parent call (§4.4 parent linkage).
    pub fn timeout(mut self, timeout: Duration) -> CallOption {
        self.deadline = Some(Deadline::from_timeout(timeout));
        self
    }

    /// Sets an already-constructed deadline, e.g. one inherited from a
    /// `ChannelOption::default_deadline` rather than computed from `now`.
    pub fn with_deadline(mut self, deadline: Deadline) -> CallOption {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// If true, the call should fail immediately rather than wait for the
    /// channel to leave `TRANSIENT_FAILURE` (consumed only by the Channel
    /// boundary; the core does not interpret it further).
    pub fn fail_fast(mut self, fail_fast: bool) -> CallOption {
        self.fail_fast = fail_fast;
        self
    }

    pub fn is_fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn write_flags(mut self, flags: WriteFlags) -> CallOption {
        self.write_flags = flags;
        self
    }

    pub fn default_write_flags(&self) -> WriteFlags {
        self.write_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_deadline_never_exceeded() {
        let d = Deadline::infinite();
        assert!(!d.exceeded());
        assert_eq!(d.remaining(), None);
    }

    #[test]
    fn elapsed_deadline_is_exceeded() {
        let d = Deadline::from_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(d.exceeded());
    }

    #[test]
    fn write_flags_builder_round_trips() {
        let f = WriteFlags::new().force_no_compress(true).buffer_hint(true);
        assert!(f.is_no_compress());
        assert!(f.is_buffered());
        let f = f.buffer_hint(false);
        assert!(!f.is_buffered());
    }
}
