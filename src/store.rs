// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Untrusted bucket storage observed by the adversary.

use crate::bucket::{describe_bucket, Bucket};
use crate::{BucketIndex, Level};
use std::collections::HashMap;
use std::fmt;

/// How a bucket address was touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// A bucket read.
    Read,
    /// A bucket write.
    Write,
}

/// One entry of the append-only access log: the address that was touched
/// and the stored view of the bucket at the time of the access.
///
/// The `(kind, level, index)` projection is the adversary's view of a
/// sort; the contents string records what was physically stored (possibly
/// ciphertext) for downstream analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessRecord {
    /// Whether the access was a read or a write.
    pub kind: AccessKind,
    /// The level component of the address.
    pub level: Level,
    /// The bucket-index component of the address.
    pub index: BucketIndex,
    /// The stored view of the bucket: per slot, the stored sort key or
    /// `dummy`.
    pub contents: String,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            AccessKind::Read => "Read",
            AccessKind::Write => "Write",
        };
        write!(
            f,
            "{} bucket at level {}, index {}: {}",
            verb, self.level, self.index, self.contents
        )
    }
}

/// Addressable bucket storage keyed by `(level, index)`.
///
/// The store performs no cryptographic work; it is a dumb key-to-bucket map
/// that records every access. Reads return fresh buckets and writes hand
/// ownership to the store, so no aliasing crosses the trust boundary.
pub trait BucketStore<const P: usize> {
    /// Returns the bucket last written at `(level, index)`, or the empty
    /// bucket if the address was never written. Appends to the access log.
    fn read_bucket(&mut self, level: Level, index: BucketIndex) -> Bucket<P>;

    /// Stores `bucket` verbatim at `(level, index)`, overwriting any prior
    /// value. Appends to the access log.
    fn write_bucket(&mut self, level: Level, index: BucketIndex, bucket: Bucket<P>);

    /// The reads and writes observed so far, in issue order.
    fn access_log(&self) -> &[AccessRecord];
}

/// An in-memory [`BucketStore`] standing in for host memory.
#[derive(Debug, Default)]
pub struct UntrustedMemory<const P: usize> {
    storage: HashMap<(Level, BucketIndex), Bucket<P>>,
    log: Vec<AccessRecord>,
}

impl<const P: usize> UntrustedMemory<P> {
    /// Returns a new, empty `UntrustedMemory`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over every stored bucket with its address. Intended for
    /// trace analysis; a real host has no such introspection.
    pub fn buckets(&self) -> impl Iterator<Item = (Level, BucketIndex, &Bucket<P>)> + '_ {
        self.storage
            .iter()
            .map(|(&(level, index), bucket)| (level, index, bucket))
    }
}

impl<const P: usize> BucketStore<P> for UntrustedMemory<P> {
    fn read_bucket(&mut self, level: Level, index: BucketIndex) -> Bucket<P> {
        log::debug!("Physical read -- level {}, index {}", level, index);

        let bucket = self
            .storage
            .get(&(level, index))
            .cloned()
            .unwrap_or_default();
        self.log.push(AccessRecord {
            kind: AccessKind::Read,
            level,
            index,
            contents: describe_bucket(&bucket),
        });
        bucket
    }

    fn write_bucket(&mut self, level: Level, index: BucketIndex, bucket: Bucket<P>) {
        log::debug!("Physical write -- level {}, index {}", level, index);

        self.log.push(AccessRecord {
            kind: AccessKind::Write,
            level,
            index,
            contents: describe_bucket(&bucket),
        });
        self.storage.insert((level, index), bucket);
    }

    fn access_log(&self) -> &[AccessRecord] {
        &self.log
    }
}
