// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An implementation of oblivious bucket sort.
//!
//! The sorter targets an enclave/host split: the trusted side (the
//! [`Enclave`]) orders records by an integer key, while the untrusted side
//! (a [`BucketStore`]) holds encrypted fixed-size buckets and observes only
//! the sequence of bucket-level reads and writes. That sequence depends on
//! the input length alone, so the host learns nothing about the record
//! values.
//!
//! The pipeline is a bucket-oblivious shuffle (a butterfly network of
//! bitonic merge-splits) followed by an in-enclave sort of the extracted
//! records. [`DistributedSorter`] composes several independent enclaves
//! into a larger sort via merge-exchange rounds over shard pairs.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

pub mod bitonic;
pub mod bucket;
pub mod cipher;
pub mod distributed;
pub mod enclave;
pub(crate) mod merge_split;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use bucket::{Bucket, Element, Payload};
pub use cipher::{BucketCipher, XorCipher};
pub use distributed::{DistributedSorter, LocalSort};
pub use enclave::{BucketParameters, Enclave};
pub use store::{AccessKind, AccessRecord, BucketStore, UntrustedMemory};

use std::num::TryFromIntError;
use thiserror::Error;

/// The semantic ordering key of a record (e.g. a subscriber count).
pub type SortKey = i64;
/// The random key that steers a record through the butterfly network.
pub type RoutingKey = u64;
/// A level of the butterfly network, `0..=L`.
pub type Level = u32;
/// The index of a bucket within a level, `0..B`.
pub type BucketIndex = u64;
/// One record handed to the sorter: the ordering key and the opaque row bytes.
pub type InputRow = (SortKey, Vec<u8>);

/// Errors arising from this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SortError {
    /// Arising from conversions between integer types.
    #[error("Arithmetic error encountered.")]
    IntegerConversionError {
        /// The underlying conversion error.
        #[from]
        source: TryFromIntError,
    },
    /// Arising when the caller provides parameters the sort cannot satisfy.
    #[error("Invalid configuration: {parameter_name} = {parameter_value}.")]
    InvalidConfigurationError {
        /// The name of the offending parameter.
        parameter_name: String,
        /// The value of the offending parameter.
        parameter_value: String,
    },
    /// Arising when random routing overfills one side of a merge-split.
    /// The caller may retry with a larger bucket capacity or a fresh seed.
    #[error("Bucket overflow in merge-split at level {level}.")]
    BucketOverflowError {
        /// The butterfly level at which the overflow occurred.
        level: Level,
    },
    /// Arising when a bucket is read back with the wrong shape. This is a
    /// programming error, not a user error.
    #[error("Read of an unwritten bucket at level {level}, index {index}.")]
    StoreMissError {
        /// The level of the offending read.
        level: Level,
        /// The bucket index of the offending read.
        index: BucketIndex,
    },
    /// Arising when decryption rejects a bucket. Unreachable with the
    /// reference [`XorCipher`]; fatal with an authenticated cipher.
    #[error("Bucket decryption failed.")]
    DecryptionError,
    /// Arising when a record's bytes exceed the payload capacity.
    #[error("Payload of length {length} exceeds capacity {capacity}.")]
    PayloadTooLargeError {
        /// The length of the rejected record.
        length: usize,
        /// The fixed payload capacity.
        capacity: usize,
    },
}
