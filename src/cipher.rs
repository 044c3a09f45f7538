// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The encryption seam between the enclave and the untrusted store.

use crate::bucket::Bucket;
use crate::{RoutingKey, SortError, SortKey};

/// Encrypts buckets on their way to the store and decrypts them on the way
/// back, with `decrypt(encrypt(b)) = b` for the real elements of `b`.
///
/// A production deployment substitutes authenticated encryption over the
/// whole element, with per-bucket nonces derived from the `(level, index)`
/// address and a sort-scoped key.
pub trait BucketCipher<const P: usize> {
    /// Encrypts a bucket for storage.
    fn encrypt_bucket(&self, bucket: Bucket<P>) -> Bucket<P>;

    /// Decrypts a stored bucket, rejecting it with
    /// [`SortError::DecryptionError`] if authentication fails.
    fn decrypt_bucket(&self, bucket: Bucket<P>) -> Result<Bucket<P>, SortError>;
}

/// The fixed mask of the reference stub.
const ENCRYPTION_MASK: u64 = 0xdead_beef;

/// A placeholder cipher that XOR-masks the two key fields of real elements
/// and passes dummies through unchanged. It marks where real encryption
/// would sit; it provides no secrecy.
#[derive(Clone, Copy, Debug, Default)]
pub struct XorCipher;

fn mask_bucket<const P: usize>(mut bucket: Bucket<P>) -> Bucket<P> {
    for element in &mut bucket {
        if !element.is_dummy {
            element.sort_key ^= ENCRYPTION_MASK as SortKey;
            element.routing_key ^= ENCRYPTION_MASK as RoutingKey;
        }
    }
    bucket
}

impl<const P: usize> BucketCipher<P> for XorCipher {
    fn encrypt_bucket(&self, bucket: Bucket<P>) -> Bucket<P> {
        mask_bucket(bucket)
    }

    fn decrypt_bucket(&self, bucket: Bucket<P>) -> Result<Bucket<P>, SortError> {
        // XOR is an involution, so decryption is the same masking pass and
        // can never reject.
        Ok(mask_bucket(bucket))
    }
}
