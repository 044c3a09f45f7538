// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The trusted side of the sort: parameter computation, bucket
//! initialisation, the butterfly of merge-splits, and extraction.

use crate::bucket::{Bucket, Element, Payload};
use crate::cipher::BucketCipher;
use crate::merge_split::merge_split;
use crate::store::BucketStore;
use crate::{BucketIndex, InputRow, Level, SortError};
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, RngCore};

/// The bucket layout derived from the input length and the bucket capacity:
/// `bucket_count` buckets per level (a power of two) across
/// `level_count + 1` levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketParameters {
    /// The number of buckets per level, `B`.
    pub bucket_count: BucketIndex,
    /// The number of merge-split levels, `log2(B)`.
    pub level_count: Level,
}

/// The trusted compute domain.
///
/// An `Enclave` owns its untrusted store, the bucket cipher, and a
/// cryptographically seeded PRNG. One enclave runs one sort at a time; a
/// sort that fails leaves the store inconsistent, and the store must be
/// discarded.
///
/// ## Parameters
///
/// - `P`: the payload capacity in bytes of each element.
/// - `S`: the untrusted bucket store.
/// - `C`: the bucket cipher applied at the trust boundary.
/// - `R`: the PRNG drawing routing keys and the extraction shuffle. Seeds
///   must not be derived from input data.
#[derive(Debug)]
pub struct Enclave<const P: usize, S, C, R> {
    store: S,
    cipher: C,
    rng: R,
}

impl<const P: usize, S, C, R> Enclave<P, S, C, R>
where
    S: BucketStore<P>,
    C: BucketCipher<P>,
    R: RngCore + CryptoRng,
{
    /// Returns a new `Enclave` over the given store, cipher, and PRNG.
    pub fn new(store: S, cipher: C, rng: R) -> Self {
        Self { store, cipher, rng }
    }

    /// The untrusted store, for access-trace inspection.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the enclave and returns its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Derives the bucket layout for `input_len` records at the given
    /// bucket capacity.
    ///
    /// The bucket count is the smallest power of two holding twice the
    /// input, so that buckets run at most half full on average and the
    /// random routing has room to breathe. Fails if the capacity cannot
    /// accommodate the input even ignoring randomness, or if the capacity
    /// is not a power of two (the crossbar sorts `2 * capacity` elements
    /// with a power-of-two network).
    pub fn bucket_parameters(
        input_len: usize,
        bucket_capacity: usize,
    ) -> Result<BucketParameters, SortError> {
        if bucket_capacity == 0 || !bucket_capacity.is_power_of_two() {
            return Err(SortError::InvalidConfigurationError {
                parameter_name: "bucket capacity".to_string(),
                parameter_value: bucket_capacity.to_string(),
            });
        }

        let required = (2 * input_len).div_ceil(bucket_capacity);
        let bucket_count = required.max(1).next_power_of_two();
        let level_count = bucket_count.trailing_zeros();

        if input_len > bucket_count * (bucket_capacity / 2) {
            return Err(SortError::InvalidConfigurationError {
                parameter_name: "bucket capacity".to_string(),
                parameter_value: bucket_capacity.to_string(),
            });
        }

        Ok(BucketParameters {
            bucket_count: u64::try_from(bucket_count)?,
            level_count,
        })
    }

    /// Runs the full pipeline and returns the payloads in nondecreasing
    /// sort-key order.
    pub fn sort(
        &mut self,
        rows: &[InputRow],
        bucket_capacity: usize,
    ) -> Result<Vec<Vec<u8>>, SortError> {
        let elements = self.sort_elements(rows, bucket_capacity)?;
        Ok(elements
            .iter()
            .map(|element| element.payload.as_bytes().to_vec())
            .collect())
    }

    /// Runs the full pipeline and returns the sorted elements.
    pub fn sort_elements(
        &mut self,
        rows: &[InputRow],
        bucket_capacity: usize,
    ) -> Result<Vec<Element<P>>, SortError> {
        log::info!(
            "Enclave::sort(n = {}, bucket_capacity = {})",
            rows.len(),
            bucket_capacity
        );

        let parameters = Self::bucket_parameters(rows.len(), bucket_capacity)?;
        self.initialize_buckets(rows, parameters, bucket_capacity)?;
        self.run_butterfly(parameters, bucket_capacity)?;
        let mut elements = self.extract_elements(parameters, bucket_capacity)?;

        // The final ordering runs on enclave-local memory; it need not be
        // oblivious and may compare sort keys directly.
        elements.sort_unstable_by_key(|element| element.sort_key);
        Ok(elements)
    }

    /// Builds the level-0 buckets: one element per record with a fresh
    /// routing key, partitioned into contiguous groups and padded to
    /// capacity with dummies. The initial placement is arbitrary; the
    /// routing keys are what mix the elements.
    fn initialize_buckets(
        &mut self,
        rows: &[InputRow],
        parameters: BucketParameters,
        bucket_capacity: usize,
    ) -> Result<(), SortError> {
        let bucket_count = parameters.bucket_count;

        let mut elements = Vec::with_capacity(rows.len());
        for (sort_key, row) in rows {
            let routing_key = self.rng.gen_range(0..bucket_count);
            elements.push(Element::real(
                *sort_key,
                routing_key,
                Payload::from_bytes(row)?,
            ));
        }

        let group_size = rows.len().div_ceil(usize::try_from(bucket_count)?);
        for index in 0..bucket_count {
            let start = (usize::try_from(index)? * group_size).min(rows.len());
            let end = (start + group_size).min(rows.len());

            let mut bucket: Bucket<P> = elements[start..end].to_vec();
            bucket.resize(bucket_capacity, Element::dummy());
            self.store
                .write_bucket(0, index, self.cipher.encrypt_bucket(bucket));
        }

        Ok(())
    }

    /// Runs the butterfly: at level `l`, pairs of buckets a stride of
    /// `2^(L - 1 - l)` apart exchange elements on routing bit `L - 1 - l`,
    /// most significant first. After level `l`, the top `l + 1` routing
    /// bits of every real element match its bucket-index prefix, so the
    /// final level places each element in the bucket its routing key names.
    fn run_butterfly(
        &mut self,
        parameters: BucketParameters,
        bucket_capacity: usize,
    ) -> Result<(), SortError> {
        let bucket_count = parameters.bucket_count;
        let level_count = parameters.level_count;

        for level in 0..level_count {
            let bit_index = level_count - 1 - level;
            let stride: BucketIndex = 1 << bit_index;
            log::debug!("Butterfly level {} (stride {})", level, stride);

            let mut base = 0;
            while base < bucket_count {
                for offset in 0..stride {
                    let low = base + offset;
                    let high = low + stride;

                    let bucket0 = self.fetch_bucket(level, low, bucket_capacity)?;
                    let bucket1 = self.fetch_bucket(level, high, bucket_capacity)?;

                    let (out0, out1) =
                        merge_split(bucket0, bucket1, level, bit_index, bucket_capacity)?;

                    self.store
                        .write_bucket(level + 1, low, self.cipher.encrypt_bucket(out0));
                    self.store
                        .write_bucket(level + 1, high, self.cipher.encrypt_bucket(out1));
                }
                base += 2 * stride;
            }
        }

        Ok(())
    }

    /// Reads the final level, strips the dummies, and shuffles the reals
    /// inside the enclave so that extraction order cannot be correlated
    /// with input order. The shuffle touches only enclave-local memory.
    fn extract_elements(
        &mut self,
        parameters: BucketParameters,
        bucket_capacity: usize,
    ) -> Result<Vec<Element<P>>, SortError> {
        let mut reals = Vec::new();
        for index in 0..parameters.bucket_count {
            let bucket = self.fetch_bucket(parameters.level_count, index, bucket_capacity)?;
            reals.extend(bucket.into_iter().filter(|element| !element.is_dummy));
        }

        reals.shuffle(&mut self.rng);
        Ok(reals)
    }

    fn fetch_bucket(
        &mut self,
        level: Level,
        index: BucketIndex,
        bucket_capacity: usize,
    ) -> Result<Bucket<P>, SortError> {
        let bucket = self
            .cipher
            .decrypt_bucket(self.store.read_bucket(level, index))?;
        if bucket.len() != bucket_capacity {
            return Err(SortError::StoreMissError { level, index });
        }
        Ok(bucket)
    }
}
