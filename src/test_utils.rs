// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Common test utilities.

use crate::cipher::XorCipher;
use crate::enclave::Enclave;
use crate::store::UntrustedMemory;
use crate::{InputRow, SortError, SortKey};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// The payload capacity used throughout the tests.
pub(crate) const PAYLOAD_SIZE: usize = 16;

/// The enclave monomorphization used throughout the tests.
pub(crate) type TestEnclave = Enclave<PAYLOAD_SIZE, UntrustedMemory<PAYLOAD_SIZE>, XorCipher, StdRng>;

/// How many fresh seeds a test retries before giving up on a sort whose
/// routing draw keeps overflowing. Retry-on-overflow is caller policy, and
/// the tests are the caller here.
const MAX_SEED_ATTEMPTS: u64 = 64;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Rows whose payloads are the decimal rendering of their sort keys.
pub(crate) fn rows_from_keys(keys: &[SortKey]) -> Vec<InputRow> {
    keys.iter()
        .map(|&key| (key, key.to_string().into_bytes()))
        .collect()
}

/// The payload sequence a correct sort of `keys` must emit.
pub(crate) fn sorted_payloads(keys: &[SortKey]) -> Vec<Vec<u8>> {
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .map(|key| key.to_string().into_bytes())
        .collect()
}

/// Payloads as a multiset, for permutation checks.
pub(crate) fn payload_multiset(payloads: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut sorted = payloads.to_vec();
    sorted.sort();
    sorted
}

pub(crate) fn random_keys(n: usize, seed: u64) -> Vec<SortKey> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1_000..1_000)).collect()
}

/// Sorts `keys`, retrying with fresh seeds on overflow, and returns the
/// output payloads together with the store of the successful run.
pub(crate) fn sort_retrying(
    keys: &[SortKey],
    bucket_capacity: usize,
    base_seed: u64,
) -> (Vec<Vec<u8>>, UntrustedMemory<PAYLOAD_SIZE>) {
    let rows = rows_from_keys(keys);
    for attempt in 0..MAX_SEED_ATTEMPTS {
        let mut enclave = TestEnclave::new(
            UntrustedMemory::new(),
            XorCipher,
            StdRng::seed_from_u64(base_seed ^ attempt),
        );
        match enclave.sort(&rows, bucket_capacity) {
            Ok(output) => return (output, enclave.into_store()),
            Err(SortError::BucketOverflowError { .. }) => continue,
            Err(other) => panic!("unexpected sort error: {other}"),
        }
    }
    panic!("sort overflowed on {MAX_SEED_ATTEMPTS} consecutive seeds");
}

/// Asserts sortedness and permutation for a random input of `input_len`
/// keys at the given bucket capacity.
pub(crate) fn check_sorts_random_input(bucket_capacity: usize, input_len: usize) {
    init_logger();

    let keys = random_keys(input_len, (input_len as u64) << 8 | bucket_capacity as u64);
    let (output, _) = sort_retrying(&keys, bucket_capacity, 0);

    assert_eq!(output, sorted_payloads(&keys));

    let inputs: Vec<Vec<u8>> = rows_from_keys(&keys).into_iter().map(|(_, row)| row).collect();
    assert_eq!(payload_multiset(&output), payload_multiset(&inputs));
}

macro_rules! create_sort_test {
    ($bucket_capacity:tt, $input_len:tt) => {
        paste::paste! {
            #[test]
            fn [<sorts_random_input_capacity_ $bucket_capacity _len_ $input_len>]() {
                $crate::test_utils::check_sorts_random_input($bucket_capacity, $input_len);
            }
        }
    };
}

macro_rules! create_sort_tests_for_capacity {
    ($bucket_capacity:tt, [$($input_len:tt),+ $(,)?]) => {
        $(
            $crate::test_utils::create_sort_test!($bucket_capacity, $input_len);
        )+
    };
}

pub(crate) use create_sort_test;
pub(crate) use create_sort_tests_for_capacity;
