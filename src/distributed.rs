// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Composing several independent enclaves into one sort.
//!
//! Each shard sorts its partition locally, then pairs of shards repeatedly
//! merge their sorted runs and split the result back into equal halves,
//! lower half to the lower shard index. The pairing schedule is an
//! odd-even merge-exchange network over the shard indices, so the
//! concatenation of the shards is globally sorted after the final round.
//!
//! The pairwise merges compare sort keys directly, so the cross-shard
//! access pattern is not oblivious; obliviousness is limited to each
//! shard's own store.

use crate::bitonic::sort_elements_by_sort_key;
use crate::bucket::{Element, Payload};
use crate::cipher::XorCipher;
use crate::enclave::Enclave;
use crate::store::UntrustedMemory;
use crate::{InputRow, SortError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::thread;

/// How each shard orders its partition before the merge rounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalSort {
    /// The standalone bitonic network over the padded partition. Fully
    /// oblivious, entirely in enclave memory.
    Bitonic,
    /// A complete oblivious bucket sort against a per-shard store.
    BucketOblivious {
        /// The bucket capacity handed to each shard's enclave.
        bucket_capacity: usize,
    },
}

/// Partitions input across a power-of-two number of shard enclaves, sorts
/// locally in parallel, and merges the shards into one ordered sequence.
#[derive(Clone, Copy, Debug)]
pub struct DistributedSorter {
    shard_count: usize,
    local_sort: LocalSort,
}

impl DistributedSorter {
    /// Returns a new `DistributedSorter` over `shard_count` shards, which
    /// must be a power of two.
    pub fn new(shard_count: usize, local_sort: LocalSort) -> Result<Self, SortError> {
        if shard_count == 0 || !shard_count.is_power_of_two() {
            return Err(SortError::InvalidConfigurationError {
                parameter_name: "shard count".to_string(),
                parameter_value: shard_count.to_string(),
            });
        }
        Ok(Self {
            shard_count,
            local_sort,
        })
    }

    /// Sorts `rows` across the shards and returns the payloads in
    /// nondecreasing sort-key order.
    pub fn sort<const P: usize>(&self, rows: &[InputRow]) -> Result<Vec<Vec<u8>>, SortError> {
        log::info!(
            "DistributedSorter::sort(n = {}, shards = {})",
            rows.len(),
            self.shard_count
        );

        let partitions = partition_rows(rows, self.shard_count);
        let local_sort = self.local_sort;

        let local_results: Vec<Result<Vec<Element<P>>, SortError>> = thread::scope(|scope| {
            let handles: Vec<_> = partitions
                .into_iter()
                .map(|partition| scope.spawn(move || local_shard_sort::<P>(partition, local_sort)))
                .collect();
            handles.into_iter().map(join_task).collect()
        });

        let mut shards = Vec::with_capacity(self.shard_count);
        for result in local_results {
            shards.push(result?);
        }

        // Pad every shard to a common power-of-two length so that the
        // merge rounds exchange equal halves; dummies sit at the high end.
        let common_len = shards
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .next_power_of_two();
        for shard in &mut shards {
            shard.resize(common_len, Element::dummy());
        }

        merge_rounds(&mut shards);

        let mut payloads = Vec::new();
        for shard in shards {
            for element in shard {
                if !element.is_dummy {
                    payloads.push(element.payload.as_bytes().to_vec());
                }
            }
        }
        Ok(payloads)
    }
}

/// Contiguous partitioning, with remainder rows going to the lowest shard
/// indices.
fn partition_rows(rows: &[InputRow], shard_count: usize) -> Vec<Vec<InputRow>> {
    let per_shard = rows.len() / shard_count;
    let remainder = rows.len() % shard_count;

    let mut partitions = Vec::with_capacity(shard_count);
    let mut start = 0;
    for shard in 0..shard_count {
        let len = per_shard + usize::from(shard < remainder);
        partitions.push(rows[start..start + len].to_vec());
        start += len;
    }
    partitions
}

fn local_shard_sort<const P: usize>(
    partition: Vec<InputRow>,
    local_sort: LocalSort,
) -> Result<Vec<Element<P>>, SortError> {
    match local_sort {
        LocalSort::Bitonic => {
            let mut elements = Vec::with_capacity(partition.len());
            for (sort_key, row) in &partition {
                elements.push(Element::real(*sort_key, 0, Payload::from_bytes(row)?));
            }
            sort_elements_by_sort_key(&mut elements);
            Ok(elements)
        }
        LocalSort::BucketOblivious { bucket_capacity } => {
            let mut enclave = Enclave::<P, _, _, _>::new(
                UntrustedMemory::new(),
                XorCipher,
                StdRng::from_entropy(),
            );
            enclave.sort_elements(&partition, bucket_capacity)
        }
    }
}

/// Runs the merge-exchange rounds in place. Every shard must hold a sorted
/// run of the same length; afterwards the concatenation of the shards in
/// index order is sorted, dummies last within the whole.
pub(crate) fn merge_rounds<const P: usize>(shards: &mut [Vec<Element<P>>]) {
    for (round, pairs) in exchange_rounds(shards.len()).into_iter().enumerate() {
        log::debug!("Distributed merge round {} ({} pairs)", round + 1, pairs.len());
        run_round(shards, &pairs);
    }
}

/// One round of disjoint pairwise merges, run in parallel.
fn run_round<const P: usize>(shards: &mut [Vec<Element<P>>], pairs: &[(usize, usize)]) {
    let taken: Vec<(usize, usize, Vec<Element<P>>, Vec<Element<P>>)> = pairs
        .iter()
        .map(|&(low, high)| {
            let a = std::mem::take(&mut shards[low]);
            let b = std::mem::take(&mut shards[high]);
            (low, high, a, b)
        })
        .collect();

    let merged: Vec<(usize, usize, Vec<Element<P>>, Vec<Element<P>>)> =
        thread::scope(|scope| {
            let handles: Vec<_> = taken
                .into_iter()
                .map(|(low, high, a, b)| {
                    scope.spawn(move || {
                        let (lower, upper) = merge_halves(a, b);
                        (low, high, lower, upper)
                    })
                })
                .collect();
            handles.into_iter().map(join_task).collect()
        });

    for (low, high, lower, upper) in merged {
        shards[low] = lower;
        shards[high] = upper;
    }
}

/// Merges two sorted runs and splits the result into its lower and upper
/// halves. Dummies rank above every real element, so they sink to the top.
fn merge_halves<const P: usize>(
    a: Vec<Element<P>>,
    b: Vec<Element<P>>,
) -> (Vec<Element<P>>, Vec<Element<P>>) {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let mut left = a.into_iter().peekable();
    let mut right = b.into_iter().peekable();

    loop {
        match (left.peek(), right.peek()) {
            (Some(x), Some(y)) => {
                if x.merge_rank() <= y.merge_rank() {
                    merged.push(left.next().unwrap_or_default());
                } else {
                    merged.push(right.next().unwrap_or_default());
                }
            }
            (Some(_), None) => merged.push(left.next().unwrap_or_default()),
            (None, Some(_)) => merged.push(right.next().unwrap_or_default()),
            (None, None) => break,
        }
    }

    let upper = merged.split_off(merged.len() / 2);
    (merged, upper)
}

/// The comparator schedule of an odd-even merge-exchange network over `n`
/// indices, grouped into rounds of disjoint pairs. With a pairwise
/// merge-and-halve as the comparator, sorted runs in give a sorted
/// concatenation out.
fn exchange_rounds(n: usize) -> Vec<Vec<(usize, usize)>> {
    let mut rounds = Vec::new();
    let mut p = 1;
    while p < n {
        let mut k = p;
        while k >= 1 {
            let mut pairs = Vec::new();
            let mut j = k % p;
            while j + k < n {
                for i in 0..k.min(n - j - k) {
                    if (i + j) / (2 * p) == (i + j + k) / (2 * p) {
                        pairs.push((i + j, i + j + k));
                    }
                }
                j += 2 * k;
            }
            rounds.push(pairs);
            k /= 2;
        }
        p *= 2;
    }
    rounds
}

fn join_task<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
