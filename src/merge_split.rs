// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The merge-split crossbar of the butterfly network.

use crate::bitonic::bitonic_sort_by_keys;
use crate::bucket::{Bucket, Element};
use crate::{Level, SortError};
use subtle::{Choice, ConditionallySelectable, ConstantTimeLess};

/// Routes the real elements of two buckets by bit `bit_index` of their
/// routing keys and pads each side back to exactly `capacity` with dummies.
///
/// Every element is tagged for a single ascending crossbar sort: reals get
/// 0 or 2 by their routing bit, and dummies get 1 while side 0 still needs
/// padding, 3 afterwards. Sorting the `2 * capacity` elements by tag then
/// leaves side 0 in the first `capacity` positions and side 1 in the rest,
/// reals before dummies within each side. Tags live in a sidecar vector,
/// so the elements keep their routing keys and later levels see the
/// residual bits intact.
pub(crate) fn merge_split<const P: usize>(
    bucket0: Bucket<P>,
    bucket1: Bucket<P>,
    level: Level,
    bit_index: u32,
    capacity: usize,
) -> Result<(Bucket<P>, Bucket<P>), SortError> {
    let mut combined = bucket0;
    combined.extend(bucket1);

    // Count the reals routed to each side without branching on element data.
    let mut count0: u64 = 0;
    let mut count1: u64 = 0;
    for element in &combined {
        let real = !element.ct_is_dummy();
        let side1 = routing_bit(element, bit_index);
        count0.conditional_assign(&(count0 + 1), real & !side1);
        count1.conditional_assign(&(count1 + 1), real & side1);
    }

    let capacity_u64 = u64::try_from(capacity)?;
    if count0 > capacity_u64 || count1 > capacity_u64 {
        return Err(SortError::BucketOverflowError { level });
    }

    let need0 = capacity_u64 - count0;
    let mut assigned0: u64 = 0;
    let mut tags: Vec<u64> = Vec::with_capacity(combined.len());
    for element in &combined {
        let dummy = element.ct_is_dummy();
        let side1 = routing_bit(element, bit_index);

        let real_tag = u64::conditional_select(&0, &2, side1);
        let pad_side0 = dummy & assigned0.ct_lt(&need0);
        assigned0.conditional_assign(&(assigned0 + 1), pad_side0);
        let dummy_tag = u64::conditional_select(&3, &1, pad_side0);

        tags.push(u64::conditional_select(&real_tag, &dummy_tag, dummy));
    }

    bitonic_sort_by_keys(&mut combined, &mut tags, true);

    let upper = combined.split_off(capacity);
    Ok((combined, upper))
}

fn routing_bit<const P: usize>(element: &Element<P>, bit_index: u32) -> Choice {
    Choice::from(((element.routing_key >> bit_index) & 1) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Payload;

    fn real(routing_key: u64) -> Element<8> {
        Element::real(routing_key as i64, routing_key, Payload::default())
    }

    fn padded(mut reals: Vec<Element<8>>, capacity: usize) -> Bucket<8> {
        reals.resize(capacity, Element::dummy());
        reals
    }

    #[test]
    fn splits_by_selected_bit_with_reals_first() {
        let bucket0 = padded(vec![real(0b10), real(0b01)], 4);
        let bucket1 = padded(vec![real(0b11), real(0b00)], 4);

        let (out0, out1) = merge_split(bucket0, bucket1, 0, 1, 4).unwrap();

        assert_eq!(out0.len(), 4);
        assert_eq!(out1.len(), 4);

        let side0: Vec<u64> = out0
            .iter()
            .filter(|e| !e.is_dummy)
            .map(|e| e.routing_key)
            .collect();
        let side1: Vec<u64> = out1
            .iter()
            .filter(|e| !e.is_dummy)
            .map(|e| e.routing_key)
            .collect();

        assert_eq!(side0.len(), 2);
        assert_eq!(side1.len(), 2);
        assert!(side0.iter().all(|k| (k >> 1) & 1 == 0));
        assert!(side1.iter().all(|k| (k >> 1) & 1 == 1));

        // Reals occupy the low slots of each output; dummies fill the rest.
        assert!(!out0[0].is_dummy && !out0[1].is_dummy);
        assert!(out0[2].is_dummy && out0[3].is_dummy);
        assert!(out1[2].is_dummy && out1[3].is_dummy);
    }

    #[test]
    fn preserves_residual_routing_bits() {
        let bucket0 = padded(vec![real(0b110), real(0b011)], 4);
        let bucket1 = padded(vec![real(0b101), real(0b000)], 4);

        let (out0, out1) = merge_split(bucket0, bucket1, 0, 2, 4).unwrap();

        let mut survivors: Vec<u64> = out0
            .iter()
            .chain(out1.iter())
            .filter(|e| !e.is_dummy)
            .map(|e| e.routing_key)
            .collect();
        survivors.sort_unstable();
        assert_eq!(survivors, vec![0b000, 0b011, 0b101, 0b110]);
    }

    #[test]
    fn overflow_when_one_side_exceeds_capacity() {
        // All four reals route to side 1 on bit 0 with capacity 2.
        let bucket0 = padded(vec![real(1), real(3)], 2);
        let bucket1 = padded(vec![real(5), real(7)], 2);

        let result = merge_split(bucket0, bucket1, 3, 0, 2);
        assert!(matches!(
            result,
            Err(SortError::BucketOverflowError { level: 3 })
        ));
    }

    #[test]
    fn all_dummy_inputs_stay_all_dummy() {
        let bucket0 = padded(Vec::new(), 4);
        let bucket1 = padded(Vec::new(), 4);

        let (out0, out1) = merge_split(bucket0, bucket1, 1, 0, 4).unwrap();
        assert!(out0.iter().all(|e| e.is_dummy));
        assert!(out1.iter().all(|e| e.is_dummy));
    }
}
