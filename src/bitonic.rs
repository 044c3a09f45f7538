// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A constant-time bitonic comparator network.

use crate::bucket::Element;
use subtle::{ConditionallySelectable, ConstantTimeGreater, ConstantTimeLess};

/// Sorts `items` by `keys` in the chosen direction.
///
/// The network compares fixed position pairs determined by the length
/// alone; each compare-and-swap moves an item and its key together through
/// `subtle`'s conditional swap, so neither the instruction trace nor the
/// memory trace depends on the key values. `items.len()` must be a power
/// of two (callers pad with dummies) and equal to `keys.len()`.
pub fn bitonic_sort_by_keys<T, K>(items: &mut [T], keys: &mut [K], ascending: bool)
where
    T: ConditionallySelectable,
    K: ConditionallySelectable + ConstantTimeGreater + ConstantTimeLess,
{
    assert_eq!(items.len(), keys.len());
    if items.len() <= 1 {
        return;
    }
    assert!(items.len().is_power_of_two());

    sort_range(items, keys, 0, items.len(), ascending);
}

fn sort_range<T, K>(items: &mut [T], keys: &mut [K], low: usize, count: usize, ascending: bool)
where
    T: ConditionallySelectable,
    K: ConditionallySelectable + ConstantTimeGreater + ConstantTimeLess,
{
    if count <= 1 {
        return;
    }
    let half = count / 2;
    sort_range(items, keys, low, half, true);
    sort_range(items, keys, low + half, half, false);
    merge_range(items, keys, low, count, ascending);
}

fn merge_range<T, K>(items: &mut [T], keys: &mut [K], low: usize, count: usize, ascending: bool)
where
    T: ConditionallySelectable,
    K: ConditionallySelectable + ConstantTimeGreater + ConstantTimeLess,
{
    if count <= 1 {
        return;
    }
    let half = count / 2;
    for i in low..low + half {
        compare_swap(items, keys, i, i + half, ascending);
    }
    merge_range(items, keys, low, half, ascending);
    merge_range(items, keys, low + half, half, ascending);
}

fn compare_swap<T, K>(items: &mut [T], keys: &mut [K], i: usize, j: usize, ascending: bool)
where
    T: ConditionallySelectable,
    K: ConditionallySelectable + ConstantTimeGreater + ConstantTimeLess,
{
    let out_of_order = if ascending {
        keys[i].ct_gt(&keys[j])
    } else {
        keys[i].ct_lt(&keys[j])
    };

    let (items_low, items_high) = items.split_at_mut(j);
    T::conditional_swap(&mut items_low[i], &mut items_high[0], out_of_order);
    let (keys_low, keys_high) = keys.split_at_mut(j);
    K::conditional_swap(&mut keys_low[i], &mut keys_high[0], out_of_order);
}

/// Sorts elements ascending by sort key, standalone.
///
/// Pads `elements` with dummies to a power-of-two length before running the
/// network; dummies compare greater than every real element and end up at
/// the high end. The caller strips them when the padding has served its
/// purpose.
pub fn sort_elements_by_sort_key<const P: usize>(elements: &mut Vec<Element<P>>) {
    let padded_len = elements.len().next_power_of_two();
    elements.resize(padded_len, Element::dummy());

    let mut ranks: Vec<u64> = elements.iter().map(Element::merge_rank).collect();
    bitonic_sort_by_keys(elements, &mut ranks, true);
}
