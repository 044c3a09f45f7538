// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Element and payload types shared by every stage of the sort pipeline.

use crate::{RoutingKey, SortError, SortKey};
use subtle::{Choice, ConditionallySelectable};

/// A bucket as held by the untrusted store: a run of elements whose length
/// the enclave keeps at exactly the bucket capacity `Z`.
pub type Bucket<const P: usize> = Vec<Element<P>>;

/// An opaque record carried through the sort, stored in a fixed-capacity
/// buffer of `P` bytes so that elements stay `Copy` and conditionally
/// selectable.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload<const P: usize> {
    length: u32,
    bytes: [u8; P],
}

impl<const P: usize> Payload<P> {
    /// Instantiates a `Payload` from the bytes of a record.
    pub fn from_bytes(row: &[u8]) -> Result<Self, SortError> {
        if row.len() > P {
            return Err(SortError::PayloadTooLargeError {
                length: row.len(),
                capacity: P,
            });
        }
        let mut bytes = [0u8; P];
        bytes[..row.len()].copy_from_slice(row);
        Ok(Self {
            length: u32::try_from(row.len())?,
            bytes,
        })
    }

    /// The bytes of the original record, without the padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.length as usize]
    }
}

impl<const P: usize> Default for Payload<P> {
    fn default() -> Self {
        Self {
            length: 0,
            bytes: [0u8; P],
        }
    }
}

impl<const P: usize> std::fmt::Debug for Payload<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("length", &self.length)
            .finish()
    }
}

impl<const P: usize> ConditionallySelectable for Payload<P> {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        let mut bytes = [0u8; P];
        for i in 0..P {
            bytes[i] = u8::conditional_select(&a.bytes[i], &b.bytes[i], choice);
        }
        Self {
            length: u32::conditional_select(&a.length, &b.length, choice),
            bytes,
        }
    }
}

/// One record in flight through the pipeline, combining the ordering key,
/// the random routing key, the opaque payload, and the padding tag.
#[derive(Clone, Copy, PartialEq)]
pub struct Element<const P: usize> {
    /// The semantic ordering key. Ignored by the oblivious shuffle; used
    /// only by the final in-enclave sort.
    pub sort_key: SortKey,
    /// A uniform draw from `[0, B)` that fixes the record's destination
    /// bucket in the butterfly network.
    pub routing_key: RoutingKey,
    /// The record itself. Never inspected by the sort.
    pub payload: Payload<P>,
    /// Whether this element is padding rather than a record.
    pub is_dummy: bool,
}

impl<const P: usize> Element<P> {
    /// A real element wrapping one input record.
    pub fn real(sort_key: SortKey, routing_key: RoutingKey, payload: Payload<P>) -> Self {
        Self {
            sort_key,
            routing_key,
            payload,
            is_dummy: false,
        }
    }

    /// A padding element. Dummies fill buckets to capacity and are removed
    /// only at extraction time.
    pub fn dummy() -> Self {
        Self {
            sort_key: 0,
            routing_key: 0,
            payload: Payload::default(),
            is_dummy: true,
        }
    }

    /// The dummy tag as a [`Choice`].
    pub fn ct_is_dummy(&self) -> Choice {
        Choice::from(self.is_dummy as u8)
    }

    /// An order-preserving `u64` rank of the sort key under which dummies
    /// compare greater than every real element. A real key of `i64::MAX`
    /// shares the dummy rank; such ties sit at the very top of a run and
    /// cannot perturb the order of the reals once dummies are stripped.
    pub fn merge_rank(&self) -> u64 {
        let rank = (self.sort_key as u64) ^ (1 << 63);
        u64::conditional_select(&rank, &u64::MAX, self.ct_is_dummy())
    }
}

impl<const P: usize> Default for Element<P> {
    fn default() -> Self {
        Self::dummy()
    }
}

impl<const P: usize> std::fmt::Debug for Element<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_dummy {
            write!(f, "Element::Dummy")
        } else {
            f.debug_struct("Element")
                .field("sort_key", &self.sort_key)
                .field("routing_key", &self.routing_key)
                .field("payload", &self.payload)
                .finish()
        }
    }
}

impl<const P: usize> ConditionallySelectable for Element<P> {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        let sort_key = SortKey::conditional_select(&a.sort_key, &b.sort_key, choice);
        let routing_key = RoutingKey::conditional_select(&a.routing_key, &b.routing_key, choice);
        let payload = Payload::conditional_select(&a.payload, &b.payload, choice);
        let is_dummy =
            u8::conditional_select(&(a.is_dummy as u8), &(b.is_dummy as u8), choice) == 1;
        Self {
            sort_key,
            routing_key,
            payload,
            is_dummy,
        }
    }
}

/// Renders the stored view of a bucket for the access log: per slot, the
/// stored sort key, or `dummy` for padding.
pub(crate) fn describe_bucket<const P: usize>(bucket: &[Element<P>]) -> String {
    let mut out = String::new();
    for (i, element) in bucket.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if element.is_dummy {
            out.push_str("dummy");
        } else {
            out.push_str(&element.sort_key.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_bytes() {
        let payload = Payload::<16>::from_bytes(b"hello").unwrap();
        assert_eq!(payload.as_bytes(), b"hello");
    }

    #[test]
    fn payload_rejects_oversized_rows() {
        let result = Payload::<4>::from_bytes(b"hello");
        assert!(matches!(
            result,
            Err(SortError::PayloadTooLargeError {
                length: 5,
                capacity: 4
            })
        ));
    }

    #[test]
    fn conditional_select_swaps_whole_elements() {
        let a = Element::<8>::real(3, 1, Payload::from_bytes(b"a").unwrap());
        let b = Element::<8>::dummy();

        let kept = Element::conditional_select(&a, &b, 0.into());
        assert_eq!(kept, a);

        let replaced = Element::conditional_select(&a, &b, 1.into());
        assert_eq!(replaced, b);
        assert!(replaced.is_dummy);
    }

    #[test]
    fn merge_rank_orders_reals_before_dummies() {
        let negative = Element::<8>::real(-5, 0, Payload::default());
        let positive = Element::<8>::real(7, 0, Payload::default());
        let dummy = Element::<8>::dummy();

        assert!(negative.merge_rank() < positive.merge_rank());
        assert!(positive.merge_rank() < dummy.merge_rank());
    }

    #[test]
    fn describe_bucket_marks_dummies() {
        let bucket = vec![
            Element::<8>::real(17, 0, Payload::default()),
            Element::<8>::dummy(),
            Element::<8>::real(-2, 0, Payload::default()),
        ];
        assert_eq!(describe_bucket(&bucket), "17 dummy -2");
    }
}
