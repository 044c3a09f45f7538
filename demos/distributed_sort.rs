// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A driver that sorts a JSON array of integers across four shard enclaves.
//!
//! Reads `ints.json`, runs the distributed variant with bitonic local
//! sorts, and writes one integer per line to
//! `sorted_output_distributed.json`.

extern crate osort;

use osort::{DistributedSorter, InputRow, LocalSort};
use std::error::Error;
use std::fs;
use std::io::Write;

const INPUT_PATH: &str = "ints.json";
const OUTPUT_PATH: &str = "sorted_output_distributed.json";
const PAYLOAD_SIZE: usize = 32;
const SHARD_COUNT: usize = 4;

fn main() -> Result<(), Box<dyn Error>> {
    let raw = fs::read_to_string(INPUT_PATH)?;
    let values: Vec<i64> = serde_json::from_str(&raw)?;
    println!("Loaded {} integers from {INPUT_PATH}.", values.len());

    let rows: Vec<InputRow> = values
        .iter()
        .map(|&value| (value, value.to_string().into_bytes()))
        .collect();

    let sorter = DistributedSorter::new(SHARD_COUNT, LocalSort::Bitonic)?;
    let sorted = sorter.sort::<PAYLOAD_SIZE>(&rows)?;
    println!("Total global sorted rows: {}", sorted.len());

    let mut output = fs::File::create(OUTPUT_PATH)?;
    for row in &sorted {
        output.write_all(row)?;
        output.write_all(b"\n")?;
    }
    println!("Wrote {OUTPUT_PATH}.");

    Ok(())
}
