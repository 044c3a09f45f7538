// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A driver that obliviously sorts a JSON array of records.
//!
//! Reads `data.json` (an array of objects with a `subscriberCount` field,
//! stored as a number or a numeric string), sorts by that field, and writes
//! one record per line to `sorted_output.json`. The first few access-log
//! entries are printed so the host's view of the sort can be eyeballed.

extern crate osort;

use osort::{BucketStore, Enclave, InputRow, UntrustedMemory, XorCipher};
use rand::rngs::OsRng;
use serde_json::Value;
use std::error::Error;
use std::fs;
use std::io::Write;

const INPUT_PATH: &str = "data.json";
const OUTPUT_PATH: &str = "sorted_output.json";
const PAYLOAD_SIZE: usize = 512;
const BUCKET_CAPACITY: usize = 16;

fn subscriber_count(record: &Value) -> i64 {
    match &record["subscriberCount"] {
        Value::Number(number) => number.as_i64().unwrap_or(0),
        Value::String(text) => text.parse().unwrap_or(0),
        _ => 0,
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let raw = fs::read_to_string(INPUT_PATH)?;
    let records: Vec<Value> = serde_json::from_str(&raw)?;
    println!("Loaded {} rows from {INPUT_PATH}.", records.len());

    let rows: Vec<InputRow> = records
        .iter()
        .map(|record| (subscriber_count(record), record.to_string().into_bytes()))
        .collect();

    let mut enclave = Enclave::<PAYLOAD_SIZE, _, _, _>::new(
        UntrustedMemory::new(),
        XorCipher,
        OsRng,
    );
    let sorted = enclave.sort(&rows, BUCKET_CAPACITY)?;
    println!("Sort complete. Number of sorted rows: {}", sorted.len());

    let mut output = fs::File::create(OUTPUT_PATH)?;
    for row in &sorted {
        output.write_all(row)?;
        output.write_all(b"\n")?;
    }
    println!("Wrote sorted rows to {OUTPUT_PATH}.");

    println!("\nAccess log (first 10 entries):");
    for record in enclave.store().access_log().iter().take(10) {
        println!("{record}");
    }

    Ok(())
}
