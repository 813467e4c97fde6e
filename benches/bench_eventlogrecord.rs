// benches/bench_eventlogrecord.rs

//! Walking and parsing a buffer of `EVENTLOGRECORD` as returned by one
//! legacy read. Compares walking the headers only against a full parse of
//! every record.

#![allow(non_upper_case_globals, non_snake_case)]

extern crate criterion;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

extern crate lazy_static;
use lazy_static::lazy_static;

extern crate eltlib;
use eltlib::common::Bytes;
use eltlib::data::eventlogrecord::{EventLogRecord, RawRecords};

/// Records per buffer; a legacy read buffer is commonly 64 KiB.
const RECORDS: u32 = 200;

fn record(record_number: u32) -> EventLogRecord {
    EventLogRecord {
        record_number,
        time_generated: 1_600_000_000 + record_number,
        time_written: 1_600_000_000 + record_number,
        event_id: 0x4000_1B9C,
        event_type: 0x0004,
        event_category: 0,
        source_name: "Service Control Manager".to_string(),
        computer_name: "HOST1".to_string(),
        strings: vec![
            "Windows Update".to_string(),
            "running".to_string(),
            format!("insert{}", record_number),
        ],
        data: vec![0xAB; 16],
    }
}

lazy_static! {
    static ref Buffer1: Bytes = {
        let mut buffer: Bytes = Vec::new();
        for record_number in 1..=RECORDS {
            buffer.extend_from_slice(&record(record_number).to_bytes());
        }
        buffer
    };
}

#[inline(never)]
fn walk_headers(buffer: &[u8]) -> u64 {
    let mut sum: u64 = 0;
    for raw in RawRecords::new(buffer) {
        match raw {
            Ok(raw) => sum += raw.record_number() as u64,
            Err(_) => break,
        }
    }

    sum
}

#[inline(never)]
fn parse_all(buffer: &[u8]) -> usize {
    let mut len: usize = 0;
    for raw in RawRecords::new(buffer) {
        let raw = match raw {
            Ok(raw) => raw,
            Err(_) => break,
        };
        match raw.parse() {
            Ok(record) => len += record.strings.len(),
            Err(_) => break,
        }
    }

    len
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut bg = c.benchmark_group("EventLogRecord");
    bg.bench_function("walk_headers", |b| b.iter(|| walk_headers(black_box(&Buffer1))));
    bg.bench_function("parse_all", |b| b.iter(|| parse_all(black_box(&Buffer1))));
    bg.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
