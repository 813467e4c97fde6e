// src/printer/mod.rs

//! The `printer` module is for printing forwarded events
//! ([`SinkRecord`s]) to a terminal with severity colors and a prepended
//! timestamp, and for printing the `--summary` of a tailer.
//!
//! [`SinkRecord`s]: crate::readers::dispatch::SinkRecord

pub mod printers;
pub mod summary;
