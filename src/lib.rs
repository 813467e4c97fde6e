// src/lib.rs

//! Incrementally tail a Windows Event Log channel from a recorded position,
//! normalize and filter each event, and forward matches to a monitoring
//! sink.
//!
//! _eltlib_ is the library used by the program _elt_.
//!
//! A caller owns a checkpoint, the id of the last record processed, and
//! runs one poll cycle at a time with an [`EventLogTailer`]. Each cycle
//! reads the records after the checkpoint, oldest to newest, through either
//! the legacy Event Logging API or the modern Windows Event Log API,
//! converts each into a [`NormalizedEvent`], and sends those passing the
//! filter to an [`EventSink`]. The checkpoint advances only past records
//! fully processed, so an interrupted or refused cycle resumes where it
//! stopped.
//!
//! All calls into the operating system go through the traits of
//! [`readers::api`]; the `cfg(windows)` implementation is `native`.
//!
//! [`EventLogTailer`]: crate::readers::eventlogtailer::EventLogTailer
//! [`NormalizedEvent`]: crate::data::event::NormalizedEvent
//! [`EventSink`]: crate::readers::dispatch::EventSink

pub mod common;
pub mod data;
pub mod debug;
#[cfg(windows)]
pub mod native;
pub mod printer;
pub mod readers;
#[cfg(test)]
pub mod tests;
