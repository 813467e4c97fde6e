// src/data/mod.rs

//! The `data` module is specialized data containers for
//! [`EventLogRecord`]s, [`NormalizedEvent`]s, and the logical record id
//! arithmetic of a [`LogWindow`].
//!
//! ## Definitions of data
//!
//! ### Record
//!
//! A "record" is one entry of a Windows Event Log channel as the operating
//! system hands it out.
//!
//! The legacy Event Log API hands out records as a packed binary
//! [`EVENTLOGRECORD`] structure, decoded by [`EventLogRecord`].
//! The modern Windows Event Log API hands out opaque event handles which are
//! rendered into [`RenderedEvent`] values.
//!
//! ### Logical record id
//!
//! Every record has an id assigned by the log. The legacy API reports a
//! 32-bit counter which wraps. A "logical record id" is the same id kept in
//! the 64-bit domain so that ordering stays monotonic across the wrap.
//! See [`widen_native_id`].
//!
//! ### Window
//!
//! A "window" is the span of logical record ids currently retrievable from
//! the log, represented by a [`LogWindow`].
//!
//! ### Event
//!
//! An "event" is a record normalized into a portable form,
//! a [`NormalizedEvent`]. It is what filters and sinks see.
//!
//! [`EVENTLOGRECORD`]: https://learn.microsoft.com/en-us/windows/win32/api/winnt/ns-winnt-eventlogrecord
//! [`EventLogRecord`]: crate::data::eventlogrecord::EventLogRecord
//! [`RenderedEvent`]: crate::readers::api::RenderedEvent
//! [`NormalizedEvent`]: crate::data::event::NormalizedEvent
//! [`LogWindow`]: crate::data::recordid::LogWindow
//! [`widen_native_id`]: crate::data::recordid::widen_native_id

pub mod event;
pub mod eventlogrecord;
pub mod recordid;
