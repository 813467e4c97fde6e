// src/readers/mod.rs

//! "Readers" for _eltlib_.
//!
//! ## Overview of readers
//!
//! * An [`EventLogTailer`] runs one poll cycle at a time.
//! * A poll cycle opens a [`LogSession`] on one of two backends and derives
//!   its [`LogWindow`].
//! * A [`SeekCursor`] positions the session at the record after the
//!   checkpoint.
//! * A [`RecordSource`] drives a [`LegacyDecoder`] or a [`ModernDecoder`] to
//!   derive [`NormalizedEvent`s].
//! * [`dispatch`] filters each event with a [`CompiledFilter`] and hands
//!   matches to an [`EventSink`], advancing the checkpoint.
//!
//! <br/>
//!
//! * Every call into the operating system goes through the traits in
//!   [`api`]. The `cfg(windows)` implementations live in [`crate::native`].
//! * Raw bytes handed out by the operating system land in a
//!   [`GrowableRecordBuffer`].
//!
//! _These are not rust "Readers"; these structs do not implement the trait
//! [`Read`]. These are "readers" in an informal sense._
//!
//! [`Read`]: std::io::Read
//! [`EventLogTailer`]: crate::readers::eventlogtailer::EventLogTailer
//! [`LogSession`]: crate::readers::logsession::LogSession
//! [`LogWindow`]: crate::data::recordid::LogWindow
//! [`SeekCursor`]: crate::readers::seekcursor::SeekCursor
//! [`RecordSource`]: crate::readers::dispatch::RecordSource
//! [`LegacyDecoder`]: crate::readers::decoder::LegacyDecoder
//! [`ModernDecoder`]: crate::readers::decoder::ModernDecoder
//! [`NormalizedEvent`s]: crate::data::event::NormalizedEvent
//! [`dispatch`]: crate::readers::dispatch::dispatch
//! [`CompiledFilter`]: crate::readers::filter::CompiledFilter
//! [`EventSink`]: crate::readers::dispatch::EventSink
//! [`api`]: crate::readers::api
//! [`GrowableRecordBuffer`]: crate::readers::recordbuffer::GrowableRecordBuffer

pub mod api;
pub mod decoder;
pub mod dispatch;
pub mod eventlogtailer;
pub mod filter;
pub mod logsession;
pub mod messages;
pub mod recordbuffer;
pub mod seekcursor;
