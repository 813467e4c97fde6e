// src/readers/api.rs

//! The seam between the tailer and the operating system.
//!
//! Two mutually incompatible APIs read a Windows Event Log channel:
//!
//! * the legacy [Event Logging] API, `OpenEventLogW`/`ReadEventLogW`, which
//!   hands out packed [`EVENTLOGRECORD`]s read sequentially or at a record
//!   number; modeled by [`LegacyEventLog`].
//! * the modern [Windows Event Log] API, `EvtQuery`/`EvtNext`/`EvtRender`,
//!   which hands out opaque event handles from an XPath query; modeled by
//!   [`ModernEventLog`].
//!
//! Messages for legacy records come from message-resource files named in the
//! registry, modeled by [`MessageFileApi`].
//!
//! An [`EventLogApi`] opens either kind of log and owns the message-file
//! lookup. The `cfg(windows)` implementation is [`crate::native`].
//! Handles are released when dropped.
//!
//! [Event Logging]: https://learn.microsoft.com/en-us/windows/win32/eventlog/event-logging
//! [Windows Event Log]: https://learn.microsoft.com/en-us/windows/win32/wes/windows-event-log
//! [`EVENTLOGRECORD`]: https://learn.microsoft.com/en-us/windows/win32/api/winnt/ns-winnt-eventlogrecord

use std::fmt;

use crate::common::{
    Count,
    NativeRecordId,
    RecordId,
};
use crate::readers::recordbuffer::GrowableRecordBuffer;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// native error codes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const ERROR_HANDLE_EOF: u32 = 38;
pub const ERROR_INVALID_PARAMETER: u32 = 87;
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
pub const ERROR_NO_MORE_ITEMS: u32 = 259;
pub const ERROR_EVT_PUBLISHER_METADATA_NOT_FOUND: u32 = 15002;
pub const ERROR_EVT_CHANNEL_NOT_FOUND: u32 = 15007;
pub const ERROR_EVT_UNRESOLVED_VALUE_INSERT: u32 = 15029;
pub const ERROR_EVT_UNRESOLVED_PARAMETER_INSERT: u32 = 15030;
pub const ERROR_EVT_MAX_INSERTS_REACHED: u32 = 15031;

/// A failed call into the operating system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiError {
    /// The receiving buffer is too small; `required` bytes are needed.
    InsufficientBuffer { required: usize },
    /// A legacy read reached the end of the log.
    HandleEof,
    /// A modern query has no more events.
    NoMoreItems,
    /// A legacy positioned read was rejected for the current log state.
    InvalidParameter,
    /// The channel does not exist.
    ChannelNotFound,
    /// Formatting completed but some inserts could not be resolved.
    /// `partial` is the message as formatted.
    UnresolvedInsert { code: u32, partial: String },
    /// Any other error.
    Os { code: u32, text: String },
}

impl ApiError {
    /// Map a native error code.
    ///
    /// `ERROR_INSUFFICIENT_BUFFER` needs the required size so it is mapped
    /// by the caller; here it becomes [`Os`].
    /// The unresolved-insert codes need the partial message so they are
    /// mapped by the caller; here they become [`Os`].
    ///
    /// [`Os`]: ApiError::Os
    pub fn from_code(
        code: u32,
        text: String,
    ) -> ApiError {
        match code {
            ERROR_HANDLE_EOF => ApiError::HandleEof,
            ERROR_NO_MORE_ITEMS => ApiError::NoMoreItems,
            ERROR_INVALID_PARAMETER => ApiError::InvalidParameter,
            ERROR_EVT_CHANNEL_NOT_FOUND => ApiError::ChannelNotFound,
            _ => ApiError::Os { code, text },
        }
    }

    /// The native error code.
    pub const fn code(&self) -> u32 {
        match self {
            ApiError::InsufficientBuffer { .. } => ERROR_INSUFFICIENT_BUFFER,
            ApiError::HandleEof => ERROR_HANDLE_EOF,
            ApiError::NoMoreItems => ERROR_NO_MORE_ITEMS,
            ApiError::InvalidParameter => ERROR_INVALID_PARAMETER,
            ApiError::ChannelNotFound => ERROR_EVT_CHANNEL_NOT_FOUND,
            ApiError::UnresolvedInsert { code, .. } => *code,
            ApiError::Os { code, .. } => *code,
        }
    }

    /// Is `code` one of the unresolved-insert codes formatting treats as a
    /// soft success?
    pub const fn is_unresolved_insert_code(code: u32) -> bool {
        matches!(
            code,
            ERROR_EVT_UNRESOLVED_VALUE_INSERT | ERROR_EVT_UNRESOLVED_PARAMETER_INSERT | ERROR_EVT_MAX_INSERTS_REACHED
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        match self {
            ApiError::InsufficientBuffer { required } => {
                write!(f, "The data area passed to a system call is too small ({} bytes required).", required)
            }
            ApiError::HandleEof => write!(f, "Reached the end of the file."),
            ApiError::NoMoreItems => write!(f, "No more data is available."),
            ApiError::InvalidParameter => write!(f, "The parameter is incorrect."),
            ApiError::ChannelNotFound => write!(f, "The specified channel could not be found."),
            ApiError::UnresolvedInsert { code, .. } => {
                write!(f, "The message insert could not be resolved (error {}).", code)
            }
            ApiError::Os { code, text } => write!(f, "{} (error {})", text, code),
        }
    }
}

impl std::error::Error for ApiError {}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// legacy API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `EVENTLOG_FORWARDS_READ` or `EVENTLOG_BACKWARDS_READ`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadDirection {
    Forwards,
    Backwards,
}

/// `EVENTLOG_SEQUENTIAL_READ` or `EVENTLOG_SEEK_READ`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Continue from the log handle's read position.
    Sequential,
    /// Read starting at the record with this number.
    Seek(NativeRecordId),
}

/// An open legacy event log handle.
pub trait LegacyEventLog {
    /// `GetNumberOfEventLogRecords`
    fn number_of_records(&mut self) -> Result<u32, ApiError>;

    /// `GetOldestEventLogRecord`
    fn oldest_record_number(&mut self) -> Result<NativeRecordId, ApiError>;

    /// `ReadEventLogW`; fill `buffer` with as many whole records as fit.
    ///
    /// Returns the number of bytes read. If not even one record fits,
    /// returns [`ApiError::InsufficientBuffer`] with the size of the next
    /// record. Past the last record returns [`ApiError::HandleEof`].
    fn read(
        &mut self,
        mode: ReadMode,
        direction: ReadDirection,
        buffer: &mut [u8],
    ) -> Result<usize, ApiError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// modern API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `/Event/EventData/Data` value of a rendered event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum EventData {
    /// Absent, or not a string.
    #[default]
    None,
    /// A single string value.
    Single(String),
    /// A string array; `None` entries were NULL.
    Array(Vec<Option<String>>),
}

/// The fixed set of system values rendered from one modern event.
///
/// Rendered with the value paths
///
/// ```text
/// /Event/System/Provider/@Name
/// /Event/System/Provider/@EventSourceName
/// /Event/System/EventRecordID
/// /Event/System/EventID
/// /Event/System/Level
/// /Event/System/Keywords
/// /Event/System/TimeCreated/@SystemTime
/// /Event/EventData/Data
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderedEvent {
    pub provider: String,
    pub source: Option<String>,
    pub record_id: RecordId,
    pub event_id: u16,
    pub level: u8,
    /// Unmasked.
    pub keywords: u64,
    /// `FILETIME` ticks.
    pub time_created: u64,
    pub event_data: EventData,
}

/// An open modern event log channel.
pub trait ModernEventLog {
    /// An opaque event handle returned by [`next`](Self::next).
    type Event;

    /// `EvtGetLogInfo(EvtLogNumberOfLogRecords)`
    fn record_count(&mut self) -> Result<Count, ApiError>;

    /// `EvtQuery` in forward direction, replacing any previous query.
    ///
    /// `None` selects every event. `Some(id)` selects
    /// `Event/System[EventRecordID>id]`.
    fn query(
        &mut self,
        after: Option<RecordId>,
    ) -> Result<(), ApiError>;

    /// `EvtNext` on the current query with an unbounded wait; append up to
    /// `max` events to `events`.
    ///
    /// Returns the number appended. At the end of the query returns
    /// [`ApiError::NoMoreItems`].
    fn next(
        &mut self,
        max: usize,
        events: &mut Vec<Self::Event>,
    ) -> Result<usize, ApiError>;

    /// `EvtRender` the values of [`RenderedEvent`], using `buffer` as the
    /// receiving area.
    fn render(
        &mut self,
        event: &Self::Event,
        buffer: &mut GrowableRecordBuffer,
    ) -> Result<RenderedEvent, ApiError>;

    /// `EvtFormatMessage(EvtFormatMessageEvent)` using the metadata of
    /// `provider`, using `buffer` as the receiving area.
    ///
    /// A message with unresolved inserts is returned as
    /// [`ApiError::UnresolvedInsert`].
    fn format_message(
        &mut self,
        provider: &str,
        event: &Self::Event,
        buffer: &mut GrowableRecordBuffer,
    ) -> Result<String, ApiError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// message files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Values of registry key
/// `HKLM\SYSTEM\CurrentControlSet\Services\EventLog\<log>\<source>`.
///
/// Each is a `;` separated list of paths.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MessageFiles {
    /// `EventMessageFile`
    pub event_message_file: Option<String>,
    /// `ParameterMessageFile`
    pub parameter_message_file: Option<String>,
}

/// Resolve legacy event messages from message-resource files.
pub trait MessageFileApi {
    /// Look up the message files registered for `source` in `log_name`.
    ///
    /// An absent mapping is `None`, not an error.
    fn message_files(
        &mut self,
        log_name: &str,
        source: &str,
    ) -> Option<MessageFiles>;

    /// `FormatMessageW` message `message_id` from the one message file
    /// `path`, with insert strings `inserts`.
    ///
    /// `None` if the file cannot be loaded or holds no such message.
    fn format_message(
        &mut self,
        path: &str,
        message_id: u32,
        inserts: Option<&[String]>,
    ) -> Option<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventLogApi
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opens event logs.
pub trait EventLogApi {
    type Legacy: LegacyEventLog;
    type Modern: ModernEventLog;
    type Messages: MessageFileApi;

    /// Open `log_name` with the modern API.
    fn open_modern(
        &mut self,
        log_name: &str,
    ) -> Result<Self::Modern, ApiError>;

    /// Open `log_name` with the legacy API.
    fn open_legacy(
        &mut self,
        log_name: &str,
    ) -> Result<Self::Legacy, ApiError>;

    /// The message-file lookup.
    fn messages(&mut self) -> &mut Self::Messages;
}
