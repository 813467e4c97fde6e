// src/data/event.rs

//! Implement [`NormalizedEvent`] and [`Severity`], the portable form of one
//! Windows Event Log record regardless of which API read it.
//!
//! See [Event Types] for the legacy API and [Event Levels] for the modern
//! API.
//!
//! [Event Types]: https://learn.microsoft.com/en-us/windows/win32/eventlog/event-types
//! [Event Levels]: https://learn.microsoft.com/en-us/windows/win32/wes/eventschema-leveltype-complextype

use std::fmt;

#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};

use crate::common::{
    RecordId,
    UnixSeconds,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// native values
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `EVENTLOG_SUCCESS`
pub const EVENTLOG_SUCCESS: u16 = 0x0000;
/// `EVENTLOG_ERROR_TYPE`
pub const EVENTLOG_ERROR_TYPE: u16 = 0x0001;
/// `EVENTLOG_WARNING_TYPE`
pub const EVENTLOG_WARNING_TYPE: u16 = 0x0002;
/// `EVENTLOG_INFORMATION_TYPE`
pub const EVENTLOG_INFORMATION_TYPE: u16 = 0x0004;
/// `EVENTLOG_AUDIT_SUCCESS`
pub const EVENTLOG_AUDIT_SUCCESS: u16 = 0x0008;
/// `EVENTLOG_AUDIT_FAILURE`
pub const EVENTLOG_AUDIT_FAILURE: u16 = 0x0010;

/// `WINEVENT_LEVEL_LOG_ALWAYS`
pub const WINEVENT_LEVEL_LOG_ALWAYS: u8 = 0;
/// `WINEVENT_LEVEL_CRITICAL`
pub const WINEVENT_LEVEL_CRITICAL: u8 = 1;
/// `WINEVENT_LEVEL_ERROR`
pub const WINEVENT_LEVEL_ERROR: u8 = 2;
/// `WINEVENT_LEVEL_WARNING`
pub const WINEVENT_LEVEL_WARNING: u8 = 3;
/// `WINEVENT_LEVEL_INFO`
pub const WINEVENT_LEVEL_INFO: u8 = 4;
/// `WINEVENT_LEVEL_VERBOSE`
pub const WINEVENT_LEVEL_VERBOSE: u8 = 5;

/// `WINEVENT_KEYWORD_AUDIT_FAILURE`
pub const WINEVENT_KEYWORD_AUDIT_FAILURE: u64 = 0x0010_0000_0000_0000;
/// `WINEVENT_KEYWORD_AUDIT_SUCCESS`
pub const WINEVENT_KEYWORD_AUDIT_SUCCESS: u64 = 0x0020_0000_0000_0000;
/// The only keyword bits that survive decoding.
pub const KEYWORDS_AUDIT_MASK: u64 = WINEVENT_KEYWORD_AUDIT_FAILURE | WINEVENT_KEYWORD_AUDIT_SUCCESS;

/// 100-nanosecond ticks between 1601-01-01 (the `FILETIME` epoch) and
/// 1970-01-01 (the Unix epoch).
pub const FILETIME_UNIX_EPOCH_OFFSET: u64 = 116_444_736_000_000_000;
/// 100-nanosecond ticks per second.
pub const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;

/// Convert a `FILETIME` count of 100-nanosecond ticks to Unix epoch seconds.
///
/// Times before the Unix epoch clamp to `0`.
pub fn filetime_to_unix_seconds(filetime: u64) -> UnixSeconds {
    (filetime.saturating_sub(FILETIME_UNIX_EPOCH_OFFSET) / FILETIME_TICKS_PER_SECOND) as UnixSeconds
}

/// Discard all keyword bits except audit-success and audit-failure.
#[inline(always)]
pub const fn mask_keywords(keywords: u64) -> u64 {
    keywords & KEYWORDS_AUDIT_MASK
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Severity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Unified severity of a [`NormalizedEvent`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
    Verbose,
    AuditSuccess,
    AuditFailure,
}

impl Severity {
    /// Classify a legacy `EVENTLOGRECORD.EventType`.
    ///
    /// Unknown types classify as [`Info`].
    ///
    /// [`Info`]: Severity::Info
    pub fn from_legacy_event_type(event_type: u16) -> Severity {
        match event_type {
            EVENTLOG_SUCCESS | EVENTLOG_INFORMATION_TYPE => Severity::Info,
            EVENTLOG_WARNING_TYPE => Severity::Warning,
            EVENTLOG_ERROR_TYPE => Severity::Error,
            EVENTLOG_AUDIT_SUCCESS => Severity::AuditSuccess,
            EVENTLOG_AUDIT_FAILURE => Severity::AuditFailure,
            _ => {
                defñ!("unknown event type {}", event_type);
                Severity::Info
            }
        }
    }

    /// Classify a modern `System/Level` with its `System/Keywords`.
    ///
    /// For the informational levels the keywords decide between `Info`,
    /// `AuditSuccess` and `AuditFailure`; the audit-failure bit wins.
    /// Unknown levels classify as [`Info`].
    ///
    /// [`Info`]: Severity::Info
    pub fn from_native_level(
        level: u8,
        keywords: u64,
    ) -> Severity {
        match level {
            WINEVENT_LEVEL_LOG_ALWAYS | WINEVENT_LEVEL_INFO => {
                if keywords & WINEVENT_KEYWORD_AUDIT_FAILURE != 0 {
                    Severity::AuditFailure
                } else if keywords & WINEVENT_KEYWORD_AUDIT_SUCCESS != 0 {
                    Severity::AuditSuccess
                } else {
                    Severity::Info
                }
            }
            WINEVENT_LEVEL_WARNING => Severity::Warning,
            WINEVENT_LEVEL_ERROR => Severity::Error,
            WINEVENT_LEVEL_CRITICAL => Severity::Critical,
            WINEVENT_LEVEL_VERBOSE => Severity::Verbose,
            _ => {
                defñ!("unknown level {}", level);
                Severity::Info
            }
        }
    }

    /// Display name, matched by the severity filter pattern.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Critical => "Critical",
            Severity::Verbose => "Verbose",
            Severity::AuditSuccess => "Success Audit",
            Severity::AuditFailure => "Failure Audit",
        }
    }

    /// The monitoring item log-type code sent to the sink.
    pub const fn item_log_type(&self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Warning => 2,
            Severity::Error => 4,
            Severity::AuditFailure => 7,
            Severity::AuditSuccess => 8,
            Severity::Critical => 9,
            Severity::Verbose => 10,
        }
    }

    /// Reverse of [`item_log_type`](Severity::item_log_type).
    pub const fn from_item_log_type(code: u8) -> Option<Severity> {
        match code {
            1 => Some(Severity::Info),
            2 => Some(Severity::Warning),
            4 => Some(Severity::Error),
            7 => Some(Severity::AuditFailure),
            8 => Some(Severity::AuditSuccess),
            9 => Some(Severity::Critical),
            10 => Some(Severity::Verbose),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NormalizedEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One decoded record, ready for filtering and dispatch.
///
/// Created per record, consumed immediately, then discarded.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct NormalizedEvent {
    /// Event provider; for the legacy API this is the event source name.
    pub provider: String,
    /// Event source, if the backend reports one separately from the
    /// provider.
    pub source: Option<String>,
    pub severity: Severity,
    pub timestamp: UnixSeconds,
    pub event_id: u32,
    /// Masked by [`mask_keywords`].
    pub keywords: u64,
    /// Never empty after decoding.
    pub message: String,
    /// Logical id of the record this event was decoded from.
    pub record_id: RecordId,
}

impl NormalizedEvent {
    /// The name matched by the source filter pattern and reported to the
    /// sink.
    #[inline(always)]
    pub fn source_name(&self) -> &str {
        self.provider.as_str()
    }

    /// `event_id` as the text matched by the event id filter pattern.
    pub fn event_id_string(&self) -> String {
        self.event_id.to_string()
    }
}

impl fmt::Debug for NormalizedEvent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("NormalizedEvent")
            .field("record_id", &self.record_id)
            .field("provider", &self.provider)
            .field("source", &self.source)
            .field("severity", &self.severity)
            .field("timestamp", &self.timestamp)
            .field("event_id", &self.event_id)
            .field("keywords", &format_args!("{:#x}", self.keywords))
            .field("message len", &self.message.len())
            .finish()
    }
}
