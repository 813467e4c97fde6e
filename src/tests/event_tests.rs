// src/tests/event_tests.rs

//! tests for `src/data/event.rs`

#![allow(non_snake_case)]

use crate::common::UnixSeconds;
use crate::data::event::{
    filetime_to_unix_seconds,
    mask_keywords,
    NormalizedEvent,
    Severity,
    EVENTLOG_AUDIT_FAILURE,
    EVENTLOG_AUDIT_SUCCESS,
    EVENTLOG_ERROR_TYPE,
    EVENTLOG_INFORMATION_TYPE,
    EVENTLOG_SUCCESS,
    EVENTLOG_WARNING_TYPE,
    FILETIME_UNIX_EPOCH_OFFSET,
    WINEVENT_KEYWORD_AUDIT_FAILURE,
    WINEVENT_KEYWORD_AUDIT_SUCCESS,
    WINEVENT_LEVEL_CRITICAL,
    WINEVENT_LEVEL_ERROR,
    WINEVENT_LEVEL_INFO,
    WINEVENT_LEVEL_LOG_ALWAYS,
    WINEVENT_LEVEL_VERBOSE,
    WINEVENT_LEVEL_WARNING,
};

extern crate test_case;
use test_case::test_case;

#[test_case(EVENTLOG_SUCCESS, Severity::Info)]
#[test_case(EVENTLOG_INFORMATION_TYPE, Severity::Info)]
#[test_case(EVENTLOG_WARNING_TYPE, Severity::Warning)]
#[test_case(EVENTLOG_ERROR_TYPE, Severity::Error)]
#[test_case(EVENTLOG_AUDIT_SUCCESS, Severity::AuditSuccess)]
#[test_case(EVENTLOG_AUDIT_FAILURE, Severity::AuditFailure)]
#[test_case(0x0100, Severity::Info; "unknown")]
fn test_Severity_from_legacy_event_type(
    event_type: u16,
    expect: Severity,
) {
    assert_eq!(Severity::from_legacy_event_type(event_type), expect);
}

#[test_case(WINEVENT_LEVEL_LOG_ALWAYS, 0, Severity::Info; "log always")]
#[test_case(WINEVENT_LEVEL_INFO, 0, Severity::Info; "info")]
#[test_case(WINEVENT_LEVEL_INFO, WINEVENT_KEYWORD_AUDIT_SUCCESS, Severity::AuditSuccess; "info audit success")]
#[test_case(WINEVENT_LEVEL_INFO, WINEVENT_KEYWORD_AUDIT_FAILURE, Severity::AuditFailure; "info audit failure")]
#[test_case(
    WINEVENT_LEVEL_LOG_ALWAYS,
    WINEVENT_KEYWORD_AUDIT_FAILURE | WINEVENT_KEYWORD_AUDIT_SUCCESS,
    Severity::AuditFailure;
    "log always both audit bits"
)]
#[test_case(WINEVENT_LEVEL_WARNING, 0, Severity::Warning; "warning")]
#[test_case(WINEVENT_LEVEL_WARNING, WINEVENT_KEYWORD_AUDIT_FAILURE, Severity::Warning; "warning ignores keywords")]
#[test_case(WINEVENT_LEVEL_ERROR, 0, Severity::Error; "error")]
#[test_case(WINEVENT_LEVEL_CRITICAL, 0, Severity::Critical; "critical")]
#[test_case(WINEVENT_LEVEL_VERBOSE, 0, Severity::Verbose; "verbose")]
#[test_case(17, 0, Severity::Info; "unknown")]
fn test_Severity_from_native_level(
    level: u8,
    keywords: u64,
    expect: Severity,
) {
    assert_eq!(Severity::from_native_level(level, keywords), expect);
}

#[test_case(Severity::Info, "Information", 1)]
#[test_case(Severity::Warning, "Warning", 2)]
#[test_case(Severity::Error, "Error", 4)]
#[test_case(Severity::AuditFailure, "Failure Audit", 7)]
#[test_case(Severity::AuditSuccess, "Success Audit", 8)]
#[test_case(Severity::Critical, "Critical", 9)]
#[test_case(Severity::Verbose, "Verbose", 10)]
fn test_Severity_names_codes(
    severity: Severity,
    name: &str,
    code: u8,
) {
    assert_eq!(severity.as_str(), name);
    assert_eq!(severity.to_string(), name);
    assert_eq!(severity.item_log_type(), code);
    assert_eq!(Severity::from_item_log_type(code), Some(severity));
}

#[test_case(0)]
#[test_case(3)]
#[test_case(11)]
fn test_Severity_from_item_log_type_unknown(code: u8) {
    assert_eq!(Severity::from_item_log_type(code), None);
}

#[test_case(FILETIME_UNIX_EPOCH_OFFSET, 0; "unix epoch")]
#[test_case(FILETIME_UNIX_EPOCH_OFFSET + 9_999_999, 0; "sub second truncated")]
#[test_case(FILETIME_UNIX_EPOCH_OFFSET + 16_000_000_000_000_000, 1_600_000_000; "2020")]
#[test_case(0, 0; "before unix epoch clamps")]
fn test_filetime_to_unix_seconds(
    filetime: u64,
    expect: UnixSeconds,
) {
    assert_eq!(filetime_to_unix_seconds(filetime), expect);
}

#[test_case(0, 0)]
#[test_case(0x8000_0000_0000_0000, 0; "classic bit dropped")]
#[test_case(0x8010_0000_0000_00FF, WINEVENT_KEYWORD_AUDIT_FAILURE; "audit failure kept")]
#[test_case(u64::MAX, WINEVENT_KEYWORD_AUDIT_FAILURE | WINEVENT_KEYWORD_AUDIT_SUCCESS; "all bits")]
fn test_mask_keywords(
    keywords: u64,
    expect: u64,
) {
    assert_eq!(mask_keywords(keywords), expect);
}

#[test]
fn test_NormalizedEvent_source_name_event_id_string() {
    let event = NormalizedEvent {
        provider: "Service Control Manager".to_string(),
        source: None,
        event_id: 7036,
        message: "The service entered the running state.".to_string(),
        record_id: 5,
        ..Default::default()
    };
    assert_eq!(event.source_name(), "Service Control Manager");
    assert_eq!(event.event_id_string(), "7036");
    let debug = format!("{:?}", event);
    assert!(debug.contains("record_id: 5"), "{}", debug);
}
