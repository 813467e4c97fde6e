// src/readers/filter.rs

//! The four-predicate event filter.
//!
//! A [`FilterSpec`] holds four independently optional regular expressions
//! matched against the message, the severity name, the source name and the
//! decimal event id of a [`NormalizedEvent`]. All four must match. An empty
//! pattern matches everything.
//!
//! Patterns are unanchored searches. The message and event id patterns are
//! case-sensitive; the severity and source patterns ignore case.
//!
//! [`NormalizedEvent`]: crate::data::event::NormalizedEvent

use std::fmt;

use ::regex::{
    Regex,
    RegexBuilder,
};
#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};

use crate::data::event::NormalizedEvent;

/// Case handling of one filter pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaseSensitivity {
    Sensitive,
    IgnoreCase,
}

pub const MESSAGE_CASE: CaseSensitivity = CaseSensitivity::Sensitive;
pub const SEVERITY_CASE: CaseSensitivity = CaseSensitivity::IgnoreCase;
pub const SOURCE_CASE: CaseSensitivity = CaseSensitivity::IgnoreCase;
pub const EVENTID_CASE: CaseSensitivity = CaseSensitivity::Sensitive;

/// Operator supplied filter patterns, as written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FilterSpec {
    pub message_pattern: String,
    pub severity_pattern: String,
    pub source_pattern: String,
    pub event_id_pattern: String,
}

/// Compile `pattern`; an empty pattern is `None`.
fn compile(
    pattern: &str,
    case: CaseSensitivity,
) -> Result<Option<Regex>, regex::Error> {
    if pattern.is_empty() {
        return Ok(None);
    }
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case == CaseSensitivity::IgnoreCase)
        .build()?;

    Ok(Some(regex))
}

/// Does `candidate` match `pattern`?
///
/// An empty pattern always matches.
pub fn regexp_match(
    candidate: &str,
    pattern: &str,
    case: CaseSensitivity,
) -> Result<bool, regex::Error> {
    match compile(pattern, case)? {
        Some(regex) => Ok(regex.is_match(candidate)),
        None => Ok(true),
    }
}

/// A [`FilterSpec`] compiled once per poll cycle.
#[derive(Clone)]
pub struct CompiledFilter {
    message: Option<Regex>,
    severity: Option<Regex>,
    source: Option<Regex>,
    event_id: Option<Regex>,
}

impl fmt::Debug for CompiledFilter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        let as_str = |regex: &Option<Regex>| regex.as_ref().map(|r| r.as_str().to_string());
        f.debug_struct("CompiledFilter")
            .field("message", &as_str(&self.message))
            .field("severity", &as_str(&self.severity))
            .field("source", &as_str(&self.source))
            .field("event_id", &as_str(&self.event_id))
            .finish()
    }
}

impl CompiledFilter {
    pub fn new(spec: &FilterSpec) -> Result<CompiledFilter, regex::Error> {
        Ok(CompiledFilter {
            message: compile(&spec.message_pattern, MESSAGE_CASE)?,
            severity: compile(&spec.severity_pattern, SEVERITY_CASE)?,
            source: compile(&spec.source_pattern, SOURCE_CASE)?,
            event_id: compile(&spec.event_id_pattern, EVENTID_CASE)?,
        })
    }

    /// Does each of the four values match its pattern?
    pub fn matches_values(
        &self,
        message: &str,
        severity: &str,
        source: &str,
        event_id: &str,
    ) -> bool {
        let is = |regex: &Option<Regex>, candidate: &str| match regex {
            Some(regex) => regex.is_match(candidate),
            None => true,
        };

        is(&self.message, message)
            && is(&self.severity, severity)
            && is(&self.source, source)
            && is(&self.event_id, event_id)
    }

    /// Does `event` pass all four predicates?
    pub fn matches(
        &self,
        event: &NormalizedEvent,
    ) -> bool {
        let matched = self.matches_values(
            &event.message,
            event.severity.as_str(),
            event.source_name(),
            &event.event_id_string(),
        );
        defñ!("record {} matched {}", event.record_id, matched);

        matched
    }
}
