// src/readers/messages.rs

//! Message text resolution for legacy records and the synthesized fallback
//! messages for both backends.
//!
//! A legacy record carries a message id and insert strings but no message.
//! The message comes from a message-resource file registered for the
//! record's source under
//! `HKLM\SYSTEM\CurrentControlSet\Services\EventLog\<log>\<source>`:
//!
//! * `EventMessageFile` is a `;` separated list of files; each is tried in
//!   order until one formats the message id.
//! * `ParameterMessageFile` resolves `%%<n>` tokens in the formatted
//!   message; each token is replaced by message `<n>` of that file.
//!
//! When nothing resolves, a message is synthesized from the event id, the
//! source, and the insert strings, so a decoded message is never empty.

use ::itertools::Itertools;
#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};

use crate::readers::api::{
    EventData,
    MessageFileApi,
    MessageFiles,
};

/// Most insert strings passed to message formatting.
pub const MAX_INSERT_STRS: usize = 100;

/// Separator of message file paths in a registry value.
pub const MESSAGE_FILE_SEPARATOR: char = ';';

/// Separator of insert strings and event data values in a fallback message.
pub const FALLBACK_JOIN: &str = "; ";

/// Characters trimmed from the end of a formatted message.
const MESSAGE_TRIM_CHARS: &[char] = &['\r', '\n', ' '];

/// Split a `;` separated message file list, skipping empty entries.
pub fn split_message_files(list: &str) -> impl Iterator<Item = &str> {
    list.split(MESSAGE_FILE_SEPARATOR)
        .map(str::trim)
        .filter(|path| !path.is_empty())
}

/// Right-trim `\r`, `\n` and spaces.
pub fn trim_message(message: &str) -> &str {
    message.trim_end_matches(MESSAGE_TRIM_CHARS)
}

/// Format `message_id` from the first file of `list` that holds it.
fn format_from_list<M: MessageFileApi>(
    messages: &mut M,
    list: &str,
    message_id: u32,
    inserts: Option<&[String]>,
) -> Option<String> {
    for path in split_message_files(list) {
        if let Some(message) = messages.format_message(path, message_id, inserts) {
            defñ!("{:?} formatted message {}", path, message_id);
            return Some(trim_message(&message).to_string());
        }
    }

    None
}

/// Replace each `%%<n>` in `message` with message `<n>` of the parameter
/// files in `parameter_files`.
///
/// Substituted text is not scanned again. A token that does not resolve is
/// left as is.
pub fn translate_params<M: MessageFileApi>(
    messages: &mut M,
    message: &str,
    parameter_files: &str,
) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest: &str = message;
    while let Some(at) = rest.find("%%") {
        out.push_str(&rest[..at]);
        let after: &str = &rest[at + 2..];
        let digits: usize = after
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let param: Option<String> = match after[..digits].parse::<u32>() {
            Ok(param_id) => format_from_list(messages, parameter_files, param_id, None),
            Err(_) => None,
        };
        match param {
            Some(param) => out.push_str(&param),
            None => out.push_str(&rest[at..at + 2 + digits]),
        }
        rest = &after[digits..];
    }
    out.push_str(rest);

    out
}

/// Resolve the message of a legacy record from its message files.
///
/// `message_id` is the full 32-bit event id. Returns `None` when no file
/// formats it.
pub fn resolve_legacy_message<M: MessageFileApi>(
    messages: &mut M,
    files: &MessageFiles,
    message_id: u32,
    inserts: &[String],
) -> Option<String> {
    defn!("({:?}, {})", files, message_id);
    let event_message_file: &str = match files.event_message_file.as_deref() {
        Some(list) => list,
        None => {
            defx!("return None; no EventMessageFile");
            return None;
        }
    };
    let inserts: &[String] = &inserts[..inserts.len().min(MAX_INSERT_STRS)];
    let message: String = match format_from_list(messages, event_message_file, message_id, Some(inserts)) {
        Some(message) => message,
        None => {
            defx!("return None; no file formatted {}", message_id);
            return None;
        }
    };
    let message: String = match files.parameter_message_file.as_deref() {
        Some(parameter_files) if message.contains("%%") => translate_params(messages, &message, parameter_files),
        _ => message,
    };
    defx!("return Some(…) len {}", message.len());

    Some(message)
}

/// The message of a legacy record whose message could not be resolved.
pub fn legacy_fallback_message(
    event_id: u32,
    source: &str,
    inserts: &[String],
) -> String {
    let mut message = format!(
        "The description for Event ID:{} in Source:'{}' cannot be found. The local computer may not have the \
         necessary registry information or message DLL files to display messages from a remote computer.",
        event_id, source,
    );
    if !inserts.is_empty() {
        message.push_str(" The following information is part of the event: ");
        message.push_str(&inserts.iter().join(FALLBACK_JOIN));
    }

    message
}

/// The message of a modern event whose provider could not format it.
pub fn modern_fallback_message(
    event_id: u32,
    provider: &str,
    event_data: &EventData,
) -> String {
    let mut message = format!(
        "The description for Event ID:{} in Source:'{}' cannot be found. Either the component that raises this \
         event is not installed on your local computer or the installation is corrupted. You can install or \
         repair the component on the local computer. If the event originated on another computer, the display \
         information had to be saved with the event.",
        event_id, provider,
    );
    let included: Option<String> = match event_data {
        EventData::None => None,
        EventData::Single(data) => Some(data.clone()),
        EventData::Array(values) => {
            let mut values = values.iter().flatten().peekable();
            match values.peek() {
                Some(_) => Some(values.join(FALLBACK_JOIN)),
                None => None,
            }
        }
    };
    if let Some(included) = included {
        message.push_str(" The following information was included with the event: ");
        message.push_str(&included);
    }

    message
}
