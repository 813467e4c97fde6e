// src/readers/decoder.rs

//! RecordDecoder, converting one raw record into a [`NormalizedEvent`].
//!
//! * [`LegacyDecoder`] decodes an [`EVENTLOGRECORD`] and resolves its
//!   message through the source's registered message files.
//! * [`ModernDecoder`] renders a modern event and asks the provider
//!   metadata to format its message.
//!
//! Both guarantee a non-empty message; when resolution fails a message is
//! synthesized, see [`legacy_fallback_message`] and
//! [`modern_fallback_message`].
//!
//! [`NormalizedEvent`]: crate::data::event::NormalizedEvent
//! [`EVENTLOGRECORD`]: crate::data::eventlogrecord
//! [`legacy_fallback_message`]: crate::readers::messages::legacy_fallback_message
//! [`modern_fallback_message`]: crate::readers::messages::modern_fallback_message

use std::fmt;

use ::lru::LruCache;
#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};

use crate::common::{
    Count,
    RecordId,
};
use crate::data::event::{
    filetime_to_unix_seconds,
    mask_keywords,
    NormalizedEvent,
    Severity,
};
use crate::data::eventlogrecord::{
    EventLogRecord,
    RawRecord,
};
use crate::de_wrn;
#[cfg(any(debug_assertions, test))]
use crate::debug::printers::str_to_String_noraw;
use crate::readers::api::{
    ApiError,
    MessageFileApi,
    MessageFiles,
    ModernEventLog,
    RenderedEvent,
};
use crate::readers::messages::{
    legacy_fallback_message,
    modern_fallback_message,
    resolve_legacy_message,
};
use crate::readers::recordbuffer::GrowableRecordBuffer;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LegacyDecoder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decodes legacy [`EventLogRecord`]s of one log.
///
/// Message file lookups are cached per source name.
pub struct LegacyDecoder {
    log_name: String,
    /// `(source) → message files` lookups
    message_files_cache: LruCache<String, Option<MessageFiles>>,
    pub(crate) message_files_cache_hit: Count,
    pub(crate) message_files_cache_miss: Count,
    /// `Count` of synthesized messages.
    pub(crate) fallbacks: Count,
}

impl fmt::Debug for LegacyDecoder {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("LegacyDecoder")
            .field("log_name", &self.log_name)
            .field("cache hit", &self.message_files_cache_hit)
            .field("cache miss", &self.message_files_cache_miss)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}

impl LegacyDecoder {
    /// Capacity of the message file lookup cache.
    pub const MESSAGE_FILES_CACHE_SZ: usize = 64;

    pub fn new(log_name: &str) -> LegacyDecoder {
        LegacyDecoder {
            log_name: log_name.to_string(),
            message_files_cache: LruCache::new(
                std::num::NonZeroUsize::new(LegacyDecoder::MESSAGE_FILES_CACHE_SZ).unwrap(),
            ),
            message_files_cache_hit: 0,
            message_files_cache_miss: 0,
            fallbacks: 0,
        }
    }

    #[inline(always)]
    pub const fn fallbacks(&self) -> Count {
        self.fallbacks
    }

    fn message_files<M: MessageFileApi>(
        &mut self,
        messages: &mut M,
        source: &str,
    ) -> Option<MessageFiles> {
        if let Some(files) = self.message_files_cache.get(source) {
            self.message_files_cache_hit += 1;
            return files.clone();
        }
        self.message_files_cache_miss += 1;
        let files: Option<MessageFiles> = messages.message_files(&self.log_name, source);
        self.message_files_cache
            .put(source.to_string(), files.clone());

        files
    }

    /// Decode the record in `raw` whose logical id is `record_id`.
    ///
    /// A record whose variable part is malformed decodes from its header
    /// alone.
    pub fn decode_raw<M: MessageFileApi>(
        &mut self,
        messages: &mut M,
        raw: &RawRecord,
        record_id: RecordId,
    ) -> NormalizedEvent {
        match raw.parse() {
            Ok(record) => self.decode(messages, &record, record_id),
            Err(_err) => {
                de_wrn!("record {}: {}", record_id, _err);
                let record = EventLogRecord {
                    record_number: raw.record_number(),
                    time_generated: raw.time_generated(),
                    event_id: raw.event_id(),
                    event_type: raw.event_type(),
                    ..Default::default()
                };
                self.decode(messages, &record, record_id)
            }
        }
    }

    /// Decode `record` whose logical id is `record_id`.
    pub fn decode<M: MessageFileApi>(
        &mut self,
        messages: &mut M,
        record: &EventLogRecord,
        record_id: RecordId,
    ) -> NormalizedEvent {
        defn!("record {} source {:?}", record_id, record.source_name);
        let event_id: u32 = record.display_event_id();
        let resolved: Option<String> = match self.message_files(messages, &record.source_name) {
            Some(files) => resolve_legacy_message(messages, &files, record.event_id, &record.strings),
            None => None,
        };
        let message: String = match resolved {
            Some(message) if !message.is_empty() => message,
            _ => {
                self.fallbacks += 1;
                defo!("fallback message for event id {}", event_id);
                legacy_fallback_message(event_id, &record.source_name, &record.strings)
            }
        };
        defx!("message {:?}", str_to_String_noraw(&message));

        NormalizedEvent {
            provider: record.source_name.clone(),
            source: Some(record.source_name.clone()),
            severity: Severity::from_legacy_event_type(record.event_type),
            timestamp: record.time_generated,
            event_id,
            keywords: 0,
            message,
            record_id,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ModernDecoder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decodes modern events.
#[derive(Debug, Default)]
pub struct ModernDecoder {
    /// `Count` of synthesized messages.
    pub(crate) fallbacks: Count,
    /// `Count` of messages formatted with unresolved inserts.
    pub(crate) unresolved_inserts: Count,
}

impl ModernDecoder {
    pub fn new() -> ModernDecoder {
        ModernDecoder::default()
    }

    #[inline(always)]
    pub const fn fallbacks(&self) -> Count {
        self.fallbacks
    }

    /// Build a [`NormalizedEvent`] from rendered values and the formatted
    /// message, if any.
    pub fn normalize(
        &mut self,
        rendered: RenderedEvent,
        formatted: Option<String>,
    ) -> NormalizedEvent {
        let keywords: u64 = mask_keywords(rendered.keywords);
        let event_id: u32 = rendered.event_id as u32;
        let message: String = match formatted {
            Some(message) if !message.is_empty() => message,
            _ => {
                self.fallbacks += 1;
                defo!("fallback message for event id {}", event_id);
                modern_fallback_message(event_id, &rendered.provider, &rendered.event_data)
            }
        };

        NormalizedEvent {
            severity: Severity::from_native_level(rendered.level, keywords),
            timestamp: filetime_to_unix_seconds(rendered.time_created),
            event_id,
            keywords,
            message,
            record_id: rendered.record_id,
            provider: rendered.provider,
            source: rendered.source,
        }
    }

    /// Render and format `event`.
    ///
    /// A failed render is an error. A failed format is recovered with a
    /// synthesized message; a format with unresolved inserts is used as is.
    pub fn decode<L: ModernEventLog>(
        &mut self,
        log: &mut L,
        event: &L::Event,
        buffer: &mut GrowableRecordBuffer,
    ) -> Result<NormalizedEvent, ApiError> {
        defn!();
        let rendered: RenderedEvent = match buffer.retry_on_insufficient_space(|buffer| log.render(event, buffer)) {
            Ok(rendered) => rendered,
            Err(err) => {
                defx!("return Err({}); render", err);
                return Err(err);
            }
        };
        let formatted: Option<String> = match buffer.retry_on_insufficient_space(|buffer| {
            log.format_message(&rendered.provider, event, buffer)
        }) {
            Ok(message) => Some(message),
            Err(ApiError::UnresolvedInsert { code: _code, partial }) => {
                defo!("record {} unresolved insert {}", rendered.record_id, _code);
                self.unresolved_inserts += 1;
                Some(partial)
            }
            Err(_err) => {
                defo!("record {} provider {:?} format failed {}", rendered.record_id, rendered.provider, _err);
                None
            }
        };
        let event = self.normalize(rendered, formatted);
        defx!("return Ok({:?})", event);

        Ok(event)
    }
}
