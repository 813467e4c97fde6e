// src/native/modern.rs

//! [`ModernEventLog`] over `EvtQuery`, `EvtNext`, `EvtRender` and
//! `EvtFormatMessage`.
//!
//! [`ModernEventLog`]: crate::readers::api::ModernEventLog

use std::fmt;
use std::num::NonZeroUsize;

use ::lru::LruCache;
#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};
use ::winapi::shared::minwindef::{
    DWORD,
    FALSE,
};
use ::winapi::um::winbase::INFINITE;
use ::winapi::um::winevt::{
    EvtClose,
    EvtCreateRenderContext,
    EvtFormatMessage,
    EvtFormatMessageEvent,
    EvtGetLogInfo,
    EvtLogNumberOfLogRecords,
    EvtNext,
    EvtOpenChannelPath,
    EvtOpenLog,
    EvtOpenPublisherMetadata,
    EvtQuery,
    EvtQueryChannelPath,
    EvtQueryForwardDirection,
    EvtRender,
    EvtRenderContextValues,
    EvtRenderEventValues,
    EvtVarTypeByte,
    EvtVarTypeFileTime,
    EvtVarTypeHexInt64,
    EvtVarTypeString,
    EvtVarTypeUInt16,
    EvtVarTypeUInt64,
    EVT_HANDLE,
    EVT_VARIANT,
    EVT_VARIANT_TYPE_ARRAY,
    EVT_VARIANT_TYPE_MASK,
};
use ::winapi::um::winnt::LPCWSTR;

use crate::common::{
    Count,
    RecordId,
};
use crate::native::{
    from_wide,
    from_wide_ptr,
    last_api_error,
    to_wide,
};
use crate::readers::api::{
    ApiError,
    EventData,
    ModernEventLog,
    RenderedEvent,
    ERROR_INSUFFICIENT_BUFFER,
};
use crate::readers::recordbuffer::GrowableRecordBuffer;

/// Value paths rendered for each event, in [`RenderedEvent`] order.
pub const RENDER_VALUE_PATHS: [&str; 8] = [
    "/Event/System/Provider/@Name",
    "/Event/System/Provider/@EventSourceName",
    "/Event/System/EventRecordID",
    "/Event/System/EventID",
    "/Event/System/Level",
    "/Event/System/Keywords",
    "/Event/System/TimeCreated/@SystemTime",
    "/Event/EventData/Data",
];

const VAR_PROVIDER: usize = 0;
const VAR_SOURCE: usize = 1;
const VAR_RECORD_ID: usize = 2;
const VAR_EVENT_ID: usize = 3;
const VAR_LEVEL: usize = 4;
const VAR_KEYWORDS: usize = 5;
const VAR_TIME_CREATED: usize = 6;
const VAR_EVENT_DATA: usize = 7;

/// Capacity of the publisher metadata handle cache.
pub const PUBLISHER_CACHE_SZ: usize = 32;

/// An `EVT_HANDLE`; closed on drop.
pub struct EvtHandle(EVT_HANDLE);

impl EvtHandle {
    /// Wrap `handle`, or the last error if it is null.
    fn new(handle: EVT_HANDLE) -> Result<EvtHandle, ApiError> {
        if handle.is_null() {
            return Err(last_api_error());
        }

        Ok(EvtHandle(handle))
    }

    #[inline(always)]
    pub fn as_raw(&self) -> EVT_HANDLE {
        self.0
    }
}

impl fmt::Debug for EvtHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(f, "EvtHandle({:?})", self.0)
    }
}

impl Drop for EvtHandle {
    fn drop(&mut self) {
        unsafe {
            EvtClose(self.0);
        }
    }
}

/// One open channel.
pub struct ModernChannel {
    log_name: String,
    path: Vec<u16>,
    render_context: EvtHandle,
    query: Option<EvtHandle>,
    /// `provider → publisher metadata`; `None` when the provider has none
    publishers: LruCache<String, Option<EvtHandle>>,
}

impl fmt::Debug for ModernChannel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("ModernChannel")
            .field("log_name", &self.log_name)
            .field("query", &self.query)
            .field("publishers", &self.publishers.len())
            .finish()
    }
}

impl ModernChannel {
    /// Open channel `log_name` and create the render context.
    pub fn open(log_name: &str) -> Result<ModernChannel, ApiError> {
        defn!("({:?})", log_name);
        let path: Vec<u16> = to_wide(log_name);
        // probe the channel exists
        let _log = EvtHandle::new(unsafe {
            EvtOpenLog(std::ptr::null_mut(), path.as_ptr(), EvtOpenChannelPath as DWORD)
        })?;
        let value_paths: Vec<Vec<u16>> = RENDER_VALUE_PATHS
            .iter()
            .map(|p| to_wide(p))
            .collect();
        let mut value_ptrs: Vec<LPCWSTR> = value_paths
            .iter()
            .map(|p| p.as_ptr())
            .collect();
        let render_context = EvtHandle::new(unsafe {
            EvtCreateRenderContext(
                value_ptrs.len() as DWORD,
                value_ptrs.as_mut_ptr(),
                EvtRenderContextValues as DWORD,
            )
        })?;
        defx!("return Ok");

        Ok(ModernChannel {
            log_name: log_name.to_string(),
            path,
            render_context,
            query: None,
            publishers: LruCache::new(NonZeroUsize::new(PUBLISHER_CACHE_SZ).unwrap()),
        })
    }

    fn publisher(
        &mut self,
        provider: &str,
    ) -> Result<EVT_HANDLE, ApiError> {
        if !self.publishers.contains(provider) {
            let name: Vec<u16> = to_wide(provider);
            let metadata = EvtHandle::new(unsafe {
                EvtOpenPublisherMetadata(std::ptr::null_mut(), name.as_ptr(), std::ptr::null(), 0, 0)
            });
            let metadata: Option<EvtHandle> = match metadata {
                Ok(metadata) => Some(metadata),
                Err(_err) => {
                    defñ!("EvtOpenPublisherMetadata({:?}) {}", provider, _err);
                    None
                }
            };
            self.publishers
                .put(provider.to_string(), metadata);
        }
        match self.publishers.get(provider) {
            Some(Some(metadata)) => Ok(metadata.as_raw()),
            _ => Err(ApiError::Os {
                code: crate::readers::api::ERROR_EVT_PUBLISHER_METADATA_NOT_FOUND,
                text: format!("No publisher metadata for provider '{}'", provider),
            }),
        }
    }
}

/// `(variant)` string value, `None` unless the type is a string.
unsafe fn variant_string(variant: &EVT_VARIANT) -> Option<String> {
    if variant.Type & EVT_VARIANT_TYPE_MASK != EvtVarTypeString as DWORD || variant.Type & EVT_VARIANT_TYPE_ARRAY != 0
    {
        return None;
    }
    from_wide_ptr(*variant.u.StringVal())
}

unsafe fn variant_event_data(variant: &EVT_VARIANT) -> EventData {
    if variant.Type & EVT_VARIANT_TYPE_MASK != EvtVarTypeString as DWORD {
        return EventData::None;
    }
    if variant.Type & EVT_VARIANT_TYPE_ARRAY == 0 {
        return match from_wide_ptr(*variant.u.StringVal()) {
            Some(data) => EventData::Single(data),
            None => EventData::None,
        };
    }
    let array = *variant.u.StringArr();
    if array.is_null() {
        return EventData::None;
    }
    let values: Vec<Option<String>> = (0..variant.Count as usize)
        .map(|i| from_wide_ptr(*array.add(i)))
        .collect();

    EventData::Array(values)
}

impl ModernEventLog for ModernChannel {
    type Event = EvtHandle;

    fn record_count(&mut self) -> Result<Count, ApiError> {
        let log = EvtHandle::new(unsafe {
            EvtOpenLog(std::ptr::null_mut(), self.path.as_ptr(), EvtOpenChannelPath as DWORD)
        })?;
        let mut variant: EVT_VARIANT = unsafe { std::mem::zeroed() };
        let mut used: DWORD = 0;
        let ok = unsafe {
            EvtGetLogInfo(
                log.as_raw(),
                EvtLogNumberOfLogRecords,
                std::mem::size_of::<EVT_VARIANT>() as DWORD,
                &mut variant,
                &mut used,
            )
        };
        if ok == FALSE {
            return Err(last_api_error());
        }
        let count: Count = unsafe { *variant.u.UInt64Val() };
        defñ!("{:?} count {}", self.log_name, count);

        Ok(count)
    }

    fn query(
        &mut self,
        after: Option<RecordId>,
    ) -> Result<(), ApiError> {
        // drop (close) the previous query first
        self.query = None;
        let query: Option<Vec<u16>> = after.map(|id| to_wide(&format!("Event/System[EventRecordID>{}]", id)));
        let query_ptr: LPCWSTR = match query.as_ref() {
            Some(query) => query.as_ptr(),
            None => std::ptr::null(),
        };
        defñ!("EvtQuery({:?}, after {:?})", self.log_name, after);
        let handle = EvtHandle::new(unsafe {
            EvtQuery(
                std::ptr::null_mut(),
                self.path.as_ptr(),
                query_ptr,
                (EvtQueryChannelPath | EvtQueryForwardDirection) as DWORD,
            )
        })?;
        self.query = Some(handle);

        Ok(())
    }

    fn next(
        &mut self,
        max: usize,
        events: &mut Vec<EvtHandle>,
    ) -> Result<usize, ApiError> {
        let query: EVT_HANDLE = match self.query.as_ref() {
            Some(query) => query.as_raw(),
            None => return Err(ApiError::NoMoreItems),
        };
        let mut handles: Vec<EVT_HANDLE> = vec![std::ptr::null_mut(); max];
        let mut returned: DWORD = 0;
        let ok = unsafe { EvtNext(query, max as DWORD, handles.as_mut_ptr(), INFINITE, 0, &mut returned) };
        if ok == FALSE {
            return Err(last_api_error());
        }
        let returned: usize = (returned as usize).min(max);
        events.extend(
            handles
                .into_iter()
                .take(returned)
                .map(EvtHandle),
        );

        Ok(returned)
    }

    fn render(
        &mut self,
        event: &EvtHandle,
        buffer: &mut GrowableRecordBuffer,
    ) -> Result<RenderedEvent, ApiError> {
        let mut used: DWORD = 0;
        let mut count: DWORD = 0;
        let capacity: usize = buffer.capacity();
        let bytes: &mut [u8] = buffer.as_mut_bytes();
        let ok = unsafe {
            EvtRender(
                self.render_context.as_raw(),
                event.as_raw(),
                EvtRenderEventValues as DWORD,
                capacity as DWORD,
                bytes.as_mut_ptr() as *mut _,
                &mut used,
                &mut count,
            )
        };
        if ok == FALSE {
            let err = last_api_error();
            if err.code() == ERROR_INSUFFICIENT_BUFFER {
                return Err(ApiError::InsufficientBuffer {
                    required: used as usize,
                });
            }
            return Err(err);
        }
        let count: usize = (count as usize).min(RENDER_VALUE_PATHS.len());
        // SAFETY: on success the buffer starts with `count` `EVT_VARIANT`s;
        // the buffer is 8-byte aligned
        let variants: &[EVT_VARIANT] =
            unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const EVT_VARIANT, count) };
        let var = |at: usize| variants.get(at);
        let mut rendered = RenderedEvent::default();
        unsafe {
            if let Some(v) = var(VAR_PROVIDER) {
                rendered.provider = variant_string(v).unwrap_or_default();
            }
            if let Some(v) = var(VAR_SOURCE) {
                rendered.source = variant_string(v);
            }
            if let Some(v) = var(VAR_RECORD_ID) {
                if v.Type == EvtVarTypeUInt64 as DWORD {
                    rendered.record_id = *v.u.UInt64Val();
                }
            }
            if let Some(v) = var(VAR_EVENT_ID) {
                if v.Type == EvtVarTypeUInt16 as DWORD {
                    rendered.event_id = *v.u.UInt16Val();
                }
            }
            if let Some(v) = var(VAR_LEVEL) {
                if v.Type == EvtVarTypeByte as DWORD {
                    rendered.level = *v.u.ByteVal();
                }
            }
            if let Some(v) = var(VAR_KEYWORDS) {
                if v.Type == EvtVarTypeHexInt64 as DWORD {
                    rendered.keywords = *v.u.UInt64Val();
                }
            }
            if let Some(v) = var(VAR_TIME_CREATED) {
                if v.Type == EvtVarTypeFileTime as DWORD {
                    rendered.time_created = *v.u.FileTimeVal();
                }
            }
            if let Some(v) = var(VAR_EVENT_DATA) {
                rendered.event_data = variant_event_data(v);
            }
        }

        Ok(rendered)
    }

    fn format_message(
        &mut self,
        provider: &str,
        event: &EvtHandle,
        buffer: &mut GrowableRecordBuffer,
    ) -> Result<String, ApiError> {
        let metadata: EVT_HANDLE = self.publisher(provider)?;
        let wchars: usize = buffer.capacity() / 2;
        let bytes: &mut [u8] = buffer.as_mut_bytes();
        let mut used: DWORD = 0;
        let ok = unsafe {
            EvtFormatMessage(
                metadata,
                event.as_raw(),
                0,
                0,
                std::ptr::null_mut(),
                EvtFormatMessageEvent as DWORD,
                wchars as DWORD,
                bytes.as_mut_ptr() as *mut u16,
                &mut used,
            )
        };
        // SAFETY: the buffer is 8-byte aligned and `wchars` wide
        let wide: &[u16] = unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const u16, wchars) };
        if ok == FALSE {
            let err = last_api_error();
            let code: u32 = err.code();
            if code == ERROR_INSUFFICIENT_BUFFER {
                return Err(ApiError::InsufficientBuffer {
                    required: used as usize * 2,
                });
            }
            if ApiError::is_unresolved_insert_code(code) {
                return Err(ApiError::UnresolvedInsert {
                    code,
                    partial: from_wide(wide),
                });
            }
            return Err(err);
        }

        Ok(from_wide(wide))
    }
}
