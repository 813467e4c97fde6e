// src/native/mod.rs

//! The `cfg(windows)` implementation of the traits in
//! [`crate::readers::api`].
//!
//! * [`legacy`] wraps the [Event Logging] API.
//! * [`modern`] wraps the [Windows Event Log] API.
//! * [`messagefiles`] reads the registry and message-resource files.
//!
//! [Event Logging]: https://learn.microsoft.com/en-us/windows/win32/eventlog/event-logging
//! [Windows Event Log]: https://learn.microsoft.com/en-us/windows/win32/wes/windows-event-log

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};
use ::winapi::shared::minwindef::DWORD;
use ::winapi::um::errhandlingapi::GetLastError;
use ::winapi::um::winbase::{
    FormatMessageW,
    LocalFree,
    FORMAT_MESSAGE_ALLOCATE_BUFFER,
    FORMAT_MESSAGE_FROM_SYSTEM,
    FORMAT_MESSAGE_IGNORE_INSERTS,
};
use ::winapi::um::winnt::{
    LANG_NEUTRAL,
    LPWSTR,
    MAKELANGID,
    SUBLANG_DEFAULT,
};

use crate::readers::api::{
    ApiError,
    EventLogApi,
};

pub mod legacy;
pub mod messagefiles;
pub mod modern;

use legacy::LegacyHandle;
use messagefiles::MessageFileResolver;
use modern::ModernChannel;

/// `str` to a NUL-terminated wide string.
pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Wide string up to the first NUL, or all of `wide`.
pub(crate) fn from_wide(wide: &[u16]) -> String {
    let end: usize = wide
        .iter()
        .position(|c| *c == 0)
        .unwrap_or(wide.len());

    String::from_utf16_lossy(&wide[..end])
}

/// NUL-terminated wide string at `ptr`; `None` for a null pointer.
///
/// # Safety
///
/// `ptr` is null or points to a NUL-terminated wide string.
pub(crate) unsafe fn from_wide_ptr(ptr: *const u16) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let mut len: usize = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }

    Some(String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len)))
}

/// The system message text of error `code`, trimmed.
pub(crate) fn system_error_text(code: DWORD) -> String {
    let mut buffer: LPWSTR = std::ptr::null_mut();
    // SAFETY: with FORMAT_MESSAGE_ALLOCATE_BUFFER the system allocates
    // `buffer`, which is then released by `LocalFree`
    let len: DWORD = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_ALLOCATE_BUFFER | FORMAT_MESSAGE_IGNORE_INSERTS,
            std::ptr::null(),
            code,
            MAKELANGID(LANG_NEUTRAL, SUBLANG_DEFAULT) as DWORD,
            &mut buffer as *mut LPWSTR as LPWSTR,
            0,
            std::ptr::null_mut(),
        )
    };
    if len == 0 || buffer.is_null() {
        return format!("[0x{:08X}]", code);
    }
    let text: String = unsafe {
        let text = String::from_utf16_lossy(std::slice::from_raw_parts(buffer, len as usize));
        LocalFree(buffer as *mut _);
        text
    };

    format!("{} [0x{:08X}]", text.trim_end_matches(['\r', '\n', ' ', '.']), code)
}

/// The [`ApiError`] of the calling thread's last error.
pub(crate) fn last_api_error() -> ApiError {
    let code: DWORD = unsafe { GetLastError() };
    defñ!("GetLastError {}", code);

    ApiError::from_code(code, system_error_text(code))
}

/// [`EventLogApi`] of the local machine.
#[derive(Debug, Default)]
pub struct WindowsEventLogApi {
    messages: MessageFileResolver,
}

impl WindowsEventLogApi {
    pub fn new() -> WindowsEventLogApi {
        WindowsEventLogApi {
            messages: MessageFileResolver::new(),
        }
    }
}

impl EventLogApi for WindowsEventLogApi {
    type Legacy = LegacyHandle;
    type Modern = ModernChannel;
    type Messages = MessageFileResolver;

    fn open_modern(
        &mut self,
        log_name: &str,
    ) -> Result<ModernChannel, ApiError> {
        ModernChannel::open(log_name)
    }

    fn open_legacy(
        &mut self,
        log_name: &str,
    ) -> Result<LegacyHandle, ApiError> {
        LegacyHandle::open(log_name)
    }

    fn messages(&mut self) -> &mut MessageFileResolver {
        &mut self.messages
    }
}
