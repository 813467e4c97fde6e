// src/native/legacy.rs

//! [`LegacyEventLog`] over `OpenEventLogW` and `ReadEventLogW`.
//!
//! [`LegacyEventLog`]: crate::readers::api::LegacyEventLog

use std::fmt;

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
use ::winapi::um::winbase::{
    CloseEventLog,
    GetNumberOfEventLogRecords,
    GetOldestEventLogRecord,
    OpenEventLogW,
    ReadEventLogW,
};
use ::winapi::um::winnt::{
    EVENTLOG_BACKWARDS_READ,
    EVENTLOG_FORWARDS_READ,
    EVENTLOG_SEEK_READ,
    EVENTLOG_SEQUENTIAL_READ,
    HANDLE,
};
use ::winreg::enums::HKEY_LOCAL_MACHINE;
use ::winreg::RegKey;

use crate::common::NativeRecordId;
use crate::native::{
    last_api_error,
    to_wide,
};
use crate::readers::api::{
    ApiError,
    LegacyEventLog,
    ReadDirection,
    ReadMode,
    ERROR_INSUFFICIENT_BUFFER,
};

/// Registry key holding one subkey per legacy log.
pub const EVENTLOG_REGISTRY_KEY: &str = "SYSTEM\\CurrentControlSet\\Services\\EventLog";

/// An open legacy event log handle; closed on drop.
pub struct LegacyHandle {
    handle: HANDLE,
    log_name: String,
}

impl fmt::Debug for LegacyHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("LegacyHandle")
            .field("handle", &self.handle)
            .field("log_name", &self.log_name)
            .finish()
    }
}

impl LegacyHandle {
    /// Open `log_name` on the local machine.
    ///
    /// `OpenEventLogW` silently opens the `Application` log for an unknown
    /// name, so the log's registry key must exist first.
    pub fn open(log_name: &str) -> Result<LegacyHandle, ApiError> {
        defn!("({:?})", log_name);
        let key: String = format!("{}\\{}", EVENTLOG_REGISTRY_KEY, log_name);
        if let Err(err) = RegKey::predef(HKEY_LOCAL_MACHINE).open_subkey(&key) {
            defx!("return Err; no key {:?}: {}", key, err);
            return Err(ApiError::Os {
                code: err.raw_os_error().unwrap_or_default() as u32,
                text: format!("Cannot open registry key '{}': {}", key, err),
            });
        }
        let name = to_wide(log_name);
        let handle: HANDLE = unsafe { OpenEventLogW(std::ptr::null(), name.as_ptr()) };
        if handle.is_null() {
            let err = last_api_error();
            defx!("return Err({})", err);
            return Err(err);
        }
        defx!("return Ok");

        Ok(LegacyHandle {
            handle,
            log_name: log_name.to_string(),
        })
    }
}

impl LegacyEventLog for LegacyHandle {
    fn number_of_records(&mut self) -> Result<u32, ApiError> {
        let mut count: DWORD = 0;
        if unsafe { GetNumberOfEventLogRecords(self.handle, &mut count) } == FALSE {
            return Err(last_api_error());
        }

        Ok(count)
    }

    fn oldest_record_number(&mut self) -> Result<NativeRecordId, ApiError> {
        let mut oldest: DWORD = 0;
        if unsafe { GetOldestEventLogRecord(self.handle, &mut oldest) } == FALSE {
            return Err(last_api_error());
        }

        Ok(oldest)
    }

    fn read(
        &mut self,
        mode: ReadMode,
        direction: ReadDirection,
        buffer: &mut [u8],
    ) -> Result<usize, ApiError> {
        let (mode_flag, offset): (DWORD, DWORD) = match mode {
            ReadMode::Sequential => (EVENTLOG_SEQUENTIAL_READ, 0),
            ReadMode::Seek(record_number) => (EVENTLOG_SEEK_READ, record_number),
        };
        let direction_flag: DWORD = match direction {
            ReadDirection::Forwards => EVENTLOG_FORWARDS_READ,
            ReadDirection::Backwards => EVENTLOG_BACKWARDS_READ,
        };
        let mut read: DWORD = 0;
        let mut needed: DWORD = 0;
        // SAFETY: `buffer` is valid for writes of its length
        let ok = unsafe {
            ReadEventLogW(
                self.handle,
                mode_flag | direction_flag,
                offset,
                buffer.as_mut_ptr() as *mut _,
                buffer.len() as DWORD,
                &mut read,
                &mut needed,
            )
        };
        if ok == FALSE {
            let err = last_api_error();
            if err.code() == ERROR_INSUFFICIENT_BUFFER {
                return Err(ApiError::InsufficientBuffer {
                    required: needed as usize,
                });
            }
            defñ!("ReadEventLogW({:?}, {:?}) {}", mode, direction, err);
            return Err(err);
        }

        Ok(read as usize)
    }
}

impl Drop for LegacyHandle {
    fn drop(&mut self) {
        defñ!("CloseEventLog {:?}", self.log_name);
        unsafe {
            CloseEventLog(self.handle);
        }
    }
}
