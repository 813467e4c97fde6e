// src/native/messagefiles.rs

//! [`MessageFileApi`] over the registry and `FormatMessageW`.
//!
//! Message file paths are `REG_EXPAND_SZ` values, e.g.
//! `%SystemRoot%\System32\netmsg.dll`, expanded with
//! `ExpandEnvironmentStringsW`. Each file is loaded as a data file and kept
//! in a small LRU cache.
//!
//! [`MessageFileApi`]: crate::readers::api::MessageFileApi

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
    HMODULE,
};
use ::winapi::um::libloaderapi::{
    FreeLibrary,
    LoadLibraryExW,
    LOAD_LIBRARY_AS_DATAFILE,
};
use ::winapi::um::processenv::ExpandEnvironmentStringsW;
use ::winapi::um::winbase::{
    FormatMessageW,
    LocalFree,
    FORMAT_MESSAGE_ALLOCATE_BUFFER,
    FORMAT_MESSAGE_ARGUMENT_ARRAY,
    FORMAT_MESSAGE_FROM_HMODULE,
    FORMAT_MESSAGE_IGNORE_INSERTS,
};
use ::winapi::um::winnt::{
    LANG_NEUTRAL,
    LPWSTR,
    MAKELANGID,
    SUBLANG_DEFAULT,
};
use ::winreg::enums::{
    HKEY_LOCAL_MACHINE,
    KEY_READ,
};
use ::winreg::RegKey;

use crate::native::legacy::EVENTLOG_REGISTRY_KEY;
use crate::native::{
    from_wide,
    to_wide,
};
use crate::readers::api::{
    MessageFileApi,
    MessageFiles,
};
use crate::readers::messages::MAX_INSERT_STRS;

/// Capacity of the loaded message file cache.
pub const MESSAGE_MODULE_CACHE_SZ: usize = 16;

/// A message file loaded as a data file; freed on drop.
struct MessageModule(HMODULE);

impl Drop for MessageModule {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.0);
        }
    }
}

/// Expand `%VAR%` references in `path`.
fn expand_environment(path: &str) -> String {
    let src: Vec<u16> = to_wide(path);
    let size: DWORD = unsafe { ExpandEnvironmentStringsW(src.as_ptr(), std::ptr::null_mut(), 0) };
    if size == 0 {
        return path.to_string();
    }
    let mut buf: Vec<u16> = vec![0u16; size as usize + 1];
    let written: DWORD = unsafe { ExpandEnvironmentStringsW(src.as_ptr(), buf.as_mut_ptr(), buf.len() as DWORD) };
    if written == 0 {
        return path.to_string();
    }

    from_wide(&buf)
}

/// Resolves legacy messages on the local machine.
pub struct MessageFileResolver {
    /// `(expanded path) → module`; `None` when loading failed
    modules: LruCache<String, Option<MessageModule>>,
}

impl fmt::Debug for MessageFileResolver {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("MessageFileResolver")
            .field("modules", &self.modules.len())
            .finish()
    }
}

impl Default for MessageFileResolver {
    fn default() -> Self {
        MessageFileResolver::new()
    }
}

impl MessageFileResolver {
    pub fn new() -> MessageFileResolver {
        MessageFileResolver {
            modules: LruCache::new(NonZeroUsize::new(MESSAGE_MODULE_CACHE_SZ).unwrap()),
        }
    }

    fn module(
        &mut self,
        path: &str,
    ) -> Option<HMODULE> {
        let path: String = expand_environment(path);
        if !self.modules.contains(&path) {
            let wide: Vec<u16> = to_wide(&path);
            let handle: HMODULE =
                unsafe { LoadLibraryExW(wide.as_ptr(), std::ptr::null_mut(), LOAD_LIBRARY_AS_DATAFILE) };
            let module: Option<MessageModule> = match handle.is_null() {
                true => {
                    defñ!("LoadLibraryExW({:?}) failed", path);
                    None
                }
                false => Some(MessageModule(handle)),
            };
            self.modules.put(path.clone(), module);
        }
        match self.modules.get(&path) {
            Some(Some(module)) => Some(module.0),
            _ => None,
        }
    }
}

impl MessageFileApi for MessageFileResolver {
    fn message_files(
        &mut self,
        log_name: &str,
        source: &str,
    ) -> Option<MessageFiles> {
        let key: String = format!("{}\\{}\\{}", EVENTLOG_REGISTRY_KEY, log_name, source);
        let source_key: RegKey = match RegKey::predef(HKEY_LOCAL_MACHINE).open_subkey_with_flags(&key, KEY_READ) {
            Ok(source_key) => source_key,
            Err(_err) => {
                defñ!("open_subkey({:?}) {}", key, _err);
                return None;
            }
        };

        Some(MessageFiles {
            event_message_file: source_key
                .get_value::<String, _>("EventMessageFile")
                .ok(),
            parameter_message_file: source_key
                .get_value::<String, _>("ParameterMessageFile")
                .ok(),
        })
    }

    fn format_message(
        &mut self,
        path: &str,
        message_id: u32,
        inserts: Option<&[String]>,
    ) -> Option<String> {
        let module: HMODULE = self.module(path)?;
        // unused argument slots point at an empty string
        let empty: [u16; 1] = [0];
        let wide_inserts: Vec<Vec<u16>> = inserts
            .unwrap_or_default()
            .iter()
            .take(MAX_INSERT_STRS)
            .map(|s| to_wide(s))
            .collect();
        let mut args: Vec<usize> = vec![empty.as_ptr() as usize; MAX_INSERT_STRS];
        for (arg, insert) in args.iter_mut().zip(wide_inserts.iter()) {
            *arg = insert.as_ptr() as usize;
        }
        let mut flags: DWORD = FORMAT_MESSAGE_FROM_HMODULE | FORMAT_MESSAGE_ALLOCATE_BUFFER;
        flags |= match inserts {
            Some(_) => FORMAT_MESSAGE_ARGUMENT_ARRAY,
            None => FORMAT_MESSAGE_IGNORE_INSERTS,
        };
        let mut buffer: LPWSTR = std::ptr::null_mut();
        // SAFETY: `args` outlives the call and holds MAX_INSERT_STRS pointers
        // to NUL-terminated wide strings
        let len: DWORD = unsafe {
            FormatMessageW(
                flags,
                module as *const _,
                message_id,
                MAKELANGID(LANG_NEUTRAL, SUBLANG_DEFAULT) as DWORD,
                &mut buffer as *mut LPWSTR as LPWSTR,
                0,
                args.as_mut_ptr() as *mut _,
            )
        };
        if len == 0 || buffer.is_null() {
            defñ!("FormatMessageW({:?}, {}) failed", path, message_id);
            return None;
        }
        let message: String = unsafe {
            let message = String::from_utf16_lossy(std::slice::from_raw_parts(buffer, len as usize));
            LocalFree(buffer as *mut _);
            message
        };

        Some(message)
    }
}
