// src/debug/printers.rs

//! Diagnostic print macros and printer helpers for test and debug builds.
//!
//! `de_*` macros print only in debug and test builds. `e_*` macros always
//! print; reserve them for user-visible errors and warnings.

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `d`ebug `e`println! an `err`or
#[macro_export]
macro_rules! de_err {
    (
        $($args:tt)*
    ) => {
        {
            #[cfg(any(debug_assertions,test))]
            eprint!("ERROR: ");
            #[cfg(any(debug_assertions,test))]
            eprintln!($($args)*)
        }
    }
}
pub use de_err;

/// `d`ebug `e`println! an `warn`ing
#[macro_export]
macro_rules! de_wrn {
    (
        $($args:tt)*
    ) => {
        {
            #[cfg(any(debug_assertions,test))]
            eprint!("WARNING: ");
            #[cfg(any(debug_assertions,test))]
            eprintln!($($args)*)
        }
    }
}
pub use de_wrn;

/// `e`println! an `err`or
#[macro_export]
macro_rules! e_err {
    (
        $($args:tt)*
    ) => {
        {
            eprint!("ERROR: ");
            eprintln!($($args)*)
        }
    }
}
pub use e_err;

/// `e`println! a `warn`ing
#[macro_export]
macro_rules! e_wrn {
    (
        $($args:tt)*
    ) => {
        {
            eprint!("WARNING: ");
            eprintln!($($args)*)
        }
    }
}
pub use e_wrn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// helper functions - various print and write
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replace the control characters that commonly appear in formatted event
/// messages (`'\r'`, `'\n'`, `'\t'`) and the NUL terminator with pictoral
/// representations, e.g. `'\n'` returns `'␊'`.
///
/// Keeps a multi-line event message on one line of debug output.
///
/// only intended to aid visual debugging
#[cfg(any(debug_assertions, test))]
pub const fn char_to_char_noraw(c: char) -> char {
    match c as u32 {
        0 => '␀',
        9 => '␉',  // '\t'
        10 => '␊', // '\n'
        13 => '␍', // '\r'
        _ => c,
    }
}

/// transform valid UTF8 str to non-raw String version
///
/// only intended for debugging
#[doc(hidden)]
#[allow(non_snake_case)]
#[cfg(any(debug_assertions, test))]
pub fn str_to_String_noraw(str_buf: &str) -> String {
    let mut s2 = String::with_capacity(str_buf.len() + 1);
    for c in str_buf.chars() {
        let c_ = char_to_char_noraw(c);
        s2.push(c_);
    }
    s2
}

/// Hex dump of the first `max` bytes of `buffer`, e.g. `"30 00 00 00 4c 66…"`.
///
/// only intended for debugging raw record headers
#[doc(hidden)]
#[allow(non_snake_case)]
#[cfg(any(debug_assertions, test))]
pub fn buffer_to_hex_String(buffer: &[u8], max: usize) -> String {
    let mut s2 = String::with_capacity(max.min(buffer.len()) * 3 + 1);
    for (at, byte_) in buffer.iter().take(max).enumerate() {
        if at != 0 {
            s2.push(' ');
        }
        s2.push_str(&format!("{:02x}", byte_));
    }
    if buffer.len() > max {
        s2.push('…');
    }
    s2
}
