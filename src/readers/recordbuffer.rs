// src/readers/recordbuffer.rs

//! Implements a [`GrowableRecordBuffer`], the receiving area for raw record
//! data handed out by the operating system.
//!
//! The operating system reports "buffer too small" along with the size it
//! needs. [`GrowableRecordBuffer::retry_on_insufficient_space`] grows the
//! buffer to that size and retries the same call, so callers never handle
//! the resize themselves.

use std::fmt;

#[allow(unused_imports)]
use ::more_asserts::{
    debug_assert_ge,
    debug_assert_le,
};
#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};

use crate::common::Count;
use crate::de_wrn;
use crate::readers::api::ApiError;

/// Default size of the legacy read buffer, 64 KiB.
pub const LEGACY_BUFFER_SZ_DEFAULT: usize = 64 * 1024;
/// Default size of the modern render and format buffer.
pub const RENDER_BUFFER_SZ_DEFAULT: usize = 256;

type Word = u64;
const WORD_SZ: usize = std::mem::size_of::<Word>();

/// A byte buffer that only grows.
///
/// Backed by `u64` words so the byte area is 8-byte aligned; the modern
/// API renders structures holding pointers into it.
///
/// Capacity never shrinks during the life of the buffer. A session owns
/// one buffer, so capacity is monotonic within a session.
pub struct GrowableRecordBuffer {
    words: Vec<Word>,
    /// `Count` of growths.
    growths: Count,
}

impl fmt::Debug for GrowableRecordBuffer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("GrowableRecordBuffer")
            .field("capacity", &self.capacity())
            .field("growths", &self.growths)
            .finish()
    }
}

impl GrowableRecordBuffer {
    /// Create a new `GrowableRecordBuffer` of at least `capacity` bytes.
    pub fn new(capacity: usize) -> GrowableRecordBuffer {
        GrowableRecordBuffer {
            words: vec![0; Self::words_for(capacity)],
            growths: 0,
        }
    }

    #[inline(always)]
    const fn words_for(bytes: usize) -> usize {
        (bytes + WORD_SZ - 1) / WORD_SZ
    }

    /// Capacity in bytes.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_SZ
    }

    /// `Count` of times the buffer grew.
    #[inline(always)]
    pub const fn growths(&self) -> Count {
        self.growths
    }

    /// Grow to at least `required` bytes. Never shrinks.
    ///
    /// Returns `true` if the buffer grew.
    pub fn ensure_capacity(
        &mut self,
        required: usize,
    ) -> bool {
        if required <= self.capacity() {
            return false;
        }
        let capacity_old = self.capacity();
        self.words.resize(Self::words_for(required), 0);
        self.growths += 1;
        defñ!("grew {} → {} bytes", capacity_old, self.capacity());
        debug_assert_ge!(self.capacity(), required);

        true
    }

    /// The whole byte area.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `words` is a live allocation of `words.len() * 8`
        // initialized bytes and `u8` has no alignment requirement.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.capacity()) }
    }

    /// The whole byte area.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        let len = self.capacity();
        // SAFETY: as `as_bytes`; the slice borrows `self` mutably so no
        // other view exists.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr() as *mut u8, len) }
    }

    /// Call `f` with this buffer; on [`ApiError::InsufficientBuffer`] grow to
    /// the reported size and call again.
    ///
    /// Each retry strictly increases capacity. A `required` size that does
    /// not exceed the current capacity cannot make progress and is returned
    /// as the error.
    pub fn retry_on_insufficient_space<T, F>(
        &mut self,
        mut f: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut(&mut GrowableRecordBuffer) -> Result<T, ApiError>,
    {
        loop {
            match f(self) {
                Err(ApiError::InsufficientBuffer { required }) => {
                    if !self.ensure_capacity(required) {
                        de_wrn!("required {} does not exceed capacity {}", required, self.capacity());
                        return Err(ApiError::InsufficientBuffer { required });
                    }
                }
                result => {
                    return result;
                }
            }
        }
    }
}
