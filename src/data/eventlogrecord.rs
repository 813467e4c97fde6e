// src/data/eventlogrecord.rs

//! Codec for the legacy Windows Event Log binary record, [`EVENTLOGRECORD`].
//!
//! A read by the legacy API fills a buffer with one or more whole records
//! laid end to end. Each record is:
//!
//! ```text
//! offset  size  field
//!      0     4  Length              (of the entire record, in bytes)
//!      4     4  Reserved            "LfLe" signature
//!      8     4  RecordNumber
//!     12     4  TimeGenerated       (Unix seconds)
//!     16     4  TimeWritten         (Unix seconds)
//!     20     4  EventID
//!     24     2  EventType
//!     26     2  NumStrings
//!     28     2  EventCategory
//!     30     2  ReservedFlags
//!     32     4  ClosingRecordNumber
//!     36     4  StringOffset
//!     40     4  UserSidLength
//!     44     4  UserSidOffset
//!     48     4  DataLength
//!     52     4  DataOffset
//!     56     …  SourceName          (UTF-16LE, NUL terminated)
//!      …     …  Computername        (UTF-16LE, NUL terminated)
//!      …     …  UserSid, Strings, Data, Pad
//!  Len-4     4  Length              (again)
//! ```
//!
//! All integers are little-endian.
//!
//! [`EVENTLOGRECORD`]: https://learn.microsoft.com/en-us/windows/win32/api/winnt/ns-winnt-eventlogrecord

use std::fmt;

use ::const_format::assertcp_eq;
use ::encoding_rs::UTF_16LE;
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

use crate::common::{
    Bytes,
    NativeRecordId,
    UnixSeconds,
};

/// `EVENTLOGRECORD.Reserved`, the bytes `LfLe`.
pub const EVENTLOGRECORD_SIGNATURE: u32 = 0x654c664c;

pub const OFFSET_LENGTH: usize = 0;
pub const OFFSET_RESERVED: usize = 4;
pub const OFFSET_RECORDNUMBER: usize = 8;
pub const OFFSET_TIMEGENERATED: usize = 12;
pub const OFFSET_TIMEWRITTEN: usize = 16;
pub const OFFSET_EVENTID: usize = 20;
pub const OFFSET_EVENTTYPE: usize = 24;
pub const OFFSET_NUMSTRINGS: usize = 26;
pub const OFFSET_EVENTCATEGORY: usize = 28;
pub const OFFSET_RESERVEDFLAGS: usize = 30;
pub const OFFSET_CLOSINGRECORDNUMBER: usize = 32;
pub const OFFSET_STRINGOFFSET: usize = 36;
pub const OFFSET_USERSIDLENGTH: usize = 40;
pub const OFFSET_USERSIDOFFSET: usize = 44;
pub const OFFSET_DATALENGTH: usize = 48;
pub const OFFSET_DATAOFFSET: usize = 52;
/// Size of the fixed header, where `SourceName` begins.
pub const EVENTLOGRECORD_HEADER_SZ: usize = 56;
/// Size of the trailing copy of `Length`.
pub const EVENTLOGRECORD_TRAILER_SZ: usize = 4;
/// Smallest possible record: header, two empty names, trailer.
pub const EVENTLOGRECORD_MIN_SZ: usize = EVENTLOGRECORD_HEADER_SZ + 2 + 2 + EVENTLOGRECORD_TRAILER_SZ;

assertcp_eq!(OFFSET_DATAOFFSET + 4, EVENTLOGRECORD_HEADER_SZ);
assertcp_eq!(OFFSET_RESERVEDFLAGS + 2, OFFSET_CLOSINGRECORDNUMBER);

/// Mask applied to `EventID` to get the id an operator sees.
pub const EVENTID_DISPLAY_MASK: u32 = 0xFFFF;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A buffer that does not hold well-formed records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordError {
    /// Fewer bytes remain at `offset` than the record needs.
    Truncated { offset: usize, need: usize, have: usize },
    /// The `Reserved` field at `offset` is not `LfLe`.
    BadSignature { offset: usize, found: u32 },
    /// The `Length` at `offset` is impossible.
    BadLength { offset: usize, length: u32 },
    /// An internal offset field points outside the record.
    BadField { offset: usize, field: &'static str, value: u32 },
}

impl fmt::Display for RecordError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        match self {
            RecordError::Truncated { offset, need, have } => {
                write!(f, "record at offset {} truncated, need {} bytes, have {}", offset, need, have)
            }
            RecordError::BadSignature { offset, found } => {
                write!(f, "record at offset {} has bad signature {:#010x}", offset, found)
            }
            RecordError::BadLength { offset, length } => {
                write!(f, "record at offset {} has bad length {}", offset, length)
            }
            RecordError::BadField { offset, field, value } => {
                write!(f, "record at offset {} has bad {} {}", offset, field, value)
            }
        }
    }
}

impl std::error::Error for RecordError {}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[inline(always)]
fn u16_at(
    bytes: &[u8],
    at: usize,
) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

#[inline(always)]
fn u32_at(
    bytes: &[u8],
    at: usize,
) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Decode a NUL-terminated UTF-16LE string at the start of `bytes`.
///
/// Returns the string and the number of bytes consumed, including the NUL.
/// A string missing its NUL consumes all of `bytes`. Ill-formed UTF-16 is
/// replaced with `U+FFFD`.
pub fn utf16le_until_nul(bytes: &[u8]) -> (String, usize) {
    let mut end: usize = 0;
    while end + 1 < bytes.len() {
        if bytes[end] == 0 && bytes[end + 1] == 0 {
            let (s, _had_errors) = UTF_16LE.decode_without_bom_handling(&bytes[..end]);
            return (s.into_owned(), end + 2);
        }
        end += 2;
    }
    let (s, _had_errors) = UTF_16LE.decode_without_bom_handling(&bytes[..end]);

    (s.into_owned(), bytes.len())
}

/// Append `s` as NUL-terminated UTF-16LE.
pub fn push_utf16le_nul(
    buffer: &mut Bytes,
    s: &str,
) {
    for unit in s.encode_utf16() {
        buffer.extend_from_slice(&unit.to_le_bytes());
    }
    buffer.extend_from_slice(&[0, 0]);
}

fn pad_to_dword(buffer: &mut Bytes) {
    while buffer.len() % 4 != 0 {
        buffer.push(0);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RawRecord
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
/// One record borrowed from a read buffer.
///
/// The header has been bounds-checked; the variable part is only checked by
/// [`RawRecord::parse`].
#[derive(Clone, Copy)]
pub struct RawRecord<'a> {
    bytes: &'a [u8],
    /// offset of this record within the read buffer
    offset: usize,
}

impl<'a> fmt::Debug for RawRecord<'a> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("RawRecord")
            .field("offset", &self.offset)
            .field("length", &self.length())
            .field("RecordNumber", &self.record_number())
            .finish()
    }
}

impl<'a> RawRecord<'a> {
    /// Check the record header at `offset` of `buffer`.
    pub fn at(
        buffer: &'a [u8],
        offset: usize,
    ) -> Result<RawRecord<'a>, RecordError> {
        let have: usize = buffer.len().saturating_sub(offset);
        if have < EVENTLOGRECORD_HEADER_SZ {
            return Err(RecordError::Truncated { offset, need: EVENTLOGRECORD_HEADER_SZ, have });
        }
        let length: u32 = u32_at(buffer, offset + OFFSET_LENGTH);
        let signature: u32 = u32_at(buffer, offset + OFFSET_RESERVED);
        if signature != EVENTLOGRECORD_SIGNATURE {
            return Err(RecordError::BadSignature { offset, found: signature });
        }
        if (length as usize) < EVENTLOGRECORD_MIN_SZ || length % 4 != 0 {
            return Err(RecordError::BadLength { offset, length });
        }
        if length as usize > have {
            return Err(RecordError::Truncated { offset, need: length as usize, have });
        }

        Ok(RawRecord {
            bytes: &buffer[offset..offset + length as usize],
            offset,
        })
    }

    #[inline(always)]
    pub fn length(&self) -> u32 {
        u32_at(self.bytes, OFFSET_LENGTH)
    }

    #[inline(always)]
    pub fn record_number(&self) -> NativeRecordId {
        u32_at(self.bytes, OFFSET_RECORDNUMBER)
    }

    #[inline(always)]
    pub fn time_generated(&self) -> UnixSeconds {
        u32_at(self.bytes, OFFSET_TIMEGENERATED)
    }

    #[inline(always)]
    pub fn event_id(&self) -> u32 {
        u32_at(self.bytes, OFFSET_EVENTID)
    }

    #[inline(always)]
    pub fn event_type(&self) -> u16 {
        u16_at(self.bytes, OFFSET_EVENTTYPE)
    }

    pub const fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Decode the variable part of the record.
    pub fn parse(&self) -> Result<EventLogRecord, RecordError> {
        let b: &[u8] = self.bytes;
        let end: usize = b.len() - EVENTLOGRECORD_TRAILER_SZ;
        let trailer: u32 = u32_at(b, end);
        if trailer != self.length() {
            return Err(RecordError::BadField { offset: self.offset, field: "trailing Length", value: trailer });
        }

        let (source_name, used) = utf16le_until_nul(&b[EVENTLOGRECORD_HEADER_SZ..end]);
        let at: usize = EVENTLOGRECORD_HEADER_SZ + used;
        let (computer_name, _) = utf16le_until_nul(&b[at..end]);

        let num_strings: u16 = u16_at(b, OFFSET_NUMSTRINGS);
        let string_offset: u32 = u32_at(b, OFFSET_STRINGOFFSET);
        let mut strings: Vec<String> = Vec::with_capacity(num_strings as usize);
        if num_strings != 0 {
            if (string_offset as usize) < EVENTLOGRECORD_HEADER_SZ || string_offset as usize > end {
                return Err(RecordError::BadField { offset: self.offset, field: "StringOffset", value: string_offset });
            }
            let mut at: usize = string_offset as usize;
            for _ in 0..num_strings {
                let (s, used) = utf16le_until_nul(&b[at..end]);
                strings.push(s);
                at += used;
            }
        }

        let data_length: u32 = u32_at(b, OFFSET_DATALENGTH);
        let data_offset: u32 = u32_at(b, OFFSET_DATAOFFSET);
        let data: Bytes = match data_length {
            0 => Bytes::with_capacity(0),
            _ => {
                let beg: usize = data_offset as usize;
                match beg.checked_add(data_length as usize) {
                    Some(fin) if beg >= EVENTLOGRECORD_HEADER_SZ && fin <= end => b[beg..fin].to_vec(),
                    _ => {
                        return Err(RecordError::BadField { offset: self.offset, field: "DataOffset", value: data_offset });
                    }
                }
            }
        };

        Ok(EventLogRecord {
            record_number: self.record_number(),
            time_generated: self.time_generated(),
            time_written: u32_at(b, OFFSET_TIMEWRITTEN),
            event_id: self.event_id(),
            event_type: self.event_type(),
            event_category: u16_at(b, OFFSET_EVENTCATEGORY),
            source_name,
            computer_name,
            strings,
            data,
        })
    }
}

/// Iterate the records laid end to end in a read buffer.
///
/// After the first error the iterator is exhausted.
pub struct RawRecords<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> RawRecords<'a> {
    pub const fn new(buffer: &'a [u8]) -> RawRecords<'a> {
        RawRecords { buffer, offset: 0 }
    }

    /// Offset of the next record to be returned.
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for RawRecords<'a> {
    type Item = Result<RawRecord<'a>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buffer.len() {
            return None;
        }
        match RawRecord::at(self.buffer, self.offset) {
            Ok(record) => {
                self.offset += record.length() as usize;
                Some(Ok(record))
            }
            Err(err) => {
                defñ!("{}", err);
                self.offset = self.buffer.len();
                Some(Err(err))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventLogRecord
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An owned, decoded `EVENTLOGRECORD`.
///
/// The user SID is not kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct EventLogRecord {
    pub record_number: NativeRecordId,
    pub time_generated: UnixSeconds,
    pub time_written: UnixSeconds,
    /// Full 32-bit id; the message id for message-file formatting.
    pub event_id: u32,
    pub event_type: u16,
    pub event_category: u16,
    pub source_name: String,
    pub computer_name: String,
    /// Insert strings.
    pub strings: Vec<String>,
    pub data: Bytes,
}

impl EventLogRecord {
    /// The event id as displayed, the low 16 bits of `event_id`.
    #[inline(always)]
    pub const fn display_event_id(&self) -> u32 {
        self.event_id & EVENTID_DISPLAY_MASK
    }

    /// Encode in the layout a legacy read returns.
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer: Bytes = vec![0; EVENTLOGRECORD_HEADER_SZ];
        push_utf16le_nul(&mut buffer, &self.source_name);
        push_utf16le_nul(&mut buffer, &self.computer_name);
        pad_to_dword(&mut buffer);
        let sid_offset: u32 = buffer.len() as u32;
        let string_offset: u32 = buffer.len() as u32;
        for s in self.strings.iter() {
            push_utf16le_nul(&mut buffer, s);
        }
        let data_offset: u32 = buffer.len() as u32;
        buffer.extend_from_slice(&self.data);
        pad_to_dword(&mut buffer);
        let length: u32 = (buffer.len() + EVENTLOGRECORD_TRAILER_SZ) as u32;
        buffer.extend_from_slice(&length.to_le_bytes());

        let mut put = |at: usize, val: &[u8]| buffer[at..at + val.len()].copy_from_slice(val);
        put(OFFSET_LENGTH, &length.to_le_bytes());
        put(OFFSET_RESERVED, &EVENTLOGRECORD_SIGNATURE.to_le_bytes());
        put(OFFSET_RECORDNUMBER, &self.record_number.to_le_bytes());
        put(OFFSET_TIMEGENERATED, &self.time_generated.to_le_bytes());
        put(OFFSET_TIMEWRITTEN, &self.time_written.to_le_bytes());
        put(OFFSET_EVENTID, &self.event_id.to_le_bytes());
        put(OFFSET_EVENTTYPE, &self.event_type.to_le_bytes());
        put(OFFSET_NUMSTRINGS, &(self.strings.len() as u16).to_le_bytes());
        put(OFFSET_EVENTCATEGORY, &self.event_category.to_le_bytes());
        put(OFFSET_RESERVEDFLAGS, &0u16.to_le_bytes());
        put(OFFSET_CLOSINGRECORDNUMBER, &0u32.to_le_bytes());
        put(OFFSET_STRINGOFFSET, &string_offset.to_le_bytes());
        put(OFFSET_USERSIDLENGTH, &0u32.to_le_bytes());
        put(OFFSET_USERSIDOFFSET, &sid_offset.to_le_bytes());
        put(OFFSET_DATALENGTH, &(self.data.len() as u32).to_le_bytes());
        put(OFFSET_DATAOFFSET, &data_offset.to_le_bytes());

        buffer
    }
}
