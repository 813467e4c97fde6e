// src/printer/printers.rs

//! A [`PrinterSink`] writes each [`SinkRecord`] as one line to a
//! [`WriteColor`] stream, e.g. a [`termcolor::StandardStream`] on stdout.
//!
//! A line is
//!
//! ```text
//! [checkpoint] timestamp severity source event_id: message
//! ```
//!
//! where `[checkpoint]` is optional and `severity` is colored.
//!
//! [`SinkRecord`]: crate::readers::dispatch::SinkRecord

use std::io::Write;

use ::chrono::format::{
    Item,
    StrftimeItems,
};
use ::chrono::{
    Local,
    LocalResult,
    TimeZone,
    Utc,
};
#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};
pub use ::termcolor::{
    Color,
    ColorChoice,
    ColorSpec,
    WriteColor,
};

use crate::common::{
    Count,
    UnixSeconds,
};
use crate::data::event::Severity;
use crate::de_err;
use crate::readers::dispatch::{
    EventSink,
    SinkRecord,
};

/// Default `strftime` format of the prepended timestamp.
pub const TIMESTAMP_FORMAT_DEFAULT: &str = "%Y-%m-%d %H:%M:%S %z";

/// [`Color`] of each [`Severity`]; `None` is the terminal default.
pub const fn color_severity(severity: Severity) -> Option<Color> {
    match severity {
        Severity::Critical | Severity::Error => Some(Color::Red),
        Severity::AuditFailure => Some(Color::Magenta),
        Severity::Warning => Some(Color::Yellow),
        Severity::AuditSuccess => Some(Color::Green),
        Severity::Verbose => Some(Color::Cyan),
        Severity::Info => None,
    }
}

/// Does `format` hold only valid `strftime` specifiers?
pub fn timestamp_format_is_valid(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Format Unix epoch `timestamp` with `strftime` `format`, in UTC or the
/// local timezone.
///
/// `format` must be valid, see [`timestamp_format_is_valid`].
pub fn format_timestamp(
    timestamp: UnixSeconds,
    format: &str,
    utc: bool,
) -> String {
    match Utc.timestamp_opt(timestamp as i64, 0) {
        LocalResult::Single(dt) => match utc {
            true => dt.format(format).to_string(),
            false => dt
                .with_timezone(&Local)
                .format(format)
                .to_string(),
        },
        _ => timestamp.to_string(),
    }
}

/// Print colored output using passed stream, plain output if the stream
/// does not support color.
pub fn print_colored<W: WriteColor>(
    color: Option<Color>,
    value: &[u8],
    out: &mut W,
) -> std::io::Result<()> {
    if let Err(err) = out.set_color(ColorSpec::new().set_fg(color)) {
        de_err!("print_colored: set_color({:?}) returned error {}", color, err);
        return Err(err);
    }
    if let Err(err) = out.write_all(value) {
        de_err!("print_colored: write_all(…) returned error {}", err);
        return Err(err);
    }
    if let Err(err) = out.reset() {
        de_err!("print_colored: reset() returned error {}", err);
        return Err(err);
    }

    Ok(())
}

/// Print colored output to terminal on stderr.
pub fn print_colored_stderr(
    color: Option<Color>,
    color_choice: ColorChoice,
    value: &[u8],
) -> std::io::Result<()> {
    let mut stderr = termcolor::StandardStream::stderr(color_choice);
    let _stdout_lock = std::io::stdout().lock();
    print_colored(color, value, &mut stderr)?;
    stderr.flush()
}

/// An [`EventSink`] printing each record as one line.
///
/// A failed write refuses the record.
pub struct PrinterSink<W: WriteColor> {
    out: W,
    timestamp_format: String,
    utc: bool,
    prepend_checkpoint: bool,
    /// `Count` of records printed.
    pub(crate) printed: Count,
    /// `Count` of bytes printed.
    pub(crate) printed_bytes: Count,
}

impl<W: WriteColor> std::fmt::Debug for PrinterSink<W> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("PrinterSink")
            .field("timestamp_format", &self.timestamp_format)
            .field("utc", &self.utc)
            .field("prepend_checkpoint", &self.prepend_checkpoint)
            .field("printed", &self.printed)
            .field("printed_bytes", &self.printed_bytes)
            .finish()
    }
}

impl<W: WriteColor> PrinterSink<W> {
    pub fn new(
        out: W,
        timestamp_format: &str,
        utc: bool,
        prepend_checkpoint: bool,
    ) -> PrinterSink<W> {
        PrinterSink {
            out,
            timestamp_format: timestamp_format.to_string(),
            utc,
            prepend_checkpoint,
            printed: 0,
            printed_bytes: 0,
        }
    }

    #[inline(always)]
    pub const fn printed(&self) -> Count {
        self.printed
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print(
        &mut self,
        record: &SinkRecord,
    ) -> std::io::Result<()> {
        let severity: Option<Severity> = Severity::from_item_log_type(record.severity);
        let mut head = String::with_capacity(64);
        if self.prepend_checkpoint {
            head.push_str(&format!("[{}] ", record.checkpoint));
        }
        head.push_str(&format_timestamp(record.timestamp, &self.timestamp_format, self.utc));
        head.push(' ');
        let severity_str: String = match severity {
            Some(severity) => severity.as_str().to_string(),
            None => format!("severity({})", record.severity),
        };
        let tail: String = format!(" {} {}: {}\n", record.source, record.event_id, record.message);

        self.out.write_all(head.as_bytes())?;
        print_colored(severity.and_then(color_severity), severity_str.as_bytes(), &mut self.out)?;
        self.out.write_all(tail.as_bytes())?;
        self.out.flush()?;
        self.printed_bytes += (head.len() + severity_str.len() + tail.len()) as Count;

        Ok(())
    }
}

impl<W: WriteColor> EventSink for PrinterSink<W> {
    fn send(
        &mut self,
        record: &SinkRecord,
    ) -> Result<(), String> {
        match self.print(record) {
            Ok(()) => {
                self.printed += 1;
                Ok(())
            }
            Err(err) => {
                defñ!("print failed {}", err);
                Err(format!("write failed: {}", err))
            }
        }
    }
}
