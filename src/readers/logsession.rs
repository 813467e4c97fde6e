// src/readers/logsession.rs

//! Implements a [`LogSession`], one open Windows Event Log channel on one
//! backend for the duration of one poll cycle.
//!
//! At open the session decides the backend, modern API first then the
//! legacy API, and derives the [`LogWindow`]. Every later call uses that one
//! backend.
//!
//! [`LogWindow`]: crate::data::recordid::LogWindow

use std::fmt;

#[allow(unused_imports)]
use ::si_trace_print::{
    def1n,
    def1o,
    def1x,
    defn,
    defo,
    defx,
    defñ,
};

use crate::common::{
    Checkpoint,
    Count,
    RecordId,
    ResultTail,
    TailError,
};
use crate::data::recordid::{
    rebase_checkpoint,
    LogWindow,
};
use crate::readers::api::{
    ApiError,
    EventLogApi,
    LegacyEventLog,
    ModernEventLog,
};
use crate::readers::recordbuffer::{
    GrowableRecordBuffer,
    LEGACY_BUFFER_SZ_DEFAULT,
    RENDER_BUFFER_SZ_DEFAULT,
};

/// Which API a [`LogSession`] reads with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Legacy,
    Modern,
}

impl fmt::Display for BackendKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        match self {
            BackendKind::Legacy => write!(f, "legacy"),
            BackendKind::Modern => write!(f, "modern"),
        }
    }
}

/// Which API a [`LogSession`] should try.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BackendPreference {
    /// Probe the modern API, fall back to the legacy API.
    #[default]
    Auto,
    /// Only the modern API.
    Modern,
    /// Only the legacy API.
    Legacy,
}

/// The open handle of a [`LogSession`].
pub enum SessionBackend<A: EventLogApi> {
    Legacy(A::Legacy),
    Modern(A::Modern),
}

impl<A: EventLogApi> SessionBackend<A> {
    pub const fn kind(&self) -> BackendKind {
        match self {
            SessionBackend::Legacy(_) => BackendKind::Legacy,
            SessionBackend::Modern(_) => BackendKind::Modern,
        }
    }
}

/// A checkpoint brought into `[FirstID − 1, LastID]` of a [`LogWindow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizedCheckpoint {
    pub checkpoint: Checkpoint,
    /// The checkpoint was outside the window and was reset.
    pub reset: bool,
}

/// One open log channel.
///
/// Owns the backend handle and the [`GrowableRecordBuffer`] every read of
/// this session receives into. [`close`] and `drop` release the handle.
///
/// [`close`]: LogSession::close
pub struct LogSession<A: EventLogApi> {
    log_name: String,
    backend: Option<SessionBackend<A>>,
    kind: BackendKind,
    window: LogWindow,
    buffer: GrowableRecordBuffer,
}

impl<A: EventLogApi> fmt::Debug for LogSession<A> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("LogSession")
            .field("log_name", &self.log_name)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .field("window", &self.window)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<A: EventLogApi> LogSession<A> {
    /// Open `log_name` and derive its [`LogWindow`].
    ///
    /// Failures are [`TailError::Open`] carrying the operating system error
    /// text.
    pub fn open(
        api: &mut A,
        log_name: &str,
        preference: BackendPreference,
    ) -> ResultTail<LogSession<A>> {
        def1n!("({:?}, {:?})", log_name, preference);
        if log_name.is_empty() {
            def1x!("return Err; empty log name");
            return Err(TailError::Open("Cannot open eventlog with empty name.".to_string()));
        }

        let backend: SessionBackend<A> = match preference {
            BackendPreference::Auto => match api.open_modern(log_name) {
                Ok(modern) => SessionBackend::Modern(modern),
                Err(_err) => {
                    def1o!("open_modern failed {}; try legacy", _err);
                    match api.open_legacy(log_name) {
                        Ok(legacy) => SessionBackend::Legacy(legacy),
                        Err(err) => {
                            def1x!("return Err; open_legacy {}", err);
                            return Err(Self::open_error(log_name, &err));
                        }
                    }
                }
            },
            BackendPreference::Modern => match api.open_modern(log_name) {
                Ok(modern) => SessionBackend::Modern(modern),
                Err(err) => {
                    def1x!("return Err; open_modern {}", err);
                    return Err(Self::open_error(log_name, &err));
                }
            },
            BackendPreference::Legacy => match api.open_legacy(log_name) {
                Ok(legacy) => SessionBackend::Legacy(legacy),
                Err(err) => {
                    def1x!("return Err; open_legacy {}", err);
                    return Err(Self::open_error(log_name, &err));
                }
            },
        };

        let kind: BackendKind = backend.kind();
        let mut session = LogSession {
            log_name: log_name.to_string(),
            backend: Some(backend),
            kind,
            window: LogWindow::EMPTY,
            buffer: match kind {
                BackendKind::Legacy => GrowableRecordBuffer::new(LEGACY_BUFFER_SZ_DEFAULT),
                BackendKind::Modern => GrowableRecordBuffer::new(RENDER_BUFFER_SZ_DEFAULT),
            },
        };
        let window: Result<LogWindow, ApiError> = match session.backend.as_mut() {
            Some(SessionBackend::Legacy(legacy)) => Self::legacy_window(legacy),
            Some(SessionBackend::Modern(modern)) => Self::modern_window(modern, &mut session.buffer),
            None => Ok(LogWindow::EMPTY),
        };
        session.window = match window {
            Ok(window) => window,
            Err(err) => {
                def1x!("return Err; window {}", err);
                return Err(Self::open_error(log_name, &err));
            }
        };
        def1x!("return Ok({:?})", session);

        Ok(session)
    }

    fn open_error(
        log_name: &str,
        err: &ApiError,
    ) -> TailError {
        TailError::Open(format!("Cannot open eventlog '{}': {}", log_name, err))
    }

    /// `[oldest, oldest + count − 1]`
    fn legacy_window(legacy: &mut A::Legacy) -> Result<LogWindow, ApiError> {
        let count: u32 = legacy.number_of_records()?;
        let oldest = legacy.oldest_record_number()?;
        defñ!("oldest {} count {}", oldest, count);

        Ok(LogWindow::from_legacy(oldest, count))
    }

    /// `[first, first + count]`, where `first` is the id of the first event
    /// an unfiltered query returns.
    fn modern_window(
        modern: &mut A::Modern,
        buffer: &mut GrowableRecordBuffer,
    ) -> Result<LogWindow, ApiError> {
        defn!();
        let count: Count = modern.record_count()?;
        if count == 0 {
            defx!("return EMPTY; no records");
            return Ok(LogWindow::EMPTY);
        }
        modern.query(None)?;
        let mut events: Vec<<A::Modern as ModernEventLog>::Event> = Vec::with_capacity(1);
        match modern.next(1, &mut events) {
            Ok(_) => {}
            Err(ApiError::NoMoreItems) => {
                defx!("return EMPTY; first next found no events");
                return Ok(LogWindow::EMPTY);
            }
            Err(err) => {
                defx!("return Err {}", err);
                return Err(err);
            }
        }
        let event = match events.first() {
            Some(event) => event,
            None => {
                defx!("return EMPTY; first next returned nothing");
                return Ok(LogWindow::EMPTY);
            }
        };
        let first: RecordId = buffer
            .retry_on_insufficient_space(|buffer| modern.render(event, buffer))?
            .record_id;
        let window = LogWindow::from_modern(Some(first), count);
        defx!("return {:?}", window);

        Ok(window)
    }

    /// Bring `checkpoint` into `[FirstID − 1, LastID]`.
    ///
    /// Legacy: a checkpoint past `LastID` is first rebased to its low 32
    /// bits; if still outside the window it resets to `FirstID − 1`.
    ///
    /// Modern: `LastID` is one past the newest record so the window is
    /// `[FirstID − 1, LastID − 1]`; outside it resets to `FirstID − 1`.
    pub fn normalize_checkpoint(
        &self,
        checkpoint: Checkpoint,
    ) -> NormalizedCheckpoint {
        let window: &LogWindow = &self.window;
        let before_first: Checkpoint = window.first.saturating_sub(1);
        let (checkpoint_, out_of_window) = match self.kind {
            BackendKind::Legacy => {
                let rebased = rebase_checkpoint(checkpoint, window);
                (rebased, rebased > window.last || rebased < before_first)
            }
            BackendKind::Modern => (checkpoint, checkpoint >= window.last || checkpoint < before_first),
        };
        if out_of_window {
            defñ!("checkpoint {} outside {:?}; reset to {}", checkpoint, window, before_first);
            return NormalizedCheckpoint {
                checkpoint: before_first,
                reset: true,
            };
        }

        NormalizedCheckpoint {
            checkpoint: checkpoint_,
            reset: false,
        }
    }

    /// The id of the newest record, the checkpoint a "skip old data" request
    /// jumps to. `FirstID − 1` for an empty log.
    pub fn newest_id(&self) -> Checkpoint {
        if self.window.is_empty() {
            return self.window.first.saturating_sub(1);
        }
        match self.kind {
            BackendKind::Legacy => self.window.last,
            BackendKind::Modern => self.window.last.saturating_sub(1),
        }
    }

    #[inline(always)]
    pub const fn window(&self) -> LogWindow {
        self.window
    }

    #[inline(always)]
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn log_name(&self) -> &str {
        self.log_name.as_str()
    }

    pub const fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// `Count` of times the session buffer grew.
    pub const fn buffer_growths(&self) -> Count {
        self.buffer.growths()
    }

    /// The backend handle and the session buffer, `None` once closed.
    pub fn parts_mut(&mut self) -> Option<(&mut SessionBackend<A>, &mut GrowableRecordBuffer)> {
        match self.backend.as_mut() {
            Some(backend) => Some((backend, &mut self.buffer)),
            None => None,
        }
    }

    /// Release the backend handle. Idempotent.
    pub fn close(&mut self) {
        if let Some(_backend) = self.backend.take() {
            defñ!("close {:?} {}", self.log_name, self.kind);
        }
    }
}
