// src/readers/eventlogtailer.rs

//! Implements an [`EventLogTailer`], the driver of one poll cycle over a
//! Windows Event Log channel.
//!
//! A poll cycle:
//!
//! 1. opens a [`LogSession`] and derives its window,
//! 2. normalizes the caller's checkpoint to the window,
//! 3. positions a [`SeekCursor`] at `checkpoint + 1`,
//! 4. runs [`dispatch`] until the log is exhausted, a read fails, the sink
//!    refuses, or the [`RateBudget`] is spent,
//! 5. writes the new checkpoint back to the caller and closes the session.
//!
//! The checkpoint is owned by the caller. It only moves backward on a reset:
//! a one-shot "skip old data" request, or a checkpoint found outside the
//! window.
//!
//! [`LogSession`]: crate::readers::logsession::LogSession
//! [`SeekCursor`]: crate::readers::seekcursor::SeekCursor
//! [`dispatch`]: crate::readers::dispatch::dispatch
//! [`RateBudget`]: crate::readers::dispatch::RateBudget

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
use crate::data::recordid::LogWindow;
use crate::readers::api::EventLogApi;
use crate::readers::decoder::{
    LegacyDecoder,
    ModernDecoder,
};
use crate::readers::dispatch::{
    dispatch,
    CycleAccumulator,
    EventSink,
    LegacyRecordSource,
    ModernRecordSource,
    RateBudget,
    SinkTarget,
    StopReason,
};
use crate::readers::filter::{
    CompiledFilter,
    FilterSpec,
};
use crate::readers::logsession::{
    BackendKind,
    BackendPreference,
    LogSession,
    SessionBackend,
};
use crate::readers::seekcursor::{
    Positioned,
    SeekCursor,
    SeekPlan,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TailerConfig
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Default records per second budget factor.
pub const RATE_DEFAULT: Count = 20;
/// Default seconds between poll cycles.
pub const REFRESH_INTERVAL_SECS_DEFAULT: Count = 1;

/// Everything a poll cycle needs besides the checkpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TailerConfig {
    /// Channel name, e.g. `"System"`. Empty fails at open.
    pub log_name: String,
    pub filter: FilterSpec,
    /// Records per second; with `refresh_interval_secs` derives the
    /// [`RateBudget`].
    pub rate: Count,
    pub refresh_interval_secs: Count,
    /// One-shot: the next cycle jumps to the newest record without sending
    /// anything, then clears this.
    pub skip_old_data: bool,
    pub target: SinkTarget,
    pub backend: BackendPreference,
}

impl TailerConfig {
    pub fn new(log_name: &str) -> TailerConfig {
        TailerConfig {
            log_name: log_name.to_string(),
            filter: FilterSpec::default(),
            rate: RATE_DEFAULT,
            refresh_interval_secs: REFRESH_INTERVAL_SECS_DEFAULT,
            skip_old_data: false,
            target: SinkTarget::default(),
            backend: BackendPreference::default(),
        }
    }

    /// Check the settings and compile the filter.
    ///
    /// An empty log name is not checked here; it fails at open.
    pub fn validate(&self) -> ResultTail<CompiledFilter> {
        if self.rate == 0 {
            return Err(TailError::Config("rate must be at least 1".to_string()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(TailError::Config("refresh interval must be at least 1 second".to_string()));
        }
        match CompiledFilter::new(&self.filter) {
            Ok(filter) => Ok(filter),
            Err(err) => Err(TailError::Config(format!("bad filter pattern: {}", err))),
        }
    }

    pub const fn rate_budget(&self) -> RateBudget {
        RateBudget::new(self.rate, self.refresh_interval_secs)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CycleReport, SummaryEventLogTailer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one successful poll cycle did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub backend: BackendKind,
    pub window: LogWindow,
    /// Checkpoint handed in.
    pub checkpoint_start: Checkpoint,
    /// Checkpoint handed back.
    pub checkpoint: Checkpoint,
    /// The checkpoint was outside the window and was reset.
    pub reset: bool,
    /// The cycle only applied a "skip old data" request.
    pub skipped_old_data: bool,
    /// Logical id of the last record sent, a.k.a. `lastlogsize_sent`.
    pub last_sent: Option<RecordId>,
    pub sent: Count,
    pub processed: Count,
    pub discrepancies: Count,
    /// `None` if there was nothing to read.
    pub stop: Option<StopReason>,
    /// The legacy backward fallback seek was used.
    pub fallback_seek: bool,
}

impl CycleReport {
    fn new(
        backend: BackendKind,
        window: LogWindow,
        checkpoint_start: Checkpoint,
    ) -> CycleReport {
        CycleReport {
            backend,
            window,
            checkpoint_start,
            checkpoint: checkpoint_start,
            reset: false,
            skipped_old_data: false,
            last_sent: None,
            sent: 0,
            processed: 0,
            discrepancies: 0,
            stop: None,
            fallback_seek: false,
        }
    }
}

// TODO: fold `CycleReport` counters into this directly instead of copying
//       field by field in `EventLogTailer::summary_update`
#[allow(non_snake_case)]
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct SummaryEventLogTailer {
    pub eventlogtailer_cycles: Count,
    pub eventlogtailer_cycles_failed: Count,
    pub eventlogtailer_records_processed: Count,
    pub eventlogtailer_records_sent: Count,
    pub eventlogtailer_sink_refusals: Count,
    pub eventlogtailer_checkpoint_resets: Count,
    pub eventlogtailer_id_discrepancies: Count,
    pub eventlogtailer_fallback_seeks: Count,
    pub eventlogtailer_message_fallbacks: Count,
    pub eventlogtailer_buffer_growths: Count,
    pub eventlogtailer_message_files_cache_hit: Count,
    pub eventlogtailer_message_files_cache_miss: Count,
    pub eventlogtailer_backend: Option<BackendKind>,
    /// Logical id of the last record sent in any cycle.
    pub eventlogtailer_last_sent: Option<RecordId>,
    /// The last error, if any
    pub eventlogtailer_error: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventLogTailer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tails one Windows Event Log channel, one [`poll_cycle`] at a time.
///
/// The caller serializes cycles per log; nothing here locks.
///
/// [`poll_cycle`]: EventLogTailer::poll_cycle
pub struct EventLogTailer<A: EventLogApi> {
    api: A,
    config: TailerConfig,
    filter: CompiledFilter,
    summary: SummaryEventLogTailer,
}

impl<A: EventLogApi> fmt::Debug for EventLogTailer<A> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("EventLogTailer")
            .field("log_name", &self.config.log_name)
            .field("filter", &self.filter)
            .field("skip_old_data", &self.config.skip_old_data)
            .field("cycles", &self.summary.eventlogtailer_cycles)
            .field("Error?", &self.summary.eventlogtailer_error)
            .finish()
    }
}

impl<A: EventLogApi> EventLogTailer<A> {
    /// Create a new `EventLogTailer`.
    ///
    /// Does not open the log; that happens each [`poll_cycle`].
    ///
    /// [`poll_cycle`]: EventLogTailer::poll_cycle
    pub fn new(
        api: A,
        config: TailerConfig,
    ) -> ResultTail<EventLogTailer<A>> {
        def1n!("({:?})", config);
        let filter: CompiledFilter = match config.validate() {
            Ok(filter) => filter,
            Err(err) => {
                def1x!("return Err({})", err);
                return Err(err);
            }
        };
        def1x!();

        Ok(EventLogTailer {
            api,
            config,
            filter,
            summary: SummaryEventLogTailer::default(),
        })
    }

    pub const fn config(&self) -> &TailerConfig {
        &self.config
    }

    pub const fn summary(&self) -> &SummaryEventLogTailer {
        &self.summary
    }

    /// Request a one-shot "skip old data" for the next cycle.
    pub fn request_skip_old_data(&mut self) {
        self.config.skip_old_data = true;
    }

    fn fail(
        &mut self,
        err: TailError,
    ) -> TailError {
        self.summary.eventlogtailer_cycles_failed += 1;
        self.summary.eventlogtailer_error = Some(err.to_string());

        err
    }

    /// Run one poll cycle starting after `checkpoint`, sending matching
    /// events to `sink`.
    ///
    /// `checkpoint` is updated in place: to the last record processed, to
    /// its reset value, or to the newest record after a "skip old data"
    /// request. An open failure leaves it untouched. A read failure leaves
    /// it at the last record processed before the failure, then returns
    /// the error.
    pub fn poll_cycle<K>(
        &mut self,
        checkpoint: &mut Checkpoint,
        sink: &mut K,
    ) -> ResultTail<CycleReport>
    where
        K: EventSink + ?Sized,
    {
        def1n!("checkpoint {}", checkpoint);
        self.summary.eventlogtailer_cycles += 1;

        let mut session: LogSession<A> = match LogSession::open(
            &mut self.api,
            &self.config.log_name,
            self.config.backend,
        ) {
            Ok(session) => session,
            Err(err) => {
                def1x!("return Err({})", err);
                return Err(self.fail(err));
            }
        };
        self.summary.eventlogtailer_backend = Some(session.kind());
        let mut report = CycleReport::new(session.kind(), session.window(), *checkpoint);

        if self.config.skip_old_data {
            *checkpoint = session.newest_id();
            self.config.skip_old_data = false;
            report.checkpoint = *checkpoint;
            report.skipped_old_data = true;
            session.close();
            def1x!("skipped old data, checkpoint {}", checkpoint);
            return Ok(report);
        }

        let mut cursor = SeekCursor::new(&session, *checkpoint);
        let plan: SeekPlan = *cursor.plan();
        report.reset = plan.reset;
        if plan.reset {
            self.summary.eventlogtailer_checkpoint_resets += 1;
        }
        let positioned: Positioned = match cursor.position(&mut session) {
            Ok(positioned) => positioned,
            Err(err) => {
                def1x!("return Err({})", err);
                self.summary.eventlogtailer_buffer_growths += session.buffer_growths();
                session.close();
                return Err(self.fail(err));
            }
        };
        report.fallback_seek = cursor.fallback_used();
        if report.fallback_seek {
            self.summary.eventlogtailer_fallback_seeks += 1;
        }
        *checkpoint = plan.checkpoint;

        let acc: Option<CycleAccumulator> = match positioned {
            Positioned::Eof => None,
            Positioned::Ready { buffered } => Some(self.run_dispatch(&mut session, &plan, buffered, sink)),
        };
        self.summary.eventlogtailer_buffer_growths += session.buffer_growths();
        session.close();

        let acc: CycleAccumulator = match acc {
            Some(acc) => acc,
            None => {
                report.checkpoint = *checkpoint;
                def1x!("nothing to read, checkpoint {}", checkpoint);
                return Ok(report);
            }
        };
        *checkpoint = acc.checkpoint;
        report.checkpoint = acc.checkpoint;
        report.last_sent = acc.last_sent;
        report.sent = acc.sent;
        report.processed = acc.processed;
        report.discrepancies = acc.discrepancies;
        report.stop = Some(acc.stop);
        self.summary_update(&report);
        if let Some(err) = acc.error {
            def1x!("return Err({}), checkpoint {}", err, checkpoint);
            return Err(self.fail(err));
        }
        def1x!("return Ok({:?})", report);

        Ok(report)
    }

    fn run_dispatch<K>(
        &mut self,
        session: &mut LogSession<A>,
        plan: &SeekPlan,
        buffered: usize,
        sink: &mut K,
    ) -> CycleAccumulator
    where
        K: EventSink + ?Sized,
    {
        let budget: RateBudget = self.config.rate_budget();
        let log_name: String = session.log_name().to_string();
        match session.parts_mut() {
            Some((SessionBackend::Legacy(legacy), buffer)) => {
                let mut decoder = LegacyDecoder::new(&log_name);
                let mut source = LegacyRecordSource::new(
                    legacy,
                    buffer,
                    self.api.messages(),
                    &mut decoder,
                    &log_name,
                    plan.target,
                    buffered,
                );
                let acc = dispatch(&mut source, &self.filter, &budget, &self.config.target, sink, plan.checkpoint);
                defo!("{:?}", source);
                self.summary.eventlogtailer_message_fallbacks += decoder.fallbacks;
                self.summary.eventlogtailer_message_files_cache_hit += decoder.message_files_cache_hit;
                self.summary.eventlogtailer_message_files_cache_miss += decoder.message_files_cache_miss;

                acc
            }
            Some((SessionBackend::Modern(modern), buffer)) => {
                let mut decoder = ModernDecoder::new();
                let mut source = ModernRecordSource::new(modern, buffer, &mut decoder, &log_name);
                let acc = dispatch(&mut source, &self.filter, &budget, &self.config.target, sink, plan.checkpoint);
                defo!("{:?}", source);
                self.summary.eventlogtailer_message_fallbacks += decoder.fallbacks;

                acc
            }
            None => CycleAccumulator::new(plan.checkpoint),
        }
    }

    fn summary_update(
        &mut self,
        report: &CycleReport,
    ) {
        self.summary.eventlogtailer_records_processed += report.processed;
        self.summary.eventlogtailer_records_sent += report.sent;
        self.summary.eventlogtailer_id_discrepancies += report.discrepancies;
        if report.stop == Some(StopReason::SinkRefused) {
            self.summary.eventlogtailer_sink_refusals += 1;
        }
        if report.last_sent.is_some() {
            self.summary.eventlogtailer_last_sent = report.last_sent;
        }
    }
}
