// src/tests/dispatch_tests.rs

//! tests for `src/readers/dispatch.rs`

#![allow(non_snake_case)]

use std::collections::VecDeque;

use crate::common::{
    Checkpoint,
    Count,
    RecordId,
    ResultFetch,
    TailError,
};
use crate::data::event::{
    NormalizedEvent,
    Severity,
};
use crate::readers::api::{
    EventLogApi,
    ModernEventLog,
};
use crate::readers::decoder::{
    LegacyDecoder,
    ModernDecoder,
};
use crate::readers::dispatch::{
    dispatch,
    CycleAccumulator,
    EventSink,
    ItemState,
    LegacyRecordSource,
    ModernRecordSource,
    RateBudget,
    RecordSource,
    SinkRecord,
    SinkTarget,
    StopReason,
    EVT_ARRAY_SIZE,
    METRIC_FLAG_PERSISTENT,
};
use crate::readers::filter::{
    CompiledFilter,
    FilterSpec,
};
use crate::readers::recordbuffer::{
    GrowableRecordBuffer,
    LEGACY_BUFFER_SZ_DEFAULT,
    RENDER_BUFFER_SZ_DEFAULT,
};
use crate::tests::common::{
    sim_events,
    sim_log,
    SimApi,
    SimEvent,
    VecSink,
};

extern crate test_case;
use test_case::test_case;

const LOG: &str = "Application";

fn event(record_id: RecordId) -> NormalizedEvent {
    NormalizedEvent {
        provider: "Src".to_string(),
        source: None,
        severity: if record_id % 2 == 0 { Severity::Warning } else { Severity::Info },
        timestamp: 1_600_000_000,
        event_id: 1000 + (record_id % 10) as u32,
        keywords: 0,
        message: format!("message {}", record_id),
        record_id,
    }
}

/// A [`RecordSource`] replaying canned results.
struct VecSource {
    results: VecDeque<ResultFetch<NormalizedEvent, TailError>>,
    /// each `expected` passed in
    expected: Vec<RecordId>,
}

impl VecSource {
    fn new(ids: impl IntoIterator<Item = RecordId>) -> VecSource {
        VecSource {
            results: ids
                .into_iter()
                .map(|id| ResultFetch::Found(event(id)))
                .collect(),
            expected: vec![],
        }
    }
}

impl RecordSource for VecSource {
    fn next_event(
        &mut self,
        expected: RecordId,
    ) -> ResultFetch<NormalizedEvent, TailError> {
        self.expected.push(expected);
        self.results
            .pop_front()
            .unwrap_or(ResultFetch::Done)
    }
}

fn filter_all() -> CompiledFilter {
    CompiledFilter::new(&FilterSpec::default()).unwrap()
}

fn filter_severity(pattern: &str) -> CompiledFilter {
    CompiledFilter::new(&FilterSpec {
        severity_pattern: pattern.to_string(),
        ..Default::default()
    })
    .unwrap()
}

fn target() -> SinkTarget {
    SinkTarget {
        host: "host1".to_string(),
        item_key: "eventlog[Application]".to_string(),
        flags: 0x10,
    }
}

fn run(
    source: &mut VecSource,
    filter: &CompiledFilter,
    budget: RateBudget,
    sink: &mut VecSink,
    checkpoint: Checkpoint,
) -> CycleAccumulator {
    dispatch(source, filter, &budget, &target(), sink, checkpoint)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RateBudget, SinkRecord
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test_case(10, 1, 10, 40)]
#[test_case(20, 5, 100, 400)]
#[test_case(1, 1, 1, 4)]
#[test_case(Count::MAX, 2, Count::MAX, Count::MAX; "saturates")]
fn test_RateBudget_new(
    rate: Count,
    refresh: Count,
    max_sent: Count,
    max_processed: Count,
) {
    let budget = RateBudget::new(rate, refresh);
    assert_eq!(budget.max_sent, max_sent);
    assert_eq!(budget.max_processed, max_processed);
}

#[test]
fn test_SinkRecord_new() {
    let target = target();
    let event = event(42);
    let record = SinkRecord::new(&target, &event);
    assert_eq!(record.host, "host1");
    assert_eq!(record.item_key, "eventlog[Application]");
    assert_eq!(record.message, "message 42");
    assert_eq!(record.state, ItemState::Normal);
    assert_eq!(record.checkpoint, 42);
    assert_eq!(record.timestamp, 1_600_000_000);
    assert_eq!(record.source, "Src");
    assert_eq!(record.severity, Severity::Warning.item_log_type());
    assert_eq!(record.event_id, 1002);
    assert_eq!(record.flags, 0x10 | METRIC_FLAG_PERSISTENT);
}

fn dispatch_to_closure<F>(
    source: &mut VecSource,
    mut f: F,
) -> CycleAccumulator
where
    F: FnMut(&SinkRecord) -> Result<(), String>,
{
    dispatch(source, &filter_all(), &RateBudget::new(10, 1), &target(), &mut f, 0)
}

#[test]
fn test_EventSink_closure() {
    let mut seen: Vec<RecordId> = vec![];
    let mut source = VecSource::new(1..=3);
    let acc = dispatch_to_closure(&mut source, |record| {
        seen.push(record.checkpoint);
        if record.checkpoint == 3 {
            return Err("full".to_string());
        }
        Ok(())
    });
    assert_eq!(acc.sent, 2);
    assert_eq!(acc.stop, StopReason::SinkRefused);
    assert_eq!(seen, vec![1, 2, 3]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn test_dispatch_exhausted() {
    let mut source = VecSource::new(121..=125);
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_all(), RateBudget::new(10, 1), &mut sink, 120);
    assert_eq!(acc.stop, StopReason::Exhausted);
    assert_eq!(acc.checkpoint, 125);
    assert_eq!(acc.sent, 5);
    assert_eq!(acc.processed, 5);
    assert_eq!(acc.last_sent, Some(125));
    assert_eq!(acc.discrepancies, 0);
    assert_eq!(acc.error, None);
    assert_eq!(sink.checkpoints(), vec![121, 122, 123, 124, 125]);
    assert_eq!(source.expected, vec![121, 122, 123, 124, 125, 126]);
}

#[test]
fn test_dispatch_empty() {
    let mut source = VecSource::new(vec![]);
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_all(), RateBudget::new(10, 1), &mut sink, 120);
    assert_eq!(acc, CycleAccumulator::new(120));
}

#[test]
fn test_dispatch_sent_budget() {
    let mut source = VecSource::new(121..=150);
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_all(), RateBudget::new(10, 1), &mut sink, 120);
    assert_eq!(acc.stop, StopReason::SentBudget);
    assert_eq!(acc.sent, 10);
    assert_eq!(acc.checkpoint, 130);
    assert_eq!(sink.records.len(), 10);
}

#[test]
fn test_dispatch_processed_budget() {
    let mut source = VecSource::new(1..=100);
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_severity("^Error$"), RateBudget::new(10, 1), &mut sink, 0);
    assert_eq!(acc.stop, StopReason::ProcessedBudget);
    assert_eq!(acc.sent, 0);
    assert_eq!(acc.processed, 40);
    assert_eq!(acc.checkpoint, 40);
    assert_eq!(acc.last_sent, None);
}

#[test]
fn test_dispatch_non_matching_advance_checkpoint() {
    let mut source = VecSource::new(1..=6);
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_severity("warning"), RateBudget::new(10, 1), &mut sink, 0);
    assert_eq!(acc.stop, StopReason::Exhausted);
    assert_eq!(acc.checkpoint, 6);
    assert_eq!(acc.processed, 6);
    assert_eq!(sink.checkpoints(), vec![2, 4, 6]);
    assert_eq!(acc.last_sent, Some(6));
}

#[test]
fn test_dispatch_sink_refuses_sixth() {
    let mut source = VecSource::new(121..=130);
    let mut sink = VecSink::refusing_after(5);
    let acc = run(&mut source, &filter_all(), RateBudget::new(20, 1), &mut sink, 120);
    assert_eq!(acc.stop, StopReason::SinkRefused);
    assert_eq!(acc.sent, 5);
    assert_eq!(acc.processed, 5);
    assert_eq!(acc.checkpoint, 125);
    assert_eq!(acc.last_sent, Some(125));
    assert_eq!(sink.refusals, 1);
}

#[test]
fn test_dispatch_read_error_keeps_last_checkpoint() {
    let mut source = VecSource::new(121..=123);
    source
        .results
        .push_back(ResultFetch::Err(TailError::Read("boom".to_string())));
    source
        .results
        .push_back(ResultFetch::Found(event(125)));
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_all(), RateBudget::new(20, 1), &mut sink, 120);
    assert_eq!(acc.stop, StopReason::ReadError);
    assert_eq!(acc.checkpoint, 123);
    assert_eq!(acc.sent, 3);
    assert_eq!(acc.error, Some(TailError::Read("boom".to_string())));
}

#[test]
fn test_dispatch_discrepancy_trusts_log() {
    let mut source = VecSource::new(vec![121, 122, 130, 131]);
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_all(), RateBudget::new(20, 1), &mut sink, 120);
    assert_eq!(acc.discrepancies, 1);
    assert_eq!(acc.checkpoint, 131);
    assert_eq!(sink.checkpoints(), vec![121, 122, 130, 131]);
    assert_eq!(source.expected, vec![121, 122, 123, 131, 132]);
}

#[test]
fn test_dispatch_stale_record_skipped() {
    let mut source = VecSource::new(vec![121, 119, 122]);
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_all(), RateBudget::new(20, 1), &mut sink, 120);
    assert_eq!(acc.stale, 1);
    assert_eq!(acc.discrepancies, 1);
    assert_eq!(acc.checkpoint, 122);
    assert_eq!(sink.checkpoints(), vec![121, 122]);
}

#[test]
fn test_dispatch_checkpoint_monotonic() {
    let mut source = VecSource::new(vec![1, 2, 5, 3, 6, 7]);
    let mut sink = VecSink::new();
    let acc = run(&mut source, &filter_all(), RateBudget::new(20, 1), &mut sink, 0);
    let sent = sink.checkpoints();
    assert!(sent.windows(2).all(|w| w[0] < w[1]), "{:?}", sent);
    assert_eq!(acc.checkpoint, 7);
}

struct CountingSink {
    sent: usize,
}

impl EventSink for CountingSink {
    fn send(
        &mut self,
        _record: &SinkRecord,
    ) -> Result<(), String> {
        self.sent += 1;
        Ok(())
    }
}

#[test]
fn test_dispatch_dyn_sink() {
    let mut source = VecSource::new(1..=3);
    let mut counting = CountingSink { sent: 0 };
    let sink: &mut dyn EventSink = &mut counting;
    let acc = dispatch(&mut source, &filter_all(), &RateBudget::new(10, 1), &target(), sink, 0);
    assert_eq!(acc.sent, 3);
    assert_eq!(counting.sent, 3);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LegacyRecordSource
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read every event from the oldest record searching for `target`.
fn legacy_read_all(
    events: Vec<SimEvent>,
    target: RecordId,
) -> Vec<RecordId> {
    let log = sim_log(LOG, events);
    let mut api = SimApi::new(&log);
    let mut legacy = api.open_legacy(LOG).unwrap();
    let mut buffer = GrowableRecordBuffer::new(LEGACY_BUFFER_SZ_DEFAULT);
    let mut decoder = LegacyDecoder::new(LOG);
    let mut source = LegacyRecordSource::new(
        &mut legacy,
        &mut buffer,
        api.messages(),
        &mut decoder,
        LOG,
        target,
        0,
    );
    let mut ids: Vec<RecordId> = vec![];
    let mut expected: RecordId = target;
    loop {
        match source.next_event(expected) {
            ResultFetch::Found(event) => {
                assert!(!event.message.is_empty());
                ids.push(event.record_id);
                expected = event.record_id + 1;
            }
            ResultFetch::Done => break,
            ResultFetch::Err(err) => panic!("{}", err),
        }
    }

    ids
}

#[test]
fn test_LegacyRecordSource_searches_target() {
    let ids = legacy_read_all(sim_events(100, 110), 105);
    assert_eq!(ids, (105..=110).collect::<Vec<RecordId>>());
}

#[test]
fn test_LegacyRecordSource_widens_across_wrap() {
    let first: RecordId = 0xFFFF_FFFD;
    let ids = legacy_read_all(sim_events(first, first + 5), 0xFFFF_FFFE);
    assert_eq!(ids, vec![0xFFFF_FFFE, 0xFFFF_FFFF, 0x1_0000_0000, 0x1_0000_0001, 0x1_0000_0002]);
}

#[test]
fn test_LegacyRecordSource_target_after_wrap() {
    let first: RecordId = 0xFFFF_FFFD;
    let ids = legacy_read_all(sim_events(first, first + 5), 0x1_0000_0001);
    assert_eq!(ids, vec![0x1_0000_0001, 0x1_0000_0002]);
}

#[test]
fn test_LegacyRecordSource_target_missing_starts_at_next() {
    let mut events = sim_events(100, 110);
    events.retain(|e| e.record_id != 105);
    let ids = legacy_read_all(events, 105);
    assert_eq!(ids, (106..=110).collect::<Vec<RecordId>>());
}

#[test]
fn test_LegacyRecordSource_small_buffer_grows() {
    let log = sim_log(LOG, sim_events(1, 4));
    let mut api = SimApi::new(&log);
    let mut legacy = api.open_legacy(LOG).unwrap();
    let mut buffer = GrowableRecordBuffer::new(16);
    let mut decoder = LegacyDecoder::new(LOG);
    let mut source = LegacyRecordSource::new(&mut legacy, &mut buffer, api.messages(), &mut decoder, LOG, 1, 0);
    let mut sink = VecSink::new();
    let acc = dispatch(&mut source, &filter_all(), &RateBudget::new(10, 1), &target(), &mut sink, 0);
    assert_eq!(acc.checkpoint, 4);
    assert_eq!(acc.sent, 4);
    assert_eq!(buffer.growths(), 1);
}

#[test]
fn test_LegacyRecordSource_read_error() {
    let log = sim_log(LOG, sim_events(1, 10));
    log.borrow_mut().fail_read_at = Some(6);
    let mut api = SimApi::new(&log);
    let mut legacy = api.open_legacy(LOG).unwrap();
    let mut buffer = GrowableRecordBuffer::new(LEGACY_BUFFER_SZ_DEFAULT);
    let mut decoder = LegacyDecoder::new(LOG);
    let mut source = LegacyRecordSource::new(&mut legacy, &mut buffer, api.messages(), &mut decoder, LOG, 1, 0);
    let mut sink = VecSink::new();
    let acc = dispatch(&mut source, &filter_all(), &RateBudget::new(20, 1), &target(), &mut sink, 0);
    assert_eq!(acc.stop, StopReason::ReadError);
    assert_eq!(acc.checkpoint, 5);
    match acc.error {
        Some(TailError::Read(message)) => {
            assert!(message.starts_with("Cannot read eventlog 'Application': "), "{}", message)
        }
        error => panic!("unexpected {:?}", error),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ModernRecordSource
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn test_ModernRecordSource_batches() {
    let count: RecordId = EVT_ARRAY_SIZE as RecordId * 2 + 50;
    let log = sim_log(LOG, sim_events(1, count));
    let mut api = SimApi::new(&log);
    let mut modern = api.open_modern(LOG).unwrap();
    modern.query(Some(0)).unwrap();
    let mut buffer = GrowableRecordBuffer::new(RENDER_BUFFER_SZ_DEFAULT);
    let mut decoder = ModernDecoder::new();
    let mut source = ModernRecordSource::new(&mut modern, &mut buffer, &mut decoder, LOG);
    let mut sink = VecSink::new();
    let acc = dispatch(&mut source, &filter_all(), &RateBudget::new(1000, 1), &target(), &mut sink, 0);
    assert_eq!(acc.stop, StopReason::Exhausted);
    assert_eq!(acc.checkpoint, count);
    assert_eq!(acc.sent, count);
    // three batches then the end of the query
    assert_eq!(source.batches, 4);
}

#[test]
fn test_ModernRecordSource_render_error() {
    let log = sim_log(LOG, sim_events(1, 10));
    log.borrow_mut().fail_render_at = Some(4);
    let mut api = SimApi::new(&log);
    let mut modern = api.open_modern(LOG).unwrap();
    modern.query(Some(0)).unwrap();
    let mut buffer = GrowableRecordBuffer::new(RENDER_BUFFER_SZ_DEFAULT);
    let mut decoder = ModernDecoder::new();
    let mut source = ModernRecordSource::new(&mut modern, &mut buffer, &mut decoder, LOG);
    let mut sink = VecSink::new();
    let acc = dispatch(&mut source, &filter_all(), &RateBudget::new(20, 1), &target(), &mut sink, 0);
    assert_eq!(acc.stop, StopReason::ReadError);
    assert_eq!(acc.checkpoint, 3);
    match acc.error {
        Some(TailError::Read(message)) => {
            assert!(message.starts_with("EvtRender failed for eventlog 'Application': "), "{}", message);
            assert!(message.ends_with("EventRecordID:4"), "{}", message);
        }
        error => panic!("unexpected {:?}", error),
    }
}

#[test]
fn test_ModernRecordSource_next_error() {
    let log = sim_log(LOG, sim_events(1, 10));
    let mut api = SimApi::new(&log);
    let mut modern = api.open_modern(LOG).unwrap();
    modern.query(Some(0)).unwrap();
    log.borrow_mut().fail_next = true;
    let mut buffer = GrowableRecordBuffer::new(RENDER_BUFFER_SZ_DEFAULT);
    let mut decoder = ModernDecoder::new();
    let mut source = ModernRecordSource::new(&mut modern, &mut buffer, &mut decoder, LOG);
    let mut sink = VecSink::new();
    let acc = dispatch(&mut source, &filter_all(), &RateBudget::new(20, 1), &target(), &mut sink, 0);
    assert_eq!(acc.stop, StopReason::ReadError);
    assert_eq!(acc.checkpoint, 0);
    assert!(matches!(acc.error, Some(TailError::Read(_))));
}
