//! Stream-stitching state machine turning trace records into bursts
//!
//! Each task/thread owns two slots: the ongoing burst and at most one
//! buffered burst whose running state began exactly where the ongoing one
//! ends. Events stamped with that shared timestamp belong to the ending
//! burst, so the buffered burst only becomes ongoing once a later record
//! proves the ending burst can receive nothing more.
//!
//! ```text
//!   Idle ──RUNNING──▶ Open ──RUNNING at end──▶ OpenWithBuffered
//!    ▲                 │                          │
//!    └──seal (gap)─────┘◀──seal + promote─────────┘
//! ```

use super::counters::CounterFixup;
use crate::bursts::ExtractedBurst;
use crate::engine::traits::{BurstSink, RecordSource};
use crate::error::{inverted_interval, ExtractionError};
use crate::metrics;
use crate::types::{
    BoundaryEvents, EventRecord, EventType, EventValue, EventsData, Line, StateRecord, TaskId,
    ThreadId, Timestamp, TraceRecord, HWC_GROUP_CHANGE_TYPE, RUNNING_STATE,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Assembler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// State value that opens a burst
    pub running_state: u32,
    /// Event type that forces the ongoing burst to close
    pub hwc_group_change_type: EventType,
    /// Multiplier from trace time units to durations
    pub time_factor: u64,
    /// Overflow correction for selected counters
    pub fixup: CounterFixup,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            running_state: RUNNING_STATE,
            hwc_group_change_type: HWC_GROUP_CHANGE_TYPE,
            time_factor: 1,
            fixup: CounterFixup::legacy(),
        }
    }
}

/// Counters of one extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblySummary {
    /// State records consumed
    pub states: u64,
    /// Event records consumed
    pub events: u64,
    /// Bursts sealed and handed to the sink
    pub bursts: u64,
}

/// Burst under construction
#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskDataContainer {
    line: Line,
    begin: Timestamp,
    end: Timestamp,
    events: EventsData,
    boundary_events: BoundaryEvents,
}

impl TaskDataContainer {
    fn open(state: &StateRecord) -> Self {
        Self {
            line: state.line,
            begin: state.begin,
            end: state.end,
            events: EventsData::new(),
            boundary_events: BoundaryEvents::new(),
        }
    }

    /// First occurrence stores, later ones accumulate
    fn record(&mut self, event_type: EventType, value: EventValue) {
        self.events
            .entry(event_type)
            .and_modify(|v| *v = v.wrapping_add(value))
            .or_insert(value);
    }

    fn seal(self, task: TaskId, thread: ThreadId, time_factor: u64) -> ExtractedBurst {
        ExtractedBurst {
            task,
            thread,
            line: self.line,
            begin: self.begin,
            end: self.end,
            duration: (self.end - self.begin).saturating_mul(time_factor),
            events: self.events,
            boundary_events: self.boundary_events,
        }
    }
}

#[derive(Debug, Default)]
struct ObjectSlots {
    current: Option<TaskDataContainer>,
    future: Option<TaskDataContainer>,
}

/// Burst assembler
///
/// Feed records with [`push`](Self::push) and close the stream with
/// [`finish`](Self::finish), or drive a whole [`RecordSource`] with
/// [`extract`](Self::extract).
#[derive(Debug)]
pub struct BurstAssembler {
    config: AssemblerConfig,
    objects: BTreeMap<(TaskId, ThreadId), ObjectSlots>,
    summary: AssemblySummary,
    finished: bool,
}

impl BurstAssembler {
    /// Create an assembler with no open bursts
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            objects: BTreeMap::new(),
            summary: AssemblySummary::default(),
            finished: false,
        }
    }

    /// Counters so far
    pub fn summary(&self) -> AssemblySummary {
        self.summary
    }

    /// Consume one record
    pub fn push(&mut self, record: &TraceRecord, sink: &mut dyn BurstSink) -> Result<(), ExtractionError> {
        if self.finished {
            return Err(ExtractionError::parse(record.line(), "record after end of stream"));
        }

        match record {
            TraceRecord::State(state) => {
                self.summary.states += 1;
                metrics::record_input("state");
                self.on_state(state, sink)
            }
            TraceRecord::Event(event) => {
                self.summary.events += 1;
                metrics::record_input("event");
                self.on_event(event, sink)
            }
        }
    }

    fn on_state(&mut self, state: &StateRecord, sink: &mut dyn BurstSink) -> Result<(), ExtractionError> {
        if state.end < state.begin {
            return Err(inverted_interval(state.line, state.begin, state.end));
        }
        if !state.is_running(self.config.running_state) {
            return Ok(());
        }

        let Self {
            config,
            objects,
            summary,
            ..
        } = self;
        let key = (state.task, state.thread);
        let slots = objects.entry(key).or_default();

        loop {
            let Some((begin, end)) = slots.current.as_ref().map(|c| (c.begin, c.end)) else {
                slots.current = Some(TaskDataContainer::open(state));
                return Ok(());
            };

            if state.begin < begin {
                return Err(ExtractionError::parse(
                    state.line,
                    format!(
                        "running state at {} precedes ongoing burst starting at {}",
                        state.begin, begin
                    ),
                ));
            }

            if state.begin > end {
                seal_current(slots, key, config.time_factor, sink, summary)?;
                continue;
            }

            if state.begin < end {
                return Err(ExtractionError::parse(
                    state.line,
                    format!(
                        "running state at {} overlaps ongoing burst [{}, {}]",
                        state.begin, begin, end
                    ),
                ));
            }

            // Touches the ongoing burst's end
            match slots.future.as_ref().map(|f| (f.begin, f.end)) {
                None => {
                    slots.future = Some(TaskDataContainer::open(state));
                    return Ok(());
                }
                Some((_, future_end)) if future_end == state.begin => {
                    // Zero-length buffered burst already finished
                    seal_current(slots, key, config.time_factor, sink, summary)?;
                }
                Some((future_begin, future_end)) => {
                    return Err(ExtractionError::parse(
                        state.line,
                        format!(
                            "running state at {} overlaps buffered burst [{}, {}]",
                            state.begin, future_begin, future_end
                        ),
                    ));
                }
            }
        }
    }

    fn on_event(&mut self, event: &EventRecord, sink: &mut dyn BurstSink) -> Result<(), ExtractionError> {
        if event.events.is_empty() {
            return Err(ExtractionError::parse(event.line, "event record without type/value pairs"));
        }

        let Self {
            config,
            objects,
            summary,
            ..
        } = self;
        let key = (event.task, event.thread);
        let Some(slots) = objects.get_mut(&key) else {
            trace!(line = event.line, "Event outside any burst");
            return Ok(());
        };

        let ts = event.timestamp;

        // Anything that ended before this timestamp can receive nothing more
        while slots.current.as_ref().is_some_and(|c| c.end < ts) {
            seal_current(slots, key, config.time_factor, sink, summary)?;
        }

        for &(event_type, value) in &event.events {
            let Some((begin, end)) = slots.current.as_ref().map(|c| (c.begin, c.end)) else {
                break;
            };

            if ts == end && event_type == config.hwc_group_change_type {
                debug!(
                    task = key.0,
                    thread = key.1,
                    timestamp = ts,
                    "Counter group change closes burst"
                );
                seal_current(slots, key, config.time_factor, sink, summary)?;
                continue;
            }

            let value = config.fixup.apply(event_type, value);
            if let Some(current) = slots.current.as_mut() {
                if ts == end {
                    current.record(event_type, value);
                    current.boundary_events.insert(event_type);
                } else if begin < ts && ts < end {
                    current.record(event_type, value);
                }
                // At `begin` the event marks the entry and is not a sample
            }
        }

        Ok(())
    }

    /// Seal every open burst and notify the sink that the stream ended
    ///
    /// Objects are flushed in task/thread order, ongoing burst first.
    pub fn finish(&mut self, sink: &mut dyn BurstSink) -> Result<AssemblySummary, ExtractionError> {
        if self.finished {
            return Ok(self.summary);
        }

        let Self {
            config,
            objects,
            summary,
            ..
        } = self;
        for (&key, slots) in objects.iter_mut() {
            while slots.current.is_some() {
                seal_current(slots, key, config.time_factor, sink, summary)?;
            }
        }
        objects.clear();

        self.finished = true;
        sink.extraction_finished()?;

        debug!(
            states = self.summary.states,
            events = self.summary.events,
            bursts = self.summary.bursts,
            "Burst extraction finished"
        );
        Ok(self.summary)
    }

    /// Drain `source` and finish
    pub fn extract<R: RecordSource + ?Sized>(
        &mut self,
        source: &mut R,
        sink: &mut dyn BurstSink,
    ) -> Result<AssemblySummary, ExtractionError> {
        while let Some(record) = source.next_record()? {
            self.push(&record, sink)?;
        }
        self.finish(sink)
    }
}

/// Seal the ongoing burst of `slots`, emit it and promote the buffered one
fn seal_current(
    slots: &mut ObjectSlots,
    key: (TaskId, ThreadId),
    time_factor: u64,
    sink: &mut dyn BurstSink,
    summary: &mut AssemblySummary,
) -> Result<(), ExtractionError> {
    if let Some(container) = slots.current.take() {
        let burst = container.seal(key.0, key.1, time_factor);
        trace!(
            task = burst.task,
            thread = burst.thread,
            begin = burst.begin,
            end = burst.end,
            "Sealed burst"
        );
        sink.new_burst(burst)?;
        summary.bursts += 1;
    }
    slots.current = slots.future.take();
    Ok(())
}
