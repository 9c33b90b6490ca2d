//! Correction of counters with broken overflow behaviour

use crate::types::{EventType, EventValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Overflow fixup applied to selected counter types before accumulation
///
/// Some hardware reports these counters with garbage in the upper 32 bits
/// and a one's-complement low word once it overflows. The fixup keeps the
/// sign-extended low word and flips it when bit 30 marks an overflow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterFixup {
    event_types: BTreeSet<EventType>,
}

impl CounterFixup {
    /// PM_CMPLU_STALL_FDIV and PM_CMPLU_STALL_ERAT_MISS
    pub const LEGACY_OVERFLOW_TYPES: [EventType; 2] = [42_001_226, 42_001_219];

    /// Fixup for the given event types
    pub fn new(event_types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            event_types: event_types.into_iter().collect(),
        }
    }

    /// Fixup for the counters known to be affected
    pub fn legacy() -> Self {
        Self::new(Self::LEGACY_OVERFLOW_TYPES)
    }

    /// Whether `event_type` is corrected
    pub fn applies_to(&self, event_type: EventType) -> bool {
        self.event_types.contains(&event_type)
    }

    /// Corrected value for `event_type`, unchanged when not covered
    pub fn apply(&self, event_type: EventType, value: EventValue) -> EventValue {
        if self.applies_to(event_type) {
            fix_overflow(value)
        } else {
            value
        }
    }

    /// Covered event types
    pub fn event_types(&self) -> impl Iterator<Item = EventType> + '_ {
        self.event_types.iter().copied()
    }
}

fn fix_overflow(value: EventValue) -> EventValue {
    // Sign-extend the low 32 bits
    let low = (value as u32) as i32 as i64;
    let fixed = if (low >> 30) >= 1 {
        low ^ 0xFFFF_FFFF
    } else {
        low
    };
    fixed as u64
}
