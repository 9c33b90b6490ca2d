//! Burst extraction from ordered trace records
//!
//! Records flow from a [`RecordSource`](crate::engine::RecordSource) through
//! the [`BurstAssembler`] into a [`BurstSink`](crate::engine::BurstSink).

mod assembler;
mod counters;
mod reader;

pub use assembler::{AssemblerConfig, AssemblySummary, BurstAssembler};
pub use counters::CounterFixup;
pub use reader::{write_records, JsonLinesSource};
