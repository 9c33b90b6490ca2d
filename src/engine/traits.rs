//! Core trait definitions for the pluggable pipeline stages

use crate::bursts::ExtractedBurst;
use crate::clustering::{Partition, Point};
use crate::error::{ClusteringError, ExtractionError};
use crate::types::TraceRecord;

// =============================================================================
// Record Source Trait
// =============================================================================

/// Pull interface over an ordered stream of trace records
///
/// Records must arrive in non-decreasing timestamp order per task/thread.
pub trait RecordSource {
    /// Next record, `None` at end of stream
    fn next_record(&mut self) -> Result<Option<TraceRecord>, ExtractionError>;
}

impl RecordSource for std::vec::IntoIter<TraceRecord> {
    fn next_record(&mut self) -> Result<Option<TraceRecord>, ExtractionError> {
        Ok(self.next())
    }
}

// =============================================================================
// Burst Sink Trait
// =============================================================================

/// Receiver of sealed bursts
pub trait BurstSink {
    /// Called exactly once per sealed burst, in sealing order
    fn new_burst(&mut self, burst: ExtractedBurst) -> Result<(), ExtractionError>;

    /// Called once when the record stream is exhausted
    fn extraction_finished(&mut self) -> Result<(), ExtractionError> {
        Ok(())
    }
}

impl BurstSink for Vec<ExtractedBurst> {
    fn new_burst(&mut self, burst: ExtractedBurst) -> Result<(), ExtractionError> {
        self.push(burst);
        Ok(())
    }
}

// =============================================================================
// Clustering Algorithm Trait
// =============================================================================

/// Clustering backend
///
/// Implementations are built from a string parameter map by the
/// [`AlgorithmRegistry`](super::registry::AlgorithmRegistry) and validate
/// that map at construction, so `run` never fails on configuration.
pub trait ClusteringAlgorithm: Send + Sync {
    /// Human readable name including the effective parameters
    fn name(&self) -> String;

    /// Cluster `points`, returning one id per point in input order
    ///
    /// An empty point set yields an empty partition.
    fn run(&self, points: &[Point]) -> Result<Partition, ClusteringError>;

    /// Whether the backend coordinates several ranks by itself
    fn is_distributed(&self) -> bool {
        false
    }

    /// Whether the backend can label points as noise
    fn has_noise(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventRecord, TraceRecord};

    #[test]
    fn test_vec_source_drains_in_order() {
        let records = vec![
            TraceRecord::Event(EventRecord {
                task: 0,
                thread: 0,
                line: 1,
                timestamp: 5,
                events: vec![(1, 1)],
            }),
            TraceRecord::Event(EventRecord {
                task: 0,
                thread: 0,
                line: 2,
                timestamp: 6,
                events: vec![(1, 2)],
            }),
        ];
        let mut source = records.into_iter();
        assert_eq!(source.next_record().unwrap().map(|r| r.line()), Some(1));
        assert_eq!(source.next_record().unwrap().map(|r| r.line()), Some(2));
        assert_eq!(source.next_record().unwrap(), None);
    }
}
