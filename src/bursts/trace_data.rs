//! Burst store fed by the assembler
//!
//! `TraceData` is the sink of burst extraction. It classifies every sealed
//! burst against the clustering parameters, numbers it, tracks the global
//! range of every dimension and, once the stream ends, works out which
//! bursts this rank clusters and normalizes their coordinates.

use super::burst::{Burst, BurstKind, ExtractedBurst};
use super::parameters::ParameterSet;
use crate::clustering::{range_normalize, Point};
use crate::distributed::{validate_rank, TaskDistribution};
use crate::engine::traits::BurstSink;
use crate::error::{ExtractionError, ValidationError};
use crate::metrics;
use crate::types::{Line, TaskId, DURATION_EVENT_TYPE};
use tracing::{debug, info};

/// Burst filtering and normalization settings
#[derive(Debug, Clone, PartialEq)]
pub struct TraceDataConfig {
    /// Bursts shorter than this are kept but not clustered
    pub duration_filter: u64,
    /// Range-normalize coordinates once all bursts are known
    pub normalize: bool,
    /// This process's rank
    pub rank: usize,
    /// Number of cooperating ranks
    pub ranks: usize,
}

impl Default for TraceDataConfig {
    fn default() -> Self {
        Self {
            duration_filter: 0,
            normalize: true,
            rank: 0,
            ranks: 1,
        }
    }
}

/// Number of bursts per classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BurstCounts {
    /// Usable for clustering
    pub complete: u64,
    /// Some parameter had no data
    pub missing_data: u64,
    /// Shorter than the duration filter
    pub duration_filtered: u64,
    /// Some parameter out of range
    pub range_filtered: u64,
    /// Dropped as invalid
    pub discarded: u64,
}

impl BurstCounts {
    fn add(&mut self, kind: BurstKind) {
        match kind {
            BurstKind::Complete => self.complete += 1,
            BurstKind::MissingData => self.missing_data += 1,
            BurstKind::DurationFiltered => self.duration_filtered += 1,
            BurstKind::RangeFiltered => self.range_filtered += 1,
        }
    }

    /// Bursts accepted into the store
    pub fn total(&self) -> u64 {
        self.complete + self.missing_data + self.duration_filtered + self.range_filtered
    }
}

/// Store of extracted bursts
#[derive(Debug)]
pub struct TraceData {
    parameters: ParameterSet,
    config: TraceDataConfig,
    next_instance: u64,
    bursts: Vec<Burst>,
    complete: Vec<usize>,
    clustering: Vec<usize>,
    min_values: Vec<f64>,
    max_values: Vec<f64>,
    max_task: Option<TaskId>,
    distribution: Option<TaskDistribution>,
    counts: BurstCounts,
    normalized: bool,
}

impl TraceData {
    /// Create an empty store
    pub fn new(parameters: ParameterSet, config: TraceDataConfig) -> Result<Self, ValidationError> {
        validate_rank(config.rank, config.ranks)?;
        if parameters.is_empty() {
            return Err(ValidationError::MissingField("parameters".to_string()));
        }

        let dims = parameters.len();
        Ok(Self {
            parameters,
            config,
            next_instance: 0,
            bursts: Vec::new(),
            complete: Vec::new(),
            clustering: Vec::new(),
            min_values: vec![f64::INFINITY; dims],
            max_values: vec![f64::NEG_INFINITY; dims],
            max_task: None,
            distribution: None,
            counts: BurstCounts::default(),
            normalized: false,
        })
    }

    /// Clustering parameters
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Dimension names in coordinate order
    pub fn dimension_names(&self) -> Vec<String> {
        self.parameters.names()
    }

    /// Every stored burst, in sealing order
    pub fn bursts(&self) -> &[Burst] {
        &self.bursts
    }

    /// Complete bursts known to this rank, in sealing order
    ///
    /// The collector knows every complete burst of the trace, other ranks
    /// only those of their own tasks.
    pub fn complete_bursts(&self) -> Vec<&Burst> {
        self.complete.iter().map(|&i| &self.bursts[i]).collect()
    }

    /// Complete bursts clustered by this rank
    pub fn clustering_bursts(&self) -> Vec<&Burst> {
        self.clustering.iter().map(|&i| &self.bursts[i]).collect()
    }

    /// Points of the bursts clustered by this rank
    pub fn clustering_points(&self) -> Vec<Point> {
        self.clustering
            .iter()
            .map(|&i| self.bursts[i].point(self.normalized))
            .collect()
    }

    /// Points of every complete burst known to this rank
    pub fn complete_points(&self) -> Vec<Point> {
        self.complete
            .iter()
            .map(|&i| self.bursts[i].point(self.normalized))
            .collect()
    }

    /// Source lines of the bursts clustered by this rank
    pub fn clustering_lines(&self) -> Vec<Line> {
        self.clustering.iter().map(|&i| self.bursts[i].line).collect()
    }

    /// Source lines of every complete burst known to this rank
    pub fn complete_lines(&self) -> Vec<Line> {
        self.complete.iter().map(|&i| self.bursts[i].line).collect()
    }

    /// Task distribution, available once extraction finished
    pub fn distribution(&self) -> Option<&TaskDistribution> {
        self.distribution.as_ref()
    }

    /// Classification counts
    pub fn counts(&self) -> BurstCounts {
        self.counts
    }

    /// Lowest processed value of every dimension over complete bursts
    pub fn min_values(&self) -> &[f64] {
        &self.min_values
    }

    /// Highest processed value of every dimension over complete bursts
    pub fn max_values(&self) -> &[f64] {
        &self.max_values
    }

    /// Whether coordinates have been range normalized
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Whether the stream ended
    pub fn is_finished(&self) -> bool {
        self.distribution.is_some()
    }

    fn update_ranges(&mut self, values: &[f64]) {
        for (i, &v) in values.iter().enumerate() {
            if v < self.min_values[i] {
                self.min_values[i] = v;
            }
            if v > self.max_values[i] {
                self.max_values[i] = v;
            }
        }
    }

    /// Second normalization pass over the complete bursts
    fn normalize(&mut self) {
        let factors = self.parameters.factors();
        for &i in &self.complete {
            let burst = &mut self.bursts[i];
            for (d, value) in burst.dimensions.iter_mut().enumerate() {
                *value = range_normalize(*value, self.min_values[d], self.max_values[d], factors[d]);
            }
        }
        self.normalized = true;
    }
}

impl BurstSink for TraceData {
    fn new_burst(&mut self, mut burst: ExtractedBurst) -> Result<(), ExtractionError> {
        if self.is_finished() {
            return Err(ExtractionError::Sink(format!(
                "burst at line {} arrived after extraction finished",
                burst.line
            )));
        }

        if burst.line == 0 && burst.duration == 0 {
            self.counts.discarded += 1;
            return Ok(());
        }

        burst.events.insert(DURATION_EVENT_TYPE, burst.duration);
        let evaluation = self.parameters.evaluate(&burst.events);

        let kind = match evaluation.kind {
            BurstKind::MissingData => BurstKind::MissingData,
            _ if burst.duration < self.config.duration_filter => BurstKind::DurationFiltered,
            other => other,
        };

        if kind == BurstKind::Complete {
            self.update_ranges(&evaluation.processed);
        }

        let instance = self.next_instance;
        self.next_instance += 1;
        self.max_task = Some(self.max_task.map_or(burst.task, |t| t.max(burst.task)));
        self.counts.add(kind);
        metrics::record_burst(kind.as_str());

        if kind == BurstKind::Complete {
            self.complete.push(self.bursts.len());
        }
        self.bursts.push(Burst {
            instance,
            task: burst.task,
            thread: burst.thread,
            line: burst.line,
            begin: burst.begin,
            end: burst.end,
            duration: burst.duration,
            events: burst.events,
            boundary_events: burst.boundary_events,
            raw_dimensions: evaluation.raw,
            dimensions: evaluation.processed,
            kind,
        });

        Ok(())
    }

    fn extraction_finished(&mut self) -> Result<(), ExtractionError> {
        if self.is_finished() {
            return Ok(());
        }

        let tasks = self.max_task.map_or(0, |t| t + 1);
        let distribution = TaskDistribution::new(self.config.rank, self.config.ranks, tasks)
            .map_err(|e| ExtractionError::Sink(e.to_string()))?;

        if !distribution.is_collector() {
            self.bursts.retain(|b| distribution.owns(b.task));
            self.complete = self
                .bursts
                .iter()
                .enumerate()
                .filter(|(_, b)| b.is_complete())
                .map(|(i, _)| i)
                .collect();
        }

        self.clustering = self
            .complete
            .iter()
            .copied()
            .filter(|&i| distribution.owns(self.bursts[i].task))
            .collect();

        if self.config.normalize {
            self.normalize();
        }
        self.distribution = Some(distribution);

        info!(
            rank = self.config.rank,
            bursts = self.bursts.len(),
            complete = self.complete.len(),
            clustering = self.clustering.len(),
            "Burst store ready"
        );
        debug!(counts = ?self.counts, "Burst classification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bursts::ClusteringParameter;
    use crate::types::{BoundaryEvents, EventsData};

    fn burst(task: TaskId, line: Line, duration: u64, instructions: Option<u64>) -> ExtractedBurst {
        let mut events = EventsData::new();
        if let Some(v) = instructions {
            events.insert(100, v);
        }
        ExtractedBurst {
            task,
            thread: 0,
            line,
            begin: line * 10,
            end: line * 10 + duration,
            duration,
            events,
            boundary_events: BoundaryEvents::new(),
        }
    }

    fn store(config: TraceDataConfig) -> TraceData {
        let parameters = ParameterSet::new(vec![
            ClusteringParameter::single("Instructions", 100),
            ClusteringParameter::duration(),
        ])
        .unwrap();
        TraceData::new(parameters, config).unwrap()
    }

    #[test]
    fn test_classification_and_instances() {
        let mut data = store(TraceDataConfig {
            duration_filter: 5,
            normalize: false,
            ..TraceDataConfig::default()
        });

        data.new_burst(burst(0, 1, 10, Some(50))).unwrap();
        data.new_burst(burst(0, 2, 10, None)).unwrap();
        data.new_burst(burst(0, 3, 2, Some(50))).unwrap();
        data.new_burst(burst(0, 0, 0, Some(50))).unwrap();
        data.extraction_finished().unwrap();

        let counts = data.counts();
        assert_eq!(counts.complete, 1);
        assert_eq!(counts.missing_data, 1);
        assert_eq!(counts.duration_filtered, 1);
        assert_eq!(counts.discarded, 1);

        let instances: Vec<u64> = data.bursts().iter().map(|b| b.instance).collect();
        assert_eq!(instances, vec![0, 1, 2]);
        assert_eq!(data.bursts()[0].events.get(&DURATION_EVENT_TYPE), Some(&10));
        assert_eq!(data.clustering_points(), vec![Point::new(vec![50.0, 10.0])]);
    }

    #[test]
    fn test_normalization() {
        let mut data = store(TraceDataConfig::default());
        data.new_burst(burst(0, 1, 10, Some(0))).unwrap();
        data.new_burst(burst(0, 2, 10, Some(50))).unwrap();
        data.new_burst(burst(0, 3, 10, Some(100))).unwrap();
        data.extraction_finished().unwrap();

        assert!(data.is_normalized());
        let points = data.clustering_points();
        assert_eq!(points[0].as_slice(), &[0.0, 0.0]);
        assert_eq!(points[1].as_slice(), &[0.5, 0.0]);
        assert_eq!(points[2].as_slice(), &[1.0, 0.0]);
        assert!(points.iter().all(|p| p.is_normalized()));
    }

    #[test]
    fn test_rank_slices() {
        let mut collector = store(TraceDataConfig {
            rank: 0,
            ranks: 2,
            ..TraceDataConfig::default()
        });
        let mut worker = store(TraceDataConfig {
            rank: 1,
            ranks: 2,
            ..TraceDataConfig::default()
        });

        for sink in [&mut collector, &mut worker] {
            for task in 0..4 {
                sink.new_burst(burst(task, task as u64 + 1, 10, Some(task as u64))).unwrap();
            }
            sink.extraction_finished().unwrap();
        }

        assert_eq!(collector.complete_lines(), vec![1, 2, 3, 4]);
        assert_eq!(collector.clustering_lines(), vec![1, 2]);
        assert_eq!(worker.complete_lines(), vec![3, 4]);
        assert_eq!(worker.clustering_lines(), vec![3, 4]);

        // Both ranks normalize against the global range
        assert_eq!(worker.clustering_points()[1].get(0), Some(1.0));
    }

    #[test]
    fn test_burst_after_finish_rejected() {
        let mut data = store(TraceDataConfig::default());
        data.extraction_finished().unwrap();
        assert!(matches!(
            data.new_burst(burst(0, 1, 10, Some(1))),
            Err(ExtractionError::Sink(_))
        ));
    }

    #[test]
    fn test_invalid_rank_rejected() {
        let parameters = ParameterSet::new(vec![ClusteringParameter::duration()]).unwrap();
        assert!(TraceData::new(
            parameters,
            TraceDataConfig {
                rank: 3,
                ranks: 2,
                ..TraceDataConfig::default()
            }
        )
        .is_err());
    }
}
