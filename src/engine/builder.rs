//! Analysis builder and pipeline orchestration
//!
//! [`TraceClustering`] wires the stages together:
//!
//! 1. extraction: records are assembled into bursts stored in [`TraceData`]
//! 2. clustering: the configured backend runs over this rank's points
//! 3. reconciliation (multi-rank only): rank 0 gathers a global partition
//! 4. statistics: per-cluster aggregates, ids renumbered by duration

use super::registry::AlgorithmRegistry;
use super::traits::{ClusteringAlgorithm, RecordSource};
use crate::bursts::{Burst, BurstCounts, ClusteringParameter, ParameterSet, TraceData, TraceDataConfig};
use crate::clustering::{ClusteringStatistics, Dbscan, KDistanceCurve, Partition};
use crate::distributed::{PartitionReconciler, Transport};
use crate::error::{Error, ExtractionError, ReconciliationError, Result};
use crate::extraction::{AssemblerConfig, AssemblySummary, BurstAssembler};
use crate::metrics;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Builder for a [`TraceClustering`] run
pub struct TraceClusteringBuilder {
    parameters: Vec<ClusteringParameter>,
    assembler: AssemblerConfig,
    trace_data: TraceDataConfig,
    algorithm: String,
    algorithm_parameters: BTreeMap<String, String>,
    registry: AlgorithmRegistry,
}

impl TraceClusteringBuilder {
    /// Create a builder with default extraction settings and DBSCAN
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            assembler: AssemblerConfig::default(),
            trace_data: TraceDataConfig::default(),
            algorithm: Dbscan::NAME.to_string(),
            algorithm_parameters: BTreeMap::new(),
            registry: AlgorithmRegistry::new(),
        }
    }

    /// Add one clustering dimension
    pub fn with_parameter(mut self, parameter: ClusteringParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Replace the clustering dimensions
    pub fn with_parameters(mut self, parameters: Vec<ClusteringParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set burst extraction settings
    pub fn with_assembler_config(mut self, config: AssemblerConfig) -> Self {
        self.assembler = config;
        self
    }

    /// Set burst filtering, normalization and rank settings
    pub fn with_trace_data_config(mut self, config: TraceDataConfig) -> Self {
        self.trace_data = config;
        self
    }

    /// Set this process's rank among `ranks`
    pub fn with_rank(mut self, rank: usize, ranks: usize) -> Self {
        self.trace_data.rank = rank;
        self.trace_data.ranks = ranks;
        self
    }

    /// Select the clustering backend and its parameters
    pub fn with_algorithm(mut self, name: impl Into<String>, parameters: BTreeMap<String, String>) -> Self {
        self.algorithm = name.into();
        self.algorithm_parameters = parameters;
        self
    }

    /// Use DBSCAN with the given parameters
    pub fn with_dbscan(self, epsilon: f64, min_points: usize) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(Dbscan::EPSILON_KEY.to_string(), epsilon.to_string());
        parameters.insert(Dbscan::MIN_POINTS_KEY.to_string(), min_points.to_string());
        self.with_algorithm(Dbscan::NAME, parameters)
    }

    /// Resolve backends through `registry`
    pub fn with_registry(mut self, registry: AlgorithmRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Validate the settings and build the pipeline
    pub fn build(self) -> Result<TraceClustering> {
        if self.parameters.is_empty() {
            return Err(Error::Configuration("No clustering parameters configured".to_string()));
        }

        let parameters = ParameterSet::new(self.parameters)?;
        let data = TraceData::new(parameters, self.trace_data)?;
        let algorithm = self
            .registry
            .create(&self.algorithm, &self.algorithm_parameters)?;

        info!(
            algorithm = %algorithm.name(),
            dimensions = data.parameters().len(),
            "Trace clustering configured"
        );

        Ok(TraceClustering {
            assembler: BurstAssembler::new(self.assembler),
            data,
            algorithm,
            summary: None,
            local: None,
            global: None,
        })
    }
}

impl Default for TraceClusteringBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a complete analysis
#[derive(Debug, Clone)]
pub struct ClusteringReport {
    /// Backend description
    pub algorithm: String,
    /// Record and burst counts of the extraction
    pub summary: AssemblySummary,
    /// Burst classification counts
    pub counts: BurstCounts,
    /// Clustering dimension names
    pub dimension_names: Vec<String>,
    /// Clustered bursts, parallel to `partition`
    pub bursts: Vec<Burst>,
    /// Cluster of every burst, renumbered by descending total duration
    pub partition: Partition,
    /// Statistics of the renumbered clusters
    pub statistics: ClusteringStatistics,
}

/// One analysis pipeline
pub struct TraceClustering {
    assembler: BurstAssembler,
    data: TraceData,
    algorithm: Box<dyn ClusteringAlgorithm>,
    summary: Option<AssemblySummary>,
    local: Option<Partition>,
    global: Option<Partition>,
}

impl TraceClustering {
    /// Start building a pipeline
    pub fn builder() -> TraceClusteringBuilder {
        TraceClusteringBuilder::new()
    }

    /// Burst store
    pub fn data(&self) -> &TraceData {
        &self.data
    }

    /// Backend description
    pub fn algorithm_name(&self) -> String {
        self.algorithm.name()
    }

    /// Partition of this rank's clustering slice
    pub fn local_partition(&self) -> Option<&Partition> {
        self.local.as_ref()
    }

    /// Partition over every complete burst, on the collector after reconciliation
    pub fn global_partition(&self) -> Option<&Partition> {
        self.global.as_ref()
    }

    /// Extract bursts from `source` into the store
    pub fn extract<R: RecordSource + ?Sized>(&mut self, source: &mut R) -> Result<AssemblySummary> {
        let start = Instant::now();
        let summary = self.assembler.extract(source, &mut self.data)?;
        metrics::record_stage("extraction", start.elapsed());

        if summary.bursts == 0 {
            return Err(ExtractionError::NoBursts.into());
        }

        info!(
            states = summary.states,
            events = summary.events,
            bursts = summary.bursts,
            "Extraction finished"
        );
        self.summary = Some(summary);
        Ok(summary)
    }

    /// Cluster this rank's slice
    pub fn cluster(&mut self) -> Result<&Partition> {
        if !self.data.is_finished() {
            return Err(Error::Configuration("Bursts must be extracted before clustering".to_string()));
        }

        let points = self.data.clustering_points();
        info!(
            algorithm = %self.algorithm.name(),
            points = points.len(),
            "Clustering started"
        );

        let start = Instant::now();
        let partition = self.algorithm.run(&points)?;
        metrics::record_stage("clustering", start.elapsed());

        info!(
            clusters = partition.cluster_count(),
            noise = partition.has_noise(),
            "Clustering finished"
        );
        Ok(self.local.insert(partition))
    }

    /// Gather the ranks' partitions at the collector
    ///
    /// Returns the global partition on the collector and `None` on workers.
    pub fn reconcile(&mut self, transport: &mut dyn Transport) -> Result<Option<&Partition>> {
        let local = self
            .local
            .as_ref()
            .ok_or_else(|| ReconciliationError::Protocol("local clustering has not run".to_string()))?;

        let global = PartitionReconciler::new(transport).reconcile(
            local,
            &self.data.clustering_lines(),
            &self.data.complete_lines(),
        )?;

        match global {
            Some(partition) => Ok(Some(self.global.insert(partition))),
            None => Ok(None),
        }
    }

    /// Bursts described by the result partition, parallel to it
    fn result(&self) -> Result<(Vec<&Burst>, &Partition)> {
        match (&self.global, &self.local) {
            (Some(global), _) => Ok((self.data.complete_bursts(), global)),
            (None, Some(local)) => Ok((self.data.clustering_bursts(), local)),
            (None, None) => Err(Error::Configuration("No clustering result available".to_string())),
        }
    }

    /// Statistics of the current result
    pub fn statistics(&self) -> Result<ClusteringStatistics> {
        let (bursts, partition) = self.result()?;
        Ok(ClusteringStatistics::compute(&bursts, partition)?)
    }

    /// Summarize the current result with clusters renumbered by duration
    pub fn report(&self) -> Result<ClusteringReport> {
        let (bursts, partition) = self.result()?;
        let translation = ClusteringStatistics::compute(&bursts, partition)?.translated_ids();
        let partition = partition.translated(&translation);
        let statistics = ClusteringStatistics::compute(&bursts, &partition)?;
        debug!(translation = ?translation, "Clusters renumbered by duration");

        Ok(ClusteringReport {
            algorithm: self.algorithm.name(),
            summary: self.summary.unwrap_or_default(),
            counts: self.data.counts(),
            dimension_names: self.data.dimension_names(),
            bursts: bursts.into_iter().cloned().collect(),
            partition,
            statistics,
        })
    }

    /// k-distance curves over every complete burst known to this rank
    pub fn k_distance_profile(&self, k_begin: usize, k_end: usize) -> Result<Vec<KDistanceCurve>> {
        Ok(Dbscan::k_distance_profile(&self.data.complete_points(), k_begin, k_end)?)
    }

    /// Run the whole pipeline
    ///
    /// With a transport of more than one rank the partitions are reconciled
    /// and only the collector gets a report.
    pub fn run<R: RecordSource + ?Sized>(
        &mut self,
        source: &mut R,
        transport: Option<&mut dyn Transport>,
    ) -> Result<Option<ClusteringReport>> {
        self.extract(source)?;
        self.cluster()?;

        if let Some(transport) = transport {
            if transport.size() > 1 && self.reconcile(transport)?.is_none() {
                return Ok(None);
            }
        }

        self.report().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventRecord, StateRecord, TraceRecord};

    fn records() -> Vec<TraceRecord> {
        let mut records = Vec::new();
        let mut line = 1;
        for (task, instructions) in [(0u32, 1000u64), (0, 1010), (1, 5000), (1, 5005)] {
            let begin = line * 100;
            records.push(TraceRecord::State(StateRecord {
                task,
                thread: 0,
                line,
                begin,
                end: begin + 50,
                value: 1,
            }));
            records.push(TraceRecord::Event(EventRecord {
                task,
                thread: 0,
                line: line + 1,
                timestamp: begin + 50,
                events: vec![(42_000_050, instructions)],
            }));
            line += 2;
        }
        records
    }

    fn pipeline() -> TraceClustering {
        TraceClustering::builder()
            .with_parameter(ClusteringParameter::single("Instructions", 42_000_050))
            .with_trace_data_config(TraceDataConfig {
                normalize: false,
                ..TraceDataConfig::default()
            })
            .with_dbscan(50.0, 2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_parameters() {
        let err = TraceClusteringBuilder::new().build().err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_builder_rejects_unknown_algorithm() {
        let err = TraceClusteringBuilder::new()
            .with_parameter(ClusteringParameter::duration())
            .with_algorithm("kmeans", BTreeMap::new())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Clustering(_)));
    }

    #[test]
    fn test_cluster_before_extract() {
        assert!(pipeline().cluster().is_err());
    }

    #[test]
    fn test_single_process_run() {
        let mut clustering = pipeline();
        let mut source = records().into_iter();
        let report = clustering.run(&mut source, None).unwrap().unwrap();

        assert_eq!(report.summary.bursts, 4);
        assert_eq!(report.bursts.len(), 4);
        assert_eq!(report.partition.cluster_count(), 2);
        // sealing order is line 1, 5, 3, 7; both clusters weigh the same
        assert_eq!(
            report.bursts.iter().map(|b| b.line).collect::<Vec<_>>(),
            vec![1, 5, 3, 7]
        );
        assert_eq!(report.partition.assignment(), &[1, 2, 1, 2]);
        assert_eq!(report.statistics.cluster(1).unwrap().individuals, 2);
    }

    #[test]
    fn test_empty_trace() {
        let mut clustering = pipeline();
        let mut source = Vec::<TraceRecord>::new().into_iter();
        assert!(matches!(
            clustering.extract(&mut source),
            Err(Error::Extraction(ExtractionError::NoBursts))
        ));
    }
}
