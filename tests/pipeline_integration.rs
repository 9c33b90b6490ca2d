//! End-to-end pipeline tests
//!
//! Trace file and configuration file on disk, through extraction,
//! classification, normalization, clustering and statistics.

use burst_clustering::bursts::BurstKind;
use burst_clustering::extraction::{write_records, JsonLinesSource};
use burst_clustering::metrics::gather_metrics;
use burst_clustering::types::{EventRecord, EventValue, Line, StateRecord, Timestamp, TraceRecord};
use burst_clustering::{AnalysisConfig, Error};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tempfile::TempDir;

const INSTRUCTIONS: u32 = 42_000_050;
const CYCLES: u32 = 42_000_059;

const CONFIG: &str = r#"
[extraction]
duration_filter = 10

[clustering]
algorithm = "dbscan"
parameters = { epsilon = 0.1, min_points = 3 }

[[parameters]]
kind = "single_event"
name = "Instructions"
event_type = 42000050
range_max = 1000000.0

[[parameters]]
kind = "mixed_events"
name = "IPC"
event_type_a = 42000050
event_type_b = 42000059
operation = "divide"
"#;

struct TraceBuilder {
    records: Vec<TraceRecord>,
    line: Line,
}

impl TraceBuilder {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            line: 1,
        }
    }

    fn burst(&mut self, begin: Timestamp, end: Timestamp, counters: &[(u32, EventValue)]) {
        self.records.push(TraceRecord::State(StateRecord {
            task: 0,
            thread: 0,
            line: self.line,
            begin,
            end,
            value: 1,
        }));
        self.records.push(TraceRecord::Event(EventRecord {
            task: 0,
            thread: 0,
            line: self.line + 1,
            timestamp: end,
            events: counters.to_vec(),
        }));
        self.line += 2;
    }
}

/// Ten short low-IPC bursts interleaved with ten long high-IPC bursts,
/// followed by one burst of each rejected kind
fn two_phase_trace() -> Vec<TraceRecord> {
    let mut trace = TraceBuilder::new();
    for k in 0..10 {
        let base = k * 1_000;
        trace.burst(base, base + 100, &[(INSTRUCTIONS, 10_000), (CYCLES, 20_000)]);
        trace.burst(base + 500, base + 800, &[(INSTRUCTIONS, 90_000), (CYCLES, 30_000)]);
    }
    // no cycles counter
    trace.burst(20_000, 20_100, &[(INSTRUCTIONS, 10_000)]);
    // shorter than the duration filter
    trace.burst(21_000, 21_005, &[(INSTRUCTIONS, 10_000), (CYCLES, 20_000)]);
    // above the instructions range
    trace.burst(22_000, 22_100, &[(INSTRUCTIONS, 5_000_000), (CYCLES, 20_000)]);
    trace.records
}

fn write_inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let trace_path = dir.join("trace.jsonl");
    let mut out = BufWriter::new(File::create(&trace_path).unwrap());
    write_records(&mut out, &two_phase_trace()).unwrap();
    drop(out);

    let config_path = dir.join("analysis.toml");
    std::fs::write(&config_path, CONFIG).unwrap();
    (trace_path, config_path)
}

#[test]
fn test_full_pipeline_from_files() {
    let dir = TempDir::new().unwrap();
    let (trace_path, config_path) = write_inputs(dir.path());

    let config = AnalysisConfig::from_file(&config_path).unwrap();
    config.validate().unwrap();

    let mut clustering = config.builder().build().unwrap();
    let mut source = JsonLinesSource::open(&trace_path).unwrap();
    let report = clustering.run(&mut source, None).unwrap().unwrap();

    assert_eq!(report.summary.bursts, 23);
    assert_eq!(report.counts.complete, 20);
    assert_eq!(report.counts.missing_data, 1);
    assert_eq!(report.counts.duration_filtered, 1);
    assert_eq!(report.counts.range_filtered, 1);
    assert_eq!(report.dimension_names, vec!["Instructions", "IPC"]);

    // the long bursts carry three times the duration and are renumbered first
    assert_eq!(report.bursts.len(), 20);
    for (burst, &id) in report.bursts.iter().zip(report.partition.assignment()) {
        let expected = if burst.duration == 300 { 1 } else { 2 };
        assert_eq!(id, expected, "burst at line {}", burst.line);
    }
    assert!(!report.partition.has_noise());

    let heavy = report.statistics.cluster(1).unwrap();
    assert_eq!(heavy.individuals, 10);
    assert_eq!(heavy.total_duration, 3_000);
    assert!((heavy.dimension_means[1] - 3.0).abs() < 1e-9);
    assert!((report.statistics.percentage_duration(1) - 75.0).abs() < 1e-9);
}

#[test]
fn test_coordinates_normalized_to_unit_range() {
    let dir = TempDir::new().unwrap();
    let (trace_path, config_path) = write_inputs(dir.path());

    let config = AnalysisConfig::from_file(&config_path).unwrap();
    let mut clustering = config.builder().build().unwrap();
    clustering
        .extract(&mut JsonLinesSource::open(&trace_path).unwrap())
        .unwrap();

    let data = clustering.data();
    assert!(data.is_normalized());
    assert_eq!(data.min_values(), &[10_000.0, 0.5]);
    assert_eq!(data.max_values(), &[90_000.0, 3.0]);
    for point in data.clustering_points() {
        for &v in point.as_slice() {
            assert!(v == 0.0 || v == 1.0, "unexpected coordinate {}", v);
        }
    }
    assert!(data
        .bursts()
        .iter()
        .any(|b| b.kind == BurstKind::RangeFiltered && b.line == 45));
}

#[test]
fn test_k_distance_estimate() {
    let dir = TempDir::new().unwrap();
    let (trace_path, config_path) = write_inputs(dir.path());

    let config = AnalysisConfig::from_file(&config_path).unwrap();
    let mut clustering = config.builder().build().unwrap();
    clustering
        .extract(&mut JsonLinesSource::open(&trace_path).unwrap())
        .unwrap();

    let curves = clustering.k_distance_profile(1, 9).unwrap();
    assert_eq!(curves.len(), 9);
    // ten identical points per phase
    assert!(curves.iter().all(|c| c.distances.iter().all(|&d| d == 0.0)));

    let curves = clustering.k_distance_profile(10, 10).unwrap();
    assert!(curves[0].distances.iter().all(|&d| d > 1.0));
}

#[test]
fn test_malformed_trace_line_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.jsonl");
    std::fs::write(
        &path,
        "# header\n{\"kind\":\"state\",\"task\":0,\"thread\":0,\"line\":1,\"begin\":0,\"end\":10,\"value\":1}\nnot json\n",
    )
    .unwrap();

    let mut clustering = AnalysisConfig::default().builder().build().unwrap();
    let err = clustering
        .extract(&mut JsonLinesSource::open(&path).unwrap())
        .unwrap_err();
    assert!(err.to_string().contains("line 3"), "{}", err);
}

#[test]
fn test_unknown_algorithm_in_config() {
    let config: AnalysisConfig = toml::from_str("[clustering]\nalgorithm = \"gmeans\"\n").unwrap();
    assert!(matches!(config.builder().build(), Err(Error::Clustering(_))));
}

#[test]
fn test_metrics_exported() {
    let dir = TempDir::new().unwrap();
    let (trace_path, config_path) = write_inputs(dir.path());

    let config = AnalysisConfig::from_file(&config_path).unwrap();
    let mut clustering = config.builder().build().unwrap();
    clustering
        .run(&mut JsonLinesSource::open(&trace_path).unwrap(), None)
        .unwrap();

    let text = gather_metrics();
    assert!(text.contains("bursts_sealed_total"));
    assert!(text.contains("bursts_range_queries_total"));
    assert!(text.contains("bursts_stage_duration_seconds"));
}
