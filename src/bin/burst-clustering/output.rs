//! CSV writers for analysis results

use burst_clustering::clustering::KDistanceCurve;
use burst_clustering::ClusteringReport;
use csv::Writer;
use std::io::Write;
use std::path::Path;

/// One row per clustered burst
pub fn write_bursts(path: &Path, report: &ClusteringReport) -> csv::Result<()> {
    bursts_to(Writer::from_path(path)?, report)
}

/// One row per cluster, noise first
pub fn write_statistics(path: &Path, report: &ClusteringReport) -> csv::Result<()> {
    statistics_to(Writer::from_path(path)?, report)
}

/// Long format k-distance curves
pub fn write_k_distances(path: &Path, curves: &[KDistanceCurve]) -> csv::Result<()> {
    let mut out = Writer::from_path(path)?;
    out.write_record(["k", "position", "distance"])?;
    for curve in curves {
        for (position, distance) in curve.distances.iter().enumerate() {
            out.write_record([curve.k.to_string(), position.to_string(), distance.to_string()])?;
        }
    }
    out.flush()?;
    Ok(())
}

fn bursts_to<W: Write>(mut out: Writer<W>, report: &ClusteringReport) -> csv::Result<()> {
    let mut header: Vec<String> = ["instance", "task", "thread", "line", "begin", "end", "duration"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(report.dimension_names.iter().cloned());
    header.push("cluster".to_string());
    out.write_record(&header)?;

    for (burst, id) in report.bursts.iter().zip(report.partition.assignment()) {
        let mut row = vec![
            burst.instance.to_string(),
            burst.task.to_string(),
            burst.thread.to_string(),
            burst.line.to_string(),
            burst.begin.to_string(),
            burst.end.to_string(),
            burst.duration.to_string(),
        ];
        row.extend(burst.raw_dimensions.iter().map(|v| v.to_string()));
        row.push(id.to_string());
        out.write_record(&row)?;
    }

    out.flush()?;
    Ok(())
}

fn statistics_to<W: Write>(mut out: Writer<W>, report: &ClusteringReport) -> csv::Result<()> {
    let mut header: Vec<String> = [
        "cluster",
        "individuals",
        "total_duration",
        "pct_duration",
        "duration_mean",
        "duration_stddev",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(report.dimension_names.iter().map(|name| format!("mean_{}", name)));
    out.write_record(&header)?;

    for cluster in report.statistics.clusters() {
        let mut row = vec![
            cluster.id.to_string(),
            cluster.individuals.to_string(),
            cluster.total_duration.to_string(),
            format!("{:.4}", report.statistics.percentage_duration(cluster.id)),
            format!("{:.4}", cluster.duration_mean),
            format!("{:.4}", cluster.duration_stddev()),
        ];
        row.extend(cluster.dimension_means.iter().map(|m| m.to_string()));
        out.write_record(&row)?;
    }

    out.flush()?;
    Ok(())
}
