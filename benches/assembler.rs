use burst_clustering::bursts::{ClusteringParameter, ExtractedBurst, ParameterSet, TraceData, TraceDataConfig};
use burst_clustering::extraction::{AssemblerConfig, BurstAssembler};
use burst_clustering::types::{EventRecord, StateRecord, TraceRecord};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Adjacent running states on several threads with two counters per burst end
fn create_trace(bursts: u64, threads: u32) -> Vec<TraceRecord> {
    let mut records = Vec::with_capacity((bursts * threads as u64 * 3) as usize);
    let mut line = 1;
    for k in 0..bursts {
        for thread in 0..threads {
            let begin = k * 100;
            records.push(TraceRecord::State(StateRecord {
                task: thread / 4,
                thread: thread % 4,
                line,
                begin,
                end: begin + 100,
                value: 1,
            }));
            records.push(TraceRecord::Event(EventRecord {
                task: thread / 4,
                thread: thread % 4,
                line: line + 1,
                timestamp: begin + 50,
                events: vec![(42_000_050, 1_000 + k)],
            }));
            records.push(TraceRecord::Event(EventRecord {
                task: thread / 4,
                thread: thread % 4,
                line: line + 2,
                timestamp: begin + 100,
                events: vec![(42_000_050, 500), (42_000_059, 2_000 + k)],
            }));
            line += 3;
        }
    }
    records
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");

    for bursts in [1_000u64, 10_000].iter() {
        let records = create_trace(*bursts, 16);
        group.bench_with_input(BenchmarkId::from_parameter(bursts), bursts, |b, _| {
            b.iter(|| {
                let mut assembler = BurstAssembler::new(AssemblerConfig::default());
                let mut sink: Vec<ExtractedBurst> = Vec::new();
                assembler
                    .extract(&mut records.clone().into_iter(), &mut sink)
                    .unwrap();
                black_box(sink.len())
            });
        });
    }

    group.finish();
}

fn bench_extraction_into_store(c: &mut Criterion) {
    let records = create_trace(5_000, 16);
    let parameters = vec![
        ClusteringParameter::single("Instructions", 42_000_050),
        ClusteringParameter::single("Cycles", 42_000_059),
    ];

    c.bench_function("extraction_into_store_80k", |b| {
        b.iter(|| {
            let set = ParameterSet::new(parameters.clone()).unwrap();
            let mut data = TraceData::new(set, TraceDataConfig::default()).unwrap();
            let mut assembler = BurstAssembler::new(AssemblerConfig::default());
            assembler
                .extract(&mut records.clone().into_iter(), &mut data)
                .unwrap();
            black_box(data.clustering_points().len())
        });
    });
}

criterion_group!(benches, bench_assembly, bench_extraction_into_store);
criterion_main!(benches);
