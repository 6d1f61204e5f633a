use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use crawler::Crawler;
use std::io::Cursor;
use std::path::Path;
use tempfile::tempdir;

const N_MACHINES: usize = 200;
const N_PROCS: usize = 50;

/// Each machine runs a chain of processes launched from a shared shell, so
/// the shell is popular and the per-machine chains are not.
fn build_telemetry() -> String {
    let mut s = String::new();
    for m in 0..N_MACHINES {
        s.push_str(&format!("m{m} explorer.exe p{m}_0.exe\n"));
        for p in 0..N_PROCS - 1 {
            s.push_str(&format!("m{m} p{m}_{p}.exe p{m}_{}.exe\n", p + 1));
        }
    }
    s
}

fn build_crawler(dir: &Path, telemetry: &str) -> Crawler {
    let mut crawler = Crawler::new();
    crawler
        .create(dir.join("bench"), (N_MACHINES * N_PROCS) as u32)
        .unwrap();
    crawler.ingest_reader(Cursor::new(telemetry)).unwrap();
    crawler
}

fn ingest_benchmark(c: &mut Criterion) {
    let telemetry = build_telemetry();
    c.bench_function("ingest_10k_interactions", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let mut crawler = Crawler::new();
                crawler
                    .create(dir.path().join("bench"), (N_MACHINES * N_PROCS) as u32)
                    .unwrap();
                (dir, crawler)
            },
            |(_dir, mut crawler)| {
                let stats = crawler.ingest_reader(Cursor::new(&telemetry)).unwrap();
                assert_eq!(stats.ingested as usize, N_MACHINES * N_PROCS);
            },
            BatchSize::LargeInput,
        );
    });
}

fn crawl_benchmark(c: &mut Criterion) {
    let telemetry = build_telemetry();
    let dir = tempdir().unwrap();
    let crawler = build_crawler(dir.path(), &telemetry);

    c.bench_function("crawl_single_chain", |b| {
        b.iter(|| {
            let report = crawler.crawl(&["p0_0.exe"], 10).unwrap();
            assert_eq!(report.bad_count(), N_PROCS);
        });
    });

    c.bench_function("prevalence_popular_hub", |b| {
        b.iter(|| {
            let n = crawler.prevalence("explorer.exe").unwrap();
            assert_eq!(n as usize, N_MACHINES);
        });
    });
}

criterion_group!(benches, ingest_benchmark, crawl_benchmark);
criterion_main!(benches);
