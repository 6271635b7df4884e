use benches::{synthetic, write_tree};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use engine::RunOptions;
use ir::Diagnostics;
use parsers::{parse_dump, DirectiveFactory, SourceLocator};
use store::{BatchLimits, BatchScheduler, GraphStore, MemoryGraph};

const EXPANSIONS: usize = 500;

fn bench_parse(c: &mut Criterion) {
    let cfg = synthetic(EXPANSIONS);
    c.bench_function("parse_dump", |b| {
        b.iter(|| {
            let mut factory = DirectiveFactory::new(None);
            let mut diag = Diagnostics::new();
            parse_dump(black_box(&cfg.dump), &mut factory, &mut diag).unwrap()
        })
    });
}

fn bench_parse_with_recovery(c: &mut Criterion) {
    let cfg = synthetic(EXPANSIONS);
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &cfg).unwrap();
    c.bench_function("parse_dump_recovery", |b| {
        b.iter(|| {
            let mut factory = DirectiveFactory::new(Some(SourceLocator::new(dir.path())));
            let mut diag = Diagnostics::new();
            parse_dump(black_box(&cfg.dump), &mut factory, &mut diag).unwrap()
        })
    });
}

fn bench_populate(c: &mut Criterion) {
    let cfg = synthetic(EXPANSIONS);
    let mut factory = DirectiveFactory::new(None);
    let mut diag = Diagnostics::new();
    let directives = parse_dump(&cfg.dump, &mut factory, &mut diag).unwrap();
    c.bench_function("populate_graph", |b| {
        b.iter_batched(
            || directives.clone(),
            |directives| {
                let mut graph = MemoryGraph::new();
                let mut scheduler = BatchScheduler::new(BatchLimits::default());
                for d in directives {
                    graph.execute_all(&scheduler.push(d)).unwrap();
                }
                graph.execute_all(&scheduler.finish()).unwrap();
                graph.node_count()
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_run(c: &mut Criterion) {
    let cfg = synthetic(EXPANSIONS);
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &cfg).unwrap();
    let mut opts = RunOptions::new("bench", dir.path().join("dump.txt"), dir.path().join("store"));
    opts.config_root = Some(dir.path().to_path_buf());
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.bench_function("run_parse", |b| {
        b.iter(|| engine::run_parse(black_box(&opts)).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_parse_with_recovery,
    bench_populate,
    bench_run
);
criterion_main!(benches);
