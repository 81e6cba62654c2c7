use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use inspect_debug_protocol::SourceMap;
use std::path::Path;

/// Build a map with `lines` generated lines, four segments each, all pointing
/// into one original source.
fn synthetic_map(lines: usize) -> String {
    // "AACA" advances the original line by one; "IAAI" moves four columns right.
    let mut mappings = String::from("AAAA,IAAI,IAAI,IAAI");
    for _ in 1..lines {
        mappings.push_str(";AACA,IAAI,IAAI,IAAI");
    }
    format!(
        r#"{{"version":3,"sources":["src/app.ts"],"names":[],"mappings":"{mappings}"}}"#
    )
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("source_map_parse");

    for lines in [100, 1_000, 10_000] {
        let text = synthetic_map(lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &text, |b, text| {
            b.iter(|| SourceMap::from_json(black_box(text), Some(Path::new("/proj"))).unwrap())
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let map = SourceMap::from_json(&synthetic_map(10_000), Some(Path::new("/proj"))).unwrap();

    c.bench_function("original_position", |b| {
        b.iter(|| map.original_position(black_box(5_000), black_box(9)))
    });

    c.bench_function("generated_position", |b| {
        b.iter(|| map.generated_position(black_box("/proj/src/app.ts"), black_box(5_000)))
    });
}

criterion_group!(benches, bench_parse, bench_lookup);
criterion_main!(benches);
