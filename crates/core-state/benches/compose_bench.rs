use core_state::{Change, ChangeSet};
use core_text::Text;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn scattered_edits(len: usize, count: usize, stride: usize) -> ChangeSet {
    let changes: Vec<Change> = (0..count)
        .map(|i| Change::insert((i * stride) % len, Text::from("x")))
        .collect();
    ChangeSet::of(changes, len).unwrap()
}

fn bench_compose(c: &mut Criterion) {
    let len = 100_000;
    let a = scattered_edits(len, 200, 499);
    let b = scattered_edits(a.new_len(), 200, 503);
    c.bench_function("compose_200x200_edits", |bench| {
        bench.iter(|| black_box(a.compose(&b).unwrap()))
    });
    c.bench_function("map_pos_through_200_edits", |bench| {
        let mut pos = 0;
        bench.iter(|| {
            pos = (pos + 997) % len;
            black_box(a.map_pos(pos, 1));
        })
    });
}

criterion_group!(benches, bench_compose);
criterion_main!(benches);
