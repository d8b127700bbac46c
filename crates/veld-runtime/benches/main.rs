use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use veld_runtime::{Heap, utf8};

/// Allocation churn through the free list: the steady-state cost of a loop
/// that allocates and releases one value per iteration.
fn heap_churn(c: &mut Criterion) {
    c.bench_function("heap_alloc_drop_1k", |b| {
        b.iter(|| {
            let mut heap: Heap<i64> = Heap::new();
            for i in 0..1_000 {
                let mut value = heap.alloc(i);
                value.drop_with_heap(&mut heap);
            }
            black_box(heap.stats().total_slots)
        });
    });

    c.bench_function("heap_alias_fanout_64", |b| {
        b.iter(|| {
            let mut heap: Heap<i64> = Heap::new();
            let root = heap.alloc(1);
            let mut aliases: Vec<_> = (0..64).map(|_| root.clone_with_heap(&heap)).collect();
            aliases.push(root);
            for alias in &mut aliases {
                alias.drop_with_heap(&mut heap);
            }
            black_box(heap.stats().free_slots)
        });
    });
}

/// Decode throughput over a mixed ASCII/multi-byte stream.
fn utf8_decode(c: &mut Criterion) {
    let text = "héllo wörld — ☃ 𝄞 末 ascii tail ".repeat(64);
    let bytes = text.as_bytes();
    c.bench_function("utf8_decode_stream", |b| {
        b.iter(|| {
            let mut offset = 0;
            let mut runes = 0_usize;
            while offset < bytes.len() {
                let (_, consumed) = utf8::decode_rune(&bytes[offset..]);
                offset += consumed;
                runes += 1;
            }
            black_box(runes)
        });
    });
}

criterion_group!(benches, heap_churn, utf8_decode);
criterion_main!(benches);
