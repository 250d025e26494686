//! Sentence batcher benchmarks.
//!
//! Run with: cargo bench -p voiceturn-pipeline --bench batcher

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use voiceturn_pipeline::SentenceBatcher;

fn bench_streamed_reply(c: &mut Criterion) {
    let mut group = c.benchmark_group("sentence_batcher");

    // A long reply arriving as small token-sized fragments.
    let reply: String = (0..200)
        .map(|i| format!("This is sentence number {i} of the streamed reply. "))
        .collect();
    let fragments: Vec<&str> = reply
        .as_bytes()
        .chunks(4)
        .map(|b| std::str::from_utf8(b).unwrap())
        .collect();

    for batch_size in [1usize, 4, 8] {
        group.throughput(Throughput::Bytes(reply.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("push_fragments", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    let mut batcher = SentenceBatcher::new(batch_size);
                    let mut chunks = 0usize;
                    for fragment in &fragments {
                        chunks += batcher.push(fragment).len();
                    }
                    if batcher.finish().is_some() {
                        chunks += 1;
                    }
                    chunks
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_streamed_reply);
criterion_main!(benches);
