// Fingerprinting and store lookup benchmarks
// Author: kelexine (https://github.com/kelexine)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eval_adapter::cache::{fingerprint, CacheStore, Namespace};
use serde_json::{json, Value};

fn sample_request(turns: usize) -> Value {
    let messages: Vec<Value> = (0..turns)
        .map(|i| {
            json!({
                "role": if i % 2 == 0 { "user" } else { "assistant" },
                "content": format!("Turn {} of a fairly ordinary evaluation prompt", i)
            })
        })
        .collect();
    json!({
        "model": "bench-model",
        "temperature": 0.0,
        "max_tokens": 512,
        "messages": messages,
    })
}

fn bench_fingerprint(c: &mut Criterion) {
    let small = sample_request(2);
    let large = sample_request(64);

    c.bench_function("fingerprint_2_turns", |b| b.iter(|| fingerprint(black_box(&small))));
    c.bench_function("fingerprint_64_turns", |b| b.iter(|| fingerprint(black_box(&large))));
}

fn bench_store_lookup(c: &mut Criterion) {
    let store = CacheStore::in_memory().expect("in-memory store");
    let keys: Vec<String> = (0..1000)
        .map(|i| fingerprint(&sample_request(i % 8 + 1)) + &i.to_string())
        .collect();
    for key in &keys {
        store
            .put(Namespace::Responses, key, br#"{"choices":[]}"#)
            .expect("seed store");
    }

    c.bench_function("store_get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            store.get(Namespace::Responses, black_box(&keys[i])).unwrap()
        })
    });
}

criterion_group!(benches, bench_fingerprint, bench_store_lookup);
criterion_main!(benches);
