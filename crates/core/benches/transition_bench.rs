use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use outpost_core::{transition, FifoStrategy, OutboxStore};
use outpost_domain::{
    EffectDescriptor, Intent, OfflineEffect, OutboxAction, OutboxState, TransactionId,
    TransactionMeta,
};
use serde_json::json;

fn offline_intent(n: u64) -> Intent {
    Intent::new("bench/write").with_payload(json!({"n": n})).with_offline(OfflineEffect::new(
        EffectDescriptor::new(format!("/items/{n}")).with_method("PUT").with_json(json!({"n": n})),
    ))
}

fn deep_queue(depth: u64) -> OutboxState {
    (1..=depth).fold(OutboxState::default(), |state, n| {
        transition(state, &OutboxAction::Intent(offline_intent(n)), &FifoStrategy)
    })
}

fn transition_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbox_transition");
    group.sample_size(50);

    for depth in [16_u64, 1_024] {
        let queued = deep_queue(depth);

        group.bench_function(format!("enqueue_depth_{depth}"), |b| {
            let action = OutboxAction::Intent(offline_intent(depth + 1));
            b.iter_batched(
                || queued.clone(),
                |state| black_box(transition(state, &action, &FifoStrategy)),
                BatchSize::SmallInput,
            );
        });

        group.bench_function(format!("complete_head_depth_{depth}"), |b| {
            let action = OutboxAction::Intent(
                Intent::new("bench/commit").with_meta(TransactionMeta::settled(TransactionId(1), true)),
            );
            b.iter_batched(
                || queued.clone(),
                |state| black_box(transition(state, &action, &FifoStrategy)),
                BatchSize::SmallInput,
            );
        });
    }

    group.bench_function("store_enqueue_and_claim", |b| {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        b.iter(|| {
            runtime.block_on(async {
                let store = OutboxStore::new(Arc::new(FifoStrategy), None);
                for n in 1..=32 {
                    store.enqueue(offline_intent(n), |id| id).await;
                }
                black_box(store.try_claim_head().await);
            });
        });
    });

    group.finish();
}

criterion_group!(core_benchmarks, transition_benchmark);
criterion_main!(core_benchmarks);
