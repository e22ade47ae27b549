//! chatmem Benchmark Suite
//!
//! Performance targets for the per-turn memory path:
//!   memory_creation_single ............ < 10μs
//!   search_keyword_from_500 ........... < 500μs
//!   relevant_memories_from_500 ........ < 2ms
//!   summary_from_500 .................. < 1ms
//!   snapshot_encode_500 ............... < 5ms

use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use chatmem_core::config::{ChatmemConfig, MemoryConfig, PersistenceConfig};
use chatmem_core::eviction;
use chatmem_core::memory::{MemoryKind, MemoryRecord};
use chatmem_core::persistence::{self, PersistenceEngine};
use chatmem_core::retrieval::{self, MemoryQuery};
use chatmem_core::summary;
use chatmem_core::types::{ManualClock, SubjectId, Timestamp};
use chatmem_core::MemorySystem;

const T0: Timestamp = Timestamp::from_millis(1_700_000_000_000);
const TOPICS: [&str; 8] = ["tea", "rain", "work", "sister", "music", "exam", "cat", "travel"];

fn make_record(i: usize) -> MemoryRecord {
    let kind = MemoryKind::ALL[i % MemoryKind::ALL.len()];
    let topic = TOPICS[i % TOPICS.len()];
    #[allow(clippy::cast_precision_loss)]
    let importance = 1.0 + (i % 10) as f64;
    #[allow(clippy::cast_precision_loss)]
    let created = T0.plus_days((i % 90) as f64);
    let mut record = MemoryRecord::new(
        kind,
        &format!("memory {i} about {topic} mentioned during a late chat"),
        importance,
        [topic],
        created,
    )
    .expect("valid record");
    record.access_count = u32::try_from(i % 7).unwrap_or(0);
    record
}

fn make_records(n: usize) -> Vec<MemoryRecord> {
    (0..n).map(make_record).collect()
}

/// Benchmark: Single memory creation (target: < 10μs).
fn bench_memory_creation(c: &mut Criterion) {
    c.bench_function("memory_creation_single", |b| {
        b.iter(|| black_box(make_record(black_box(42))));
    });
}

/// Benchmark: Keyword search over 500 memories (target: < 500μs).
fn bench_search(c: &mut Criterion) {
    let records = make_records(500);
    let now = T0.plus_days(120.0);
    let query = MemoryQuery::new().keyword("rain").limit(3);

    c.bench_function("search_keyword_from_500", |b| {
        b.iter(|| retrieval::rank(black_box(&records), black_box(&query), now));
    });
}

/// Benchmark: Context-driven retrieval through a live system (target: < 2ms).
fn bench_relevant_memories(c: &mut Criterion) {
    let store = Arc::new(
        PersistenceEngine::open_in_memory(&PersistenceConfig::default()).expect("open"),
    );
    let subject = SubjectId::new("bench");
    store.save_snapshot(&subject, &make_records(500)).expect("seed");
    let system = MemorySystem::load(
        subject,
        store,
        Arc::new(ManualClock::new(T0.plus_days(120.0))),
        Arc::new(ChatmemConfig::default()),
    );

    c.bench_function("relevant_memories_from_500", |b| {
        b.iter(|| {
            system.get_relevant_memories(black_box("I had tea in the rain after work"), None)
        });
    });
}

/// Benchmark: Summary rendering over 500 memories (target: < 1ms).
fn bench_summary(c: &mut Criterion) {
    let records = make_records(500);
    let config = MemoryConfig::default();
    let now = T0.plus_days(120.0);

    c.bench_function("summary_from_500", |b| {
        b.iter(|| summary::render_summary(black_box(&records), now, &config));
    });
}

/// Benchmark: Cleanup pass over 500 memories.
fn bench_cleanup(c: &mut Criterion) {
    let records = make_records(500);
    let now = T0.plus_days(365.0);

    c.bench_function("cleanup_pass_500", |b| {
        b.iter_batched(
            || records.clone(),
            |batch| eviction::evict_forgotten(batch, now, 1.0),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: Snapshot encoding of 500 memories (target: < 5ms).
fn bench_snapshot(c: &mut Criterion) {
    let records = make_records(500);

    c.bench_function("snapshot_encode_500", |b| {
        b.iter(|| persistence::encode_snapshot(black_box(&records)).expect("encode"));
    });
}

criterion_group!(
    benches,
    bench_memory_creation,
    bench_search,
    bench_relevant_memories,
    bench_summary,
    bench_cleanup,
    bench_snapshot,
);
criterion_main!(benches);
