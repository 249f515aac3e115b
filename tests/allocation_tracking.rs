// Allocation tracking on the real publish/consume hot path.
//
// The wire format is self-describing and necessarily heap-allocates a
// little per record (argument Vecs, decoded Strings) — the property worth
// guarding is that steady-state allocation volume per iteration doesn't
// grow as more records flow through, i.e. there's no unbounded buildup
// hiding behind the ring's fixed-size buffer.
//
// Run with: cargo test --test allocation_tracking -- --nocapture

use std::sync::atomic::{AtomicU64, Ordering};

use ringtrace::Core::unlink_shared_memory;
use ringtrace::Queue::Record::EventType;
use ringtrace::Queue::{ConsumerBuilder, ProducerBuilder};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/ringtrace-alloc-{tag}-{n}-{}", std::process::id())
}

#[test]
#[serial_test::serial(dhat)]
fn steady_state_publish_consume_does_not_grow_heap_usage() {
    let name = unique_name("steady");
    let _ = unlink_shared_memory(&name);

    let producer = ProducerBuilder::new()
        .with_name(name.clone())
        .with_buffer_size(4096)
        .build()
        .unwrap();
    let consumer = ConsumerBuilder::new()
        .with_name(name.clone())
        .with_buffer_size(4096)
        .build()
        .unwrap();

    // Warm up: let allocator bookkeeping (lazy statics, thread-local fastrand
    // state, etc.) settle before taking measurements.
    for i in 0..50 {
        producer
            .publish(EventType::Counter, 0, &format!("warmup_{i}"), &[])
            .unwrap();
        consumer.read_trace_record().unwrap();
    }

    let profiler = dhat::Profiler::new_heap();

    let round_bytes = |rounds: usize| -> u64 {
        let before = dhat::HeapStats::get();
        for i in 0..rounds {
            producer
                .publish(EventType::Counter, 0, &format!("round_{i}"), &[])
                .unwrap();
            consumer.read_trace_record().unwrap();
        }
        let after = dhat::HeapStats::get();
        after.total_bytes - before.total_bytes
    };

    let first_batch = round_bytes(100);
    let second_batch = round_bytes(100);

    drop(profiler);

    println!("first 100 rounds: {first_batch} bytes, second 100 rounds: {second_batch} bytes");
    // Steady-state bytes-per-round should not be growing: the second batch
    // shouldn't cost meaningfully more than the first now that everything
    // lazy has already been initialized.
    assert!(
        second_batch <= first_batch * 2 + 1024,
        "allocation volume grew across equal-sized batches: {first_batch} -> {second_batch}"
    );

    let _ = unlink_shared_memory(&name);
}

#[test]
fn memory_stats_are_stable_under_sustained_publish_consume() {
    use memory_stats::memory_stats;

    let name = unique_name("memstats");
    let _ = unlink_shared_memory(&name);

    let producer = ProducerBuilder::new()
        .with_name(name.clone())
        .with_buffer_size(4096)
        .build()
        .unwrap();
    let consumer = ConsumerBuilder::new()
        .with_name(name.clone())
        .with_buffer_size(4096)
        .build()
        .unwrap();

    for i in 0..200 {
        producer
            .publish(EventType::Counter, 0, &format!("stat_{i}"), &[])
            .unwrap();
        consumer.read_trace_record().unwrap();
    }

    if let Some(stats) = memory_stats() {
        println!("physical_mem after sustained load: {} bytes", stats.physical_mem);
    }

    let _ = unlink_shared_memory(&name);
}
