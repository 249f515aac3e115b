// Cross-module, multi-thread scenarios exercising the public producer/
// consumer API end to end.
// Every test touches a named OS shared-memory region, so they run serially
// against a single lock to avoid two test processes colliding on the
// process-id-scoped name.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use ringtrace::Core::unlink_shared_memory;
use ringtrace::Error;
use ringtrace::Queue::Record::EventType;
use ringtrace::Queue::{ConsumerBuilder, ProducerBuilder};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/ringtrace-it-{tag}-{n}-{}", std::process::id())
}

#[test]
#[serial_test::serial(shared_memory)]
fn single_producer_single_consumer_preserves_publish_order() {
    let name = unique_name("spsc");
    let _ = unlink_shared_memory(&name);

    let producer = ProducerBuilder::new()
        .with_name(name.clone())
        .with_buffer_size(521)
        .build()
        .unwrap();
    for i in 0..10 {
        producer
            .publish(EventType::SyncBegin, 0, &format!("testing_{i}"), &[])
            .unwrap();
    }

    let consumer = ConsumerBuilder::new()
        .with_name(name.clone())
        .with_buffer_size(521)
        .build()
        .unwrap();
    for i in 0..10 {
        let record = consumer.read_trace_record().unwrap();
        assert_eq!(record.name().unwrap(), format!("testing_{i}"));
        assert_eq!(record.event_type(), EventType::SyncBegin);
    }
    assert!(matches!(consumer.read_trace_record(), Err(Error::Empty)));

    let _ = unlink_shared_memory(&name);
}

#[test]
#[serial_test::serial(shared_memory)]
fn concurrent_publish_and_consume_each_record_observed_exactly_once() {
    let name = unique_name("mpmc");
    let _ = unlink_shared_memory(&name);

    let producer = Arc::new(
        ProducerBuilder::new()
            .with_name(name.clone())
            .with_buffer_size(64 * 1024)
            .build()
            .unwrap(),
    );
    let consumer = Arc::new(
        ConsumerBuilder::new()
            .with_name(name.clone())
            .with_buffer_size(64 * 1024)
            .build()
            .unwrap(),
    );

    let producers: Vec<_> = (0..10)
        .map(|i| {
            let producer = Arc::clone(&producer);
            thread::spawn(move || {
                producer
                    .publish(EventType::SyncBegin, 0, &format!("testing_{i}"), &[])
                    .unwrap();
            })
        })
        .collect();
    for h in producers {
        h.join().unwrap();
    }

    let consumers: Vec<_> = (0..10)
        .map(|_| {
            let consumer = Arc::clone(&consumer);
            thread::spawn(move || {
                for _ in 0..50 {
                    match consumer.read_trace_record() {
                        Ok(record) => return Some(record.name().unwrap().to_owned()),
                        Err(Error::Empty) => thread::yield_now(),
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                None
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for h in consumers {
        if let Some(name) = h.join().unwrap() {
            assert!(seen.insert(name), "a record was observed more than once");
        }
    }
    assert_eq!(seen.len(), 10, "every published record should be observed exactly once");
    for i in 0..10 {
        assert!(seen.contains(&format!("testing_{i}")));
    }

    let _ = unlink_shared_memory(&name);
}

#[test]
#[serial_test::serial(shared_memory)]
fn pooled_reader_reconstructs_chronological_order_across_workers() {
    let name = unique_name("pool");
    let _ = unlink_shared_memory(&name);

    let producer = ProducerBuilder::new()
        .with_name(name.clone())
        .with_buffer_size(64 * 1024)
        .build()
        .unwrap();
    for i in 0..20 {
        producer
            .publish(EventType::Counter, 0, &format!("testing_{i}"), &[])
            .unwrap();
    }

    let consumer = ConsumerBuilder::new()
        .with_name(name.clone())
        .with_buffer_size(64 * 1024)
        .build()
        .unwrap();
    let records: Vec<_> = consumer
        .reader(
            std::time::Duration::from_millis(200),
            std::time::Duration::from_micros(500),
            4,
            0,
            1_000_000_000,
        )
        .collect();

    assert_eq!(records.len(), 20);
    let timestamps: Vec<i64> = records.iter().map(|r| r.timestamp_ns()).collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted, "reader pool output must be timestamp-ordered");

    let _ = unlink_shared_memory(&name);
}
