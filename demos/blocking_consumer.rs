// Blocking-iterator consumer demo: drains a pooled reader's
// chronologically-ordered iterator until every worker goes idle.
//
// Usage: blocking_consumer [num_consumers]

use std::env;
use std::time::Duration;

use ringtrace::Queue::ConsumerBuilder;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    let num_consumers: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(4);

    println!("blocking_consumer: starting {num_consumers} workers");

    let consumer = ConsumerBuilder::new().build()?;
    let records = consumer.reader(
        Duration::from_secs(2),
        Duration::from_millis(1),
        num_consumers,
        0,
        1_000_000_000,
    );

    let mut count = 0;
    for record in records {
        let name = record.name().unwrap_or("<unnamed>");
        println!("[{:>6}] {} (ts={})", count, name, record.timestamp_ns());
        count += 1;
    }

    println!("blocking_consumer: stream closed after {count} records");
    Ok(())
}
