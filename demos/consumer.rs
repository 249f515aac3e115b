// Single-shot consumer demo: polls `read_trace_record` until it has seen
// `expected` records or gives up waiting.
//
// Usage: consumer <expected_count>

use std::env;
use std::time::{Duration, Instant};

use ringtrace::Queue::ConsumerBuilder;
use ringtrace::Error;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <expected_count>", args[0]);
        std::process::exit(1);
    }
    let expected: usize = args[1].parse().expect("expected_count must be a number");

    let consumer = ConsumerBuilder::new().build()?;

    let mut received = 0;
    let start = Instant::now();
    let idle_timeout = Duration::from_secs(5);
    let mut idle_since = Instant::now();

    while received < expected {
        match consumer.read_trace_record() {
            Ok(record) => {
                idle_since = Instant::now();
                let name = record.name().unwrap_or("<unnamed>");
                println!("[{:>6}] {} (ts={})", received, name, record.timestamp_ns());
                received += 1;
            }
            Err(Error::Empty) => {
                if idle_since.elapsed() > idle_timeout {
                    eprintln!("consumer: timed out waiting for more records");
                    break;
                }
                std::thread::yield_now();
            }
            Err(e) => {
                eprintln!("consumer: error reading record: {e}");
                break;
            }
        }
    }

    println!(
        "consumer: received {received}/{expected} records in {:.2?}",
        start.elapsed()
    );
    Ok(())
}
