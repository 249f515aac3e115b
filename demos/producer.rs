// A small producer binary exercising the public publish API end to end
// against a live shared-memory region, mirroring the source library's own
// example binaries.
//
// Usage: producer <count> [--auto-exit]

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringtrace::Queue::Record::{Arg, EventType};
use ringtrace::Queue::ProducerBuilder;
use ringtrace::{Config, Core};

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <count> [--auto-exit]", args[0]);
        std::process::exit(1);
    }
    let count: usize = args[1].parse().expect("count must be a number");
    let auto_exit = args.iter().any(|a| a == "--auto-exit");

    let name = Config::event_queue_name();
    println!("producer: publishing {count} records to '{name}'");

    let producer = ProducerBuilder::new().build()?;

    let keep_running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&keep_running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .expect("error installing Ctrl+C handler");

    let mut published = 0usize;
    for i in 0..count {
        if !keep_running.load(Ordering::SeqCst) {
            break;
        }
        let name = format!("testing_{i}");
        match producer.publish(EventType::SyncBegin, 0, &name, &[Arg::U64(i as u64)]) {
            Ok(()) => published += 1,
            Err(e) => {
                eprintln!("producer: publish failed ({e}), retrying after a short pause");
                std::thread::sleep(Duration::from_micros(100));
            }
        }
    }
    println!("producer: published {published}/{count} records");

    if auto_exit {
        std::thread::sleep(Duration::from_millis(200));
    } else {
        println!("producer: press Ctrl+C to exit");
        while keep_running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    println!("producer: unlinking '{name}' and shutting down");
    let _ = Core::unlink_shared_memory(&name);
    Ok(())
}
